//! Records feature module
//!
//! Public read-only status of processing records.

pub mod queries;
pub mod routes;

pub use routes::records_routes;
