//! Webhooks feature module
//!
//! Receives asynchronous notifications from the frame-extraction provider.

pub mod routes;

pub use routes::webhook_routes;
