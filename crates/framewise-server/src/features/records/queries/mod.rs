pub mod get_record;

pub use get_record::{GetRecordError, GetRecordQuery, RecordStatusView};
