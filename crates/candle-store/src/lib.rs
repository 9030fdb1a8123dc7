pub mod error;
pub mod store;
pub mod table;

pub use error::StoreError;
pub use store::{CandleStore, ChecksumState, StoreWriteReport};
pub use table::NumericTable;
