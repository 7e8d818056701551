pub mod repository;
pub mod store;

pub use repository::Repository;
pub use store::{RecordStore, RecordTxn};
