pub mod database;
pub mod offline;

pub use database::ConnectionPool;
pub use offline::{SqliteCacheStore, SqliteOperationStore};
