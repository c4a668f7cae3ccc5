pub mod error;
pub mod models;
pub mod store;

// Re-exports
pub use error::{Error, Result};
pub use models::RecordRow;
pub use store::{SharedStore, StoreConfig, TxState};
