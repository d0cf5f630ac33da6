pub mod classifier;
pub mod db_storage;
pub mod dedup;

pub use classifier::{classify, extract_amount};
pub use db_storage::LedgerStore;
pub use dedup::SeenIds;
