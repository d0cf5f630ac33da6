pub mod kucoin;
pub mod retry;
pub mod signing;

pub use kucoin::TradeHistoryClient;
pub use retry::{fetch_fills_with_retry, RetryPolicy};
pub use signing::{sign, ApiCredentials, SignedHeaders};
