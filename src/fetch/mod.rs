//! Network access with retries.

pub mod fetcher;
pub mod retry;

pub use fetcher::{next_page_url, with_per_page, RetryFetcher, PER_PAGE};
pub use retry::{with_retry, RetryPolicy, RetryStats};
