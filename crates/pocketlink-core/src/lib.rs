// pocketlink-core: domain error taxonomy, retry helpers and a TTL cache
// for applications built on pocketlink-api.

pub mod cache;
pub mod error;
pub mod resilience;

pub use cache::TtlCache;
pub use error::{BusinessError, DomainError, NetworkError, classify};
pub use resilience::{RetryPolicy, safe_call, with_retry};
