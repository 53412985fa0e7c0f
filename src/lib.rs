//! Client-side data synchronization for an e-commerce catalog admin console.
//!
//! Views subscribe to queries, the cache deduplicates and stores responses,
//! and mutations invalidate tagged entries so every view converges on the
//! server's state.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod query;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cache::{CacheEvent, CacheKey, CacheStore, EntryStatus, Tag};
pub use catalog::CatalogClient;
pub use descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
pub use error::{FetchError, SyncError};
pub use mutation::{MutationHandle, MutationResult, MutationStatus, OptimisticUpdate};
pub use query::{Query, QueryClient, QueryResult};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
