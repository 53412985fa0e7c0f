//! In-memory cache of server state for the admin console.
//!
//! This module provides the pieces the query and mutation layers build on:
//! - `CacheKey`: endpoint plus normalized argument
//! - `TagIndex`: many-to-many tag → key mapping for invalidation fan-out
//! - `CacheStore`: reference-counted entries with stale-while-revalidate,
//!   in-flight request collapsing and retention-based eviction

mod entry;
mod key;
pub(crate) mod store;
mod tags;

pub use entry::{EntrySnapshot, EntryStatus, EntryUpdate};
pub use key::CacheKey;
pub use store::{CacheEvent, CacheStore, Subscription};
pub use tags::{Tag, TagIndex};
