//! Subscription-facing query handles.
//!
//! In the spirit of TanStack Query: a view asks for `(descriptor, arg)`, gets
//! a `Query` back, and reads `data` / `status` / `error` from it. The handle
//! keeps the cache entry alive while it exists and owns the fetch policy.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(store, transport);
//! let mut query = client.use_query(&products::GET_ALL_PRODUCTS, &ProductListArgs::default())?;
//!
//! // Render whatever is there right now
//! render(query.state());
//!
//! // Re-render on every change
//! while let Some(result) = query.changed().await {
//!     render(result);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::store::{FetchCompletion, FetchTicket};
use crate::cache::{CacheKey, CacheStore, EntrySnapshot, EntryStatus, Subscription};
use crate::descriptor::QueryDescriptor;
use crate::error::{report_cache_miss, FetchError, SyncError};
use crate::transport::Transport;

/// What a view sees of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
  pub data: Option<Value>,
  pub status: EntryStatus,
  pub error: Option<FetchError>,
  pub last_updated: Option<DateTime<Utc>>,
}

impl QueryResult {
  pub fn is_loading(&self) -> bool {
    self.status == EntryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == EntryStatus::Success
  }

  pub fn is_stale(&self) -> bool {
    self.status == EntryStatus::Stale
  }

  pub fn is_error(&self) -> bool {
    self.status == EntryStatus::Error
  }

  /// Decode the payload into a typed value.
  pub fn decode<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
    self.data.as_ref().map(T::deserialize)
  }
}

impl From<EntrySnapshot> for QueryResult {
  fn from(snapshot: EntrySnapshot) -> Self {
    Self {
      data: snapshot.data,
      status: snapshot.status,
      error: snapshot.error,
      last_updated: snapshot.last_updated,
    }
  }
}

/// Entry point for views: builds queries and mutations over one store.
#[derive(Clone)]
pub struct QueryClient {
  store: CacheStore,
  transport: Arc<dyn Transport>,
}

impl QueryClient {
  pub fn new(store: CacheStore, transport: Arc<dyn Transport>) -> Self {
    Self { store, transport }
  }

  pub fn store(&self) -> &CacheStore {
    &self.store
  }

  pub(crate) fn transport(&self) -> &dyn Transport {
    self.transport.as_ref()
  }

  /// Subscribe to `descriptor` for `arg`.
  ///
  /// Starts a fetch when the entry is uninitialized, stale or errored. An
  /// entry that is already loading is joined, never fetched twice.
  pub fn use_query<A: Serialize + ?Sized>(
    &self,
    descriptor: &QueryDescriptor<A>,
    arg: &A,
  ) -> Result<Query, SyncError> {
    let key = descriptor.key(arg)?;
    let subscription = self
      .store
      .subscribe_query(&key, descriptor.request(arg), descriptor.provides);
    let receiver = self.store.watch(&key)?;

    let query = Query {
      client: self.clone(),
      subscription,
      receiver,
    };
    if query.receiver.borrow().status.wants_fetch() {
      self.start_fetch(&key);
    }
    Ok(query)
  }

  /// Warm the cache for `arg` without subscribing to it.
  pub fn prefetch<A: Serialize + ?Sized>(
    &self,
    descriptor: &QueryDescriptor<A>,
    arg: &A,
  ) -> Result<CacheKey, SyncError> {
    let key = descriptor.key(arg)?;
    self
      .store
      .register_query(&key, descriptor.request(arg), descriptor.provides);
    if self.store.snapshot(&key)?.status.wants_fetch() {
      self.start_fetch(&key);
    }
    Ok(key)
  }

  /// Spawn a fetch for `key` unless one is already in flight.
  pub(crate) fn start_fetch(&self, key: &CacheKey) -> bool {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      warn!(key = %key, "no async runtime, fetch not started");
      return false;
    };
    let Some(ticket) = self.store.begin_fetch(key) else {
      return false;
    };

    let client = self.clone();
    let key = key.clone();
    handle.spawn(async move { client.run_fetch(key, ticket).await });
    true
  }

  /// Refetch every key in `keys` that is not already loading.
  pub(crate) fn refetch_all(&self, keys: impl IntoIterator<Item = CacheKey>) {
    for key in keys {
      self.start_fetch(&key);
    }
  }

  async fn run_fetch(self, key: CacheKey, mut ticket: FetchTicket) {
    loop {
      debug!(key = %key, request = %ticket.request, "fetching");
      let result = self
        .transport
        .request(ticket.request.clone())
        .await
        .map(|response| response.data);
      if let Err(err) = &result {
        warn!(key = %key, error = %err, "fetch failed");
      }

      match self.store.complete_fetch(&key, ticket.generation, result) {
        FetchCompletion::Outdated { refetch: true } => {
          debug!(key = %key, "result outdated by invalidation, refetching");
          match self.store.begin_fetch(&key) {
            Some(next) => ticket = next,
            None => break,
          }
        }
        FetchCompletion::Evicted => {
          debug!(key = %key, "entry evicted while fetching");
          break;
        }
        FetchCompletion::Stored | FetchCompletion::Outdated { refetch: false } => break,
      }
    }
  }
}

/// A view's live subscription to one cache entry.
///
/// Dropping the query releases the subscription but does not cancel a
/// fetch in flight; other subscribers may be waiting on it.
pub struct Query {
  client: QueryClient,
  subscription: Subscription,
  receiver: watch::Receiver<EntrySnapshot>,
}

impl Query {
  pub fn key(&self) -> &CacheKey {
    self.subscription.key()
  }

  /// Current state. Reading a stale entry kicks off its refetch; the last
  /// known data is returned in the meantime.
  pub fn state(&self) -> QueryResult {
    let snapshot = self.receiver.borrow().clone();
    if snapshot.status == EntryStatus::Stale {
      self.client.start_fetch(self.key());
    }
    snapshot.into()
  }

  /// Wait for the next change to the entry.
  ///
  /// Returns `None` if the entry disappeared, which cannot happen while the
  /// query is held unless the store was misused.
  pub async fn changed(&mut self) -> Option<QueryResult> {
    if self.receiver.changed().await.is_err() {
      report_cache_miss(self.key());
      return None;
    }
    Some(self.state())
  }

  /// Wait until the entry holds a settled result, success or error.
  ///
  /// A stale entry whose fetch is held back by a pending optimistic patch
  /// is waited on, not polled; the mutation refetches it when it settles.
  pub async fn settled(&mut self) -> QueryResult {
    loop {
      let snapshot = self.receiver.borrow_and_update().clone();
      match snapshot.status {
        EntryStatus::Success | EntryStatus::Error => return snapshot.into(),
        EntryStatus::Stale | EntryStatus::Uninitialized => {
          self.client.start_fetch(self.key());
        }
        EntryStatus::Loading => {}
      }

      if self.receiver.changed().await.is_err() {
        report_cache_miss(self.key());
        return snapshot.into();
      }
    }
  }

  /// Refetch unless a fetch is already in flight.
  pub fn refetch(&self) -> bool {
    self.client.start_fetch(self.key())
  }

  /// Release the subscription now instead of on drop.
  pub fn dispose(mut self) -> Result<(), SyncError> {
    self.subscription.dispose()
  }
}

impl std::fmt::Debug for Query {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", self.key())
      .field("status", &self.receiver.borrow().status)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Tag;
  use crate::descriptor::RequestTarget;
  use crate::testing::{MockReply, MockTransport};
  use crate::transport::Method;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  const GET_CATEGORIES: QueryDescriptor<()> = QueryDescriptor {
    endpoint: "getCategories",
    method: Method::Get,
    build_request: |_| RequestTarget::path("/category/get-all-categories"),
    provides: &[Tag::Categories],
  };

  const GET_MATERIALS: QueryDescriptor<()> = QueryDescriptor {
    endpoint: "getAllMaterials",
    method: Method::Get,
    build_request: |_| RequestTarget::path("/materials/get-all-materials"),
    provides: &[Tag::Materials],
  };

  fn client_with(transport: Arc<MockTransport>) -> QueryClient {
    QueryClient::new(
      CacheStore::new().with_retention(Duration::from_secs(60)),
      transport,
    )
  }

  /// Server whose category list reflects a version counter at request time.
  fn versioned_server(version: Arc<AtomicU32>, delay: Duration) -> Arc<MockTransport> {
    MockTransport::new(move |_| {
      let v = version.load(Ordering::SeqCst);
      MockReply::ok(json!({ "version": v })).after(delay)
    })
  }

  #[tokio::test]
  async fn test_concurrent_subscribers_share_one_request() {
    let transport = MockTransport::new(|_| {
      MockReply::ok(json!({ "data": ["Rings"] })).after(Duration::from_millis(20))
    });
    let client = client_with(transport.clone());

    let mut queries: Vec<Query> = (0..5)
      .map(|_| client.use_query(&GET_CATEGORIES, &()).unwrap())
      .collect();

    for query in &mut queries {
      let result = query.settled().await;
      assert!(result.is_success());
      assert_eq!(result.data, Some(json!({ "data": ["Rings"] })));
    }
    assert_eq!(transport.count(Method::Get, "/category/get-all-categories"), 1);
    assert_eq!(
      client.store().subscriber_count(queries[0].key()),
      Some(5)
    );
  }

  #[tokio::test]
  async fn test_remount_within_retention_reuses_cache() {
    let transport = MockTransport::new(|_| MockReply::ok(json!(["Gold"])));
    let client = client_with(transport.clone());

    let mut query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    query.settled().await;
    drop(query);

    let query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    let state = query.state();
    assert!(state.is_success());
    assert_eq!(state.data, Some(json!(["Gold"])));
    assert_eq!(transport.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_stale_entry_renders_last_data_while_refetching() {
    let version = Arc::new(AtomicU32::new(1));
    let transport = versioned_server(version.clone(), Duration::from_millis(10));
    let client = client_with(transport.clone());

    let mut query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    assert_eq!(query.settled().await.data, Some(json!({ "version": 1 })));

    version.store(2, Ordering::SeqCst);
    client.store().invalidate_tags(&[Tag::Categories]);

    // Immediately after invalidation the old value is still readable
    let state = query.state();
    assert_eq!(state.data, Some(json!({ "version": 1 })));
    assert!(state.is_stale() || state.is_loading());

    let result = query.settled().await;
    assert_eq!(result.data, Some(json!({ "version": 2 })));
    assert_eq!(transport.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_stale_entry_refetches_on_next_subscription() {
    let version = Arc::new(AtomicU32::new(1));
    let transport = versioned_server(version.clone(), Duration::ZERO);
    let client = client_with(transport.clone());

    let mut query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    query.settled().await;
    drop(query);

    version.store(2, Ordering::SeqCst);
    assert!(client.store().invalidate_tags(&[Tag::Categories]).is_empty());

    let mut query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    assert_eq!(query.state().data, Some(json!({ "version": 1 })));
    assert_eq!(query.settled().await.data, Some(json!({ "version": 2 })));
    assert_eq!(transport.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_in_flight_result_is_not_trusted_after_invalidation() {
    let version = Arc::new(AtomicU32::new(1));
    let transport = versioned_server(version.clone(), Duration::from_millis(40));
    let client = client_with(transport.clone());

    let mut query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // A write lands on the server while the first read is still in flight
    version.store(2, Ordering::SeqCst);
    client.store().invalidate_tags(&[Tag::Categories]);

    let result = query.settled().await;
    assert!(result.is_success());
    assert_eq!(result.data, Some(json!({ "version": 2 })));
    assert_eq!(transport.calls().len(), 2);
  }

  #[tokio::test]
  async fn test_failed_fetch_clears_data_and_spares_other_entries() {
    let fail = Arc::new(AtomicU32::new(0));
    let fail_flag = fail.clone();
    let transport = MockTransport::new(move |request| {
      if request.path.starts_with("/category") && fail_flag.load(Ordering::SeqCst) == 1 {
        MockReply::server(500, json!({ "message": "boom" }))
      } else {
        MockReply::ok(json!(["ok"]))
      }
    });
    let client = client_with(transport.clone());

    let mut categories = client.use_query(&GET_CATEGORIES, &()).unwrap();
    let mut materials = client.use_query(&GET_MATERIALS, &()).unwrap();
    categories.settled().await;
    materials.settled().await;

    fail.store(1, Ordering::SeqCst);
    client
      .store()
      .invalidate_tags(&[Tag::Categories, Tag::Materials]);

    let categories = categories.settled().await;
    assert!(categories.is_error());
    assert_eq!(categories.data, None);
    assert_eq!(
      categories.error.as_ref().and_then(FetchError::server_message),
      Some("boom")
    );

    let materials = materials.settled().await;
    assert!(materials.is_success());
    assert_eq!(materials.data, Some(json!(["ok"])));
  }

  #[tokio::test]
  async fn test_errored_entry_refetches_for_new_subscriber() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let transport = MockTransport::new(move |_| {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        MockReply::network("connection reset")
      } else {
        MockReply::ok(json!(["back"]))
      }
    });
    let client = client_with(transport.clone());

    let mut first = client.use_query(&GET_CATEGORIES, &()).unwrap();
    let result = first.settled().await;
    assert_eq!(
      result.error,
      Some(FetchError::network("connection reset"))
    );

    let mut second = client.use_query(&GET_CATEGORIES, &()).unwrap();
    assert_eq!(second.settled().await.data, Some(json!(["back"])));
    assert!(first.state().is_success());
  }

  #[tokio::test]
  async fn test_unmount_does_not_cancel_fetch() {
    let transport = MockTransport::new(|_| {
      MockReply::ok(json!(["late"])).after(Duration::from_millis(20))
    });
    let client = client_with(transport.clone());

    let query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    let key = query.key().clone();
    query.dispose().unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let snapshot = client.store().snapshot(&key).unwrap();
    assert_eq!(snapshot.status, EntryStatus::Success);
    assert_eq!(snapshot.subscriber_count, 0);
  }

  #[tokio::test]
  async fn test_changed_reports_transitions() {
    let transport = MockTransport::new(|_| {
      MockReply::ok(json!(["x"])).after(Duration::from_millis(10))
    });
    let client = client_with(transport);

    let mut query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    let mut seen = vec![query.state().status];
    while let Some(result) = query.changed().await {
      seen.push(result.status);
      if result.is_success() {
        break;
      }
    }
    assert_eq!(seen.first(), Some(&EntryStatus::Loading));
    assert_eq!(seen.last(), Some(&EntryStatus::Success));
  }

  #[tokio::test]
  async fn test_prefetch_warms_without_subscribing() {
    let transport = MockTransport::new(|_| MockReply::ok(json!(["warm"])));
    let client = client_with(transport.clone());

    let key = client.prefetch(&GET_CATEGORIES, &()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.store().subscriber_count(&key), Some(0));

    let query = client.use_query(&GET_CATEGORIES, &()).unwrap();
    assert_eq!(query.state().data, Some(json!(["warm"])));
    assert_eq!(transport.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_prefetched_entry_without_subscribers_is_evicted() {
    let transport = MockTransport::new(|_| MockReply::ok(json!(["warm"])));
    let client = QueryClient::new(
      CacheStore::new().with_retention(Duration::from_millis(10)),
      transport,
    );

    let key = client.prefetch(&GET_CATEGORIES, &()).unwrap();
    assert!(client.store().is_indexed(&key));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!client.store().contains(&key));
    assert!(!client.store().is_indexed(&key));
    assert!(client
      .store()
      .resolve_keys_for_tags(&[Tag::Categories])
      .is_empty());
  }

  #[test]
  fn test_decode_typed_payload() {
    let result = QueryResult {
      data: Some(json!({ "id": "c1", "name": "Rings" })),
      status: EntryStatus::Success,
      error: None,
      last_updated: None,
    };

    #[derive(serde::Deserialize)]
    struct Named {
      name: String,
    }
    let named: Named = result.decode().unwrap().unwrap();
    assert_eq!(named.name, "Rings");
  }
}
