//! Per-key cache entry state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::FetchError;
use crate::transport::ApiRequest;

/// Lifecycle of a cache entry.
///
/// ```text
/// uninitialized --fetch--> loading --ok--> success --invalidate--> stale
///                          loading --err-> error
/// stale | error --fetch--> loading   (data kept while loading)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
  Uninitialized,
  Loading,
  Success,
  Stale,
  Error,
}

impl EntryStatus {
  /// Whether a new or reading subscriber should start a fetch.
  pub fn wants_fetch(self) -> bool {
    matches!(
      self,
      EntryStatus::Uninitialized | EntryStatus::Stale | EntryStatus::Error
    )
  }
}

/// What subscribers observe about an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
  pub status: EntryStatus,
  pub data: Option<Value>,
  pub error: Option<FetchError>,
  pub last_updated: Option<DateTime<Utc>>,
  pub subscriber_count: usize,
}

impl EntrySnapshot {
  fn uninitialized() -> Self {
    Self {
      status: EntryStatus::Uninitialized,
      data: None,
      error: None,
      last_updated: None,
      subscriber_count: 0,
    }
  }
}

/// A state transition applied through `CacheStore::update`.
#[derive(Debug, Clone)]
pub enum EntryUpdate {
  Loading,
  Success(Value),
  Error(FetchError),
}

pub(crate) struct CacheEntry {
  pub status: EntryStatus,
  pub data: Option<Value>,
  pub error: Option<FetchError>,
  pub last_updated: Option<DateTime<Utc>>,
  pub subscribers: usize,
  /// Bumped on invalidation and optimistic patches. A fetch that started
  /// under an older generation must not be trusted as fresh.
  pub generation: u64,
  /// Optimistic patches whose mutation has not settled yet.
  pub optimistic_pending: usize,
  /// Bumped on every subscribe, so eviction timers armed earlier lapse.
  pub evict_epoch: u64,
  /// Request that refreshes this entry, set when a query first resolves it.
  pub request: Option<ApiRequest>,
  notify: watch::Sender<EntrySnapshot>,
}

impl CacheEntry {
  pub fn new() -> Self {
    let (notify, _) = watch::channel(EntrySnapshot::uninitialized());
    Self {
      status: EntryStatus::Uninitialized,
      data: None,
      error: None,
      last_updated: None,
      subscribers: 0,
      generation: 0,
      optimistic_pending: 0,
      evict_epoch: 0,
      request: None,
      notify,
    }
  }

  pub fn snapshot(&self) -> EntrySnapshot {
    EntrySnapshot {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      last_updated: self.last_updated,
      subscriber_count: self.subscribers,
    }
  }

  pub fn watch(&self) -> watch::Receiver<EntrySnapshot> {
    self.notify.subscribe()
  }

  /// Push the current state to every watcher.
  pub fn publish(&self) {
    self.notify.send_replace(self.snapshot());
  }

  /// Apply a transition. `last_updated` moves on success and error only.
  pub fn apply(&mut self, update: EntryUpdate, keep_data_on_error: bool) {
    match update {
      EntryUpdate::Loading => {
        self.status = EntryStatus::Loading;
      }
      EntryUpdate::Success(data) => {
        self.status = EntryStatus::Success;
        self.data = Some(data);
        self.error = None;
        self.last_updated = Some(Utc::now());
      }
      EntryUpdate::Error(error) => {
        self.status = EntryStatus::Error;
        self.error = Some(error);
        if !keep_data_on_error {
          self.data = None;
        }
        self.last_updated = Some(Utc::now());
      }
    }
  }

  /// Flag the entry outdated. Data stays for stale-while-revalidate.
  ///
  /// A loading entry stays `Loading`: only its generation moves, so the
  /// fetch in flight completes as outdated. Its result is dropped, the
  /// entry turns `Stale`, and a subscribed entry is fetched again. The
  /// observable states are therefore `Loading` then `Stale` then `Loading`.
  ///
  /// Returns false when there was nothing to invalidate.
  pub fn invalidate(&mut self) -> bool {
    match self.status {
      EntryStatus::Uninitialized => false,
      EntryStatus::Loading => {
        self.generation += 1;
        true
      }
      EntryStatus::Success | EntryStatus::Stale | EntryStatus::Error => {
        self.generation += 1;
        self.status = EntryStatus::Stale;
        true
      }
    }
  }
}
