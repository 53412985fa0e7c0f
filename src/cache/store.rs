//! Keyed, reference-counted store of server responses.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntrySnapshot, EntryStatus, EntryUpdate};
use super::key::CacheKey;
use super::tags::{Tag, TagIndex};
use crate::config::CacheConfig;
use crate::error::SyncError;
use crate::transport::ApiRequest;

/// Notification delivered to store-wide listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
  /// An entry changed status or data
  Updated { key: CacheKey, status: EntryStatus },
  /// Entries were flagged stale by a mutation
  Invalidated { keys: Vec<CacheKey> },
  /// An unused entry was dropped after its retention window
  Evicted { key: CacheKey },
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Handed out by `begin_fetch`; identifies the generation a fetch started under.
#[derive(Debug, Clone)]
pub(crate) struct FetchTicket {
  pub generation: u64,
  pub request: ApiRequest,
}

/// What happened to a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchCompletion {
  Stored,
  /// Result was discarded because the entry changed while it was in flight
  Outdated { refetch: bool },
  Evicted,
}

/// How an optimistic patch is undone.
pub(crate) enum Rollback {
  Restore(Value),
  Apply(Box<dyn FnOnce(&mut Value) + Send>),
}

struct StoreInner {
  entries: HashMap<CacheKey, CacheEntry>,
  tags: TagIndex,
}

/// Single source of truth for fetched server data.
///
/// Cloning is cheap and every clone shares the same entries. Production
/// wiring builds one store per session; tests build as many as they like.
#[derive(Clone)]
pub struct CacheStore {
  inner: Arc<Mutex<StoreInner>>,
  listeners: Arc<RwLock<Vec<Listener>>>,
  retention: Duration,
  keep_data_on_error: bool,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(StoreInner {
        entries: HashMap::new(),
        tags: TagIndex::new(),
      })),
      listeners: Arc::new(RwLock::new(Vec::new())),
      retention: Duration::from_secs(60),
      keep_data_on_error: false,
    }
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new()
      .with_retention(Duration::from_secs(config.retention_secs))
      .with_keep_data_on_error(config.keep_data_on_error)
  }

  /// How long an entry without subscribers survives before eviction.
  /// Zero evicts as soon as the last subscriber leaves.
  pub fn with_retention(mut self, retention: Duration) -> Self {
    self.retention = retention;
    self
  }

  /// Keep the last good data when a fetch fails. Off by default: stock and
  /// price figures must not be shown as current after a hard error.
  pub fn with_keep_data_on_error(mut self, keep: bool) -> Self {
    self.keep_data_on_error = keep;
    self
  }

  pub fn retention(&self) -> Duration {
    self.retention
  }

  fn lock(&self) -> MutexGuard<'_, StoreInner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a callback for every store event.
  pub fn on_event(&self, listener: impl Fn(&CacheEvent) + Send + Sync + 'static) {
    self
      .listeners
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(Arc::new(listener));
  }

  fn emit(&self, event: CacheEvent) {
    // Clone the list so a listener may call back into the store.
    let listeners = self
      .listeners
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone();
    for listener in &listeners {
      listener(&event);
    }
  }

  /// Return the entry for `key`, creating it uninitialized if absent.
  ///
  /// A new entry nobody subscribes to is evicted once the retention window
  /// passes, like any other unused entry.
  pub fn get_or_create(&self, key: &CacheKey) -> EntrySnapshot {
    let (snapshot, created) = {
      let mut inner = self.lock();
      let created = !inner.entries.contains_key(key);
      let entry = inner.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
      (entry.snapshot(), created)
    };
    if created {
      self.arm_if_unused(key);
    }
    snapshot
  }

  pub fn snapshot(&self, key: &CacheKey) -> Result<EntrySnapshot, SyncError> {
    self
      .lock()
      .entries
      .get(key)
      .map(CacheEntry::snapshot)
      .ok_or_else(|| SyncError::CacheMiss(key.clone()))
  }

  /// Receiver that sees every change to the entry for `key`.
  pub fn watch(&self, key: &CacheKey) -> Result<watch::Receiver<EntrySnapshot>, SyncError> {
    self
      .lock()
      .entries
      .get(key)
      .map(CacheEntry::watch)
      .ok_or_else(|| SyncError::CacheMiss(key.clone()))
  }

  pub fn register_provides(&self, key: &CacheKey, tags: &[Tag]) {
    self.lock().tags.register_provides(key, tags);
  }

  pub fn resolve_keys_for_tags(&self, tags: &[Tag]) -> HashSet<CacheKey> {
    self.lock().tags.resolve_keys_for_tags(tags)
  }

  /// Bind a query to a concrete key: create the entry, remember how to
  /// fetch it and index its tags.
  pub(crate) fn register_query(&self, key: &CacheKey, request: ApiRequest, tags: &[Tag]) {
    let created = {
      let mut guard = self.lock();
      let inner = &mut *guard;
      let created = !inner.entries.contains_key(key);
      let entry = inner.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
      if entry.request.is_none() {
        entry.request = Some(request);
      }
      inner.tags.register_provides(key, tags);
      created
    };
    if created {
      self.arm_if_unused(key);
    }
  }

  /// Add a subscriber to `key`, creating the entry if needed.
  pub fn subscribe(&self, key: &CacheKey) -> Subscription {
    let subscribers = {
      let mut inner = self.lock();
      attach(&mut inner, key)
    };
    debug!(key = %key, subscribers, "subscribed");
    self.subscription(key)
  }

  /// `register_query` and `subscribe` under one lock, so a pending eviction
  /// cannot slip in between.
  pub(crate) fn subscribe_query(
    &self,
    key: &CacheKey,
    request: ApiRequest,
    tags: &[Tag],
  ) -> Subscription {
    let subscribers = {
      let mut guard = self.lock();
      let inner = &mut *guard;
      let subscribers = attach(inner, key);
      if let Some(entry) = inner.entries.get_mut(key) {
        if entry.request.is_none() {
          entry.request = Some(request);
        }
      }
      inner.tags.register_provides(key, tags);
      subscribers
    };
    debug!(key = %key, subscribers, "subscribed query");
    self.subscription(key)
  }

  fn subscription(&self, key: &CacheKey) -> Subscription {
    Subscription {
      store: self.clone(),
      key: key.clone(),
      disposed: false,
    }
  }

  fn release(&self, key: &CacheKey) {
    let epoch = {
      let mut inner = self.lock();
      let Some(entry) = inner.entries.get_mut(key) else {
        warn!(key = %key, "released subscription for missing entry");
        return;
      };
      if entry.subscribers == 0 {
        warn!(key = %key, "subscriber count already zero");
        return;
      }
      entry.subscribers -= 1;
      entry.publish();
      if entry.subscribers > 0 {
        return;
      }
      entry.evict_epoch
    };
    debug!(key = %key, retention = ?self.retention, "last subscriber left");
    self.schedule_eviction(key.clone(), epoch);
  }

  fn schedule_eviction(&self, key: CacheKey, epoch: u64) {
    if self.retention.is_zero() {
      self.evict_if_unused(&key, epoch);
      return;
    }

    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        let store = self.clone();
        let retention = self.retention;
        handle.spawn(async move {
          tokio::time::sleep(retention).await;
          store.evict_if_unused(&key, epoch);
        });
      }
      Err(_) => {
        debug!(key = %key, "no runtime for eviction timer, evicting now");
        self.evict_if_unused(&key, epoch);
      }
    }
  }

  /// Start a fresh retention timer for an entry that has no subscribers.
  ///
  /// Covers entries created or refreshed without ever being subscribed
  /// (prefetch, `get_or_create`). Needs a runtime; without one the entry
  /// stays until a subscriber comes and goes.
  fn arm_if_unused(&self, key: &CacheKey) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      return;
    };
    let epoch = {
      let mut inner = self.lock();
      match inner.entries.get_mut(key) {
        Some(entry) if entry.subscribers == 0 => {
          entry.evict_epoch += 1;
          entry.evict_epoch
        }
        _ => return,
      }
    };

    let store = self.clone();
    let key = key.clone();
    let retention = self.retention;
    handle.spawn(async move {
      tokio::time::sleep(retention).await;
      store.evict_if_unused(&key, epoch);
    });
  }

  /// Drop the entry if nobody subscribed since the timer for `epoch` was armed.
  fn evict_if_unused(&self, key: &CacheKey, epoch: u64) -> bool {
    let evicted = {
      let mut guard = self.lock();
      let inner = &mut *guard;
      match inner.entries.get(key) {
        Some(entry) if entry.subscribers == 0 && entry.evict_epoch == epoch => {
          inner.entries.remove(key);
          inner.tags.unregister(key);
          true
        }
        _ => false,
      }
    };

    if evicted {
      info!(key = %key, fingerprint = %key.fingerprint(), "evicted");
      self.emit(CacheEvent::Evicted { key: key.clone() });
    }
    evicted
  }

  /// Apply a status transition to an existing entry.
  pub fn update(&self, key: &CacheKey, update: EntryUpdate) -> Result<(), SyncError> {
    let status = {
      let mut inner = self.lock();
      let entry = inner
        .entries
        .get_mut(key)
        .ok_or_else(|| SyncError::CacheMiss(key.clone()))?;
      entry.apply(update, self.keep_data_on_error);
      entry.publish();
      entry.status
    };
    self.emit(CacheEvent::Updated {
      key: key.clone(),
      status,
    });
    Ok(())
  }

  /// Flag `keys` stale without clearing their data.
  ///
  /// Refetching is left to the query layer. The returned keys are the ones
  /// that are now stale and still have subscribers; entries that were
  /// loading are only marked outdated, their fetch task takes care of them.
  pub fn invalidate(&self, keys: &HashSet<CacheKey>) -> Vec<CacheKey> {
    let (mut invalidated, mut active) = (Vec::new(), Vec::new());
    {
      let mut inner = self.lock();
      for key in keys {
        let Some(entry) = inner.entries.get_mut(key) else {
          continue;
        };
        if !entry.invalidate() {
          continue;
        }
        entry.publish();
        if entry.status == EntryStatus::Stale && entry.subscribers > 0 {
          active.push(key.clone());
        }
        invalidated.push(key.clone());
      }
    }

    if !invalidated.is_empty() {
      invalidated.sort();
      active.sort();
      debug!(count = invalidated.len(), "invalidated entries");
      self.emit(CacheEvent::Invalidated { keys: invalidated });
    }
    active
  }

  /// Resolve `tags` through the index and invalidate the matching entries.
  pub fn invalidate_tags(&self, tags: &[Tag]) -> Vec<CacheKey> {
    let keys = self.resolve_keys_for_tags(tags);
    self.invalidate(&keys)
  }

  /// Move an entry to loading unless a fetch is already in flight or an
  /// optimistic patch is waiting on its mutation.
  pub(crate) fn begin_fetch(&self, key: &CacheKey) -> Option<FetchTicket> {
    let ticket = {
      let mut inner = self.lock();
      let entry = inner.entries.get_mut(key)?;
      // Results are discarded while a patch is pending; the mutation
      // refetches once it settles.
      if entry.status == EntryStatus::Loading || entry.optimistic_pending > 0 {
        return None;
      }
      let Some(request) = entry.request.clone() else {
        warn!(key = %key, "no request registered for entry");
        return None;
      };
      entry.apply(EntryUpdate::Loading, self.keep_data_on_error);
      entry.publish();
      FetchTicket {
        generation: entry.generation,
        request,
      }
    };

    self.emit(CacheEvent::Updated {
      key: key.clone(),
      status: EntryStatus::Loading,
    });
    Some(ticket)
  }

  /// Store the result of a fetch started under `generation`.
  pub(crate) fn complete_fetch(
    &self,
    key: &CacheKey,
    generation: u64,
    result: Result<Value, crate::error::FetchError>,
  ) -> FetchCompletion {
    let (completion, status, unused) = {
      let mut inner = self.lock();
      let Some(entry) = inner.entries.get_mut(key) else {
        return FetchCompletion::Evicted;
      };
      let unused = entry.subscribers == 0;

      if entry.generation != generation || entry.optimistic_pending > 0 {
        entry.status = EntryStatus::Stale;
        entry.publish();
        let refetch = entry.subscribers > 0 && entry.optimistic_pending == 0;
        (FetchCompletion::Outdated { refetch }, EntryStatus::Stale, unused)
      } else {
        let update = match result {
          Ok(data) => EntryUpdate::Success(data),
          Err(error) => EntryUpdate::Error(error),
        };
        entry.apply(update, self.keep_data_on_error);
        entry.publish();
        (FetchCompletion::Stored, entry.status, unused)
      }
    };

    self.emit(CacheEvent::Updated {
      key: key.clone(),
      status,
    });
    if unused {
      self.arm_if_unused(key);
    }
    completion
  }

  /// Patch cached data ahead of a mutation. Returns the data as it was
  /// before the patch, or `None` if there was nothing to patch.
  pub(crate) fn apply_patch(
    &self,
    key: &CacheKey,
    patch: impl FnOnce(&mut Value),
  ) -> Option<Value> {
    let (previous, status) = {
      let mut inner = self.lock();
      let entry = inner.entries.get_mut(key)?;
      let data = entry.data.as_mut()?;
      let previous = data.clone();
      patch(data);
      entry.generation += 1;
      entry.optimistic_pending += 1;
      entry.publish();
      (previous, entry.status)
    };

    self.emit(CacheEvent::Updated {
      key: key.clone(),
      status,
    });
    Some(previous)
  }

  /// The mutation behind a patch succeeded.
  pub(crate) fn confirm_patch(&self, key: &CacheKey) {
    if let Some(entry) = self.lock().entries.get_mut(key) {
      entry.optimistic_pending = entry.optimistic_pending.saturating_sub(1);
    }
  }

  /// The mutation behind a patch failed. Returns true if the entry is
  /// stale with subscribers and should be refetched.
  pub(crate) fn rollback_patch(&self, key: &CacheKey, rollback: Rollback) -> bool {
    let (refetch, status) = {
      let mut inner = self.lock();
      let Some(entry) = inner.entries.get_mut(key) else {
        return false;
      };
      entry.optimistic_pending = entry.optimistic_pending.saturating_sub(1);
      match rollback {
        Rollback::Restore(previous) => entry.data = Some(previous),
        Rollback::Apply(undo) => {
          if let Some(data) = entry.data.as_mut() {
            undo(data);
          }
        }
      }
      entry.publish();
      let refetch = entry.status == EntryStatus::Stale
        && entry.subscribers > 0
        && entry.optimistic_pending == 0;
      (refetch, entry.status)
    };

    self.emit(CacheEvent::Updated {
      key: key.clone(),
      status,
    });
    refetch
  }

  pub fn contains(&self, key: &CacheKey) -> bool {
    self.lock().entries.contains_key(key)
  }

  /// Whether `key` appears anywhere in the tag index.
  pub fn is_indexed(&self, key: &CacheKey) -> bool {
    self.lock().tags.contains_key(key)
  }

  pub fn subscriber_count(&self, key: &CacheKey) -> Option<usize> {
    self.lock().entries.get(key).map(|e| e.subscribers)
  }

  pub fn keys(&self) -> Vec<CacheKey> {
    let mut keys: Vec<CacheKey> = self.lock().entries.keys().cloned().collect();
    keys.sort();
    keys
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().entries.is_empty()
  }
}

fn attach(inner: &mut StoreInner, key: &CacheKey) -> usize {
  let entry = inner.entries.entry(key.clone()).or_insert_with(CacheEntry::new);
  entry.subscribers += 1;
  entry.evict_epoch += 1;
  entry.publish();
  entry.subscribers
}

impl fmt::Debug for CacheStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStore")
      .field("entries", &self.len())
      .field("retention", &self.retention)
      .field("keep_data_on_error", &self.keep_data_on_error)
      .finish_non_exhaustive()
  }
}

/// A live dependency of one view on one entry.
///
/// Dropping the handle releases it. `dispose` releases it explicitly;
/// disposing twice fails with `SyncError::InvalidState` and leaves the
/// subscriber count alone.
pub struct Subscription {
  store: CacheStore,
  key: CacheKey,
  disposed: bool,
}

impl Subscription {
  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed
  }

  pub fn dispose(&mut self) -> Result<(), SyncError> {
    if self.disposed {
      return Err(SyncError::InvalidState("subscription already disposed"));
    }
    self.disposed = true;
    self.store.release(&self.key);
    Ok(())
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if !self.disposed {
      let _ = self.dispose();
    }
  }
}

impl fmt::Debug for Subscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("disposed", &self.disposed)
      .finish()
  }
}
