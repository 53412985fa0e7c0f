//! Write requests and the invalidation they drive.
//!
//! A mutation runs its request, and only on success walks the tag index and
//! marks every dependent entry stale. Entries with subscribers refetch in
//! the background. A failed mutation leaves the cache exactly as it was.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::store::Rollback;
use crate::cache::CacheKey;
use crate::descriptor::MutationDescriptor;
use crate::error::FetchError;
use crate::query::QueryClient;

type PatchFn = Box<dyn FnOnce(&mut Value) + Send>;

/// A local patch applied to one cache entry before the server answers.
///
/// If the mutation fails the patch is undone, by the supplied rollback or
/// by restoring the data exactly as it was before the patch. If it
/// succeeds the entry is refetched, so the patched value never becomes
/// final on its own.
pub struct OptimisticUpdate {
  key: CacheKey,
  patch: PatchFn,
  rollback: Option<PatchFn>,
}

impl OptimisticUpdate {
  pub fn new(key: CacheKey, patch: impl FnOnce(&mut Value) + Send + 'static) -> Self {
    Self {
      key,
      patch: Box::new(patch),
      rollback: None,
    }
  }

  pub fn with_rollback(mut self, rollback: impl FnOnce(&mut Value) + Send + 'static) -> Self {
    self.rollback = Some(Box::new(rollback));
    self
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }
}

struct AppliedPatch {
  key: CacheKey,
  rollback: Rollback,
}

impl QueryClient {
  /// Run a write and invalidate the descriptor's tags on success.
  pub async fn mutate<A: ?Sized>(
    &self,
    descriptor: &MutationDescriptor<A>,
    arg: &A,
  ) -> Result<Value, FetchError> {
    self.mutate_optimistic(descriptor, arg, Vec::new()).await
  }

  /// Like `mutate`, patching cached entries first.
  pub async fn mutate_optimistic<A: ?Sized>(
    &self,
    descriptor: &MutationDescriptor<A>,
    arg: &A,
    updates: Vec<OptimisticUpdate>,
  ) -> Result<Value, FetchError> {
    let request = descriptor.request(arg);
    let applied: Vec<AppliedPatch> = updates
      .into_iter()
      .filter_map(|update| self.apply_update(update))
      .collect();

    debug!(endpoint = descriptor.endpoint, request = %request, patches = applied.len(), "mutating");
    match self.transport().request(request).await {
      Ok(response) => {
        let mut keys = self.store().resolve_keys_for_tags(descriptor.invalidates);
        for patch in &applied {
          self.store().confirm_patch(&patch.key);
          keys.insert(patch.key.clone());
        }
        let active = self.store().invalidate(&keys);
        debug!(
          endpoint = descriptor.endpoint,
          invalidated = keys.len(),
          refetching = active.len(),
          "mutation succeeded"
        );
        self.refetch_all(active);
        Ok(response.data)
      }
      Err(err) => {
        warn!(endpoint = descriptor.endpoint, error = %err, "mutation failed");
        // Unwind in reverse so stacked patches on one entry restore cleanly
        for patch in applied.into_iter().rev() {
          if self.store().rollback_patch(&patch.key, patch.rollback) {
            self.start_fetch(&patch.key);
          }
        }
        Err(err)
      }
    }
  }

  fn apply_update(&self, update: OptimisticUpdate) -> Option<AppliedPatch> {
    let OptimisticUpdate {
      key,
      patch,
      rollback,
    } = update;

    let Some(previous) = self.store().apply_patch(&key, patch) else {
      debug!(key = %key, "nothing cached to patch");
      return None;
    };
    let rollback = match rollback {
      Some(undo) => Rollback::Apply(undo),
      None => Rollback::Restore(previous),
    };
    Some(AppliedPatch { key, rollback })
  }

  /// A reusable handle for one mutation endpoint.
  pub fn use_mutation<A: ?Sized>(
    &self,
    descriptor: &'static MutationDescriptor<A>,
  ) -> MutationHandle<A> {
    let (state, _) = watch::channel(MutationResult::idle());
    MutationHandle {
      client: self.clone(),
      descriptor,
      state,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
  Uninitialized,
  Loading,
  Success,
  Error,
}

/// Outcome of the latest trigger of a `MutationHandle`.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
  pub data: Option<Value>,
  pub status: MutationStatus,
  pub error: Option<FetchError>,
}

impl MutationResult {
  fn idle() -> Self {
    Self {
      data: None,
      status: MutationStatus::Uninitialized,
      error: None,
    }
  }
}

/// Mutation entry point for views: `trigger` plus observable state.
pub struct MutationHandle<A: ?Sized + 'static> {
  client: QueryClient,
  descriptor: &'static MutationDescriptor<A>,
  state: watch::Sender<MutationResult>,
}

impl<A: ?Sized> MutationHandle<A> {
  pub fn state(&self) -> MutationResult {
    self.state.borrow().clone()
  }

  pub fn watch(&self) -> watch::Receiver<MutationResult> {
    self.state.subscribe()
  }

  pub async fn trigger(&self, arg: &A) -> Result<Value, FetchError> {
    self.trigger_optimistic(arg, Vec::new()).await
  }

  pub async fn trigger_optimistic(
    &self,
    arg: &A,
    updates: Vec<OptimisticUpdate>,
  ) -> Result<Value, FetchError> {
    self.state.send_replace(MutationResult {
      data: None,
      status: MutationStatus::Loading,
      error: None,
    });

    let result = self
      .client
      .mutate_optimistic(self.descriptor, arg, updates)
      .await;

    self.state.send_replace(match &result {
      Ok(data) => MutationResult {
        data: Some(data.clone()),
        status: MutationStatus::Success,
        error: None,
      },
      Err(err) => MutationResult {
        data: None,
        status: MutationStatus::Error,
        error: Some(err.clone()),
      },
    });
    result
  }

  /// Forget the last outcome.
  pub fn reset(&self) {
    self.state.send_replace(MutationResult::idle());
  }
}
