//! Resource tags and the tag → entry index used for invalidation fan-out.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::key::CacheKey;

/// Label grouping cache entries that are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
  Categories,
  Materials,
  Products,
  Blogs,
  Orders,
  Feedback,
  Customers,
}

impl Tag {
  pub const ALL: [Tag; 7] = [
    Tag::Categories,
    Tag::Materials,
    Tag::Products,
    Tag::Blogs,
    Tag::Orders,
    Tag::Feedback,
    Tag::Customers,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Tag::Categories => "Categories",
      Tag::Materials => "Materials",
      Tag::Products => "Products",
      Tag::Blogs => "Blogs",
      Tag::Orders => "Orders",
      Tag::Feedback => "Feedback",
      Tag::Customers => "Customers",
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Many-to-many mapping between tags and cache keys.
///
/// Both directions are kept so `unregister` does not have to scan every
/// bucket. Empty buckets are removed eagerly.
#[derive(Debug, Default)]
pub struct TagIndex {
  by_tag: HashMap<Tag, HashSet<CacheKey>>,
  by_key: HashMap<CacheKey, HashSet<Tag>>,
}

impl TagIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record that `key` provides `tags`. Returns true if anything was added.
  pub fn register_provides(&mut self, key: &CacheKey, tags: &[Tag]) -> bool {
    let mut added = false;
    for tag in tags {
      let inserted = self.by_tag.entry(*tag).or_default().insert(key.clone());
      if inserted {
        self.by_key.entry(key.clone()).or_default().insert(*tag);
        added = true;
      }
    }
    added
  }

  /// All keys tagged with any of `tags`.
  pub fn resolve_keys_for_tags(&self, tags: &[Tag]) -> HashSet<CacheKey> {
    tags
      .iter()
      .filter_map(|tag| self.by_tag.get(tag))
      .flat_map(|keys| keys.iter().cloned())
      .collect()
  }

  /// Remove `key` from every bucket. Returns true if it was indexed.
  pub fn unregister(&mut self, key: &CacheKey) -> bool {
    let Some(tags) = self.by_key.remove(key) else {
      return false;
    };
    for tag in tags {
      if let Some(keys) = self.by_tag.get_mut(&tag) {
        keys.remove(key);
        if keys.is_empty() {
          self.by_tag.remove(&tag);
        }
      }
    }
    true
  }

  pub fn tags_for(&self, key: &CacheKey) -> Option<&HashSet<Tag>> {
    self.by_key.get(key)
  }

  pub fn contains_key(&self, key: &CacheKey) -> bool {
    self.by_key.contains_key(key) || self.by_tag.values().any(|keys| keys.contains(key))
  }

  pub fn is_empty(&self) -> bool {
    self.by_tag.is_empty() && self.by_key.is_empty()
  }
}
