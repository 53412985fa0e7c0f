//! Resource clients for the storefront admin backend.
//!
//! Each submodule declares the endpoints of one resource as static
//! descriptors: what a read provides and what a write invalidates.
//! `CatalogClient` wires them to a `QueryClient` with typed helpers.

pub mod api_types;
pub mod blogs;
pub mod categories;
mod client;
pub mod customers;
pub mod materials;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod types;

pub use api_types::{Envelope, Page, PageMeta};
pub use client::CatalogClient;
pub use types::{
  Blog, Category, Customer, Material, Order, OrderCustomer, OrderStatus, Product, ProductVariant,
  Review, UnknownOrderStatus,
};

use serde::Serialize;
use serde_json::Value;

/// Argument of the generic `PATCH /<resource>/update-<resource>/{id}` writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateById {
  pub id: String,
  pub data: Value,
}

impl UpdateById {
  pub fn new(id: impl Into<String>, data: Value) -> Self {
    Self {
      id: id.into(),
      data,
    }
  }
}

/// Argument of the publish toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishToggle {
  pub id: String,
  pub published: bool,
}

impl PublishToggle {
  pub fn new(id: impl Into<String>, published: bool) -> Self {
    Self {
      id: id.into(),
      published,
    }
  }
}

/// A text filter worth sending: trimmed, and `None` when blank.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

const LIST_POINTERS: [&str; 5] = ["/data/data", "/Data/data", "/data", "/Data", ""];
const RECORD_POINTERS: [&str; 3] = ["/data", "/Data", ""];

fn record_id(record: &Value) -> Option<&str> {
  record
    .get("id")
    .or_else(|| record.get("_id"))
    .and_then(Value::as_str)
}

fn list_pointer(payload: &Value) -> Option<&'static str> {
  LIST_POINTERS
    .into_iter()
    .find(|p| payload.pointer(p).is_some_and(Value::is_array))
}

/// The record array of a cached list payload, wherever the envelope put it.
pub fn list_records_mut(payload: &mut Value) -> Option<&mut Vec<Value>> {
  let pointer = list_pointer(payload)?;
  payload.pointer_mut(pointer)?.as_array_mut()
}

/// The record with `id` in a cached payload, either inside a list or as a
/// single-record response.
pub fn find_record_mut<'a>(payload: &'a mut Value, id: &str) -> Option<&'a mut Value> {
  if list_pointer(payload).is_some() {
    return list_records_mut(payload)?
      .iter_mut()
      .find(|record| record_id(record) == Some(id));
  }

  let pointer = RECORD_POINTERS
    .into_iter()
    .find(|p| payload.pointer(p).is_some_and(|r| record_id(r) == Some(id)))?;
  payload.pointer_mut(pointer)
}

/// Patch setting `field` on the record with `id`. Payloads without that
/// record are left alone.
pub fn set_field_patch(
  id: impl Into<String>,
  field: &'static str,
  value: Value,
) -> impl FnOnce(&mut Value) + Send + 'static {
  let id = id.into();
  move |payload: &mut Value| {
    if let Some(record) = find_record_mut(payload, &id).and_then(Value::as_object_mut) {
      record.insert(field.to_string(), value);
    }
  }
}
