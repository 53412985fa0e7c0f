//! Serde types matching the backend's response envelope.
//!
//! Every endpoint answers `{ success, message, data }`. Some handlers
//! capitalize the payload field as `Data`; both spellings are accepted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope<T> {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(alias = "Data")]
  pub data: T,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
  #[serde(default)]
  pub data: Vec<T>,
  #[serde(default)]
  pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PageMeta {
  #[serde(default)]
  pub page: u32,
  #[serde(default)]
  pub limit: u32,
  #[serde(default)]
  pub total: u64,
}

/// Decode a cached payload into a typed value.
pub fn decode<T: DeserializeOwned>(payload: &Value) -> serde_json::Result<T> {
  T::deserialize(payload)
}

/// Decode `{ data: { data: [...], meta } }` into its page.
pub fn decode_page<T: DeserializeOwned>(payload: &Value) -> serde_json::Result<Page<T>> {
  decode::<Envelope<Page<T>>>(payload).map(|envelope| envelope.data)
}

/// List endpoints are not consistent: most page their results, a few
/// return the bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
  Items(Vec<T>),
  Page(Page<T>),
}

/// Decode the records of any list endpoint, paged or not.
pub fn decode_list<T: DeserializeOwned>(payload: &Value) -> serde_json::Result<Vec<T>> {
  decode::<Envelope<ListPayload<T>>>(payload).map(|envelope| match envelope.data {
    ListPayload::Items(items) => items,
    ListPayload::Page(page) => page.data,
  })
}

/// Decode `{ data: {...} }` into its record.
pub fn decode_record<T: DeserializeOwned>(payload: &Value) -> serde_json::Result<T> {
  decode::<Envelope<T>>(payload).map(|envelope| envelope.data)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[derive(Debug, Deserialize, PartialEq)]
  struct Named {
    id: String,
  }

  #[test]
  fn test_page_accepts_both_data_spellings() {
    let lower = json!({ "success": true, "data": { "data": [{ "id": "a" }], "meta": { "page": 1, "limit": 10, "total": 1 } } });
    let upper = json!({ "success": true, "Data": { "data": [{ "id": "a" }] } });

    let page: Page<Named> = decode_page(&lower).unwrap();
    assert_eq!(page.data, vec![Named { id: "a".into() }]);
    assert_eq!(page.meta.map(|m| m.total), Some(1));

    let page: Page<Named> = decode_page(&upper).unwrap();
    assert_eq!(page.data.len(), 1);
    assert!(page.meta.is_none());
  }

  #[test]
  fn test_record_envelope() {
    let payload = json!({ "success": true, "message": "ok", "data": { "id": "p-1" } });
    let record: Named = decode_record(&payload).unwrap();
    assert_eq!(record.id, "p-1");
  }

  #[test]
  fn test_list_accepts_bare_arrays_and_pages() {
    let bare = json!({ "success": true, "data": [{ "id": "m1" }, { "id": "m2" }] });
    let paged = json!({ "success": true, "data": { "data": [{ "id": "m1" }], "meta": { "total": 1 } } });

    assert_eq!(decode_list::<Named>(&bare).unwrap().len(), 2);
    assert_eq!(decode_list::<Named>(&paged).unwrap(), vec![Named { id: "m1".into() }]);
  }

  #[derive(Debug, Deserialize, PartialEq)]
  struct NoDefault {
    id: String,
    price: f64,
  }

  #[test]
  fn test_page_of_records_without_default() {
    let payload = json!({ "data": { "data": [{ "id": "p1", "price": 12.5 }] } });
    let page: Page<NoDefault> = decode_page(&payload).unwrap();
    assert_eq!(page.data, vec![NoDefault { id: "p1".into(), price: 12.5 }]);

    let empty = json!({ "data": { "meta": { "page": 2, "limit": 10, "total": 11 } } });
    let page: Page<NoDefault> = decode_page(&empty).unwrap();
    assert!(page.data.is_empty());
    assert_eq!(decode_list::<NoDefault>(&empty).unwrap(), Vec::new());
  }

  #[test]
  fn test_missing_payload_is_an_error() {
    assert!(decode_record::<Named>(&json!({ "success": false })).is_err());
  }
}
