//! Catalog client with typed reads and cache-aware writes.

use color_eyre::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use super::api_types::{decode_list, decode_page, decode_record, Page};
use super::blogs::{self, BlogListArgs};
use super::orders::{self, OrderListArgs, OrderStatusChange};
use super::products::{self, ProductListArgs};
use super::types::{Blog, Category, Customer, Material, Order, OrderStatus, Product, Review};
use super::{categories, customers, find_record_mut, materials, reviews, set_field_patch};
use super::{PublishToggle, UpdateById};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::descriptor::QueryDescriptor;
use crate::error::{FetchError, SyncError};
use crate::mutation::OptimisticUpdate;
use crate::query::QueryClient;
use crate::transport::HttpTransport;

/// Catalog operations over one shared cache.
///
/// Reads subscribe, wait for a settled result and decode it. Writes go
/// through the mutation layer, so every cached list they affect is
/// invalidated and refetched. Publish and order-status toggles patch the
/// cached records first and roll back if the server refuses.
#[derive(Clone)]
pub struct CatalogClient {
  queries: QueryClient,
}

impl CatalogClient {
  pub fn new(queries: QueryClient) -> Self {
    Self { queries }
  }

  /// Client over HTTP with the cache settings from `config`.
  pub fn from_config(config: &Config) -> Result<Self> {
    let transport = HttpTransport::from_config(config)?;
    let store = CacheStore::from_config(&config.cache);
    Ok(Self::new(QueryClient::new(store, Arc::new(transport))))
  }

  pub fn queries(&self) -> &QueryClient {
    &self.queries
  }

  /// Settled payload of `descriptor` for `arg`, served from cache when fresh.
  pub async fn read<A: Serialize + ?Sized>(
    &self,
    descriptor: &QueryDescriptor<A>,
    arg: &A,
  ) -> Result<Value, SyncError> {
    let mut query = self.queries.use_query(descriptor, arg)?;
    let result = query.settled().await;
    match (result.data, result.error) {
      (_, Some(err)) => Err(err.into()),
      (Some(data), None) => Ok(data),
      (None, None) => Err(SyncError::InvalidState("settled query has no data")),
    }
  }

  pub async fn categories(&self) -> Result<Vec<Category>, SyncError> {
    let payload = self.read(&categories::GET_CATEGORIES, &()).await?;
    Ok(decode_list(&payload)?)
  }

  pub async fn materials(&self) -> Result<Vec<Material>, SyncError> {
    let payload = self.read(&materials::GET_ALL_MATERIALS, &()).await?;
    Ok(decode_list(&payload)?)
  }

  pub async fn products(&self, args: &ProductListArgs) -> Result<Page<Product>, SyncError> {
    let payload = self.read(&products::GET_ALL_PRODUCTS, args).await?;
    Ok(decode_page(&payload)?)
  }

  pub async fn product(&self, id: &str) -> Result<Product, SyncError> {
    let payload = self.read(&products::GET_SINGLE_PRODUCT, id).await?;
    Ok(decode_record(&payload)?)
  }

  pub async fn blogs(&self, args: &BlogListArgs) -> Result<Page<Blog>, SyncError> {
    let payload = self.read(&blogs::GET_ADMIN_BLOGS, args).await?;
    Ok(decode_page(&payload)?)
  }

  pub async fn blog(&self, id: &str) -> Result<Blog, SyncError> {
    let payload = self.read(&blogs::GET_USER_BLOG, id).await?;
    Ok(decode_record(&payload)?)
  }

  pub async fn orders(&self, args: &OrderListArgs) -> Result<Vec<Order>, SyncError> {
    let payload = self.read(&orders::GET_ALL_ORDERS, args).await?;
    Ok(decode_list(&payload)?)
  }

  pub async fn order(&self, id: &str) -> Result<Order, SyncError> {
    let payload = self.read(&orders::GET_ORDER_DETAILS, id).await?;
    Ok(decode_record(&payload)?)
  }

  pub async fn user_orders(&self, user_id: &str) -> Result<Vec<Order>, SyncError> {
    let payload = self.read(&orders::GET_USER_ORDERS, user_id).await?;
    Ok(decode_list(&payload)?)
  }

  pub async fn feedback(&self) -> Result<Vec<Review>, SyncError> {
    let payload = self.read(&reviews::GET_ADMIN_FEEDBACK, &()).await?;
    Ok(decode_list(&payload)?)
  }

  pub async fn customers(&self) -> Result<Vec<Customer>, SyncError> {
    let payload = self.read(&customers::GET_ALL_CUSTOMERS, &()).await?;
    Ok(decode_list(&payload)?)
  }

  /// Orders placed by one customer.
  pub async fn customer_orders(&self, customer_id: &str) -> Result<Vec<Order>, SyncError> {
    let payload = self.read(&customers::GET_SINGLE_CUSTOMER, customer_id).await?;
    Ok(decode_list(&payload)?)
  }

  pub async fn add_category(&self, form: &Value) -> Result<Value, FetchError> {
    self.queries.mutate(&categories::ADD_CATEGORY, form).await
  }

  pub async fn update_category(&self, id: &str, data: Value) -> Result<Value, FetchError> {
    let update = UpdateById::new(id, data);
    self.queries.mutate(&categories::UPDATE_CATEGORY, &update).await
  }

  pub async fn delete_category(&self, id: &str) -> Result<Value, FetchError> {
    self.queries.mutate(&categories::DELETE_CATEGORY, id).await
  }

  pub async fn add_material(&self, form: &Value) -> Result<Value, FetchError> {
    self.queries.mutate(&materials::ADD_MATERIAL, form).await
  }

  pub async fn update_material(&self, id: &str, data: Value) -> Result<Value, FetchError> {
    let update = UpdateById::new(id, data);
    self.queries.mutate(&materials::UPDATE_MATERIAL, &update).await
  }

  pub async fn delete_material(&self, id: &str) -> Result<Value, FetchError> {
    self.queries.mutate(&materials::DELETE_MATERIAL, id).await
  }

  pub async fn add_product(&self, form: &Value) -> Result<Value, FetchError> {
    self.queries.mutate(&products::ADD_PRODUCT, form).await
  }

  pub async fn update_product(&self, id: &str, data: Value) -> Result<Value, FetchError> {
    let update = UpdateById::new(id, data);
    self.queries.mutate(&products::UPDATE_PRODUCT, &update).await
  }

  pub async fn delete_product(&self, id: &str) -> Result<Value, FetchError> {
    self.queries.mutate(&products::DELETE_PRODUCT, id).await
  }

  pub async fn add_blog(&self, form: &Value) -> Result<Value, FetchError> {
    self.queries.mutate(&blogs::ADD_BLOG, form).await
  }

  pub async fn update_blog(&self, id: &str, data: Value) -> Result<Value, FetchError> {
    let update = UpdateById::new(id, data);
    self.queries.mutate(&blogs::UPDATE_BLOG, &update).await
  }

  pub async fn delete_blog(&self, id: &str) -> Result<Value, FetchError> {
    self.queries.mutate(&blogs::DELETE_BLOG, id).await
  }

  pub async fn add_review(&self, form: &Value) -> Result<Value, FetchError> {
    self.queries.mutate(&reviews::ADD_REVIEW, form).await
  }

  pub async fn delete_customer(&self, id: &str) -> Result<Value, FetchError> {
    self.queries.mutate(&customers::DELETE_CUSTOMER, id).await
  }

  pub async fn set_product_published(&self, id: &str, published: bool) -> Result<Value, FetchError> {
    let updates = self.patch_cached(
      &[
        products::GET_ALL_PRODUCTS.endpoint,
        products::GET_SINGLE_PRODUCT.endpoint,
      ],
      id,
      "published",
      json!(published),
    );
    let toggle = PublishToggle::new(id, published);
    self
      .queries
      .mutate_optimistic(&products::SET_PRODUCT_PUBLISHED, &toggle, updates)
      .await
  }

  pub async fn set_category_published(&self, id: &str, published: bool) -> Result<Value, FetchError> {
    let updates = self.patch_cached(
      &[categories::GET_CATEGORIES.endpoint],
      id,
      "published",
      json!(published),
    );
    let update = UpdateById::new(id, json!({ "published": published }));
    self
      .queries
      .mutate_optimistic(&categories::UPDATE_CATEGORY, &update, updates)
      .await
  }

  pub async fn set_review_published(&self, id: &str, published: bool) -> Result<Value, FetchError> {
    let updates = self.patch_cached(
      &[reviews::GET_ADMIN_FEEDBACK.endpoint],
      id,
      "isPublished",
      json!(published),
    );
    let toggle = PublishToggle::new(id, published);
    self
      .queries
      .mutate_optimistic(&reviews::UPDATE_REVIEW, &toggle, updates)
      .await
  }

  pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> Result<Value, FetchError> {
    let updates = self.patch_cached(
      &[
        orders::GET_ALL_ORDERS.endpoint,
        orders::GET_ORDER_DETAILS.endpoint,
        orders::GET_USER_ORDERS.endpoint,
        customers::GET_SINGLE_CUSTOMER.endpoint,
      ],
      id,
      "status",
      json!(status),
    );
    let change = OrderStatusChange {
      id: id.to_string(),
      status,
    };
    self
      .queries
      .mutate_optimistic(&orders::UPDATE_ORDER_STATUS, &change, updates)
      .await
  }

  /// One patch per cached entry of `endpoints` that holds the record `id`.
  fn patch_cached(
    &self,
    endpoints: &[&str],
    id: &str,
    field: &'static str,
    value: Value,
  ) -> Vec<OptimisticUpdate> {
    let store = self.queries.store();
    let updates: Vec<OptimisticUpdate> = store
      .keys()
      .into_iter()
      .filter(|key| endpoints.contains(&key.endpoint()))
      .filter(|key| {
        store
          .snapshot(key)
          .ok()
          .and_then(|snapshot| snapshot.data)
          .is_some_and(|mut data| find_record_mut(&mut data, id).is_some())
      })
      .map(|key| OptimisticUpdate::new(key, set_field_patch(id, field, value.clone())))
      .collect();
    debug!(id, field, entries = updates.len(), "optimistic patches");
    updates
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheEvent, EntryStatus};
  use crate::query::QueryResult;
  use crate::testing::{MockReply, MockTransport};
  use crate::transport::Method;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  fn client_with(transport: Arc<MockTransport>) -> CatalogClient {
    CatalogClient::new(QueryClient::new(CacheStore::new(), transport))
  }

  fn paged(records: Vec<Value>) -> Value {
    let total = records.len();
    json!({
      "success": true,
      "message": "ok",
      "data": { "data": records, "meta": { "page": 1, "limit": 10, "total": total } }
    })
  }

  fn published_flag(state: &QueryResult, id: &str) -> Option<bool> {
    state.data.as_ref()?["data"]["data"]
      .as_array()?
      .iter()
      .find(|p| p["_id"] == id)?["published"]
      .as_bool()
  }

  #[tokio::test]
  async fn test_publish_toggle_never_shows_old_value() {
    let catalog: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(
      (0..10)
        .map(|i| json!({ "_id": format!("p{}", i), "name": format!("Ring {}", i), "price": 20.0, "published": false }))
        .collect(),
    ));
    let server = catalog.clone();
    let transport = MockTransport::new(move |request| match request.method {
      Method::Get => {
        MockReply::ok(paged(server.lock().unwrap().clone())).after(Duration::from_millis(40))
      }
      Method::Patch => {
        let published = request.body.as_ref().and_then(|b| b["published"].as_bool());
        let id = request.path.rsplit('/').next().unwrap_or_default().to_string();
        if let Some(product) = server.lock().unwrap().iter_mut().find(|p| p["_id"] == id.as_str()) {
          product["published"] = json!(published);
        }
        MockReply::ok(json!({ "success": true })).after(Duration::from_millis(10))
      }
      _ => MockReply::server(405, json!({})),
    });
    let client = client_with(transport.clone());

    let mut query = client
      .queries()
      .use_query(&products::GET_ALL_PRODUCTS, &ProductListArgs::default())
      .unwrap();
    let initial = query.settled().await;
    assert_eq!(published_flag(&initial, "p3"), Some(false));

    // A refetch is in flight carrying the old value when the toggle is clicked
    assert!(query.refetch());

    let mutation = client.set_product_published("p3", true);
    tokio::pin!(mutation);
    let mut seen = Vec::new();
    let result = loop {
      tokio::select! {
        biased;
        result = &mut mutation => break result,
        Some(state) = query.changed() => seen.push(published_flag(&state, "p3")),
      }
    };
    assert!(result.is_ok());

    let settled = loop {
      let state = query.settled().await;
      seen.push(published_flag(&state, "p3"));
      if state.is_success() {
        break state;
      }
    };

    assert!(!seen.is_empty());
    assert!(seen.iter().all(|flag| *flag == Some(true)), "saw {:?}", seen);
    assert_eq!(published_flag(&settled, "p3"), Some(true));
    assert_eq!(transport.count(Method::Get, "/products/get-all-products"), 3);
  }

  #[tokio::test]
  async fn test_failed_delete_leaves_categories_untouched() {
    let transport = MockTransport::new(|request| match request.method {
      Method::Get => MockReply::ok(json!({ "success": true, "data": [{ "_id": "c1", "categoryName": "Rings", "published": true }] })),
      _ => MockReply::server(409, json!({ "success": false, "message": "Category in use" })),
    });
    let client = client_with(transport.clone());
    let invalidations = Arc::new(AtomicU32::new(0));
    let counter = invalidations.clone();
    client.queries().store().on_event(move |event| {
      if matches!(event, CacheEvent::Invalidated { .. }) {
        counter.fetch_add(1, Ordering::SeqCst);
      }
    });

    let before = client.categories().await.unwrap();
    let key = categories::GET_CATEGORIES.key(&()).unwrap();
    let snapshot_before = client.queries().store().snapshot(&key).unwrap();

    let err = client.delete_category("c1").await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert_eq!(err.server_message(), Some("Category in use"));

    let snapshot_after = client.queries().store().snapshot(&key).unwrap();
    assert_eq!(snapshot_after.status, EntryStatus::Success);
    assert_eq!(snapshot_after.data, snapshot_before.data);
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    assert_eq!(client.categories().await.unwrap(), before);
    assert_eq!(transport.count(Method::Get, "/category/get-all-categories"), 1);
  }

  #[tokio::test]
  async fn test_rejected_category_toggle_rolls_back() {
    let transport = MockTransport::new(|request| match request.method {
      Method::Get => MockReply::ok(json!({ "success": true, "data": [{ "_id": "c1", "categoryName": "Rings", "published": false }] })),
      _ => MockReply::server(500, json!({ "message": "boom" })).after(Duration::from_millis(5)),
    });
    let client = client_with(transport.clone());
    let _query = client
      .queries()
      .use_query(&categories::GET_CATEGORIES, &())
      .unwrap();
    let before = client.categories().await.unwrap();

    assert!(client.set_category_published("c1", true).await.is_err());

    let key = categories::GET_CATEGORIES.key(&()).unwrap();
    let snapshot = client.queries().store().snapshot(&key).unwrap();
    assert_eq!(snapshot.status, EntryStatus::Success);
    assert_eq!(decode_list::<Category>(&snapshot.data.unwrap()).unwrap(), before);
    assert!(!before[0].published);
  }

  #[tokio::test]
  async fn test_order_status_refreshes_customer_view() {
    let status = Arc::new(Mutex::new("PENDING".to_string()));
    let server = status.clone();
    let transport = MockTransport::new(move |request| match request.method {
      Method::Get => {
        let order = json!({ "_id": "o1", "amount": 120.0, "status": server.lock().unwrap().clone() });
        MockReply::ok(json!({ "success": true, "data": [order] }))
      }
      Method::Patch => {
        if let Some(next) = request.body.as_ref().and_then(|b| b["status"].as_str()) {
          *server.lock().unwrap() = next.to_string();
        }
        MockReply::ok(json!({ "success": true }))
      }
      _ => MockReply::server(405, json!({})),
    });
    let client = client_with(transport.clone());

    let mut customer = client
      .queries()
      .use_query(&customers::GET_SINGLE_CUSTOMER, "u1")
      .unwrap();
    let mut orders = client
      .queries()
      .use_query(&orders::GET_ALL_ORDERS, &OrderListArgs::default())
      .unwrap();
    customer.settled().await;
    orders.settled().await;

    client
      .update_order_status("o1", OrderStatus::Delivered)
      .await
      .unwrap();

    for query in [&mut customer, &mut orders] {
      let state = query.settled().await;
      let records: Vec<Order> = decode_list(state.data.as_ref().unwrap()).unwrap();
      assert_eq!(records[0].status, OrderStatus::Delivered);
    }
    assert_eq!(transport.count(Method::Get, "/order/get-user-orders/u1"), 2);
    assert_eq!(transport.count(Method::Get, "/order/get-all-orders"), 2);
  }

  #[tokio::test]
  async fn test_typed_page_decode() {
    let transport = MockTransport::new(|_| {
      MockReply::ok(paged(vec![json!({
        "_id": "p1",
        "name": "Signet ring",
        "price": 80.0,
        "published": true,
        "variants": [{ "size": "7", "color": "gold", "price": 80.0, "quantity": 2 }]
      })]))
    });
    let client = client_with(transport);

    let page = client.products(&ProductListArgs::default()).await.unwrap();
    assert_eq!(page.meta.map(|m| m.total), Some(1));
    assert_eq!(page.data[0].id, "p1");
    assert_eq!(page.data[0].total_stock(), 2);
  }

  #[tokio::test]
  async fn test_read_surfaces_fetch_error() {
    let transport = MockTransport::new(|_| MockReply::network("connection refused"));
    let client = client_with(transport);

    let err = client.materials().await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(FetchError::Network { .. })));
  }
}
