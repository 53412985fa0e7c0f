use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{non_empty, OrderStatus};
use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

/// Filters of the order table. Unset fields are left to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListArgs {
  pub search_term: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub sort: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatusChange {
  pub id: String,
  pub status: OrderStatus,
}

pub static GET_ALL_ORDERS: QueryDescriptor<OrderListArgs> = QueryDescriptor {
  endpoint: "getAllOrders",
  method: Method::Get,
  build_request: |args| {
    RequestTarget::path("/order/get-all-orders")
      .param_opt("searchTerm", non_empty(&args.search_term))
      .param_opt("page", args.page)
      .param_opt("limit", args.limit)
      .param_opt("sort", non_empty(&args.sort))
  },
  provides: &[Tag::Orders],
};

pub static GET_ORDER_DETAILS: QueryDescriptor<str> = QueryDescriptor {
  endpoint: "getOrderDetails",
  method: Method::Get,
  build_request: |id| RequestTarget::path(format!("/order/get-order-details/{}", id)),
  provides: &[Tag::Orders],
};

pub static GET_USER_ORDERS: QueryDescriptor<str> = QueryDescriptor {
  endpoint: "getUserOrders",
  method: Method::Get,
  build_request: |id| RequestTarget::path(format!("/order/get-user-orders/{}", id)),
  provides: &[Tag::Orders],
};

pub static UPDATE_ORDER_STATUS: MutationDescriptor<OrderStatusChange> = MutationDescriptor {
  endpoint: "updateOrderStatus",
  method: Method::Patch,
  build_request: |change| {
    RequestTarget::path(format!("/order/update-order-status/{}", change.id))
      .body(json!({ "status": change.status }))
  },
  invalidates: &[Tag::Orders],
};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unset_filters_send_no_params() {
    assert!(GET_ALL_ORDERS.request(&OrderListArgs::default()).params.is_empty());
  }

  #[test]
  fn test_search_term_is_trimmed() {
    let args = OrderListArgs {
      search_term: Some("  ada@example.com ".to_string()),
      sort: Some(" ".to_string()),
      ..OrderListArgs::default()
    };
    let request = GET_ALL_ORDERS.request(&args);
    assert_eq!(
      request.params,
      vec![("searchTerm".to_string(), "ada@example.com".to_string())]
    );
  }

  #[test]
  fn test_status_change_body() {
    let change = OrderStatusChange {
      id: "o-42".to_string(),
      status: OrderStatus::Delivered,
    };
    let request = UPDATE_ORDER_STATUS.request(&change);
    assert_eq!(request.path, "/order/update-order-status/o-42");
    assert_eq!(request.body, Some(json!({ "status": "DELIVERED" })));
  }
}
