use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{non_empty, PublishToggle, UpdateById};
use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

/// Filters of the product table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductListArgs {
  pub search_term: Option<String>,
  pub status: Option<String>,
  pub page: u32,
  pub limit: u32,
  pub sort: String,
}

impl Default for ProductListArgs {
  fn default() -> Self {
    Self {
      search_term: None,
      status: None,
      page: 1,
      limit: 10,
      sort: "createdAt".to_string(),
    }
  }
}

pub static GET_ALL_PRODUCTS: QueryDescriptor<ProductListArgs> = QueryDescriptor {
  endpoint: "getAllProducts",
  method: Method::Get,
  build_request: |args| {
    RequestTarget::path("/products/get-all-products")
      .param_opt("searchTerm", non_empty(&args.search_term))
      .param_opt("status", non_empty(&args.status))
      .param("page", args.page)
      .param("limit", args.limit)
      .param("sort", &args.sort)
  },
  provides: &[Tag::Products],
};

pub static GET_SINGLE_PRODUCT: QueryDescriptor<str> = QueryDescriptor {
  endpoint: "getSingleProduct",
  method: Method::Get,
  build_request: |id| RequestTarget::path(format!("/products/get-product/{}", id)),
  provides: &[Tag::Products],
};

pub static ADD_PRODUCT: MutationDescriptor<Value> = MutationDescriptor {
  endpoint: "addProduct",
  method: Method::Post,
  build_request: |form| RequestTarget::path("/products/create-product").body(form.clone()),
  invalidates: &[Tag::Products],
};

pub static UPDATE_PRODUCT: MutationDescriptor<UpdateById> = MutationDescriptor {
  endpoint: "updateProduct",
  method: Method::Patch,
  build_request: |update| {
    RequestTarget::path(format!("/products/update-product/{}", update.id))
      .body(update.data.clone())
  },
  invalidates: &[Tag::Products],
};

pub static SET_PRODUCT_PUBLISHED: MutationDescriptor<PublishToggle> = MutationDescriptor {
  endpoint: "setProductPublished",
  method: Method::Patch,
  build_request: |toggle| {
    RequestTarget::path(format!("/products/update-product/{}", toggle.id))
      .body(json!({ "published": toggle.published }))
  },
  invalidates: &[Tag::Products],
};

pub static DELETE_PRODUCT: MutationDescriptor<str> = MutationDescriptor {
  endpoint: "deleteProduct",
  method: Method::Delete,
  build_request: |id| RequestTarget::path(format!("/products/delete-product/{}", id)),
  invalidates: &[Tag::Products],
};
