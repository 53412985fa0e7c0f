use serde_json::Value;

use super::UpdateById;
use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

pub static GET_CATEGORIES: QueryDescriptor<()> = QueryDescriptor {
  endpoint: "getCategories",
  method: Method::Get,
  build_request: |_| RequestTarget::path("/category/get-all-categories"),
  provides: &[Tag::Categories],
};

pub static ADD_CATEGORY: MutationDescriptor<Value> = MutationDescriptor {
  endpoint: "addCategory",
  method: Method::Post,
  build_request: |form| RequestTarget::path("/category/create-category").body(form.clone()),
  invalidates: &[Tag::Categories],
};

pub static UPDATE_CATEGORY: MutationDescriptor<UpdateById> = MutationDescriptor {
  endpoint: "updateCategory",
  method: Method::Patch,
  build_request: |update| {
    RequestTarget::path(format!("/category/update-category/{}", update.id)).body(update.data.clone())
  },
  invalidates: &[Tag::Categories],
};

pub static DELETE_CATEGORY: MutationDescriptor<str> = MutationDescriptor {
  endpoint: "deleteCategory",
  method: Method::Delete,
  build_request: |id| RequestTarget::path(format!("/category/delete-category/{}", id)),
  invalidates: &[Tag::Categories],
};
