use serde_json::{json, Value};

use super::PublishToggle;
use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

pub static GET_ADMIN_FEEDBACK: QueryDescriptor<()> = QueryDescriptor {
  endpoint: "getAdminFeedback",
  method: Method::Get,
  build_request: |_| RequestTarget::path("/review/get-all-reviews/admin"),
  provides: &[Tag::Feedback],
};

pub static ADD_REVIEW: MutationDescriptor<Value> = MutationDescriptor {
  endpoint: "addReview",
  method: Method::Post,
  build_request: |form| RequestTarget::path("/review/create-review").body(form.clone()),
  invalidates: &[Tag::Feedback],
};

pub static UPDATE_REVIEW: MutationDescriptor<PublishToggle> = MutationDescriptor {
  endpoint: "updateReview",
  method: Method::Patch,
  build_request: |toggle| {
    RequestTarget::path(format!("/review/update-review/{}", toggle.id))
      .body(json!({ "isPublished": toggle.published }))
  },
  invalidates: &[Tag::Feedback],
};
