use serde_json::Value;

use super::UpdateById;
use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

pub static GET_ALL_MATERIALS: QueryDescriptor<()> = QueryDescriptor {
  endpoint: "getAllMaterials",
  method: Method::Get,
  build_request: |_| RequestTarget::path("/materials/get-all-materials"),
  provides: &[Tag::Materials],
};

pub static ADD_MATERIAL: MutationDescriptor<Value> = MutationDescriptor {
  endpoint: "addMaterial",
  method: Method::Post,
  build_request: |form| RequestTarget::path("/materials/create-material").body(form.clone()),
  invalidates: &[Tag::Materials],
};

pub static UPDATE_MATERIAL: MutationDescriptor<UpdateById> = MutationDescriptor {
  endpoint: "updateMaterial",
  method: Method::Patch,
  build_request: |update| {
    RequestTarget::path(format!("/materials/update-material/{}", update.id))
      .body(update.data.clone())
  },
  invalidates: &[Tag::Materials],
};

pub static DELETE_MATERIAL: MutationDescriptor<str> = MutationDescriptor {
  endpoint: "deleteMaterial",
  method: Method::Delete,
  build_request: |id| RequestTarget::path(format!("/materials/delete-material/{}", id)),
  invalidates: &[Tag::Materials],
};
