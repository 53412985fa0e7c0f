use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::UpdateById;
use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogListArgs {
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

pub static GET_ADMIN_BLOGS: QueryDescriptor<BlogListArgs> = QueryDescriptor {
  endpoint: "getAdminBlogs",
  method: Method::Get,
  build_request: |args| {
    RequestTarget::path("/blog/get-all-blogs")
      .param_opt("page", args.page)
      .param_opt("limit", args.limit)
  },
  provides: &[Tag::Blogs],
};

pub static GET_USER_BLOG: QueryDescriptor<str> = QueryDescriptor {
  endpoint: "getUserBlog",
  method: Method::Get,
  build_request: |id| RequestTarget::path(format!("/blog/myblog/{}", id)),
  provides: &[Tag::Blogs],
};

pub static ADD_BLOG: MutationDescriptor<Value> = MutationDescriptor {
  endpoint: "addBlog",
  method: Method::Post,
  build_request: |form| RequestTarget::path("/blog/create-blog").body(form.clone()),
  invalidates: &[Tag::Blogs],
};

pub static UPDATE_BLOG: MutationDescriptor<UpdateById> = MutationDescriptor {
  endpoint: "updateBlog",
  method: Method::Patch,
  build_request: |update| {
    RequestTarget::path(format!("/blog/update-blog/{}", update.id)).body(update.data.clone())
  },
  invalidates: &[Tag::Blogs],
};

pub static DELETE_BLOG: MutationDescriptor<str> = MutationDescriptor {
  endpoint: "deleteBlog",
  method: Method::Delete,
  build_request: |id| RequestTarget::path(format!("/blog/delete-blog/{}", id)),
  invalidates: &[Tag::Blogs],
};
