use crate::cache::Tag;
use crate::descriptor::{MutationDescriptor, QueryDescriptor, RequestTarget};
use crate::transport::Method;

pub static GET_ALL_CUSTOMERS: QueryDescriptor<()> = QueryDescriptor {
  endpoint: "getAllCustomers",
  method: Method::Get,
  build_request: |_| RequestTarget::path("/order/get-all-customers"),
  provides: &[Tag::Customers],
};

/// A customer together with their orders, so it also follows order writes.
pub static GET_SINGLE_CUSTOMER: QueryDescriptor<str> = QueryDescriptor {
  endpoint: "getSingleCustomer",
  method: Method::Get,
  build_request: |id| RequestTarget::path(format!("/order/get-user-orders/{}", id)),
  provides: &[Tag::Customers, Tag::Orders],
};

pub static DELETE_CUSTOMER: MutationDescriptor<str> = MutationDescriptor {
  endpoint: "deleteCustomer",
  method: Method::Delete,
  build_request: |id| RequestTarget::path(format!("/order/delete-customer/{}", id)),
  invalidates: &[Tag::Customers],
};
