use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Product category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  #[serde(alias = "_id")]
  pub id: String,
  #[serde(alias = "name")]
  pub category_name: String,
  #[serde(default)]
  pub published: bool,
  #[serde(default)]
  pub image: Option<String>,
}

/// Material a product is made of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: String,
}

/// One size/color combination of a product with its own price and stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
  pub size: Option<String>,
  pub color: Option<String>,
  pub price: f64,
  #[serde(default)]
  pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub price: f64,
  #[serde(default)]
  pub quantity: i64,
  pub size: Option<String>,
  pub color: Option<String>,
  pub category_id: Option<String>,
  pub material_id: Option<String>,
  #[serde(default)]
  pub published: bool,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub images: Vec<String>,
  #[serde(default)]
  pub variants: Vec<ProductVariant>,
}

impl Product {
  /// Units in stock across all variants, or the base quantity when the
  /// product has none.
  pub fn total_stock(&self) -> i64 {
    if self.variants.is_empty() {
      self.quantity
    } else {
      self.variants.iter().map(|v| v.quantity).sum()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
  #[serde(alias = "_id")]
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub content: String,
  pub image: Option<String>,
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  Pending,
  Processing,
  Delivered,
  #[serde(alias = "CANCELLED")]
  Canceled,
  Unpaid,
}

impl OrderStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Processing => "PROCESSING",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Canceled => "CANCELED",
      OrderStatus::Unpaid => "UNPAID",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
  type Err = UnknownOrderStatus;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "PENDING" => Ok(OrderStatus::Pending),
      "PROCESSING" => Ok(OrderStatus::Processing),
      "DELIVERED" => Ok(OrderStatus::Delivered),
      "CANCELED" | "CANCELLED" | "CANCEL" => Ok(OrderStatus::Canceled),
      "UNPAID" => Ok(OrderStatus::Unpaid),
      _ => Err(UnknownOrderStatus(s.to_string())),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCustomer {
  pub name: Option<String>,
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  #[serde(alias = "_id")]
  pub id: String,
  pub order_time: Option<String>,
  pub customer: Option<OrderCustomer>,
  pub address: Option<String>,
  pub email: Option<String>,
  pub method: Option<String>,
  #[serde(default)]
  pub amount: f64,
  pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
  #[serde(alias = "_id")]
  pub id: String,
  pub rating: Option<u8>,
  #[serde(default)]
  pub comment: String,
  #[serde(default)]
  pub is_published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
  #[serde(alias = "_id")]
  pub id: String,
  pub name: Option<String>,
  pub email: Option<String>,
  pub phone: Option<String>,
}
