use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque product identifier assigned by the product service.
///
/// The services may hand out numbers or strings; the value is echoed back verbatim in order
/// payloads and rendered as a path segment for `/products/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Value);

impl ProductId {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(ref s) if !s.trim().is_empty() => Some(Self(value)),
            Value::Number(_) => Some(Self(value)),
            _ => None,
        }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self {
        Self(Value::from(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock_quantity: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: f64, stock_quantity: i64) -> Self {
        Self {
            name: name.into(),
            description: "Test".into(),
            price,
            stock_quantity,
        }
    }
}

/// Body of a `201 Created` from `POST /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedProduct {
    #[serde(default)]
    pub product_id: Option<Value>,
}

/// Fields the harness reads back from `GET /products/{id}`; anything else is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub name: String,
    pub stock_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub price_at_purchase: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: i64,
    pub shipping_address: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderReceipt {
    pub status: String,
    #[serde(default)]
    pub order_id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub service: String,
}
