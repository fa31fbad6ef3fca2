//! The product resource.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::middleware::{FieldError, Validate};

/// SKUs look like `abc-def-ghi`.
static SKU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+-[a-z]+-[a-z]+$").expect("valid SKU pattern"));

/// A coffee-shop product. Prices are stored in the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Assigned by the store; ignored on create, taken from the path on update.
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub sku: String,
}

impl Validate for Product {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "is required"));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            errors.push(FieldError::new("price", "must be greater than 0"));
        }
        if self.sku.is_empty() {
            errors.push(FieldError::new("sku", "is required"));
        } else if !SKU.is_match(&self.sku) {
            errors.push(FieldError::new("sku", "must look like abc-def-ghi"));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
