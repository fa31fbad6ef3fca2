//! Product storage.
//!
//! Handlers only see [`ProductStore`]. [`InMemoryProducts`] is the store the
//! binary runs with: a seeded list behind a lock, with prices converted
//! through a [`CurrencyConverter`] on read.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::currency::{CurrencyConverter, CurrencyError};
use crate::product::Product;

/// Currency all stored prices are expressed in.
pub const BASE_CURRENCY: &str = "EUR";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("product {0} not found")]
    NotFound(u64),

    #[error(transparent)]
    Currency(#[from] CurrencyError),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// All products, priced in `currency` when given, otherwise in the base
    /// currency.
    async fn list(&self, currency: Option<&str>) -> Result<Vec<Product>, StoreError>;

    async fn get(&self, id: u64, currency: Option<&str>) -> Result<Product, StoreError>;

    /// Stores a new product and returns it with its assigned id.
    async fn add(&self, product: Product) -> Result<Product, StoreError>;

    /// Replaces product `id`; the stored id is always `id`.
    async fn update(&self, id: u64, product: Product) -> Result<Product, StoreError>;

    async fn delete(&self, id: u64) -> Result<(), StoreError>;
}

struct Inventory {
    products: Vec<Product>,
    next_id: u64,
}

/// Process-local product list. Contents are lost on exit.
pub struct InMemoryProducts {
    inventory: RwLock<Inventory>,
    currency: Arc<dyn CurrencyConverter>,
}

impl InMemoryProducts {
    /// The menu the service starts with.
    pub fn seeded(currency: Arc<dyn CurrencyConverter>) -> Self {
        Self::with_products(
            currency,
            vec![
                Product {
                    id: 1,
                    name: "Latte".into(),
                    description: "Frothy milky coffee".into(),
                    price: 2.45,
                    sku: "abc-def-ghi".into(),
                },
                Product {
                    id: 2,
                    name: "Espresso".into(),
                    description: "Short and strong coffee without milk".into(),
                    price: 1.99,
                    sku: "fjd-jdf-jfd".into(),
                },
            ],
        )
    }

    pub fn with_products(currency: Arc<dyn CurrencyConverter>, products: Vec<Product>) -> Self {
        let next_id = products.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        Self { inventory: RwLock::new(Inventory { products, next_id }), currency }
    }

    /// Multiplier from the base currency to `currency`; `1.0` when none.
    ///
    /// An explicit currency always goes to the converter, even the base one,
    /// so the service's quoted rate is what the client sees.
    async fn rate(&self, currency: Option<&str>) -> Result<f64, StoreError> {
        match currency {
            Some(target) => Ok(self.currency.rate(BASE_CURRENCY, target).await?),
            None => Ok(1.0),
        }
    }
}

fn priced(mut product: Product, rate: f64) -> Product {
    product.price *= rate;
    product
}

#[async_trait]
impl ProductStore for InMemoryProducts {
    async fn list(&self, currency: Option<&str>) -> Result<Vec<Product>, StoreError> {
        // The rate is fetched before taking the lock; the lock is never held
        // across the RPC.
        let rate = self.rate(currency).await?;
        let products = self.inventory.read().products.clone();
        Ok(products.into_iter().map(|p| priced(p, rate)).collect())
    }

    async fn get(&self, id: u64, currency: Option<&str>) -> Result<Product, StoreError> {
        let product = self.inventory.read()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;
        let rate = self.rate(currency).await?;
        Ok(priced(product, rate))
    }

    async fn add(&self, mut product: Product) -> Result<Product, StoreError> {
        let mut inventory = self.inventory.write();
        product.id = inventory.next_id;
        inventory.next_id += 1;
        inventory.products.push(product.clone());
        Ok(product)
    }

    async fn update(&self, id: u64, mut product: Product) -> Result<Product, StoreError> {
        let mut inventory = self.inventory.write();
        let slot = inventory.products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;
        product.id = id;
        *slot = product.clone();
        Ok(product)
    }

    async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let mut inventory = self.inventory.write();
        let index = inventory.products
            .iter()
            .position(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;
        inventory.products.remove(index);
        Ok(())
    }
}
