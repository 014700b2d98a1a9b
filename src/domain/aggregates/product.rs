//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::value_objects::{Money, ProductId, VariantId};

/// One color x size combination. Immutable once added to a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: VariantId,
    pub color: String,
    pub size: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: ProductId,
    name: String,
    price: Money,
    #[serde(default)]
    variants: Vec<ProductVariant>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl Product {
    pub fn create(id: ProductId, name: impl Into<String>, price: Money) -> Self {
        Self { id, name: name.into(), price, variants: vec![], created_at: Utc::now() }
    }

    pub fn id(&self) -> &ProductId { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn price(&self) -> &Money { &self.price }
    pub fn variants(&self) -> &[ProductVariant] { &self.variants }

    pub fn add_variant(&mut self, variant: ProductVariant) -> Result<(), ProductError> {
        if self.variants.iter().any(|v| v.id == variant.id) {
            return Err(ProductError::DuplicateVariant(variant.id));
        }
        if self.find_variant(&variant.color, &variant.size).is_some() {
            return Err(ProductError::DuplicateCombination { color: variant.color, size: variant.size });
        }
        self.variants.push(variant);
        Ok(())
    }

    pub fn variant(&self, id: &VariantId) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    pub fn find_variant(&self, color: &str, size: &str) -> Option<&ProductVariant> {
        self.variants.iter().find(|v| v.color == color && v.size == size)
    }

    /// Distinct colors in first-seen order.
    pub fn colors(&self) -> Vec<&str> { distinct(self.variants.iter().map(|v| v.color.as_str())) }

    /// Distinct sizes in first-seen order.
    pub fn sizes(&self) -> Vec<&str> { distinct(self.variants.iter().map(|v| v.size.as_str())) }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = BTreeSet::new();
    values.filter(|v| seen.insert(*v)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("variant {0} already exists")]
    DuplicateVariant(VariantId),
    #[error("a {color}/{size} variant already exists")]
    DuplicateCombination { color: String, size: String },
}
