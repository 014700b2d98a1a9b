//! Purchase gating for a product page.
//!
//! The gate borrows the aggregator and the product, so every answer is
//! computed from the current selection context; nothing is cached between
//! calls and a color, size or warehouse change is reflected immediately.

use crate::domain::aggregates::{Product, ProductVariant};
use crate::domain::value_objects::{Quantity, VariantId};
use crate::stock::aggregator::StockAggregator;

pub struct AvailabilityGate<'a> {
    product: &'a Product,
    stock: &'a StockAggregator,
}

impl<'a> AvailabilityGate<'a> {
    pub fn new(product: &'a Product, stock: &'a StockAggregator) -> Self { Self { product, stock } }

    pub fn availability(&self, variant: &VariantId) -> Quantity {
        // Maps loaded for another product never answer for this one.
        if self.stock.product() != Some(self.product.id()) {
            return Quantity::ZERO;
        }
        self.stock.availability(variant)
    }

    fn in_stock(&self, variant: &ProductVariant) -> bool { !self.availability(&variant.id).is_zero() }

    /// True iff some variant of `color` (restricted to `size` when given) is in stock.
    pub fn is_color_selectable(&self, color: &str, size: Option<&str>) -> bool {
        self.product
            .variants()
            .iter()
            .filter(|v| v.color == color && size.map_or(true, |s| v.size == s))
            .any(|v| self.in_stock(v))
    }

    /// True iff some variant of `size` (restricted to `color` when given) is in stock.
    pub fn is_size_selectable(&self, size: &str, color: Option<&str>) -> bool {
        self.product
            .variants()
            .iter()
            .filter(|v| v.size == size && color.map_or(true, |c| v.color == c))
            .any(|v| self.in_stock(v))
    }

    pub fn selectable_colors(&self, size: Option<&str>) -> Vec<&'a str> {
        self.product.colors().into_iter().filter(|c| self.is_color_selectable(c, size)).collect()
    }

    pub fn selectable_sizes(&self, color: Option<&str>) -> Vec<&'a str> {
        self.product.sizes().into_iter().filter(|s| self.is_size_selectable(s, color)).collect()
    }

    /// The variant for a full color x size choice, if the product has one.
    pub fn resolve(&self, color: &str, size: &str) -> Option<&'a ProductVariant> {
        self.product.find_variant(color, size)
    }

    pub fn can_purchase(&self, variant: &VariantId, requested: u32) -> bool {
        requested >= 1 && requested <= self.availability(variant).value()
    }

    /// Clamps into `[1, max(1, availability)]`. Never a substitute for [`Self::can_purchase`].
    pub fn clamp_quantity(&self, variant: &VariantId, desired: u32) -> u32 {
        desired.min(self.availability(variant).value()).max(1)
    }
}
