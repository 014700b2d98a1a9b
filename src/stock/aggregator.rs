//! Merges the total-per-variant and selected-warehouse-per-variant maps into
//! one availability view.
//!
//! Both maps arrive independently. Every fetch is issued against a
//! [`FetchTicket`] carrying the generation of the map it fills; a selection
//! change bumps the generation, so a response for an earlier product or
//! warehouse is dropped instead of overwriting the current one.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::domain::value_objects::{ProductId, Quantity, VariantId, WarehouseId};

/// Quantities by variant. A missing key means zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QuantityMap(HashMap<VariantId, Quantity>);

impl QuantityMap {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, variant: &VariantId) -> Quantity {
        self.0.get(variant).copied().unwrap_or_default()
    }

    pub fn insert(&mut self, variant: VariantId, quantity: Quantity) { self.0.insert(variant, quantity); }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Builds a map from backend-reported signed quantities, flooring negatives at zero.
    pub fn from_reported<K: Into<VariantId>>(entries: impl IntoIterator<Item = (K, i64)>) -> Self {
        Self(entries.into_iter().map(|(k, q)| (k.into(), Quantity::from_reported(q))).collect())
    }
}

impl From<HashMap<VariantId, Quantity>> for QuantityMap {
    fn from(map: HashMap<VariantId, Quantity>) -> Self { Self(map) }
}

impl FromIterator<(VariantId, Quantity)> for QuantityMap {
    fn from_iter<I: IntoIterator<Item = (VariantId, Quantity)>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapKind {
    /// Sum across all warehouses.
    Total,
    /// The selected warehouse only.
    Local,
}

/// Identifies one fetch and the selection it was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub kind: MapKind,
    pub generation: u64,
    pub product: ProductId,
    pub warehouse: Option<WarehouseId>,
}

#[derive(Clone, Debug, Default)]
enum Slot {
    #[default]
    NotLoaded,
    Loaded(QuantityMap),
}

impl Slot {
    fn get(&self, variant: &VariantId) -> Quantity {
        match self {
            Slot::NotLoaded => Quantity::ZERO,
            Slot::Loaded(map) => map.get(variant),
        }
    }
}

#[derive(Debug, Default)]
pub struct StockAggregator {
    product: Option<ProductId>,
    warehouse: Option<WarehouseId>,
    total_generation: u64,
    local_generation: u64,
    total: Slot,
    local: Slot,
}

impl StockAggregator {
    pub fn new() -> Self { Self::default() }

    pub fn product(&self) -> Option<&ProductId> { self.product.as_ref() }
    pub fn warehouse(&self) -> Option<&WarehouseId> { self.warehouse.as_ref() }

    pub fn is_loaded(&self, kind: MapKind) -> bool {
        matches!(self.slot(kind), Slot::Loaded(_))
    }

    /// Switches the product. Returns the fetches now required; empty if unchanged.
    pub fn select_product(&mut self, product: ProductId) -> Vec<FetchTicket> {
        if self.product.as_ref() == Some(&product) {
            return vec![];
        }
        self.product = Some(product);
        self.total_generation += 1;
        self.local_generation += 1;
        self.total = Slot::NotLoaded;
        self.local = Slot::NotLoaded;
        self.pending_tickets()
    }

    /// Switches (or clears) the warehouse. The total map is unaffected.
    pub fn select_warehouse(&mut self, warehouse: Option<WarehouseId>) -> Option<FetchTicket> {
        if self.warehouse == warehouse {
            return None;
        }
        self.warehouse = warehouse;
        self.local_generation += 1;
        self.local = Slot::NotLoaded;
        self.ticket(MapKind::Local)
    }

    /// Tickets for every map the current selection needs.
    pub fn pending_tickets(&self) -> Vec<FetchTicket> {
        [MapKind::Total, MapKind::Local].into_iter().filter_map(|k| self.ticket(k)).collect()
    }

    fn ticket(&self, kind: MapKind) -> Option<FetchTicket> {
        let product = self.product.clone()?;
        let generation = match kind {
            MapKind::Total => self.total_generation,
            MapKind::Local => {
                self.warehouse.as_ref()?;
                self.local_generation
            }
        };
        Some(FetchTicket { kind, generation, product, warehouse: self.warehouse.clone() })
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        let generation = match ticket.kind {
            MapKind::Total => self.total_generation,
            MapKind::Local => self.local_generation,
        };
        ticket.generation == generation && self.product.as_ref() == Some(&ticket.product)
    }

    /// Stores `map` if `ticket` still matches the selection. Returns whether it was kept.
    pub fn accept(&mut self, ticket: &FetchTicket, map: QuantityMap) -> bool {
        if !self.is_current(ticket) {
            debug!(kind = ?ticket.kind, generation = ticket.generation, product = %ticket.product, "discarding stale stock response");
            return false;
        }
        match ticket.kind {
            MapKind::Total => self.total = Slot::Loaded(map),
            MapKind::Local => self.local = Slot::Loaded(map),
        }
        true
    }

    /// Local quantity when a warehouse is selected, total otherwise. Zero when not loaded.
    pub fn availability(&self, variant: &VariantId) -> Quantity {
        match self.warehouse {
            Some(_) => self.local.get(variant),
            None => self.total.get(variant),
        }
    }

    /// Total quantity regardless of the warehouse selection.
    pub fn total_availability(&self, variant: &VariantId) -> Quantity { self.total.get(variant) }

    fn slot(&self, kind: MapKind) -> &Slot {
        match kind {
            MapKind::Total => &self.total,
            MapKind::Local => &self.local,
        }
    }
}
