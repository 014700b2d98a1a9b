//! Warehouse Aggregate ("stock" on the wire)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::events::{DomainEvent, StockEvent};
use crate::domain::value_objects::{ProductId, Quantity, VariantId, WarehouseId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    id: WarehouseId,
    name: String,
    #[serde(default)]
    entries: Vec<StockEntry>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Wire shape of `GET /api/stocks/{stockId}/items`: one item per product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub product_id: ProductId,
    #[serde(default)]
    pub variants: Vec<StockItemVariant>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItemVariant {
    pub id: VariantId,
    #[serde(default)]
    pub quantity: i64,
}

impl Warehouse {
    pub fn new(id: WarehouseId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), entries: vec![], events: vec![] }
    }

    pub fn id(&self) -> &WarehouseId { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn entries(&self) -> &[StockEntry] { &self.entries }

    pub fn set_quantity(&mut self, product_id: ProductId, variant_id: VariantId, quantity: Quantity) {
        match self.entries.iter_mut().find(|e| e.variant_id == variant_id) {
            Some(entry) => entry.quantity = quantity,
            None => self.entries.push(StockEntry { product_id, variant_id: variant_id.clone(), quantity }),
        }
        self.events.push(DomainEvent::Stock(StockEvent::QuantitySet { warehouse_id: self.id.clone(), variant_id, quantity }));
    }

    /// Local quantity; zero when the warehouse holds no entry for the variant.
    pub fn quantity_of(&self, variant_id: &VariantId) -> Quantity {
        self.entries.iter().find(|e| &e.variant_id == variant_id).map(|e| e.quantity).unwrap_or_default()
    }

    pub fn quantities_for(&self, product_id: &ProductId) -> HashMap<VariantId, Quantity> {
        self.entries
            .iter()
            .filter(|e| &e.product_id == product_id)
            .map(|e| (e.variant_id.clone(), e.quantity))
            .collect()
    }

    pub fn items(&self) -> Vec<StockItem> {
        let mut by_product: BTreeMap<&ProductId, Vec<StockItemVariant>> = BTreeMap::new();
        for e in &self.entries {
            by_product
                .entry(&e.product_id)
                .or_default()
                .push(StockItemVariant { id: e.variant_id.clone(), quantity: i64::from(e.quantity.value()) });
        }
        by_product
            .into_iter()
            .map(|(product_id, variants)| StockItem { product_id: product_id.clone(), variants })
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
}

/// Sum of each variant's quantity across every warehouse.
pub fn total_quantities<'a>(warehouses: impl IntoIterator<Item = &'a Warehouse>, product_id: &ProductId) -> HashMap<VariantId, Quantity> {
    let mut totals: HashMap<VariantId, Quantity> = HashMap::new();
    for (variant, qty) in warehouses.into_iter().flat_map(|w| w.quantities_for(product_id)) {
        let slot = totals.entry(variant).or_default();
        *slot = slot.add(qty);
    }
    totals
}
