//! Property-based tests for availability and purchase gating.

mod common;

use common::*;
use proptest::prelude::*;
use storefront_orders::domain::value_objects::WarehouseId;
use storefront_orders::stock::{AvailabilityGate, MapKind, QuantityMap, StockAggregator};

/// Aggregator for the fixture product with the given Red/M quantities loaded.
fn loaded(total: i64, local: Option<i64>) -> StockAggregator {
    let mut stock = StockAggregator::new();
    stock.select_warehouse(local.map(|_| WarehouseId::from("W1")));
    for ticket in stock.select_product(product_id()) {
        let reported = match ticket.kind {
            MapKind::Total => total,
            MapKind::Local => local.unwrap_or_default(),
        };
        stock.accept(&ticket, QuantityMap::from_reported([(red_m(), reported)]));
    }
    stock
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn reported_quantities_never_go_negative(total in -1_000i64..1_000, local in proptest::option::of(-1_000i64..1_000)) {
        let stock = loaded(total, local);
        let expected = local.unwrap_or(total).max(0) as u32;
        prop_assert_eq!(stock.availability(&red_m()).value(), expected);
    }

    #[test]
    fn can_purchase_iff_within_availability(total in 0i64..50, local in proptest::option::of(0i64..50), requested in 0u32..60) {
        let product = catalog();
        let stock = loaded(total, local);
        let gate = AvailabilityGate::new(&product, &stock);
        let available = gate.availability(&red_m()).value();
        prop_assert_eq!(gate.can_purchase(&red_m(), requested), requested >= 1 && requested <= available);
    }

    #[test]
    fn clamped_quantity_stays_in_range(total in 0i64..50, desired in 0u32..100) {
        let product = catalog();
        let stock = loaded(total, None);
        let gate = AvailabilityGate::new(&product, &stock);
        let clamped = gate.clamp_quantity(&red_m(), desired);
        prop_assert!(clamped >= 1);
        prop_assert!(clamped <= (total as u32).max(1));
    }

    #[test]
    fn stale_total_is_discarded_after_product_switch(first in 0i64..50, second in 0i64..50) {
        let mut stock = StockAggregator::new();
        let stale = stock.select_product(product_id());
        let fresh = stock.select_product("P2".into());
        let fresh_total = fresh.iter().find(|t| t.kind == MapKind::Total).cloned();

        for ticket in &stale {
            prop_assert!(!stock.accept(ticket, QuantityMap::from_reported([(red_m(), first)])));
        }
        if let Some(ticket) = fresh_total {
            prop_assert!(stock.accept(&ticket, QuantityMap::from_reported([(red_m(), second)])));
        }
        prop_assert_eq!(i64::from(stock.availability(&red_m()).value()), second.max(0));
    }
}
