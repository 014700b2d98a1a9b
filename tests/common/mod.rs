//! Shared fixtures: one product (three variants) stocked in two warehouses.
#![allow(dead_code)]

use rust_decimal_macros::dec;
use std::sync::Arc;

use storefront_orders::desk::{Actor, DeskSettings, NewOrder, NewOrderItem, OrderDesk};
use storefront_orders::domain::aggregates::{
    Order, OrderStatus, PaymentMethod, Product, ProductVariant, ShippingDetails, Warehouse,
};
use storefront_orders::domain::value_objects::{Money, ProductId, Quantity, VariantId, WarehouseId};
use storefront_orders::publisher::MemoryPublisher;

pub const CUSTOMER: &str = "U1";
pub const OTHER_CUSTOMER: &str = "U2";
pub const ADMIN: &str = "A1";

pub fn customer() -> Actor { Actor::customer(CUSTOMER) }
pub fn other_customer() -> Actor { Actor::customer(OTHER_CUSTOMER) }
pub fn admin() -> Actor { Actor::admin(ADMIN) }

pub fn product_id() -> ProductId { ProductId::from("P1") }
pub fn red_m() -> VariantId { VariantId::from("V1") }
pub fn red_l() -> VariantId { VariantId::from("V2") }
pub fn blue_m() -> VariantId { VariantId::from("V3") }

/// Tee in Red/M, Red/L and Blue/M.
pub fn catalog() -> Product {
    let mut product = Product::create(product_id(), "Tee", Money::usd(dec!(19.99)));
    for (id, color, size) in [("V1", "Red", "M"), ("V2", "Red", "L"), ("V3", "Blue", "M")] {
        product
            .add_variant(ProductVariant { id: id.into(), color: color.into(), size: size.into() })
            .expect("fixture variants are distinct");
    }
    product
}

/// W1 holds no Red/M and 3 Red/L; W2 holds 5 Red/M. Blue/M is stocked nowhere.
pub fn warehouses() -> Vec<Warehouse> {
    let mut w1 = Warehouse::new(WarehouseId::from("W1"), "North");
    w1.set_quantity(product_id(), red_m(), Quantity::ZERO);
    w1.set_quantity(product_id(), red_l(), Quantity::new(3));
    let mut w2 = Warehouse::new(WarehouseId::from("W2"), "South");
    w2.set_quantity(product_id(), red_m(), Quantity::new(5));
    vec![w1, w2]
}

pub async fn desk_with(settings: DeskSettings) -> (Arc<OrderDesk>, Arc<MemoryPublisher>) {
    let publisher = Arc::new(MemoryPublisher::default());
    let desk = OrderDesk::new(settings, publisher.clone());
    desk.register_product(catalog()).await;
    for w in warehouses() {
        desk.register_warehouse(w).await;
    }
    (Arc::new(desk), publisher)
}

pub async fn desk() -> (Arc<OrderDesk>, Arc<MemoryPublisher>) { desk_with(DeskSettings::default()).await }

pub fn new_order(variant: VariantId, quantity: u32, payment_method: PaymentMethod) -> NewOrder {
    NewOrder {
        items: vec![NewOrderItem { variant_id: variant, quantity }],
        discount: dec!(0),
        shipping_fee: dec!(2.50),
        shipping: ShippingDetails {
            recipient: "Ada".into(),
            phone: "555-0100".into(),
            address: "1 Main St".into(),
            ..Default::default()
        },
        payment_method,
        warehouse_id: None,
    }
}

/// A cash-on-delivery order for one Red/L, owned by [`CUSTOMER`], in `PENDING`.
pub async fn pending_order(desk: &OrderDesk) -> Order {
    desk.place_order(&customer(), new_order(red_l(), 1, PaymentMethod::CashOnDelivery))
        .await
        .expect("order placed")
}

pub async fn delivered_order(desk: &OrderDesk) -> Order {
    let order = pending_order(desk).await;
    let order = desk.update_status(&admin(), order.id(), OrderStatus::Delivered).await.expect("delivered");
    assert_eq!(order.status(), OrderStatus::Delivered);
    order
}
