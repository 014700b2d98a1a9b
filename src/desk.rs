//! The order desk: one coordinator owning orders, requests and stock.
//!
//! Every mutation runs under a single write lock, so a request review and the
//! order transition it causes are committed together or not at all. Domain
//! events are drained while the lock is held and published after it is
//! released.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::domain::aggregates::{
    total_quantities, Decision, Order, OrderItem, OrderStatus, PaymentMethod, Product, Request, RequestType,
    ShippingDetails, StockItem, TransitionPolicy, Warehouse,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Money, OrderId, ProductId, Quantity, Reason, RequestId, UserId, VariantId, WarehouseId};
use crate::publisher::{publish_all, EventPublisher};
use crate::stock::{AvailabilityGate, MapKind, QuantityMap, StockAggregator, StockSource};
use crate::workflow::{DuplicatePolicy, RequestFlags, RequestLedger, RequestStats};
use crate::{CoordinatorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Customer, Admin }

/// Who is performing an operation. Passed explicitly into every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: impl Into<UserId>) -> Self { Self { user_id: user_id.into(), role: Role::Customer } }
    pub fn admin(user_id: impl Into<UserId>) -> Self { Self { user_id: user_id.into(), role: Role::Admin } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(CoordinatorError::Forbidden) }
    }

    fn require_owner_or_admin(&self, order: &Order) -> Result<()> {
        if self.is_admin() || order.customer_id() == &self.user_id { Ok(()) } else { Err(CoordinatorError::Forbidden) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentOutcome { Approved, Declined }

/// External payment provider. The response is treated as opaque success or failure.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, order: &Order) -> Result<PaymentOutcome>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeskSettings {
    pub duplicate_policy: DuplicatePolicy,
    pub transition_policy: TransitionPolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub variant_id: VariantId,
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

/// Checkout payload.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub shipping_fee: Decimal,
    #[serde(default)]
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
    /// Fulfilment warehouse; stock is checked against it when given, else against the total.
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
}

#[derive(Debug, Default)]
struct DeskState {
    products: HashMap<ProductId, Product>,
    warehouses: BTreeMap<WarehouseId, Warehouse>,
    orders: HashMap<OrderId, Order>,
    ledger: RequestLedger,
}

impl DeskState {
    fn order(&self, id: &OrderId) -> Result<&Order> {
        self.orders.get(id).ok_or_else(|| CoordinatorError::NotFound(format!("order {id}")))
    }

    fn order_mut(&mut self, id: &OrderId) -> Result<&mut Order> {
        self.orders.get_mut(id).ok_or_else(|| CoordinatorError::NotFound(format!("order {id}")))
    }

    fn product_of(&self, variant: &VariantId) -> Option<&Product> {
        self.products.values().find(|p| p.variant(variant).is_some())
    }

    fn total_map(&self, product: &ProductId) -> QuantityMap {
        total_quantities(self.warehouses.values(), product).into()
    }

    fn local_map(&self, warehouse: &WarehouseId, product: &ProductId) -> Result<QuantityMap> {
        let warehouse = self
            .warehouses
            .get(warehouse)
            .ok_or_else(|| CoordinatorError::NotFound(format!("warehouse {warehouse}")))?;
        Ok(warehouse.quantities_for(product).into())
    }

    /// Stock view for one product as a storefront page would see it.
    fn stock_view(&self, product: &ProductId, warehouse: Option<&WarehouseId>) -> Result<StockAggregator> {
        let mut stock = StockAggregator::new();
        stock.select_warehouse(warehouse.cloned());
        for ticket in stock.select_product(product.clone()) {
            let map = match &ticket.warehouse {
                Some(w) if ticket.kind == MapKind::Local => self.local_map(w, product)?,
                _ => self.total_map(product),
            };
            stock.accept(&ticket, map);
        }
        Ok(stock)
    }

    fn drain_events(&mut self) -> Vec<DomainEvent> {
        let mut events = self.ledger.take_events();
        for order in self.orders.values_mut() {
            events.extend(order.take_events());
        }
        for warehouse in self.warehouses.values_mut() {
            events.extend(warehouse.take_events());
        }
        events
    }
}

pub struct OrderDesk {
    state: RwLock<DeskState>,
    transition_policy: TransitionPolicy,
    publisher: Arc<dyn EventPublisher>,
    payments: Option<Arc<dyn PaymentGateway>>,
}

impl OrderDesk {
    pub fn new(settings: DeskSettings, publisher: Arc<dyn EventPublisher>) -> Self {
        let state = DeskState { ledger: RequestLedger::new(settings.duplicate_policy), ..Default::default() };
        Self { state: RwLock::new(state), transition_policy: settings.transition_policy, publisher, payments: None }
    }

    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(gateway);
        self
    }

    pub async fn register_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id().clone(), product);
    }

    pub async fn register_warehouse(&self, mut warehouse: Warehouse) {
        warehouse.take_events();
        self.state.write().await.warehouses.insert(warehouse.id().clone(), warehouse);
    }

    async fn publish(&self, events: Vec<DomainEvent>) {
        publish_all(self.publisher.as_ref(), events).await;
    }

    // -------------------------------------------------------------------------
    // Stock
    // -------------------------------------------------------------------------

    pub async fn product(&self, id: &ProductId) -> Result<Product> {
        let state = self.state.read().await;
        state.products.get(id).cloned().ok_or_else(|| CoordinatorError::NotFound(format!("product {id}")))
    }

    pub async fn total_quantities(&self, product: &ProductId) -> Result<QuantityMap> {
        let state = self.state.read().await;
        if !state.products.contains_key(product) {
            return Err(CoordinatorError::NotFound(format!("product {product}")));
        }
        Ok(state.total_map(product))
    }

    pub async fn warehouse_items(&self, warehouse: &WarehouseId) -> Result<Vec<StockItem>> {
        let state = self.state.read().await;
        state
            .warehouses
            .get(warehouse)
            .map(Warehouse::items)
            .ok_or_else(|| CoordinatorError::NotFound(format!("warehouse {warehouse}")))
    }

    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn set_stock(&self, actor: &Actor, warehouse: &WarehouseId, variant: &VariantId, quantity: Quantity) -> Result<()> {
        actor.require_admin()?;
        let events = {
            let mut state = self.state.write().await;
            let product = state
                .product_of(variant)
                .map(|p| p.id().clone())
                .ok_or_else(|| CoordinatorError::NotFound(format!("variant {variant}")))?;
            let w = state
                .warehouses
                .get_mut(warehouse)
                .ok_or_else(|| CoordinatorError::NotFound(format!("warehouse {warehouse}")))?;
            w.set_quantity(product, variant.clone(), quantity);
            state.drain_events()
        };
        info!(%warehouse, %variant, %quantity, "stock quantity set");
        self.publish(events).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self, actor, new_order), fields(user = %actor.user_id))]
    pub async fn place_order(&self, actor: &Actor, new_order: NewOrder) -> Result<Order> {
        new_order.validate()?;
        for line in &new_order.items {
            line.validate()?;
        }
        let (order, events) = {
            let mut state = self.state.write().await;
            let mut requested: BTreeMap<&VariantId, u32> = BTreeMap::new();
            for line in &new_order.items {
                let total = requested.entry(&line.variant_id).or_default();
                *total = total.saturating_add(line.quantity);
            }
            for (variant, quantity) in &requested {
                let product = state
                    .product_of(variant)
                    .ok_or_else(|| CoordinatorError::NotFound(format!("variant {variant}")))?;
                let stock = state.stock_view(product.id(), new_order.warehouse_id.as_ref())?;
                if !AvailabilityGate::new(product, &stock).can_purchase(variant, *quantity) {
                    return Err(CoordinatorError::Validation(format!(
                        "only {} of {} left in stock",
                        stock.availability(variant),
                        product.name()
                    )));
                }
            }
            let mut items = Vec::with_capacity(new_order.items.len());
            for line in &new_order.items {
                let product = state
                    .product_of(&line.variant_id)
                    .ok_or_else(|| CoordinatorError::NotFound(format!("variant {}", line.variant_id)))?;
                items.push(OrderItem::new(product.id().clone(), line.variant_id.clone(), product.name(), line.quantity, product.price().clone()));
            }
            let currency = items.first().map(|i| i.unit_price.currency().to_string()).unwrap_or_else(|| "USD".into());
            let mut order = Order::place(
                actor.user_id.clone(),
                items,
                Money::new(new_order.discount, &currency),
                Money::new(new_order.shipping_fee, &currency),
                new_order.shipping,
                new_order.payment_method,
            )?;
            let events = order.take_events();
            state.orders.insert(order.id().clone(), order.clone());
            (order, events)
        };
        info!(order_id = %order.id(), status = %order.status(), "order placed");
        self.publish(events).await;
        Ok(order)
    }

    pub async fn order(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let state = self.state.read().await;
        let order = state.order(id)?;
        actor.require_owner_or_admin(order)?;
        Ok(order.clone())
    }

    /// Administrator status write; only allow-listed targets are accepted.
    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn update_status(&self, actor: &Actor, id: &OrderId, status: OrderStatus) -> Result<Order> {
        actor.require_admin()?;
        let (order, events) = {
            let mut state = self.state.write().await;
            let order = state.order_mut(id)?;
            order.assign_status(status, self.transition_policy)?;
            let snapshot = order.clone();
            (snapshot, state.drain_events())
        };
        info!(order_id = %id, %status, "order status updated");
        self.publish(events).await;
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    #[instrument(skip(self, actor, reason), fields(user = %actor.user_id))]
    pub async fn file_request(&self, actor: &Actor, order_id: &OrderId, kind: RequestType, reason: &str) -> Result<Request> {
        let reason = Reason::new(reason)?;
        let (request, events) = {
            let mut state = self.state.write().await;
            let order = state.order(order_id)?.clone();
            if order.customer_id() != &actor.user_id {
                return Err(CoordinatorError::Forbidden);
            }
            let request = state.ledger.file(&order, actor.user_id.clone(), kind, reason)?;
            if kind == RequestType::Return {
                state.order_mut(order_id)?.mark_return_requested()?;
            }
            (request, state.drain_events())
        };
        self.publish(events).await;
        Ok(request)
    }

    pub async fn requests_for_order(&self, actor: &Actor, order_id: &OrderId) -> Result<Vec<Request>> {
        let state = self.state.read().await;
        actor.require_owner_or_admin(state.order(order_id)?)?;
        Ok(state.ledger.for_order(order_id).into_iter().cloned().collect())
    }

    pub async fn request_flags(&self, actor: &Actor, order_id: &OrderId) -> Result<RequestFlags> {
        let state = self.state.read().await;
        actor.require_owner_or_admin(state.order(order_id)?)?;
        Ok(state.ledger.flags(order_id))
    }

    pub async fn all_requests(&self, actor: &Actor) -> Result<Vec<Request>> {
        actor.require_admin()?;
        Ok(self.state.read().await.ledger.all().into_iter().cloned().collect())
    }

    pub async fn request_stats(&self, actor: &Actor) -> Result<RequestStats> {
        actor.require_admin()?;
        Ok(self.state.read().await.ledger.stats())
    }

    /// Reviews a request and applies its order-side effect in one step:
    /// an approved CANCEL cancels the order, a rejected RETURN restores `DELIVERED`.
    #[instrument(skip(self, actor, admin_note), fields(user = %actor.user_id))]
    pub async fn review_request(&self, actor: &Actor, id: &RequestId, decision: Decision, admin_note: Option<String>) -> Result<Request> {
        actor.require_admin()?;
        let (request, events) = {
            let mut state = self.state.write().await;
            let order_id = state.ledger.get(id)?.order_id().clone();
            let mut order = state.order(&order_id)?.clone();
            let request = state.ledger.review_with(id, decision, admin_note, |decided| {
                match (decided.kind(), decision) {
                    (RequestType::Cancel, Decision::Approved) => order.cancel_for_request(decided.id().clone())?,
                    (RequestType::Return, Decision::Rejected) => order.withdraw_return(),
                    _ => {}
                }
                Ok(())
            })?;
            state.orders.insert(order_id, order);
            (request, state.drain_events())
        };
        self.publish(events).await;
        Ok(request)
    }

    pub async fn edit_note(&self, actor: &Actor, id: &RequestId, note: &str) -> Result<Request> {
        actor.require_admin()?;
        let (request, events) = {
            let mut state = self.state.write().await;
            let request = state.ledger.edit_note(id, note)?;
            (request, state.drain_events())
        };
        self.publish(events).await;
        Ok(request)
    }

    // -------------------------------------------------------------------------
    // Payment
    // -------------------------------------------------------------------------

    /// Hands an `AWAITING_PAYMENT` order to the payment collaborator. The lock
    /// is not held while the collaborator runs.
    #[instrument(skip(self, actor), fields(user = %actor.user_id))]
    pub async fn start_payment(&self, actor: &Actor, id: &OrderId) -> Result<Order> {
        let gateway = self
            .payments
            .clone()
            .ok_or_else(|| CoordinatorError::PaymentUnsupported("no payment provider is configured".into()))?;
        let order = self.order(actor, id).await?;
        order.ensure_payable()?;

        let outcome = gateway.initiate(&order).await?;
        let settled = self.settle(id, outcome == PaymentOutcome::Approved).await?;
        if outcome == PaymentOutcome::Declined {
            warn!(order_id = %id, "payment declined");
            return Err(CoordinatorError::PaymentDeclined);
        }
        Ok(settled)
    }

    /// Result reported back by the payment provider.
    pub async fn payment_callback(&self, actor: &Actor, id: &OrderId, success: bool) -> Result<Order> {
        actor.require_admin()?;
        self.settle(id, success).await
    }

    async fn settle(&self, id: &OrderId, success: bool) -> Result<Order> {
        let (order, events) = {
            let mut state = self.state.write().await;
            let order = state.order_mut(id)?;
            order.settle_payment(success)?;
            let snapshot = order.clone();
            (snapshot, state.drain_events())
        };
        self.publish(events).await;
        Ok(order)
    }
}

#[async_trait]
impl StockSource for OrderDesk {
    async fn total_quantities(&self, product: &ProductId) -> Result<QuantityMap> {
        OrderDesk::total_quantities(self, product).await
    }

    async fn warehouse_quantities(&self, warehouse: &WarehouseId, product: &ProductId) -> Result<QuantityMap> {
        self.state.read().await.local_map(warehouse, product)
    }
}
