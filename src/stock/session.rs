//! Drives a [`StockAggregator`] from an asynchronous [`StockSource`].
//!
//! Selection changes take the lock only long enough to obtain tickets; the
//! fetches run concurrently outside it, each under a timeout, and results
//! are fed back through their tickets so late responses for an abandoned
//! selection are dropped.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::aggregates::Product;
use crate::domain::value_objects::{ProductId, Quantity, VariantId, WarehouseId};
use crate::stock::aggregator::{FetchTicket, MapKind, QuantityMap, StockAggregator};
use crate::stock::gate::AvailabilityGate;
use crate::{CoordinatorError, Result};

#[async_trait]
pub trait StockSource: Send + Sync {
    /// `variantId -> quantity` summed over every warehouse.
    async fn total_quantities(&self, product: &ProductId) -> Result<QuantityMap>;

    /// `variantId -> quantity` held in one warehouse, restricted to `product`.
    async fn warehouse_quantities(&self, warehouse: &WarehouseId, product: &ProductId) -> Result<QuantityMap>;
}

/// What became of the fetches triggered by one selection change.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub applied: usize,
    pub discarded: usize,
    pub errors: Vec<(MapKind, CoordinatorError)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool { self.errors.is_empty() }
}

pub struct AvailabilitySession<S> {
    source: Arc<S>,
    state: RwLock<StockAggregator>,
    fetch_timeout: Duration,
}

impl<S: StockSource> AvailabilitySession<S> {
    pub fn new(source: Arc<S>, fetch_timeout: Duration) -> Self {
        Self { source, state: RwLock::new(StockAggregator::new()), fetch_timeout }
    }

    #[instrument(skip(self))]
    pub async fn select_product(&self, product: ProductId) -> RefreshReport {
        let tickets = self.state.write().await.select_product(product);
        self.run(tickets).await
    }

    #[instrument(skip(self))]
    pub async fn select_warehouse(&self, warehouse: Option<WarehouseId>) -> RefreshReport {
        let ticket = self.state.write().await.select_warehouse(warehouse);
        self.run(ticket.into_iter().collect()).await
    }

    /// Re-fetches whatever the current selection needs. Used for a user-initiated retry.
    pub async fn refresh(&self) -> RefreshReport {
        let tickets = self.state.read().await.pending_tickets();
        self.run(tickets).await
    }

    pub async fn availability(&self, variant: &VariantId) -> Quantity {
        self.state.read().await.availability(variant)
    }

    /// Runs `f` against a gate bound to the current selection.
    pub async fn with_gate<R>(&self, product: &Product, f: impl FnOnce(&AvailabilityGate<'_>) -> R) -> R {
        let stock = self.state.read().await;
        f(&AvailabilityGate::new(product, &stock))
    }

    async fn run(&self, tickets: Vec<FetchTicket>) -> RefreshReport {
        let fetches = tickets.into_iter().map(|ticket| async move {
            let result = self.fetch(&ticket).await;
            (ticket, result)
        });
        let results = futures::future::join_all(fetches).await;

        let mut report = RefreshReport::default();
        let mut stock = self.state.write().await;
        for (ticket, result) in results {
            match result {
                Ok(map) => {
                    if stock.accept(&ticket, map) {
                        report.applied += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
                Err(e) if stock.is_current(&ticket) => {
                    warn!(kind = ?ticket.kind, product = %ticket.product, error = %e, "stock fetch failed");
                    report.errors.push((ticket.kind, e));
                }
                Err(e) => {
                    debug!(kind = ?ticket.kind, error = %e, "ignoring failure of stale stock fetch");
                    report.discarded += 1;
                }
            }
        }
        report
    }

    async fn fetch(&self, ticket: &FetchTicket) -> Result<QuantityMap> {
        let fetch = async {
            match (ticket.kind, &ticket.warehouse) {
                (MapKind::Total, _) => self.source.total_quantities(&ticket.product).await,
                (MapKind::Local, Some(warehouse)) => self.source.warehouse_quantities(warehouse, &ticket.product).await,
                (MapKind::Local, None) => Ok(QuantityMap::new()),
            }
        };
        tokio::time::timeout(self.fetch_timeout, fetch)
            .await
            .map_err(|_| CoordinatorError::FetchTimeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeSource {
        totals: QuantityMap,
        locals: HashMap<WarehouseId, QuantityMap>,
        hold: Option<(WarehouseId, Arc<Notify>, Arc<Notify>)>,
        fail_totals: bool,
    }

    #[async_trait]
    impl StockSource for FakeSource {
        async fn total_quantities(&self, _product: &ProductId) -> Result<QuantityMap> {
            if self.fail_totals {
                return Err(CoordinatorError::Network("connection reset".into()));
            }
            Ok(self.totals.clone())
        }

        async fn warehouse_quantities(&self, warehouse: &WarehouseId, _product: &ProductId) -> Result<QuantityMap> {
            if let Some((held, started, release)) = &self.hold {
                if held == warehouse {
                    started.notify_one();
                    release.notified().await;
                }
            }
            Ok(self.locals.get(warehouse).cloned().unwrap_or_default())
        }
    }

    fn qty(v: &str, q: i64) -> QuantityMap { QuantityMap::from_reported([(VariantId::from(v), q)]) }

    #[tokio::test]
    async fn test_slow_response_for_old_warehouse_is_dropped() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let source = FakeSource {
            totals: qty("V1", 5),
            locals: HashMap::from([(WarehouseId::from("W1"), qty("V1", 7)), (WarehouseId::from("W2"), qty("V1", 0))]),
            hold: Some(("W1".into(), started.clone(), release.clone())),
            ..Default::default()
        };
        let session = Arc::new(AvailabilitySession::new(Arc::new(source), Duration::from_secs(5)));
        assert_eq!(session.select_product("P1".into()).await.applied, 1);

        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.select_warehouse(Some("W1".into())).await })
        };
        started.notified().await;
        let fast = session.select_warehouse(Some("W2".into())).await;
        assert_eq!(fast.applied, 1);

        release.notify_one();
        let slow = slow.await.unwrap();
        assert_eq!(slow.discarded, 1);
        assert_eq!(session.availability(&"V1".into()).await, Quantity::ZERO);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_map_unloaded() {
        let source = FakeSource { fail_totals: true, ..Default::default() };
        let session = AvailabilitySession::new(Arc::new(source), Duration::from_secs(5));
        let report = session.select_product("P1".into()).await;
        assert!(!report.is_complete());
        assert!(matches!(report.errors[0], (MapKind::Total, CoordinatorError::Network(_))));
        assert_eq!(session.availability(&"V1".into()).await, Quantity::ZERO);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let release = Arc::new(Notify::new());
        let source = FakeSource { hold: Some(("W1".into(), Arc::new(Notify::new()), release)), ..Default::default() };
        let session = AvailabilitySession::new(Arc::new(source), Duration::from_millis(20));
        session.select_product("P1".into()).await;
        let report = session.select_warehouse(Some("W1".into())).await;
        assert!(matches!(report.errors[..], [(MapKind::Local, CoordinatorError::FetchTimeout)]));
    }
}
