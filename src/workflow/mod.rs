//! Customer cancel/return requests and their admin review.
//!
//! The ledger reads an order's status to decide whether a request may be
//! filed but never changes the order; the desk applies order-side effects
//! through the hook passed to [`RequestLedger::review_with`].

use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::info;

use crate::domain::aggregates::{Decision, Order, Request, RequestStatus, RequestType};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{OrderId, Reason, RequestId, UserId};
use crate::{CoordinatorError, Result};

/// Which existing requests block filing another of the same type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Any earlier request, rejected ones included.
    #[default]
    AnyExisting,
    /// Only a pending or approved request; a rejected one may be resubmitted.
    ActiveOnly,
}

impl DuplicatePolicy {
    pub fn blocks(&self, existing: &Request) -> bool {
        match self {
            Self::AnyExisting => true,
            Self::ActiveOnly => existing.status() != RequestStatus::Rejected,
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any-existing" | "any_existing" => Ok(Self::AnyExisting),
            "active-only" | "active_only" => Ok(Self::ActiveOnly),
            other => Err(format!("unknown duplicate policy `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFlags {
    pub has_cancel_request: bool,
    pub has_return_request: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Default)]
pub struct RequestLedger {
    policy: DuplicatePolicy,
    requests: HashMap<RequestId, Request>,
    by_order: HashMap<OrderId, Vec<RequestId>>,
    events: Vec<DomainEvent>,
}

impl RequestLedger {
    pub fn new(policy: DuplicatePolicy) -> Self { Self { policy, ..Default::default() } }

    pub fn policy(&self) -> DuplicatePolicy { self.policy }

    pub fn get(&self, id: &RequestId) -> Result<&Request> {
        self.requests.get(id).ok_or_else(|| CoordinatorError::NotFound(format!("request {id}")))
    }

    /// Requests for one order, oldest first.
    pub fn for_order(&self, order_id: &OrderId) -> Vec<&Request> {
        self.by_order
            .get(order_id)
            .map(|ids| ids.iter().filter_map(|id| self.requests.get(id)).collect())
            .unwrap_or_default()
    }

    /// Every request, newest first.
    pub fn all(&self) -> Vec<&Request> {
        let mut all: Vec<&Request> = self.requests.values().collect();
        all.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| b.id().cmp(a.id())));
        all
    }

    pub fn flags(&self, order_id: &OrderId) -> RequestFlags {
        let requests = self.for_order(order_id);
        RequestFlags {
            has_cancel_request: requests.iter().any(|r| r.kind() == RequestType::Cancel),
            has_return_request: requests.iter().any(|r| r.kind() == RequestType::Return),
        }
    }

    pub fn stats(&self) -> RequestStats {
        self.requests.values().fold(RequestStats::default(), |mut s, r| {
            s.total += 1;
            match r.status() {
                RequestStatus::Pending => s.pending += 1,
                RequestStatus::Approved => s.approved += 1,
                RequestStatus::Rejected => s.rejected += 1,
            }
            s
        })
    }

    /// Duplicate check first, then the order-status guard.
    pub fn check_can_file(&self, order: &Order, kind: RequestType) -> Result<()> {
        let duplicate = self.for_order(order.id()).into_iter().any(|r| r.kind() == kind && self.policy.blocks(r));
        if duplicate {
            return Err(CoordinatorError::DuplicateRequest { order_id: order.id().clone(), kind });
        }
        if !order.status().accepts_request(kind) {
            return Err(CoordinatorError::InvalidState(format!(
                "a {} request cannot be filed while the order is {}",
                kind.to_string().to_lowercase(),
                order.status().presentation().label.to_lowercase()
            )));
        }
        Ok(())
    }

    pub fn file(&mut self, order: &Order, user: UserId, kind: RequestType, reason: Reason) -> Result<Request> {
        self.check_can_file(order, kind)?;
        let mut request = Request::file(order.id().clone(), user, kind, reason);
        self.events.extend(request.take_events());
        info!(request_id = %request.id(), order_id = %order.id(), %kind, "request filed");
        self.by_order.entry(order.id().clone()).or_default().push(request.id().clone());
        self.requests.insert(request.id().clone(), request.clone());
        Ok(request)
    }

    pub fn review(&mut self, id: &RequestId, decision: Decision, admin_note: Option<String>) -> Result<Request> {
        self.review_with(id, decision, admin_note, |_| Ok(()))
    }

    /// Reviews a pending request. `on_decided` sees the decided request before
    /// anything is stored; if it fails, the ledger is left untouched.
    pub fn review_with(
        &mut self,
        id: &RequestId,
        decision: Decision,
        admin_note: Option<String>,
        on_decided: impl FnOnce(&Request) -> Result<()>,
    ) -> Result<Request> {
        let mut request = self.get(id)?.clone();
        request.review(decision, admin_note)?;
        on_decided(&request)?;
        self.events.extend(request.take_events());
        info!(request_id = %id, status = %request.status(), "request reviewed");
        self.requests.insert(id.clone(), request.clone());
        Ok(request)
    }

    pub fn edit_note(&mut self, id: &RequestId, note: impl Into<String>) -> Result<Request> {
        let request = self
            .requests
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("request {id}")))?;
        request.edit_note(note);
        self.events.extend(request.take_events());
        Ok(request.clone())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, OrderStatus, PaymentMethod, ShippingDetails, TransitionPolicy};
    use crate::domain::value_objects::Money;

    fn order_in(status: OrderStatus) -> Order {
        let item = OrderItem::new("P1".into(), "V1".into(), "Tee", 1, Money::default());
        let mut order = Order::place("U1".into(), vec![item], Money::default(), Money::default(), ShippingDetails::default(), PaymentMethod::CashOnDelivery).unwrap();
        if status != OrderStatus::Pending {
            order.assign_status(status, TransitionPolicy::Permissive).unwrap();
        }
        order
    }

    fn reason(s: &str) -> Reason { Reason::new(s).unwrap() }

    #[test]
    fn test_cancel_guard_by_status() {
        let mut ledger = RequestLedger::default();
        for status in [OrderStatus::Pending, OrderStatus::Confirmed] {
            assert!(ledger.file(&order_in(status), "U1".into(), RequestType::Cancel, reason("changed mind")).is_ok());
        }
        for status in [OrderStatus::Processing, OrderStatus::InTransit, OrderStatus::Delivered] {
            let err = ledger.file(&order_in(status), "U1".into(), RequestType::Cancel, reason("late")).unwrap_err();
            assert!(matches!(err, CoordinatorError::InvalidState(_)));
        }
    }

    #[test]
    fn test_return_only_when_delivered() {
        let mut ledger = RequestLedger::default();
        assert!(ledger.file(&order_in(OrderStatus::PendingReceipt), "U1".into(), RequestType::Return, reason("x")).is_err());
        assert!(ledger.file(&order_in(OrderStatus::Delivered), "U1".into(), RequestType::Return, reason("x")).is_ok());
    }

    #[test]
    fn test_rejected_request_blocks_under_default_policy() {
        let order = order_in(OrderStatus::Pending);
        let mut ledger = RequestLedger::default();
        let r = ledger.file(&order, "U1".into(), RequestType::Cancel, reason("oops")).unwrap();
        ledger.review(r.id(), Decision::Rejected, Some("already packed".into())).unwrap();
        let err = ledger.file(&order, "U1".into(), RequestType::Cancel, reason("again")).unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicateRequest { kind: RequestType::Cancel, .. }));
    }

    #[test]
    fn test_active_only_policy_allows_resubmission_after_rejection() {
        let order = order_in(OrderStatus::Pending);
        let mut ledger = RequestLedger::new(DuplicatePolicy::ActiveOnly);
        let r = ledger.file(&order, "U1".into(), RequestType::Cancel, reason("oops")).unwrap();
        assert!(ledger.file(&order, "U1".into(), RequestType::Cancel, reason("again")).is_err());
        ledger.review(r.id(), Decision::Rejected, Some("no".into())).unwrap();
        assert!(ledger.file(&order, "U1".into(), RequestType::Cancel, reason("again")).is_ok());
        assert_eq!(ledger.for_order(order.id()).len(), 2);
    }

    #[test]
    fn test_types_are_independent() {
        let order = order_in(OrderStatus::Pending);
        let mut ledger = RequestLedger::default();
        ledger.file(&order, "U1".into(), RequestType::Cancel, reason("a")).unwrap();
        assert_eq!(ledger.flags(order.id()), RequestFlags { has_cancel_request: true, has_return_request: false });
    }

    #[test]
    fn test_failing_hook_leaves_request_pending() {
        let order = order_in(OrderStatus::Pending);
        let mut ledger = RequestLedger::default();
        let r = ledger.file(&order, "U1".into(), RequestType::Cancel, reason("a")).unwrap();
        ledger.take_events();
        let err = ledger
            .review_with(r.id(), Decision::Approved, None, |_| Err(CoordinatorError::InvalidState("order moved on".into())))
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidState(_)));
        assert!(ledger.get(r.id()).unwrap().is_pending());
        assert!(ledger.take_events().is_empty());
    }

    #[test]
    fn test_stats_and_notes() {
        let mut ledger = RequestLedger::default();
        let a = ledger.file(&order_in(OrderStatus::Pending), "U1".into(), RequestType::Cancel, reason("a")).unwrap();
        ledger.file(&order_in(OrderStatus::Delivered), "U1".into(), RequestType::Return, reason("b")).unwrap();
        ledger.review(a.id(), Decision::Approved, None).unwrap();
        assert!(ledger.review(a.id(), Decision::Approved, None).is_err());
        let noted = ledger.edit_note(a.id(), "refunded").unwrap();
        assert_eq!(noted.status(), RequestStatus::Approved);
        assert_eq!(ledger.stats(), RequestStats { total: 2, pending: 1, approved: 1, rejected: 0 });
        assert_eq!(ledger.all().len(), 2);
        assert!(matches!(ledger.get(&"nope".into()), Err(CoordinatorError::NotFound(_))));
    }
}
