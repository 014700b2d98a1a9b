//! Request Aggregate
//!
//! A customer-filed CANCEL or RETURN ticket. Review is a single step:
//! `PENDING` moves to `APPROVED` or `REJECTED` and stays there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::aggregates::order::{StatusPresentation, Tone};
use crate::domain::events::{DomainEvent, RequestEvent};
use crate::domain::value_objects::{OrderId, Reason, RequestId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType { Cancel, Return }

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Cancel => "CANCEL", Self::Return => "RETURN" })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus { Pending, Approved, Rejected }

impl RequestStatus {
    pub fn presentation(&self) -> StatusPresentation {
        match self {
            Self::Pending => StatusPresentation { label: "Awaiting review", tone: Tone::Warning },
            Self::Approved => StatusPresentation { label: "Approved", tone: Tone::Success },
            Self::Rejected => StatusPresentation { label: "Rejected", tone: Tone::Danger },
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Pending => "PENDING", Self::Approved => "APPROVED", Self::Rejected => "REJECTED" })
    }
}

/// An administrator's verdict on a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision { Approved, Rejected }

impl From<Decision> for RequestStatus {
    fn from(d: Decision) -> Self {
        match d { Decision::Approved => Self::Approved, Decision::Rejected => Self::Rejected }
    }
}

impl FromStr for Decision {
    type Err = RequestError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(RequestError::UnknownDecision(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    id: RequestId,
    order_id: OrderId,
    user_id: UserId,
    #[serde(rename = "type")]
    kind: RequestType,
    status: RequestStatus,
    reason: Reason,
    admin_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Request {
    pub fn file(order_id: OrderId, user_id: UserId, kind: RequestType, reason: Reason) -> Self {
        let now = Utc::now();
        let mut request = Self {
            id: RequestId::generate(), order_id, user_id, kind, status: RequestStatus::Pending, reason,
            admin_note: None, created_at: now, updated_at: now, events: vec![],
        };
        request.raise_event(DomainEvent::Request(RequestEvent::Filed {
            request_id: request.id.clone(), order_id: request.order_id.clone(), kind,
        }));
        request
    }

    pub fn id(&self) -> &RequestId { &self.id }
    pub fn order_id(&self) -> &OrderId { &self.order_id }
    pub fn user_id(&self) -> &UserId { &self.user_id }
    pub fn kind(&self) -> RequestType { self.kind }
    pub fn status(&self) -> RequestStatus { self.status }
    pub fn reason(&self) -> &Reason { &self.reason }
    pub fn admin_note(&self) -> Option<&str> { self.admin_note.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_pending(&self) -> bool { self.status == RequestStatus::Pending }

    pub fn review(&mut self, decision: Decision, admin_note: Option<String>) -> Result<(), RequestError> {
        if !self.is_pending() {
            return Err(RequestError::AlreadyReviewed(self.status));
        }
        let note = admin_note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if decision == Decision::Rejected && note.is_none() {
            return Err(RequestError::NoteRequired);
        }
        self.status = decision.into();
        if note.is_some() {
            self.admin_note = note;
        }
        self.touch();
        self.raise_event(DomainEvent::Request(RequestEvent::Reviewed {
            request_id: self.id.clone(), order_id: self.order_id.clone(), kind: self.kind, status: self.status,
        }));
        Ok(())
    }

    /// Allowed in any status; never changes it.
    pub fn edit_note(&mut self, note: impl Into<String>) {
        let note = note.into().trim().to_string();
        self.admin_note = if note.is_empty() { None } else { Some(note) };
        self.touch();
        self.raise_event(DomainEvent::Request(RequestEvent::NoteEdited { request_id: self.id.clone() }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request was already reviewed ({0})")]
    AlreadyReviewed(RequestStatus),
    #[error("an admin note is required when rejecting")]
    NoteRequired,
    #[error("unknown decision `{0}`")]
    UnknownDecision(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Request {
        Request::file("O1".into(), "U1".into(), RequestType::Return, Reason::new("damaged").unwrap())
    }

    #[test]
    fn test_filed_request_is_pending() {
        let r = pending();
        assert_eq!(r.status(), RequestStatus::Pending);
        assert!(r.admin_note().is_none());
    }

    #[test]
    fn test_reject_requires_note() {
        let mut r = pending();
        assert_eq!(r.review(Decision::Rejected, Some("  ".into())), Err(RequestError::NoteRequired));
        assert!(r.is_pending());
        r.review(Decision::Rejected, Some("outside return window".into())).unwrap();
        assert_eq!(r.status(), RequestStatus::Rejected);
    }

    #[test]
    fn test_second_review_fails() {
        let mut r = pending();
        r.review(Decision::Approved, None).unwrap();
        assert_eq!(r.review(Decision::Rejected, Some("no".into())), Err(RequestError::AlreadyReviewed(RequestStatus::Approved)));
        assert_eq!(r.status(), RequestStatus::Approved);
    }

    #[test]
    fn test_edit_note_keeps_status() {
        let mut r = pending();
        r.review(Decision::Approved, None).unwrap();
        r.edit_note("refund issued");
        assert_eq!(r.admin_note(), Some("refund issued"));
        assert_eq!(r.status(), RequestStatus::Approved);
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(pending()).unwrap();
        assert_eq!(json["type"], "RETURN");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["reason"], "damaged");
        assert!(json.get("events").is_none());
    }
}
