//! Domain event publishing. Best-effort: a failed publish is logged and dropped.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

pub const SUBJECT_PREFIX: &str = "storefront";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Publishes every event in order, logging failures instead of returning them.
pub async fn publish_all(publisher: &dyn EventPublisher, events: Vec<DomainEvent>) {
    for event in events {
        if let Err(e) = publisher.publish(&event).await {
            warn!(subject = %event.subject(), error = %e, "failed to publish domain event");
        }
    }
}

/// Used when no broker is configured.
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        debug!(subject = %event.subject(), ?event, "domain event");
        Ok(())
    }
}

pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let subject = format!("{SUBJECT_PREFIX}.{}", event.subject());
        let payload = serde_json::to_vec(event)?;
        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }
}

/// Keeps published events in memory.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryPublisher {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("event buffer poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::RequestEvent;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _event: &DomainEvent) -> anyhow::Result<()> { anyhow::bail!("broker down") }
    }

    fn event() -> DomainEvent { DomainEvent::Request(RequestEvent::NoteEdited { request_id: "R1".into() }) }

    #[tokio::test]
    async fn test_publish_failures_fail_open() {
        publish_all(&FailingPublisher, vec![event(), event()]).await;
    }

    #[tokio::test]
    async fn test_memory_publisher_records() {
        let p = MemoryPublisher::default();
        publish_all(&p, vec![event()]).await;
        assert_eq!(p.events(), vec![event()]);
        assert_eq!(event().subject(), "request.note_edited");
    }
}
