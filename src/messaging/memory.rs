use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Mutex;

use super::{EventPublisher, PublishError};
use crate::store::OutboxMessage;

/// In-process publisher used when no broker is configured, and in tests.
///
/// Records every delivered message; failures can be injected.
#[derive(Default)]
pub struct InMemoryPublisher {
    delivered: Mutex<Vec<OutboxMessage>>,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` publish calls fail with a transient broker error.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.fail_always.store(unavailable, Ordering::SeqCst);
    }

    pub async fn delivered(&self) -> Vec<OutboxMessage> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(PublishError::Broker("broker unavailable".into()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PublishError::Broker("injected failure".into()));
        }

        tracing::info!(
            topic = %message.topic,
            event_id = %message.event_id,
            event_type = %message.event_type,
            aggregate_id = %message.aggregate_id,
            "📨 Event published (in-memory)"
        );
        self.delivered.lock().await.push(message.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
