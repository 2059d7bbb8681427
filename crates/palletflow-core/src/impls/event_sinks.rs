//! EventSink implementations.

use std::sync::{Arc, Mutex};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Writes each event as one structured `tracing` event on the
/// `palletflow::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::info!(
                target: "palletflow::events",
                event = event.name(),
                task_id = event.task_id().map(tracing::field::display),
                %payload,
            ),
            Err(err) => tracing::warn!(
                target: "palletflow::events",
                event = event.name(),
                error = %err,
                "event could not be serialized"
            ),
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::name).collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use ulid::Ulid;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryEventSink::new();
        let task_id = TaskId::from_ulid(Ulid::new());
        sink.emit(DomainEvent::TaskEdited { task_id });
        sink.emit(DomainEvent::TaskDeleted { task_id });
        assert_eq!(sink.names(), vec!["task_edited", "task_deleted"]);
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        TracingEventSink.emit(DomainEvent::TaskEdited {
            task_id: TaskId::from_ulid(Ulid::new()),
        });
    }
}
