//! Central event broadcasting

use tokio::sync::broadcast;

use crate::events::{
    BackgroundEvent, DaemonEvent, SegmentEvent, TaskEvent, TimingEvent, TotalEvent,
};

/// Fans "record changed" notifications out to every subscriber
pub struct EventManager {
    event_tx: broadcast::Sender<DaemonEvent>,
}

impl EventManager {
    /// Create a new event manager with a broadcast channel
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(1000);
        Self { event_tx }
    }

    /// Subscribe to all daemon events
    pub fn subscribe(&self) -> broadcast::Receiver<DaemonEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    pub fn emit_task(&self, event: TaskEvent) {
        tracing::debug!(
            "EventManager: task {} {:?}",
            event.task_id,
            event.event_type
        );
        self.emit(DaemonEvent::Task(event));
    }

    pub fn emit_segment(&self, event: SegmentEvent) {
        self.emit(DaemonEvent::Segment(event));
    }

    pub fn emit_timing(&self, event: TimingEvent) {
        tracing::debug!(
            "EventManager: segment {} timing {:?}",
            event.segment_id,
            event.event_type
        );
        self.emit(DaemonEvent::Timing(event));
    }

    pub fn emit_total(&self, event: TotalEvent) {
        self.emit(DaemonEvent::Total(event));
    }

    pub fn emit_background(&self, event: BackgroundEvent) {
        self.emit(DaemonEvent::Background(event));
    }

    // Sending with no subscribers is not an error here
    fn emit(&self, event: DaemonEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeledger_core::models::TaskId;

    #[test]
    fn test_emit_without_subscribers() {
        let manager = EventManager::new();
        assert_eq!(manager.subscriber_count(), 0);
        manager.emit_total(TotalEvent::new(5));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let manager = EventManager::new();
        let mut receiver1 = manager.subscribe();
        let mut receiver2 = manager.subscribe();

        manager.emit_task(TaskEvent::deleted(TaskId(1)));

        // Both subscribers should receive the event
        let received1 = receiver1.recv().await.unwrap();
        let received2 = receiver2.recv().await.unwrap();

        assert!(matches!(received1, DaemonEvent::Task(_)));
        assert!(matches!(received2, DaemonEvent::Task(_)));
    }
}
