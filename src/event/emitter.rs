//! EventEmitter Trait - where progress events go after they are logged
//!
//! - `EventEmitter`: sink trait, injected into the engine per execution
//! - `NoopEmitter`: discards everything (blocking `execute`)
//! - `ChannelEmitter`: forwards to a stream consumer (`stream_execute`)

use tokio::sync::mpsc;

use super::log::ProgressEvent;

/// Sink for progress events
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Forwards events to a channel.
///
/// A dropped receiver is ignored: the execution keeps running and
/// checkpointing after the consumer goes away.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventLog};
    use std::sync::Arc;

    #[test]
    fn event_emitter_trait_is_object_safe() {
        fn accepts_emitter(_: &dyn EventEmitter) {}
        accepts_emitter(&NoopEmitter::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        accepts_emitter(&ChannelEmitter::new(tx));
    }

    #[tokio::test]
    async fn channel_emitter_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter: Arc<dyn EventEmitter> = Arc::new(ChannelEmitter::new(tx));
        let log = EventLog::new("exec-1");

        emitter.emit(&log.record(EventKind::CheckpointSaved { group: Some(1) }));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.node, "checkpoint");
        assert_eq!(received.execution_id, "exec-1");
    }

    #[test]
    fn channel_emitter_ignores_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let emitter = ChannelEmitter::new(tx);
        let log = EventLog::new("exec-1");
        emitter.emit(&log.record(EventKind::Resumed { feedback: None }));
    }
}
