//! Event sinks the orchestrator writes to.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::stream_event::StreamEvent;

/// The receiving side is gone; stop producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event sink closed")]
pub struct SinkClosed;

#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed>;
}

/// Forwards events over a bounded channel, one send per event.
pub struct ChannelSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

/// Buffers events in memory for the non-streaming path.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Vec<StreamEvent>,
    skip_deltas: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops `content_delta` events, whose text the outcome already holds.
    pub fn without_deltas() -> Self {
        Self {
            events: Vec::new(),
            skip_deltas: true,
        }
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<StreamEvent> {
        self.events
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(StreamEvent::event_type).collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        if self.skip_deltas && matches!(event, StreamEvent::ContentDelta { .. }) {
            return Ok(());
        }
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_preserves_order() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        sink.send(StreamEvent::progress("one")).await.unwrap();
        sink.send(StreamEvent::progress("two")).await.unwrap();
        drop(sink);

        let mut seen = Vec::new();
        while let Some(StreamEvent::Progress { message, .. }) = rx.recv().await {
            seen.push(message);
        }
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn channel_sink_fails_fast_when_receiver_dropped() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert_eq!(sink.send(StreamEvent::progress("x")).await, Err(SinkClosed));
    }

    #[tokio::test]
    async fn collecting_sink_keeps_everything() {
        let mut sink = CollectingSink::new();
        sink.send(StreamEvent::progress("x")).await.unwrap();
        sink.send(StreamEvent::error("y")).await.unwrap();
        assert_eq!(sink.event_types(), vec!["progress", "error"]);
        assert_eq!(sink.into_events().len(), 2);
    }

    #[tokio::test]
    async fn collecting_sink_can_drop_deltas() {
        let mut sink = CollectingSink::without_deltas();
        sink.send(StreamEvent::ContentDelta {
            delta: "Hel".into(),
            full_content: "Hel".into(),
        })
        .await
        .unwrap();
        sink.send(StreamEvent::progress("x")).await.unwrap();
        assert_eq!(sink.event_types(), vec!["progress"]);
    }
}
