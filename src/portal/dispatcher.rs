//! Named-channel event bus shared by the host and every sub-application

use futures::Stream;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Emitted when activation of one or more applications starts
pub const APPS_LOADING_START: &str = "appsLoadingStart";

/// Emitted once an activation has mounted its application
pub const APPS_LOADING_END: &str = "appsLoadingEnd";

/// Subscription to one channel; only sees events emitted after `register`
pub struct EventStream {
    channel: String,
    rx: UnboundedReceiver<Value>,
}

impl EventStream {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Next already-delivered event, without waiting
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    /// Drain everything delivered so far
    pub fn drain(&mut self) -> Vec<Value> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for EventStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Clone, Default)]
pub struct GlobalEventDispatcher {
    channels: Arc<Mutex<HashMap<String, Vec<UnboundedSender<Value>>>>>,
}

impl GlobalEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Vec<UnboundedSender<Value>>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, channel: impl Into<String>) -> EventStream {
        let channel = channel.into();
        let (tx, rx) = unbounded_channel();
        self.channels().entry(channel.clone()).or_default().push(tx);
        debug!("Subscribed to channel {}", channel);
        EventStream { channel, rx }
    }

    /// Deliver `payload` to every current subscriber of `channel`
    ///
    /// Delivery happens before this returns, in emit order. Subscribers whose
    /// stream was dropped are pruned. Returns the number of deliveries.
    pub fn emit<T: Serialize>(&self, channel: &str, payload: T) -> usize {
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            warn!("Could not serialize payload for {}: {}", channel, e);
            Value::Null
        });

        let mut channels = self.channels();
        let Some(subscribers) = channels.get_mut(channel) else {
            debug!("No subscribers on {}", channel);
            return 0;
        };

        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        let delivered = subscribers.len();
        if subscribers.is_empty() {
            channels.remove(channel);
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_reaches_all_subscribers_in_order() {
        let dispatcher = GlobalEventDispatcher::new();
        let mut first = dispatcher.register("openADetail");
        let mut second = dispatcher.register("openADetail");

        assert_eq!(dispatcher.emit("openADetail", json!({ "id": 1 })), 2);
        assert_eq!(dispatcher.emit("openADetail", json!({ "id": 2 })), 2);

        assert_eq!(first.drain(), vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        assert_eq!(second.drain(), vec![json!({ "id": 1 }), json!({ "id": 2 })]);
    }

    #[test]
    fn test_late_subscriber_sees_no_history() {
        let dispatcher = GlobalEventDispatcher::new();
        assert_eq!(dispatcher.emit("ping", "early"), 0);

        let mut late = dispatcher.register("ping");
        assert!(late.try_recv().is_none());

        dispatcher.emit("ping", "late");
        assert_eq!(late.try_recv(), Some(json!("late")));
    }

    #[test]
    fn test_channels_are_isolated_and_dropped_streams_pruned() {
        let dispatcher = GlobalEventDispatcher::new();
        let mut a = dispatcher.register("a");
        let b = dispatcher.register("b");
        drop(b);

        assert_eq!(dispatcher.emit("b", 1), 0);
        assert_eq!(dispatcher.subscriber_count("b"), 0);
        assert!(a.try_recv().is_none());
        assert_eq!(a.channel(), "a");
    }

    #[tokio::test]
    async fn test_stream_interface() {
        use futures::StreamExt;

        let dispatcher = GlobalEventDispatcher::new();
        let mut stream = dispatcher.register("tick");
        dispatcher.emit("tick", 1);
        dispatcher.emit("tick", 2);

        assert_eq!(stream.next().await, Some(json!(1)));
        assert_eq!(stream.recv().await, Some(json!(2)));
    }
}
