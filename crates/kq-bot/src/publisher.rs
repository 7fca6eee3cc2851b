//! Topic publisher.
//!
//! Every snapshot the engine exposes maps to one [`Topic`]. Payloads are
//! serialized to JSON and delivered on a broadcast channel. Each topic has
//! its own minimum interval; a payload arriving inside the interval is held
//! and sent by [`Publisher::flush`] once the interval has elapsed. A payload
//! equal to the last one sent on its topic is dropped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::config::{publish_interval_ms, PublisherConfig};
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    FairValue,
    Quote,
    QuoteStatus,
    EwmaStats,
    StdevStats,
    Position,
    TargetBasePosition,
    TradeSafetyValue,
    Trades,
    OrderStatusReports,
    MarketChart,
    Connectivity,
}

impl Topic {
    pub const ALL: [Topic; 12] = [
        Self::FairValue,
        Self::Quote,
        Self::QuoteStatus,
        Self::EwmaStats,
        Self::StdevStats,
        Self::Position,
        Self::TargetBasePosition,
        Self::TradeSafetyValue,
        Self::Trades,
        Self::OrderStatusReports,
        Self::MarketChart,
        Self::Connectivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FairValue => "fairValue",
            Self::Quote => "quote",
            Self::QuoteStatus => "quoteStatus",
            Self::EwmaStats => "ewmaStats",
            Self::StdevStats => "stdevStats",
            Self::Position => "position",
            Self::TargetBasePosition => "targetBasePosition",
            Self::TradeSafetyValue => "tradeSafetyValue",
            Self::Trades => "trades",
            Self::OrderStatusReports => "orderStatusReports",
            Self::MarketChart => "marketChart",
            Self::Connectivity => "connectivity",
        }
    }
}

/// One published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMessage {
    pub topic: Topic,
    /// JSON payload.
    pub payload: String,
    pub time_ms: u64,
}

#[derive(Debug, Default)]
struct TopicState {
    last_sent_ms: Option<u64>,
    last_payload: Option<String>,
    pending: Option<String>,
}

pub struct Publisher {
    tx: broadcast::Sender<TopicMessage>,
    min_interval_ms: u64,
    interval_ms: u64,
    topics: HashMap<Topic, TopicState>,
}

impl Publisher {
    pub fn new(config: &PublisherConfig, delay_ui_secs: u32) -> Self {
        let (tx, _rx) = broadcast::channel(config.channel_capacity);
        Self {
            tx,
            min_interval_ms: config.min_interval_ms,
            interval_ms: publish_interval_ms(config.min_interval_ms, delay_ui_secs),
            topics: HashMap::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopicMessage> {
        self.tx.subscribe()
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Apply a new `delay_ui` after a parameter reload.
    pub fn set_delay_ui(&mut self, delay_ui_secs: u32) {
        self.interval_ms = publish_interval_ms(self.min_interval_ms, delay_ui_secs);
    }

    /// Publish `value` on `topic`. Returns true when it went out immediately.
    pub fn publish<T: Serialize + ?Sized>(
        &mut self,
        topic: Topic,
        value: &T,
        now_ms: u64,
    ) -> AppResult<bool> {
        let payload = serde_json::to_string(value)?;
        let interval_ms = self.interval_ms;
        let state = self.topics.entry(topic).or_default();

        if state.last_payload.as_deref() == Some(payload.as_str()) {
            state.pending = None;
            return Ok(false);
        }
        let ready = state
            .last_sent_ms
            .map_or(true, |last| now_ms >= last + interval_ms);
        if !ready {
            state.pending = Some(payload);
            return Ok(false);
        }
        Self::send(&self.tx, topic, state, payload, now_ms);
        Ok(true)
    }

    /// Send held payloads whose interval has elapsed. Returns the count sent.
    pub fn flush(&mut self, now_ms: u64) -> usize {
        let mut sent = 0;
        for (topic, state) in self.topics.iter_mut() {
            let ready = state
                .last_sent_ms
                .map_or(true, |last| now_ms >= last + self.interval_ms);
            if !ready {
                continue;
            }
            if let Some(payload) = state.pending.take() {
                Self::send(&self.tx, *topic, state, payload, now_ms);
                sent += 1;
            }
        }
        sent
    }

    fn send(
        tx: &broadcast::Sender<TopicMessage>,
        topic: Topic,
        state: &mut TopicState,
        payload: String,
        now_ms: u64,
    ) {
        state.last_sent_ms = Some(now_ms);
        state.last_payload = Some(payload.clone());
        let msg = TopicMessage {
            topic,
            payload,
            time_ms: now_ms,
        };
        match tx.send(msg) {
            Ok(n) => trace!(topic = topic.as_str(), receivers = n, "Topic published"),
            Err(_) => trace!(topic = topic.as_str(), "No topic subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher(delay_ui: u32) -> Publisher {
        Publisher::new(&PublisherConfig::default(), delay_ui)
    }

    #[tokio::test]
    async fn test_first_payload_is_sent() {
        let mut publisher = publisher(0);
        let mut rx = publisher.subscribe();
        assert!(publisher.publish(Topic::FairValue, &101.5, 1_000).unwrap());
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, Topic::FairValue);
        assert_eq!(msg.payload, "101.5");
        assert_eq!(msg.time_ms, 1_000);
    }

    #[test]
    fn test_unchanged_payload_suppressed() {
        let mut publisher = publisher(0);
        assert!(publisher.publish(Topic::Quote, &[1, 2], 0).unwrap());
        assert!(!publisher.publish(Topic::Quote, &[1, 2], 10_000).unwrap());
        assert!(publisher.publish(Topic::Quote, &[1, 3], 10_000).unwrap());
    }

    #[tokio::test]
    async fn test_throttled_payload_flushed_later() {
        let mut publisher = publisher(0);
        let mut rx = publisher.subscribe();
        publisher.publish(Topic::Position, &1, 0).unwrap();
        assert!(!publisher.publish(Topic::Position, &2, 100).unwrap());
        assert!(!publisher.publish(Topic::Position, &3, 200).unwrap());
        assert_eq!(publisher.flush(300), 0);
        assert_eq!(publisher.flush(369), 1);

        assert_eq!(rx.recv().await.unwrap().payload, "1");
        // only the latest held payload goes out
        let flushed = rx.recv().await.unwrap();
        assert_eq!(flushed.payload, "3");
        assert_eq!(flushed.time_ms, 369);
    }

    #[test]
    fn test_topics_are_gated_independently() {
        let mut publisher = publisher(0);
        assert!(publisher.publish(Topic::Trades, &"a", 0).unwrap());
        assert!(publisher.publish(Topic::Connectivity, &"b", 1).unwrap());
    }

    #[test]
    fn test_delay_ui_raises_interval() {
        let mut publisher = publisher(0);
        assert_eq!(publisher.interval_ms(), 369);
        publisher.set_delay_ui(2);
        assert_eq!(publisher.interval_ms(), 2_000);
        publisher.publish(Topic::MarketChart, &1, 0).unwrap();
        assert!(!publisher.publish(Topic::MarketChart, &2, 1_000).unwrap());
        assert!(publisher.publish(Topic::MarketChart, &2, 2_000).unwrap());
    }

    #[test]
    fn test_topic_names() {
        let json = serde_json::to_string(&Topic::OrderStatusReports).unwrap();
        assert_eq!(json, format!("\"{}\"", Topic::OrderStatusReports.as_str()));
        assert_eq!(Topic::ALL.len(), 12);
    }
}
