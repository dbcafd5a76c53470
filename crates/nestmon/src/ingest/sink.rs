use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::Snapshot;
use crate::model::WeatherReport;

/// Default capacity of the update channel.
pub const DEFAULT_CAPACITY: usize = 64;

/// Which acquisition loop produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Poll,
    Stream,
    Weather,
}

/// What an update carries.
#[derive(Debug, Clone)]
pub enum Payload {
    Thermostats(Arc<Snapshot>),
    Weather(Arc<WeatherReport>),
}

/// A reading on its way to the consumer.
///
/// Updates from one source arrive in order; updates from different sources
/// may interleave arbitrarily.
#[derive(Debug, Clone)]
pub struct Update {
    pub source: Source,
    pub payload: Payload,
}

impl Update {
    /// A thermostat snapshot from the poll or stream loop.
    pub fn new(source: Source, snapshot: Arc<Snapshot>) -> Self {
        Self {
            source,
            payload: Payload::Thermostats(snapshot),
        }
    }

    pub fn weather(report: WeatherReport) -> Self {
        Self {
            source: Source::Weather,
            payload: Payload::Weather(Arc::new(report)),
        }
    }

    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match &self.payload {
            Payload::Thermostats(snapshot) => Some(snapshot),
            Payload::Weather(_) => None,
        }
    }

    pub fn weather_report(&self) -> Option<&WeatherReport> {
        match &self.payload {
            Payload::Weather(report) => Some(report),
            Payload::Thermostats(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("update sink closed")]
pub struct SinkClosed;

/// Destination for snapshots emitted by the acquisition loops.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Hand one update to the consumer.
    ///
    /// Fails only when the consumer has gone away for good.
    async fn deliver(&self, update: Update) -> Result<(), SinkClosed>;
}

/// Channel types for updates FROM the loops TO the consumer
/// These are bounded channels; a full channel blocks the producing loop.
pub type UpdateSender = mpsc::Sender<Update>;
pub type UpdateReceiver = mpsc::Receiver<Update>;

pub fn channel(capacity: usize) -> (UpdateSender, UpdateReceiver) {
    mpsc::channel(capacity)
}

#[async_trait]
impl Sink for UpdateSender {
    async fn deliver(&self, update: Update) -> Result<(), SinkClosed> {
        self.send(update).await.map_err(|_| SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (tx, mut rx) = channel(4);
        let first = Arc::new(Snapshot::default());
        let second = Arc::new(Snapshot::from_json(r#"{"devices": {}}"#).unwrap());

        tx.deliver(Update::new(Source::Poll, first.clone()))
            .await
            .unwrap();
        tx.deliver(Update::new(Source::Poll, second.clone()))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().snapshot(), Some(&first));
        assert_eq!(rx.recv().await.unwrap().snapshot(), Some(&second));
    }

    #[tokio::test]
    async fn test_deliver_fails_once_receiver_dropped() {
        let (tx, rx) = channel(1);
        drop(rx);

        let result = tx
            .deliver(Update::new(Source::Stream, Arc::new(Snapshot::default())))
            .await;
        assert_eq!(result, Err(SinkClosed));
    }

    #[test]
    fn test_source_display() {
        assert_eq!(Source::Poll.to_string(), "poll");
        assert_eq!(Source::Stream.to_string(), "stream");
        assert_eq!(Source::Weather.to_string(), "weather");
    }

    #[test]
    fn test_payload_accessors() {
        let thermostats = Update::new(Source::Poll, Arc::new(Snapshot::default()));
        assert!(thermostats.snapshot().is_some());
        assert!(thermostats.weather_report().is_none());

        let weather = Update::weather(WeatherReport {
            location: "94040".to_string(),
            ..WeatherReport::default()
        });
        assert_eq!(weather.source, Source::Weather);
        assert!(weather.snapshot().is_none());
        assert_eq!(weather.weather_report().unwrap().location, "94040");
    }
}
