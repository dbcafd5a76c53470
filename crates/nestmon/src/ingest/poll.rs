use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::sink::Sink;
use super::sink::SinkClosed;
use super::sink::Source;
use super::sink::Update;
use crate::model::DecodeError;
use crate::model::Snapshot;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::transport::Url;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    SinkClosed(#[from] SinkClosed),
}

/// Poll-mode acquisition loop.
///
/// Fetches the full-state document on a fixed interval and delivers every
/// snapshot that decodes, identical or not. A failed cycle is logged and
/// skipped; the next one runs after the usual interval.
pub struct PollLoop {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    interval: Duration,
}

impl PollLoop {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, interval: Duration) -> Self {
        Self {
            transport,
            endpoint,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until cancelled.
    ///
    /// Only a closed sink ends the loop with an error.
    pub async fn run(&self, sink: &dyn Sink, cancel: &CancellationToken) -> Result<(), PollError> {
        info!(
            "[poll] Polling {} every {:?}",
            self.endpoint, self.interval
        );

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                fetched = self.fetch_snapshot() => fetched,
            };

            match fetched {
                Ok(snapshot) => {
                    let update = Update::new(Source::Poll, Arc::new(snapshot));
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        delivered = sink.deliver(update) => delivered?,
                    }
                    debug!("[poll] Delivered snapshot");
                }
                Err(e) => warn!("[poll] Skipping cycle: {}", e),
            }

            debug!("[poll] Sleeping for {:?}", self.interval);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Run a single fetch-and-decode cycle.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot, PollError> {
        debug!("[poll] Requesting {}", self.endpoint);
        let body = self.transport.fetch(&self.endpoint).await?;
        Ok(Snapshot::from_json(&body)?)
    }
}
