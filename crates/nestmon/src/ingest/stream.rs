use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::lines::LineReader;
use super::parser::EventParser;
use super::parser::StreamEvent;
use super::parser::KEEP_ALIVE;
use super::sink::Sink;
use super::sink::SinkClosed;
use super::sink::Source;
use super::sink::Update;
use crate::config::StreamConfig;
use crate::model::Snapshot;
use crate::transport::ChunkStream;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::transport::Url;

/// Connection behaviour of the stream loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Give up on a connection that has been silent this long. Any line,
    /// keep-alives included, resets the timer.
    pub idle_timeout: Option<Duration>,

    /// Reconnect after the stream ends (see [`StreamLoop::run_supervised`]).
    pub reconnect: bool,

    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(90)),
            reconnect: true,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            reconnect: config.reconnect,
            backoff_initial: Duration::from_secs(config.backoff_initial_secs),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
        }
    }
}

/// How a single connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// The remote closed the body.
    Closed,
    /// The cancellation token fired.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    SinkClosed(#[from] SinkClosed),
}

/// Push-mode acquisition loop.
///
/// Holds one long-lived GET open, turns each `data:` record into a snapshot
/// and forwards it to the sink. The most recent snapshot is also published on
/// a watch channel (see [`StreamLoop::latest`]).
pub struct StreamLoop {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    settings: StreamSettings,
    parser: EventParser,
    latest: watch::Sender<Option<Arc<Snapshot>>>,
    delivered: u64,
}

impl StreamLoop {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, settings: StreamSettings) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            transport,
            endpoint,
            settings,
            parser: EventParser::new(),
            latest,
            delivered: 0,
        }
    }

    /// Handle on the most recent streamed snapshot.
    ///
    /// Stays valid across reconnects and after the loop has stopped.
    pub fn latest(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.latest.subscribe()
    }

    /// Number of snapshots delivered to the sink so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Run one connection until it ends.
    ///
    /// Malformed lines are logged and skipped; they never end the connection.
    pub async fn run(
        &mut self,
        sink: &dyn Sink,
        cancel: &CancellationToken,
    ) -> Result<StreamExit, StreamError> {
        info!("[stream] Connecting to {}", self.endpoint);
        let body = tokio::select! {
            _ = cancel.cancelled() => return Ok(StreamExit::Cancelled),
            body = subscribe(self.transport.as_ref(), &self.endpoint, self.settings.idle_timeout) => body?,
        };
        info!("[stream] Connected");

        let mut lines = LineReader::new(body);
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return Ok(StreamExit::Cancelled),
                line = next_line(&mut lines, self.settings.idle_timeout) => line?,
            };

            let Some(line) = line else {
                info!("[stream] Connection closed by remote");
                return Ok(StreamExit::Closed);
            };

            let Some(event) = self.parser.parse_line(&line) else {
                continue;
            };

            match event {
                StreamEvent::Data(Some(snapshot)) => {
                    self.latest.send_replace(Some(snapshot.clone()));
                    let update = Update::new(Source::Stream, snapshot);
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(StreamExit::Cancelled),
                        delivered = sink.deliver(update) => delivered?,
                    }
                    self.delivered += 1;
                    debug!("[stream] Delivered snapshot #{}", self.delivered);
                }
                StreamEvent::Data(None) => trace!("[stream] No change"),
                StreamEvent::Event(name) if name == KEEP_ALIVE => {
                    trace!("[stream] Keep-alive")
                }
                StreamEvent::Event(name) => debug!("[stream] Event: {}", name),
                StreamEvent::Comment => trace!("[stream] Ignoring line: {}", line),
                StreamEvent::Malformed { raw, error } => {
                    warn!("[stream] Skipping malformed data ({}): {}", error, raw)
                }
            }
        }
    }

    /// Run connections back to back until cancelled.
    ///
    /// After a connection ends (closed or failed) the loop waits and
    /// reconnects, doubling the wait each time up to `backoff_max`. The wait
    /// starts over after a connection that delivered at least one snapshot.
    /// With `reconnect` disabled this is a single [`StreamLoop::run`].
    pub async fn run_supervised(
        &mut self,
        sink: &dyn Sink,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let mut backoff = self.settings.backoff_initial;

        loop {
            let delivered_before = self.delivered;

            match self.run(sink, cancel).await {
                Ok(StreamExit::Cancelled) => return Ok(()),
                Err(StreamError::SinkClosed(e)) => return Err(e.into()),
                Ok(StreamExit::Closed) if !self.settings.reconnect => return Ok(()),
                Err(e) if !self.settings.reconnect => return Err(e),
                Ok(StreamExit::Closed) => {}
                Err(e) => warn!("[stream] Connection failed: {}", e),
            }

            if self.delivered > delivered_before {
                backoff = self.settings.backoff_initial;
            }

            info!("[stream] Reconnecting in {:?}", backoff);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.settings.backoff_max);
        }
    }
}

/// Open the stream. A server that never answers counts as idle too.
async fn subscribe(
    transport: &dyn Transport,
    endpoint: &Url,
    idle_timeout: Option<Duration>,
) -> Result<Box<dyn ChunkStream>, TransportError> {
    match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, transport.subscribe(endpoint))
            .await
            .map_err(|_| TransportError::IdleTimeout(idle))?,
        None => transport.subscribe(endpoint).await,
    }
}

async fn next_line(
    lines: &mut LineReader,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, TransportError> {
    match idle_timeout {
        Some(idle) => tokio::time::timeout(idle, lines.next_line())
            .await
            .map_err(|_| TransportError::IdleTimeout(idle))?,
        None => lines.next_line().await,
    }
}
