use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::poll::PollLoop;
use super::sink::Sink;
use super::sink::Source;
use super::stream::StreamLoop;
use super::stream::StreamSettings;
use super::weather::WeatherLoop;
use crate::config::Config;
use crate::model::Snapshot;
use crate::transport::Transport;

/// How an acquisition task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Returned normally (cancelled, or a stream that was not set to reconnect).
    Finished,
    /// Returned an error.
    Failed(String),
    /// The task panicked or was aborted.
    Aborted(String),
}

/// Outcome of every loop the dispatcher started, in start order.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<(Source, LoopOutcome)>,
}

impl DispatchReport {
    pub fn outcome(&self, source: Source) -> Option<&LoopOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| *s == source)
            .map(|(_, outcome)| outcome)
    }
}

/// Runs the enabled acquisition loops side by side.
///
/// Each loop is its own tokio task and all of them feed the same sink. One
/// loop ending does not stop the others; [`Dispatcher::run`] returns once all
/// of them have ended.
#[derive(Default)]
pub struct Dispatcher {
    poll: Option<PollLoop>,
    stream: Option<StreamLoop>,
    weather: Option<WeatherLoop>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dispatcher with the loops enabled in `config`.
    ///
    /// `transport` carries the API credentials; `weather_transport` is used
    /// for the third-party weather service and must not.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn Transport>,
        weather_transport: Arc<dyn Transport>,
    ) -> Self {
        let mut dispatcher = Self::new();

        if config.poll.enabled {
            dispatcher = dispatcher.with_poll(PollLoop::new(
                transport.clone(),
                config.api.endpoint.clone(),
                config.poll.interval(),
            ));
        }

        if config.stream.enabled {
            dispatcher = dispatcher.with_stream(StreamLoop::new(
                transport,
                config.api.stream_endpoint().clone(),
                StreamSettings::from(&config.stream),
            ));
        }

        if let Some(weather) = config.weather.as_ref().filter(|w| w.enabled) {
            dispatcher = dispatcher.with_weather(WeatherLoop::new(
                weather_transport,
                &weather.endpoint,
                &weather.zip,
                &weather.app_id,
                weather.interval(),
            ));
        }

        dispatcher
    }

    pub fn with_poll(mut self, poll: PollLoop) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn with_stream(mut self, stream: StreamLoop) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_weather(mut self, weather: WeatherLoop) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.poll.is_none() && self.stream.is_none() && self.weather.is_none()
    }

    /// Handle on the latest streamed snapshot, when streaming is enabled.
    pub fn stream_latest(&self) -> Option<watch::Receiver<Option<Arc<Snapshot>>>> {
        self.stream.as_ref().map(StreamLoop::latest)
    }

    /// Start every enabled loop and wait for all of them to end.
    pub async fn run(self, sink: Arc<dyn Sink>, cancel: CancellationToken) -> DispatchReport {
        if self.is_empty() {
            warn!("No acquisition loop enabled, nothing to do");
            return DispatchReport::default();
        }

        let mut handles: Vec<(Source, JoinHandle<LoopOutcome>)> = Vec::new();

        if let Some(poll) = self.poll {
            info!("Starting poll loop (interval {:?})", poll.interval());
            let sink = sink.clone();
            let cancel = cancel.clone();
            handles.push((
                Source::Poll,
                tokio::spawn(async move {
                    match poll.run(sink.as_ref(), &cancel).await {
                        Ok(()) => LoopOutcome::Finished,
                        Err(e) => LoopOutcome::Failed(e.to_string()),
                    }
                }),
            ));
        }

        if let Some(mut stream) = self.stream {
            info!("Starting stream loop");
            let sink = sink.clone();
            let cancel = cancel.clone();
            handles.push((
                Source::Stream,
                tokio::spawn(async move {
                    match stream.run_supervised(sink.as_ref(), &cancel).await {
                        Ok(()) => LoopOutcome::Finished,
                        Err(e) => LoopOutcome::Failed(e.to_string()),
                    }
                }),
            ));
        }

        if let Some(weather) = self.weather {
            info!("Starting weather loop (interval {:?})", weather.interval());
            let sink = sink.clone();
            let cancel = cancel.clone();
            handles.push((
                Source::Weather,
                tokio::spawn(async move {
                    match weather.run(sink.as_ref(), &cancel).await {
                        Ok(()) => LoopOutcome::Finished,
                        Err(e) => LoopOutcome::Failed(e.to_string()),
                    }
                }),
            ));
        }

        // Loops hold their own clones; the consumer sees the channel close
        // once the last loop ends.
        drop(sink);

        let mut report = DispatchReport::default();
        for (source, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => LoopOutcome::Aborted(e.to_string()),
            };

            match &outcome {
                LoopOutcome::Finished => info!("[{}] Loop finished", source),
                LoopOutcome::Failed(e) => error!("[{}] Loop failed: {}", source, e),
                LoopOutcome::Aborted(e) => error!("[{}] Loop aborted: {}", source, e),
            }
            report.outcomes.push((source, outcome));
        }

        report
    }
}
