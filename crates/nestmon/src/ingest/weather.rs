use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::poll::PollError;
use super::sink::Sink;
use super::sink::Update;
use crate::model::WeatherReport;
use crate::transport::Transport;
use crate::transport::Url;

/// Weather acquisition loop.
///
/// Fetches current conditions for one location on a fixed interval. Shares
/// the poll loop's failure policy: a failed cycle is logged and skipped, and
/// only a closed sink ends the loop.
pub struct WeatherLoop {
    transport: Arc<dyn Transport>,
    url: Url,
    location: String,
    interval: Duration,
}

impl WeatherLoop {
    /// `endpoint` is the current-weather URL; the location, key and unit
    /// system are added as query parameters.
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoint: &Url,
        zip: &str,
        app_id: &str,
        interval: Duration,
    ) -> Self {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("units", "imperial")
            .append_pair("zip", zip)
            .append_pair("APPID", app_id);

        Self {
            transport,
            url,
            location: zip.to_string(),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Poll until cancelled.
    pub async fn run(&self, sink: &dyn Sink, cancel: &CancellationToken) -> Result<(), PollError> {
        info!(
            "[weather] Weather data enabled for {} every {:?}",
            self.location, self.interval
        );

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                fetched = self.fetch_report() => fetched,
            };

            match fetched {
                Ok(report) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        delivered = sink.deliver(Update::weather(report)) => delivered?,
                    }
                    debug!("[weather] Delivered report");
                }
                Err(e) => warn!("[weather] Skipping cycle: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Run a single fetch-and-decode cycle.
    pub async fn fetch_report(&self) -> Result<WeatherReport, PollError> {
        // The URL carries the API key; log the location only.
        debug!("[weather] Requesting conditions for {}", self.location);
        let body = self.transport.fetch(&self.url).await?;
        Ok(WeatherReport::from_json(&body, self.location.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::sink::channel;
    use crate::ingest::sink::Source;
    use crate::transport::mock::MockTransport;

    const CONDITIONS: &str = r#"{"main": {"temp": 61.2, "humidity": 55}, "wind": {"speed": 3.4}}"#;

    fn endpoint() -> Url {
        Url::parse("https://api.openweathermap.org/data/2.5/weather").unwrap()
    }

    #[test]
    fn test_query_parameters() {
        let weather = WeatherLoop::new(
            Arc::new(MockTransport::new()),
            &endpoint(),
            "94040",
            "abc123",
            Duration::from_secs(60),
        );

        assert_eq!(
            weather.url.as_str(),
            "https://api.openweathermap.org/data/2.5/weather?units=imperial&zip=94040&APPID=abc123"
        );
        assert_eq!(weather.location(), "94040");
    }

    #[tokio::test]
    async fn test_fetch_report() {
        let weather = WeatherLoop::new(
            Arc::new(MockTransport::with_document(CONDITIONS)),
            &endpoint(),
            "94040",
            "abc123",
            Duration::from_secs(60),
        );

        let report = weather.fetch_report().await.unwrap();
        assert_eq!(report.location, "94040");
        assert_eq!(report.temperature_f, Some(61.2));
        assert_eq!(report.humidity_percent, Some(55.0));
        assert_eq!(report.wind_speed, Some(3.4));
    }

    #[tokio::test]
    async fn test_failed_cycle_is_skipped() {
        let transport = Arc::new(MockTransport::with_document(CONDITIONS));
        transport.push_response("<html>bad gateway</html>");
        let weather = WeatherLoop::new(
            transport.clone(),
            &endpoint(),
            "94040",
            "abc123",
            Duration::from_millis(20),
        );
        let (tx, mut rx) = channel(4);
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { weather.run(&tx, &cancel).await })
        };

        let update = rx.recv().await.unwrap();
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(update.source, Source::Weather);
        assert_eq!(update.weather_report().unwrap().temperature_f, Some(61.2));
        assert!(transport.fetch_count() >= 2);
    }

    #[tokio::test]
    async fn test_closed_sink_ends_loop() {
        let weather = WeatherLoop::new(
            Arc::new(MockTransport::with_document(CONDITIONS)),
            &endpoint(),
            "94040",
            "abc123",
            Duration::from_secs(60),
        );
        let (tx, rx) = channel(1);
        drop(rx);

        let result = weather.run(&tx, &CancellationToken::new()).await;
        assert!(matches!(result, Err(PollError::SinkClosed(_))));
    }
}
