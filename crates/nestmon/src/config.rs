//! Configuration file parsing and structures.
//!
//! nestmon uses TOML for configuration. Only `[api]` is required; every other
//! section falls back to defaults. Loading validates the whole file up front
//! so a bad config stops the daemon before any loop starts.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    /// Local weather; the section is optional
    #[serde(default)]
    pub weather: Option<WeatherConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"nestmon::ingest" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the per-target filter for the tracing subscriber.
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

pub const DEFAULT_ENDPOINT: &str = "https://developer-api.nest.com";

fn default_request_timeout_secs() -> u64 {
    30
}

/// Cloud API access
#[derive(Debug, Deserialize)]
#[serde(try_from = "RawApiConfig")]
pub struct ApiConfig {
    /// OAuth bearer token, obtained out of band
    pub access_token: String,

    /// Full-state endpoint used by the poll loop
    pub endpoint: Url,

    /// Event-stream endpoint; defaults to `endpoint`
    pub stream_endpoint: Option<Url>,

    /// Timeout for single-shot requests (seconds, 0 disables)
    pub request_timeout_secs: u64,
}

#[derive(Deserialize)]
struct RawApiConfig {
    access_token: String,
    endpoint: Option<String>,
    stream_endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

impl TryFrom<RawApiConfig> for ApiConfig {
    type Error = String;

    fn try_from(raw: RawApiConfig) -> Result<Self, Self::Error> {
        let parse = |field: &str, s: &str| {
            Url::parse(s).map_err(|e| format!("invalid URL for api.{}: {}", field, e))
        };
        let endpoint = parse("endpoint", raw.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT))?;
        let stream_endpoint = raw
            .stream_endpoint
            .as_deref()
            .map(|s| parse("stream_endpoint", s))
            .transpose()?;

        Ok(Self {
            access_token: raw.access_token,
            endpoint,
            stream_endpoint,
            request_timeout_secs: raw.request_timeout_secs,
        })
    }
}

impl ApiConfig {
    pub fn stream_endpoint(&self) -> &Url {
        self.stream_endpoint.as_ref().unwrap_or(&self.endpoint)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.request_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    180
}

/// Poll mode
#[derive(Debug, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between requests
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_idle_timeout_secs() -> u64 {
    90
}

fn default_backoff_initial_secs() -> u64 {
    1
}

fn default_backoff_max_secs() -> u64 {
    300
}

/// Stream mode
#[derive(Debug, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Drop a connection that has been silent this long (seconds, 0 disables).
    /// The API sends keep-alives every 30 seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Reconnect with exponential backoff when the stream ends
    #[serde(default = "default_true")]
    pub reconnect: bool,

    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_timeout_secs: default_idle_timeout_secs(),
            reconnect: true,
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.idle_timeout_secs)
    }
}

fn default_capacity() -> usize {
    crate::ingest::DEFAULT_CAPACITY
}

/// Update channel between the loops and the consumer
#[derive(Debug, Deserialize)]
pub struct SinkConfig {
    /// Updates buffered before producers block
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

pub const DEFAULT_WEATHER_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

fn default_weather_interval_secs() -> u64 {
    60
}

/// Weather mode (OpenWeatherMap current conditions)
#[derive(Debug, Deserialize)]
#[serde(try_from = "RawWeatherConfig")]
pub struct WeatherConfig {
    pub enabled: bool,

    /// Location to report on
    pub zip: String,

    /// OpenWeatherMap API key
    pub app_id: String,

    pub endpoint: Url,

    /// Seconds between requests
    pub interval_secs: u64,
}

#[derive(Deserialize)]
struct RawWeatherConfig {
    #[serde(default)]
    enabled: bool,
    zip: String,
    app_id: String,
    endpoint: Option<String>,
    #[serde(default = "default_weather_interval_secs")]
    interval_secs: u64,
}

impl TryFrom<RawWeatherConfig> for WeatherConfig {
    type Error = String;

    fn try_from(raw: RawWeatherConfig) -> Result<Self, Self::Error> {
        let endpoint = raw.endpoint.as_deref().unwrap_or(DEFAULT_WEATHER_ENDPOINT);
        let endpoint = Url::parse(endpoint)
            .map_err(|e| format!("invalid URL for weather.endpoint: {}", e))?;

        Ok(Self {
            enabled: raw.enabled,
            zip: raw.zip,
            app_id: raw.app_id,
            endpoint,
            interval_secs: raw.interval_secs,
        })
    }
}

impl WeatherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML source
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.access_token.trim().is_empty() {
            return Err(invalid("api.access_token", "must not be empty"));
        }

        check_http_url("api.endpoint", &self.api.endpoint)?;
        if let Some(url) = &self.api.stream_endpoint {
            check_http_url("api.stream_endpoint", url)?;
        }

        if self.poll.interval_secs == 0 {
            return Err(invalid("poll.interval_secs", "must be greater than 0"));
        }

        if self.stream.backoff_initial_secs == 0 {
            return Err(invalid("stream.backoff_initial_secs", "must be greater than 0"));
        }

        if self.stream.backoff_initial_secs > self.stream.backoff_max_secs {
            return Err(invalid(
                "stream.backoff_max_secs",
                "must not be less than stream.backoff_initial_secs",
            ));
        }

        if self.sink.capacity == 0 {
            return Err(invalid("sink.capacity", "must be greater than 0"));
        }

        if let Some(weather) = &self.weather {
            if weather.zip.trim().is_empty() {
                return Err(invalid("weather.zip", "must not be empty"));
            }
            if weather.app_id.trim().is_empty() {
                return Err(invalid("weather.app_id", "must not be empty"));
            }
            check_http_url("weather.endpoint", &weather.endpoint)?;
            if weather.interval_secs == 0 {
                return Err(invalid("weather.interval_secs", "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn check_http_url(field: &'static str, url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field,
            format!("unsupported scheme '{}', expected http or https", scheme),
        )),
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
