pub mod config;
pub mod ingest;
pub mod model;
pub mod report;
pub mod transport;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use ingest::Dispatcher;
pub use ingest::Payload;
pub use ingest::Source;
pub use ingest::Update;
pub use model::Snapshot;
pub use model::ThermostatState;
pub use model::WeatherReport;
pub use transport::HttpTransport;
pub use transport::Transport;
