//! Point-in-time view of thermostats and structures reported by the cloud API.
//!
//! A [`Snapshot`] is built once by a decoder and never mutated afterwards;
//! loops hand it out as `Arc<Snapshot>`.

mod de;
mod snapshot;
mod structure;
mod thermostat;
mod weather;

pub use snapshot::DecodeError;
pub use snapshot::Snapshot;
pub use structure::StructureInfo;
pub use thermostat::HvacState;
pub use thermostat::ThermostatState;
pub use weather::WeatherReport;
