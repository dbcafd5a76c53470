//! Default consumer: flattens each update into per-thermostat readings and
//! logs them, along with any weather reports.

use tracing::info;
use tracing::warn;

use crate::ingest::Payload;
use crate::ingest::Source;
use crate::ingest::UpdateReceiver;
use crate::model::HvacState;
use crate::model::Snapshot;
use crate::model::WeatherReport;

/// Structure name reported for a thermostat whose structure is not in the snapshot.
pub const UNKNOWN_STRUCTURE: &str = "unknown";

/// One thermostat's state, joined with the name of its structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub structure: &'a str,
    pub ambient_temperature_f: Option<i64>,
    pub humidity: Option<i64>,
    pub hvac_state: Option<&'a HvacState>,
    pub software_version: &'a str,
}

/// Readings for every thermostat in the snapshot, in device-id order.
pub fn readings(snapshot: &Snapshot) -> Vec<Reading<'_>> {
    snapshot
        .thermostats()
        .map(|(key, thermostat)| Reading {
            key,
            name: &thermostat.name,
            structure: snapshot
                .structure_name(&thermostat.structure_id)
                .unwrap_or(UNKNOWN_STRUCTURE),
            ambient_temperature_f: thermostat.ambient_temperature_f,
            humidity: thermostat.humidity,
            hvac_state: thermostat.hvac_state.as_ref(),
            software_version: &thermostat.software_version,
        })
        .collect()
}

/// Drain the update channel until every producer has gone away.
///
/// Returns the number of updates consumed.
pub async fn consume(mut rx: UpdateReceiver) -> usize {
    let mut count = 0;

    while let Some(update) = rx.recv().await {
        count += 1;

        match &update.payload {
            Payload::Thermostats(snapshot) => log_snapshot(update.source, snapshot),
            Payload::Weather(report) => log_weather(report),
        }
    }

    count
}

fn log_snapshot(source: Source, snapshot: &Snapshot) {
    let readings = readings(snapshot);
    if readings.is_empty() {
        warn!(source = %source, "Update contained no thermostats");
        return;
    }

    for reading in readings {
        info!(
            source = %source,
            key = reading.key,
            name = reading.name,
            structure = reading.structure,
            temperature_f = ?reading.ambient_temperature_f,
            humidity = ?reading.humidity,
            hvac_state = reading.hvac_state.map(HvacState::as_str).unwrap_or("-"),
            software_version = reading.software_version,
            "Thermostat reading"
        );
    }
}

fn log_weather(report: &WeatherReport) {
    info!(
        location = %report.location,
        temperature_f = ?report.temperature_f,
        humidity_percent = ?report.humidity_percent,
        wind_speed = ?report.wind_speed,
        "Weather reading"
    );
}
