use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use strum::EnumString;

use super::de::null_as_default;

/// What the HVAC system attached to a thermostat is doing right now.
///
/// The API documents `heating`, `cooling` and `off`. Anything else is kept
/// verbatim in [`HvacState::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[strum(serialize_all = "snake_case")]
pub enum HvacState {
    Heating,
    Cooling,
    Off,
    #[strum(default)]
    Other(String),
}

impl HvacState {
    pub fn as_str(&self) -> &str {
        match self {
            HvacState::Heating => "heating",
            HvacState::Cooling => "cooling",
            HvacState::Off => "off",
            HvacState::Other(s) => s,
        }
    }
}

impl From<String> for HvacState {
    fn from(s: String) -> Self {
        HvacState::from_str(&s).unwrap_or_else(|_| HvacState::Other(s))
    }
}

impl From<HvacState> for String {
    fn from(state: HvacState) -> Self {
        match state {
            HvacState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for HvacState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single thermostat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThermostatState {
    /// Stable device identifier. Filled from the `devices` map key when the
    /// payload leaves it out.
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_id: String,

    /// Short display name (e.g. "Hallway")
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Long display name (e.g. "Hallway Thermostat (Upstairs)")
    #[serde(default, deserialize_with = "null_as_default")]
    pub name_long: String,

    /// Ambient temperature in whole degrees Fahrenheit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_temperature_f: Option<i64>,

    /// Relative humidity in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_state: Option<HvacState>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub software_version: String,

    /// Key into [`super::Snapshot::structures`]. May dangle.
    #[serde(default, deserialize_with = "null_as_default")]
    pub structure_id: String,
}
