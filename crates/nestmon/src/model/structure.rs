use serde::Deserialize;
use serde::Serialize;

use super::de::null_as_default;

/// A structure (home) that owns one or more thermostats.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructureInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub structure_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// IANA time zone identifier (e.g. "America/New_York")
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_zone: String,
}
