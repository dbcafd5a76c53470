use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::de;
use super::structure::StructureInfo;
use super::thermostat::ThermostatState;

#[derive(Debug, thiserror::Error)]
#[error("failed to decode snapshot: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Complete view of known thermostats and structures at one instant.
///
/// Both maps distinguish "not observed" (`None`) from "observed, empty"
/// (`Some` of an empty map); decoding and encoding preserve the difference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(
        default,
        deserialize_with = "de::devices",
        skip_serializing_if = "Option::is_none"
    )]
    pub devices: Option<BTreeMap<String, ThermostatState>>,

    #[serde(
        default,
        deserialize_with = "de::structures",
        skip_serializing_if = "Option::is_none"
    )]
    pub structures: Option<BTreeMap<String, StructureInfo>>,
}

impl Snapshot {
    /// Decode a full-state document (the poll endpoint's response body).
    pub fn from_json(document: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Encode as a JSON document that [`Snapshot::from_json`] reads back unchanged.
    pub fn to_json(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode the value of a stream `data:` record.
    ///
    /// The push API wraps updates as `{"path": "/", "data": {...}}`; a bare
    /// snapshot document is accepted as well. Returns `Ok(None)` when the
    /// envelope carries `"data": null`.
    pub fn from_stream_payload(payload: &str) -> Result<Option<Self>, DecodeError> {
        let value: Value = serde_json::from_str(payload)?;

        let inner = match value {
            Value::Object(mut object) if object.contains_key("data") => {
                match object.remove("data") {
                    None | Some(Value::Null) => return Ok(None),
                    Some(data) => data,
                }
            }
            other => other,
        };

        Ok(Some(serde_json::from_value(inner)?))
    }

    /// Thermostats in device-id order. Empty when devices were not observed.
    pub fn thermostats(&self) -> impl Iterator<Item = (&String, &ThermostatState)> {
        self.devices.iter().flatten()
    }

    pub fn thermostat(&self, device_id: &str) -> Option<&ThermostatState> {
        self.devices.as_ref()?.get(device_id)
    }

    pub fn structure(&self, structure_id: &str) -> Option<&StructureInfo> {
        self.structures.as_ref()?.get(structure_id)
    }

    /// Name of the structure with the given id, or `None` for a dangling id.
    pub fn structure_name(&self, structure_id: &str) -> Option<&str> {
        self.structure(structure_id).map(|s| s.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HvacState;

    const FLAT_DOCUMENT: &str = r#"{
        "devices": {
            "d1": {
                "name": "Hallway",
                "name_long": "Hallway Thermostat",
                "ambient_temperature_f": 68,
                "humidity": 35,
                "hvac_state": "heating",
                "software_version": "5.9.3-5",
                "structure_id": "s1"
            }
        },
        "structures": {
            "s1": {"name": "Home", "time_zone": "America/New_York"}
        }
    }"#;

    fn hallway() -> ThermostatState {
        ThermostatState {
            device_id: "d1".to_string(),
            name: "Hallway".to_string(),
            name_long: "Hallway Thermostat".to_string(),
            ambient_temperature_f: Some(68),
            humidity: Some(35),
            hvac_state: Some(HvacState::Heating),
            software_version: "5.9.3-5".to_string(),
            structure_id: "s1".to_string(),
        }
    }

    #[test]
    fn test_decode_flat_devices() {
        let snapshot = Snapshot::from_json(FLAT_DOCUMENT).unwrap();

        assert_eq!(snapshot.thermostat("d1"), Some(&hallway()));
        let home = snapshot.structure("s1").unwrap();
        assert_eq!(home.structure_id, "s1");
        assert_eq!(home.name, "Home");
        assert_eq!(home.time_zone, "America/New_York");
    }

    #[test]
    fn test_decode_grouped_devices() {
        let json = r#"{
            "devices": {
                "thermostats": {
                    "d1": {"device_id": "d1", "name": "Hallway", "hvac_state": "off"}
                },
                "smoke_co_alarms": {
                    "a1": {"name": "Kitchen"}
                }
            }
        }"#;

        let snapshot = Snapshot::from_json(json).unwrap();
        let devices = snapshot.devices.as_ref().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices["d1"].name, "Hallway");
        assert_eq!(devices["d1"].hvac_state, Some(HvacState::Off));
        assert_eq!(snapshot.structures, None);
    }

    #[test]
    fn test_grouped_devices_without_thermostats() {
        let json = r#"{"devices": {"cameras": {}}}"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        assert_eq!(snapshot.devices, Some(BTreeMap::new()));
    }

    #[test]
    fn test_absent_and_empty_are_distinct() {
        let absent = Snapshot::from_json("{}").unwrap();
        assert_eq!(absent.devices, None);
        assert_eq!(absent.structures, None);

        let nulls = Snapshot::from_json(r#"{"devices": null, "structures": null}"#).unwrap();
        assert_eq!(nulls.devices, None);
        assert_eq!(nulls.structures, None);

        let empty = Snapshot::from_json(r#"{"devices": {}, "structures": {}}"#).unwrap();
        assert_eq!(empty.devices, Some(BTreeMap::new()));
        assert_eq!(empty.structures, Some(BTreeMap::new()));

        assert_eq!(Snapshot::from_json(&absent.to_json().unwrap()).unwrap(), absent);
        assert_eq!(Snapshot::from_json(&empty.to_json().unwrap()).unwrap(), empty);
    }

    #[test]
    fn test_encode_decode_preserves_snapshot() {
        let snapshot = Snapshot::from_json(FLAT_DOCUMENT).unwrap();
        let encoded = snapshot.to_json().unwrap();
        assert_eq!(Snapshot::from_json(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_stream_payload_envelope() {
        let payload = format!(r#"{{"path": "/", "data": {}}}"#, FLAT_DOCUMENT);
        let snapshot = Snapshot::from_stream_payload(&payload).unwrap().unwrap();
        assert_eq!(snapshot.thermostat("d1"), Some(&hallway()));
    }

    #[test]
    fn test_stream_payload_envelope_with_null_data() {
        let payload = r#"{"path": "/", "data": null}"#;
        assert_eq!(Snapshot::from_stream_payload(payload).unwrap(), None);
    }

    #[test]
    fn test_stream_payload_bare_document() {
        let snapshot = Snapshot::from_stream_payload(FLAT_DOCUMENT)
            .unwrap()
            .unwrap();
        assert_eq!(snapshot, Snapshot::from_json(FLAT_DOCUMENT).unwrap());
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(Snapshot::from_json("{not json").is_err());
        assert!(Snapshot::from_stream_payload("{not json").is_err());
    }

    #[test]
    fn test_dangling_structure_reference() {
        let json = r#"{"devices": {"d1": {"structure_id": "missing"}}, "structures": {}}"#;
        let snapshot = Snapshot::from_json(json).unwrap();

        let thermostat = snapshot.thermostat("d1").unwrap();
        assert_eq!(thermostat.structure_id, "missing");
        assert_eq!(snapshot.structure_name(&thermostat.structure_id), None);
    }

    #[test]
    fn test_thermostats_iterates_in_id_order() {
        let json = r#"{"devices": {"b": {}, "a": {}}}"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let ids: Vec<&str> = snapshot.thermostats().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert_eq!(Snapshot::default().thermostats().count(), 0);
    }
}
