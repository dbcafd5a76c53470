use std::collections::BTreeMap;

use serde::de;
use serde::Deserialize;
use serde::Deserializer;
use serde_json::Map;
use serde_json::Value;

use super::structure::StructureInfo;
use super::thermostat::ThermostatState;

/// Device categories the vendor nests under `devices`.
///
/// When any of these keys is present the payload is grouped and only
/// `thermostats` is read. Otherwise `devices` is a flat `device_id -> thermostat`
/// map.
const DEVICE_CATEGORIES: &[&str] = &["thermostats", "smoke_co_alarms", "cameras"];

/// Deserialize a field that may be `null`, substituting the type's default.
///
/// The API sends `null` for fields it has no value for yet (a freshly paired
/// thermostat has no `software_version`, for example).
pub(super) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize the `devices` object in either the grouped or the flat shape.
///
/// `null` and a missing field both mean "not observed" and produce `None`.
pub(super) fn devices<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, ThermostatState>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(mut map) = Option::<Map<String, Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };

    let grouped = map
        .keys()
        .any(|key| DEVICE_CATEGORIES.contains(&key.as_str()));

    let thermostats = if grouped {
        match map.remove("thermostats") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(value) => decode_map::<ThermostatState, D::Error>(value)?,
        }
    } else {
        decode_map::<ThermostatState, D::Error>(Value::Object(map))?
    };

    Ok(Some(
        thermostats
            .into_iter()
            .map(|(id, mut thermostat)| {
                if thermostat.device_id.is_empty() {
                    thermostat.device_id = id.clone();
                }
                (id, thermostat)
            })
            .collect(),
    ))
}

/// Deserialize the `structures` object, filling `structure_id` from the map key
/// when the entry omits it.
pub(super) fn structures<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, StructureInfo>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(structures) = Option::<BTreeMap<String, StructureInfo>>::deserialize(deserializer)?
    else {
        return Ok(None);
    };

    Ok(Some(
        structures
            .into_iter()
            .map(|(id, mut structure)| {
                if structure.structure_id.is_empty() {
                    structure.structure_id = id.clone();
                }
                (id, structure)
            })
            .collect(),
    ))
}

fn decode_map<T, E>(value: Value) -> Result<BTreeMap<String, T>, E>
where
    T: de::DeserializeOwned,
    E: de::Error,
{
    serde_json::from_value(value).map_err(E::custom)
}
