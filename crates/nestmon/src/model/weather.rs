use serde::Deserialize;

use super::snapshot::DecodeError;

/// Current conditions at one location, as reported by OpenWeatherMap.
///
/// Values are in the units the request asked for (imperial: °F, mph).
/// A section missing from the response leaves its values at `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeatherReport {
    /// The location the report was requested for (a zip code).
    pub location: String,
    pub temperature_f: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub wind_speed: Option<f64>,
}

#[derive(Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    main: Option<Main>,
    #[serde(default)]
    wind: Option<Wind>,
}

#[derive(Deserialize)]
struct Main {
    temp: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Deserialize)]
struct Wind {
    speed: Option<f64>,
}

impl WeatherReport {
    /// Decode a current-weather response for `location`.
    pub fn from_json(document: &str, location: impl Into<String>) -> Result<Self, DecodeError> {
        let current: CurrentWeather = serde_json::from_str(document)?;
        let (temperature_f, humidity_percent) = match current.main {
            Some(main) => (main.temp, main.humidity),
            None => (None, None),
        };

        Ok(Self {
            location: location.into(),
            temperature_f,
            humidity_percent,
            wind_speed: current.wind.and_then(|wind| wind.speed),
        })
    }
}
