use std::time;

use failure::format_err;
use serde::{Deserialize, Serialize};

use crate::config;

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

/// Thin proxy client for the public Open-Meteo forecast API. One bounded
/// request per call, no caching, no retry; the next poll simply tries again.
#[derive(Clone)]
pub struct WeatherClient {
    log: slog::Logger,
    client: reqwest::Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
}

/// The current-hour slice of the forecast, in the station's wire schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherNow {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub precipitation_probability: f64,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct Forecast {
    hourly: Hourly,
}

#[derive(Debug, Deserialize)]
struct Hourly {
    time: Vec<String>,
    temperature_2m: Vec<f64>,
    relative_humidity_2m: Vec<f64>,
    soil_moisture_0_1cm: Vec<f64>,
    precipitation_probability: Vec<f64>,
}

impl WeatherClient {
    pub fn new(
        log: slog::Logger,
        config: &config::WeatherConfig,
    ) -> Result<Self, failure::Error> {
        let client = reqwest::Client::builder()
            .timeout(time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(WeatherClient {
            log,
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            latitude: config.latitude,
            longitude: config.longitude,
        })
    }

    pub async fn current(&self) -> Result<WeatherNow, failure::Error> {
        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}\
             &hourly=temperature_2m,relative_humidity_2m,soil_moisture_0_1cm,precipitation_probability\
             &forecast_days=1",
            self.base_url, self.latitude, self.longitude
        );
        slog::debug!(self.log, "fetching forecast"; "url" => &url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(format_err!(
                "weather upstream returned {}",
                response.status()
            ));
        }
        let forecast: Forecast = response.json().await?;
        first_hour(&forecast)
    }
}

/// The hourly arrays are index-aligned; the first element is the current hour.
fn first_hour(forecast: &Forecast) -> Result<WeatherNow, failure::Error> {
    let hourly = &forecast.hourly;
    match (
        hourly.time.first(),
        hourly.temperature_2m.first(),
        hourly.relative_humidity_2m.first(),
        hourly.soil_moisture_0_1cm.first(),
        hourly.precipitation_probability.first(),
    ) {
        (Some(time), Some(&temperature), Some(&humidity), Some(&soil), Some(&precipitation)) => {
            Ok(WeatherNow {
                temperature,
                humidity,
                soil_moisture: soil,
                precipitation_probability: precipitation,
                timestamp: time.clone(),
            })
        }
        _ => Err(format_err!("weather response missing hourly data")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_first_hour_of_forecast() {
        let forecast: Forecast = serde_json::from_str(
            r#"{
                "hourly": {
                    "time": ["2026-08-30T00:00", "2026-08-30T01:00"],
                    "temperature_2m": [24.3, 23.9],
                    "relative_humidity_2m": [82.0, 85.0],
                    "soil_moisture_0_1cm": [0.271, 0.268],
                    "precipitation_probability": [35.0, 40.0]
                }
            }"#,
        )
        .expect("forecast json");

        let now = first_hour(&forecast).expect("first hour");
        assert_eq!(now.temperature, 24.3);
        assert_eq!(now.humidity, 82.0);
        assert_eq!(now.soil_moisture, 0.271);
        assert_eq!(now.precipitation_probability, 35.0);
        assert_eq!(now.timestamp, "2026-08-30T00:00");
    }

    #[test]
    fn empty_hourly_arrays_are_an_error() {
        let forecast = Forecast {
            hourly: Hourly {
                time: Vec::new(),
                temperature_2m: Vec::new(),
                relative_humidity_2m: Vec::new(),
                soil_moisture_0_1cm: Vec::new(),
                precipitation_probability: Vec::new(),
            },
        };
        assert!(first_hour(&forecast).is_err());
    }

    #[test]
    fn wire_schema_is_camel_case() {
        let now = WeatherNow {
            temperature: 24.3,
            humidity: 82.0,
            soil_moisture: 0.271,
            precipitation_probability: 35.0,
            timestamp: "2026-08-30T00:00".to_owned(),
        };
        let value = serde_json::to_value(&now).unwrap();
        assert!(value.get("soilMoisture").is_some());
        assert!(value.get("precipitationProbability").is_some());
    }
}
