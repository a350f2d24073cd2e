use log::{debug, info};
use serde::Deserialize;

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const CURRENT_FIELDS: &str =
    "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,weather_code,is_day";

#[derive(Debug, Clone, Deserialize)]
struct ForecastResponse {
    current: CurrentBlock,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentBlock {
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    weather_code: u16,
    is_day: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeoPlace>,
}

/// One geocoding hit: a named place with coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoPlace {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country: Option<String>,
}

/// Current conditions at one location.
#[derive(Debug, Clone)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub description: &'static str,
    pub is_day: bool,
}

/// WMO weather interpretation codes, as used by Open-Meteo.
pub fn wmo_description(code: u16) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Light rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Light snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Light showers",
        81 => "Moderate showers",
        82 => "Violent showers",
        85 => "Light snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with light hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown conditions",
    }
}

/// Open-Meteo client (no API key required).
pub struct WeatherClient {
    client: reqwest::Client,
}

impl WeatherClient {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("taskping")
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|err| format!("failed to create HTTP client: {err}"))?;
        Ok(Self { client })
    }

    /// Resolves a city name to coordinates via the geocoding endpoint.
    pub async fn geocode(&self, city: &str) -> Result<GeoPlace, String> {
        let url = format!(
            "{GEOCODING_URL}?name={}&count=1&language=en&format=json",
            urlencoding::encode(city.trim())
        );
        debug!("geocoding '{city}'");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| format!("geocoding request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("geocoding returned status {}", response.status()));
        }

        let parsed: GeocodingResponse = response
            .json()
            .await
            .map_err(|err| format!("failed to parse geocoding response: {err}"))?;

        parsed
            .results
            .into_iter()
            .next()
            .ok_or_else(|| format!("no location found for '{city}'"))
    }

    /// Fetches current conditions for a coordinate pair.
    pub async fn current(&self, latitude: f64, longitude: f64) -> Result<WeatherSnapshot, String> {
        let url = format!(
            "{FORECAST_URL}?latitude={latitude}&longitude={longitude}&current={CURRENT_FIELDS}"
        );
        debug!("fetching weather for {latitude},{longitude}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| format!("weather request failed: {err}"))?;

        if !response.status().is_success() {
            return Err(format!("weather API returned status {}", response.status()));
        }

        let parsed: ForecastResponse = response
            .json()
            .await
            .map_err(|err| format!("failed to parse weather response: {err}"))?;

        let current = parsed.current;
        info!(
            "weather: {}°C, code {} ({})",
            current.temperature_2m,
            current.weather_code,
            wmo_description(current.weather_code)
        );

        Ok(WeatherSnapshot {
            temperature: current.temperature_2m,
            feels_like: current.apparent_temperature,
            humidity: current.relative_humidity_2m,
            wind_speed: current.wind_speed_10m,
            description: wmo_description(current.weather_code),
            is_day: current.is_day == 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wmo_codes_map_to_descriptions() {
        assert_eq!(wmo_description(0), "Clear sky");
        assert_eq!(wmo_description(63), "Moderate rain");
        assert_eq!(wmo_description(95), "Thunderstorm");
        assert_eq!(wmo_description(42), "Unknown conditions");
    }

    #[test]
    fn forecast_response_parses() {
        let json = r#"{
            "latitude": 48.86,
            "longitude": 2.35,
            "current": {
                "temperature_2m": 12.4,
                "apparent_temperature": 10.9,
                "relative_humidity_2m": 71.0,
                "wind_speed_10m": 14.2,
                "weather_code": 2,
                "is_day": 1
            }
        }"#;
        let parsed: ForecastResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.current.weather_code, 2);
        assert_eq!(parsed.current.is_day, 1);
    }

    #[test]
    fn geocoding_response_tolerates_no_results() {
        let parsed: GeocodingResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
