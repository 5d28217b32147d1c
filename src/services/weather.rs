use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::WeatherConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::TimeBlock;

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

const FORECAST_CACHE: &str = "weather.forecast";
const LOCATION_CACHE: &str = "weather.location";

const RAIN_PROBABILITY: f64 = 50.0;
const HEAT_C: f64 = 32.0;
const FREEZING_C: f64 = 0.0;
const WIND_KMH: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub time: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub wind_kmh: Option<f64>,
    pub weather_code: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub latitude: f64,
    pub longitude: f64,
    pub fetched_at: DateTime<Utc>,
    pub hours: Vec<HourlyForecast>,
}

/// Ordered from most to least severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningKind {
    Storm,
    Rain,
    Heat,
    Freezing,
    Wind,
}

impl WarningKind {
    pub fn label(&self) -> &'static str {
        match self {
            WarningKind::Storm => "Thunderstorms",
            WarningKind::Rain => "Rain likely",
            WarningKind::Heat => "Very hot",
            WarningKind::Freezing => "Freezing",
            WarningKind::Wind => "Strong wind",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherWarning {
    pub kind: WarningKind,
    pub detail: String,
}

impl std::fmt::Display for WeatherWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.kind.label(), self.detail)
    }
}

fn hour_warning(hour: &HourlyForecast) -> Option<WeatherWarning> {
    let at = hour.time.format("%H:%M");
    if let Some(code) = hour.weather_code.filter(|c| (95..=99).contains(c)) {
        return Some(WeatherWarning {
            kind: WarningKind::Storm,
            detail: format!("code {} at {}", code, at),
        });
    }
    if let Some(p) = hour.precipitation_probability.filter(|p| *p >= RAIN_PROBABILITY) {
        return Some(WeatherWarning {
            kind: WarningKind::Rain,
            detail: format!("{:.0}% at {}", p, at),
        });
    }
    if let Some(t) = hour.temperature_c.filter(|t| *t >= HEAT_C) {
        return Some(WeatherWarning {
            kind: WarningKind::Heat,
            detail: format!("{:.0}°C at {}", t, at),
        });
    }
    if let Some(t) = hour.temperature_c.filter(|t| *t <= FREEZING_C) {
        return Some(WeatherWarning {
            kind: WarningKind::Freezing,
            detail: format!("{:.0}°C at {}", t, at),
        });
    }
    if let Some(w) = hour.wind_kmh.filter(|w| *w >= WIND_KMH) {
        return Some(WeatherWarning {
            kind: WarningKind::Wind,
            detail: format!("{:.0} km/h at {}", w, at),
        });
    }
    None
}

/// Most severe warning for outdoor activities during a block of the given day
pub fn outdoor_warning(
    forecast: &Forecast,
    date: NaiveDate,
    block: TimeBlock,
) -> Option<WeatherWarning> {
    forecast
        .hours
        .iter()
        .filter(|h| {
            h.time.date() == date
                && h.time.hour() >= block.start_hour()
                && h.time.hour() < block.end_hour()
        })
        .filter_map(hour_warning)
        .min_by_key(|w| w.kind)
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    hourly: HourlyResponse,
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<u32>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Location>,
}

impl ForecastResponse {
    fn into_forecast(self) -> Forecast {
        let hourly = self.hourly;
        let hours = hourly
            .time
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                let time = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M").ok()?;
                Some(HourlyForecast {
                    time,
                    temperature_c: hourly.temperature_2m.get(i).copied().flatten(),
                    precipitation_probability: hourly
                        .precipitation_probability
                        .get(i)
                        .copied()
                        .flatten(),
                    wind_kmh: hourly.wind_speed_10m.get(i).copied().flatten(),
                    weather_code: hourly.weather_code.get(i).copied().flatten(),
                })
            })
            .collect();

        Forecast {
            latitude: self.latitude,
            longitude: self.longitude,
            fetched_at: Utc::now(),
            hours,
        }
    }
}

pub struct WeatherClient {
    client: Client,
    forecast_url: String,
    geocoding_url: String,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("daily-rhythm/1.0")
            .build()?;
        Ok(Self {
            client,
            forecast_url: config
                .forecast_url
                .clone()
                .unwrap_or_else(|| FORECAST_URL.to_string()),
            geocoding_url: config
                .geocoding_url
                .clone()
                .unwrap_or_else(|| GEOCODING_URL.to_string()),
        })
    }

    pub async fn geocode(&self, name: &str) -> Result<Location> {
        let url = format!(
            "{}?name={}&count=1&format=json",
            self.geocoding_url,
            urlencoding::encode(name)
        );
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Weather(format!(
                "geocoding failed: HTTP {}",
                response.status()
            )));
        }

        let geocoding: GeocodingResponse = response.json().await?;
        geocoding
            .results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Weather(format!("no location found for {}", name)))
    }

    pub async fn forecast(&self, latitude: f64, longitude: f64) -> Result<Forecast> {
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                (
                    "hourly",
                    "temperature_2m,precipitation_probability,wind_speed_10m,weather_code"
                        .to_string(),
                ),
                ("timezone", "auto".to_string()),
                ("forecast_days", "3".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Weather(format!(
                "forecast failed: HTTP {}",
                response.status()
            )));
        }

        let forecast: ForecastResponse = response.json().await?;
        Ok(forecast.into_forecast())
    }

    async fn resolve_location(
        &self,
        repo: &Repository,
        config: &WeatherConfig,
    ) -> Result<Option<(f64, f64)>> {
        if let (Some(lat), Some(lon)) = (config.latitude, config.longitude) {
            return Ok(Some((lat, lon)));
        }
        let Some(name) = config.location.as_deref() else {
            return Ok(None);
        };

        if let Some(cached) = repo.get_setting::<Location>(LOCATION_CACHE).await? {
            if cached.name.eq_ignore_ascii_case(name) {
                return Ok(Some((cached.latitude, cached.longitude)));
            }
        }

        let mut location = self.geocode(name).await?;
        // cache under the configured spelling so the next lookup hits
        location.name = name.to_string();
        repo.put_setting(LOCATION_CACHE, &location).await?;
        Ok(Some((location.latitude, location.longitude)))
    }
}

/// Fresh forecast for the configured place, or the cached one when the network fails
pub async fn load_forecast(repo: &Repository, config: &WeatherConfig) -> Option<Forecast> {
    let fresh = async {
        let client = WeatherClient::new(config)?;
        let Some((lat, lon)) = client.resolve_location(repo, config).await? else {
            return Ok(None);
        };
        let forecast = client.forecast(lat, lon).await?;
        repo.put_setting(FORECAST_CACHE, &forecast).await?;
        Ok::<_, AppError>(Some(forecast))
    };

    match fresh.await {
        Ok(forecast) => forecast,
        Err(e) => {
            tracing::warn!("Weather unavailable, using cached forecast: {}", e);
            repo.get_setting(FORECAST_CACHE).await.ok().flatten()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(day: u32, h: u32) -> HourlyForecast {
        HourlyForecast {
            time: NaiveDate::from_ymd_opt(2026, 3, day)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
            temperature_c: Some(15.0),
            precipitation_probability: Some(10.0),
            wind_kmh: Some(10.0),
            weather_code: Some(1),
        }
    }

    fn forecast(hours: Vec<HourlyForecast>) -> Forecast {
        Forecast {
            latitude: 38.7,
            longitude: -9.1,
            fetched_at: Utc::now(),
            hours,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn calm_weather_has_no_warning() {
        let f = forecast((0..24).map(|h| hour(1, h)).collect());
        for block in TimeBlock::ALL {
            assert!(outdoor_warning(&f, date(), block).is_none());
        }
    }

    #[test]
    fn warnings_only_apply_inside_block_window() {
        let mut rainy = hour(1, 10);
        rainy.precipitation_probability = Some(80.0);
        let f = forecast(vec![hour(1, 8), rainy, hour(1, 13)]);

        assert!(outdoor_warning(&f, date(), TimeBlock::Before9Am).is_none());
        let warning = outdoor_warning(&f, date(), TimeBlock::Before12Pm).unwrap();
        assert_eq!(warning.kind, WarningKind::Rain);
        assert_eq!(warning.detail, "80% at 10:00");
        assert!(outdoor_warning(&f, date(), TimeBlock::Before3Pm).is_none());

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(outdoor_warning(&f, next_day, TimeBlock::Before12Pm).is_none());
    }

    #[test]
    fn most_severe_warning_wins() {
        let mut windy = hour(1, 15);
        windy.wind_kmh = Some(55.0);
        let mut hot = hour(1, 16);
        hot.temperature_c = Some(35.0);
        let mut storm = hour(1, 17);
        storm.weather_code = Some(95);

        let f = forecast(vec![windy.clone(), hot.clone()]);
        assert_eq!(
            outdoor_warning(&f, date(), TimeBlock::Before6Pm).unwrap().kind,
            WarningKind::Heat
        );

        let f = forecast(vec![windy, hot, storm]);
        assert_eq!(
            outdoor_warning(&f, date(), TimeBlock::Before6Pm).unwrap().kind,
            WarningKind::Storm
        );
    }

    #[test]
    fn freezing_detected() {
        let mut cold = hour(1, 7);
        cold.temperature_c = Some(-3.0);
        let f = forecast(vec![cold]);
        let warning = outdoor_warning(&f, date(), TimeBlock::Before9Am).unwrap();
        assert_eq!(warning.kind, WarningKind::Freezing);
        assert_eq!(warning.to_string(), "Freezing (-3°C at 07:00)");
    }

    #[test]
    fn forecast_response_parses_with_nulls() {
        let response: ForecastResponse = serde_json::from_str(
            r#"{
                "latitude": 38.72, "longitude": -9.14,
                "hourly": {
                    "time": ["2026-03-01T00:00", "2026-03-01T01:00", "garbage"],
                    "temperature_2m": [12.5, null, 1.0],
                    "precipitation_probability": [0, 60, 0],
                    "wind_speed_10m": [5.0, 7.5, 1.0],
                    "weather_code": [1, 61, 0]
                }
            }"#,
        )
        .unwrap();

        let forecast = response.into_forecast();
        assert_eq!(forecast.hours.len(), 2);
        assert_eq!(forecast.hours[1].temperature_c, None);
        assert_eq!(forecast.hours[1].precipitation_probability, Some(60.0));
        assert_eq!(forecast.hours[1].weather_code, Some(61));
    }

    // nothing listens on the discard port, so requests fail fast
    const UNREACHABLE: &str = "http://127.0.0.1:9/v1";

    fn offline(config: WeatherConfig) -> WeatherConfig {
        WeatherConfig {
            forecast_url: Some(format!("{}/forecast", UNREACHABLE)),
            geocoding_url: Some(format!("{}/search", UNREACHABLE)),
            ..config
        }
    }

    #[tokio::test]
    async fn unconfigured_location_fetches_nothing() {
        let repo = Repository::in_memory().await.unwrap();
        assert!(load_forecast(&repo, &WeatherConfig::default()).await.is_none());

        let cached = forecast(vec![hour(1, 7)]);
        repo.put_setting(FORECAST_CACHE, &cached).await.unwrap();
        assert!(load_forecast(&repo, &WeatherConfig::default()).await.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_cached_forecast() {
        let repo = Repository::in_memory().await.unwrap();
        let config = offline(WeatherConfig {
            latitude: Some(38.7),
            longitude: Some(-9.1),
            ..Default::default()
        });
        assert!(load_forecast(&repo, &config).await.is_none());

        let cached = forecast(vec![hour(1, 7)]);
        repo.put_setting(FORECAST_CACHE, &cached).await.unwrap();
        assert_eq!(load_forecast(&repo, &config).await, Some(cached));
    }

    #[tokio::test]
    async fn failed_geocoding_falls_back_to_cached_forecast() {
        let repo = Repository::in_memory().await.unwrap();
        let cached = forecast(vec![hour(1, 18)]);
        repo.put_setting(FORECAST_CACHE, &cached).await.unwrap();

        let config = offline(WeatherConfig {
            location: Some("Lisbon".into()),
            ..Default::default()
        });
        assert_eq!(load_forecast(&repo, &config).await, Some(cached));
    }
}
