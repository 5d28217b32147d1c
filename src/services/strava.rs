use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::OAuthConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Catalog, Completion, CompletionSource, TimeBlock};

use super::calendar::TokenResponse;

const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const STRAVA_API_URL: &str = "https://www.strava.com/api/v3";

#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: i64,
    pub name: String,
    pub sport_type: String,
    /// Local wall-clock start, which Strava formats with a trailing Z
    pub start_date_local: String,
    #[serde(default)]
    pub elapsed_time: u32,
}

impl StravaActivity {
    pub fn local_start(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.start_date_local.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S")
            .ok()
    }
}

/// Catalog id for a Strava sport type
pub fn map_sport(sport_type: &str) -> Option<&'static str> {
    match sport_type {
        "Run" | "TrailRun" | "VirtualRun" => Some("run"),
        "Ride" | "VirtualRide" | "EBikeRide" | "GravelRide" | "MountainBikeRide" => {
            Some("cycling")
        }
        "Walk" | "Hike" => Some("walk"),
        "Yoga" => Some("yoga"),
        _ => None,
    }
}

pub struct StravaClient {
    client: Client,
    credentials: OAuthConfig,
}

impl StravaClient {
    pub fn new(credentials: OAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(STRAVA_TOKEN_URL)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Strava(format!("token refresh failed: {}", error_text)));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    pub async fn activities_since(&self, after: DateTime<Utc>) -> Result<Vec<StravaActivity>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/athlete/activities", STRAVA_API_URL))
            .bearer_auth(token)
            .query(&[
                ("after", after.timestamp().to_string()),
                ("per_page", "50".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Strava(format!(
                "activities fetch failed: HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Record completions for mapped Strava activities and put them on that day's schedule.
/// Activities already marked done are left alone, so re-importing is harmless.
pub async fn import_completions(
    repo: &Repository,
    activities: &[StravaActivity],
    catalog: &Catalog,
) -> Result<usize> {
    let mut imported = 0;

    for activity in activities {
        let Some(id) = map_sport(&activity.sport_type).filter(|id| catalog.contains(id)) else {
            tracing::debug!("No catalog match for Strava {}", activity.sport_type);
            continue;
        };
        let Some(start) = activity.local_start() else {
            tracing::warn!("Unparseable Strava start time: {}", activity.start_date_local);
            continue;
        };

        let date = start.date();
        if repo.get_completion(date, id).await?.is_some() {
            continue;
        }

        let block = TimeBlock::containing(start.hour());
        let completion = Completion {
            date,
            activity_id: id.to_string(),
            time_block: block,
            completed_at: start.and_utc(),
            source: CompletionSource::Strava,
        };
        repo.set_completion(&completion).await?;

        let mut schedule = repo.load_schedule(date).await?;
        if !schedule.contains(id) {
            schedule.add(block, id);
            repo.save_schedule(&schedule).await?;
        }

        tracing::info!(
            "Imported Strava activity {} ({}, {} min) as {}",
            activity.id,
            activity.name,
            activity.elapsed_time / 60,
            id
        );
        imported += 1;
    }

    Ok(imported)
}
