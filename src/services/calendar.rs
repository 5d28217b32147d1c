use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use reqwest::Client;
use serde::Deserialize;

use crate::config::OAuthConfig;
use crate::error::{AppError, Result};
use crate::models::TimeBlock;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_CALENDAR_URL: &str = "https://www.googleapis.com/calendar/v3/calendars";

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub all_day: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    summary: Option<String>,
    start: EventTime,
    end: EventTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl EventTime {
    /// Local wall-clock time; all-day events start at midnight
    fn to_local(&self) -> Option<(NaiveDateTime, bool)> {
        if let Some(dt) = &self.date_time {
            let parsed = DateTime::parse_from_rfc3339(dt).ok()?;
            return Some((parsed.with_timezone(&Local).naive_local(), false));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some((date.and_time(NaiveTime::MIN), true))
    }
}

impl EventItem {
    fn into_event(self) -> Option<CalendarEvent> {
        let (start, all_day) = self.start.to_local()?;
        let (end, _) = self.end.to_local()?;
        Some(CalendarEvent {
            summary: self.summary.unwrap_or_else(|| "(busy)".to_string()),
            start,
            end,
            all_day,
        })
    }
}

/// Blocks of `date` overlapped by timed events; all-day events block nothing
pub fn busy_blocks(events: &[CalendarEvent], date: NaiveDate) -> Vec<TimeBlock> {
    TimeBlock::ALL
        .into_iter()
        .filter(|block| {
            let Some(block_start) = date.and_hms_opt(block.start_hour(), 0, 0) else {
                return false;
            };
            let Some(block_end) = date.and_hms_opt(block.end_hour(), 0, 0) else {
                return false;
            };
            events
                .iter()
                .filter(|e| !e.all_day)
                .any(|e| e.start < block_end && e.end > block_start)
        })
        .collect()
}

pub struct CalendarClient {
    client: Client,
    credentials: OAuthConfig,
}

impl CalendarClient {
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
            .post(GOOGLE_TOKEN_URL)
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
            return Err(AppError::Calendar(format!("token refresh failed: {}", error_text)));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Events overlapping the local calendar day
    pub async fn events_for(&self, date: NaiveDate) -> Result<Vec<CalendarEvent>> {
        let token = self.access_token().await?;
        let calendar_id = self
            .credentials
            .calendar_id
            .as_deref()
            .unwrap_or("primary");

        let day_start = local_midnight(date)?;
        let day_end = local_midnight(date.succ_opt().unwrap_or(date))?;

        let response = self
            .client
            .get(format!(
                "{}/{}/events",
                GOOGLE_CALENDAR_URL,
                urlencoding::encode(calendar_id)
            ))
            .bearer_auth(token)
            .query(&[
                ("timeMin", day_start.to_rfc3339()),
                ("timeMax", day_end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Calendar(format!(
                "events fetch failed: HTTP {}",
                response.status()
            )));
        }

        let events: EventsResponse = response.json().await?;
        Ok(events
            .items
            .into_iter()
            .filter_map(EventItem::into_event)
            .collect())
    }
}

fn local_midnight(date: NaiveDate) -> Result<DateTime<Local>> {
    Local
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .ok_or_else(|| AppError::Calendar(format!("no local midnight on {}", date)))
}
