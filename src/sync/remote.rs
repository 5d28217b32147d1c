use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SyncConfig;
use crate::db::SyncRecord;
use crate::error::{AppError, Result};
use crate::models::Activity;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullResponse {
    pub records: Vec<SyncRecord>,
    pub server_time: Option<DateTime<Utc>>,
}

/// Remote datastore mirrored by the sync engine
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    async fn push(&self, records: &[SyncRecord]) -> Result<()>;

    async fn pull(&self, since: Option<DateTime<Utc>>) -> Result<PullResponse>;

    async fn fetch_activities(&self) -> Result<Vec<Activity>>;
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    records: &'a [SyncRecord],
}

pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid sync base_url: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("daily-rhythm/1.0")
            .build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Remote store for the configured server, or None when sync is off
    pub fn from_config(config: &SyncConfig) -> Result<Option<Arc<dyn RemoteStore>>> {
        let Some(base_url) = config.base_url.as_deref().filter(|_| config.is_configured()) else {
            return Ok(None);
        };
        let remote = Self::new(base_url, config.token.clone())?;
        Ok(Some(Arc::new(remote)))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("invalid sync endpoint {}: {}", path, e)))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn push(&self, records: &[SyncRecord]) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.endpoint("api/sync/push")?))
            .json(&PushRequest { records })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Sync(format!("push failed: HTTP {} {}", status, error_text)));
        }
        Ok(())
    }

    async fn pull(&self, since: Option<DateTime<Utc>>) -> Result<PullResponse> {
        let mut url = self.endpoint("api/sync/pull")?;
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::Micros, true));
        }

        let response = self.authorized(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Sync(format!("pull failed: HTTP {}", response.status())));
        }
        Ok(response.json().await?)
    }

    async fn fetch_activities(&self) -> Result<Vec<Activity>> {
        let response = self
            .authorized(self.client.get(self.endpoint("api/activities")?))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Sync(format!(
                "activities fetch failed: HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_base_url() {
        let remote = HttpRemoteStore::new("https://rhythm.example.com/", None).unwrap();
        assert_eq!(
            remote.endpoint("api/sync/pull").unwrap().as_str(),
            "https://rhythm.example.com/api/sync/pull"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        assert!(matches!(
            HttpRemoteStore::new("not a url", None),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn unconfigured_sync_has_no_remote() {
        let mut config = SyncConfig::default();
        assert!(HttpRemoteStore::from_config(&config).unwrap().is_none());

        config.base_url = Some("   ".into());
        assert!(HttpRemoteStore::from_config(&config).unwrap().is_none());

        config.base_url = Some("https://rhythm.example.com/".into());
        assert!(HttpRemoteStore::from_config(&config).unwrap().is_some());
    }

    #[test]
    fn pull_response_tolerates_missing_server_time() {
        let response: PullResponse = serde_json::from_str(
            r#"{"records":[{"store":"schedules","key":"2026-03-01","updated_at":"2026-03-01T08:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(response.records.len(), 1);
        assert!(!response.records[0].deleted);
        assert!(response.server_time.is_none());
    }
}
