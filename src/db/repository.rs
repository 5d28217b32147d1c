use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{plan, Activity, Completion, DailySchedule, SavedPlanConfig, TimeBlock, WeekPlan};
use crate::sync::SyncNotifier;

use super::schema::SCHEMA;

const PLAN_CONFIG_KEY: &str = "current";
const LAST_PULL: &str = "last_pull";

/// Named record stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    Activities,
    Schedules,
    Completions,
    WeekPlans,
    PlanConfigs,
    Settings,
}

impl Store {
    pub const ALL: [Store; 6] = [
        Store::Activities,
        Store::Schedules,
        Store::Completions,
        Store::WeekPlans,
        Store::PlanConfigs,
        Store::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Activities => "activities",
            Store::Schedules => "schedules",
            Store::Completions => "completions",
            Store::WeekPlans => "week_plans",
            Store::PlanConfigs => "plan_configs",
            Store::Settings => "settings",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Activities mirror the remote catalog and settings hold device-local caches
    pub fn is_synced(&self) -> bool {
        !matches!(self, Store::Activities | Store::Settings)
    }
}

/// A record as exchanged with the remote datastore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub store: String,
    pub key: String,
    #[serde(default)]
    pub index_value: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
    op_timeout: Duration,
    notifier: Option<SyncNotifier>,
}

impl Repository {
    pub async fn new(db_path: &str, op_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn, op_timeout).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, Duration::from_secs(3)).await
    }

    async fn init(conn: Connection, op_timeout: Duration) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            op_timeout,
            notifier: None,
        })
    }

    /// Clone of this repository that wakes the sync engine on every synced write
    pub fn with_notifier(&self, notifier: SyncNotifier) -> Self {
        Self {
            conn: self.conn.clone(),
            op_timeout: self.op_timeout,
            notifier: Some(notifier),
        }
    }

    pub fn with_timeout(&self, op_timeout: Duration) -> Self {
        Self {
            conn: self.conn.clone(),
            op_timeout,
            notifier: self.notifier.clone(),
        }
    }

    async fn timed<T, F>(&self, op: &str, fut: F) -> Option<Result<T>>
    where
        F: Future<Output = std::result::Result<T, tokio_rusqlite::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => Some(result.map_err(AppError::from)),
            Err(_) => {
                tracing::warn!("Storage {} timed out after {:?}", op, self.op_timeout);
                None
            }
        }
    }

    fn notify(&self, store: Store) {
        if store.is_synced() {
            if let Some(notifier) = &self.notifier {
                notifier.notify();
            }
        }
    }

    // Key-value capabilities

    async fn read_raw(&self, store: Store, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let key_for_error = key.clone();
        let read = self.conn.call(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM records WHERE store = ?1 AND key = ?2 AND deleted = 0",
                    params![store.as_str(), key],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            Ok(value.flatten())
        });

        match self.timed("read", read).await {
            Some(result) => result,
            None => Err(AppError::Timeout(format!(
                "read {}/{}",
                store.as_str(),
                key_for_error
            ))),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, store: Store, key: &str) -> Result<Option<T>> {
        match self.read_raw(store, key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Write a record. If the write does not confirm in time, the record is read back
    /// and the write counts as done when the stored value matches.
    pub async fn put<T: Serialize>(
        &self,
        store: Store,
        key: &str,
        index: Option<&str>,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let updated_at = timestamp(Utc::now());
        let dirty = store.is_synced();

        let (k, i, v) = (key.to_string(), index.map(str::to_string), json.clone());
        let write = self.conn.call(move |conn| {
            conn.execute(
                r#"INSERT INTO records (store, key, index_value, value, updated_at, dirty, deleted)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                   ON CONFLICT(store, key) DO UPDATE SET
                       index_value = excluded.index_value,
                       value = excluded.value,
                       updated_at = excluded.updated_at,
                       dirty = excluded.dirty,
                       deleted = 0"#,
                params![store.as_str(), k, i, v, updated_at, dirty],
            )?;
            Ok(())
        });

        match self.timed("write", write).await {
            Some(result) => result?,
            None => {
                let stored = self.read_raw(store, key).await?;
                if stored.as_deref() != Some(json.as_str()) {
                    return Err(AppError::Timeout(format!(
                        "write {}/{} not confirmed",
                        store.as_str(),
                        key
                    )));
                }
                tracing::debug!("Write {}/{} confirmed by read-back", store.as_str(), key);
            }
        }

        self.notify(store);
        Ok(())
    }

    /// Replace a record with a tombstone. A delete that times out is assumed to land.
    pub async fn delete(&self, store: Store, key: &str) -> Result<()> {
        let updated_at = timestamp(Utc::now());
        let dirty = store.is_synced();
        let k = key.to_string();
        let delete = self.conn.call(move |conn| {
            conn.execute(
                r#"UPDATE records SET value = NULL, deleted = 1, dirty = ?3, updated_at = ?4
                   WHERE store = ?1 AND key = ?2 AND deleted = 0"#,
                params![store.as_str(), k, dirty, updated_at],
            )?;
            Ok(())
        });

        match self.timed("delete", delete).await {
            Some(result) => result?,
            None => tracing::warn!("Treating timed out delete of {}/{} as done", store.as_str(), key),
        }

        self.notify(store);
        Ok(())
    }

    pub async fn get_all_by_index<T: DeserializeOwned>(
        &self,
        store: Store,
        index: &str,
    ) -> Result<Vec<T>> {
        let index = index.to_string();
        let read = self.conn.call(move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT value FROM records
                   WHERE store = ?1 AND index_value = ?2 AND deleted = 0
                   ORDER BY key"#,
            )?;
            let values = stmt
                .query_map(params![store.as_str(), index], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(values)
        });
        let values = self
            .timed("index scan", read)
            .await
            .unwrap_or_else(|| Err(AppError::Timeout(format!("index scan {}", store.as_str()))))?;
        decode_all(values)
    }

    /// Records with keys in `from..=to`, ordered by key
    pub async fn get_range<T: DeserializeOwned>(
        &self,
        store: Store,
        from: &str,
        to: &str,
    ) -> Result<Vec<T>> {
        let (from, to) = (from.to_string(), to.to_string());
        let read = self.conn.call(move |conn| {
            let mut stmt = conn.prepare(
                r#"SELECT value FROM records
                   WHERE store = ?1 AND key >= ?2 AND key <= ?3 AND deleted = 0
                   ORDER BY key"#,
            )?;
            let values = stmt
                .query_map(params![store.as_str(), from, to], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(values)
        });
        let values = self
            .timed("range scan", read)
            .await
            .unwrap_or_else(|| Err(AppError::Timeout(format!("range scan {}", store.as_str()))))?;
        decode_all(values)
    }

    pub async fn get_all<T: DeserializeOwned>(&self, store: Store) -> Result<Vec<T>> {
        // keys never start with U+FFFF, so this covers the whole store
        self.get_range(store, "", "\u{ffff}").await
    }

    // Schedules

    pub async fn get_schedule(&self, date: NaiveDate) -> Result<Option<DailySchedule>> {
        self.get(Store::Schedules, &date_key(date)).await
    }

    /// Stored schedule for the date, else that day of the saved week plan, else empty
    pub async fn load_schedule(&self, date: NaiveDate) -> Result<DailySchedule> {
        if let Some(schedule) = self.get_schedule(date).await? {
            return Ok(schedule);
        }
        let planned = self
            .get_week_plan(plan::week_start(date))
            .await?
            .and_then(|week| week.day(date).cloned());
        Ok(planned.unwrap_or_else(|| DailySchedule::new(date)))
    }

    pub async fn save_schedule(&self, schedule: &DailySchedule) -> Result<()> {
        let week = date_key(plan::week_start(schedule.date));
        self.put(Store::Schedules, &date_key(schedule.date), Some(&week), schedule)
            .await
    }

    pub async fn schedules_for_week(&self, week_start: NaiveDate) -> Result<Vec<DailySchedule>> {
        self.get_all_by_index(Store::Schedules, &date_key(week_start))
            .await
    }

    pub async fn schedules_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySchedule>> {
        self.get_range(Store::Schedules, &date_key(from), &date_key(to))
            .await
    }

    // Completions

    pub async fn set_completion(&self, completion: &Completion) -> Result<()> {
        self.put(
            Store::Completions,
            &completion.key(),
            Some(&date_key(completion.date)),
            completion,
        )
        .await
    }

    pub async fn remove_completion(&self, date: NaiveDate, activity_id: &str) -> Result<()> {
        self.delete(Store::Completions, &Completion::key_for(date, activity_id))
            .await
    }

    pub async fn get_completion(
        &self,
        date: NaiveDate,
        activity_id: &str,
    ) -> Result<Option<Completion>> {
        self.get(Store::Completions, &Completion::key_for(date, activity_id))
            .await
    }

    /// Flip the done state for (date, activity); returns whether it is now done
    pub async fn toggle_completion(
        &self,
        date: NaiveDate,
        activity_id: &str,
        time_block: TimeBlock,
    ) -> Result<bool> {
        if self.get_completion(date, activity_id).await?.is_some() {
            self.remove_completion(date, activity_id).await?;
            Ok(false)
        } else {
            self.set_completion(&Completion::new(date, activity_id, time_block))
                .await?;
            Ok(true)
        }
    }

    pub async fn completions_for_date(&self, date: NaiveDate) -> Result<Vec<Completion>> {
        self.get_all_by_index(Store::Completions, &date_key(date))
            .await
    }

    /// Ids of the activities completed on `date`
    pub async fn completed_ids(&self, date: NaiveDate) -> Result<HashSet<String>> {
        Ok(self
            .completions_for_date(date)
            .await?
            .into_iter()
            .map(|c| c.activity_id)
            .collect())
    }

    pub async fn completions_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Completion>> {
        // keys are "date:activity", so the upper bound needs the separator
        self.get_range(
            Store::Completions,
            &date_key(from),
            &format!("{}:\u{ffff}", date_key(to)),
        )
        .await
    }

    pub async fn all_completions(&self) -> Result<Vec<Completion>> {
        self.get_all(Store::Completions).await
    }

    pub async fn completions_for_activity(&self, activity_id: &str) -> Result<Vec<Completion>> {
        Ok(self
            .all_completions()
            .await?
            .into_iter()
            .filter(|c| c.activity_id == activity_id)
            .collect())
    }

    // Plans

    pub async fn get_plan_config(&self) -> Result<SavedPlanConfig> {
        Ok(self
            .get(Store::PlanConfigs, PLAN_CONFIG_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn save_plan_config(&self, config: &SavedPlanConfig) -> Result<()> {
        self.put(Store::PlanConfigs, PLAN_CONFIG_KEY, None, config)
            .await
    }

    pub async fn get_week_plan(&self, week_start: NaiveDate) -> Result<Option<WeekPlan>> {
        self.get(Store::WeekPlans, &date_key(week_start)).await
    }

    pub async fn save_week_plan(&self, plan: &WeekPlan) -> Result<()> {
        self.put(Store::WeekPlans, &plan.key(), None, plan).await
    }

    // Device-local caches

    pub async fn cached_activities(&self) -> Result<Vec<Activity>> {
        self.get_all(Store::Activities).await
    }

    pub async fn cache_activities(&self, activities: &[Activity]) -> Result<()> {
        for activity in activities {
            self.put(Store::Activities, &activity.id, None, activity)
                .await?;
        }
        Ok(())
    }

    pub async fn get_setting<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.get(Store::Settings, name).await
    }

    pub async fn put_setting<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        self.put(Store::Settings, name, None, value).await
    }

    // Sync support

    pub async fn has_dirty(&self) -> Result<bool> {
        let dirty = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM records WHERE dirty = 1", [], |row| {
                        row.get(0)
                    })?;
                Ok(count > 0)
            })
            .await?;
        Ok(dirty)
    }

    pub async fn dirty_records(&self) -> Result<Vec<SyncRecord>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT store, key, index_value, value, updated_at, deleted
                       FROM records WHERE dirty = 1 ORDER BY updated_at"#,
                )?;
                let rows = stmt
                    .query_map([], raw_record_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(RawRecord::into_sync_record).collect()
    }

    /// Clear the dirty flag on pushed records that were not rewritten since
    pub async fn mark_clean(&self, records: &[SyncRecord]) -> Result<usize> {
        let keys: Vec<(String, String, String)> = records
            .iter()
            .map(|r| (r.store.clone(), r.key.clone(), timestamp(r.updated_at)))
            .collect();

        let cleaned = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut cleaned = 0;
                {
                    let mut stmt = tx.prepare(
                        "UPDATE records SET dirty = 0 WHERE store = ?1 AND key = ?2 AND updated_at = ?3",
                    )?;
                    for (store, key, updated_at) in &keys {
                        cleaned += stmt.execute(params![store, key, updated_at])?;
                    }
                }
                tx.commit()?;
                Ok(cleaned)
            })
            .await?;
        Ok(cleaned)
    }

    /// Merge a remote record, last write wins. Returns whether local state changed.
    pub async fn apply_remote(&self, record: SyncRecord) -> Result<bool> {
        if Store::parse(&record.store).is_none() {
            tracing::warn!("Ignoring remote record for unknown store {}", record.store);
            return Ok(false);
        }

        let value = record
            .value
            .as_ref()
            .filter(|_| !record.deleted)
            .map(serde_json::to_string)
            .transpose()?;
        // compare at the precision timestamps are stored with
        let remote_at = record.updated_at.trunc_subsecs(6);

        let applied = self
            .conn
            .call(move |conn| {
                let local: Option<String> = conn
                    .query_row(
                        "SELECT updated_at FROM records WHERE store = ?1 AND key = ?2",
                        params![record.store, record.key],
                        |row| row.get(0),
                    )
                    .optional()?;

                let newer = match local.as_deref().and_then(parse_datetime) {
                    Some(local_at) => remote_at > local_at,
                    None => true,
                };
                if !newer {
                    return Ok(false);
                }

                conn.execute(
                    r#"INSERT INTO records (store, key, index_value, value, updated_at, dirty, deleted)
                       VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                       ON CONFLICT(store, key) DO UPDATE SET
                           index_value = excluded.index_value,
                           value = excluded.value,
                           updated_at = excluded.updated_at,
                           dirty = 0,
                           deleted = excluded.deleted"#,
                    params![
                        record.store,
                        record.key,
                        record.index_value,
                        value,
                        timestamp(remote_at),
                        record.deleted,
                    ],
                )?;
                Ok(true)
            })
            .await?;
        Ok(applied)
    }

    pub async fn last_pull(&self) -> Result<Option<DateTime<Utc>>> {
        let value = self
            .conn
            .call(|conn| {
                let value: Option<String> = conn
                    .query_row(
                        "SELECT value FROM sync_state WHERE name = ?1",
                        params![LAST_PULL],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value.as_deref().and_then(parse_datetime))
    }

    pub async fn set_last_pull(&self, at: DateTime<Utc>) -> Result<()> {
        let value = timestamp(at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO sync_state (name, value) VALUES (?1, ?2)",
                    params![LAST_PULL, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

struct RawRecord {
    store: String,
    key: String,
    index_value: Option<String>,
    value: Option<String>,
    updated_at: String,
    deleted: bool,
}

impl RawRecord {
    fn into_sync_record(self) -> Result<SyncRecord> {
        let value = match (&self.value, self.deleted) {
            (Some(json), false) => Some(serde_json::from_str(json)?),
            _ => None,
        };
        let updated_at = parse_datetime(&self.updated_at).unwrap_or_else(Utc::now);
        Ok(SyncRecord {
            store: self.store,
            key: self.key,
            index_value: self.index_value,
            value,
            updated_at,
            deleted: self.deleted,
        })
    }
}

fn raw_record_from_row(row: &Row) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        store: row.get(0)?,
        key: row.get(1)?,
        index_value: row.get(2)?,
        value: row.get(3)?,
        updated_at: row.get(4)?,
        deleted: row.get::<_, i64>(5)? != 0,
    })
}

fn decode_all<T: DeserializeOwned>(values: Vec<String>) -> Result<Vec<T>> {
    values
        .iter()
        .map(|json| serde_json::from_str(json).map_err(AppError::from))
        .collect()
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000000Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}
