use std::sync::Arc;
use std::time::Duration;

use chrono::SubsecRound;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::db::Repository;
use crate::error::Result;

use super::remote::RemoteStore;

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    LocalWrite,
    PullNow,
    PushNow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Pushed(usize),
    Pulled(usize),
    /// Pull skipped because local writes are waiting to be pushed
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        }
    }
}

/// Wakes the sync engine after a local write without ever blocking the writer
#[derive(Clone)]
pub struct SyncNotifier {
    tx: mpsc::Sender<SyncCommand>,
}

impl SyncNotifier {
    pub fn notify(&self) {
        // a full queue already holds a write notice that will arm the debounce
        let _ = self.tx.try_send(SyncCommand::LocalWrite);
    }
}

pub struct SyncHandle {
    tx: mpsc::Sender<SyncCommand>,
    events: mpsc::Receiver<SyncEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn notifier(&self) -> SyncNotifier {
        SyncNotifier {
            tx: self.tx.clone(),
        }
    }

    pub fn pull_now(&self) {
        let _ = self.tx.try_send(SyncCommand::PullNow);
    }

    pub fn push_now(&self) {
        let _ = self.tx.try_send(SyncCommand::PushNow);
    }

    /// Non-blocking poll for the next engine event
    pub fn try_event(&mut self) -> Option<SyncEvent> {
        self.events.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Stop the engine, pushing pending writes first
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Sync task ended abnormally: {}", e);
        }
    }
}

pub struct SyncEngine {
    repo: Repository,
    remote: Arc<dyn RemoteStore>,
    settings: SyncSettings,
    events: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn spawn(
        repo: Repository,
        remote: Arc<dyn RemoteStore>,
        settings: SyncSettings,
    ) -> SyncHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let engine = SyncEngine {
            repo,
            remote,
            settings,
            events: events_tx,
        };
        let task = tokio::spawn(engine.run(rx, cancel.clone()));

        SyncHandle {
            tx,
            events: events_rx,
            cancel,
            task,
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<SyncCommand>, cancel: CancellationToken) {
        let mut poll = tokio::time::interval(self.settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadline: Option<Instant> = None;

        loop {
            let armed = deadline;
            let debounce = async move {
                match armed {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    if deadline.is_some() || self.repo.has_dirty().await.unwrap_or(false) {
                        self.push().await;
                    }
                    break;
                }
                command = rx.recv() => match command {
                    Some(SyncCommand::LocalWrite) => {
                        deadline = Some(Instant::now() + self.settings.debounce);
                    }
                    Some(SyncCommand::PushNow) => {
                        deadline = None;
                        self.push().await;
                    }
                    Some(SyncCommand::PullNow) => self.pull_if_idle(deadline.is_some()).await,
                    None => break,
                },
                _ = debounce => {
                    deadline = None;
                    self.push().await;
                }
                _ = poll.tick() => self.pull_if_idle(deadline.is_some()).await,
            }
        }

        tracing::debug!("Sync engine stopped");
    }

    async fn push(&self) {
        match push_dirty(&self.repo, self.remote.as_ref()).await {
            Ok(0) => {}
            Ok(n) => {
                tracing::info!("Pushed {} records", n);
                self.emit(SyncEvent::Pushed(n));
            }
            Err(e) => {
                tracing::warn!("Sync push failed: {}", e);
                self.emit(SyncEvent::Failed(e.to_string()));
            }
        }
    }

    async fn pull_if_idle(&self, debounce_armed: bool) {
        if debounce_armed {
            tracing::debug!("Skipping pull while local writes are pending");
            self.emit(SyncEvent::Skipped);
            return;
        }

        // leftovers from a failed push go out before anything is pulled over them
        match self.repo.has_dirty().await {
            Ok(true) => {
                self.push().await;
                if self.repo.has_dirty().await.unwrap_or(true) {
                    self.emit(SyncEvent::Skipped);
                    return;
                }
            }
            Ok(false) => {}
            Err(e) => {
                self.emit(SyncEvent::Failed(e.to_string()));
                return;
            }
        }

        match pull_remote(&self.repo, self.remote.as_ref()).await {
            Ok(n) => {
                if n > 0 {
                    tracing::info!("Pulled {} records", n);
                }
                self.emit(SyncEvent::Pulled(n));
            }
            Err(e) => {
                tracing::warn!("Sync pull failed: {}", e);
                self.emit(SyncEvent::Failed(e.to_string()));
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if self.events.try_send(event).is_err() {
            tracing::debug!("Dropping sync event, receiver is full or gone");
        }
    }
}

/// Push every dirty record and clear the ones not rewritten meanwhile
pub async fn push_dirty(repo: &Repository, remote: &dyn RemoteStore) -> Result<usize> {
    let records = repo.dirty_records().await?;
    if records.is_empty() {
        return Ok(0);
    }
    remote.push(&records).await?;
    repo.mark_clean(&records).await?;
    Ok(records.len())
}

/// Pull changes since the last cursor and merge them, last write wins
pub async fn pull_remote(repo: &Repository, remote: &dyn RemoteStore) -> Result<usize> {
    let since = repo.last_pull().await?;
    let response = remote.pull(since).await?;

    let mut changed = 0;
    let mut newest = since;
    for record in response.records {
        // cursor at the precision the store keeps
        let at = record.updated_at.trunc_subsecs(6);
        if repo.apply_remote(record).await? {
            changed += 1;
        }
        newest = Some(newest.map_or(at, |n| n.max(at)));
    }

    if let Some(cursor) = response.server_time.or(newest) {
        repo.set_last_pull(cursor).await?;
    }
    Ok(changed)
}

/// One push followed by one pull
pub async fn sync_once(repo: &Repository, remote: &dyn RemoteStore) -> Result<(usize, usize)> {
    let pushed = push_dirty(repo, remote).await?;
    let pulled = pull_remote(repo, remote).await?;
    Ok((pushed, pulled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, DailySchedule, TimeBlock};
    use crate::sync::remote::PullResponse;
    use crate::db::SyncRecord;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRemote {
        records: Mutex<Vec<SyncRecord>>,
        push_calls: Mutex<usize>,
        fail_push: bool,
    }

    #[async_trait]
    impl RemoteStore for FakeRemote {
        async fn push(&self, records: &[SyncRecord]) -> Result<()> {
            if self.fail_push {
                return Err(crate::error::AppError::Sync("offline".into()));
            }
            *self.push_calls.lock().unwrap() += 1;
            let mut stored = self.records.lock().unwrap();
            for record in records {
                stored.retain(|r| !(r.store == record.store && r.key == record.key));
                stored.push(record.clone());
            }
            Ok(())
        }

        async fn pull(&self, since: Option<DateTime<Utc>>) -> Result<PullResponse> {
            let records = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| since.map_or(true, |s| r.updated_at > s))
                .cloned()
                .collect();
            Ok(PullResponse {
                records,
                server_time: None,
            })
        }

        async fn fetch_activities(&self) -> Result<Vec<Activity>> {
            Ok(Vec::new())
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn remote_schedule(day: u32, id: &str) -> SyncRecord {
        let mut schedule = DailySchedule::new(d(day));
        schedule.add(TimeBlock::Before9Am, id);
        SyncRecord {
            store: "schedules".into(),
            key: format!("2026-03-{:02}", day),
            index_value: None,
            value: Some(serde_json::to_value(&schedule).unwrap()),
            updated_at: Utc::now(),
            deleted: false,
        }
    }

    fn settings(debounce_ms: u64) -> SyncSettings {
        SyncSettings {
            debounce: Duration::from_millis(debounce_ms),
            poll_interval: Duration::from_secs(600),
        }
    }

    async fn wait_for(handle: &mut SyncHandle, wanted: impl Fn(&SyncEvent) -> bool) -> SyncEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match handle.next_event().await {
                    Some(event) if wanted(&event) => return event,
                    Some(_) => continue,
                    None => panic!("sync engine stopped"),
                }
            }
        })
        .await
        .expect("timed out waiting for sync event")
    }

    #[tokio::test]
    async fn debounced_writes_are_pushed_together() {
        let repo = Repository::in_memory().await.unwrap();
        let remote = Arc::new(FakeRemote::default());
        let mut handle = SyncEngine::spawn(repo.clone(), remote.clone(), settings(100));
        wait_for(&mut handle, |e| matches!(e, SyncEvent::Pulled(_))).await;
        let repo = repo.with_notifier(handle.notifier());

        for day in 1..=3 {
            repo.save_schedule(&DailySchedule::new(d(day))).await.unwrap();
        }

        let event = wait_for(&mut handle, |e| matches!(e, SyncEvent::Pushed(_))).await;
        assert_eq!(event, SyncEvent::Pushed(3));
        assert_eq!(*remote.push_calls.lock().unwrap(), 1);
        assert_eq!(remote.records.lock().unwrap().len(), 3);
        assert!(!repo.has_dirty().await.unwrap());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn pull_is_skipped_while_debounce_is_armed() {
        let repo = Repository::in_memory().await.unwrap();
        let remote = Arc::new(FakeRemote::default());
        remote.records.lock().unwrap().push(remote_schedule(9, "yoga"));

        let mut handle = SyncEngine::spawn(repo.clone(), remote.clone(), settings(60_000));
        // startup pull
        wait_for(&mut handle, |e| matches!(e, SyncEvent::Pulled(_))).await;
        assert!(repo.get_schedule(d(9)).await.unwrap().is_some());

        remote.records.lock().unwrap().push(remote_schedule(10, "run"));
        let local = repo.with_notifier(handle.notifier());
        local.save_schedule(&DailySchedule::new(d(1))).await.unwrap();
        handle.pull_now();

        wait_for(&mut handle, |e| *e == SyncEvent::Skipped).await;
        assert!(repo.get_schedule(d(10)).await.unwrap().is_none());

        // shutdown flushes the pending write
        handle.shutdown().await;
        assert!(!repo.has_dirty().await.unwrap());
        assert!(remote
            .records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.key == "2026-03-01"));
    }

    #[tokio::test]
    async fn failed_push_keeps_records_dirty() {
        let repo = Repository::in_memory().await.unwrap();
        repo.save_schedule(&DailySchedule::new(d(1))).await.unwrap();
        let remote = FakeRemote {
            fail_push: true,
            ..Default::default()
        };

        assert!(sync_once(&repo, &remote).await.is_err());
        assert!(repo.has_dirty().await.unwrap());
    }

    #[tokio::test]
    async fn sync_once_pushes_then_pulls() {
        let repo = Repository::in_memory().await.unwrap();
        repo.save_schedule(&DailySchedule::new(d(1))).await.unwrap();
        let remote = FakeRemote::default();
        remote.records.lock().unwrap().push(remote_schedule(2, "run"));

        let (pushed, pulled) = sync_once(&repo, &remote).await.unwrap();
        assert_eq!(pushed, 1);
        // our own pushed record comes back but is not newer than the local copy
        assert_eq!(pulled, 1);
        assert!(repo.get_schedule(d(2)).await.unwrap().unwrap().contains("run"));
        assert!(repo.last_pull().await.unwrap().is_some());

        // records already merged stay merged on later polls
        for _ in 0..2 {
            let (pushed, pulled) = sync_once(&repo, &remote).await.unwrap();
            assert_eq!((pushed, pulled), (0, 0));
        }
    }
}
