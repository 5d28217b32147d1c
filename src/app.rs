use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::mpsc;

use crate::ai::{local_suggestions, Coach, CoachContext};
use crate::config::{Config, WeatherConfig};
use crate::db::Repository;
use crate::error::Result;
use crate::models::reorder::{drop_index, RowBounds};
use crate::models::stats::{activity_streaks, overall_streak, ActivityStreak, Streak};
use crate::models::{
    push_to_tomorrow, Activity, Catalog, Category, CoachAdvice, CoachStatus, DailySchedule, TimeBlock,
};
use crate::reminders::ReminderScheduler;
use crate::services::{
    busy_blocks, load_forecast, outdoor_warning, CalendarClient, Forecast, WeatherWarning,
};
use crate::sync::{load_catalog, HttpRemoteStore, SyncEngine, SyncEvent, SyncHandle, SyncSettings};
use crate::tui::AppAction;

const STATUS_TTL: Duration = Duration::from_secs(6);
const REMINDER_CHECK: Duration = Duration::from_secs(30);

/// Results of work spawned off the UI loop
pub enum BackgroundResult {
    Weather(Option<Forecast>),
    Busy {
        date: NaiveDate,
        result: std::result::Result<Vec<TimeBlock>, String>,
    },
    Coach {
        date: NaiveDate,
        result: std::result::Result<CoachAdvice, String>,
    },
}

/// One line of the day view: a block header or a scheduled activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Header(TimeBlock),
    Item { block: TimeBlock, index: usize },
}

impl Row {
    pub fn block(&self) -> TimeBlock {
        match self {
            Row::Header(block) | Row::Item { block, .. } => *block,
        }
    }
}

/// Where the day list was last drawn, for mouse hit-testing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListGeometry {
    pub top: u16,
    pub height: u16,
    pub offset: usize,
}

pub struct Picker {
    pub candidates: Vec<String>,
    pub selected: usize,
    pub block: TimeBlock,
}

pub struct App {
    // Data
    pub date: NaiveDate,
    pub today: NaiveDate,
    pub schedule: DailySchedule,
    pub completed: HashSet<String>,
    pub catalog: Catalog,
    pub streaks: Vec<ActivityStreak>,
    pub overall: Streak,
    pub forecast: Option<Forecast>,
    pub busy: Vec<TimeBlock>,

    // UI State
    pub selected: usize,
    pub show_help: bool,
    pub picker: Option<Picker>,
    pub list: ListGeometry,
    drag: Option<String>,
    pending_reload: bool,
    status: Option<(String, Instant)>,
    bell: bool,

    // Async state
    pub coach_status: CoachStatus,
    pub advice: Option<CoachAdvice>,
    coach_pending: Option<NaiveDate>,
    bg_rx: mpsc::Receiver<BackgroundResult>,
    bg_tx: mpsc::Sender<BackgroundResult>,
    reminders: Option<ReminderScheduler>,
    last_reminder_check: Option<Instant>,

    // Services
    pub repository: Repository,
    sync: Option<SyncHandle>,
    coach: Option<Arc<Coach>>,
    calendar: Option<Arc<CalendarClient>>,
    weather_config: WeatherConfig,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(
            &config.db_path,
            Duration::from_millis(config.storage_timeout_ms),
        )
        .await?;

        let remote = HttpRemoteStore::from_config(&config.sync)?;
        let catalog = load_catalog(&repository, remote.as_deref()).await;

        let (repository, sync) = match remote {
            Some(remote) => {
                let handle = SyncEngine::spawn(
                    repository.clone(),
                    remote,
                    SyncSettings::from(&config.sync),
                );
                (repository.with_notifier(handle.notifier()), Some(handle))
            }
            None => (repository, None),
        };

        let coach = config
            .claude_api_key
            .as_ref()
            .map(|key| Coach::new(key.clone()))
            .transpose()?
            .map(Arc::new);

        let calendar = config
            .google
            .clone()
            .map(CalendarClient::new)
            .transpose()?
            .map(Arc::new);

        let mut app = Self::with_parts(repository, catalog, Local::now().date_naive());
        app.sync = sync;
        app.coach = coach;
        app.calendar = calendar;
        app.weather_config = config.weather.clone();
        app.reminders = config
            .reminders
            .enabled
            .then(|| ReminderScheduler::new(config.reminders.lead_minutes));

        app.reload().await?;
        app.spawn_weather();
        app.spawn_calendar();
        Ok(app)
    }

    /// App over an existing repository with no network services attached
    pub fn with_parts(repository: Repository, catalog: Catalog, today: NaiveDate) -> Self {
        let (bg_tx, bg_rx) = mpsc::channel(8);
        Self {
            date: today,
            today,
            schedule: DailySchedule::new(today),
            completed: HashSet::new(),
            catalog,
            streaks: Vec::new(),
            overall: Streak::default(),
            forecast: None,
            busy: Vec::new(),
            selected: 0,
            show_help: false,
            picker: None,
            list: ListGeometry::default(),
            drag: None,
            pending_reload: false,
            status: None,
            bell: false,
            coach_status: CoachStatus::Idle,
            advice: None,
            coach_pending: None,
            bg_rx,
            bg_tx,
            reminders: None,
            last_reminder_check: None,
            repository,
            sync: None,
            coach: None,
            calendar: None,
            weather_config: WeatherConfig::default(),
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::new();
        for block in TimeBlock::ALL {
            rows.push(Row::Header(block));
            for index in 0..self.schedule.activities(block).len() {
                rows.push(Row::Item { block, index });
            }
        }
        rows
    }

    pub fn row_activity(&self, row: Row) -> Option<&str> {
        match row {
            Row::Header(_) => None,
            Row::Item { block, index } => self
                .schedule
                .activities(block)
                .get(index)
                .map(String::as_str),
        }
    }

    pub fn selected_row(&self) -> Option<Row> {
        self.rows().get(self.selected).copied()
    }

    pub fn selected_block(&self) -> TimeBlock {
        self.selected_row()
            .map(|row| row.block())
            .unwrap_or(TimeBlock::Before9Am)
    }

    pub fn selected_id(&self) -> Option<String> {
        self.selected_row()
            .and_then(|row| self.row_activity(row))
            .map(str::to_string)
    }

    pub fn selected_activity(&self) -> Option<&Activity> {
        let id = self.selected_id()?;
        self.catalog.get(&id)
    }

    fn select_activity(&mut self, id: &str) {
        if let Some(pos) = self
            .rows()
            .into_iter()
            .position(|row| self.row_activity(row) == Some(id))
        {
            self.selected = pos;
        }
    }

    pub fn is_done(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    pub fn streak_of(&self, id: &str) -> Option<&ActivityStreak> {
        self.streaks.iter().find(|s| s.activity_id == id)
    }

    pub fn weather_warnings(&self) -> Vec<(TimeBlock, WeatherWarning)> {
        let Some(forecast) = &self.forecast else {
            return Vec::new();
        };
        TimeBlock::ALL
            .into_iter()
            .filter_map(|block| outdoor_warning(forecast, self.date, block).map(|w| (block, w)))
            .collect()
    }

    /// Warning to show next to an outdoor activity in `block`
    pub fn warning_for(&self, id: &str, block: TimeBlock) -> Option<WeatherWarning> {
        let activity = self.catalog.get(id)?;
        if !activity.outdoor {
            return None;
        }
        outdoor_warning(self.forecast.as_ref()?, self.date, block)
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|(_, at)| at.elapsed() < STATUS_TTL)
            .map(|(message, _)| message.as_str())
    }

    /// Whether a reminder fired since the last call
    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell)
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_some()
    }

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => return Ok(true),

            AppAction::MoveUp => {
                self.selected = self.selected.saturating_sub(1);
            }

            AppAction::MoveDown => {
                let len = self.rows().len();
                if self.selected + 1 < len {
                    self.selected += 1;
                }
            }

            AppAction::ToggleDone => self.toggle_done().await?,

            AppAction::MoveItemUp => self.shift_within(-1).await?,
            AppAction::MoveItemDown => self.shift_within(1).await?,

            AppAction::MoveToPrevBlock => {
                let target = self.selected_block().prev();
                self.move_to_adjacent(target).await?;
            }
            AppAction::MoveToNextBlock => {
                let target = self.selected_block().next();
                self.move_to_adjacent(target).await?;
            }

            AppAction::PushToTomorrow => self.push_selected_to_tomorrow().await?,

            AppAction::RemoveActivity => {
                if let Some(id) = self.selected_id() {
                    self.schedule.remove(&id);
                    self.repository.save_schedule(&self.schedule).await?;
                    self.clamp_selection();
                    let name = self.catalog.name_of(&id).to_string();
                    self.set_status(format!("Removed {}", name));
                }
            }

            AppAction::OpenPicker => self.open_picker(),
            AppAction::PickerUp => {
                if let Some(picker) = &mut self.picker {
                    picker.selected = picker.selected.saturating_sub(1);
                }
            }
            AppAction::PickerDown => {
                if let Some(picker) = &mut self.picker {
                    if picker.selected + 1 < picker.candidates.len() {
                        picker.selected += 1;
                    }
                }
            }
            AppAction::PickerConfirm => {
                if let Some(picker) = self.picker.take() {
                    if let Some(id) = picker.candidates.get(picker.selected) {
                        self.schedule.add(picker.block, id);
                        self.repository.save_schedule(&self.schedule).await?;
                        self.select_activity(id);
                    }
                }
            }
            AppAction::PickerCancel => self.picker = None,

            AppAction::PrevDay => {
                if let Some(date) = self.date.pred_opt() {
                    self.go_to(date).await?;
                }
            }
            AppAction::NextDay => {
                if let Some(date) = self.date.succ_opt() {
                    self.go_to(date).await?;
                }
            }
            AppAction::Today => {
                self.today = Local::now().date_naive();
                self.go_to(self.today).await?;
            }

            AppAction::AskCoach => self.ask_coach(),
            AppAction::AcceptSuggestion(n) => self.accept_suggestion(n).await?,

            AppAction::OpenLink => {
                match self.selected_activity().and_then(|a| a.external_url()) {
                    Some(url) => {
                        if let Err(e) = open::that(url) {
                            tracing::warn!("Failed to open {}: {}", url, e);
                        }
                    }
                    None => self.set_status("No link for this activity"),
                }
            }

            AppAction::SyncNow => match &self.sync {
                Some(sync) => {
                    sync.push_now();
                    sync.pull_now();
                    self.set_status("Syncing...");
                }
                None => self.set_status("Sync is not configured"),
            },

            AppAction::ShowHelp => self.show_help = true,
            AppAction::HideHelp => self.show_help = false,

            AppAction::DragStart(y) => {
                let rows = self.rows();
                if let Some(pos) = self.row_at(y).filter(|pos| *pos < rows.len()) {
                    if let Some(id) = self.row_activity(rows[pos]) {
                        self.drag = Some(id.to_string());
                        self.selected = pos;
                    }
                }
            }
            AppAction::DragEnd(y) => {
                // target from the rows the user dropped onto
                let target = self.drop_target(y);
                let dragged = self.drag.take();

                // pulls that landed mid-drag go in before the drop is saved over them
                if std::mem::take(&mut self.pending_reload) {
                    self.reload().await?;
                }

                if let (Some(id), Some((block, index))) = (dragged, target) {
                    if self.schedule.move_to_block(&id, block, index) {
                        self.repository.save_schedule(&self.schedule).await?;
                    }
                    self.select_activity(&id);
                }
            }
        }

        Ok(false)
    }

    async fn toggle_done(&mut self) -> Result<()> {
        let Some(Row::Item { block, .. }) = self.selected_row() else {
            return Ok(());
        };
        let Some(id) = self.selected_id() else {
            return Ok(());
        };

        let done = self
            .repository
            .toggle_completion(self.date, &id, block)
            .await?;
        if done {
            self.completed.insert(id.clone());
        } else {
            self.completed.remove(&id);
        }
        self.refresh_stats().await?;

        let name = self.catalog.name_of(&id).to_string();
        self.set_status(if done {
            format!("Done: {}", name)
        } else {
            format!("Not done: {}", name)
        });
        Ok(())
    }

    async fn shift_within(&mut self, delta: isize) -> Result<()> {
        let Some(Row::Item { block, index }) = self.selected_row() else {
            return Ok(());
        };
        let Some(id) = self.selected_id() else {
            return Ok(());
        };
        let Some(target) = index.checked_add_signed(delta) else {
            return Ok(());
        };

        if self.schedule.move_within(block, index, target) {
            self.repository.save_schedule(&self.schedule).await?;
            self.select_activity(&id);
        }
        Ok(())
    }

    async fn move_to_adjacent(&mut self, target: Option<TimeBlock>) -> Result<()> {
        let (Some(id), Some(target)) = (self.selected_id(), target) else {
            return Ok(());
        };
        let end = self.schedule.activities(target).len();
        if self.schedule.move_to_block(&id, target, end) {
            self.repository.save_schedule(&self.schedule).await?;
            self.select_activity(&id);
        }
        Ok(())
    }

    async fn push_selected_to_tomorrow(&mut self) -> Result<()> {
        let (Some(id), Some(next_day)) = (self.selected_id(), self.date.succ_opt()) else {
            return Ok(());
        };

        let mut tomorrow = self.repository.load_schedule(next_day).await?;
        if push_to_tomorrow(&mut self.schedule, &mut tomorrow, &id) {
            self.repository.save_schedule(&self.schedule).await?;
            self.repository.save_schedule(&tomorrow).await?;
            self.clamp_selection();
            let name = self.catalog.name_of(&id).to_string();
            self.set_status(format!("Moved {} to {}", name, next_day.format("%a %d %b")));
        }
        Ok(())
    }

    fn open_picker(&mut self) {
        // grouped by category so related activities sit together
        let candidates: Vec<String> = Category::ALL
            .into_iter()
            .flat_map(|category| self.catalog.by_category(category))
            .filter(|a| !self.schedule.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();

        if candidates.is_empty() {
            self.set_status("Everything is already scheduled");
            return;
        }
        self.picker = Some(Picker {
            candidates,
            selected: 0,
            block: self.selected_block(),
        });
    }

    async fn go_to(&mut self, date: NaiveDate) -> Result<()> {
        if date == self.date {
            return Ok(());
        }
        self.date = date;
        self.selected = 0;
        self.busy.clear();
        self.advice = None;
        self.coach_status = if self.coach_pending == Some(date) {
            CoachStatus::Thinking
        } else {
            CoachStatus::Idle
        };
        self.reload().await?;
        self.spawn_calendar();
        Ok(())
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.schedule = self.repository.load_schedule(self.date).await?;
        self.completed = self.repository.completed_ids(self.date).await?;
        self.refresh_stats().await?;
        self.clamp_selection();
        Ok(())
    }

    async fn refresh_stats(&mut self) -> Result<()> {
        let all = self.repository.all_completions().await?;
        self.streaks = activity_streaks(&all, self.today);
        self.overall = overall_streak(&all, self.today);
        Ok(())
    }

    fn clamp_selection(&mut self) {
        let len = self.rows().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn weather_context(&self) -> Vec<(TimeBlock, String)> {
        self.weather_warnings()
            .into_iter()
            .map(|(block, warning)| (block, warning.to_string()))
            .collect()
    }

    fn local_advice(&self) -> CoachAdvice {
        let weather = self.weather_context();
        let context = CoachContext {
            schedule: &self.schedule,
            completed: &self.completed,
            streaks: &self.streaks,
            weather: &weather,
            busy: &self.busy,
        };
        CoachAdvice {
            suggestions: local_suggestions(&self.catalog, &context),
            model_version: "local".to_string(),
            generated_at: Utc::now(),
        }
    }

    fn ask_coach(&mut self) {
        if self.coach_pending == Some(self.date) {
            return;
        }

        let Some(coach) = self.coach.clone() else {
            self.advice = Some(self.local_advice());
            self.coach_status = CoachStatus::Offline;
            return;
        };

        self.coach_status = CoachStatus::Thinking;
        self.coach_pending = Some(self.date);

        let date = self.date;
        let schedule = self.schedule.clone();
        let completed = self.completed.clone();
        let streaks = self.streaks.clone();
        let weather = self.weather_context();
        let busy = self.busy.clone();
        let catalog = self.catalog.clone();
        let tx = self.bg_tx.clone();

        tokio::spawn(async move {
            let context = CoachContext {
                schedule: &schedule,
                completed: &completed,
                streaks: &streaks,
                weather: &weather,
                busy: &busy,
            };
            let result = match coach.suggest(&catalog, &context).await {
                Ok(suggestions) => Ok(CoachAdvice {
                    suggestions,
                    model_version: coach.model_version().to_string(),
                    generated_at: Utc::now(),
                }),
                Err(e) => Err(e.to_string()),
            };

            let _ = tx.send(BackgroundResult::Coach { date, result }).await;
        });
    }

    async fn accept_suggestion(&mut self, n: usize) -> Result<()> {
        let Some(advice) = &mut self.advice else {
            return Ok(());
        };
        if n >= advice.suggestions.len() {
            return Ok(());
        }
        let suggestion = advice.suggestions.remove(n);

        if !self.schedule.contains(&suggestion.activity_id) {
            self.schedule
                .add(suggestion.time_block, &suggestion.activity_id);
            self.repository.save_schedule(&self.schedule).await?;
            self.select_activity(&suggestion.activity_id);
            let name = self.catalog.name_of(&suggestion.activity_id).to_string();
            self.set_status(format!("Added {} to {}", name, suggestion.time_block.label()));
        }
        Ok(())
    }

    fn spawn_weather(&self) {
        let config = self.weather_config.clone();
        if !config.is_configured() {
            return;
        }
        let repo = self.repository.clone();
        let tx = self.bg_tx.clone();

        tokio::spawn(async move {
            let forecast = load_forecast(&repo, &config).await;
            let _ = tx.send(BackgroundResult::Weather(forecast)).await;
        });
    }

    fn spawn_calendar(&self) {
        let Some(calendar) = self.calendar.clone() else {
            return;
        };
        let date = self.date;
        let tx = self.bg_tx.clone();

        tokio::spawn(async move {
            let result = calendar
                .events_for(date)
                .await
                .map(|events| busy_blocks(&events, date))
                .map_err(|e| e.to_string());
            let _ = tx.send(BackgroundResult::Busy { date, result }).await;
        });
    }

    /// Apply finished background work and sync engine events (non-blocking)
    pub async fn poll_background(&mut self) -> Result<()> {
        while let Ok(result) = self.bg_rx.try_recv() {
            match result {
                BackgroundResult::Weather(forecast) => self.forecast = forecast,

                BackgroundResult::Busy { date, result } if date == self.date => match result {
                    Ok(blocks) => self.busy = blocks,
                    Err(e) => {
                        tracing::warn!("Calendar unavailable: {}", e);
                        self.set_status("Calendar unavailable");
                    }
                },
                // busy blocks for a day no longer on screen
                BackgroundResult::Busy { .. } => {}

                BackgroundResult::Coach { date, result } => {
                    if self.coach_pending == Some(date) {
                        self.coach_pending = None;
                    }
                    if date != self.date {
                        continue;
                    }
                    match result {
                        Ok(advice) => {
                            self.advice = Some(advice);
                            self.coach_status = CoachStatus::Ready;
                        }
                        Err(e) => {
                            tracing::error!("Coach request failed: {}", e);
                            self.advice = Some(self.local_advice());
                            self.coach_status = CoachStatus::Failed;
                        }
                    }
                }
            }
        }

        let events: Vec<SyncEvent> = match &mut self.sync {
            Some(sync) => std::iter::from_fn(|| sync.try_event()).collect(),
            None => Vec::new(),
        };
        self.apply_sync_events(events).await
    }

    async fn apply_sync_events(&mut self, events: Vec<SyncEvent>) -> Result<()> {
        let mut reload = false;
        for event in events {
            match event {
                SyncEvent::Pushed(n) => self.set_status(format!("Synced {} changes", n)),
                SyncEvent::Pulled(n) if n > 0 => {
                    reload = true;
                    self.set_status(format!("Pulled {} changes", n));
                }
                SyncEvent::Failed(e) => self.set_status(format!("Sync failed: {}", e)),
                SyncEvent::Pulled(_) | SyncEvent::Skipped => {}
            }
        }
        if reload {
            if self.drag.is_some() {
                self.pending_reload = true;
            } else {
                self.reload().await?;
            }
        }
        Ok(())
    }

    /// Check today's blocks for reminders every little while
    pub async fn check_reminders(&mut self) -> Result<()> {
        if self.reminders.is_none()
            || self
                .last_reminder_check
                .is_some_and(|at| at.elapsed() < REMINDER_CHECK)
        {
            return Ok(());
        }
        self.last_reminder_check = Some(Instant::now());

        let now = Local::now().naive_local();
        self.today = now.date();

        let (schedule, done) = if self.date == self.today {
            (self.schedule.clone(), self.completed.clone())
        } else {
            (
                self.repository.load_schedule(self.today).await?,
                self.repository.completed_ids(self.today).await?,
            )
        };

        let due = match self.reminders.as_mut() {
            Some(scheduler) => scheduler.due(now, &schedule, &done, &self.catalog),
            None => return Ok(()),
        };
        if let Some(reminder) = due.last() {
            tracing::info!("Reminder: {}", reminder.message());
            self.set_status(reminder.message());
            self.bell = true;
        }
        Ok(())
    }

    fn row_at(&self, y: u16) -> Option<usize> {
        if y < self.list.top || y >= self.list.top.saturating_add(self.list.height) {
            return None;
        }
        Some((y - self.list.top) as usize + self.list.offset)
    }

    /// Block and insertion index for a drop at screen row `y`
    pub fn drop_target(&self, y: u16) -> Option<(TimeBlock, usize)> {
        let rows = self.rows();
        let pos = self.row_at(y)?.min(rows.len().checked_sub(1)?);
        let block = rows[pos].block();

        let top = self.list.top;
        let offset = self.list.offset;
        let bounds: Vec<RowBounds> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| matches!(row, Row::Item { block: b, .. } if *b == block))
            .map(|(i, _)| {
                let row_top = if i >= offset {
                    top.saturating_add((i - offset) as u16)
                } else {
                    top.saturating_sub((offset - i) as u16)
                };
                RowBounds::new(row_top, 1)
            })
            .collect();

        Some((block, drop_index(y, &bounds)))
    }

    /// Stop the sync engine, pushing anything still pending
    pub async fn shutdown(&mut self) {
        if let Some(sync) = self.sync.take() {
            sync.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Suggestion;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
    }

    async fn app_with(ids: &[(TimeBlock, &str)]) -> App {
        let repo = Repository::in_memory().await.unwrap();
        let mut schedule = DailySchedule::new(day());
        for (block, id) in ids {
            schedule.add(*block, id);
        }
        repo.save_schedule(&schedule).await.unwrap();

        let mut app = App::with_parts(repo, Catalog::default(), day());
        app.reload().await.unwrap();
        app
    }

    #[tokio::test]
    async fn rows_interleave_headers_and_items() {
        let app = app_with(&[
            (TimeBlock::Before9Am, "meditation"),
            (TimeBlock::Before3Pm, "plank"),
        ])
        .await;

        let rows = app.rows();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0], Row::Header(TimeBlock::Before9Am));
        assert_eq!(app.row_activity(rows[1]), Some("meditation"));
        assert_eq!(rows[4], Row::Item { block: TimeBlock::Before3Pm, index: 0 });
    }

    #[tokio::test]
    async fn toggling_twice_restores_state() {
        let mut app = app_with(&[(TimeBlock::Before9Am, "meditation")]).await;
        app.selected = 1;

        app.handle_action(AppAction::ToggleDone).await.unwrap();
        assert!(app.is_done("meditation"));
        assert_eq!(app.streak_of("meditation").unwrap().current, 1);

        app.handle_action(AppAction::ToggleDone).await.unwrap();
        assert!(!app.is_done("meditation"));
        assert!(app
            .repository
            .get_completion(day(), "meditation")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn headers_ignore_item_actions() {
        let mut app = app_with(&[(TimeBlock::Before9Am, "meditation")]).await;
        app.selected = 0;
        app.handle_action(AppAction::ToggleDone).await.unwrap();
        app.handle_action(AppAction::PushToTomorrow).await.unwrap();
        assert!(app.completed.is_empty());
        assert!(app.schedule.contains("meditation"));
    }

    #[tokio::test]
    async fn reorder_and_block_moves_persist() {
        let mut app = app_with(&[
            (TimeBlock::Before9Am, "meditation"),
            (TimeBlock::Before9Am, "run"),
        ])
        .await;
        app.selected = 2;

        app.handle_action(AppAction::MoveItemUp).await.unwrap();
        assert_eq!(app.schedule.activities(TimeBlock::Before9Am), ["run", "meditation"]);
        assert_eq!(app.selected_id().as_deref(), Some("run"));

        app.handle_action(AppAction::MoveToNextBlock).await.unwrap();
        assert_eq!(app.schedule.block_of("run"), Some(TimeBlock::Before12Pm));
        assert_eq!(app.selected_id().as_deref(), Some("run"));

        let stored = app.repository.get_schedule(day()).await.unwrap().unwrap();
        assert_eq!(stored, app.schedule);
    }

    #[tokio::test]
    async fn push_to_tomorrow_moves_between_days() {
        let mut app = app_with(&[(TimeBlock::Before6Pm, "yoga")]).await;
        app.select_activity("yoga");

        app.handle_action(AppAction::PushToTomorrow).await.unwrap();
        assert!(!app.schedule.contains("yoga"));

        app.handle_action(AppAction::NextDay).await.unwrap();
        assert_eq!(app.date, day().succ_opt().unwrap());
        assert_eq!(app.schedule.activities(TimeBlock::Before6Pm), ["yoga"]);
    }

    #[tokio::test]
    async fn drag_and_drop_across_blocks() {
        let mut app = app_with(&[
            (TimeBlock::Before9Am, "meditation"),
            (TimeBlock::Before9Am, "run"),
            (TimeBlock::Before12Pm, "pushups"),
            (TimeBlock::Before12Pm, "walk"),
        ])
        .await;
        // rows start below a one-line border at y = 1
        app.list = ListGeometry {
            top: 1,
            height: 20,
            offset: 0,
        };
        // 1 header 9am, 2 meditation, 3 run, 4 header 12pm, 5 pushups, 6 walk

        app.handle_action(AppAction::DragStart(2)).await.unwrap();
        app.handle_action(AppAction::DragEnd(6)).await.unwrap();
        assert_eq!(app.schedule.activities(TimeBlock::Before9Am), ["run"]);
        assert_eq!(
            app.schedule.activities(TimeBlock::Before12Pm),
            ["pushups", "meditation", "walk"]
        );

        // 1 header 9am, 2 run, 3 header 12pm, 4 pushups, 5 meditation, 6 walk
        app.handle_action(AppAction::DragStart(6)).await.unwrap();
        app.handle_action(AppAction::DragEnd(3)).await.unwrap();
        assert_eq!(
            app.schedule.activities(TimeBlock::Before12Pm),
            ["walk", "pushups", "meditation"]
        );

        // dropping below the last row lands in the last block
        app.handle_action(AppAction::DragStart(2)).await.unwrap();
        app.handle_action(AppAction::DragEnd(19)).await.unwrap();
        assert_eq!(app.schedule.activities(TimeBlock::Before9Pm), ["run"]);
    }

    #[tokio::test]
    async fn drag_from_header_does_nothing() {
        let mut app = app_with(&[(TimeBlock::Before9Am, "meditation")]).await;
        app.list = ListGeometry {
            top: 1,
            height: 10,
            offset: 0,
        };
        let before = app.schedule.clone();
        app.handle_action(AppAction::DragStart(1)).await.unwrap();
        app.handle_action(AppAction::DragEnd(5)).await.unwrap();
        assert_eq!(app.schedule, before);
    }

    #[tokio::test]
    async fn picker_adds_to_selected_block() {
        let mut app = app_with(&[]).await;
        // header of the 3 PM block
        app.selected = 2;

        app.handle_action(AppAction::OpenPicker).await.unwrap();
        let picker = app.picker.as_ref().unwrap();
        assert_eq!(picker.block, TimeBlock::Before3Pm);
        assert_eq!(picker.candidates.len(), app.catalog.len());

        let categories: Vec<Category> = picker
            .candidates
            .iter()
            .map(|id| app.catalog.get(id).unwrap().category)
            .collect();
        assert_eq!(&categories[..3], [Category::Mobility; 3]);

        app.handle_action(AppAction::PickerDown).await.unwrap();
        app.handle_action(AppAction::PickerConfirm).await.unwrap();
        assert!(app.picker.is_none());
        assert_eq!(app.schedule.activities(TimeBlock::Before3Pm), ["posture-break"]);
    }

    #[tokio::test]
    async fn offline_coach_suggests_locally_and_accepts() {
        let mut app = app_with(&[(TimeBlock::Before9Am, "meditation")]).await;

        app.handle_action(AppAction::AskCoach).await.unwrap();
        assert_eq!(app.coach_status, CoachStatus::Offline);
        let advice = app.advice.as_ref().unwrap();
        assert_eq!(advice.model_version, "local");
        assert!(!advice.suggestions.is_empty());

        let first: Suggestion = advice.suggestions[0].clone();
        app.handle_action(AppAction::AcceptSuggestion(0)).await.unwrap();
        assert_eq!(app.schedule.block_of(&first.activity_id), Some(first.time_block));
        assert!(app
            .advice
            .as_ref()
            .unwrap()
            .suggestions
            .iter()
            .all(|s| s.activity_id != first.activity_id));
    }

    #[tokio::test]
    async fn late_answer_for_another_day_keeps_pending_request() {
        let mut app = app_with(&[]).await;
        app.coach_status = CoachStatus::Thinking;
        app.coach_pending = Some(day());

        app.bg_tx
            .send(BackgroundResult::Coach {
                date: day().pred_opt().unwrap(),
                result: Err("late".into()),
            })
            .await
            .unwrap();
        app.poll_background().await.unwrap();
        assert_eq!(app.coach_status, CoachStatus::Thinking);

        // a second ask while the first is out does nothing
        app.handle_action(AppAction::AskCoach).await.unwrap();
        assert!(app.advice.is_none());
        assert_eq!(app.coach_pending, Some(day()));

        let advice = CoachAdvice {
            suggestions: Vec::new(),
            model_version: "test".into(),
            generated_at: Utc::now(),
        };
        app.bg_tx
            .send(BackgroundResult::Coach { date: day(), result: Ok(advice) })
            .await
            .unwrap();
        app.poll_background().await.unwrap();
        assert_eq!(app.coach_status, CoachStatus::Ready);
        assert!(app.coach_pending.is_none());
    }

    #[tokio::test]
    async fn pending_request_shows_again_when_returning_to_its_day() {
        let mut app = app_with(&[]).await;
        app.coach_status = CoachStatus::Thinking;
        app.coach_pending = Some(day());

        app.handle_action(AppAction::NextDay).await.unwrap();
        assert_eq!(app.coach_status, CoachStatus::Idle);
        app.handle_action(AppAction::PrevDay).await.unwrap();
        assert_eq!(app.coach_status, CoachStatus::Thinking);
    }

    #[tokio::test]
    async fn pulls_during_a_drag_reload_on_drop() {
        let mut app = app_with(&[(TimeBlock::Before9Am, "meditation")]).await;
        app.list = ListGeometry {
            top: 1,
            height: 20,
            offset: 0,
        };

        // 1 header 9am, 2 meditation
        app.handle_action(AppAction::DragStart(2)).await.unwrap();

        // a pull rewrote the day underneath
        let mut pulled = app.schedule.clone();
        pulled.add(TimeBlock::Before9Pm, "gratitude");
        app.repository.save_schedule(&pulled).await.unwrap();
        app.apply_sync_events(vec![SyncEvent::Pulled(1)]).await.unwrap();
        assert!(!app.schedule.contains("gratitude"));

        // dropped onto the 12 PM header
        app.handle_action(AppAction::DragEnd(3)).await.unwrap();
        assert!(app.schedule.contains("gratitude"));
        assert_eq!(app.schedule.block_of("meditation"), Some(TimeBlock::Before12Pm));
        assert_eq!(app.selected_id().as_deref(), Some("meditation"));

        let stored = app.repository.get_schedule(day()).await.unwrap().unwrap();
        assert_eq!(stored, app.schedule);
    }

    #[tokio::test]
    async fn coach_answers_for_other_days_are_dropped() {
        let mut app = app_with(&[]).await;
        app.bg_tx
            .send(BackgroundResult::Coach {
                date: day().pred_opt().unwrap(),
                result: Err("late".into()),
            })
            .await
            .unwrap();
        app.poll_background().await.unwrap();
        assert!(app.advice.is_none());
    }
}
