use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate, Utc};
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

use crate::ai::{local_suggestions, Coach, CoachContext};
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::plan::{generate, week_start};
use crate::models::stats::{activity_streaks, completion_rate, overall_streak};
use crate::models::{Catalog, Completion, DailySchedule, Suggestion, TimeBlock};
use crate::reminders::ReminderScheduler;
use crate::services::{
    busy_blocks, import_completions, load_forecast, outdoor_warning, CalendarClient,
    StravaClient, WeatherWarning,
};
use crate::sync::{load_catalog, push_dirty, sync_once, HttpRemoteStore, RemoteStore};

const REMIND_TICK: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "daily-rhythm", version, long_about = None)]
#[command(about = "Daily habit planner with streaks, reminders and a health coach")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(short, long, action = ArgAction::Count, global = true, help = "More log output (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[arg(long, global = true, help = "Config file. Defaults to ~/.config/daily-rhythm/config.toml")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Print the schedule for a day")]
    Today {
        #[arg(long, help = "Day to show (YYYY-MM-DD), defaults to today")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Mark an activity done, scheduling it first if needed")]
    Done {
        activity: String,
        #[arg(long, help = "Day of the completion (YYYY-MM-DD), defaults to today")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Push local changes and pull remote ones once")]
    Sync,
    #[command(about = "Manage the weekly plan")]
    Plan {
        #[command(subcommand)]
        action: PlanCommand,
    },
    #[command(about = "Import from connected services")]
    Import {
        #[command(subcommand)]
        source: ImportCommand,
    },
    #[command(about = "Print reminders as blocks come to an end, until Ctrl-C")]
    Remind,
    #[command(about = "Ask the coach for suggestions")]
    Coach {
        #[arg(long, help = "Day to plan (YYYY-MM-DD), defaults to today")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Streaks and completion rate")]
    Stats {
        #[arg(long, default_value_t = 30, help = "Days to include in the completion rate")]
        days: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum PlanCommand {
    #[command(about = "Show the saved plan and this week's days")]
    Show,
    #[command(about = "Add or change an activity in the plan")]
    Set {
        activity: String,
        #[arg(help = "Times per week, 1-7")]
        times: u8,
        #[arg(long, value_parser = parse_block, help = "Time block, e.g. before-9am")]
        block: Option<TimeBlock>,
    },
    #[command(about = "Drop an activity from the plan")]
    Remove { activity: String },
    #[command(about = "Generate the week plan and fill unplanned days")]
    Apply {
        #[arg(long, help = "Any day of the week to plan, defaults to this week")]
        week: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImportCommand {
    #[command(about = "Import recent Strava activities as completions")]
    Strava {
        #[arg(long, default_value_t = 7)]
        days: u64,
    },
    #[command(about = "Show calendar events and busy blocks for a day")]
    Calendar {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn parse_block(key: &str) -> std::result::Result<TimeBlock, String> {
    TimeBlock::from_key(key).ok_or_else(|| {
        let keys: Vec<&str> = TimeBlock::ALL.iter().map(|b| b.key()).collect();
        format!("unknown block '{}', expected one of {}", key, keys.join(", "))
    })
}

pub fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Storage, catalog and optional remote shared by the headless commands
struct Headless {
    config: Config,
    repo: Repository,
    catalog: Catalog,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl Headless {
    async fn open(config: &Config) -> Result<Self> {
        let repo = Repository::new(
            &config.db_path,
            Duration::from_millis(config.storage_timeout_ms),
        )
        .await?;
        let remote = HttpRemoteStore::from_config(&config.sync)?;
        let catalog = load_catalog(&repo, remote.as_deref()).await;
        Ok(Self {
            config: config.clone(),
            repo,
            catalog,
            remote,
        })
    }

    /// Best-effort push after a local write
    async fn push(&self) {
        if let Some(remote) = &self.remote {
            match push_dirty(&self.repo, remote.as_ref()).await {
                Ok(n) => tracing::info!("Pushed {} records", n),
                Err(e) => tracing::warn!("Push failed, will retry on next sync: {}", e),
            }
        }
    }

    /// Weather warnings and busy blocks for a day, fetched concurrently
    async fn day_context(&self, date: NaiveDate) -> (Vec<(TimeBlock, WeatherWarning)>, Vec<TimeBlock>) {
        let weather = async {
            if !self.config.weather.is_configured() {
                return Vec::new();
            }
            match load_forecast(&self.repo, &self.config.weather).await {
                Some(forecast) => TimeBlock::ALL
                    .into_iter()
                    .filter_map(|b| outdoor_warning(&forecast, date, b).map(|w| (b, w)))
                    .collect(),
                None => Vec::new(),
            }
        };

        let calendar = async {
            let Some(credentials) = self.config.google.clone() else {
                return Vec::new();
            };
            let events = match CalendarClient::new(credentials) {
                Ok(client) => client.events_for(date).await,
                Err(e) => Err(e),
            };
            match events {
                Ok(events) => busy_blocks(&events, date),
                Err(e) => {
                    tracing::warn!("Calendar unavailable: {}", e);
                    Vec::new()
                }
            }
        };

        futures::join!(weather, calendar)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn indented(text: &str) -> String {
    let options = textwrap::Options::new(78)
        .initial_indent("      ")
        .subsequent_indent("      ");
    textwrap::fill(text, options)
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
    let ctx = Headless::open(config).await?;

    match command {
        Command::Today { date } => print_day(&ctx, date.unwrap_or_else(today)).await,
        Command::Done { activity, date } => mark_done(&ctx, &activity, date.unwrap_or_else(today)).await,
        Command::Sync => {
            let Some(remote) = &ctx.remote else {
                return Err(AppError::Config("sync.base_url is not set".to_string()));
            };
            let (pushed, pulled) = sync_once(&ctx.repo, remote.as_ref()).await?;
            println!("Pushed {} and pulled {} records", pushed, pulled);
            Ok(())
        }
        Command::Plan { action } => plan(&ctx, action).await,
        Command::Import { source } => import(&ctx, source).await,
        Command::Remind => remind(&ctx).await,
        Command::Coach { date } => coach(&ctx, date.unwrap_or_else(today)).await,
        Command::Stats { days } => stats(&ctx, days).await,
    }
}

async fn print_day(ctx: &Headless, date: NaiveDate) -> Result<()> {
    let schedule = ctx.repo.load_schedule(date).await?;
    let done = ctx.repo.completed_ids(date).await?;
    let (warnings, busy) = ctx.day_context(date).await;

    println!("{}", date.format("%A %d %B %Y"));
    for block in TimeBlock::ALL {
        let busy_mark = if busy.contains(&block) { "  [calendar busy]" } else { "" };
        println!("\n  {}{}", block.label(), busy_mark);

        let ids = schedule.activities(block);
        if ids.is_empty() {
            println!("    -");
        }
        for id in ids {
            let check = if done.contains(id) { "x" } else { " " };
            let warning = ctx
                .catalog
                .get(id)
                .filter(|a| a.outdoor)
                .and_then(|_| warnings.iter().find(|(b, _)| *b == block))
                .map(|(_, w)| format!("  ⚠ {}", w))
                .unwrap_or_default();
            println!("    [{}] {}{}", check, ctx.catalog.name_of(id), warning);
        }
    }

    let total = schedule.len();
    let completed = schedule.all_ids().iter().filter(|id| done.contains(**id)).count();
    println!("\n{}/{} done", completed, total);
    Ok(())
}

async fn mark_done(ctx: &Headless, activity: &str, date: NaiveDate) -> Result<()> {
    let Some(entry) = ctx.catalog.get(activity) else {
        return Err(AppError::NotFound(format!("activity '{}'", activity)));
    };

    let mut schedule = ctx.repo.load_schedule(date).await?;
    let block = match schedule.block_of(&entry.id) {
        Some(block) => block,
        None => {
            schedule.add(entry.default_block, &entry.id);
            ctx.repo.save_schedule(&schedule).await?;
            entry.default_block
        }
    };

    if ctx.repo.get_completion(date, &entry.id).await?.is_some() {
        println!("{} was already done on {}", entry.name, date);
        return Ok(());
    }
    ctx.repo
        .set_completion(&Completion::new(date, &entry.id, block))
        .await?;
    println!("Done: {} ({})", entry.name, block.label());

    ctx.push().await;
    Ok(())
}

async fn plan(ctx: &Headless, action: PlanCommand) -> Result<()> {
    match action {
        PlanCommand::Show => {
            let config = ctx.repo.get_plan_config().await?;
            if config.selections.is_empty() {
                println!("No plan yet. Add activities with `plan set <activity> <times>`.");
            }
            for selection in &config.selections {
                let block = selection
                    .block
                    .map(|b| b.label())
                    .unwrap_or("default block");
                println!(
                    "  {} x{}/week, {}",
                    ctx.catalog.name_of(&selection.activity_id),
                    selection.times_per_week,
                    block
                );
            }

            let monday = week_start(today());
            if let Some(week) = ctx.repo.get_week_plan(monday).await? {
                println!("\nWeek of {}", monday);
                for (date, day) in &week.days {
                    let names: Vec<&str> = day
                        .all_ids()
                        .into_iter()
                        .map(|id| ctx.catalog.name_of(id))
                        .collect();
                    println!("  {}  {}", date.format("%a"), names.join(", "));
                }
            }
            Ok(())
        }
        PlanCommand::Set {
            activity,
            times,
            block,
        } => {
            if !ctx.catalog.contains(&activity) {
                return Err(AppError::NotFound(format!("activity '{}'", activity)));
            }
            let mut config = ctx.repo.get_plan_config().await?;
            config.set(&activity, times, block);
            ctx.repo.save_plan_config(&config).await?;
            println!("Planned {} {} times a week", ctx.catalog.name_of(&activity), times.clamp(1, 7));
            ctx.push().await;
            Ok(())
        }
        PlanCommand::Remove { activity } => {
            let mut config = ctx.repo.get_plan_config().await?;
            if !config.remove(&activity) {
                return Err(AppError::NotFound(format!("'{}' in the plan", activity)));
            }
            ctx.repo.save_plan_config(&config).await?;
            println!("Removed {} from the plan", activity);
            ctx.push().await;
            Ok(())
        }
        PlanCommand::Apply { week } => {
            let monday = week_start(week.unwrap_or_else(today));
            let config = ctx.repo.get_plan_config().await?;
            let week = generate(&config, &ctx.catalog, monday);
            ctx.repo.save_week_plan(&week).await?;

            // days already edited by hand keep their schedule
            let mut filled = 0;
            for day in week.days.values().filter(|d| !d.is_empty()) {
                if ctx.repo.get_schedule(day.date).await?.is_none() {
                    ctx.repo.save_schedule(day).await?;
                    filled += 1;
                }
            }
            println!("Planned week of {}, filled {} days", monday, filled);
            ctx.push().await;
            Ok(())
        }
    }
}

async fn import(ctx: &Headless, source: ImportCommand) -> Result<()> {
    match source {
        ImportCommand::Strava { days } => {
            let credentials = ctx
                .config
                .strava
                .clone()
                .ok_or_else(|| AppError::Config("[strava] credentials are not set".to_string()))?;
            let client = StravaClient::new(credentials)?;
            let since = Utc::now()
                .checked_sub_days(Days::new(days))
                .unwrap_or_else(Utc::now);
            let activities = client.activities_since(since).await?;
            let imported = import_completions(&ctx.repo, &activities, &ctx.catalog).await?;
            println!(
                "Imported {} of {} Strava activities",
                imported,
                activities.len()
            );
            ctx.push().await;
            Ok(())
        }
        ImportCommand::Calendar { date } => {
            let credentials = ctx
                .config
                .google
                .clone()
                .ok_or_else(|| AppError::Config("[google] credentials are not set".to_string()))?;
            let date = date.unwrap_or_else(today);
            let events = CalendarClient::new(credentials)?.events_for(date).await?;

            for event in &events {
                if event.all_day {
                    println!("  all day      {}", event.summary);
                } else {
                    println!(
                        "  {}-{}  {}",
                        event.start.format("%H:%M"),
                        event.end.format("%H:%M"),
                        event.summary
                    );
                }
            }
            let busy: Vec<&str> = busy_blocks(&events, date)
                .iter()
                .map(|b| b.label())
                .collect();
            println!("Busy: {}", if busy.is_empty() { "none".to_string() } else { busy.join(", ") });
            Ok(())
        }
    }
}

async fn remind(ctx: &Headless) -> Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(detect_shutdown(shutdown.clone()));

    let mut scheduler = ReminderScheduler::new(ctx.config.reminders.lead_minutes);
    let mut tick = tokio::time::interval(REMIND_TICK);
    println!("Watching today's blocks, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                let now = Local::now().naive_local();
                let schedule = ctx.repo.load_schedule(now.date()).await?;
                let done = ctx.repo.completed_ids(now.date()).await?;
                for reminder in scheduler.due(now, &schedule, &done, &ctx.catalog) {
                    println!("\x07{}  {}", now.format("%H:%M"), reminder.message());
                }
            }
        }
    }
    Ok(())
}

async fn detect_shutdown(cancellation: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        cancellation.cancel();
    }
}

async fn coach(ctx: &Headless, date: NaiveDate) -> Result<()> {
    let schedule: DailySchedule = ctx.repo.load_schedule(date).await?;
    let completed: HashSet<String> = ctx.repo.completed_ids(date).await?;
    let all = ctx.repo.all_completions().await?;
    let streaks = activity_streaks(&all, date);
    let (warnings, busy) = ctx.day_context(date).await;
    let weather: Vec<(TimeBlock, String)> = warnings
        .into_iter()
        .map(|(b, w)| (b, w.to_string()))
        .collect();

    let context = CoachContext {
        schedule: &schedule,
        completed: &completed,
        streaks: &streaks,
        weather: &weather,
        busy: &busy,
    };

    let suggestions: Vec<Suggestion> = match &ctx.config.claude_api_key {
        Some(key) => match Coach::new(key.clone())?.suggest(&ctx.catalog, &context).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                tracing::warn!("Coach unavailable, using local picks: {}", e);
                local_suggestions(&ctx.catalog, &context)
            }
        },
        None => local_suggestions(&ctx.catalog, &context),
    };

    if suggestions.is_empty() {
        println!("Nothing to add, your day looks balanced.");
    }
    for (i, s) in suggestions.iter().enumerate() {
        println!(
            "{}. {} ({})",
            i + 1,
            ctx.catalog.name_of(&s.activity_id),
            s.time_block.label()
        );
        println!("{}", indented(&s.reason));
    }
    Ok(())
}

async fn stats(ctx: &Headless, days: u64) -> Result<()> {
    let today = today();
    let from = today
        .checked_sub_days(Days::new(days.saturating_sub(1)))
        .unwrap_or(today);

    let all = ctx.repo.all_completions().await?;
    let overall = overall_streak(&all, today);
    println!(
        "Overall streak: {} days (best {})",
        overall.current, overall.longest
    );

    let schedules = ctx.repo.schedules_between(from, today).await?;
    let recent = ctx.repo.completions_between(from, today).await?;
    println!(
        "Completion rate, last {} days: {:.0}%",
        days,
        completion_rate(&schedules, &recent) * 100.0
    );

    let streaks = activity_streaks(&all, today);
    if !streaks.is_empty() {
        println!();
    }
    for streak in streaks {
        println!(
            "  {:<24} current {:>3}  best {:>3}  total {:>4}",
            ctx.catalog.name_of(&streak.activity_id),
            streak.current,
            streak.longest,
            streak.total
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_plan_set_with_block() {
        let cli = Cli::try_parse_from([
            "daily-rhythm",
            "-vv",
            "plan",
            "set",
            "yoga",
            "3",
            "--block",
            "before-6pm",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Plan {
                action: PlanCommand::Set { activity, times, block },
            }) => {
                assert_eq!(activity, "yoga");
                assert_eq!(times, 3);
                assert_eq!(block, Some(TimeBlock::Before6Pm));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_block() {
        let err = Cli::try_parse_from(["daily-rhythm", "plan", "set", "yoga", "3", "--block", "noon"])
            .unwrap_err();
        assert!(err.to_string().contains("before-9am"));
    }

    #[test]
    fn no_subcommand_means_tui() {
        let cli = Cli::try_parse_from(["daily-rhythm"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(log_level(cli.verbose), LevelFilter::WARN);
        assert_eq!(log_level(5), LevelFilter::TRACE);
    }

    #[test]
    fn dates_parse_from_iso() {
        let cli = Cli::try_parse_from(["daily-rhythm", "done", "run", "--date", "2026-03-04"]).unwrap();
        match cli.command {
            Some(Command::Done { activity, date }) => {
                assert_eq!(activity, "run");
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 4));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    async fn headless() -> Headless {
        let repo = Repository::in_memory().await.unwrap();
        let mut config = Config::default();
        config.db_path = ":memory:".to_string();
        Headless {
            config,
            repo,
            catalog: Catalog::default(),
            remote: None,
        }
    }

    #[tokio::test]
    async fn done_schedules_and_completes_once() {
        let ctx = headless().await;
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();

        mark_done(&ctx, "yoga", date).await.unwrap();
        mark_done(&ctx, "yoga", date).await.unwrap();

        let schedule = ctx.repo.get_schedule(date).await.unwrap().unwrap();
        assert_eq!(schedule.block_of("yoga"), Some(TimeBlock::Before6Pm));
        assert_eq!(ctx.repo.completions_for_date(date).await.unwrap().len(), 1);

        assert!(matches!(
            mark_done(&ctx, "juggling", date).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn plan_apply_keeps_edited_days() {
        let ctx = headless().await;
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let mut edited = DailySchedule::new(monday);
        edited.add(TimeBlock::Before9Am, "run");
        ctx.repo.save_schedule(&edited).await.unwrap();

        plan(
            &ctx,
            PlanCommand::Set {
                activity: "meditation".into(),
                times: 7,
                block: None,
            },
        )
        .await
        .unwrap();
        plan(&ctx, PlanCommand::Apply { week: Some(monday) }).await.unwrap();

        assert_eq!(ctx.repo.get_schedule(monday).await.unwrap().unwrap(), edited);
        let tuesday = monday.succ_opt().unwrap();
        let planned = ctx.repo.get_schedule(tuesday).await.unwrap().unwrap();
        assert_eq!(planned.activities(TimeBlock::Before9Am), ["meditation"]);
        assert!(ctx.repo.get_week_plan(monday).await.unwrap().is_some());
    }
}
