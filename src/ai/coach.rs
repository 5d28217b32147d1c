use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::stats::ActivityStreak;
use crate::models::{Catalog, DailySchedule, Suggestion, TimeBlock};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-haiku-20241022";
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Everything the coach gets to see about the day
pub struct CoachContext<'a> {
    pub schedule: &'a DailySchedule,
    pub completed: &'a HashSet<String>,
    pub streaks: &'a [ActivityStreak],
    /// Blocks with an outdoor weather warning, with the warning text
    pub weather: &'a [(TimeBlock, String)],
    pub busy: &'a [TimeBlock],
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    activity_id: String,
    time_block: String,
    #[serde(default)]
    reason: String,
}

pub struct Coach {
    client: Client,
    api_key: String,
}

impl Coach {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, api_key })
    }

    pub async fn suggest(
        &self,
        catalog: &Catalog,
        context: &CoachContext<'_>,
    ) -> Result<Vec<Suggestion>> {
        let system_prompt = r#"You are a supportive health coach planning a single day.
Suggest at most three additional activities from the provided catalog.
Prefer activities that restore broken streaks and balance categories.
Avoid outdoor activities in blocks with weather warnings and avoid busy blocks.
Reply with only a JSON array of objects with keys "activity_id", "time_block" and "reason"."#;

        let request = MessageRequest {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: 800,
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(catalog, context),
            }],
            system: Some(system_prompt.to_string()),
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::ClaudeApi(format!("API error: {}", error_text)));
        }

        let message_response: MessageResponse = response.json().await?;
        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        parse_suggestions(&text, catalog, context.schedule)
    }

    pub fn model_version(&self) -> &'static str {
        CLAUDE_MODEL
    }
}

fn build_prompt(catalog: &Catalog, context: &CoachContext<'_>) -> String {
    let mut prompt = format!("Date: {}\n\nToday's schedule:\n", context.schedule.date);
    for block in TimeBlock::ALL {
        let ids = context.schedule.activities(block);
        let busy = if context.busy.contains(&block) { " [calendar busy]" } else { "" };
        prompt.push_str(&format!("- {} ({}){}: ", block.label(), block.key(), busy));
        if ids.is_empty() {
            prompt.push_str("nothing");
        } else {
            let items: Vec<String> = ids
                .iter()
                .map(|id| {
                    let mark = if context.completed.contains(id) { "done" } else { "pending" };
                    format!("{} ({})", catalog.name_of(id), mark)
                })
                .collect();
            prompt.push_str(&items.join(", "));
        }
        prompt.push('\n');
    }

    if !context.weather.is_empty() {
        prompt.push_str("\nWeather warnings:\n");
        for (block, warning) in context.weather {
            prompt.push_str(&format!("- {}: {}\n", block.key(), warning));
        }
    }

    if !context.streaks.is_empty() {
        prompt.push_str("\nStreaks (current/longest days):\n");
        for streak in context.streaks {
            prompt.push_str(&format!(
                "- {}: {}/{}\n",
                streak.activity_id, streak.current, streak.longest
            ));
        }
    }

    prompt.push_str("\nCatalog (id | name | category | minutes | outdoor):\n");
    for activity in catalog.iter() {
        prompt.push_str(&format!(
            "- {} | {} | {} | {} | {}\n",
            activity.id,
            activity.name,
            activity.category.label(),
            activity.duration_minutes,
            activity.outdoor
        ));
    }
    prompt
}

/// Pull the first JSON array out of the reply and keep usable, unscheduled suggestions
pub fn parse_suggestions(
    text: &str,
    catalog: &Catalog,
    schedule: &DailySchedule,
) -> Result<Vec<Suggestion>> {
    // candidate starts of an array of objects; prose like "[1]" never matches
    let starts = Regex::new(r"\[\s*[\{\]]").map_err(|e| AppError::ClaudeApi(e.to_string()))?;
    let raw: Vec<RawSuggestion> = starts
        .find_iter(text)
        .find_map(|m| {
            serde_json::Deserializer::from_str(&text[m.start()..])
                .into_iter::<Vec<RawSuggestion>>()
                .next()
                .and_then(|parsed| parsed.ok())
        })
        .ok_or_else(|| AppError::ClaudeApi("no suggestions in reply".to_string()))?;

    let mut seen = HashSet::new();
    let suggestions = raw
        .into_iter()
        .filter_map(|s| {
            let activity = catalog.get(&s.activity_id)?;
            if schedule.contains(&activity.id) || !seen.insert(activity.id.clone()) {
                return None;
            }
            let time_block = TimeBlock::from_key(&s.time_block).unwrap_or(activity.default_block);
            Some(Suggestion {
                activity_id: activity.id.clone(),
                time_block,
                reason: s.reason,
            })
        })
        .take(MAX_SUGGESTIONS)
        .collect();
    Ok(suggestions)
}

/// Offline fallback: unscheduled activities with the weakest streaks, placed in their
/// default block unless that block is busy or, for outdoor ones, has a weather warning
pub fn local_suggestions(catalog: &Catalog, context: &CoachContext<'_>) -> Vec<Suggestion> {
    let current_streak = |id: &str| {
        context
            .streaks
            .iter()
            .find(|s| s.activity_id == id)
            .map(|s| (s.current, s.total))
            .unwrap_or((0, 0))
    };

    let mut candidates: Vec<_> = catalog
        .iter()
        .filter(|a| !context.schedule.contains(&a.id))
        .filter(|a| !context.busy.contains(&a.default_block))
        .filter(|a| {
            !a.outdoor || !context.weather.iter().any(|(block, _)| *block == a.default_block)
        })
        .collect();

    // weakest streak first; among equals, activities done before win over never-tried ones
    candidates.sort_by_key(|a| {
        let (current, total) = current_streak(&a.id);
        (current, std::cmp::Reverse(total), a.default_block)
    });

    candidates
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|a| {
            let (_, total) = current_streak(&a.id);
            let reason = if total > 0 {
                format!("Pick {} back up, you've done it {} times", a.name, total)
            } else {
                format!("Try something new: {} takes {} minutes", a.name, a.duration_minutes)
            };
            Suggestion {
                activity_id: a.id.clone(),
                time_block: a.default_block,
                reason,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn schedule() -> DailySchedule {
        let mut schedule = DailySchedule::new(NaiveDate::from_ymd_opt(2026, 3, 4).unwrap());
        schedule.add(TimeBlock::Before9Am, "meditation");
        schedule
    }

    #[test]
    fn parses_array_wrapped_in_prose() {
        let reply = r#"Here is my plan:
[
  {"activity_id": "yoga", "time_block": "before-6pm", "reason": "Recovery day"},
  {"activity_id": "meditation", "time_block": "before-9am", "reason": "Already there"},
  {"activity_id": "unicycling", "time_block": "before-3pm", "reason": "Fun"},
  {"activity_id": "plank", "time_block": "whenever", "reason": "Core"},
  {"activity_id": "yoga", "time_block": "before-9am", "reason": "Duplicate"}
]
Good luck!"#;

        let suggestions = parse_suggestions(reply, &Catalog::default(), &schedule()).unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].activity_id, "yoga");
        assert_eq!(suggestions[0].time_block, TimeBlock::Before6Pm);
        assert_eq!(suggestions[1].activity_id, "plank");
        assert_eq!(suggestions[1].time_block, TimeBlock::Before3Pm);
    }

    #[test]
    fn first_array_wins_over_brackets_in_prose() {
        let reply = r#"Based on [your streaks] and [2] notes:
[{"activity_id": "yoga", "time_block": "before-6pm", "reason": "Stretch it out"}]
Tip: see [1] for details, or try [{"activity_id": "plank"}] later."#;

        let suggestions = parse_suggestions(reply, &Catalog::default(), &schedule()).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].activity_id, "yoga");
        assert_eq!(suggestions[0].reason, "Stretch it out");
    }

    #[test]
    fn malformed_array_is_skipped_for_the_next_one() {
        let reply = r#"[{"activity_id": oops}]
[{"activity_id": "plank", "time_block": "before-3pm", "reason": "Core"}]"#;

        let suggestions = parse_suggestions(reply, &Catalog::default(), &schedule()).unwrap();
        assert_eq!(suggestions[0].activity_id, "plank");
    }

    #[test]
    fn reply_without_array_is_an_error() {
        assert!(matches!(
            parse_suggestions("Sorry, I can't help", &Catalog::default(), &schedule()),
            Err(AppError::ClaudeApi(_))
        ));
    }

    #[test]
    fn local_suggestions_skip_busy_and_bad_weather() {
        let catalog = Catalog::default();
        let completed = HashSet::new();
        let streaks = vec![ActivityStreak {
            activity_id: "pushups".into(),
            current: 0,
            longest: 4,
            total: 9,
        }];
        let weather = vec![(TimeBlock::Before9Am, "Rain likely".to_string())];
        let busy = vec![TimeBlock::Before3Pm];
        let context = CoachContext {
            schedule: &schedule(),
            completed: &completed,
            streaks: &streaks,
            weather: &weather,
            busy: &busy,
        };

        let suggestions = local_suggestions(&catalog, &context);
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].activity_id, "pushups");
        assert!(suggestions[0].reason.contains("9 times"));
        for s in &suggestions {
            let activity = catalog.get(&s.activity_id).unwrap();
            assert_ne!(s.activity_id, "meditation");
            assert_ne!(s.time_block, TimeBlock::Before3Pm);
            assert!(!(activity.outdoor && s.time_block == TimeBlock::Before9Am));
        }
    }

    #[test]
    fn prompt_mentions_schedule_and_catalog() {
        let catalog = Catalog::default();
        let completed: HashSet<String> = ["meditation".to_string()].into_iter().collect();
        let context = CoachContext {
            schedule: &schedule(),
            completed: &completed,
            streaks: &[],
            weather: &[],
            busy: &[TimeBlock::Before12Pm],
        };
        let prompt = build_prompt(&catalog, &context);
        assert!(prompt.contains("Meditation (done)"));
        assert!(prompt.contains("Before 12 PM (before-12pm) [calendar busy]: nothing"));
        assert!(prompt.contains("- run | Run | Cardio | 30 | true"));
    }
}
