use serde::{Deserialize, Serialize};

use super::TimeBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Mobility,
    Strength,
    Cardio,
    Mindfulness,
    Nutrition,
    Professional,
    Recovery,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Mobility,
        Category::Strength,
        Category::Cardio,
        Category::Mindfulness,
        Category::Nutrition,
        Category::Professional,
        Category::Recovery,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Mobility => "Mobility",
            Category::Strength => "Strength",
            Category::Cardio => "Cardio",
            Category::Mindfulness => "Mindfulness",
            Category::Nutrition => "Nutrition",
            Category::Professional => "Professional",
            Category::Recovery => "Recovery",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub duration_minutes: u32,
    pub instructions: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub outdoor: bool,
    pub default_block: TimeBlock,
}

impl Activity {
    /// Link to open for this activity, preferring the video
    pub fn external_url(&self) -> Option<&str> {
        self.video_url.as_deref().or(self.link.as_deref())
    }
}

// (id, name, category, minutes, instructions, video, outdoor, default block)
type CatalogRow = (
    &'static str,
    &'static str,
    Category,
    u32,
    &'static str,
    Option<&'static str>,
    bool,
    TimeBlock,
);

const BUILTIN: &[CatalogRow] = &[
    ("morning-stretch", "Morning stretch", Category::Mobility, 10,
     "Neck rolls, shoulder circles, cat-cow, hip openers. Move slowly and breathe through each position.",
     None, false, TimeBlock::Before9Am),
    ("meditation", "Meditation", Category::Mindfulness, 10,
     "Sit comfortably, close your eyes and follow the breath. When the mind wanders, return to the breath.",
     None, false, TimeBlock::Before9Am),
    ("hydrate", "Drink a glass of water", Category::Nutrition, 2,
     "Drink a full glass of water before coffee.",
     None, false, TimeBlock::Before9Am),
    ("run", "Run", Category::Cardio, 30,
     "Easy conversational pace. Warm up for five minutes, cool down with a walk.",
     None, true, TimeBlock::Before9Am),
    ("walk", "Walk outside", Category::Cardio, 20,
     "Brisk walk outdoors, phone in pocket.",
     None, true, TimeBlock::Before12Pm),
    ("cycling", "Bike ride", Category::Cardio, 45,
     "Steady ride, keep cadence high and effort moderate.",
     None, true, TimeBlock::Before6Pm),
    ("pushups", "Push-ups", Category::Strength, 5,
     "Three sets to near failure with a minute of rest. Keep a straight line from head to heels.",
     Some("https://www.youtube.com/watch?v=IODxDxX7oi4"), false, TimeBlock::Before12Pm),
    ("squats", "Squats", Category::Strength, 5,
     "Three sets of fifteen. Heels down, knees tracking over toes.",
     Some("https://www.youtube.com/watch?v=YaXPRqUwItQ"), false, TimeBlock::Before3Pm),
    ("plank", "Plank", Category::Strength, 3,
     "Hold a forearm plank for sixty seconds, rest, repeat twice.",
     None, false, TimeBlock::Before3Pm),
    ("posture-break", "Posture break", Category::Mobility, 3,
     "Stand up, chin tucks, doorway chest stretch, ten shoulder blade squeezes.",
     None, false, TimeBlock::Before3Pm),
    ("eye-rest", "20-20-20 eye rest", Category::Recovery, 1,
     "Look at something twenty feet away for twenty seconds.",
     None, false, TimeBlock::Before12Pm),
    ("deep-work", "Deep work session", Category::Professional, 90,
     "One task, notifications off, timer on.",
     None, false, TimeBlock::Before12Pm),
    ("inbox-zero", "Process inbox", Category::Professional, 20,
     "Archive, delegate, reply or schedule every message.",
     None, false, TimeBlock::Before3Pm),
    ("learning", "Read or study", Category::Professional, 30,
     "Read a chapter or work through a course module. Write down one takeaway.",
     None, false, TimeBlock::Before6Pm),
    ("plan-tomorrow", "Plan tomorrow", Category::Professional, 10,
     "Write tomorrow's top three tasks and check the calendar.",
     None, false, TimeBlock::Before6Pm),
    ("yoga", "Yoga flow", Category::Mobility, 20,
     "Sun salutations followed by a few standing poses and a short rest.",
     Some("https://www.youtube.com/watch?v=v7AYKMP6rOE"), false, TimeBlock::Before6Pm),
    ("vegetables", "Eat vegetables", Category::Nutrition, 5,
     "Half the plate vegetables at dinner.",
     None, false, TimeBlock::Before9Pm),
    ("gratitude", "Gratitude journal", Category::Mindfulness, 5,
     "Write three things that went well today.",
     None, false, TimeBlock::Before9Pm),
    ("foam-roll", "Foam rolling", Category::Recovery, 10,
     "Roll calves, quads, glutes and upper back, thirty seconds each.",
     None, false, TimeBlock::Before9Pm),
    ("screens-off", "Screens off", Category::Recovery, 1,
     "Put devices away an hour before bed.",
     None, false, TimeBlock::Before9Pm),
];

pub fn builtin_catalog() -> Vec<Activity> {
    BUILTIN
        .iter()
        .map(
            |&(id, name, category, minutes, instructions, video, outdoor, block)| Activity {
                id: id.to_string(),
                name: name.to_string(),
                category,
                duration_minutes: minutes,
                instructions: instructions.to_string(),
                video_url: video.map(str::to_string),
                link: None,
                outdoor,
                default_block: block,
            },
        )
        .collect()
}

#[derive(Debug, Clone)]
pub struct Catalog {
    activities: Vec<Activity>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(builtin_catalog())
    }
}

impl Catalog {
    pub fn new(activities: Vec<Activity>) -> Self {
        Self { activities }
    }

    pub fn get(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn by_category(&self, category: Category) -> Vec<&Activity> {
        self.activities
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|a| a.name.as_str()).unwrap_or(id)
    }

    /// Remote entries replace local ones with the same id; local-only entries stay
    pub fn merge_remote(&mut self, remote: Vec<Activity>) {
        for activity in remote {
            match self.activities.iter_mut().find(|a| a.id == activity.id) {
                Some(existing) => *existing = activity,
                None => self.activities.push(activity),
            }
        }
    }
}
