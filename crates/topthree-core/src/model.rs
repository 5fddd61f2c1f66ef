//! Persisted entities: priority items, achievements and user stats.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum number of items any single day may hold.
pub const DAILY_LIMIT: usize = 3;

/// Where an item lives: the unordered backlog or a specific day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<NaiveDate>", into = "Option<NaiveDate>")]
pub enum DaySlot {
    Backlog,
    AssignedTo(NaiveDate),
}

impl DaySlot {
    pub fn day(&self) -> Option<NaiveDate> {
        match self {
            DaySlot::Backlog => None,
            DaySlot::AssignedTo(day) => Some(*day),
        }
    }

    pub fn is_backlog(&self) -> bool {
        matches!(self, DaySlot::Backlog)
    }
}

impl From<Option<NaiveDate>> for DaySlot {
    fn from(day: Option<NaiveDate>) -> Self {
        day.map_or(DaySlot::Backlog, DaySlot::AssignedTo)
    }
}

impl From<DaySlot> for Option<NaiveDate> {
    fn from(slot: DaySlot) -> Self {
        slot.day()
    }
}

/// A task, either ranked on a day or parked in the backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(rename = "day_assigned")]
    pub slot: DaySlot,
    /// Position among siblings on the same day. Ignored for backlog display.
    #[serde(default)]
    pub order_index: u32,
    /// Item this one was carried forward from.
    #[serde(default)]
    pub source_item_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub calendar_event_id: Option<String>,
    #[serde(default)]
    pub calendar_event_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PriorityItem {
    /// Build a fresh item. The title is trimmed and must not be empty.
    pub fn new(
        title: &str,
        slot: DaySlot,
        order_index: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title: clean_title(title)?,
            is_completed: false,
            slot,
            order_index,
            source_item_id: None,
            notes: None,
            calendar_event_id: None,
            calendar_event_start: None,
            created_at,
        })
    }

    /// Backlog copy of this item for carry-forward. The copy is never
    /// completed and never scheduled.
    pub fn backlog_copy(&self, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: self.title.clone(),
            is_completed: false,
            slot: DaySlot::Backlog,
            order_index: 0,
            source_item_id: Some(self.id.clone()),
            notes: self.notes.clone(),
            calendar_event_id: None,
            calendar_event_start: None,
            created_at,
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.slot.day()
    }

    pub fn is_scheduled(&self) -> bool {
        self.calendar_event_id.is_some()
    }
}

/// Trim a title, rejecting it when nothing is left.
pub fn clean_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

/// Title key used for backlog dedup: trimmed and case-folded.
pub fn normalized_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Streak milestones, ordered by threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementType {
    FireStarter,
    WeekWarrior,
    FortnightFocus,
    MonthlyMaster,
    QuarterChampion,
    YearLegend,
}

impl AchievementType {
    pub const ALL: [AchievementType; 6] = [
        AchievementType::FireStarter,
        AchievementType::WeekWarrior,
        AchievementType::FortnightFocus,
        AchievementType::MonthlyMaster,
        AchievementType::QuarterChampion,
        AchievementType::YearLegend,
    ];

    /// Consecutive top-1 days required to earn this milestone.
    pub fn required_streak(&self) -> u32 {
        match self {
            AchievementType::FireStarter => 3,
            AchievementType::WeekWarrior => 7,
            AchievementType::FortnightFocus => 14,
            AchievementType::MonthlyMaster => 30,
            AchievementType::QuarterChampion => 90,
            AchievementType::YearLegend => 365,
        }
    }

    /// Milestones of a week or longer pay out one freeze token.
    pub fn grants_freeze_token(&self) -> bool {
        self.required_streak() >= 7
    }

    pub fn title(&self) -> &'static str {
        match self {
            AchievementType::FireStarter => "Fire Starter",
            AchievementType::WeekWarrior => "Week Warrior",
            AchievementType::FortnightFocus => "Fortnight Focus",
            AchievementType::MonthlyMaster => "Monthly Master",
            AchievementType::QuarterChampion => "Quarter Champion",
            AchievementType::YearLegend => "Year Legend",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementType::FireStarter => "fire_starter",
            AchievementType::WeekWarrior => "week_warrior",
            AchievementType::FortnightFocus => "fortnight_focus",
            AchievementType::MonthlyMaster => "monthly_master",
            AchievementType::QuarterChampion => "quarter_champion",
            AchievementType::YearLegend => "year_legend",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

/// An earned milestone. Created once per type, never revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AchievementType,
    pub earned_at: DateTime<Utc>,
    pub streak_count_at_award: u32,
}

impl Achievement {
    pub fn new(kind: AchievementType, streak: u32, earned_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            earned_at,
            streak_count_at_award: streak,
        }
    }
}

/// Aggregate counters, stored under a single well-known key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub longest_streak: u32,
    pub current_streak: u32,
    pub total_top1_completed: u32,
    pub total_all_three_completed: u32,
    pub freeze_token_count: u32,
    pub last_updated_at: DateTime<Utc>,
}

impl UserStats {
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            longest_streak: 0,
            current_streak: 0,
            total_top1_completed: 0,
            total_all_three_completed: 0,
            freeze_token_count: 0,
            last_updated_at: at,
        }
    }
}
