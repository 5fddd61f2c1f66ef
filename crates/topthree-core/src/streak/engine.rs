//! Consecutive-day streaks, milestone awards and the stats aggregate.

use std::collections::{HashMap, HashSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::model::{Achievement, AchievementType, UserStats, DAILY_LIMIT};
use crate::storage::{ItemFilter, ItemSort, PriorityStore, WriteBatch};

/// Completion of a day's ranked slots, top-1 first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCompletion {
    pub day: NaiveDate,
    /// One entry per occupied slot, at most three.
    pub slots: Vec<bool>,
}

impl DayCompletion {
    /// The signal that drives streaks.
    pub fn top1_completed(&self) -> bool {
        self.slots.first().copied().unwrap_or(false)
    }

    pub fn all_three_completed(&self) -> bool {
        self.slots.len() == DAILY_LIMIT && self.slots.iter().all(|done| *done)
    }

    pub fn completed_count(&self) -> usize {
        self.slots.iter().filter(|done| **done).count()
    }
}

/// The next milestone still ahead of a streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextMilestone {
    pub kind: AchievementType,
    pub days_remaining: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StreakEngine;

impl StreakEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn completion_status<S: PriorityStore + ?Sized>(
        &self,
        store: &S,
        day: NaiveDate,
    ) -> Result<DayCompletion> {
        let items = store.fetch_items(&ItemFilter::day(day), ItemSort::OrderIndex)?;
        Ok(DayCompletion {
            day,
            slots: items.iter().take(DAILY_LIMIT).map(|i| i.is_completed).collect(),
        })
    }

    /// Length of the run of consecutive top-1-completed days ending at
    /// `day`; zero when `day` itself is not top-1-completed.
    ///
    /// # Errors
    /// `ValidationError::FutureDay` for days after today.
    pub fn streak_length<S: PriorityStore + ?Sized>(
        &self,
        store: &S,
        clock: &dyn Clock,
        ending_at: NaiveDate,
    ) -> Result<u32> {
        let today = clock.today();
        if ending_at > today {
            return Err(ValidationError::FutureDay {
                day: ending_at,
                today,
            }
            .into());
        }

        // First item per day in DayThenOrder is that day's top-1.
        let items = store.fetch_items(&ItemFilter::on_or_before(ending_at), ItemSort::DayThenOrder)?;
        let mut top1: HashMap<NaiveDate, bool> = HashMap::new();
        for item in &items {
            if let Some(day) = item.day() {
                top1.entry(day).or_insert(item.is_completed);
            }
        }

        let mut length = 0;
        let mut cursor = Some(ending_at);
        while let Some(day) = cursor {
            if top1.get(&day) != Some(&true) {
                break;
            }
            length += 1;
            cursor = day.checked_sub_days(Days::new(1));
        }
        Ok(length)
    }

    /// The streak as the user sees it: today counts once its top-1 is done;
    /// until then the run ending yesterday is still alive.
    pub fn current_streak<S: PriorityStore + ?Sized>(&self, store: &S, clock: &dyn Clock) -> Result<u32> {
        let today = clock.today();
        let streak = self.streak_length(store, clock, today)?;
        if streak > 0 {
            return Ok(streak);
        }
        match today.checked_sub_days(Days::new(1)) {
            Some(yesterday) => self.streak_length(store, clock, yesterday),
            None => Ok(0),
        }
    }

    /// Stats, creating and persisting the empty record on first access.
    pub fn load_or_create_stats<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
    ) -> Result<UserStats> {
        if let Some(stats) = store.load_stats()? {
            return Ok(stats);
        }
        let stats = UserStats::empty(clock.now());
        let mut batch = WriteBatch::new();
        batch.set_stats(stats.clone());
        store.commit(batch)?;
        Ok(stats)
    }

    /// Award every milestone at or below `streak` not yet earned. Earned
    /// milestones are never re-awarded or revoked. Token-granting
    /// milestones add one freeze token each, in the same commit.
    pub fn award_achievements<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
        streak: u32,
    ) -> Result<Vec<Achievement>> {
        let earned: HashSet<AchievementType> =
            store.achievements()?.into_iter().map(|a| a.kind).collect();
        let now = clock.now();

        let awarded: Vec<Achievement> = AchievementType::ALL
            .into_iter()
            .filter(|kind| kind.required_streak() <= streak && !earned.contains(kind))
            .map(|kind| Achievement::new(kind, streak, now))
            .collect();
        if awarded.is_empty() {
            return Ok(awarded);
        }

        let mut batch = WriteBatch::new();
        let tokens = awarded.iter().filter(|a| a.kind.grants_freeze_token()).count() as u32;
        if tokens > 0 {
            let mut stats = store.load_stats()?.unwrap_or_else(|| UserStats::empty(now));
            stats.freeze_token_count += tokens;
            stats.last_updated_at = now;
            batch.set_stats(stats);
        }
        for achievement in &awarded {
            batch.award(achievement.clone());
        }
        store.commit(batch)?;
        Ok(awarded)
    }

    /// Fold a completion event into the stats aggregate.
    pub fn update_stats<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
        current_streak: u32,
        top1_completed: bool,
        all_three_completed: bool,
    ) -> Result<UserStats> {
        let now = clock.now();
        let mut stats = store.load_stats()?.unwrap_or_else(|| UserStats::empty(now));
        stats.current_streak = current_streak;
        stats.longest_streak = stats.longest_streak.max(current_streak);
        if top1_completed {
            stats.total_top1_completed += 1;
        }
        if all_three_completed {
            stats.total_all_three_completed += 1;
        }
        stats.last_updated_at = now;

        let mut batch = WriteBatch::new();
        batch.set_stats(stats.clone());
        store.commit(batch)?;
        Ok(stats)
    }

    /// Spend one freeze token. Returns the tokens left.
    ///
    /// # Errors
    /// `NoFreezeTokens` when the balance is zero; nothing is written.
    pub fn use_freeze_token<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
    ) -> Result<u32> {
        let mut stats = match store.load_stats()? {
            Some(stats) if stats.freeze_token_count > 0 => stats,
            _ => return Err(CoreError::NoFreezeTokens),
        };
        stats.freeze_token_count -= 1;
        stats.last_updated_at = clock.now();
        let remaining = stats.freeze_token_count;

        let mut batch = WriteBatch::new();
        batch.set_stats(stats);
        store.commit(batch)?;
        Ok(remaining)
    }

    /// Lowest unearned milestone above `streak`.
    pub fn next_milestone(&self, streak: u32, earned: &[Achievement]) -> Option<NextMilestone> {
        AchievementType::ALL
            .into_iter()
            .filter(|kind| kind.required_streak() > streak)
            .find(|kind| !earned.iter().any(|a| a.kind == *kind))
            .map(|kind| NextMilestone {
                kind,
                days_remaining: kind.required_streak() - streak,
            })
    }
}
