//! The planner facade: one entry point over the store, the clock, the
//! engines and the event bus.
//!
//! Each method delegates to an engine, then publishes a [`PlannerEvent`]
//! describing what changed. Completion toggles also drive the streak
//! pipeline (current streak, achievements, stats).

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::calendar::{BusyFetcher, CalendarApi, ScheduledEvent, SchedulingSession, SchedulingWindow};
use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::events::{EventBus, PlannerEvent};
use crate::model::{Achievement, DaySlot, PriorityItem, UserStats};
use crate::storage::{Config, PriorityStore, StagedStore, WriteBatch};
use crate::streak::{risk_level, DayCompletion, NextMilestone, RiskLevel, StreakEngine};
use crate::task::{CarryForwardEngine, CarryForwardReport, MoveOutcome, OrderingEngine, RepairReport};

/// What the start-up passes did. A failed pass leaves its field `None`
/// and its message in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupReport {
    pub repair: Option<RepairReport>,
    pub carried: Option<CarryForwardReport>,
    pub errors: Vec<String>,
}

/// Streak bookkeeping triggered by a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub current_streak: u32,
    pub awarded: Vec<Achievement>,
    pub stats: UserStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleOutcome {
    pub item: PriorityItem,
    /// Present when the toggle completed a top-1 or a full day.
    pub streak: Option<StreakUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub freeze_tokens: u32,
    pub total_top1_completed: u32,
    pub total_all_three_completed: u32,
    pub achievements: Vec<Achievement>,
    pub next_milestone: Option<NextMilestone>,
    pub today: DayCompletion,
    pub risk: RiskLevel,
}

pub struct Planner<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: Config,
    ordering: OrderingEngine,
    carry: CarryForwardEngine,
    streaks: StreakEngine,
    events: EventBus,
}

impl<S: PriorityStore> Planner<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            store,
            clock,
            config,
            ordering: OrderingEngine::new(),
            carry: CarryForwardEngine::new(),
            streaks: StreakEngine::new(),
            events: EventBus::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlannerEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PlannerEvent) {
        self.events.publish(event);
    }

    /// Self-repair then carry-forward. Failures are logged and reported,
    /// never fatal.
    pub fn startup(&mut self) -> StartupReport {
        let mut report = StartupReport::default();
        match self.repair() {
            Ok(repair) => report.repair = Some(repair),
            Err(e) => {
                tracing::warn!(error = %e, "limit repair failed at startup");
                report.errors.push(e.to_string());
            }
        }
        match self.carry_forward() {
            Ok(carried) => report.carried = Some(carried),
            Err(e) => {
                tracing::warn!(error = %e, "carry-forward failed at startup");
                report.errors.push(e.to_string());
            }
        }
        report
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_item(&self, item_id: &str) -> Result<PriorityItem> {
        self.store
            .get_item(item_id)?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))
    }

    pub fn items_for_day(&self, day: NaiveDate) -> Result<Vec<PriorityItem>> {
        self.ordering.items_for_day(&self.store, day)
    }

    pub fn backlog(&self) -> Result<Vec<PriorityItem>> {
        self.ordering.backlog(&self.store)
    }

    pub fn days_with_items(&self) -> Result<Vec<NaiveDate>> {
        self.ordering.days_with_items(&self.store)
    }

    // ── Ordering ─────────────────────────────────────────────────────

    pub fn add_item(&mut self, title: &str, slot: DaySlot) -> Result<PriorityItem> {
        let item = self
            .ordering
            .add_item(&mut self.store, self.clock.as_ref(), title, slot)?;
        self.publish(PlannerEvent::ItemAdded {
            item_id: item.id.clone(),
            slot,
            at: self.clock.now(),
        });
        Ok(item)
    }

    pub fn move_to_day(&mut self, item_id: &str, day: NaiveDate) -> Result<MoveOutcome> {
        let outcome = self.ordering.move_to_day(&mut self.store, item_id, day)?;
        self.publish_move(&outcome);
        Ok(outcome)
    }

    pub fn move_to_backlog(&mut self, item_id: &str) -> Result<MoveOutcome> {
        let outcome = self.ordering.move_to_backlog(&mut self.store, item_id)?;
        self.publish_move(&outcome);
        Ok(outcome)
    }

    pub fn punt_to_tomorrow(&mut self, item_id: &str) -> Result<MoveOutcome> {
        let outcome = self
            .ordering
            .punt_to_tomorrow(&mut self.store, self.clock.as_ref(), item_id)?;
        self.publish_move(&outcome);
        Ok(outcome)
    }

    fn publish_move(&self, outcome: &MoveOutcome) {
        if outcome.from != outcome.item.slot {
            self.publish(PlannerEvent::ItemMoved {
                item_id: outcome.item.id.clone(),
                from: outcome.from,
                to: outcome.item.slot,
                at: self.clock.now(),
            });
        }
    }

    pub fn reorder(&mut self, ordered_ids: &[String]) -> Result<Option<NaiveDate>> {
        let day = self.ordering.reorder(&mut self.store, ordered_ids)?;
        if let Some(day) = day {
            self.publish(PlannerEvent::ItemReordered {
                day,
                item_ids: ordered_ids.to_vec(),
                at: self.clock.now(),
            });
        }
        Ok(day)
    }

    pub fn rename_item(&mut self, item_id: &str, title: &str) -> Result<PriorityItem> {
        let item = self.ordering.rename_item(&mut self.store, item_id, title)?;
        self.publish(PlannerEvent::ItemUpdated {
            item_id: item.id.clone(),
            at: self.clock.now(),
        });
        Ok(item)
    }

    pub fn set_notes(&mut self, item_id: &str, notes: Option<&str>) -> Result<PriorityItem> {
        let item = self.ordering.set_notes(&mut self.store, item_id, notes)?;
        self.publish(PlannerEvent::ItemUpdated {
            item_id: item.id.clone(),
            at: self.clock.now(),
        });
        Ok(item)
    }

    pub fn delete_item(&mut self, item_id: &str) -> Result<PriorityItem> {
        let item = self.ordering.delete_item(&mut self.store, item_id)?;
        self.publish(PlannerEvent::ItemDeleted {
            item_id: item.id.clone(),
            at: self.clock.now(),
        });
        Ok(item)
    }

    /// Flip completion. Completing a day's top-1, or its last open slot
    /// of three, on a day up to today updates streak, achievements and
    /// stats. The flip and all of its bookkeeping land in one commit.
    pub fn toggle_completion(&mut self, item_id: &str) -> Result<ToggleOutcome> {
        let today = self.today();
        let mut staged = StagedStore::new(&self.store);
        let item = self.ordering.toggle_completion(&mut staged, item_id)?;
        let streak = match item.day() {
            Some(day) if item.is_completed && day <= today => {
                record_completion(&self.streaks, &mut staged, self.clock.as_ref(), &item, day)?
            }
            _ => None,
        };
        let batch = staged.into_batch();
        self.store.commit(batch)?;

        self.publish(PlannerEvent::ItemCompletionToggled {
            item_id: item.id.clone(),
            is_completed: item.is_completed,
            at: self.clock.now(),
        });
        if let Some(update) = &streak {
            for achievement in &update.awarded {
                tracing::info!(
                    kind = achievement.kind.as_str(),
                    streak = update.current_streak,
                    "achievement earned"
                );
                self.publish(PlannerEvent::AchievementEarned {
                    kind: achievement.kind,
                    streak: update.current_streak,
                    at: achievement.earned_at,
                });
            }
        }
        Ok(ToggleOutcome { item, streak })
    }

    // ── Repair passes ────────────────────────────────────────────────

    pub fn repair(&mut self) -> Result<RepairReport> {
        let report = self.ordering.enforce_all_limits(&mut self.store)?;
        if !report.is_empty() {
            self.publish(PlannerEvent::LimitsRepaired {
                moved_to_backlog: report.moved_to_backlog.clone(),
                reindexed_days: report.reindexed_days.clone(),
                at: self.clock.now(),
            });
        }
        Ok(report)
    }

    /// Carry unfinished items from days before today into the backlog.
    pub fn carry_forward(&mut self) -> Result<CarryForwardReport> {
        let today = self.today();
        let report = self
            .carry
            .copy_incomplete_past_items(&mut self.store, self.clock.as_ref(), today)?;
        if !report.created.is_empty() {
            self.publish(PlannerEvent::CarriedForward {
                created: report.created.len(),
                skipped: report.skipped.len(),
                at: self.clock.now(),
            });
        }
        Ok(report)
    }

    // ── Streaks ──────────────────────────────────────────────────────

    pub fn streak_length(&self, ending_at: NaiveDate) -> Result<u32> {
        self.streaks.streak_length(&self.store, self.clock.as_ref(), ending_at)
    }

    pub fn streak_summary(&mut self) -> Result<StreakSummary> {
        let clock = self.clock.as_ref();
        let stats = self.streaks.load_or_create_stats(&mut self.store, clock)?;
        let current_streak = self.streaks.current_streak(&self.store, clock)?;
        let achievements = self.store.achievements()?;
        let today = self.streaks.completion_status(&self.store, clock.today())?;
        let risk = risk_level(today.top1_completed(), clock.local_now(), &self.config.risk);

        Ok(StreakSummary {
            current_streak,
            longest_streak: stats.longest_streak.max(current_streak),
            freeze_tokens: stats.freeze_token_count,
            total_top1_completed: stats.total_top1_completed,
            total_all_three_completed: stats.total_all_three_completed,
            next_milestone: self.streaks.next_milestone(current_streak, &achievements),
            achievements,
            today,
            risk,
        })
    }

    /// Spend a freeze token. Returns the tokens left.
    pub fn use_freeze_token(&mut self) -> Result<u32> {
        let remaining = self
            .streaks
            .use_freeze_token(&mut self.store, self.clock.as_ref())?;
        self.publish(PlannerEvent::FreezeTokenUsed {
            remaining,
            at: self.clock.now(),
        });
        Ok(remaining)
    }

    // ── Calendar scheduling ─────────────────────────────────────────

    /// Open a scheduling session for an item on its assigned day.
    pub fn scheduling_session(&self, item_id: &str) -> Result<SchedulingSession> {
        let item = self.get_item(item_id)?;
        let day = item.day().ok_or(ValidationError::BacklogNotSchedulable)?;
        let window = SchedulingWindow::for_day(day, &self.config.scheduling, self.clock.local_now())?;
        Ok(SchedulingSession::new(&item, window)?)
    }

    /// Load the session's day into it. Returns `false` when a newer fetch
    /// superseded this one.
    pub async fn load_busy<C: CalendarApi>(
        &self,
        fetcher: &BusyFetcher<C>,
        session: &mut SchedulingSession,
    ) -> Result<bool> {
        match fetcher.fetch(session.window().day).await? {
            Some(events) => {
                session.set_events(events);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Submit the session's proposal and record the event on the item.
    /// The item is untouched when the calendar call fails.
    pub async fn schedule<C: CalendarApi>(
        &mut self,
        session: &mut SchedulingSession,
        api: &C,
    ) -> Result<ScheduledEvent> {
        let offset = self.config.calendar.offset()?;
        let time_zone = self.config.calendar.time_zone.clone();
        let scheduled = session.submit(api, offset, &time_zone).await?;

        let mut item = self.get_item(&scheduled.item_id)?;
        item.calendar_event_id = Some(scheduled.calendar_event_id.clone());
        item.calendar_event_start = Some(scheduled.start);
        let mut batch = WriteBatch::new();
        batch.update(item);
        if let Err(e) = self.store.commit(batch) {
            tracing::warn!(
                error = %e,
                event_id = %scheduled.calendar_event_id,
                "calendar event created but item not updated"
            );
            return Err(e);
        }

        self.publish(PlannerEvent::ItemScheduled {
            item_id: scheduled.item_id.clone(),
            calendar_event_id: scheduled.calendar_event_id.clone(),
            start: scheduled.start,
            at: self.clock.now(),
        });
        Ok(scheduled)
    }

    /// Tomorrow in the user's zone.
    pub fn tomorrow(&self) -> Result<NaiveDate> {
        self.today()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| {
                ValidationError::InvalidValue {
                    field: "day".into(),
                    message: "no day after today".into(),
                }
                .into()
            })
    }
}

/// Streak bookkeeping for a completed item, staged into `store`.
fn record_completion<S: PriorityStore + ?Sized>(
    streaks: &StreakEngine,
    store: &mut S,
    clock: &dyn Clock,
    item: &PriorityItem,
    day: NaiveDate,
) -> Result<Option<StreakUpdate>> {
    let status = streaks.completion_status(store, day)?;
    let is_top1 = item.order_index == 0;
    let all_three = status.all_three_completed();
    if !is_top1 && !all_three {
        return Ok(None);
    }

    let current_streak = streaks.current_streak(store, clock)?;
    let awarded = streaks.award_achievements(store, clock, current_streak)?;
    let stats = streaks.update_stats(store, clock, current_streak, is_top1, all_three)?;
    Ok(Some(StreakUpdate {
        current_streak,
        awarded,
        stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::AchievementType;
    use crate::storage::{ItemFilter, ItemSort, MemoryStore};
    use chrono::{Duration, NaiveDateTime};

    fn planner_at(local: &str) -> (Planner<MemoryStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at(
            NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M").unwrap(),
        ));
        let planner = Planner::new(MemoryStore::new(), clock.clone(), Config::default());
        (planner, clock)
    }

    #[test]
    fn mutations_publish_events() {
        let (mut planner, _clock) = planner_at("2026-08-03 09:00");
        let mut rx = planner.subscribe();
        let today = planner.today();

        let item = planner.add_item("Write", DaySlot::AssignedTo(today)).unwrap();
        planner.move_to_backlog(&item.id).unwrap();
        planner.move_to_backlog(&item.id).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), PlannerEvent::ItemAdded { .. }));
        match rx.try_recv().unwrap() {
            PlannerEvent::ItemMoved { from, to, .. } => {
                assert_eq!(from, DaySlot::AssignedTo(today));
                assert_eq!(to, DaySlot::Backlog);
            }
            other => panic!("unexpected event {other:?}"),
        }
        // The second, no-op move is silent.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn completing_top1_updates_streak_stats() {
        let (mut planner, clock) = planner_at("2026-08-01 09:00");
        for _ in 0..3 {
            let today = planner.today();
            let item = planner.add_item("Focus", DaySlot::AssignedTo(today)).unwrap();
            planner.toggle_completion(&item.id).unwrap();
            clock.advance(Duration::days(1));
        }
        clock.advance(Duration::days(-1));

        let summary = planner.streak_summary().unwrap();
        assert_eq!(summary.current_streak, 3);
        assert_eq!(summary.longest_streak, 3);
        assert_eq!(summary.total_top1_completed, 3);
        assert_eq!(summary.achievements.len(), 1);
        assert_eq!(summary.achievements[0].kind, AchievementType::FireStarter);
        assert_eq!(summary.next_milestone.unwrap().kind, AchievementType::WeekWarrior);
        assert_eq!(summary.risk, RiskLevel::Safe);
    }

    #[test]
    fn completion_and_bookkeeping_share_one_commit() {
        let (mut planner, clock) = planner_at("2026-08-01 09:00");
        for _ in 0..2 {
            let item = planner.add_item("Focus", DaySlot::AssignedTo(planner.today())).unwrap();
            planner.toggle_completion(&item.id).unwrap();
            clock.advance(Duration::days(1));
        }
        let item = planner.add_item("Focus", DaySlot::AssignedTo(planner.today())).unwrap();

        let before = planner.store().commit_count();
        let outcome = planner.toggle_completion(&item.id).unwrap();
        assert_eq!(planner.store().commit_count(), before + 1);

        let update = outcome.streak.unwrap();
        assert_eq!(update.current_streak, 3);
        assert_eq!(update.awarded[0].kind, AchievementType::FireStarter);
        assert_eq!(update.stats.total_top1_completed, 3);
        assert_eq!(planner.store().achievements().unwrap().len(), 1);
    }

    #[test]
    fn failed_completion_commit_leaves_no_trace() {
        let (mut planner, clock) = planner_at("2026-08-01 09:00");
        for _ in 0..2 {
            let item = planner.add_item("Focus", DaySlot::AssignedTo(planner.today())).unwrap();
            planner.toggle_completion(&item.id).unwrap();
            clock.advance(Duration::days(1));
        }
        let item = planner.add_item("Focus", DaySlot::AssignedTo(planner.today())).unwrap();
        let stats_before = planner.store().load_stats().unwrap();
        let mut rx = planner.subscribe();

        planner.store.fail_next_commit();
        assert!(planner.toggle_completion(&item.id).is_err());

        assert!(!planner.get_item(&item.id).unwrap().is_completed);
        assert_eq!(planner.store().load_stats().unwrap(), stats_before);
        assert!(planner.store().achievements().unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        // A retry goes through in full.
        let outcome = planner.toggle_completion(&item.id).unwrap();
        assert_eq!(outcome.streak.unwrap().stats.total_top1_completed, 3);
    }

    #[test]
    fn first_completion_ever_creates_stats_in_same_commit() {
        let (mut planner, _clock) = planner_at("2026-08-01 09:00");
        let item = planner.add_item("Start", DaySlot::AssignedTo(planner.today())).unwrap();
        planner.store.fail_next_commit();
        assert!(planner.toggle_completion(&item.id).is_err());
        assert!(planner.store().load_stats().unwrap().is_none());
        assert!(!planner.get_item(&item.id).unwrap().is_completed);
    }

    #[test]
    fn completing_second_slot_does_not_touch_stats() {
        let (mut planner, _clock) = planner_at("2026-08-01 09:00");
        let today = planner.today();
        planner.add_item("First", DaySlot::AssignedTo(today)).unwrap();
        let second = planner.add_item("Second", DaySlot::AssignedTo(today)).unwrap();

        let outcome = planner.toggle_completion(&second.id).unwrap();
        assert!(outcome.item.is_completed);
        assert!(outcome.streak.is_none());
        assert!(planner.store().load_stats().unwrap().is_none());
    }

    #[test]
    fn future_completion_skips_streak_pipeline() {
        let (mut planner, _clock) = planner_at("2026-08-01 09:00");
        let tomorrow = planner.tomorrow().unwrap();
        let item = planner.add_item("Later", DaySlot::AssignedTo(tomorrow)).unwrap();
        assert!(planner.toggle_completion(&item.id).unwrap().streak.is_none());
    }

    #[test]
    fn startup_repairs_and_carries_forward() {
        let (mut planner, clock) = planner_at("2026-08-01 09:00");
        let yesterday = planner.today();
        planner.add_item("Unfinished", DaySlot::AssignedTo(yesterday)).unwrap();
        clock.advance(Duration::days(1));

        let report = planner.startup();
        assert!(report.errors.is_empty());
        assert_eq!(report.carried.unwrap().created.len(), 1);

        let again = planner.startup();
        assert!(again.repair.unwrap().is_empty());
        assert!(again.carried.unwrap().created.is_empty());
        let backlog = planner
            .store()
            .fetch_items(&ItemFilter::backlog(), ItemSort::CreatedAt)
            .unwrap();
        assert_eq!(backlog.len(), 1);
    }

    #[test]
    fn startup_survives_store_failure() {
        let (mut planner, _clock) = planner_at("2026-08-01 09:00");
        let today = planner.today();
        let day = today - Days::new(2);
        let mut store = MemoryStore::with_items((0..4).map(|i| {
            PriorityItem::new(&format!("t{i}"), DaySlot::AssignedTo(day), 0, chrono::Utc::now()).unwrap()
        }));
        store.fail_next_commit();
        planner.store = store;

        let report = planner.startup();
        assert!(report.repair.is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.carried.is_some());
    }

    #[test]
    fn freeze_token_without_balance_fails() {
        let (mut planner, _clock) = planner_at("2026-08-01 09:00");
        assert!(matches!(planner.use_freeze_token(), Err(CoreError::NoFreezeTokens)));
    }

    #[test]
    fn backlog_item_has_no_scheduling_session() {
        let (mut planner, _clock) = planner_at("2026-08-01 09:00");
        let item = planner.add_item("Someday", DaySlot::Backlog).unwrap();
        assert!(matches!(
            planner.scheduling_session(&item.id),
            Err(CoreError::Validation(ValidationError::BacklogNotSchedulable))
        ));
    }
}
