//! Ordering engine: per-day ranking and the daily cap.
//!
//! Every public operation reads what it needs, builds one [`WriteBatch`]
//! and commits it, so after it returns each touched day holds at most
//! [`DAILY_LIMIT`] items indexed `0..n` with no gaps or duplicates.
//! Capacity is checked before anything is written.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::model::{clean_title, DaySlot, PriorityItem, DAILY_LIMIT};
use crate::storage::{sort_items, ItemFilter, ItemSort, PriorityStore, WriteBatch};

/// What a self-repair pass changed. Empty means nothing was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub moved_to_backlog: Vec<String>,
    pub reindexed_days: Vec<NaiveDate>,
}

impl RepairReport {
    pub fn is_empty(&self) -> bool {
        self.moved_to_backlog.is_empty() && self.reindexed_days.is_empty()
    }
}

/// Result of a move, with the slot the item left.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub item: PriorityItem,
    pub from: DaySlot,
}

#[derive(Debug, Clone)]
pub struct OrderingEngine {
    daily_limit: usize,
}

impl OrderingEngine {
    pub fn new() -> Self {
        Self {
            daily_limit: DAILY_LIMIT,
        }
    }

    pub fn daily_limit(&self) -> usize {
        self.daily_limit
    }

    /// Items on `day`, top priority first.
    pub fn items_for_day<S: PriorityStore + ?Sized>(
        &self,
        store: &S,
        day: NaiveDate,
    ) -> Result<Vec<PriorityItem>> {
        store.fetch_items(&ItemFilter::day(day), ItemSort::OrderIndex)
    }

    /// Backlog items, oldest first.
    pub fn backlog<S: PriorityStore + ?Sized>(&self, store: &S) -> Result<Vec<PriorityItem>> {
        store.fetch_items(&ItemFilter::backlog(), ItemSort::CreatedAt)
    }

    /// Every day that has at least one item, ascending.
    pub fn days_with_items<S: PriorityStore + ?Sized>(&self, store: &S) -> Result<Vec<NaiveDate>> {
        let items = store.fetch_items(&ItemFilter::assigned(), ItemSort::DayThenOrder)?;
        let mut days: Vec<_> = items.iter().filter_map(PriorityItem::day).collect();
        days.dedup();
        Ok(days)
    }

    /// Create an item on `slot`. Fails with `DailyLimitReached` when the day
    /// is full.
    pub fn add_item<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
        title: &str,
        slot: DaySlot,
    ) -> Result<PriorityItem> {
        let title = clean_title(title)?;
        let mut batch = WriteBatch::new();

        let item = match slot {
            DaySlot::Backlog => {
                let item = PriorityItem::new(&title, slot, 0, clock.now())?;
                batch.insert(item.clone());
                item
            }
            DaySlot::AssignedTo(day) => {
                let mut siblings = self.check_capacity(store, day, None)?;
                let item = PriorityItem::new(&title, slot, next_index(&siblings), clock.now())?;
                batch.insert(item.clone());
                siblings.push(item.clone());
                renumber(siblings, &mut batch);
                item
            }
        };

        store.commit(batch)?;
        tracing::debug!(item_id = %item.id, ?slot, "added item");
        self.reload(store, &item.id)
    }

    /// Assign an item to `day`, appending it after existing items.
    pub fn move_to_day<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        item_id: &str,
        day: NaiveDate,
    ) -> Result<MoveOutcome> {
        let mut item = self.get(store, item_id)?;
        let from = item.slot;
        if from == DaySlot::AssignedTo(day) {
            return Ok(MoveOutcome { item, from });
        }

        let mut siblings = self.check_capacity(store, day, Some(item_id))?;
        let mut batch = WriteBatch::new();

        item.slot = DaySlot::AssignedTo(day);
        item.order_index = next_index(&siblings);
        batch.update(item.clone());
        siblings.push(item);
        renumber(siblings, &mut batch);
        self.close_gap(store, from, item_id, &mut batch)?;

        store.commit(batch)?;
        tracing::debug!(item_id, ?from, %day, "moved item to day");
        Ok(MoveOutcome {
            item: self.reload(store, item_id)?,
            from,
        })
    }

    /// Park an item in the backlog. Its `order_index` is left as it was;
    /// backlog order comes from creation time.
    pub fn move_to_backlog<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        item_id: &str,
    ) -> Result<MoveOutcome> {
        let mut item = self.get(store, item_id)?;
        let from = item.slot;
        if from.is_backlog() {
            return Ok(MoveOutcome { item, from });
        }

        let mut batch = WriteBatch::new();
        item.slot = DaySlot::Backlog;
        batch.update(item);
        self.close_gap(store, from, item_id, &mut batch)?;

        store.commit(batch)?;
        tracing::debug!(item_id, ?from, "moved item to backlog");
        Ok(MoveOutcome {
            item: self.reload(store, item_id)?,
            from,
        })
    }

    /// Move an item to the day after today.
    pub fn punt_to_tomorrow<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
        item_id: &str,
    ) -> Result<MoveOutcome> {
        let tomorrow = clock
            .today()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "day".into(),
                message: "no day after today".into(),
            })?;
        self.move_to_day(store, item_id, tomorrow)
    }

    /// Apply a caller-supplied order to one day's items: position in
    /// `ordered_ids` becomes `order_index`. Items of that day missing from
    /// the list keep their relative order after the listed ones.
    pub fn reorder<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        ordered_ids: &[String],
    ) -> Result<Option<NaiveDate>> {
        let Some(first_id) = ordered_ids.first() else {
            return Ok(None);
        };
        let day = self
            .get(store, first_id)?
            .day()
            .ok_or(ValidationError::BacklogNotOrderable)?;

        let day_items = self.items_for_day(store, day)?;
        let mut by_id: BTreeMap<String, PriorityItem> =
            day_items.into_iter().map(|i| (i.id.clone(), i)).collect();

        let mut ordered = Vec::with_capacity(by_id.len());
        for id in ordered_ids {
            match by_id.remove(id) {
                Some(item) => ordered.push(item),
                None if ordered.iter().any(|i: &PriorityItem| &i.id == id) => {
                    return Err(ValidationError::InvalidValue {
                        field: "ordered_ids".into(),
                        message: format!("{id} listed twice"),
                    }
                    .into());
                }
                None => {
                    let stray = self.get(store, id)?;
                    return Err(match stray.day() {
                        None => ValidationError::BacklogNotOrderable,
                        Some(_) => ValidationError::MixedDays,
                    }
                    .into());
                }
            }
        }
        let mut rest: Vec<_> = by_id.into_values().collect();
        sort_items(&mut rest, ItemSort::OrderIndex);
        ordered.extend(rest);

        let mut batch = WriteBatch::new();
        for (position, mut item) in ordered.into_iter().enumerate() {
            let position = position as u32;
            if item.order_index != position {
                item.order_index = position;
                batch.update(item);
            }
        }
        store.commit(batch)?;
        tracing::debug!(%day, count = ordered_ids.len(), "reordered day");
        Ok(Some(day))
    }

    /// Flip completion. Always succeeds for an existing item.
    pub fn toggle_completion<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        item_id: &str,
    ) -> Result<PriorityItem> {
        let mut item = self.get(store, item_id)?;
        item.is_completed = !item.is_completed;
        let mut batch = WriteBatch::new();
        batch.update(item.clone());
        store.commit(batch)?;
        tracing::debug!(item_id, completed = item.is_completed, "toggled completion");
        Ok(item)
    }

    pub fn rename_item<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        item_id: &str,
        title: &str,
    ) -> Result<PriorityItem> {
        let title = clean_title(title)?;
        let mut item = self.get(store, item_id)?;
        item.title = title;
        let mut batch = WriteBatch::new();
        batch.update(item.clone());
        store.commit(batch)?;
        Ok(item)
    }

    pub fn set_notes<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        item_id: &str,
        notes: Option<&str>,
    ) -> Result<PriorityItem> {
        let mut item = self.get(store, item_id)?;
        item.notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(String::from);
        let mut batch = WriteBatch::new();
        batch.update(item.clone());
        store.commit(batch)?;
        Ok(item)
    }

    /// Remove an item and close the gap it leaves on its day.
    pub fn delete_item<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        item_id: &str,
    ) -> Result<PriorityItem> {
        let item = self.get(store, item_id)?;
        let mut batch = WriteBatch::new();
        batch.delete(item_id);
        self.close_gap(store, item.slot, item_id, &mut batch)?;
        store.commit(batch)?;
        tracing::debug!(item_id, "deleted item");
        Ok(item)
    }

    /// Renumber `day` to `0..n` ordered by `(order_index, created_at)`.
    /// Returns whether anything changed.
    pub fn normalize_indices<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        day: NaiveDate,
    ) -> Result<bool> {
        let mut batch = WriteBatch::new();
        renumber(self.items_for_day(store, day)?, &mut batch);
        let changed = !batch.is_empty();
        store.commit(batch)?;
        Ok(changed)
    }

    /// Move everything past the first `daily_limit` items of `day` to the
    /// backlog and renumber the survivors.
    pub fn enforce_limit<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        day: NaiveDate,
    ) -> Result<RepairReport> {
        let mut batch = WriteBatch::new();
        let mut report = RepairReport::default();
        self.plan_day_repair(day, self.items_for_day(store, day)?, &mut batch, &mut report);
        store.commit(batch)?;
        Ok(report)
    }

    /// Repair every day in one transaction. Writes nothing when all days
    /// are within the cap and contiguously indexed, so running it
    /// repeatedly is harmless.
    pub fn enforce_all_limits<S: PriorityStore + ?Sized>(&self, store: &mut S) -> Result<RepairReport> {
        let assigned = store.fetch_items(&ItemFilter::assigned(), ItemSort::DayThenOrder)?;
        let mut by_day: BTreeMap<NaiveDate, Vec<PriorityItem>> = BTreeMap::new();
        for item in assigned {
            if let Some(day) = item.day() {
                by_day.entry(day).or_default().push(item);
            }
        }

        let mut batch = WriteBatch::new();
        let mut report = RepairReport::default();
        for (day, items) in by_day {
            self.plan_day_repair(day, items, &mut batch, &mut report);
        }

        store.commit(batch)?;
        if !report.is_empty() {
            tracing::info!(
                moved = report.moved_to_backlog.len(),
                days = report.reindexed_days.len(),
                "repaired daily limits"
            );
        }
        Ok(report)
    }

    fn plan_day_repair(
        &self,
        day: NaiveDate,
        mut items: Vec<PriorityItem>,
        batch: &mut WriteBatch,
        report: &mut RepairReport,
    ) {
        sort_items(&mut items, ItemSort::OrderIndex);
        let overflow = if items.len() > self.daily_limit {
            items.split_off(self.daily_limit)
        } else {
            Vec::new()
        };
        for mut item in overflow {
            tracing::warn!(item_id = %item.id, %day, "day over limit; moving item to backlog");
            item.slot = DaySlot::Backlog;
            report.moved_to_backlog.push(item.id.clone());
            batch.update(item);
        }
        if renumber(items, batch) {
            report.reindexed_days.push(day);
        }
    }

    fn check_capacity<S: PriorityStore + ?Sized>(
        &self,
        store: &S,
        day: NaiveDate,
        excluding: Option<&str>,
    ) -> Result<Vec<PriorityItem>> {
        let siblings: Vec<_> = self
            .items_for_day(store, day)?
            .into_iter()
            .filter(|i| Some(i.id.as_str()) != excluding)
            .collect();
        if siblings.len() >= self.daily_limit {
            return Err(CoreError::DailyLimitReached {
                day,
                limit: self.daily_limit,
            });
        }
        Ok(siblings)
    }

    /// Renumber the day an item is leaving, without that item.
    fn close_gap<S: PriorityStore + ?Sized>(
        &self,
        store: &S,
        from: DaySlot,
        leaving_id: &str,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        if let DaySlot::AssignedTo(day) = from {
            let remaining: Vec<_> = self
                .items_for_day(store, day)?
                .into_iter()
                .filter(|i| i.id != leaving_id)
                .collect();
            renumber(remaining, batch);
        }
        Ok(())
    }

    fn get<S: PriorityStore + ?Sized>(&self, store: &S, item_id: &str) -> Result<PriorityItem> {
        store
            .get_item(item_id)?
            .ok_or_else(|| CoreError::ItemNotFound(item_id.to_string()))
    }

    fn reload<S: PriorityStore + ?Sized>(&self, store: &S, item_id: &str) -> Result<PriorityItem> {
        self.get(store, item_id)
    }
}

impl Default for OrderingEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn next_index(siblings: &[PriorityItem]) -> u32 {
    siblings
        .iter()
        .map(|i| i.order_index)
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

/// Queue updates assigning `0..n` in `(order_index, created_at)` order.
/// Returns whether any index changed.
fn renumber(mut items: Vec<PriorityItem>, batch: &mut WriteBatch) -> bool {
    sort_items(&mut items, ItemSort::OrderIndex);
    let mut changed = false;
    for (position, mut item) in items.into_iter().enumerate() {
        let position = position as u32;
        if item.order_index != position {
            item.order_index = position;
            batch.update(item);
            changed = true;
        }
    }
    changed
}
