//! Persistence collaborator for planner entities.
//!
//! Engines never touch a storage engine directly; they read through
//! [`PriorityStore::fetch_items`] and write a single [`WriteBatch`] per
//! operation, which every implementation applies atomically.

mod config;
pub mod memory;
pub mod migrations;
pub mod sqlite;
mod staged;

pub use config::{AuthConfig, CalendarConfig, Config, RiskConfig, SchedulingConfig};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use staged::StagedStore;

use std::cmp::Ordering;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{ConfigError, Result};
use crate::model::{Achievement, PriorityItem, UserStats};

/// Returns the data directory, creating it if needed.
///
/// `TOPTHREE_DATA_DIR` wins when set. Otherwise `~/.config/topthree[-dev]/`,
/// with the `-dev` suffix when `TOPTHREE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("TOPTHREE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("TOPTHREE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("topthree-dev")
            } else {
                base_dir.join("topthree")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Which day membership an item query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFilter {
    Any,
    Backlog,
    Assigned,
    Day(NaiveDate),
    /// Assigned strictly before the given day.
    Before(NaiveDate),
    /// Assigned on or before the given day.
    OnOrBefore(NaiveDate),
}

/// Predicate for [`PriorityStore::fetch_items`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemFilter {
    pub slot: SlotFilter,
    pub completed: Option<bool>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self {
            slot: SlotFilter::Any,
            completed: None,
        }
    }

    pub fn backlog() -> Self {
        Self {
            slot: SlotFilter::Backlog,
            completed: None,
        }
    }

    pub fn assigned() -> Self {
        Self {
            slot: SlotFilter::Assigned,
            completed: None,
        }
    }

    pub fn day(day: NaiveDate) -> Self {
        Self {
            slot: SlotFilter::Day(day),
            completed: None,
        }
    }

    pub fn before(day: NaiveDate) -> Self {
        Self {
            slot: SlotFilter::Before(day),
            completed: None,
        }
    }

    pub fn on_or_before(day: NaiveDate) -> Self {
        Self {
            slot: SlotFilter::OnOrBefore(day),
            completed: None,
        }
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn matches(&self, item: &PriorityItem) -> bool {
        if let Some(completed) = self.completed {
            if item.is_completed != completed {
                return false;
            }
        }
        match (self.slot, item.day()) {
            (SlotFilter::Any, _) => true,
            (SlotFilter::Backlog, day) => day.is_none(),
            (SlotFilter::Assigned, day) => day.is_some(),
            (SlotFilter::Day(want), Some(day)) => day == want,
            (SlotFilter::Before(limit), Some(day)) => day < limit,
            (SlotFilter::OnOrBefore(limit), Some(day)) => day <= limit,
            (_, None) => false,
        }
    }
}

/// Result ordering for [`PriorityStore::fetch_items`]. Ties always fall back
/// to `created_at`, then `id`, so every ordering is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSort {
    OrderIndex,
    CreatedAt,
    DayThenOrder,
}

impl ItemSort {
    pub fn compare(&self, a: &PriorityItem, b: &PriorityItem) -> Ordering {
        let tiebreak = || a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id));
        match self {
            ItemSort::OrderIndex => a.order_index.cmp(&b.order_index).then_with(tiebreak),
            ItemSort::CreatedAt => tiebreak(),
            ItemSort::DayThenOrder => a
                .slot
                .cmp(&b.slot)
                .then(a.order_index.cmp(&b.order_index))
                .then_with(tiebreak),
        }
    }
}

pub fn sort_items(items: &mut [PriorityItem], sort: ItemSort) {
    items.sort_by(|a, b| sort.compare(a, b));
}

/// Mutations of one logical transaction.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub inserts: Vec<PriorityItem>,
    pub updates: Vec<PriorityItem>,
    pub deletes: Vec<String>,
    pub achievements: Vec<Achievement>,
    pub stats: Option<UserStats>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: PriorityItem) {
        self.inserts.push(item);
    }

    /// Queue an update, replacing any earlier pending write of the same item.
    pub fn update(&mut self, item: PriorityItem) {
        if let Some(pending) = self.inserts.iter_mut().find(|p| p.id == item.id) {
            *pending = item;
        } else if let Some(pending) = self.updates.iter_mut().find(|p| p.id == item.id) {
            *pending = item;
        } else {
            self.updates.push(item);
        }
    }

    pub fn delete(&mut self, id: &str) {
        self.inserts.retain(|p| p.id != id);
        self.updates.retain(|p| p.id != id);
        self.deletes.push(id.to_string());
    }

    pub fn award(&mut self, achievement: Achievement) {
        self.achievements.push(achievement);
    }

    pub fn set_stats(&mut self, stats: UserStats) {
        self.stats = Some(stats);
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.achievements.is_empty()
            && self.stats.is_none()
    }

    /// Number of item rows touched.
    pub fn item_writes(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}

/// Transactional object store holding every planner entity.
pub trait PriorityStore {
    fn fetch_items(&self, filter: &ItemFilter, sort: ItemSort) -> Result<Vec<PriorityItem>>;

    fn get_item(&self, id: &str) -> Result<Option<PriorityItem>>;

    fn achievements(&self) -> Result<Vec<Achievement>>;

    fn load_stats(&self) -> Result<Option<UserStats>>;

    /// Apply every write in `batch`, or none of them.
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DaySlot;
    use chrono::{Duration, TimeZone, Utc};

    fn item(day: Option<NaiveDate>, idx: u32, completed: bool, secs: i64) -> PriorityItem {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs);
        let mut item = PriorityItem::new("t", DaySlot::from(day), idx, created).unwrap();
        item.is_completed = completed;
        item
    }

    #[test]
    fn filter_matches_slots() {
        let d1 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let on_d1 = item(Some(d1), 0, false, 0);
        let backlog = item(None, 0, false, 0);

        assert!(ItemFilter::day(d1).matches(&on_d1));
        assert!(!ItemFilter::day(d2).matches(&on_d1));
        assert!(ItemFilter::before(d2).matches(&on_d1));
        assert!(!ItemFilter::before(d1).matches(&on_d1));
        assert!(ItemFilter::on_or_before(d1).matches(&on_d1));
        assert!(!ItemFilter::before(d2).matches(&backlog));
        assert!(ItemFilter::backlog().matches(&backlog));
        assert!(!ItemFilter::assigned().matches(&backlog));
        assert!(!ItemFilter::all().completed(true).matches(&on_d1));
    }

    #[test]
    fn order_index_sort_breaks_ties_by_creation() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let late = item(Some(d), 0, false, 10);
        let early = item(Some(d), 0, false, 5);
        let last = item(Some(d), 2, false, 0);
        let mut items = vec![last.clone(), late.clone(), early.clone()];
        sort_items(&mut items, ItemSort::OrderIndex);
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), late.id.as_str(), last.id.as_str()]);
    }

    #[test]
    fn batch_update_coalesces_writes() {
        let mut batch = WriteBatch::new();
        let mut a = item(None, 0, false, 0);
        batch.update(a.clone());
        a.title = "renamed".into();
        batch.update(a.clone());
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].title, "renamed");

        batch.delete(&a.id);
        assert!(batch.updates.is_empty());
        assert_eq!(batch.item_writes(), 1);
    }
}
