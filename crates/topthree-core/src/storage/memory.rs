//! In-memory store for tests and ephemeral sessions.

use std::collections::BTreeMap;

use super::{sort_items, ItemFilter, ItemSort, PriorityStore, WriteBatch};
use crate::error::{CoreError, DatabaseError, Result};
use crate::model::{Achievement, PriorityItem, UserStats};

#[derive(Debug, Default)]
pub struct MemoryStore {
    items: BTreeMap<String, PriorityItem>,
    achievements: Vec<Achievement>,
    stats: Option<UserStats>,
    commits: usize,
    fail_next_commit: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed items directly, bypassing every planner invariant. Used to
    /// simulate corrupt state.
    pub fn with_items(items: impl IntoIterator<Item = PriorityItem>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.items.insert(item.id.clone(), item);
        }
        store
    }

    /// Number of non-empty batches applied so far.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Make the next commit fail without applying anything.
    pub fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn validate(&self, batch: &WriteBatch) -> Result<(), DatabaseError> {
        for item in &batch.inserts {
            if self.items.contains_key(&item.id) {
                return Err(DatabaseError::QueryFailed(format!(
                    "UNIQUE constraint failed: items.id ({})",
                    item.id
                )));
            }
        }
        for item in &batch.updates {
            if !self.items.contains_key(&item.id) {
                return Err(DatabaseError::QueryFailed(format!("no item {}", item.id)));
            }
        }
        for achievement in &batch.achievements {
            let duplicate = self
                .achievements
                .iter()
                .chain(batch.achievements.iter().filter(|a| a.id != achievement.id))
                .any(|a| a.kind == achievement.kind);
            if duplicate {
                return Err(DatabaseError::QueryFailed(format!(
                    "UNIQUE constraint failed: achievements.type ({})",
                    achievement.kind.as_str()
                )));
            }
        }
        Ok(())
    }
}

impl PriorityStore for MemoryStore {
    fn fetch_items(&self, filter: &ItemFilter, sort: ItemSort) -> Result<Vec<PriorityItem>> {
        let mut items: Vec<_> = self
            .items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        sort_items(&mut items, sort);
        Ok(items)
    }

    fn get_item(&self, id: &str) -> Result<Option<PriorityItem>> {
        Ok(self.items.get(id).cloned())
    }

    fn achievements(&self) -> Result<Vec<Achievement>> {
        let mut achievements = self.achievements.clone();
        achievements.sort_by_key(|a| a.kind);
        Ok(achievements)
    }

    fn load_stats(&self) -> Result<Option<UserStats>> {
        Ok(self.stats.clone())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        if std::mem::take(&mut self.fail_next_commit) {
            return Err(CoreError::Database(DatabaseError::Locked));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.validate(&batch)?;

        for item in batch.inserts.into_iter().chain(batch.updates) {
            self.items.insert(item.id.clone(), item);
        }
        for id in &batch.deletes {
            self.items.remove(id);
        }
        self.achievements.extend(batch.achievements);
        if let Some(stats) = batch.stats {
            self.stats = Some(stats);
        }
        self.commits += 1;
        Ok(())
    }
}
