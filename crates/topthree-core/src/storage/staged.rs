//! Read-your-writes view over a store that defers every commit.
//!
//! Engines run against a [`StagedStore`] exactly as against the real
//! store; their commits are folded into one pending [`WriteBatch`] which
//! the caller then applies in a single transaction.

use std::collections::HashSet;

use super::{sort_items, ItemFilter, ItemSort, PriorityStore, WriteBatch};
use crate::error::Result;
use crate::model::{Achievement, PriorityItem, UserStats};

pub struct StagedStore<'a, S: ?Sized> {
    base: &'a S,
    pending: WriteBatch,
}

impl<'a, S: PriorityStore + ?Sized> StagedStore<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            pending: WriteBatch::new(),
        }
    }

    /// Everything staged so far, as one batch.
    pub fn into_batch(self) -> WriteBatch {
        self.pending
    }

    fn pending_item(&self, id: &str) -> Option<&PriorityItem> {
        self.pending
            .inserts
            .iter()
            .chain(self.pending.updates.iter())
            .find(|item| item.id == id)
    }
}

impl<S: PriorityStore + ?Sized> PriorityStore for StagedStore<'_, S> {
    fn fetch_items(&self, filter: &ItemFilter, sort: ItemSort) -> Result<Vec<PriorityItem>> {
        let touched: HashSet<&str> = self
            .pending
            .inserts
            .iter()
            .chain(self.pending.updates.iter())
            .map(|item| item.id.as_str())
            .chain(self.pending.deletes.iter().map(String::as_str))
            .collect();

        let mut items: Vec<PriorityItem> = self
            .base
            .fetch_items(filter, sort)?
            .into_iter()
            .filter(|item| !touched.contains(item.id.as_str()))
            .collect();
        items.extend(
            self.pending
                .inserts
                .iter()
                .chain(self.pending.updates.iter())
                .filter(|item| filter.matches(item))
                .cloned(),
        );
        sort_items(&mut items, sort);
        Ok(items)
    }

    fn get_item(&self, id: &str) -> Result<Option<PriorityItem>> {
        if self.pending.deletes.iter().any(|deleted| deleted == id) {
            return Ok(None);
        }
        match self.pending_item(id) {
            Some(item) => Ok(Some(item.clone())),
            None => self.base.get_item(id),
        }
    }

    fn achievements(&self) -> Result<Vec<Achievement>> {
        let mut all = self.base.achievements()?;
        all.extend(self.pending.achievements.iter().cloned());
        Ok(all)
    }

    fn load_stats(&self) -> Result<Option<UserStats>> {
        match &self.pending.stats {
            Some(stats) => Ok(Some(stats.clone())),
            None => self.base.load_stats(),
        }
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        for item in batch.inserts {
            self.pending.insert(item);
        }
        for item in batch.updates {
            self.pending.update(item);
        }
        for id in &batch.deletes {
            self.pending.delete(id);
        }
        self.pending.achievements.extend(batch.achievements);
        if let Some(stats) = batch.stats {
            self.pending.set_stats(stats);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DaySlot;
    use crate::storage::MemoryStore;
    use chrono::{NaiveDate, Utc};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    #[test]
    fn reads_see_staged_writes_and_base_is_untouched() {
        let first = PriorityItem::new("first", DaySlot::AssignedTo(day()), 0, Utc::now()).unwrap();
        let parked = PriorityItem::new("parked", DaySlot::Backlog, 0, Utc::now()).unwrap();
        let base = MemoryStore::with_items([first.clone(), parked.clone()]);

        let mut staged = StagedStore::new(&base);
        let mut done = first.clone();
        done.is_completed = true;
        let mut moved = parked.clone();
        moved.slot = DaySlot::AssignedTo(day());
        moved.order_index = 1;
        let mut batch = WriteBatch::new();
        batch.update(done);
        batch.update(moved);
        batch.set_stats(UserStats::empty(Utc::now()));
        staged.commit(batch).unwrap();

        let on_day = staged
            .fetch_items(&ItemFilter::day(day()), ItemSort::OrderIndex)
            .unwrap();
        assert_eq!(on_day.len(), 2);
        assert!(on_day[0].is_completed);
        assert_eq!(on_day[1].id, parked.id);
        assert!(staged
            .fetch_items(&ItemFilter::backlog(), ItemSort::CreatedAt)
            .unwrap()
            .is_empty());
        assert!(staged.load_stats().unwrap().is_some());

        let batch = staged.into_batch();
        assert_eq!(batch.updates.len(), 2);
        assert!(!base.get_item(&first.id).unwrap().unwrap().is_completed);
        assert!(base.load_stats().unwrap().is_none());
        assert_eq!(base.commit_count(), 0);
    }

    #[test]
    fn staged_delete_hides_item() {
        let item = PriorityItem::new("gone", DaySlot::Backlog, 0, Utc::now()).unwrap();
        let base = MemoryStore::with_items([item.clone()]);
        let mut staged = StagedStore::new(&base);
        let mut batch = WriteBatch::new();
        batch.delete(&item.id);
        staged.commit(batch).unwrap();

        assert!(staged.get_item(&item.id).unwrap().is_none());
        assert!(staged
            .fetch_items(&ItemFilter::all(), ItemSort::CreatedAt)
            .unwrap()
            .is_empty());
    }
}
