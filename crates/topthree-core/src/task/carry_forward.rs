//! Carry-forward of unfinished past-day items into the backlog.
//!
//! Originals stay on their day untouched; the backlog receives a copy
//! pointing back through `source_item_id`. A past item is skipped when the
//! backlog already holds a copy of it, or any item whose normalized title
//! matches. Both lookups are pre-built sets, so a pass is linear in
//! backlog size plus past-incomplete count, and repeated passes create
//! nothing new.
//!
//! # Usage
//! ```rust,ignore
//! let engine = CarryForwardEngine::new();
//! let report = engine.copy_incomplete_past_items(&mut store, &clock, clock.today())?;
//! ```

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::Result;
use crate::model::{normalized_title, PriorityItem};
use crate::storage::{ItemFilter, ItemSort, PriorityStore, WriteBatch};

/// Outcome of one carry-forward pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarryForwardReport {
    /// Backlog copies created by this pass.
    pub created: Vec<PriorityItem>,
    /// Past items that already had a backlog counterpart.
    pub skipped: Vec<SkippedItem>,
}

impl CarryForwardReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.skipped.is_empty()
    }
}

/// A past item that was not copied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    pub item_id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A backlog item already points back at this one.
    AlreadyCarried,
    /// A backlog item with the same normalized title exists.
    TitleInBacklog,
}

/// Engine for copying unfinished past items into the backlog.
#[derive(Debug, Clone, Default)]
pub struct CarryForwardEngine;

impl CarryForwardEngine {
    pub fn new() -> Self {
        Self
    }

    /// Copy every incomplete item assigned before `reference_day` into
    /// the backlog unless it is already represented there.
    pub fn copy_incomplete_past_items<S: PriorityStore + ?Sized>(
        &self,
        store: &mut S,
        clock: &dyn Clock,
        reference_day: NaiveDate,
    ) -> Result<CarryForwardReport> {
        let backlog = store.fetch_items(&ItemFilter::backlog(), ItemSort::CreatedAt)?;
        let past_incomplete = store.fetch_items(
            &ItemFilter::before(reference_day).completed(false),
            ItemSort::DayThenOrder,
        )?;

        let mut carried_sources: HashSet<String> = backlog
            .iter()
            .filter_map(|item| item.source_item_id.clone())
            .collect();
        let mut backlog_titles: HashSet<String> =
            backlog.iter().map(|item| normalized_title(&item.title)).collect();

        let now = clock.now();
        let mut batch = WriteBatch::new();
        let mut report = CarryForwardReport::default();

        for original in &past_incomplete {
            let title_key = normalized_title(&original.title);
            let reason = if carried_sources.contains(&original.id) {
                Some(SkipReason::AlreadyCarried)
            } else if backlog_titles.contains(&title_key) {
                Some(SkipReason::TitleInBacklog)
            } else {
                None
            };
            if let Some(reason) = reason {
                report.skipped.push(SkippedItem {
                    item_id: original.id.clone(),
                    reason,
                });
                continue;
            }

            let copy = original.backlog_copy(now);
            // Same-pass duplicates (two past items with one title) collapse too.
            carried_sources.insert(original.id.clone());
            backlog_titles.insert(title_key);
            batch.insert(copy.clone());
            report.created.push(copy);
        }

        store.commit(batch)?;
        if !report.created.is_empty() {
            tracing::info!(
                created = report.created.len(),
                skipped = report.skipped.len(),
                %reference_day,
                "carried unfinished items into backlog"
            );
        }
        Ok(report)
    }
}
