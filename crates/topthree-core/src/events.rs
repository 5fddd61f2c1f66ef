use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{AchievementType, DaySlot};

/// Every planner state change produces an Event.
/// Presentation layers subscribe instead of observing the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlannerEvent {
    ItemAdded {
        item_id: String,
        slot: DaySlot,
        at: DateTime<Utc>,
    },
    ItemMoved {
        item_id: String,
        from: DaySlot,
        to: DaySlot,
        at: DateTime<Utc>,
    },
    ItemReordered {
        day: NaiveDate,
        item_ids: Vec<String>,
        at: DateTime<Utc>,
    },
    ItemCompletionToggled {
        item_id: String,
        is_completed: bool,
        at: DateTime<Utc>,
    },
    ItemUpdated {
        item_id: String,
        at: DateTime<Utc>,
    },
    ItemDeleted {
        item_id: String,
        at: DateTime<Utc>,
    },
    /// Self-repair moved overflow items out or renumbered a day.
    LimitsRepaired {
        moved_to_backlog: Vec<String>,
        reindexed_days: Vec<NaiveDate>,
        at: DateTime<Utc>,
    },
    CarriedForward {
        created: usize,
        skipped: usize,
        at: DateTime<Utc>,
    },
    AchievementEarned {
        kind: AchievementType,
        streak: u32,
        at: DateTime<Utc>,
    },
    FreezeTokenUsed {
        remaining: u32,
        at: DateTime<Utc>,
    },
    ItemScheduled {
        item_id: String,
        calendar_event_id: String,
        start: DateTime<Utc>,
        at: DateTime<Utc>,
    },
}

/// Fan-out of planner events. Sending never fails: with no subscribers
/// the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlannerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlannerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PlannerEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
