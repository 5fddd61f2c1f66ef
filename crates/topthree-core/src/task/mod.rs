//! Priority item mutation engines.
//!
//! - [`OrderingEngine`]: per-day ranking, the daily cap and self-repair
//! - [`CarryForwardEngine`]: copies unfinished past items into the backlog

pub mod carry_forward;
pub mod ordering;

pub use carry_forward::{CarryForwardEngine, CarryForwardReport, SkipReason, SkippedItem};
pub use ordering::{MoveOutcome, OrderingEngine, RepairReport};
