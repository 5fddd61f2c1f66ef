//! Streaks, milestone achievements and evening risk.
//!
//! Only a day's top-1 item drives streaks. Achievements are awarded from
//! whatever streak value the caller passes in and are never revoked.

mod engine;
mod risk;

pub use engine::{DayCompletion, NextMilestone, StreakEngine};
pub use risk::{risk_level, RiskLevel};
