//! Evening risk level for an unfinished top-1.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::storage::RiskConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Warning,
    High,
    Critical,
}

impl RiskLevel {
    pub fn message(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Streak is safe",
            RiskLevel::Warning => "Finish your top priority this evening",
            RiskLevel::High => "Streak at risk: top priority still open",
            RiskLevel::Critical => "Last hour to save your streak",
        }
    }
}

/// Risk of losing the streak today. A completed top-1 is always safe.
pub fn risk_level(top1_completed: bool, now: NaiveDateTime, config: &RiskConfig) -> RiskLevel {
    if top1_completed {
        return RiskLevel::Safe;
    }
    let hour = now.hour();
    if hour >= config.critical_hour {
        RiskLevel::Critical
    } else if hour >= config.high_hour {
        RiskLevel::High
    } else if hour >= config.warning_hour {
        RiskLevel::Warning
    } else {
        RiskLevel::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hhmm: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("2026-06-10 {hhmm}"), "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn escalates_through_the_evening() {
        let cfg = RiskConfig::default();
        assert_eq!(risk_level(false, at("17:59"), &cfg), RiskLevel::Safe);
        assert_eq!(risk_level(false, at("18:00"), &cfg), RiskLevel::Warning);
        assert_eq!(risk_level(false, at("20:59"), &cfg), RiskLevel::Warning);
        assert_eq!(risk_level(false, at("21:00"), &cfg), RiskLevel::High);
        assert_eq!(risk_level(false, at("23:00"), &cfg), RiskLevel::Critical);
    }

    #[test]
    fn completed_top1_is_always_safe() {
        assert_eq!(risk_level(true, at("23:30"), &RiskConfig::default()), RiskLevel::Safe);
    }
}
