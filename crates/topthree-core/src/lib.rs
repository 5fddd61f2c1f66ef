//! # TopThree Core Library
//!
//! Core logic for a daily priority planner: each day holds at most three
//! ranked items, everything else waits in an unordered backlog. The
//! `topthree` CLI is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Ordering**: per-day ranking, the three-item cap and self-repair
//! - **Carry-forward**: unfinished past items are copied into the backlog
//! - **Streaks**: consecutive days with the top-1 item done, milestone
//!   achievements and freeze tokens
//! - **Calendar**: free-slot search over a day's busy time and booking
//!   the chosen slot on Google Calendar
//! - **Storage**: SQLite persistence behind the [`PriorityStore`] trait and
//!   TOML configuration
//!
//! ## Key Components
//!
//! - [`Planner`]: facade over store, clock, engines and event bus
//! - [`OrderingEngine`], [`CarryForwardEngine`], [`StreakEngine`]
//! - [`SchedulingSession`]: one scheduling attempt for one item
//! - [`Clock`]: injected time source

pub mod auth;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod events;
pub mod model;
pub mod planner;
pub mod storage;
pub mod streak;
pub mod task;

pub use auth::{KeyringTokenProvider, StaticTokenProvider, TokenProvider};
pub use calendar::{BusyFetcher, CalendarApi, GoogleCalendarClient, SchedulingSession, SessionState};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AuthError, CalendarError, ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::{EventBus, PlannerEvent};
pub use model::{Achievement, AchievementType, DaySlot, PriorityItem, UserStats, DAILY_LIMIT};
pub use planner::{Planner, StartupReport, StreakSummary, ToggleOutcome};
pub use storage::{Config, MemoryStore, PriorityStore, SqliteStore, WriteBatch};
pub use streak::{RiskLevel, StreakEngine};
pub use task::{CarryForwardEngine, CarryForwardReport, OrderingEngine, RepairReport};
