//! Rhythm Threads - behavioral state engine for personal rhythm tracking
//!
//! Users record a daily check-in (mood, stress, energy, sleep quality,
//! workload, activity) and discrete life events. The engine keeps a ledger of
//! those logs, derives four decaying "thread" levels (Stress, Fatigue,
//! Conflict, Success), counts moments of awareness toward milestones and
//! periodically asks an external analysis collaborator for a weekly insight.
//!
//! ## Modules
//!
//! - **Entity model** ([`types`]): daily logs, events, threads, users
//! - **Thread dynamics** ([`threads`]): decay-and-accumulate step function
//! - **Log ledger** ([`ledger`]): upsert-by-date and event append
//! - **Settings** ([`settings`]): configuration, reminders, milestones
//! - **Insights** ([`insight`], [`analysis`], [`orchestrator`]): weekly insight requests
//! - **Engine** ([`engine`]): the session context tying it all to a [`storage::KeyValueStore`]

pub mod analysis;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod insight;
pub mod ledger;
pub mod orchestrator;
pub mod settings;
pub mod storage;
pub mod threads;
pub mod types;

pub use analysis::{AnalysisCollaborator, AnalysisError, AnalysisRequest};
pub use engine::{BehaviorEngine, LoadReport};
pub use error::{EngineError, ValidationError};
pub use insight::WeeklyInsight;
pub use orchestrator::{InsightApplied, InsightOutcome, InsightTicket};
pub use threads::{next_threads, ThreadBand, ThreadSet};
pub use types::{Activity, AuthUser, DailyLog, DailyMetrics, EventKind, EventLog, ThreadKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported by the CLI and diagnostics
pub const PRODUCER_NAME: &str = "rhythm-threads";
