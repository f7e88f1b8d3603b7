//! Core entity model for the behavioral state engine
//!
//! This module defines the records that flow through the engine: daily logs,
//! the events attached to them, thread levels and the signed-in user.
//! Field names serialize in camelCase because the same shapes are persisted
//! and sent to the analysis collaborator.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Lowest mood value (sad)
pub const MOOD_MIN: u8 = 1;
/// Highest mood value (happy)
pub const MOOD_MAX: u8 = 5;
/// Upper bound shared by stress, energy, sleep quality and workload
pub const SCALE_MAX: u8 = 5;
/// Event intensity range
pub const INTENSITY_MIN: u8 = 1;
pub const INTENSITY_MAX: u8 = 5;

/// Physical activity recorded for a day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    #[default]
    None,
    Light,
    Heavy,
}

impl FromStr for Activity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Activity::None),
            "light" => Ok(Activity::Light),
            "heavy" => Ok(Activity::Heavy),
            other => Err(ValidationError::UnknownSetting(format!("activity {other:?}"))),
        }
    }
}

/// Kind of discrete life event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Argument,
    #[serde(rename = "Small Win")]
    SmallWin,
    Feedback,
    Unexpected,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Argument,
        EventKind::SmallWin,
        EventKind::Feedback,
        EventKind::Unexpected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Argument => "Argument",
            EventKind::SmallWin => "Small Win",
            EventKind::Feedback => "Feedback",
            EventKind::Unexpected => "Unexpected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ValidationError;

    /// Accepts the display name as well as `small-win` / `small_win` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "argument" => Ok(EventKind::Argument),
            "smallwin" => Ok(EventKind::SmallWin),
            "feedback" => Ok(EventKind::Feedback),
            "unexpected" => Ok(EventKind::Unexpected),
            _ => Err(ValidationError::UnknownSetting(format!("event type {s:?}"))),
        }
    }
}

/// Scalar part of a daily check-in, validated before it reaches the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetrics {
    /// 1 (sad) to 5 (happy)
    pub mood: u8,
    pub stress: u8,
    pub energy: u8,
    pub sleep_quality: u8,
    pub workload: u8,
    pub activity: Activity,
}

impl Default for DailyMetrics {
    /// Neutral values used when an event arrives before the day's check-in
    fn default() -> Self {
        Self {
            mood: 3,
            stress: 0,
            energy: 3,
            sleep_quality: 3,
            workload: 0,
            activity: Activity::None,
        }
    }
}

impl DailyMetrics {
    pub fn validate(&self) -> Result<(), ValidationError> {
        ValidationError::check_range("mood", self.mood, MOOD_MIN, MOOD_MAX)?;
        ValidationError::check_range("stress", self.stress, 0, SCALE_MAX)?;
        ValidationError::check_range("energy", self.energy, 0, SCALE_MAX)?;
        ValidationError::check_range("sleepQuality", self.sleep_quality, 0, SCALE_MAX)?;
        ValidationError::check_range("workload", self.workload, 0, SCALE_MAX)?;
        Ok(())
    }
}

/// A discrete event, owned by the daily log of the day it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// 1 to 5
    pub intensity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Creation time, serialized as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl EventLog {
    /// Build a new event with a fresh id. Blank notes are dropped and the
    /// timestamp is truncated to the millisecond precision it is stored with.
    pub fn new(
        kind: EventKind,
        intensity: u8,
        note: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        validate_intensity(intensity)?;
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            intensity,
            note,
            timestamp: timestamp.trunc_subsecs(3),
        })
    }
}

pub(crate) fn validate_intensity(intensity: u8) -> Result<(), ValidationError> {
    ValidationError::check_range("intensity", intensity, INTENSITY_MIN, INTENSITY_MAX)
}

/// One calendar day of observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    /// Calendar date, serialized as YYYY-MM-DD
    pub date: NaiveDate,
    pub mood: u8,
    pub stress: u8,
    pub energy: u8,
    pub sleep_quality: u8,
    pub workload: u8,
    pub activity: Activity,
    /// Insertion-ordered, append-only within the day
    #[serde(default)]
    pub events: Vec<EventLog>,
}

impl DailyLog {
    pub fn new(date: NaiveDate, metrics: DailyMetrics) -> Self {
        let mut log = Self {
            date,
            mood: 0,
            stress: 0,
            energy: 0,
            sleep_quality: 0,
            workload: 0,
            activity: Activity::None,
            events: Vec::new(),
        };
        log.apply_metrics(metrics);
        log
    }

    /// Replace the scalar fields, leaving events untouched
    pub(crate) fn apply_metrics(&mut self, metrics: DailyMetrics) {
        self.mood = metrics.mood;
        self.stress = metrics.stress;
        self.energy = metrics.energy;
        self.sleep_quality = metrics.sleep_quality;
        self.workload = metrics.workload;
        self.activity = metrics.activity;
    }

    /// Check the scalars and every event's intensity
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.metrics().validate()?;
        for event in &self.events {
            validate_intensity(event.intensity)?;
        }
        Ok(())
    }

    pub fn metrics(&self) -> DailyMetrics {
        DailyMetrics {
            mood: self.mood,
            stress: self.stress,
            energy: self.energy,
            sleep_quality: self.sleep_quality,
            workload: self.workload,
            activity: self.activity,
        }
    }
}

/// The four tracked behavioral threads. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadKind {
    Stress,
    Fatigue,
    Conflict,
    Success,
}

impl ThreadKind {
    pub const ALL: [ThreadKind; 4] = [
        ThreadKind::Stress,
        ThreadKind::Fatigue,
        ThreadKind::Conflict,
        ThreadKind::Success,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            ThreadKind::Stress => 0,
            ThreadKind::Fatigue => 1,
            ThreadKind::Conflict => 2,
            ThreadKind::Success => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::Stress => "Stress",
            ThreadKind::Fatigue => "Fatigue",
            ThreadKind::Conflict => "Conflict",
            ThreadKind::Success => "Success",
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of a single thread, as stored and displayed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    #[serde(rename = "type")]
    pub kind: ThreadKind,
    /// 0.0 to 10.0
    pub level: f64,
}

/// Signed-in identity. The engine does not check where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Subject id from the identity provider
    pub id: String,
    pub name: String,
    pub email: String,
    /// Avatar URI
    pub picture: String,
}

impl AuthUser {
    /// Locally synthesized identity for trying the app without an account
    pub fn guest() -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("guest-{}", &token[..9]),
            name: "Explorer".to_string(),
            email: "guest@threads.app".to_string(),
            picture: format!("https://api.dicebear.com/7.x/avataaars/svg?seed={token}"),
        }
    }
}
