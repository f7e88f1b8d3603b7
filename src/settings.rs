//! Settings and milestone store
//!
//! Holds the user's configuration, mindfulness reminders, the quiet-mode flag
//! and the cumulative awareness counter. The counter only moves through the
//! ledger; external callers can read it but never bump it.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::types::EventKind;

/// Default daily check-in reminder time
pub const DEFAULT_CHECK_IN_TIME: &str = "20:00";

/// Check-in time of day, serialized as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckInTime(NaiveTime);

impl CheckInTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(CheckInTime)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl Default for CheckInTime {
    fn default() -> Self {
        CheckInTime(NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl fmt::Display for CheckInTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for CheckInTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(CheckInTime)
            .map_err(|_| ValidationError::InvalidTime(s.to_string()))
    }
}

impl Serialize for CheckInTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CheckInTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// What a reminder listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderTarget {
    Any,
    Event(EventKind),
}

impl ReminderTarget {
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            ReminderTarget::Any => true,
            ReminderTarget::Event(target) => *target == kind,
        }
    }
}

impl fmt::Display for ReminderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderTarget::Any => f.write_str("Any"),
            ReminderTarget::Event(kind) => f.write_str(kind.as_str()),
        }
    }
}

impl FromStr for ReminderTarget {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("any") {
            Ok(ReminderTarget::Any)
        } else {
            s.parse().map(ReminderTarget::Event)
        }
    }
}

impl Serialize for ReminderTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReminderTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindfulnessReminder {
    pub id: Uuid,
    pub label: String,
    #[serde(rename = "targetEventType")]
    pub target: ReminderTarget,
    pub is_active: bool,
}

/// Input for [`SettingsStore::add_reminder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub label: String,
    pub target: ReminderTarget,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestones {
    /// Moments of awareness: one per new day logged and one per event
    pub total_awareness: u64,
}

/// A named awareness milestone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneTier {
    pub threshold: u64,
    pub label: &'static str,
}

pub const MILESTONE_TIERS: [MilestoneTier; 5] = [
    MilestoneTier { threshold: 10, label: "Observer" },
    MilestoneTier { threshold: 50, label: "Pattern Finder" },
    MilestoneTier { threshold: 100, label: "Thread Seeker" },
    MilestoneTier { threshold: 250, label: "Rhythm Master" },
    MilestoneTier { threshold: 500, label: "Zenith" },
];

/// User configuration.
///
/// Every field has a default so older stored records with missing fields
/// still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub preferred_check_in_time: CheckInTime,
    /// Weekdays, 0 = Sunday
    pub check_in_days: BTreeSet<u8>,
    pub onboarding_completed: bool,
    pub theme: Theme,
    pub mindfulness_reminders: Vec<MindfulnessReminder>,
    pub quiet_mode: bool,
    pub milestones: Milestones,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            preferred_check_in_time: CheckInTime::default(),
            check_in_days: (0..=6).collect(),
            onboarding_completed: false,
            theme: Theme::Light,
            mindfulness_reminders: Vec::new(),
            quiet_mode: false,
            milestones: Milestones::default(),
        }
    }
}

/// Typed partial update. Unknown fields are rejected.
///
/// The onboarding flag and milestone counter are not patchable: they
/// change only through [`SettingsStore::complete_onboarding`] and the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    pub preferred_check_in_time: Option<CheckInTime>,
    pub check_in_days: Option<BTreeSet<u8>>,
    pub theme: Option<Theme>,
    pub quiet_mode: Option<bool>,
    /// Replaces the whole list
    pub mindfulness_reminders: Option<Vec<MindfulnessReminder>>,
}

impl SettingsPatch {
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::UnknownSetting(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self == &SettingsPatch::default()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(days) = &self.check_in_days {
            validate_weekdays(days)?;
        }
        if let Some(reminders) = &self.mindfulness_reminders {
            for reminder in reminders {
                if reminder.label.trim().is_empty() {
                    return Err(ValidationError::EmptyField("label"));
                }
            }
        }
        Ok(())
    }
}

fn validate_weekdays(days: &BTreeSet<u8>) -> Result<(), ValidationError> {
    match days.iter().find(|d| **d > 6) {
        Some(day) => Err(ValidationError::InvalidWeekday(*day)),
        None => Ok(()),
    }
}

/// Owner of the [`UserSettings`] record
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    settings: UserSettings,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a loaded record, dropping weekdays outside 0..=6
    pub fn from_settings(mut settings: UserSettings) -> Self {
        settings.check_in_days.retain(|d| *d <= 6);
        Self { settings }
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn quiet_mode(&self) -> bool {
        self.settings.quiet_mode
    }

    /// Shallow merge of the provided fields. Nothing is applied if any field is invalid.
    pub fn update(&mut self, patch: SettingsPatch) -> Result<(), ValidationError> {
        patch.validate()?;

        let SettingsPatch {
            preferred_check_in_time,
            check_in_days,
            theme,
            quiet_mode,
            mindfulness_reminders,
        } = patch;

        if let Some(time) = preferred_check_in_time {
            self.settings.preferred_check_in_time = time;
        }
        if let Some(days) = check_in_days {
            self.settings.check_in_days = days;
        }
        if let Some(theme) = theme {
            self.settings.theme = theme;
        }
        if let Some(quiet) = quiet_mode {
            self.settings.quiet_mode = quiet;
        }
        if let Some(reminders) = mindfulness_reminders {
            self.settings.mindfulness_reminders = reminders;
        }
        Ok(())
    }

    /// Add or remove a weekday. Returns whether the day is now active.
    pub fn toggle_check_in_day(&mut self, day: u8) -> Result<bool, ValidationError> {
        if day > 6 {
            return Err(ValidationError::InvalidWeekday(day));
        }
        let days = &mut self.settings.check_in_days;
        if days.remove(&day) {
            Ok(false)
        } else {
            days.insert(day);
            Ok(true)
        }
    }

    pub fn add_reminder(&mut self, reminder: NewReminder) -> Result<Uuid, ValidationError> {
        let label = reminder.label.trim();
        if label.is_empty() {
            return Err(ValidationError::EmptyField("label"));
        }
        let id = Uuid::new_v4();
        self.settings.mindfulness_reminders.push(MindfulnessReminder {
            id,
            label: label.to_string(),
            target: reminder.target,
            is_active: reminder.is_active,
        });
        Ok(id)
    }

    /// Returns false if no reminder has this id
    pub fn remove_reminder(&mut self, id: Uuid) -> bool {
        let reminders = &mut self.settings.mindfulness_reminders;
        let before = reminders.len();
        reminders.retain(|r| r.id != id);
        reminders.len() != before
    }

    /// Flip a reminder's active flag, returning the new value
    pub fn toggle_reminder(&mut self, id: Uuid) -> Option<bool> {
        self.settings
            .mindfulness_reminders
            .iter_mut()
            .find(|r| r.id == id)
            .map(|r| {
                r.is_active = !r.is_active;
                r.is_active
            })
    }

    /// Active reminders. Quiet mode silences all of them.
    pub fn active_reminders(&self) -> Vec<&MindfulnessReminder> {
        if self.settings.quiet_mode {
            return Vec::new();
        }
        self.settings
            .mindfulness_reminders
            .iter()
            .filter(|r| r.is_active)
            .collect()
    }

    /// Active reminders that listen for `kind`
    pub fn reminders_for(&self, kind: EventKind) -> Vec<&MindfulnessReminder> {
        self.active_reminders()
            .into_iter()
            .filter(|r| r.target.matches(kind))
            .collect()
    }

    pub fn complete_onboarding(&mut self) {
        self.settings.onboarding_completed = true;
    }

    pub fn total_awareness(&self) -> u64 {
        self.settings.milestones.total_awareness
    }

    pub(crate) fn increment_awareness(&mut self) {
        self.settings.milestones.total_awareness =
            self.settings.milestones.total_awareness.saturating_add(1);
    }

    /// Highest milestone reached so far
    pub fn current_tier(&self) -> Option<MilestoneTier> {
        let total = self.total_awareness();
        MILESTONE_TIERS
            .iter()
            .rev()
            .find(|tier| total >= tier.threshold)
            .copied()
    }

    /// Next milestone to reach, if any remain
    pub fn next_tier(&self) -> Option<MilestoneTier> {
        let total = self.total_awareness();
        MILESTONE_TIERS
            .iter()
            .find(|tier| total < tier.threshold)
            .copied()
    }

    /// Restore defaults, including the onboarding flag and counter
    pub fn reset(&mut self) {
        self.settings = UserSettings::default();
    }
}
