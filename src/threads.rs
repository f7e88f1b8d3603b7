//! Thread dynamics
//!
//! Each ingestion step fades every thread by a fixed amount and then adds
//! contributions from the new daily log or event. All four threads are
//! computed from the same prior snapshot, so the order in which they are
//! visited does not matter.

use serde::{Deserialize, Serialize};

use crate::types::{DailyLog, EventKind, EventLog, ThreadKind, ThreadState};

/// Lower bound of any thread level
pub const LEVEL_MIN: f64 = 0.0;
/// Upper bound of any thread level
pub const LEVEL_MAX: f64 = 10.0;
/// Natural fade applied once per ingestion step
pub const PASSIVE_DECAY: f64 = 0.5;

/// Fatigue added when sleep quality is below this value
pub const POOR_SLEEP_BELOW: u8 = 3;
pub const POOR_SLEEP_FATIGUE: f64 = 1.5;
/// Fatigue added when workload is above this value
pub const HEAVY_WORKLOAD_ABOVE: u8 = 4;
pub const HEAVY_WORKLOAD_FATIGUE: f64 = 1.0;
pub const SMALL_WIN_SUCCESS: f64 = 1.5;
pub const FEEDBACK_STRESS_FACTOR: f64 = 0.5;

/// Levels for the four threads. Always complete, always clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ThreadState>", into = "Vec<ThreadState>")]
pub struct ThreadSet {
    levels: [f64; 4],
}

impl Default for ThreadSet {
    fn default() -> Self {
        Self { levels: [0.0; 4] }
    }
}

impl ThreadSet {
    /// Build a set from explicit levels; out-of-range values are clamped
    pub fn from_levels(stress: f64, fatigue: f64, conflict: f64, success: f64) -> Self {
        let mut set = Self::default();
        for (kind, level) in ThreadKind::ALL
            .into_iter()
            .zip([stress, fatigue, conflict, success])
        {
            set.levels[kind.index()] = clamp_level(level);
        }
        set
    }

    pub fn level(&self, kind: ThreadKind) -> f64 {
        self.levels[kind.index()]
    }

    /// Thread states in the fixed Stress, Fatigue, Conflict, Success order
    pub fn states(&self) -> Vec<ThreadState> {
        ThreadKind::ALL
            .into_iter()
            .map(|kind| ThreadState {
                kind,
                level: self.level(kind),
            })
            .collect()
    }

    pub fn band(&self, kind: ThreadKind) -> ThreadBand {
        ThreadBand::for_level(self.level(kind))
    }

    /// Compute the next snapshot.
    ///
    /// Decay is applied exactly once whether or not a log or event is given.
    /// Both may be present; the ledger only ever passes one of them.
    pub fn next(&self, new_log: Option<&DailyLog>, new_event: Option<&EventLog>) -> ThreadSet {
        let mut next = ThreadSet::default();
        for kind in ThreadKind::ALL {
            let mut level = (self.level(kind) - PASSIVE_DECAY).max(LEVEL_MIN);

            if let Some(log) = new_log {
                level += log_contribution(kind, log);
            }
            if let Some(event) = new_event {
                level += event_contribution(kind, event);
            }

            next.levels[kind.index()] = level.min(LEVEL_MAX);
        }
        next
    }
}

/// Free-function form of [`ThreadSet::next`]
pub fn next_threads(
    current: &ThreadSet,
    new_log: Option<&DailyLog>,
    new_event: Option<&EventLog>,
) -> ThreadSet {
    current.next(new_log, new_event)
}

fn log_contribution(kind: ThreadKind, log: &DailyLog) -> f64 {
    match kind {
        ThreadKind::Stress => log.stress as f64 / 3.0,
        ThreadKind::Fatigue => {
            let mut added = 0.0;
            if log.sleep_quality < POOR_SLEEP_BELOW {
                added += POOR_SLEEP_FATIGUE;
            }
            if log.workload > HEAVY_WORKLOAD_ABOVE {
                added += HEAVY_WORKLOAD_FATIGUE;
            }
            added
        }
        ThreadKind::Conflict | ThreadKind::Success => 0.0,
    }
}

fn event_contribution(kind: ThreadKind, event: &EventLog) -> f64 {
    match (kind, event.kind) {
        (ThreadKind::Conflict, EventKind::Argument) => event.intensity as f64,
        (ThreadKind::Success, EventKind::SmallWin) => SMALL_WIN_SUCCESS,
        (ThreadKind::Stress, EventKind::Feedback) => event.intensity as f64 * FEEDBACK_STRESS_FACTOR,
        _ => 0.0,
    }
}

fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        LEVEL_MIN
    } else {
        level.clamp(LEVEL_MIN, LEVEL_MAX)
    }
}

impl From<ThreadSet> for Vec<ThreadState> {
    fn from(set: ThreadSet) -> Self {
        set.states()
    }
}

impl TryFrom<Vec<ThreadState>> for ThreadSet {
    type Error = String;

    /// Every thread must appear exactly once with a finite level
    fn try_from(states: Vec<ThreadState>) -> Result<Self, Self::Error> {
        let mut seen = [false; 4];
        let mut set = ThreadSet::default();
        for state in states {
            let idx = state.kind.index();
            if seen[idx] {
                return Err(format!("duplicate thread {}", state.kind));
            }
            if !state.level.is_finite() {
                return Err(format!("non-finite level for {}", state.kind));
            }
            seen[idx] = true;
            set.levels[idx] = clamp_level(state.level);
        }
        if let Some(missing) = ThreadKind::ALL.into_iter().find(|k| !seen[k.index()]) {
            return Err(format!("missing thread {missing}"));
        }
        Ok(set)
    }
}

/// Display band for a thread level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadBand {
    /// Below 3
    Stable,
    /// 3 up to 7
    Sensitive,
    /// 7 and above
    Volatile,
}

impl ThreadBand {
    pub fn for_level(level: f64) -> Self {
        if level < 3.0 {
            ThreadBand::Stable
        } else if level < 7.0 {
            ThreadBand::Sensitive
        } else {
            ThreadBand::Volatile
        }
    }
}
