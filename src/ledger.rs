//! Log ledger
//!
//! Owns the daily logs (most recent first) and the thread snapshot derived
//! from them. Every ingestion advances the threads by one step and bumps the
//! awareness counter where the rules call for it.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::settings::SettingsStore;
use crate::threads::ThreadSet;
use crate::types::{DailyLog, DailyMetrics, EventKind, EventLog};

/// Result of [`LogLedger::upsert_daily_metrics`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpsertOutcome {
    pub date: NaiveDate,
    /// A new day entry was created
    pub created: bool,
    pub threads: ThreadSet,
}

/// Result of [`LogLedger::append_event`]
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub event: EventLog,
    /// The event synthesized a placeholder day entry
    pub created_day: bool,
    pub threads: ThreadSet,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogLedger {
    /// Sorted by date, newest first, one entry per date
    logs: Vec<DailyLog>,
    threads: ThreadSet,
    /// Latest event timestamp handed out
    last_event_at: Option<DateTime<Utc>>,
}

impl LogLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored parts.
    ///
    /// Entries are re-sorted newest first; if a date appears twice only the
    /// first occurrence is kept.
    pub fn from_parts(mut logs: Vec<DailyLog>, threads: ThreadSet) -> Self {
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        logs.dedup_by(|later, earlier| later.date == earlier.date);
        let last_event_at = logs
            .iter()
            .flat_map(|log| log.events.iter().map(|e| e.timestamp))
            .max();
        Self {
            logs,
            threads,
            last_event_at,
        }
    }

    pub fn logs(&self) -> &[DailyLog] {
        &self.logs
    }

    pub fn threads(&self) -> &ThreadSet {
        &self.threads
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    pub fn find_by_date(&self, date: NaiveDate) -> Option<&DailyLog> {
        self.position(date).map(|idx| &self.logs[idx])
    }

    /// Up to `n` most recent logs, newest first
    pub fn recent(&self, n: usize) -> &[DailyLog] {
        &self.logs[..n.min(self.logs.len())]
    }

    /// Record the day's check-in.
    ///
    /// An existing entry keeps its events and only has its scalars replaced.
    /// A new entry counts as one moment of awareness.
    pub fn upsert_daily_metrics(
        &mut self,
        date: NaiveDate,
        metrics: DailyMetrics,
        settings: &mut SettingsStore,
    ) -> Result<UpsertOutcome, ValidationError> {
        metrics.validate()?;

        let (idx, created) = match self.position(date) {
            Some(idx) => {
                self.logs[idx].apply_metrics(metrics);
                (idx, false)
            }
            None => {
                let idx = self.insert(DailyLog::new(date, metrics));
                settings.increment_awareness();
                (idx, true)
            }
        };

        self.threads = self.threads.next(Some(&self.logs[idx]), None);

        if created {
            info!(%date, total = self.logs.len(), "daily log created");
        }
        debug!(%date, created, threads = ?self.threads, "daily metrics recorded");

        Ok(UpsertOutcome {
            date,
            created,
            threads: self.threads,
        })
    }

    /// Attach a new event to `today`'s entry, creating a neutral entry if none exists.
    ///
    /// Every event counts as one moment of awareness.
    pub fn append_event(
        &mut self,
        today: NaiveDate,
        now: DateTime<Utc>,
        kind: EventKind,
        intensity: u8,
        note: Option<String>,
        settings: &mut SettingsStore,
    ) -> Result<AppendOutcome, ValidationError> {
        let timestamp = self.next_timestamp(now);
        let event = EventLog::new(kind, intensity, note, timestamp)?;
        self.last_event_at = Some(timestamp);

        let created_day = match self.position(today) {
            Some(idx) => {
                self.logs[idx].events.push(event.clone());
                false
            }
            None => {
                let mut log = DailyLog::new(today, DailyMetrics::default());
                log.events.push(event.clone());
                self.insert(log);
                true
            }
        };
        settings.increment_awareness();

        self.threads = self.threads.next(None, Some(&event));

        if created_day {
            info!(date = %today, total = self.logs.len(), "daily log created from event");
        }
        debug!(date = %today, kind = %kind, intensity, threads = ?self.threads, "event recorded");

        Ok(AppendOutcome {
            event,
            created_day,
            threads: self.threads,
        })
    }

    /// Drop all logs and reset the threads to zero
    pub fn clear(&mut self) {
        self.logs.clear();
        self.threads = ThreadSet::default();
        self.last_event_at = None;
    }

    fn position(&self, date: NaiveDate) -> Option<usize> {
        self.logs.iter().position(|log| log.date == date)
    }

    /// Insert keeping newest-first order. Today's entry always lands at the front.
    fn insert(&mut self, log: DailyLog) -> usize {
        let idx = self
            .logs
            .iter()
            .position(|existing| existing.date < log.date)
            .unwrap_or(self.logs.len());
        self.logs.insert(idx, log);
        idx
    }

    /// Millisecond precision, never earlier than the last timestamp issued
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(3);
        match self.last_event_at {
            Some(last) if last > now => last,
            _ => now,
        }
    }
}
