//! Behavioral state engine
//!
//! The explicitly constructed context that owns the ledger, settings and
//! insight orchestrator for one session. Presentation code holds a
//! [`BehaviorEngine`] and calls its operations; it never writes fields
//! directly.
//!
//! State is loaded from the [`KeyValueStore`] on open and written back after
//! every mutation. A slot that fails to decode falls back to its default and
//! is listed in the [`LoadReport`].

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisCollaborator;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::insight::WeeklyInsight;
use crate::ledger::{AppendOutcome, LogLedger, UpsertOutcome};
use crate::orchestrator::{InsightApplied, InsightOrchestrator, InsightOutcome, InsightTicket};
use crate::settings::{MindfulnessReminder, NewReminder, SettingsPatch, SettingsStore, UserSettings};
use crate::storage::{decode, encode, KeyValueStore, StorageKey};
use crate::threads::{ThreadBand, ThreadSet};
use crate::types::{AuthUser, DailyLog, DailyMetrics, EventKind, ThreadKind};

/// A storage slot that could not be decoded on open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptSlot {
    pub key: StorageKey,
    pub reason: String,
}

impl CorruptSlot {
    pub fn to_error(&self) -> EngineError {
        EngineError::StorageCorrupt {
            key: self.key,
            reason: self.reason.clone(),
        }
    }
}

/// What happened while loading persisted state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Slots that were present
    pub restored: Vec<StorageKey>,
    /// Slots replaced by defaults because they failed to decode
    pub corrupt: Vec<CorruptSlot>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty()
    }
}

pub struct BehaviorEngine {
    ledger: LogLedger,
    settings: SettingsStore,
    orchestrator: InsightOrchestrator,
    user: Option<AuthUser>,
    /// Ticket produced by the last eligibility check, not yet taken
    pending: Option<InsightTicket>,
    store: Arc<dyn KeyValueStore>,
    analysis: Arc<dyn AnalysisCollaborator>,
    clock: Arc<dyn Clock>,
    load_report: LoadReport,
}

impl BehaviorEngine {
    /// Open with default configuration and the system clock
    pub fn open(store: Arc<dyn KeyValueStore>, analysis: Arc<dyn AnalysisCollaborator>) -> Self {
        Self::with_config(&EngineConfig::default(), store, analysis, Arc::new(SystemClock))
    }

    /// Open, restoring whatever the store holds.
    ///
    /// # Arguments
    /// * `config` - Insight threshold and window
    /// * `store` - Slot storage to load from and write back to
    /// * `analysis` - Collaborator that produces weekly insights
    /// * `clock` - Source of "now" and "today"
    ///
    /// # Returns
    /// A ready engine. Slots that fail to decode or hold out-of-range logs
    /// fall back to defaults and are listed in [`load_report`](Self::load_report).
    pub fn with_config(
        config: &EngineConfig,
        store: Arc<dyn KeyValueStore>,
        analysis: Arc<dyn AnalysisCollaborator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut report = LoadReport::default();

        let logs: Vec<DailyLog> = load_slot(store.as_ref(), StorageKey::Logs, &mut report)
            .and_then(|logs| check_logs(logs, &mut report))
            .unwrap_or_default();
        let threads: ThreadSet = load_slot(store.as_ref(), StorageKey::Threads, &mut report)
            .unwrap_or_default();
        let settings: UserSettings = load_slot(store.as_ref(), StorageKey::Settings, &mut report)
            .unwrap_or_default();
        let user: Option<AuthUser> = load_slot(store.as_ref(), StorageKey::User, &mut report);

        info!(
            logs = logs.len(),
            signed_in = user.is_some(),
            corrupt = report.corrupt.len(),
            "engine state loaded"
        );

        let mut engine = Self {
            ledger: LogLedger::from_parts(logs, threads),
            settings: SettingsStore::from_settings(settings),
            orchestrator: InsightOrchestrator::new(config.insight),
            user,
            pending: None,
            store,
            analysis,
            clock,
            load_report: report,
        };
        engine.check_insight();
        engine
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    // Identity

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn sign_in(&mut self, user: AuthUser) {
        info!(user_id = %user.id, "signed in");
        self.persist_user(&user);
        self.user = Some(user);
        self.check_insight();
    }

    /// Sign in with a locally synthesized guest identity
    pub fn sign_in_guest(&mut self) -> AuthUser {
        let guest = AuthUser::guest();
        self.sign_in(guest.clone());
        guest
    }

    /// Forget the user. Logs and settings stay in place until [`reset`](Self::reset).
    pub fn sign_out(&mut self) {
        if let Some(user) = self.user.take() {
            info!(user_id = %user.id, "signed out");
        }
        self.pending = None;
        self.orchestrator.cancel();
        if let Err(e) = self.store.remove(StorageKey::User) {
            warn!(error = %e, "failed to remove stored user");
        }
    }

    // Log ledger

    pub fn logs(&self) -> &[DailyLog] {
        self.ledger.logs()
    }

    pub fn recent(&self, n: usize) -> &[DailyLog] {
        self.ledger.recent(n)
    }

    pub fn find_by_date(&self, date: NaiveDate) -> Option<&DailyLog> {
        self.ledger.find_by_date(date)
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Today's entry, if any
    pub fn today_log(&self) -> Option<&DailyLog> {
        self.ledger.find_by_date(self.clock.today())
    }

    /// Record the check-in for `date`.
    ///
    /// # Arguments
    /// * `date` - Calendar day the check-in belongs to
    /// * `metrics` - Mood, stress, energy, sleep quality, workload and activity
    ///
    /// # Returns
    /// Whether a new day was created, plus the advanced thread levels.
    /// An existing day keeps its events; only its scalars are replaced.
    pub fn upsert_daily_metrics(
        &mut self,
        date: NaiveDate,
        metrics: DailyMetrics,
    ) -> Result<UpsertOutcome, EngineError> {
        self.require_user()?;
        let outcome = self
            .ledger
            .upsert_daily_metrics(date, metrics, &mut self.settings)?;
        self.persist_ledger();
        self.check_insight();
        Ok(outcome)
    }

    /// Check-in for the clock's current date
    pub fn log_today(&mut self, metrics: DailyMetrics) -> Result<UpsertOutcome, EngineError> {
        let today = self.clock.today();
        self.upsert_daily_metrics(today, metrics)
    }

    /// Record a life event on today's entry, creating a neutral day if needed.
    ///
    /// # Arguments
    /// * `kind` - Event type
    /// * `intensity` - 1 to 5
    /// * `note` - Optional free text; blank notes are dropped
    ///
    /// # Returns
    /// The stored event (with its id and timestamp), whether a day was
    /// created and the advanced thread levels.
    pub fn append_event(
        &mut self,
        kind: EventKind,
        intensity: u8,
        note: Option<String>,
    ) -> Result<AppendOutcome, EngineError> {
        self.require_user()?;
        let now = self.clock.now();
        let outcome = self.ledger.append_event(
            now.date_naive(),
            now,
            kind,
            intensity,
            note,
            &mut self.settings,
        )?;
        self.persist_ledger();
        self.check_insight();
        Ok(outcome)
    }

    // Threads

    pub fn threads(&self) -> &ThreadSet {
        self.ledger.threads()
    }

    pub fn thread_band(&self, kind: ThreadKind) -> ThreadBand {
        self.ledger.threads().band(kind)
    }

    // Settings and milestones

    pub fn settings(&self) -> &UserSettings {
        self.settings.settings()
    }

    /// Read access to reminders, tiers and the awareness counter
    pub fn settings_store(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<(), EngineError> {
        self.require_user()?;
        self.settings.update(patch)?;
        self.persist_settings();
        self.check_insight();
        Ok(())
    }

    pub fn set_quiet_mode(&mut self, quiet: bool) -> Result<(), EngineError> {
        self.update_settings(SettingsPatch {
            quiet_mode: Some(quiet),
            ..SettingsPatch::default()
        })
    }

    pub fn toggle_check_in_day(&mut self, day: u8) -> Result<bool, EngineError> {
        self.require_user()?;
        let active = self.settings.toggle_check_in_day(day)?;
        self.persist_settings();
        Ok(active)
    }

    pub fn add_reminder(&mut self, reminder: NewReminder) -> Result<Uuid, EngineError> {
        self.require_user()?;
        let id = self.settings.add_reminder(reminder)?;
        self.persist_settings();
        Ok(id)
    }

    pub fn remove_reminder(&mut self, id: Uuid) -> Result<(), EngineError> {
        self.require_user()?;
        if !self.settings.remove_reminder(id) {
            return Err(EngineError::ReminderNotFound(id));
        }
        self.persist_settings();
        Ok(())
    }

    /// Returns the reminder's new active flag
    pub fn toggle_reminder(&mut self, id: Uuid) -> Result<bool, EngineError> {
        self.require_user()?;
        let active = self
            .settings
            .toggle_reminder(id)
            .ok_or(EngineError::ReminderNotFound(id))?;
        self.persist_settings();
        Ok(active)
    }

    pub fn active_reminders(&self) -> Vec<&MindfulnessReminder> {
        self.settings.active_reminders()
    }

    pub fn complete_onboarding(&mut self) -> Result<(), EngineError> {
        self.require_user()?;
        self.settings.complete_onboarding();
        self.persist_settings();
        Ok(())
    }

    /// Restore defaults, clear the ledger and wipe the store.
    ///
    /// The signed-in user stays signed in. If the store cannot be cleared,
    /// nothing in memory changes.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.require_user()?;
        self.store.clear_all()?;
        self.ledger.clear();
        self.settings.reset();
        self.orchestrator.reset();
        self.pending = None;
        if let Some(user) = self.user.clone() {
            self.persist_user(&user);
        }
        info!("engine state reset");
        Ok(())
    }

    // Insights

    pub fn latest_insight(&self) -> Option<&WeeklyInsight> {
        self.orchestrator.latest()
    }

    pub fn is_insight_eligible(&self) -> bool {
        self.user.is_some()
            && self
                .orchestrator
                .is_eligible(self.ledger.len(), self.settings.quiet_mode())
    }

    /// Take the ticket issued by the latest eligibility check, if any
    pub fn take_insight_ticket(&mut self) -> Option<InsightTicket> {
        self.pending.take()
    }

    /// Hand back the outcome of a ticket
    pub fn apply_insight(&mut self, outcome: InsightOutcome) -> Result<InsightApplied, EngineError> {
        self.orchestrator.apply(outcome)
    }

    /// Request an insight now and apply the answer.
    ///
    /// Returns `Ok(None)` when not eligible. Holds the engine for the whole
    /// request; hosts that keep mutating while waiting should use
    /// [`take_insight_ticket`](Self::take_insight_ticket) instead.
    pub async fn refresh_insight(&mut self) -> Result<Option<InsightApplied>, EngineError> {
        self.require_user()?;
        self.pending = None;
        let ticket = match self.orchestrator.issue(
            &self.ledger,
            self.settings.quiet_mode(),
            &self.analysis,
        ) {
            Some(ticket) => ticket,
            None => return Ok(None),
        };
        let outcome = ticket.run().await;
        self.orchestrator.apply(outcome).map(Some)
    }

    fn check_insight(&mut self) {
        if self.user.is_none() {
            return;
        }
        let quiet = self.settings.quiet_mode();
        match self.orchestrator.observe(&self.ledger, quiet, &self.analysis) {
            Some(ticket) => {
                debug!(generation = ticket.generation(), "insight ticket ready");
                self.pending = Some(ticket);
            }
            // A cancelled generation must not leave a runnable ticket behind
            None if self.orchestrator.in_flight().is_none() => self.pending = None,
            None => {}
        }
    }

    fn require_user(&self) -> Result<(), EngineError> {
        if self.user.is_some() {
            Ok(())
        } else {
            Err(EngineError::NotSignedIn)
        }
    }

    // Persistence

    fn persist_ledger(&self) {
        self.save_slot(StorageKey::Logs, self.ledger.logs());
        self.save_slot(StorageKey::Threads, self.ledger.threads());
        self.save_slot(StorageKey::Settings, self.settings.settings());
    }

    fn persist_settings(&self) {
        self.save_slot(StorageKey::Settings, self.settings.settings());
    }

    fn persist_user(&self, user: &AuthUser) {
        self.save_slot(StorageKey::User, user);
    }

    /// Write failures are logged; in-memory state stays authoritative
    fn save_slot<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) {
        let bytes = match encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%key, error = %e, "failed to encode state");
                return;
            }
        };
        if let Err(e) = self.store.save(key, &bytes) {
            warn!(%key, error = %e, "failed to persist state");
        }
    }
}

/// Stored logs must satisfy the same ranges as fresh input; otherwise the
/// whole slot is treated as corrupt
fn check_logs(logs: Vec<DailyLog>, report: &mut LoadReport) -> Option<Vec<DailyLog>> {
    let invalid = logs
        .iter()
        .find_map(|log| log.validate().err().map(|e| (log.date, e)));
    match invalid {
        None => Some(logs),
        Some((date, e)) => {
            warn!(key = %StorageKey::Logs, %date, error = %e, "stored logs out of range, using defaults");
            report.restored.retain(|key| *key != StorageKey::Logs);
            report.corrupt.push(CorruptSlot {
                key: StorageKey::Logs,
                reason: format!("log for {date}: {e}"),
            });
            None
        }
    }
}

fn load_slot<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: StorageKey,
    report: &mut LoadReport,
) -> Option<T> {
    let bytes = match store.load(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!(%key, error = %e, "failed to read stored state, using defaults");
            return None;
        }
    };
    match decode(&bytes) {
        Ok(value) => {
            report.restored.push(key);
            Some(value)
        }
        Err(e) => {
            warn!(%key, error = %e, "stored state is corrupt, using defaults");
            report.corrupt.push(CorruptSlot {
                key,
                reason: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisRequest};
    use crate::clock::ManualClock;
    use crate::insight::tests::sample_insight;
    use crate::settings::ReminderTarget;
    use crate::storage::{MemoryStore, StorageError};
    use crate::types::Activity;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records every request; answers with a summary naming the request size
    #[derive(Default)]
    struct RecordingAnalysis {
        calls: Mutex<Vec<AnalysisRequest>>,
        fail: bool,
    }

    impl RecordingAnalysis {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<AnalysisRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalysisCollaborator for RecordingAnalysis {
        async fn analyze(&self, request: &AnalysisRequest) -> Result<WeeklyInsight, AnalysisError> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(AnalysisError::Transport("connection reset".into()));
            }
            let mut insight = sample_insight();
            insight.summary = format!("{} logs", request.logs.len());
            Ok(insight)
        }
    }

    /// Memory store whose wholesale clear always fails
    struct NoClearStore(MemoryStore);

    impl KeyValueStore for NoClearStore {
        fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
            self.0.load(key)
        }

        fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError> {
            self.0.save(key, bytes)
        }

        fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
            self.0.remove(key)
        }

        fn clear_all(&self) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    struct Harness {
        engine: BehaviorEngine,
        store: Arc<MemoryStore>,
        analysis: Arc<RecordingAnalysis>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_analysis(RecordingAnalysis::default())
        }

        fn with_analysis(analysis: RecordingAnalysis) -> Self {
            let store = Arc::new(MemoryStore::new());
            let analysis = Arc::new(analysis);
            let clock = Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
            ));
            let engine = Self::open(&store, &analysis, &clock);
            Self {
                engine,
                store,
                analysis,
                clock,
            }
        }

        fn open(
            store: &Arc<MemoryStore>,
            analysis: &Arc<RecordingAnalysis>,
            clock: &Arc<ManualClock>,
        ) -> BehaviorEngine {
            BehaviorEngine::with_config(
                &EngineConfig::default(),
                store.clone(),
                analysis.clone(),
                clock.clone(),
            )
        }

        fn reopen(&self) -> BehaviorEngine {
            Self::open(&self.store, &self.analysis, &self.clock)
        }

        fn signed_in() -> Self {
            let mut harness = Self::new();
            harness.engine.sign_in(user());
            harness
        }

        /// Check in today, then move the clock to the next day
        fn check_in_and_advance(&mut self, stress: u8) {
            self.engine.log_today(metrics(stress)).unwrap();
            self.clock.advance(Duration::days(1));
        }
    }

    fn user() -> AuthUser {
        AuthUser {
            id: "sub-123".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            picture: "https://example.com/ada.png".to_string(),
        }
    }

    fn metrics(stress: u8) -> DailyMetrics {
        DailyMetrics {
            mood: 4,
            stress,
            energy: 3,
            sleep_quality: 2,
            workload: 3,
            activity: Activity::Light,
        }
    }

    #[test]
    fn test_operations_require_user() {
        let mut harness = Harness::new();
        assert!(matches!(
            harness.engine.log_today(metrics(1)),
            Err(EngineError::NotSignedIn)
        ));
        assert!(matches!(
            harness.engine.append_event(EventKind::Argument, 2, None),
            Err(EngineError::NotSignedIn)
        ));
        assert!(harness.engine.logs().is_empty());
        assert!(harness.store.is_empty());
    }

    #[test]
    fn test_validation_error_is_recoverable() {
        let mut harness = Harness::signed_in();
        let bad = DailyMetrics {
            mood: 6,
            ..metrics(1)
        };
        assert!(matches!(
            harness.engine.log_today(bad),
            Err(EngineError::Validation(_))
        ));
        assert!(harness.engine.log_today(metrics(1)).is_ok());
        assert_eq!(harness.engine.logs().len(), 1);
    }

    #[test]
    fn test_events_land_on_clock_date() {
        let mut harness = Harness::signed_in();
        let outcome = harness
            .engine
            .append_event(EventKind::Argument, 4, Some("about dishes".into()))
            .unwrap();
        assert!(outcome.created_day);
        assert_eq!(harness.engine.today_log().unwrap().events.len(), 1);
        assert_eq!(harness.engine.threads().level(ThreadKind::Conflict), 4.0);
        assert_eq!(harness.engine.thread_band(ThreadKind::Conflict), ThreadBand::Sensitive);
        assert_eq!(harness.engine.settings_store().total_awareness(), 1);

        // Check-in afterwards keeps the event
        let outcome = harness.engine.log_today(metrics(3)).unwrap();
        assert!(!outcome.created);
        assert_eq!(harness.engine.today_log().unwrap().events.len(), 1);
        assert_eq!(harness.engine.settings_store().total_awareness(), 1);
    }

    #[tokio::test]
    async fn test_insight_requested_at_three_logs() {
        let mut harness = Harness::signed_in();
        harness.check_in_and_advance(1);
        harness.check_in_and_advance(2);
        assert!(harness.engine.take_insight_ticket().is_none());

        harness.check_in_and_advance(3);
        let ticket = harness.engine.take_insight_ticket().unwrap();
        assert!(harness.engine.take_insight_ticket().is_none());

        let applied = harness.engine.apply_insight(ticket.run().await).unwrap();
        assert_eq!(applied, InsightApplied::Committed);

        let calls = harness.analysis.calls();
        assert_eq!(calls.len(), 1);
        let stress: Vec<u8> = calls[0].logs.iter().map(|l| l.stress).collect();
        assert_eq!(stress, vec![3, 2, 1]);
        assert_eq!(harness.engine.latest_insight().unwrap().summary, "3 logs");
    }

    #[test]
    fn test_same_size_does_not_retrigger() {
        let mut harness = Harness::signed_in();
        for stress in 0..3 {
            harness.check_in_and_advance(stress);
        }
        assert!(harness.engine.take_insight_ticket().is_some());

        // Events on an existing day and re-check-ins leave the ledger size alone
        harness.clock.advance(Duration::days(-1));
        harness.engine.log_today(metrics(5)).unwrap();
        harness.engine.append_event(EventKind::SmallWin, 2, None).unwrap();
        assert!(harness.engine.take_insight_ticket().is_none());
    }

    #[tokio::test]
    async fn test_quiet_mode_discards_in_flight_answer() {
        let mut harness = Harness::signed_in();
        for stress in 0..3 {
            harness.check_in_and_advance(stress);
        }
        let ticket = harness.engine.take_insight_ticket().unwrap();

        harness.engine.set_quiet_mode(true).unwrap();
        assert!(harness.engine.take_insight_ticket().is_none());
        assert!(!harness.engine.is_insight_eligible());

        // More logging in quiet mode never asks for analysis
        harness.check_in_and_advance(4);
        assert!(harness.engine.take_insight_ticket().is_none());

        let applied = harness.engine.apply_insight(ticket.run().await).unwrap();
        assert_eq!(applied, InsightApplied::Stale);
        assert_eq!(harness.engine.latest_insight(), None);

        // Leaving quiet mode is a change, so a fresh request follows
        harness.engine.set_quiet_mode(false).unwrap();
        assert!(harness.engine.take_insight_ticket().is_some());
    }

    #[tokio::test]
    async fn test_newest_request_wins_out_of_order() {
        let mut harness = Harness::signed_in();
        for stress in 0..3 {
            harness.check_in_and_advance(stress);
        }
        let older = harness.engine.take_insight_ticket().unwrap();
        harness.check_in_and_advance(3);
        let newer = harness.engine.take_insight_ticket().unwrap();
        assert!(newer.generation() > older.generation());

        let newer_outcome = newer.run().await;
        let older_outcome = older.run().await;

        assert_eq!(
            harness.engine.apply_insight(newer_outcome).unwrap(),
            InsightApplied::Committed
        );
        assert_eq!(
            harness.engine.apply_insight(older_outcome).unwrap(),
            InsightApplied::Stale
        );
        assert_eq!(harness.engine.latest_insight().unwrap().summary, "4 logs");
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_engine_usable() {
        let mut harness = Harness::with_analysis(RecordingAnalysis::failing());
        harness.engine.sign_in(user());
        for stress in 0..3 {
            harness.check_in_and_advance(stress);
        }
        let ticket = harness.engine.take_insight_ticket().unwrap();
        let result = harness.engine.apply_insight(ticket.run().await);
        assert!(matches!(result, Err(EngineError::AnalysisUnavailable(_))));
        assert_eq!(harness.engine.latest_insight(), None);

        // No automatic retry
        assert!(harness.engine.take_insight_ticket().is_none());
        assert_eq!(harness.analysis.calls().len(), 1);

        harness.check_in_and_advance(1);
        assert_eq!(harness.engine.logs().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_insight() {
        let mut harness = Harness::signed_in();
        harness.check_in_and_advance(1);
        assert_eq!(harness.engine.refresh_insight().await.unwrap(), None);

        harness.check_in_and_advance(2);
        harness.check_in_and_advance(3);
        assert_eq!(
            harness.engine.refresh_insight().await.unwrap(),
            Some(InsightApplied::Committed)
        );
        assert!(harness.engine.take_insight_ticket().is_none());
    }

    #[test]
    fn test_state_survives_reopen() {
        let mut harness = Harness::signed_in();
        harness.check_in_and_advance(5);
        harness
            .engine
            .append_event(EventKind::Feedback, 3, Some("code review".into()))
            .unwrap();
        let reminder = harness
            .engine
            .add_reminder(NewReminder {
                label: "Breathe after feedback".into(),
                target: ReminderTarget::Event(EventKind::Feedback),
                is_active: true,
            })
            .unwrap();
        harness.engine.complete_onboarding().unwrap();

        let reopened = harness.reopen();
        assert!(reopened.load_report().is_clean());
        assert_eq!(reopened.user(), Some(&user()));
        assert_eq!(reopened.logs(), harness.engine.logs());
        assert_eq!(reopened.threads(), harness.engine.threads());
        assert_eq!(reopened.settings(), harness.engine.settings());
        assert_eq!(reopened.settings().mindfulness_reminders[0].id, reminder);
        assert_eq!(reopened.settings_store().total_awareness(), 2);
    }

    #[test]
    fn test_corrupt_slot_falls_back_to_default() {
        let mut harness = Harness::signed_in();
        harness.check_in_and_advance(2);
        harness.store.save(StorageKey::Logs, b"{not json").unwrap();
        harness.store.save(StorageKey::Threads, br#"[{"type":"Stress","level":1}]"#).unwrap();

        let reopened = harness.reopen();
        assert!(reopened.logs().is_empty());
        assert_eq!(reopened.threads(), &ThreadSet::default());
        assert_eq!(reopened.user(), Some(&user()));
        assert_eq!(reopened.settings_store().total_awareness(), 1);

        let corrupt: Vec<StorageKey> = reopened.load_report().corrupt.iter().map(|c| c.key).collect();
        assert_eq!(corrupt, vec![StorageKey::Logs, StorageKey::Threads]);
        assert!(matches!(
            reopened.load_report().corrupt[0].to_error(),
            EngineError::StorageCorrupt { key: StorageKey::Logs, .. }
        ));
    }

    #[test]
    fn test_sign_out_keeps_data() {
        let mut harness = Harness::signed_in();
        harness.check_in_and_advance(2);
        harness.engine.sign_out();

        assert_eq!(harness.engine.user(), None);
        assert_eq!(harness.engine.logs().len(), 1);
        assert_eq!(harness.store.load(StorageKey::User).unwrap(), None);

        let reopened = harness.reopen();
        assert_eq!(reopened.user(), None);
        assert_eq!(reopened.logs().len(), 1);
    }

    #[test]
    fn test_guest_sign_in() {
        let mut harness = Harness::new();
        let guest = harness.engine.sign_in_guest();
        assert_eq!(harness.engine.user(), Some(&guest));
        assert!(harness.engine.log_today(metrics(1)).is_ok());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut harness = Harness::signed_in();
        for stress in 0..3 {
            harness.check_in_and_advance(stress);
        }
        harness.engine.set_quiet_mode(true).unwrap();
        harness.engine.complete_onboarding().unwrap();

        harness.engine.reset().unwrap();
        assert!(harness.engine.logs().is_empty());
        assert_eq!(harness.engine.threads(), &ThreadSet::default());
        assert_eq!(harness.engine.settings(), &UserSettings::default());
        assert_eq!(harness.engine.latest_insight(), None);
        assert_eq!(harness.engine.user(), Some(&user()));

        let reopened = harness.reopen();
        assert!(reopened.logs().is_empty());
        assert_eq!(reopened.user(), Some(&user()));
        assert_eq!(harness.store.load(StorageKey::Logs).unwrap(), None);
    }

    #[test]
    fn test_reset_leaves_state_when_store_cannot_clear() {
        let store = Arc::new(NoClearStore(MemoryStore::new()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        ));
        let mut engine = BehaviorEngine::with_config(
            &EngineConfig::default(),
            store.clone(),
            Arc::new(RecordingAnalysis::default()),
            clock,
        );
        engine.sign_in(user());
        engine.log_today(metrics(4)).unwrap();
        engine.complete_onboarding().unwrap();

        assert!(matches!(engine.reset(), Err(EngineError::Storage(_))));
        assert_eq!(engine.logs().len(), 1);
        assert!(engine.settings().onboarding_completed);
        assert_eq!(engine.settings_store().total_awareness(), 1);
        assert!(store.0.load(StorageKey::Logs).unwrap().is_some());
    }

    #[test]
    fn test_out_of_range_stored_logs_rejected() {
        let harness = Harness::signed_in();
        let bad_event = br#"[{"date":"2024-01-14","mood":3,"stress":1,"energy":3,"sleepQuality":3,"workload":0,"activity":"None","events":[{"id":"3f2504e0-4f89-11d3-9a0c-0305e82c3301","type":"Argument","intensity":0,"timestamp":1705222800000}]}]"#;
        harness.store.save(StorageKey::Logs, bad_event).unwrap();

        let reopened = harness.reopen();
        assert!(reopened.logs().is_empty());
        assert!(!reopened.load_report().restored.contains(&StorageKey::Logs));
        let corrupt: Vec<StorageKey> = reopened.load_report().corrupt.iter().map(|c| c.key).collect();
        assert_eq!(corrupt, vec![StorageKey::Logs]);

        let bad_scalars = br#"[{"date":"2024-01-14","mood":200,"stress":99,"energy":3,"sleepQuality":3,"workload":0,"activity":"None"}]"#;
        harness.store.save(StorageKey::Logs, bad_scalars).unwrap();
        let reopened = harness.reopen();
        assert!(reopened.logs().is_empty());
        assert!(reopened.load_report().corrupt[0].reason.contains("mood"));
        assert_eq!(reopened.user(), Some(&user()));
    }

    #[test]
    fn test_reminder_errors() {
        let mut harness = Harness::signed_in();
        let missing = Uuid::new_v4();
        assert!(matches!(
            harness.engine.remove_reminder(missing),
            Err(EngineError::ReminderNotFound(id)) if id == missing
        ));
        assert!(matches!(
            harness.engine.toggle_reminder(missing),
            Err(EngineError::ReminderNotFound(_))
        ));

        let id = harness
            .engine
            .add_reminder(NewReminder {
                label: "Pause".into(),
                target: ReminderTarget::Any,
                is_active: true,
            })
            .unwrap();
        assert_eq!(harness.engine.active_reminders().len(), 1);
        assert!(!harness.engine.toggle_reminder(id).unwrap());
        assert!(harness.engine.active_reminders().is_empty());
        harness.engine.remove_reminder(id).unwrap();
    }

    #[test]
    fn test_update_settings_rejects_bad_patch() {
        let mut harness = Harness::signed_in();
        let patch = SettingsPatch::from_json(r#"{"checkInDays":[1,2,8]}"#).unwrap();
        assert!(matches!(
            harness.engine.update_settings(patch),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(harness.engine.settings().check_in_days.len(), 7);
        assert!(!harness.engine.toggle_check_in_day(0).unwrap());
    }
}
