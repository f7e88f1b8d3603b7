//! Insight orchestration
//!
//! Decides when to ask the analysis collaborator for a weekly insight and
//! which answers may land in the latest-insight slot.
//!
//! Requests are split into three steps so the engine is never borrowed while
//! a request is pending:
//!
//! 1. [`InsightOrchestrator::observe`] (or [`InsightOrchestrator::issue`])
//!    hands out an [`InsightTicket`] tagged with a fresh generation.
//! 2. The caller awaits [`InsightTicket::run`].
//! 3. [`InsightOrchestrator::apply`] commits the outcome only if its
//!    generation is still the one in flight.
//!
//! Issuing a new ticket supersedes the pending one. Turning quiet mode on or
//! dropping below the log threshold cancels the pending generation, so a
//! late answer is discarded rather than shown.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisCollaborator, AnalysisError, AnalysisRequest};
use crate::config::InsightPolicy;
use crate::error::EngineError;
use crate::insight::WeeklyInsight;
use crate::ledger::LogLedger;

/// A pending analysis request
pub struct InsightTicket {
    generation: u64,
    request: AnalysisRequest,
    collaborator: Arc<dyn AnalysisCollaborator>,
}

impl std::fmt::Debug for InsightTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightTicket")
            .field("generation", &self.generation)
            .field("logs", &self.request.logs.len())
            .finish()
    }
}

impl InsightTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    /// Call the collaborator. Does not touch engine state.
    pub async fn run(self) -> InsightOutcome {
        let result = self.collaborator.analyze(&self.request).await;
        let result = result.and_then(|insight| insight.validate().map(|()| insight));
        InsightOutcome {
            generation: self.generation,
            result,
        }
    }
}

/// Answer for a ticket, to be handed back to [`InsightOrchestrator::apply`]
#[derive(Debug, Clone)]
pub struct InsightOutcome {
    generation: u64,
    result: Result<WeeklyInsight, AnalysisError>,
}

impl InsightOutcome {
    pub fn new(generation: u64, result: Result<WeeklyInsight, AnalysisError>) -> Self {
        Self { generation, result }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// What [`InsightOrchestrator::apply`] did with an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightApplied {
    /// Replaced the latest insight
    Committed,
    /// Superseded or cancelled; ignored
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct InsightOrchestrator {
    policy: InsightPolicy,
    latest: Option<WeeklyInsight>,
    /// Highest generation handed out
    issued: u64,
    /// Generation whose answer may still commit
    in_flight: Option<u64>,
    /// Ledger size and quiet flag at the last eligibility check
    observed: Option<(usize, bool)>,
}

impl InsightOrchestrator {
    pub fn new(policy: InsightPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> InsightPolicy {
        self.policy
    }

    pub fn latest(&self) -> Option<&WeeklyInsight> {
        self.latest.as_ref()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn is_eligible(&self, ledger_len: usize, quiet_mode: bool) -> bool {
        !quiet_mode && ledger_len >= self.policy.min_logs
    }

    /// Eligibility check driven by changes in ledger size or quiet mode.
    ///
    /// Returns a ticket only when the observed state changed and is eligible.
    pub fn observe(
        &mut self,
        ledger: &LogLedger,
        quiet_mode: bool,
        collaborator: &Arc<dyn AnalysisCollaborator>,
    ) -> Option<InsightTicket> {
        let snapshot = (ledger.len(), quiet_mode);
        if self.observed == Some(snapshot) {
            return None;
        }
        self.observed = Some(snapshot);
        self.issue(ledger, quiet_mode, collaborator)
    }

    /// Issue a ticket now if eligible, superseding any pending one
    pub fn issue(
        &mut self,
        ledger: &LogLedger,
        quiet_mode: bool,
        collaborator: &Arc<dyn AnalysisCollaborator>,
    ) -> Option<InsightTicket> {
        if !self.is_eligible(ledger.len(), quiet_mode) {
            if let Some(generation) = self.in_flight.take() {
                debug!(generation, quiet_mode, "pending insight request cancelled");
            }
            return None;
        }

        self.issued += 1;
        if let Some(previous) = self.in_flight.replace(self.issued) {
            debug!(previous, generation = self.issued, "pending insight request superseded");
        }

        let request = AnalysisRequest::new(ledger.recent(self.policy.window).to_vec());
        debug!(generation = self.issued, logs = request.logs.len(), "insight request issued");

        Some(InsightTicket {
            generation: self.issued,
            request,
            collaborator: Arc::clone(collaborator),
        })
    }

    /// Commit or discard an outcome.
    ///
    /// A failed answer for the current generation leaves the latest insight
    /// untouched and is reported as [`EngineError::AnalysisUnavailable`].
    pub fn apply(&mut self, outcome: InsightOutcome) -> Result<InsightApplied, EngineError> {
        if self.in_flight != Some(outcome.generation) {
            debug!(
                generation = outcome.generation,
                current = ?self.in_flight,
                "stale insight outcome discarded"
            );
            return Ok(InsightApplied::Stale);
        }
        self.in_flight = None;

        match outcome.result {
            Ok(insight) => {
                info!(generation = outcome.generation, week_start = %insight.week_start, "weekly insight updated");
                self.latest = Some(insight);
                Ok(InsightApplied::Committed)
            }
            Err(e) => {
                warn!(generation = outcome.generation, error = %e, "weekly insight unavailable");
                Err(EngineError::AnalysisUnavailable(e.to_string()))
            }
        }
    }

    /// Cancel anything pending; the next observation re-checks eligibility
    pub fn cancel(&mut self) {
        self.in_flight = None;
        self.observed = None;
    }

    /// Forget the latest insight and cancel anything pending
    pub fn reset(&mut self) {
        self.latest = None;
        self.in_flight = None;
        self.observed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ReplayAnalysis;
    use crate::insight::tests::{sample_insight, sample_insight_json};
    use crate::settings::SettingsStore;
    use crate::types::DailyMetrics;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn ledger_with(days: u32) -> LogLedger {
        let mut ledger = LogLedger::new();
        let mut settings = SettingsStore::new();
        for d in 1..=days {
            ledger
                .upsert_daily_metrics(
                    NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
                    DailyMetrics::default(),
                    &mut settings,
                )
                .unwrap();
        }
        ledger
    }

    fn replay() -> Arc<dyn AnalysisCollaborator> {
        Arc::new(ReplayAnalysis::new(sample_insight_json()))
    }

    #[test]
    fn test_threshold() {
        let mut orchestrator = InsightOrchestrator::default();
        let collaborator = replay();

        assert!(orchestrator.observe(&ledger_with(2), false, &collaborator).is_none());

        let ticket = orchestrator.observe(&ledger_with(3), false, &collaborator).unwrap();
        assert_eq!(ticket.generation(), 1);
        assert_eq!(ticket.request().logs.len(), 3);
    }

    #[test]
    fn test_observe_only_on_change() {
        let mut orchestrator = InsightOrchestrator::default();
        let collaborator = replay();
        let ledger = ledger_with(4);

        assert!(orchestrator.observe(&ledger, false, &collaborator).is_some());
        assert!(orchestrator.observe(&ledger, false, &collaborator).is_none());
        // An explicit issue ignores change detection
        assert!(orchestrator.issue(&ledger, false, &collaborator).is_some());
    }

    #[test]
    fn test_window_is_newest_seven() {
        let mut orchestrator = InsightOrchestrator::default();
        let ticket = orchestrator.observe(&ledger_with(10), false, &replay()).unwrap();
        let dates: Vec<u32> = ticket
            .request()
            .logs
            .iter()
            .map(|l| chrono::Datelike::day(&l.date))
            .collect();
        assert_eq!(dates, vec![10, 9, 8, 7, 6, 5, 4]);
    }

    #[test]
    fn test_quiet_mode_blocks_requests() {
        let mut orchestrator = InsightOrchestrator::default();
        assert!(orchestrator.observe(&ledger_with(5), true, &replay()).is_none());
        assert_eq!(orchestrator.in_flight(), None);
    }

    #[tokio::test]
    async fn test_success_commits() {
        let mut orchestrator = InsightOrchestrator::default();
        let ticket = orchestrator.observe(&ledger_with(3), false, &replay()).unwrap();
        let outcome = ticket.run().await;
        assert_eq!(orchestrator.apply(outcome).unwrap(), InsightApplied::Committed);
        assert_eq!(orchestrator.latest(), Some(&sample_insight()));
        assert_eq!(orchestrator.in_flight(), None);
    }

    #[test]
    fn test_superseded_outcome_discarded() {
        let mut orchestrator = InsightOrchestrator::default();
        let collaborator = replay();
        let first = orchestrator.observe(&ledger_with(3), false, &collaborator).unwrap();
        let second = orchestrator.observe(&ledger_with(4), false, &collaborator).unwrap();

        let mut newer = sample_insight();
        newer.summary = "newer".to_string();

        let applied = orchestrator
            .apply(InsightOutcome::new(second.generation(), Ok(newer.clone())))
            .unwrap();
        assert_eq!(applied, InsightApplied::Committed);

        // The older answer arrives late and must not overwrite the newer one
        let applied = orchestrator
            .apply(InsightOutcome::new(first.generation(), Ok(sample_insight())))
            .unwrap();
        assert_eq!(applied, InsightApplied::Stale);
        assert_eq!(orchestrator.latest(), Some(&newer));
    }

    #[test]
    fn test_quiet_mode_cancels_pending() {
        let mut orchestrator = InsightOrchestrator::default();
        let collaborator = replay();
        let ledger = ledger_with(3);
        let ticket = orchestrator.observe(&ledger, false, &collaborator).unwrap();

        assert!(orchestrator.observe(&ledger, true, &collaborator).is_none());
        let applied = orchestrator
            .apply(InsightOutcome::new(ticket.generation(), Ok(sample_insight())))
            .unwrap();
        assert_eq!(applied, InsightApplied::Stale);
        assert_eq!(orchestrator.latest(), None);
    }

    #[test]
    fn test_failure_keeps_previous_insight() {
        let mut orchestrator = InsightOrchestrator::default();
        let collaborator = replay();
        let first = orchestrator.observe(&ledger_with(3), false, &collaborator).unwrap();
        orchestrator
            .apply(InsightOutcome::new(first.generation(), Ok(sample_insight())))
            .unwrap();

        let second = orchestrator.observe(&ledger_with(4), false, &collaborator).unwrap();
        let result = orchestrator.apply(InsightOutcome::new(
            second.generation(),
            Err(AnalysisError::Transport("offline".into())),
        ));
        assert!(matches!(result, Err(EngineError::AnalysisUnavailable(_))));
        assert_eq!(orchestrator.latest(), Some(&sample_insight()));
    }

    #[tokio::test]
    async fn test_malformed_response_is_failure() {
        let mut orchestrator = InsightOrchestrator::default();
        let broken: Arc<dyn AnalysisCollaborator> =
            Arc::new(ReplayAnalysis::new(r#"{"story":"half an answer"}"#));
        let ticket = orchestrator.observe(&ledger_with(3), false, &broken).unwrap();
        let result = orchestrator.apply(ticket.run().await);
        assert!(matches!(result, Err(EngineError::AnalysisUnavailable(_))));
        assert_eq!(orchestrator.latest(), None);
    }

    #[test]
    fn test_reset() {
        let mut orchestrator = InsightOrchestrator::default();
        let ticket = orchestrator.observe(&ledger_with(3), false, &replay()).unwrap();
        orchestrator
            .apply(InsightOutcome::new(ticket.generation(), Ok(sample_insight())))
            .unwrap();
        orchestrator.reset();
        assert_eq!(orchestrator.latest(), None);
    }
}
