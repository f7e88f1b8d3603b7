//! Analysis collaborator port
//!
//! The weekly insight comes from an external service. The engine only knows
//! this trait; transport, prompting and model choice belong to implementors.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::insight::WeeklyInsight;
use crate::types::DailyLog;

/// Failure reported by an analysis collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("response failed schema validation: {0}")]
    Schema(String),
}

/// Logs sent for analysis, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub logs: Vec<DailyLog>,
}

impl AnalysisRequest {
    pub fn new(logs: Vec<DailyLog>) -> Self {
        Self { logs }
    }

    /// The logs as the JSON array handed to the analysis service
    pub fn logs_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.logs)
    }
}

#[async_trait]
pub trait AnalysisCollaborator: Send + Sync {
    /// Produce a weekly insight for at most seven logs, newest first
    async fn analyze(&self, request: &AnalysisRequest) -> Result<WeeklyInsight, AnalysisError>;
}

/// Replays a recorded collaborator response
#[derive(Debug, Clone)]
pub struct ReplayAnalysis {
    response: String,
}

impl ReplayAnalysis {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl AnalysisCollaborator for ReplayAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<WeeklyInsight, AnalysisError> {
        WeeklyInsight::from_json(&self.response)
    }
}

/// Collaborator for hosts that have no analysis service configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnalysis;

#[async_trait]
impl AnalysisCollaborator for NoAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<WeeklyInsight, AnalysisError> {
        Err(AnalysisError::Transport(
            "no analysis service configured".to_string(),
        ))
    }
}
