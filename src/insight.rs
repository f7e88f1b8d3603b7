//! Weekly insight model
//!
//! The analysis collaborator returns a narrative, a forecast and structured
//! cards describing the last week. The engine stores it verbatim; it only
//! checks that every field is present before accepting it.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisError;
use crate::types::ThreadKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightCardKind {
    CauseEffect,
    Pattern,
    Suggestion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightCard {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: InsightCardKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatusLevel {
    Stable,
    Sensitive,
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStatus {
    #[serde(rename = "type")]
    pub thread: ThreadKind,
    pub status: ThreadStatusLevel,
    pub description: String,
}

/// Narrative and forecast for the recent logs.
///
/// No field has a serde default: a response missing any of them fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyInsight {
    pub week_start: String,
    pub summary: String,
    /// Narrative of the week's flow
    pub story: String,
    /// Gentle forecast for the next day
    pub forecast: String,
    pub cards: Vec<InsightCard>,
    pub thread_statuses: Vec<ThreadStatus>,
    pub suggestions: Vec<String>,
}

impl WeeklyInsight {
    /// Parse and validate a raw collaborator response
    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        let insight: WeeklyInsight = serde_json::from_str(text.trim())
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;
        insight.validate()?;
        Ok(insight)
    }

    /// Reject responses whose required text is blank
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let required = [
            ("story", self.story.as_str()),
            ("forecast", self.forecast.as_str()),
            ("summary", self.summary.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AnalysisError::Schema(format!("{field} is empty")));
        }
        if let Some(card) = self
            .cards
            .iter()
            .find(|c| c.title.trim().is_empty() || c.description.trim().is_empty())
        {
            return Err(AnalysisError::Schema(format!(
                "insight card {:?} is incomplete",
                card.title
            )));
        }
        Ok(())
    }

    pub fn status_for(&self, thread: ThreadKind) -> Option<&ThreadStatus> {
        self.thread_statuses.iter().find(|s| s.thread == thread)
    }
}
