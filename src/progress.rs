use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// One status payload from `GET /api/v1/progress/{video_id}`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ProgressReport {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub eta: Option<f64>,
}

impl ProgressReport {
    /// Reported percentage, clamped to 0..=100 and truncated.
    pub fn percent(&self) -> Option<u8> {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0) as u8)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusAction {
    Progress,
    Complete,
    Fail,
    Pending,
    Ignore,
}

impl FromStr for StatusAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "progress" | "downloading" => Ok(Self::Progress),
            "complete" | "completed" => Ok(Self::Complete),
            "fail" | "error" => Ok(Self::Fail),
            "pending" => Ok(Self::Pending),
            "ignore" => Ok(Self::Ignore),
            other => Err(other.to_string()),
        }
    }
}

/// Raw backend status -> what the poller does with it.
/// Unmapped statuses are ignored.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusMap {
    actions: HashMap<String, StatusAction>,
}

impl Default for StatusMap {
    fn default() -> Self {
        let mut actions = HashMap::new();
        actions.insert("downloading".to_string(), StatusAction::Progress);
        actions.insert("completed".to_string(), StatusAction::Complete);
        actions.insert("error".to_string(), StatusAction::Fail);
        Self { actions }
    }
}

impl StatusMap {
    pub fn insert(&mut self, status: &str, action: StatusAction) {
        self.actions.insert(status.to_string(), action);
    }

    pub fn action(&self, status: &str) -> StatusAction {
        self.actions
            .get(status)
            .copied()
            .unwrap_or(StatusAction::Ignore)
    }
}

pub const COMPLETED_LABEL: &str = "Completed!";
pub const ERROR_LABEL: &str = "Error!";
pub const STALLED_LABEL: &str = "Stalled";
pub const PENDING_LABEL: &str = "Waiting...";
pub const STARTING_LABEL: &str = "Starting...";
pub const UNKNOWN_ERROR: &str = "Unknown";

/// What a single decoded report does to the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// Move the indicator to the given percentage.
    Advance(u8),
    /// Label-only update for statuses mapped to `Pending`.
    Waiting,
    Completed,
    Failed(String),
    NoChange,
}

pub fn step(report: &ProgressReport, statuses: &StatusMap) -> Step {
    match statuses.action(&report.status) {
        StatusAction::Progress => match report.percent() {
            Some(p) => Step::Advance(p),
            None => Step::NoChange,
        },
        StatusAction::Complete => Step::Completed,
        StatusAction::Fail => Step::Failed(
            report
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        ),
        StatusAction::Pending => Step::Waiting,
        StatusAction::Ignore => Step::NoChange,
    }
}
