use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, FailureKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    StoreSync,
    Scrape,
}

/// Why an item was skipped rather than attempted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Stored credentials can no longer be refreshed; the user must
    /// re-authorize before this store is synced again.
    NeedsReauth,
    Disconnected,
    NothingToSync,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded { observation_ids: Vec<String> },
    Skipped { reason: SkipReason },
    Failed { kind: FailureKind, message: String },
}

impl OutcomeKind {
    pub fn failed(err: &AppError) -> Self {
        OutcomeKind::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome for a single store or competitor link in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemOutcome {
    /// Store id or competitor link id.
    pub target_id: String,
    pub label: String,
    pub outcome: OutcomeKind,
}

impl ItemOutcome {
    pub fn new(target_id: impl Into<String>, label: impl Into<String>, outcome: OutcomeKind) -> Self {
        Self {
            target_id: target_id.into(),
            label: label.into(),
            outcome,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, OutcomeKind::Succeeded { .. })
    }
}

/// Aggregate describing one orchestration pass. Ephemeral: reported to the
/// caller and published on the event channel, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncRun {
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ItemOutcome>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl SyncRun {
    pub fn from_outcomes(
        kind: RunKind,
        started_at: DateTime<Utc>,
        outcomes: Vec<ItemOutcome>,
        cancelled: bool,
    ) -> Self {
        let mut succeeded = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for item in &outcomes {
            match item.outcome {
                OutcomeKind::Succeeded { .. } => succeeded += 1,
                OutcomeKind::Skipped { .. } => skipped += 1,
                OutcomeKind::Failed { .. } => failed += 1,
            }
        }

        Self {
            kind,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            succeeded,
            skipped,
            failed,
            cancelled,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}
