use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::target::TargetName;

/// Structural overview of a sample document, produced once per run and fed
/// to the oracle as prompt context. Only the first few pages are sampled to
/// keep the excerpt small.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSummary {
    pub text_sample: String,
    /// Human-readable per-page table counts, e.g. `Page 1 tables: 2`.
    pub table_info: Vec<String>,
    pub total_pages: usize,
}

/// One generated version of the extraction function, paired with the attempt
/// that produced it. Candidates are superseded on retry, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub attempt: u32,
    pub source: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Pass,
    Fail,
}

/// Result of testing one candidate in the sandbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: VerdictOutcome,
    /// Captured stdout + stderr of the harness, or the timeout message.
    pub diagnostics: String,
    pub duration_ms: u64,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcome == VerdictOutcome::Pass
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded { artifact: PathBuf, attempts: u32 },
    Failed { attempts: u32, last_diagnostic: String },
}

/// Terminal report for one generation run. Exactly one of the two statuses
/// is ever exposed; there are no partial outcomes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub target: TargetName,
    #[serde(flatten)]
    pub status: RunStatus,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn new(target: TargetName, status: RunStatus) -> Self {
        Self {
            target,
            status,
            finished_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match &self.status {
            RunStatus::Succeeded { attempts, .. } | RunStatus::Failed { attempts, .. } => *attempts,
        }
    }
}
