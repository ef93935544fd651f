use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobId;

/// Outcome of one QA check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Score in [0, 1].
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
    pub notes: Vec<String>,
}

impl CheckResult {
    pub fn new(score: f64, threshold: f64, passed: bool) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            threshold,
            passed,
            notes: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedScene {
    pub lesson: usize,
    pub scene_number: u32,
    pub check: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaChecks {
    pub audio_sync: CheckResult,
    pub character_consistency: CheckResult,
    pub caption_alignment: CheckResult,
    pub technical_metrics: CheckResult,
}

impl QaChecks {
    pub fn all_passed(&self) -> bool {
        self.audio_sync.passed
            && self.character_consistency.passed
            && self.caption_alignment.passed
            && self.technical_metrics.passed
    }
}

/// Advisory QA report; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub id: Uuid,
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub checks: QaChecks,
    pub flagged_scenes: Vec<FlaggedScene>,
    /// True if any check failed its threshold.
    pub flagged: bool,
}

impl QaReport {
    pub fn new(job_id: JobId, checks: QaChecks, flagged_scenes: Vec<FlaggedScene>) -> Self {
        let flagged = !checks.all_passed();
        Self {
            id: Uuid::new_v4(),
            job_id,
            created_at: Utc::now(),
            checks,
            flagged_scenes,
            flagged,
        }
    }
}
