use serde::{Deserialize, Serialize};

/// Per-entity outcome of one import run. `success` counts records this
/// run created; records found already present count in neither field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTally {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl EntityTally {
    pub fn record_failure(&mut self, count: usize, message: String) {
        self.failed += count;
        self.errors.push(message);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub faculties: EntityTally,
    pub departments: EntityTally,
    pub courses: EntityTally,
    pub elapsed_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum NavigationOutcome {
    Synced,
    SkippedMissingAnchor,
    Failed(String),
}

/// What happened to one faculty or department navigation entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    Created,
    AlreadyExists,
    SkippedMissingParent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationLevelCounts {
    pub created: usize,
    pub already_present: usize,
    pub skipped_missing_parent: usize,
}

impl NavigationLevelCounts {
    pub fn record(&mut self, outcome: NodeOutcome) {
        match outcome {
            NodeOutcome::Created => self.created += 1,
            NodeOutcome::AlreadyExists => self.already_present += 1,
            NodeOutcome::SkippedMissingParent => self.skipped_missing_parent += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationReport {
    pub outcome: NavigationOutcome,
    pub anchor_id: Option<i64>,
    pub faculties: NavigationLevelCounts,
    pub departments: NavigationLevelCounts,
}

impl NavigationReport {
    pub fn with_outcome(outcome: NavigationOutcome) -> Self {
        Self {
            outcome,
            anchor_id: None,
            faculties: NavigationLevelCounts::default(),
            departments: NavigationLevelCounts::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPaths {
    pub data_root: String,
    pub source_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub source_format: String,
    pub source_sha256: String,
    pub paths: ImportPaths,
    pub result: ImportResult,
    pub navigation: NavigationReport,
}
