use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the persisted operator registry, keyed by canonical callsign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub callsign: String,
    pub name: String,
    pub category: String,
    pub operator_type: String,
    pub region: String,
    pub district: String,
    pub province: String,
    pub department: String,
    pub license: String,
    pub resolution: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub cutoff_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub country: String,
    pub updated_at: DateTime<Utc>,
}

/// One normalized row produced by an extractor; discarded after
/// reconciliation. `cutoff_at` and `country` are batch-level tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingRow {
    pub callsign: String,
    pub name: String,
    pub category: String,
    pub operator_type: String,
    pub region: String,
    pub district: String,
    pub province: String,
    pub department: String,
    pub license: String,
    pub resolution: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub cutoff_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub country: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl IncomingRow {
    pub fn new(callsign: String) -> Self {
        Self {
            callsign,
            enabled: true,
            ..Self::default()
        }
    }
}

/// Per-run reconciliation counters. Field names are a stable contract
/// consumed by the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileCounts {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub disabled: usize,
    pub reenabled: usize,
    pub protected: usize,
}

/// The engine's output: records to write plus the summary counters.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub upserts: Vec<OperatorRecord>,
    pub counts: ReconcileCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub rustc: String,
    pub cargo: String,
    pub pdftotext: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub db_path: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterSource {
    pub path: String,
    pub format: String,
    pub sha256: String,
    pub country: String,
    pub cutoff_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportCounts {
    pub rows_extracted: usize,
    pub rows_skipped: usize,
    pub pages_processed: usize,
    #[serde(flatten)]
    pub plan: ReconcileCounts,
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
    pub dry_run: bool,
    pub tool_versions: ToolVersions,
    pub paths: ImportPaths,
    pub source: RosterSource,
    pub absence_scope: String,
    pub counts: ImportCounts,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}
