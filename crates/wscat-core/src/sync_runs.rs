use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunType {
    /// Fetch the whole source, normalize, merge and upsert.
    Full,
    /// Same path as `Full`, limited to records changed since the last
    /// successful catalog run.
    Incremental,
    /// Price/stock signals only, written onto already-known SKUs.
    Stock,
}

impl SyncRunType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncRunType::Full => "full",
            SyncRunType::Incremental => "incremental",
            SyncRunType::Stock => "stock",
        }
    }

    /// Run types that fetch catalog records (as opposed to stock signals).
    #[must_use]
    pub fn is_catalog_run(self) -> bool {
        matches!(self, SyncRunType::Full | SyncRunType::Incremental)
    }
}

impl std::fmt::Display for SyncRunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncRunType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(SyncRunType::Full),
            "incremental" => Ok(SyncRunType::Incremental),
            "stock" => Ok(SyncRunType::Stock),
            other => Err(UnknownVariant {
                kind: "sync run type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Running,
    /// Every fetched record was upserted or skipped for a documented reason.
    Success,
    /// The run completed but at least one record failed to upsert.
    Partial,
    /// The source fetch failed or the run exceeded its time budget.
    Failed,
}

impl SyncRunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Success => "success",
            SyncRunStatus::Partial => "partial",
            SyncRunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncRunStatus::Running)
    }
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncRunStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SyncRunStatus::Running),
            "success" => Ok(SyncRunStatus::Success),
            "partial" => Ok(SyncRunStatus::Partial),
            "failed" => Ok(SyncRunStatus::Failed),
            other => Err(UnknownVariant {
                kind: "sync run status",
                value: other.to_string(),
            }),
        }
    }
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Cli,
    Api,
    Scheduler,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Api => "api",
            TriggerSource::Scheduler => "scheduler",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cli" => Ok(TriggerSource::Cli),
            "api" => Ok(TriggerSource::Api),
            "scheduler" => Ok(TriggerSource::Scheduler),
            other => Err(UnknownVariant {
                kind: "trigger source",
                value: other.to_string(),
            }),
        }
    }
}

/// Record counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub fetched: i32,
    pub upserted: i32,
    pub errors: i32,
    pub skipped: i32,
}

/// One sync invocation. Append-only: never edited after `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: SyncRunType,
    pub trigger_source: TriggerSource,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched_count: i32,
    pub upserted_count: i32,
    pub error_count: i32,
    pub skipped_count: i32,
    pub error_message: Option<String>,
}

impl SyncRun {
    #[must_use]
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            fetched: self.fetched_count,
            upserted: self.upserted_count,
            errors: self.error_count,
            skipped: self.skipped_count,
        }
    }
}
