use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::ports::PortSpec;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Canonical scan request as posted to `POST /api/scans/`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub target: String,
    pub ports: PortSpec,
    pub protocols: BTreeSet<Protocol>,
    #[serde(rename = "timeout")]
    pub timeout_secs: u32,
    pub threads: u32,
}

/// Opaque server-side job identifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status reported by the backend for a job.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
        }
    }
}

/// One progress response from `GET /api/scans/{id}/progress/`.
/// Missing counters read as zero.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub scanned: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default, rename = "open")]
    pub open_count: u64,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub status: JobStatus,
}

impl ProgressSnapshot {
    /// Percentage clamped to [0, 100] and rounded for display.
    pub fn rounded_percentage(&self) -> u8 {
        if !self.percentage.is_finite() {
            return 0;
        }
        self.percentage.clamp(0.0, 100.0).round() as u8
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmitResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub message: Option<String>,
}

/// A job as listed by `GET /api/scans/`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub target: String,
    pub ports: String,
    /// Backends send either a list (`["tcp"]`) or a joined string (`"TCP,UDP"`).
    #[serde(deserialize_with = "protocols_list_or_csv")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct JobList {
    #[serde(default)]
    pub results: Vec<Job>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_scans: u64,
    #[serde(default)]
    pub active_scans: u64,
    #[serde(default)]
    pub hosts_found: u64,
    #[serde(default)]
    pub open_ports: u64,
}

/// One port result of a finished job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanResultEntry {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub status: String,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Paginated response of `GET /api/scans/{id}/results/`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ResultsPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<ScanResultEntry>,
}

fn protocols_list_or_csv<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    let list = match Raw::deserialize(deserializer)? {
        Raw::List(v) => v,
        Raw::Csv(s) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    };
    Ok(list.into_iter().map(|p| p.to_lowercase()).collect())
}
