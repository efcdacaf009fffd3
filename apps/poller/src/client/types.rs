//! Wire shapes exchanged with the control plane.

use serde::{Deserialize, Serialize};

use crate::monitoring::types::null_as_default;
use crate::monitoring::{Assignment, CheckOutcome};

/// Sent once when the poller starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterResponse {
    pub poller_uuid: String,
    pub location_uuid: String,
    pub location_key: String,
    pub location_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorsResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub monitors: Vec<Assignment>,
    #[serde(deserialize_with = "null_as_default")]
    pub total: usize,
}

/// One outcome in submission form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub monitor_uuid: String,
    pub subdomain: String,
    pub location: String,
    pub poller_uuid: String,
    /// RFC 3339
    pub checked_at: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub status_code: u16,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_body: String,
}

fn is_zero(code: &u16) -> bool {
    *code == 0
}

impl CheckResult {
    pub fn from_outcome(outcome: &CheckOutcome, poller_uuid: &str) -> Self {
        Self {
            monitor_uuid: outcome.monitor_id.clone(),
            subdomain: outcome.subdomain.clone(),
            location: outcome.location.clone(),
            poller_uuid: poller_uuid.to_string(),
            checked_at: outcome.checked_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            success: outcome.success,
            status_code: outcome.status_code,
            response_time_ms: outcome.response_time_ms,
            error_message: outcome.error_message.clone(),
            response_body: outcome.response_body.clone(),
        }
    }
}

/// Snapshot of buffered outcomes in submission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBatch {
    pub poller_uuid: String,
    pub results: Vec<CheckResult>,
}

impl ResultBatch {
    pub fn new(poller_uuid: &str, outcomes: &[CheckOutcome]) -> Self {
        Self {
            poller_uuid: poller_uuid.to_string(),
            results: outcomes.iter().map(|o| CheckResult::from_outcome(o, poller_uuid)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitResultsResponse {
    pub accepted: u64,
    pub rejected: u64,
}

/// Self-reported poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerStatus {
    Online,
    Busy,
    ShuttingDown,
}

impl std::fmt::Display for PollerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollerStatus::Online => write!(f, "online"),
            PollerStatus::Busy => write!(f, "busy"),
            PollerStatus::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub poller_uuid: String,
    pub status: PollerStatus,
    pub cpu_percent: f64,
    pub memory_mb: u64,
    pub queue_depth: usize,
    pub checks_executed: u64,
    pub checks_per_minute: f64,
    pub avg_check_duration_ms: u64,
    pub errors: u64,
    pub uptime_seconds: u64,
    pub version: String,
}
