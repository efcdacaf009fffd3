use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::checker::Verdict;

/// Upper bound on captured response/diagnostic bodies.
pub const MAX_BODY_BYTES: usize = 10 * 1024;

const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// One year; longer cadences are clamped so deadlines stay representable
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);
const DEFAULT_METHOD: &str = "GET";
const DEFAULT_EXPECTED_STATUS: u16 = 200;
const DEFAULT_RECORD_TYPE: &str = "A";
const DEFAULT_SSL_ALERT_DAYS: i64 = 30;

/// Type of monitoring check to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckType {
    Http,
    Api,
    Dns,
    Tcp,
    Ssl,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown monitor type: {0}")]
pub struct UnknownCheckType(pub String);

impl FromStr for CheckType {
    type Err = UnknownCheckType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(CheckType::Http),
            "api" => Ok(CheckType::Api),
            "dns" => Ok(CheckType::Dns),
            "tcp" => Ok(CheckType::Tcp),
            "ssl" => Ok(CheckType::Ssl),
            other => Err(UnknownCheckType(other.to_string())),
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckType::Http => write!(f, "http"),
            CheckType::Api => write!(f, "api"),
            CheckType::Dns => write!(f, "dns"),
            CheckType::Tcp => write!(f, "tcp"),
            CheckType::Ssl => write!(f, "ssl"),
        }
    }
}

impl CheckType {
    /// Timeout applied when the assignment does not carry one.
    pub fn default_timeout(self) -> Duration {
        match self {
            CheckType::Http | CheckType::Api | CheckType::Ssl => Duration::from_secs(30),
            CheckType::Dns | CheckType::Tcp => Duration::from_secs(10),
        }
    }
}

/// Decode an explicit `null` the same way as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Credentials attached to HTTP/API checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorAuth {
    /// `basic` or `bearer`; anything else is ignored
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub password: String,
    #[serde(deserialize_with = "null_as_default")]
    pub token: String,
}

/// A monitor this poller has been told to check.
///
/// Replaced wholesale on every fetch; `uuid` is stable across fetches.
/// Missing or `null` fields deserialize to their zero value and the
/// accessors below apply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Assignment {
    #[serde(deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subdomain: String,
    #[serde(deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub monitor_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub http_method: String,
    pub request_body: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub auth: Option<MonitorAuth>,
    #[serde(deserialize_with = "null_as_default")]
    pub timeout_seconds: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub check_interval_seconds: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub expected_status_code: u16,
    pub expected_response_contains: Option<String>,
    pub dns_record_type: Option<String>,
    pub expected_dns_host: Option<String>,
    pub tcp_port: Option<u16>,
    #[serde(deserialize_with = "null_as_default")]
    pub ssl_cert_monitoring: bool,
    pub ssl_cert_expiry_alert_days: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub failure_threshold: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub location: String,
}

impl Assignment {
    pub fn check_type(&self) -> Result<CheckType, UnknownCheckType> {
        self.monitor_type.parse()
    }

    /// Check cadence, 60s when unset and at most one year
    pub fn check_interval(&self) -> Duration {
        match self.check_interval_seconds {
            0 => DEFAULT_CHECK_INTERVAL,
            secs => Duration::from_secs(secs).min(MAX_CHECK_INTERVAL),
        }
    }

    /// Per-check timeout, falling back to the check type's default
    pub fn timeout(&self, check_type: CheckType) -> Duration {
        match self.timeout_seconds {
            0 => check_type.default_timeout(),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn method(&self) -> &str {
        if self.http_method.is_empty() { DEFAULT_METHOD } else { &self.http_method }
    }

    pub fn expected_status(&self) -> u16 {
        match self.expected_status_code {
            0 => DEFAULT_EXPECTED_STATUS,
            code => code,
        }
    }

    pub fn expected_substring(&self) -> Option<&str> {
        self.expected_response_contains.as_deref().filter(|s| !s.is_empty())
    }

    pub fn record_type(&self) -> &str {
        self.dns_record_type.as_deref().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_RECORD_TYPE)
    }

    pub fn expected_dns_host(&self) -> Option<&str> {
        self.expected_dns_host.as_deref().filter(|s| !s.is_empty())
    }

    pub fn ssl_alert_days(&self) -> i64 {
        self.ssl_cert_expiry_alert_days.unwrap_or(DEFAULT_SSL_ALERT_DAYS)
    }
}

/// Result of one check execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// UUID of the monitor that was checked
    pub monitor_id: String,

    pub subdomain: String,

    pub location: String,

    /// Taken before the network call, not at completion
    pub checked_at: DateTime<Utc>,

    pub success: bool,

    /// Protocol status code, 0 when the check produced none
    pub status_code: u16,

    /// Time spent in the network call
    pub response_time_ms: u64,

    /// Empty on success
    pub error_message: String,

    /// Captured body or diagnostic text, at most [`MAX_BODY_BYTES`]
    pub response_body: String,
}

impl CheckOutcome {
    /// Start an outcome for `assignment`, stamping the current time
    pub fn new(assignment: &Assignment) -> Self {
        Self {
            monitor_id: assignment.uuid.clone(),
            subdomain: assignment.subdomain.clone(),
            location: assignment.location.clone(),
            checked_at: Utc::now(),
            success: false,
            status_code: 0,
            response_time_ms: 0,
            error_message: String::new(),
            response_body: String::new(),
        }
    }

    /// Apply a grader verdict
    pub fn graded(mut self, verdict: Verdict) -> Self {
        self.success = verdict.success;
        self.status_code = verdict.status_code;
        self.response_time_ms = verdict.elapsed.as_millis() as u64;
        self.error_message = verdict.error_message;
        self.response_body = truncate_body(verdict.body);
        self
    }

    /// Mark the check as failed without a network call
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = error.into();
        self
    }
}

/// Cut `body` to [`MAX_BODY_BYTES`] on a char boundary
pub fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_BODY_BYTES {
        let mut end = MAX_BODY_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
