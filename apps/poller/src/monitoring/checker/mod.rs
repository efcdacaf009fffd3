//! Protocol checkers and the verdict they produce.
//!
//! Each checker performs one network operation for an [`Assignment`] and
//! grades the raw result into a [`Verdict`]. Checkers never return errors:
//! transport failures, timeouts and policy mismatches are all failed verdicts.

mod dns;
mod http;
mod ssl;
mod target;
mod tcp;

use std::time::Duration;

pub use dns::DnsChecker;
pub use http::HttpChecker;
pub use ssl::SslChecker;
pub use tcp::TcpChecker;

use super::types::Assignment;

/// Checker trait for different types of monitoring checks
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the check, bounded by `timeout`
    async fn check(&self, assignment: &Assignment, timeout: Duration) -> Verdict;
}

/// Graded result of a single network operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub success: bool,
    pub status_code: u16,
    /// Network portion only
    pub elapsed: Duration,
    pub error_message: String,
    pub body: String,
}

impl Verdict {
    pub fn pass(status_code: u16) -> Self {
        Self { success: true, status_code, ..Self::default() }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, error_message: error.into(), ..Self::default() }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}
