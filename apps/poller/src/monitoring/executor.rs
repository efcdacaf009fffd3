use anyhow::Result;

use super::checker::{Checker, DnsChecker, HttpChecker, SslChecker, TcpChecker};
use super::types::{Assignment, CheckOutcome, CheckType};

/// Anything that can turn an assignment into a graded outcome
#[async_trait::async_trait]
pub trait CheckExecutor: Send + Sync {
    async fn execute_check(&self, assignment: &Assignment) -> CheckOutcome;
}

/// Monitoring executor - executes individual monitoring checks
pub struct MonitoringExecutor {
    http_checker: HttpChecker,
    dns_checker: DnsChecker,
    tcp_checker: TcpChecker,
    ssl_checker: SslChecker,
}

impl MonitoringExecutor {
    /// Create a new monitoring executor.
    ///
    /// `tls_insecure` only affects HTTP/API checks.
    pub fn new(tls_insecure: bool) -> Result<Self> {
        Ok(Self {
            http_checker: HttpChecker::new(tls_insecure),
            dns_checker: DnsChecker::new(),
            tcp_checker: TcpChecker,
            ssl_checker: SslChecker::new()?,
        })
    }

    fn checker(&self, check_type: CheckType) -> &dyn Checker {
        match check_type {
            CheckType::Http | CheckType::Api => &self.http_checker,
            CheckType::Dns => &self.dns_checker,
            CheckType::Tcp => &self.tcp_checker,
            CheckType::Ssl => &self.ssl_checker,
        }
    }
}

#[async_trait::async_trait]
impl CheckExecutor for MonitoringExecutor {
    /// Unknown monitor types fail immediately without a network call.
    async fn execute_check(&self, assignment: &Assignment) -> CheckOutcome {
        let outcome = CheckOutcome::new(assignment);

        let check_type = match assignment.check_type() {
            Ok(check_type) => check_type,
            Err(e) => return outcome.failure(e.to_string()),
        };

        let verdict = self.checker(check_type).check(assignment, assignment.timeout(check_type)).await;
        outcome.graded(verdict)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn test_unknown_type_fails_without_network() {
        let executor = MonitoringExecutor::new(false).unwrap();
        let assignment = Assignment {
            uuid: "x1".into(),
            monitor_type: "icmp".into(),
            url: "example.com".into(),
            location: "ams".into(),
            ..Assignment::default()
        };

        let outcome = executor.execute_check(&assignment).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_message, "unknown monitor type: icmp");
        assert_eq!(outcome.response_time_ms, 0);
        assert_eq!(outcome.monitor_id, "x1");
        assert_eq!(outcome.location, "ams");
    }

    #[tokio::test]
    async fn test_tcp_scenario_failing_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let executor = MonitoringExecutor::new(false).unwrap();
        let assignment = Assignment {
            uuid: "a1".into(),
            monitor_type: "tcp".into(),
            url: format!("127.0.0.1:{port}"),
            check_interval_seconds: 60,
            timeout_seconds: 3,
            ..Assignment::default()
        };

        let before = Utc::now();
        let outcome = executor.execute_check(&assignment).await;

        assert!(!outcome.success);
        assert!(!outcome.error_message.is_empty());
        assert!(outcome.checked_at >= before);
        assert!(outcome.response_time_ms <= 3_000);
    }
}
