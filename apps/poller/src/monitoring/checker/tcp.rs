use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::target::tcp_endpoint;
use super::{Checker, Verdict};
use crate::monitoring::types::Assignment;

/// TCP port checker. Success means the connection was established.
pub struct TcpChecker;

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, assignment: &Assignment, timeout_duration: Duration) -> Verdict {
        let Some((host, port)) = tcp_endpoint(&assignment.url, assignment.tcp_port) else {
            return Verdict::fail("TCP port not specified");
        };
        let address = format!("{host}:{port}");

        let start = Instant::now();
        let connect = timeout(timeout_duration, TcpStream::connect(&address)).await;
        let elapsed = start.elapsed();

        let verdict = match connect {
            Ok(Ok(_stream)) => Verdict::pass(200).with_body(format!("Successfully connected to {address}")),
            Ok(Err(e)) => Verdict::fail(format!("TCP connection failed: {e}")),
            Err(_) => Verdict::fail(format!(
                "TCP connection failed: timed out after {}s",
                timeout_duration.as_secs()
            )),
        };

        verdict.with_elapsed(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn assignment(url: String, tcp_port: Option<u16>) -> Assignment {
        Assignment {
            uuid: "t1".into(),
            monitor_type: "tcp".into(),
            url,
            tcp_port,
            ..Assignment::default()
        }
    }

    #[tokio::test]
    async fn test_tcp_check_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let verdict = TcpChecker
            .check(&assignment("tcp://127.0.0.1".into(), Some(port)), Duration::from_secs(5))
            .await;

        assert!(verdict.success, "{verdict:?}");
        assert_eq!(verdict.status_code, 200);
        assert_eq!(verdict.body, format!("Successfully connected to 127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn test_tcp_check_refused_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let timeout = Duration::from_secs(5);
        let started = Instant::now();
        let verdict = TcpChecker.check(&assignment(format!("127.0.0.1:{port}"), None), timeout).await;

        assert!(!verdict.success);
        assert!(verdict.error_message.starts_with("TCP connection failed"));
        assert!(started.elapsed() <= timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tcp_check_requires_port() {
        let verdict = TcpChecker.check(&assignment("example.com".into(), None), Duration::from_secs(1)).await;

        assert!(!verdict.success);
        assert_eq!(verdict.error_message, "TCP port not specified");
        assert_eq!(verdict.elapsed, Duration::ZERO);
    }
}
