use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Response};
use tracing::debug;

use super::{Checker, Verdict};
use crate::USER_AGENT;
use crate::monitoring::types::{Assignment, MAX_BODY_BYTES};

const MAX_REDIRECTS: usize = 10;

/// HTTP/API checker
pub struct HttpChecker {
    tls_insecure: bool,
}

impl HttpChecker {
    pub fn new(tls_insecure: bool) -> Self {
        Self { tls_insecure }
    }

    fn client(&self, timeout: Duration) -> reqwest::Result<Client> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(self.tls_insecure)
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, assignment: &Assignment, timeout: Duration) -> Verdict {
        let client = match self.client(timeout) {
            Ok(client) => client,
            Err(e) => return Verdict::fail(format!("failed to create client: {e}")),
        };

        let method = match Method::from_bytes(assignment.method().to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(e) => return Verdict::fail(format!("failed to create request: {e}")),
        };

        let headers = match request_headers(assignment) {
            Ok(headers) => headers,
            Err(e) => return Verdict::fail(format!("failed to create request: {e}")),
        };

        let mut builder = client.request(method, &assignment.url).headers(headers);
        if let Some(body) = assignment.request_body.as_ref().filter(|b| !b.is_empty()) {
            builder = builder.body(body.clone());
        }

        let request = match builder.build() {
            Ok(request) => request,
            Err(e) => return Verdict::fail(format!("failed to create request: {e}")),
        };

        let start = Instant::now();
        let response = client.execute(request).await;
        let elapsed = start.elapsed();

        let response = match response {
            Ok(response) => response,
            Err(e) => return Verdict::fail(format!("request failed: {e}")).with_elapsed(elapsed),
        };

        let status = response.status().as_u16();
        let body = read_capped(response, MAX_BODY_BYTES).await;

        grade_response(assignment, status, body).with_elapsed(elapsed)
    }
}

/// Caller headers plus auth. Auth replaces any caller-supplied Authorization.
fn request_headers(assignment: &Assignment) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();

    for (key, value) in assignment.headers.iter().flatten() {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| format!("header {key}: {e}"))?;
        let value = HeaderValue::from_str(value).map_err(|e| format!("header {key}: {e}"))?;
        headers.insert(name, value);
    }

    let authorization = match assignment.auth.as_ref() {
        Some(auth) if auth.kind == "basic" => {
            let credentials = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
            Some(format!("Basic {credentials}"))
        }
        Some(auth) if auth.kind == "bearer" => Some(format!("Bearer {}", auth.token)),
        _ => None,
    };

    if let Some(authorization) = authorization {
        let mut value =
            HeaderValue::from_str(&authorization).map_err(|e| format!("authorization: {e}"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Read at most `limit` bytes of the body. A read error keeps what arrived.
async fn read_capped(mut response: Response, limit: usize) -> String {
    let mut buf = Vec::new();

    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Response body read interrupted");
                break;
            }
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

/// Status must match the expected code, then the body must contain the
/// expected substring if one is configured.
pub(crate) fn grade_response(assignment: &Assignment, status: u16, body: String) -> Verdict {
    let expected = assignment.expected_status();

    if status != expected {
        return Verdict::fail(format!("unexpected status code: got {status}, expected {expected}"))
            .with_status(status)
            .with_body(body);
    }

    if let Some(needle) = assignment.expected_substring()
        && !body.contains(needle)
    {
        return Verdict::fail(format!("response does not contain expected string: {needle}"))
            .with_status(status)
            .with_body(body);
    }

    Verdict::pass(status).with_body(body)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    use super::*;
    use crate::monitoring::types::MonitorAuth;

    /// Read up to the end of the request head
    async fn read_head(socket: &mut TcpStream) -> String {
        let mut buf = vec![0u8; 8192];
        let mut read = 0;
        while read < buf.len() {
            let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
            read += n;
            if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        String::from_utf8_lossy(&buf[..read]).into_owned()
    }

    async fn reply(mut socket: TcpStream, response: &str) {
        let _ = socket.write_all(response.as_bytes()).await;
        socket.shutdown().await.ok();
        // wait for the client to hang up so unread bytes never trigger a reset
        let _ = socket.read_to_end(&mut Vec::new()).await;
    }

    /// Serve one canned response and hand back the raw request head.
    async fn serve_once(response: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = tx.send(read_head(&mut socket).await);
            reply(socket, &response).await;
        });

        (format!("http://{addr}/health"), rx)
    }

    /// `/hop/{n}` redirects to `/hop/{n+1}` until `n` reaches `land_at`,
    /// forever when it is `None`. Returns the start URL and a request count.
    async fn serve_redirects(land_at: Option<usize>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let counter = counter.clone();
                tokio::spawn(async move {
                    let head = read_head(&mut socket).await;
                    counter.fetch_add(1, Ordering::SeqCst);

                    let hop: usize = head
                        .split_whitespace()
                        .nth(1)
                        .and_then(|path| path.strip_prefix("/hop/"))
                        .and_then(|n| n.parse().ok())
                        .unwrap_or(0);
                    let response = if land_at.is_some_and(|last| hop >= last) {
                        response("200 OK", "landed")
                    } else {
                        format!(
                            "HTTP/1.1 302 Found\r\nLocation: /hop/{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            hop + 1
                        )
                    };
                    reply(socket, &response).await;
                });
            }
        });

        (format!("http://{addr}/hop/0"), hits)
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn assignment(url: String) -> Assignment {
        Assignment {
            uuid: "m1".into(),
            monitor_type: "http".into(),
            url,
            ..Assignment::default()
        }
    }

    #[tokio::test]
    async fn test_http_check_passes_on_expected_status() {
        let (url, head) = serve_once(response("200 OK", "all good")).await;
        let verdict = HttpChecker::new(false).check(&assignment(url), Duration::from_secs(5)).await;

        assert!(verdict.success, "{verdict:?}");
        assert_eq!(verdict.status_code, 200);
        assert_eq!(verdict.body, "all good");
        assert!(verdict.error_message.is_empty());

        let head = head.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /health"));
        assert!(head.contains("user-agent: alertpriority-poller/1.0"));
    }

    #[tokio::test]
    async fn test_http_check_caller_headers_and_bearer_auth() {
        let (url, head) = serve_once(response("204 No Content", "")).await;
        let mut assignment = assignment(url);
        assignment.http_method = "post".into();
        assignment.request_body = Some("{}".into());
        assignment.expected_status_code = 204;
        assignment.headers = Some(HashMap::from([
            ("User-Agent".to_string(), "custom-agent".to_string()),
            ("Authorization".to_string(), "overridden".to_string()),
        ]));
        assignment.auth = Some(MonitorAuth {
            kind: "bearer".into(),
            token: "secret".into(),
            ..MonitorAuth::default()
        });

        let verdict = HttpChecker::new(false).check(&assignment, Duration::from_secs(5)).await;
        assert!(verdict.success, "{verdict:?}");

        let head = head.await.unwrap().to_lowercase();
        assert!(head.starts_with("post /health"));
        assert!(head.contains("user-agent: custom-agent"));
        assert!(head.contains("authorization: bearer secret"));
        assert!(!head.contains("overridden"));
    }

    #[tokio::test]
    async fn test_http_check_fails_on_status_mismatch() {
        let (url, _head) = serve_once(response("503 Service Unavailable", "down")).await;
        let verdict = HttpChecker::new(false).check(&assignment(url), Duration::from_secs(5)).await;

        assert!(!verdict.success);
        assert_eq!(verdict.status_code, 503);
        assert_eq!(verdict.error_message, "unexpected status code: got 503, expected 200");
        assert_eq!(verdict.body, "down");
    }

    #[tokio::test]
    async fn test_http_check_body_is_capped() {
        let big = "x".repeat(MAX_BODY_BYTES * 2);
        let (url, _head) = serve_once(response("200 OK", &big)).await;
        let verdict = HttpChecker::new(false).check(&assignment(url), Duration::from_secs(5)).await;

        assert!(verdict.success);
        assert_eq!(verdict.body.len(), MAX_BODY_BYTES);
    }

    #[tokio::test]
    async fn test_http_check_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let verdict = HttpChecker::new(false)
            .check(&assignment(format!("http://{addr}/")), Duration::from_secs(5))
            .await;

        assert!(!verdict.success);
        assert!(verdict.error_message.starts_with("request failed:"));
        assert_eq!(verdict.status_code, 0);
    }

    #[tokio::test]
    async fn test_http_check_follows_short_redirect_chain() {
        let (url, hits) = serve_redirects(Some(3)).await;
        let verdict = HttpChecker::new(false).check(&assignment(url), Duration::from_secs(5)).await;

        assert!(verdict.success, "{verdict:?}");
        assert_eq!(verdict.status_code, 200);
        assert_eq!(verdict.body, "landed");
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_http_check_fails_on_endless_redirects() {
        let (url, hits) = serve_redirects(None).await;
        let verdict = HttpChecker::new(false).check(&assignment(url), Duration::from_secs(5)).await;

        assert!(!verdict.success);
        assert_eq!(verdict.status_code, 0);
        assert!(verdict.error_message.starts_with("request failed:"), "{verdict:?}");

        let hits = hits.load(Ordering::SeqCst);
        assert!((MAX_REDIRECTS..=MAX_REDIRECTS + 1).contains(&hits), "{hits} requests");
    }

    #[tokio::test]
    async fn test_http_check_times_out_on_stalled_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_head(&mut socket).await;
            // never answer
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let started = std::time::Instant::now();
        let verdict = HttpChecker::new(false)
            .check(&assignment(format!("http://{addr}/slow")), Duration::from_millis(300))
            .await;

        assert!(!verdict.success);
        assert_eq!(verdict.status_code, 0);
        assert!(verdict.error_message.starts_with("request failed:"), "{verdict:?}");
        assert!(verdict.elapsed >= Duration::from_millis(250));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_http_check_invalid_url() {
        let verdict = HttpChecker::new(false)
            .check(&assignment("not a url".into()), Duration::from_secs(5))
            .await;

        assert!(!verdict.success);
        assert!(verdict.error_message.starts_with("failed to create request:"));
    }

    #[test]
    fn test_grade_response_expected_substring() {
        let mut assignment = assignment("http://example.com".into());
        assignment.expected_response_contains = Some("healthy".into());

        let verdict = grade_response(&assignment, 200, "status: healthy".into());
        assert!(verdict.success);

        let verdict = grade_response(&assignment, 200, "status: degraded".into());
        assert!(!verdict.success);
        assert_eq!(verdict.error_message, "response does not contain expected string: healthy");
    }

    #[test]
    fn test_basic_auth_header() {
        let mut assignment = assignment("http://example.com".into());
        assignment.auth = Some(MonitorAuth {
            kind: "basic".into(),
            username: "user".into(),
            password: "pass".into(),
            ..MonitorAuth::default()
        });

        let headers = request_headers(&assignment).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic dXNlcjpwYXNz");
    }
}
