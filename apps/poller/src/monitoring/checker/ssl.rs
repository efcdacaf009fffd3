use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::Url;

use super::{Checker, Verdict};
use crate::monitoring::types::Assignment;

const DEFAULT_TLS_PORT: u16 = 443;

/// TLS certificate expiry checker.
///
/// Always verifies the chain against the platform roots, independent of the
/// HTTP checker's insecure mode.
pub struct SslChecker {
    connector: TlsConnector,
}

impl SslChecker {
    pub fn new() -> Result<Self, rustls::Error> {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(%error, "Failed to load a native root certificate");
        }

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!(added, ignored, "Loaded native root certificates");

        Self::with_roots(roots)
    }

    pub fn with_roots(roots: RootCertStore) -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)) })
    }
}

#[async_trait::async_trait]
impl Checker for SslChecker {
    async fn check(&self, assignment: &Assignment, timeout_duration: Duration) -> Verdict {
        let url = match Url::parse(&assignment.url) {
            Ok(url) => url,
            Err(e) => return Verdict::fail(format!("failed to parse URL: {e}")),
        };

        if url.scheme() != "https" {
            return Verdict::fail("URL is not HTTPS");
        }

        let Some(host) = url.host_str().map(|h| h.trim_start_matches('[').trim_end_matches(']')) else {
            return Verdict::fail("URL has no host");
        };
        let port = url.port().unwrap_or(DEFAULT_TLS_PORT);

        let server_name = match ServerName::try_from(host.to_string()) {
            Ok(name) => name,
            Err(e) => return Verdict::fail(format!("invalid server name {host}: {e}")),
        };

        let start = Instant::now();
        let handshake = timeout(timeout_duration, async {
            let tcp = TcpStream::connect((host, port)).await?;
            self.connector.connect(server_name, tcp).await
        })
        .await;
        let elapsed = start.elapsed();

        let stream = match handshake {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Verdict::fail(format!("TLS connection failed: {e}")).with_elapsed(elapsed),
            Err(_) => {
                return Verdict::fail(format!(
                    "TLS connection failed: timed out after {}s",
                    timeout_duration.as_secs()
                ))
                .with_elapsed(elapsed);
            }
        };

        let (_, connection) = stream.get_ref();
        let Some(leaf) = connection.peer_certificates().and_then(|certs| certs.first()) else {
            return Verdict::fail("no certificates found").with_elapsed(elapsed);
        };

        match CertificateSummary::parse(leaf.as_ref()) {
            Ok(summary) => {
                grade_certificate(&summary, Utc::now(), assignment.ssl_alert_days()).with_elapsed(elapsed)
            }
            Err(e) => Verdict::fail(format!("failed to parse certificate: {e}")).with_elapsed(elapsed),
        }
    }
}

/// The parts of the leaf certificate the grade depends on
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CertificateSummary {
    pub not_after: DateTime<Utc>,
    pub issuer: String,
}

impl CertificateSummary {
    fn parse(der: &[u8]) -> Result<Self, String> {
        let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| e.to_string())?;
        let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| "certificate expiry out of range".to_string())?;

        Ok(Self { not_after, issuer: cert.issuer().to_string() })
    }
}

/// Pass while more than `alert_days` whole days remain.
///
/// The body carries days remaining, expiry date and issuer either way.
pub(crate) fn grade_certificate(cert: &CertificateSummary, now: DateTime<Utc>, alert_days: i64) -> Verdict {
    let days_remaining = (cert.not_after - now).num_days();
    let body = format!(
        "SSL cert expires in {days_remaining} days (on {}), issuer: {}",
        cert.not_after.format("%Y-%m-%d"),
        cert.issuer
    );

    if days_remaining <= alert_days {
        return Verdict::fail(format!(
            "SSL certificate expires in {days_remaining} days (threshold: {alert_days} days)"
        ))
        .with_status(200)
        .with_body(body);
    }

    Verdict::pass(200).with_body(body)
}
