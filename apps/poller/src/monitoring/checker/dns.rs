use std::time::{Duration, Instant};

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveError;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::system_conf::read_system_conf;
use tracing::warn;

use super::target::bare_hostname;
use super::{Checker, Verdict};
use crate::monitoring::types::Assignment;

/// DNS record checker
pub struct DnsChecker {
    config: ResolverConfig,
    opts: ResolverOpts,
}

impl DnsChecker {
    /// Use the host resolver configuration, or public defaults when it can't be read
    pub fn new() -> Self {
        let (config, opts) = read_system_conf().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read system resolver config, using defaults");
            (ResolverConfig::default(), ResolverOpts::default())
        });
        Self::with_config(config, opts)
    }

    pub fn with_config(config: ResolverConfig, mut opts: ResolverOpts) -> Self {
        // every check must hit the network
        opts.cache_size = 0;
        Self { config, opts }
    }

    fn resolver(&self, timeout: Duration) -> TokioAsyncResolver {
        let mut opts = self.opts.clone();
        opts.timeout = timeout;
        TokioAsyncResolver::tokio(self.config.clone(), opts)
    }
}

impl Default for DnsChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Checker for DnsChecker {
    async fn check(&self, assignment: &Assignment, timeout: Duration) -> Verdict {
        let hostname = bare_hostname(&assignment.url);
        if hostname.is_empty() {
            return Verdict::fail("DNS lookup failed: empty hostname");
        }

        let resolver = self.resolver(timeout);

        let start = Instant::now();
        let lookup =
            tokio::time::timeout(timeout, resolve(&resolver, hostname, assignment.record_type())).await;
        let elapsed = start.elapsed();

        let resolved = match lookup {
            Ok(Ok(resolved)) => resolved,
            Ok(Err(e)) => return Verdict::fail(format!("DNS lookup failed: {e}")).with_elapsed(elapsed),
            Err(_) => {
                return Verdict::fail(format!(
                    "DNS lookup failed: timed out after {}s",
                    timeout.as_secs()
                ))
                .with_elapsed(elapsed);
            }
        };

        grade_records(&resolved, assignment.expected_dns_host()).with_elapsed(elapsed)
    }
}

/// Look up `hostname` for the given record type.
///
/// `A`, `AAAA` and anything unrecognised do a plain host lookup.
async fn resolve(
    resolver: &TokioAsyncResolver,
    hostname: &str,
    record_type: &str,
) -> Result<Vec<String>, ResolveError> {
    let values = match record_type.to_uppercase().as_str() {
        "CNAME" => resolver
            .lookup(hostname, RecordType::CNAME)
            .await?
            .iter()
            .map(|rdata| rdata.to_string())
            .collect(),
        "MX" => resolver
            .mx_lookup(hostname)
            .await?
            .iter()
            .map(|mx| mx.exchange().to_string())
            .collect(),
        "TXT" => resolver.txt_lookup(hostname).await?.iter().map(|txt| txt.to_string()).collect(),
        "NS" => resolver.ns_lookup(hostname).await?.iter().map(|ns| ns.to_string()).collect(),
        _ => resolver.lookup_ip(hostname).await?.iter().map(|ip| ip.to_string()).collect(),
    };
    Ok(values)
}

/// At least one record, and one containing `expected` if set
pub(crate) fn grade_records(resolved: &[String], expected: Option<&str>) -> Verdict {
    if resolved.is_empty() {
        return Verdict::fail("DNS lookup returned no results");
    }

    let body = resolved.join(", ");

    if let Some(expected) = expected
        && !resolved.iter().any(|value| value.contains(expected))
    {
        return Verdict::fail(format!("expected DNS host {expected} not found in results")).with_body(body);
    }

    Verdict::pass(200).with_body(body)
}
