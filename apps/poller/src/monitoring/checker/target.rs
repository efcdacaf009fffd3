//! Target string parsing shared by the DNS and TCP checkers.

const WEB_SCHEMES: [&str; 2] = ["http://", "https://"];
const TCP_SCHEMES: [&str; 3] = ["http://", "https://", "tcp://"];

fn strip_schemes<'a>(target: &'a str, schemes: &[&str]) -> &'a str {
    schemes.iter().fold(target, |rest, scheme| rest.strip_prefix(scheme).unwrap_or(rest))
}

fn strip_path(target: &str) -> &str {
    target.split_once('/').map_or(target, |(host, _)| host)
}

/// Bare hostname: scheme, path and port removed
pub fn bare_hostname(target: &str) -> &str {
    let host = strip_path(strip_schemes(target.trim(), &WEB_SCHEMES));
    host.split_once(':').map_or(host, |(host, _)| host)
}

/// Host and port for a TCP connect.
///
/// An explicit non-zero `port` wins over a trailing `:port` in the target.
/// Returns `None` when no port can be determined.
pub fn tcp_endpoint(target: &str, port: Option<u16>) -> Option<(String, u16)> {
    let host_port = strip_path(strip_schemes(target.trim(), &TCP_SCHEMES));

    let (host, embedded) = match host_port.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !port.is_empty() => match port.parse::<u16>() {
            Ok(port) => (host, Some(port)),
            Err(_) => (host_port, None),
        },
        _ => (host_port, None),
    };

    let port = port.filter(|p| *p != 0).or(embedded).filter(|p| *p != 0)?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_hostname() {
        assert_eq!(bare_hostname("example.com"), "example.com");
        assert_eq!(bare_hostname("https://example.com/health"), "example.com");
        assert_eq!(bare_hostname("http://example.com:8080/x"), "example.com");
        assert_eq!(bare_hostname("  mail.example.org "), "mail.example.org");
    }

    #[test]
    fn test_tcp_endpoint_from_target() {
        assert_eq!(tcp_endpoint("example.com:9999", None), Some(("example.com".into(), 9999)));
        assert_eq!(tcp_endpoint("tcp://db.internal:5432", None), Some(("db.internal".into(), 5432)));
        assert_eq!(tcp_endpoint("https://example.com:8443/path", None), Some(("example.com".into(), 8443)));
    }

    #[test]
    fn test_tcp_endpoint_explicit_port_wins() {
        assert_eq!(tcp_endpoint("example.com", Some(25)), Some(("example.com".into(), 25)));
        assert_eq!(tcp_endpoint("example.com:80", Some(443)), Some(("example.com".into(), 443)));
        assert_eq!(tcp_endpoint("example.com:80", Some(0)), Some(("example.com".into(), 80)));
    }

    #[test]
    fn test_tcp_endpoint_without_port() {
        assert_eq!(tcp_endpoint("example.com", None), None);
        assert_eq!(tcp_endpoint("example.com:", None), None);
        assert_eq!(tcp_endpoint("example.com:http", None), None);
        assert_eq!(tcp_endpoint(":80", None), None);
    }
}
