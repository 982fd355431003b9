use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// Outbound fetches are gated by [`validate_url`] unless the client was built
/// with private networks allowed, so a feed or page URL supplied by a user
/// cannot be used to probe internal hosts.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Parses a URL and checks that it is an http(s) URL.
///
/// When `allow_private` is false, localhost, loopback, RFC 1918, link-local
/// and unique-local addresses are rejected as well.
///
/// # Errors
///
/// Returns [`UrlValidationError`] describing the first failed check.
pub fn validate_url(url_str: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if allow_private {
        return Ok(url);
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = bare.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if v6.is_unspecified() {
                return true;
            }
            let first = v6.segments()[0];
            // fc00::/7 and fe80::/10
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Resolves `input` against `base`.
///
/// Absolute URLs are returned untouched (no normalization), protocol-relative
/// URLs inherit the base scheme, everything else goes through [`Url::join`].
/// Returns `None` for empty input or when no absolute URL can be produced.
pub fn absolute_url(base: &str, input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if is_absolute_url(input) {
        return Some(input.to_string());
    }

    let base = Url::parse(base.trim()).ok()?;

    if let Some(rest) = input.strip_prefix("//") {
        return Some(format!("{}://{}", base.scheme(), rest));
    }

    base.join(input).ok().map(|u| u.to_string())
}

/// True when `input` parses as an absolute URL with a host.
pub fn is_absolute_url(input: &str) -> bool {
    Url::parse(input)
        .map(|u| u.has_host() || u.scheme() == "mailto")
        .unwrap_or(false)
}

/// Host portion of a URL, or the input itself when it does not parse.
///
/// Domain rule tables match against this value by substring.
pub fn domain(input: &str) -> String {
    match Url::parse(input) {
        Ok(u) => u.host_str().unwrap_or(input).to_string(),
        Err(_) => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/feed.xml", false).is_ok());
        assert!(validate_url("http://news.example.org", false).is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(validate_url("file:///etc/passwd", false).is_err());
        assert!(validate_url("ftp://example.com", true).is_err());
    }

    #[test]
    fn test_localhost_rejected_unless_allowed() {
        assert!(matches!(
            validate_url("http://localhost/feed", false),
            Err(UrlValidationError::Localhost)
        ));
        assert!(validate_url("http://127.0.0.1/feed", false).is_err());
        assert!(validate_url("http://127.0.0.1:8080/feed", true).is_ok());
    }

    #[test]
    fn test_private_ips_rejected() {
        assert!(validate_url("http://192.168.1.1/feed", false).is_err());
        assert!(validate_url("http://10.0.0.1:3000/feed", false).is_err());
        assert!(validate_url("http://[fe80::1]/feed", false).is_err());
        assert!(validate_url("http://[::1]/feed", false).is_err());
        assert!(validate_url("http://0.0.0.0/feed", false).is_err());
    }

    #[test]
    fn test_absolute_url_keeps_absolute_input() {
        assert_eq!(
            absolute_url("http://example.org/", "http://example.org/a&b").as_deref(),
            Some("http://example.org/a&b")
        );
    }

    #[test]
    fn test_absolute_url_relative_and_protocol_relative() {
        assert_eq!(
            absolute_url("http://example.org/", "something.html").as_deref(),
            Some("http://example.org/something.html")
        );
        assert_eq!(
            absolute_url("https://example.org/blog/", "/feed.xml").as_deref(),
            Some("https://example.org/feed.xml")
        );
        assert_eq!(
            absolute_url("https://example.org/", "//cdn.example.org/a.mp3").as_deref(),
            Some("https://cdn.example.org/a.mp3")
        );
    }

    #[test]
    fn test_absolute_url_without_usable_base() {
        assert_eq!(absolute_url("", "feed.xml"), None);
        assert_eq!(absolute_url("http://example.org/", "   "), None);
    }

    #[test]
    fn test_domain() {
        assert_eq!(domain("https://www.youtube.com/watch?v=1"), "www.youtube.com");
        assert_eq!(domain("not a url"), "not a url");
    }
}
