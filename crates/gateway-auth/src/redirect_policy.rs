//! Redirect-URI policy, applied symmetrically at dynamic registration and
//! at the authorize endpoint (spec 4.5).

use url::Url;

/// HTTPS is always allowed. HTTP is allowed only for localhost/127.0.0.1.
/// Custom schemes matching `^[a-zA-Z][a-zA-Z0-9+.-]*:$` are allowed (native
/// app deep links). Anything else — including plain HTTP to a non-loopback
/// host — is rejected.
pub fn is_allowed(redirect_uri: &str, extra_allowlist: &[String]) -> bool {
    if extra_allowlist.iter().any(|u| u == redirect_uri) {
        return true;
    }

    let Ok(url) = Url::parse(redirect_uri) else {
        return false;
    };

    match url.scheme() {
        "https" => true,
        "http" => matches!(url.host_str(), Some("localhost") | Some("127.0.0.1")),
        scheme => is_custom_scheme(scheme),
    }
}

fn is_custom_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_is_always_allowed() {
        assert!(is_allowed("https://example.com/cb", &[]));
    }

    #[test]
    fn http_localhost_is_allowed() {
        assert!(is_allowed("http://localhost:5173/cb", &[]));
        assert!(is_allowed("http://127.0.0.1:3000/cb", &[]));
    }

    #[test]
    fn http_non_loopback_is_rejected() {
        assert!(!is_allowed("http://example.com/cb", &[]));
    }

    #[test]
    fn custom_scheme_is_allowed() {
        assert!(is_allowed("myapp://cb", &[]));
    }

    #[test]
    fn malformed_uri_is_rejected() {
        assert!(!is_allowed("not a uri", &[]));
    }

    #[test]
    fn allowlist_entries_are_accepted_verbatim() {
        assert!(is_allowed("http://example.com/cb", &["http://example.com/cb".to_string()]));
    }
}
