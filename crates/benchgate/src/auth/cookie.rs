//! Session cookie construction and parsing.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;

/// Session cookie name.
pub const COOKIE_NAME: &str = "key";

/// Max-Age attribute value.
pub const COOKIE_MAX_AGE: u64 = 600000;

/// Derive the Domain attribute from the request host and the configured
/// proxy domains: drop the port, collapse to a matching proxy domain so
/// the cookie covers its subdomains, and omit the attribute for bare
/// localhost (browsers refuse it).
pub fn cookie_domain(host: &str, proxy_domains: &[String]) -> Option<String> {
    let mut domain = match host.rfind(':') {
        Some(idx) => &host[..idx],
        None => host,
    };
    for proxy in proxy_domains {
        if domain.ends_with(proxy.as_str()) {
            domain = proxy;
        }
    }
    if domain == "localhost" {
        return None;
    }
    Some(domain.to_string())
}

/// Build the Set-Cookie header value for an accepted login.
pub fn session_cookie(value: &str, domain: Option<&str>, path: &str) -> String {
    let mut cookie = format!("{COOKIE_NAME}={value}; Max-Age={COOKIE_MAX_AGE}; Path={path}; SameSite=Lax");
    if let Some(domain) = domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// Extract a cookie value from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for pair in header.split(';') {
            let pair = pair.trim();
            if let Some((key, value)) = pair.split_once('=')
                && key == name
            {
                return Some(value.to_string());
            }
        }
    }
    None
}
