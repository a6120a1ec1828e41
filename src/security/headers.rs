//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip credential and session headers before they reach the origin
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host, X-Real-IP
//! - Strip origin fingerprinting headers from responses
//! - Provide the fixed security response headers
//!
//! # Design Decisions
//! - Preserve original client IP in X-Forwarded-For by appending to the chain
//! - Headers named by the Connection header are treated as hop-by-hop too
//! - The inbound Host is dropped; the client derives it from the origin URI

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::net::ClientIdentity;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// Headers meaningful only for a single transport hop.
pub static HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    HeaderName::from_static("trailers"),
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Credential and session headers never forwarded to the origin.
pub static SENSITIVE: [HeaderName; 11] = [
    header::AUTHORIZATION,
    header::COOKIE,
    header::SET_COOKIE,
    HeaderName::from_static("x-proxy-password"),
    HeaderName::from_static("x-api-key"),
    HeaderName::from_static("x-auth-token"),
    HeaderName::from_static("x-access-token"),
    HeaderName::from_static("x-secret-token"),
    HeaderName::from_static("api-key"),
    HeaderName::from_static("access-token"),
    HeaderName::from_static("auth-token"),
];

/// Response headers that reveal the origin's software.
static FINGERPRINT: [HeaderName; 2] = [header::SERVER, HeaderName::from_static("x-powered-by")];

/// Response headers every answer carries.
pub static SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        HeaderName::from_static("permissions-policy"),
        "camera=(), microphone=(), geolocation=(), interest-cohort=()",
    ),
];

/// Sent only from a TLS listener.
pub const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Facts about the inbound connection used to build forwarding headers.
#[derive(Debug, Clone)]
pub struct ForwardingContext {
    pub client: ClientIdentity,
    pub is_tls: bool,
    pub inbound_host: Option<HeaderValue>,
}

impl ForwardingContext {
    fn proto(&self) -> &'static str {
        if self.is_tls {
            "https"
        } else {
            "http"
        }
    }
}

/// Remove hop-by-hop headers, including any listed in Connection.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Apply the outbound policy in place: strip, then add forwarding context.
pub fn prepare_outbound(headers: &mut HeaderMap, ctx: &ForwardingContext) {
    strip_hop_by_hop(headers);
    for name in SENSITIVE.iter() {
        headers.remove(name);
    }
    headers.remove(header::HOST);

    let client_ip = ctx.client.as_str();
    // Repeated header lines form one chain, in order.
    let mut chain: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    chain.push(client_ip);
    let chain = chain.join(", ");
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(ctx.proto()));
    match &ctx.inbound_host {
        Some(host) => {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }
        None => {
            headers.remove(X_FORWARDED_HOST);
        }
    }
    if let Ok(value) = HeaderValue::from_str(client_ip) {
        headers.insert(X_REAL_IP, value);
    }
}

/// Apply the response policy in place.
pub fn sanitize_response(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    for name in FINGERPRINT.iter() {
        headers.remove(name);
    }
}

/// Copy of `headers` safe to log: credential values are replaced.
pub fn redacted(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if SENSITIVE.contains(name) || *name == header::PROXY_AUTHORIZATION {
                "[redacted]".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tls: bool) -> ForwardingContext {
        ForwardingContext {
            client: ClientIdentity::parse("198.51.100.4"),
            is_tls: tls,
            inbound_host: Some(HeaderValue::from_static("gateway.local")),
        }
    }

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("a=b"));
        headers.insert("x-proxy-password", HeaderValue::from_static("pw"));
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-custom-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-custom-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::TE, HeaderValue::from_static("trailers"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn outbound_strips_sensitive_and_hop_by_hop() {
        let mut headers = inbound();
        prepare_outbound(&mut headers, &ctx(false));

        for name in [
            "host",
            "authorization",
            "cookie",
            "set-cookie",
            "x-proxy-password",
            "x-api-key",
            "connection",
            "keep-alive",
            "x-custom-hop",
            "transfer-encoding",
            "upgrade",
            "te",
        ] {
            assert!(!headers.contains_key(name), "{} leaked", name);
        }
        assert_eq!(headers[header::ACCEPT], "application/json");
    }

    #[test]
    fn outbound_sets_forwarding_context() {
        let mut headers = inbound();
        prepare_outbound(&mut headers, &ctx(true));

        assert_eq!(headers[&X_FORWARDED_FOR], "198.51.100.4");
        assert_eq!(headers[&X_FORWARDED_PROTO], "https");
        assert_eq!(headers[&X_FORWARDED_HOST], "gateway.local");
        assert_eq!(headers[&X_REAL_IP], "198.51.100.4");
    }

    #[test]
    fn forwarded_for_chain_is_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        prepare_outbound(&mut headers, &ctx(false));
        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2, 198.51.100.4");
        assert_eq!(headers[&X_FORWARDED_PROTO], "http");
    }

    #[test]
    fn repeated_forwarded_for_lines_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("1.1.1.1"));
        headers.append(X_FORWARDED_FOR, HeaderValue::from_static("2.2.2.2, 3.3.3.3"));
        prepare_outbound(&mut headers, &ctx(false));

        let values: Vec<_> = headers.get_all(&X_FORWARDED_FOR).iter().collect();
        assert_eq!(values, vec!["1.1.1.1, 2.2.2.2, 3.3.3.3, 198.51.100.4"]);
    }

    #[test]
    fn response_strips_fingerprints_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::SERVER, HeaderValue::from_static("nginx/1.2"));
        headers.insert("x-powered-by", HeaderValue::from_static("PHP"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("a=b"));

        sanitize_response(&mut headers);

        assert!(!headers.contains_key(header::SERVER));
        assert!(!headers.contains_key("x-powered-by"));
        assert!(!headers.contains_key(header::CONNECTION));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
        // Origin cookies pass through to the client.
        assert_eq!(headers[header::SET_COOKIE], "a=b");
    }

    #[test]
    fn redaction_hides_credentials() {
        let rendered = redacted(&inbound());
        let auth = rendered.iter().find(|(n, _)| n == "authorization").unwrap();
        assert_eq!(auth.1, "[redacted]");
        let accept = rendered.iter().find(|(n, _)| n == "accept").unwrap();
        assert_eq!(accept.1, "application/json");
        assert!(rendered.iter().all(|(_, v)| v != "pw"));
    }
}
