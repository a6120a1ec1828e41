//! End-to-end admission and forwarding scenarios.

use axum::http::StatusCode;

mod common;

const SECRET: &str = "s3cret-token";

#[tokio::test]
async fn burst_exhaustion_returns_429_with_retry_after() {
    let origin = common::start_echo_origin().await;
    let mut config = common::base_config(&origin.url());
    config.auth.token = SECRET.into();
    config.rate_limit.requests_per_minute = 60;
    config.rate_limit.burst_size = 10;

    let (addr, shutdown) = common::start_gateway(config).await;
    let client = common::client();

    for i in 0..10 {
        let res = client
            .get(format!("http://{}/items", addr))
            .bearer_auth(SECRET)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "request {} should pass", i + 1);
    }

    let res = client
        .get(format!("http://{}/items", addr))
        .bearer_auth(SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "60");
    assert_eq!(origin.hits(), 10);

    shutdown.trigger();
}

#[tokio::test]
async fn repeated_bad_secrets_block_the_client() {
    let origin = common::start_echo_origin().await;
    let mut config = common::base_config(&origin.url());
    config.auth.token = SECRET.into();
    config.auth.max_attempts = 5;

    let (addr, shutdown) = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..5 {
        let res = client
            .get(format!("http://{}/", addr))
            .header("x-proxy-password", "guess")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers()["www-authenticate"], "Bearer realm=\"proxy\"");
    }

    let res = client
        .get(format!("http://{}/", addr))
        .header("x-proxy-password", SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(origin.hits(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn wrong_host_is_rejected_before_forwarding() {
    let origin = common::start_echo_origin().await;
    let mut config = common::base_config(&origin.url());
    config.request.allowed_host = "api.example.com".into();

    let (addr, shutdown) = common::start_gateway(config).await;

    let (status, _) = common::send_raw(
        addr,
        "GET /data HTTP/1.1\r\nHost: evil.example\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status, 400);

    let (status, _) = common::send_raw(
        addr,
        "GET /data HTTP/1.1\r\nHost: api.example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(origin.hits(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn raw_traversal_is_rejected_before_forwarding() {
    let origin = common::start_echo_origin().await;
    let config = common::base_config(&origin.url());
    let (addr, shutdown) = common::start_gateway(config).await;

    for target in ["/a/../../etc/passwd", "/static/%2e%2e/%2e%2e/secret", "/x/%252e%252e/y"] {
        let raw = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            target
        );
        let (status, _) = common::send_raw(addr, &raw).await;
        assert_eq!(status, 400, "{} should be rejected", target);
    }
    assert_eq!(origin.hits(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn disallowed_method_is_405() {
    let origin = common::start_echo_origin().await;
    let (addr, shutdown) = common::start_gateway(common::base_config(&origin.url())).await;

    let (status, _) = common::send_raw(
        addr,
        "TRACE / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status, 405);
    assert_eq!(origin.hits(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn credentials_never_reach_the_origin() {
    let origin = common::start_echo_origin().await;
    let mut config = common::base_config(&origin.url());
    config.auth.token = SECRET.into();

    let (addr, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/echo?q=1", addr))
        .bearer_auth(SECRET)
        .header("cookie", "session=abc")
        .header("x-proxy-password", "unused")
        .header("x-api-key", "key")
        .header("accept", "text/plain")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = res.text().await.unwrap().to_ascii_lowercase();
    assert!(seen.starts_with("get /echo?q=1 http/1.1"), "{}", seen);
    for leaked in ["authorization:", "cookie:", "x-proxy-password:", "x-api-key:", SECRET] {
        assert!(!seen.contains(leaked), "{} reached the origin:\n{}", leaked, seen);
    }
    assert!(seen.contains("accept: text/plain"));
    assert!(seen.contains("x-forwarded-for: 127.0.0.1"));
    assert!(seen.contains("x-real-ip: 127.0.0.1"));
    assert!(seen.contains("x-forwarded-proto: http"));
    assert!(seen.contains(&format!("x-forwarded-host: {}", addr)));
    assert!(seen.contains(&format!("host: {}", origin.addr)));
    assert!(seen.contains("x-request-id:"));

    shutdown.trigger();
}

#[tokio::test]
async fn responses_are_scrubbed_and_hardened() {
    let origin = common::start_echo_origin().await;
    let (addr, shutdown) = common::start_gateway(common::base_config(&origin.url())).await;

    let res = common::client()
        .get(format!("http://{}/page", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let headers = res.headers();
    assert!(!headers.contains_key("server"));
    assert!(!headers.contains_key("x-powered-by"));
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert!(headers.contains_key("permissions-policy"));
    assert!(!headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("x-request-id"));

    shutdown.trigger();
}

#[tokio::test]
async fn rejections_carry_security_headers_and_request_id() {
    let origin = common::start_echo_origin().await;
    let mut config = common::base_config(&origin.url());
    config.auth.token = SECRET.into();
    let (addr, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/", addr))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["x-request-id"], "trace-me-123");
    assert_eq!(res.headers()["x-frame-options"], "DENY");

    shutdown.trigger();
}
