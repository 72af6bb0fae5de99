//! End-to-end behavior of the assembled router.

use axum::body::Body;
use axum::http::{Method, StatusCode};

use scorebook_shield::config::{Secret, ShieldConfig};
use scorebook_shield::observability::Severity;

mod common;
use common::{body_string, event_json, request, TestApp, NOW, SECRET, WEBHOOK};

#[tokio::test]
async fn test_recon_sequence_blocks_on_twentieth_not_found() {
    let app = TestApp::new();
    let client = "198.51.100.7";

    for i in 1..=25 {
        // Six seconds apart: the whole run fits in the 5-minute window.
        let response = app.get(&format!("/missing-{i}"), client).await;
        let expected = if i <= 20 {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };
        assert_eq!(response.status(), expected, "request {i}");
        app.clock.advance(6);
    }

    assert!(app.shield.registry().is_blocked(client));
    assert_eq!(app.sink.count(Severity::High), 1);

    // Other clients are unaffected.
    let response = app.get("/missing", "198.51.100.8").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_block_expires_with_clock() {
    let app = TestApp::new();
    let client = "198.51.100.9";
    for i in 0..20 {
        app.get(&format!("/probe-{i}"), client).await;
    }
    assert_eq!(app.get("/health", client).await.status(), StatusCode::OK);
    assert_eq!(
        app.get("/login", client).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    app.clock.advance(900);
    assert_eq!(app.get("/login", client).await.status(), StatusCode::OK);
    assert!(!app.shield.registry().is_blocked(client));
}

#[tokio::test]
async fn test_signatures_match_case_and_query_insensitively() {
    let app = TestApp::new();
    for path in ["/.env", "/.ENV?x=1", "/.git/config", "/backup.SQL", "/wp-login.php?redirect=1"] {
        let response = app.get(path, "192.0.2.1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
    assert!(app.sink.count(Severity::Notice) >= 5);
}

#[tokio::test]
async fn test_rejections_are_uniform() {
    let app = TestApp::new();
    let by_rule = body_string(app.get("/.env", "192.0.2.2").await).await;
    let by_route = body_string(app.get("/no-such-page", "192.0.2.2").await).await;
    assert_eq!(by_rule, by_route);

    let api_rule = app.get("/api/.git/HEAD", "192.0.2.2").await;
    assert_eq!(
        api_rule.headers()["content-type"],
        "application/json"
    );
    let api_body = body_string(api_rule).await;
    let api_route = body_string(app.get("/api/nothing", "192.0.2.2").await).await;
    assert_eq!(api_body, api_route);
    assert_eq!(api_body, r#"{"error":"not_found"}"#);
}

#[tokio::test]
async fn test_allowlisted_paths_never_blocked() {
    let app = TestApp::new();
    let client = "192.0.2.3";
    app.shield.registry().block(client, 600);

    assert_eq!(app.get("/health", client).await.status(), StatusCode::OK);
    assert_eq!(app.get("/robots.txt", client).await.status(), StatusCode::OK);
    assert_eq!(
        app.get("/favicon.ico", client).await.status(),
        StatusCode::NO_CONTENT
    );

    // A blocked client can still deliver webhooks.
    let response = app.deliver(&event_json("evt_allow", "invoice.paid"), client).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_hidden_static_files_rejected() {
    let app = TestApp::new();
    let response = app.get("/static/css/.secret", "192.0.2.4").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let (_, record) = app.sink.records().pop().unwrap();
    assert_eq!(record.reason, "hidden_static_file");
}

#[tokio::test]
async fn test_webhook_without_secret_is_500_and_never_applies() {
    let app = TestApp::with_config(ShieldConfig::default());
    let response = app.deliver(&event_json("evt_1", "invoice.paid"), "203.0.113.1").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.spy.calls(), 0);

    let body = body_string(response).await;
    assert!(!body.contains("secret"));
}

#[tokio::test]
async fn test_webhook_with_empty_secret_fails_closed() {
    let mut config = ShieldConfig::default();
    config.webhook.secret = Some(Secret::new(""));
    let app = TestApp::with_config(config);
    let response = app.deliver(&event_json("evt_1", "invoice.paid"), "203.0.113.1").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_webhook_invalid_signature_is_400_and_never_applies() {
    let app = TestApp::new();
    let body = event_json("evt_2", "invoice.paid");
    let forged = scorebook_shield::payments::signature::sign("whsec_attacker", NOW, body.as_bytes()).unwrap();

    let response = app
        .send(
            request(Method::POST, WEBHOOK, "203.0.113.2")
                .header("stripe-signature", forged)
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unsigned = app
        .send(
            request(Method::POST, WEBHOOK, "203.0.113.2")
                .body(Body::from(event_json("evt_3", "invoice.paid")))
                .unwrap(),
        )
        .await;
    assert_eq!(unsigned.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_delivery_applies_once() {
    let app = TestApp::new();
    let body = event_json("evt_dup", "customer.subscription.updated");

    let first = app.deliver(&body, "203.0.113.3").await;
    let second = app.deliver(&body, "203.0.113.3").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(app.spy.calls(), 1);
    assert!(body_string(second).await.contains("duplicate"));
}

#[tokio::test]
async fn test_concurrent_duplicates_apply_once() {
    let app = TestApp::new();
    let body = event_json("evt_race", "customer.subscription.updated");

    let deliveries = (0..8).map(|_| app.deliver(&body, "203.0.113.4"));
    let responses = futures_util::future::join_all(deliveries).await;
    assert!(responses.iter().all(|r| r.status() == StatusCode::OK));
    assert_eq!(app.spy.calls(), 1);
}

#[tokio::test]
async fn test_evicted_event_is_no_longer_a_duplicate() {
    let mut config = ShieldConfig::default();
    config.webhook.secret = Some(Secret::new(SECRET));
    config.webhook.idempotency_capacity = 2;
    let app = TestApp::with_config(config);

    for id in ["evt_a", "evt_b", "evt_c"] {
        app.deliver(&event_json(id, "invoice.paid"), "203.0.113.5").await;
    }
    assert_eq!(app.spy.calls(), 3);

    // evt_a was evicted when evt_c arrived.
    app.deliver(&event_json("evt_a", "invoice.paid"), "203.0.113.5").await;
    assert_eq!(app.spy.calls(), 4);

    // evt_c is still remembered.
    app.deliver(&event_json("evt_c", "invoice.paid"), "203.0.113.5").await;
    assert_eq!(app.spy.calls(), 4);
}

#[tokio::test]
async fn test_expired_signature_timestamp_rejected() {
    let app = TestApp::new();
    let body = event_json("evt_old", "invoice.paid");
    let stale = scorebook_shield::payments::signature::sign(SECRET, NOW - 3_600, body.as_bytes()).unwrap();

    let response = app
        .send(
            request(Method::POST, WEBHOOK, "203.0.113.6")
                .header("stripe-signature", stale)
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_login_rate_limit_and_window_reset() {
    let app = TestApp::new();
    let client = "192.0.2.10";

    for i in 1..=5 {
        assert_eq!(app.get("/login", client).await.status(), StatusCode::OK, "request {i}");
    }
    let denied = app.get("/login", client).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    // Other routes use the global bucket.
    assert_eq!(app.get("/health", client).await.status(), StatusCode::OK);

    app.clock.advance(60);
    assert_eq!(app.get("/login", client).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_global_limit_applies_to_unlisted_routes() {
    let mut config = ShieldConfig::default();
    config.rate_limit.requests = 3;
    let app = TestApp::with_config(config);
    let client = "192.0.2.11";

    for _ in 0..3 {
        assert_eq!(app.get("/register", client).await.status(), StatusCode::OK);
    }
    // /register has its own 3-per-hour rule.
    assert_eq!(
        app.get("/register", client).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    for _ in 0..3 {
        assert_eq!(app.get("/health", client).await.status(), StatusCode::OK);
    }
    assert_eq!(
        app.get("/health", client).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_webhook_is_rate_limit_exempt() {
    let mut config = ShieldConfig::default();
    config.webhook.secret = Some(Secret::new(SECRET));
    config.rate_limit.requests = 2;
    let app = TestApp::with_config(config);

    for i in 0..10 {
        let response = app
            .deliver(&event_json(&format!("evt_{i}"), "invoice.paid"), "203.0.113.7")
            .await;
        assert_eq!(response.status(), StatusCode::OK, "delivery {i}");
    }
    assert_eq!(app.spy.calls(), 10);
}

#[tokio::test]
async fn test_webhook_bypasses_forgery_guard() {
    let app = TestApp::new();
    let response = app
        .deliver(&event_json("evt_csrf", "invoice.paid"), "203.0.113.8")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let login = app
        .send(
            request(Method::POST, "/login", "203.0.113.8")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(login.status(), StatusCode::BAD_REQUEST);

    let with_token = app
        .send(
            request(Method::POST, "/login", "203.0.113.8")
                .header("cookie", "csrf_token=abc123")
                .header("x-csrf-token", "abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(with_token.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_gate_logging_is_sampled_under_attack() {
    let mut config = ShieldConfig::default();
    config.gate.sample_after = 10;
    config.gate.sample_every = 5;
    // Keep the scanner unbanned so every request reaches the classifier.
    config.recon.threshold = 1_000;
    let app = TestApp::with_config(config);

    for _ in 0..40 {
        app.get("/.env", "192.0.2.20").await;
    }
    // 10 logged in full, then every 5th of the remaining 30.
    assert_eq!(app.sink.count(Severity::Notice), 16);
    assert!(app.shield.sampler().is_sampling());
}

fn behind_proxy() -> TestApp {
    let mut config = ShieldConfig::default();
    config.webhook.secret = Some(Secret::new(SECRET));
    config.client_ip.trusted_proxies = vec!["10.0.0.0/8".to_string()];
    TestApp::with_config(config)
}

#[tokio::test]
async fn test_forwarded_header_identifies_client() {
    let app = behind_proxy();
    for _ in 0..20 {
        app.send(
            request(Method::GET, "/nothing-here", "10.0.0.1")
                .header("x-forwarded-for", "203.0.113.50, 10.0.0.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    }
    assert!(app.shield.registry().is_blocked("203.0.113.50"));
    assert!(!app.shield.registry().is_blocked("10.0.0.1"));
}

#[tokio::test]
async fn test_forwarded_header_from_untrusted_peer_is_ignored() {
    let app = behind_proxy();
    let scanner = |forwarded: &'static str| {
        request(Method::GET, "/nothing-here", "6.6.6.6")
            .header("x-forwarded-for", forwarded)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..20 {
        app.send(scanner("9.9.9.9")).await;
    }
    // The scanner is banned under its own address; the named address is not.
    assert!(app.shield.registry().is_blocked("6.6.6.6"));
    assert!(!app.shield.registry().is_blocked("9.9.9.9"));

    // A fresh forwarded value does not shake off the ban.
    let response = app.send(scanner("1.2.3.4")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_header_ignored_without_trusted_proxies() {
    let app = TestApp::new();
    for _ in 0..20 {
        app.send(
            request(Method::GET, "/nothing-here", "6.6.6.7")
                .header("x-forwarded-for", "9.9.9.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    }
    assert!(app.shield.registry().is_blocked("6.6.6.7"));
    assert!(!app.shield.registry().is_blocked("9.9.9.9"));
}

#[tokio::test]
async fn test_oversized_webhook_body_is_plain_bad_request() {
    let mut config = ShieldConfig::default();
    config.webhook.secret = Some(Secret::new(SECRET));
    config.security.max_body_size = 16;
    let app = TestApp::with_config(config);

    let response = app
        .deliver(&event_json("evt_big", "invoice.paid"), "203.0.113.60")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, r#"{"error":"bad_request"}"#);
    assert_eq!(app.spy.calls(), 0);
}

#[tokio::test]
async fn test_forgery_rejection_uses_fixed_body() {
    let app = TestApp::new();
    let response = app
        .send(
            request(Method::POST, "/api/scores", "203.0.113.61")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert_eq!(body_string(response).await, r#"{"error":"bad_request"}"#);
}

#[tokio::test]
async fn test_repeated_webhook_path_does_not_break_router() {
    let mut config = ShieldConfig::default();
    config.webhook.secret = Some(Secret::new(SECRET));
    config.webhook.paths.push(WEBHOOK.to_string());
    config.webhook.paths.push("/health".to_string());
    let app = TestApp::with_config(config);

    let response = app
        .deliver(&event_json("evt_dup_path", "invoice.paid"), "203.0.113.62")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.get("/health", "203.0.113.62").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = TestApp::new();
    let response = app.get("/health", "192.0.2.30").await;
    assert!(response.headers().contains_key("x-request-id"));
}
