//! API integration tests.

use std::time::Duration;

use axum::http::{Method, StatusCode, header};
use corkboard::admission::RateLimitSettings;
use corkboard::auth::{Claims, Role};
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{
    PASSWORD, app_with, body_json, codec, get, peer, post_json, request, test_app, test_config,
    token,
};

/// Test that health endpoint works without authentication.
#[tokio::test]
async fn test_health_endpoint() {
    let response = test_app().oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["ratelimit-limit"], "1000");
    assert_eq!(response.headers()["ratelimit-remaining"], "999");

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let response = test_app().oneshot(get("/nope", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Not Found");
}

#[tokio::test]
async fn test_login_success_and_token_use() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "teach1", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["user"]["id"], "teach1");
    assert_eq!(json["user"]["role"], "teacher");
    assert!(json["user"].get("password_hash").is_none());
    let token = json["token"].as_str().unwrap().to_string();

    let response = app.oneshot(get("/api/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json, json!({ "subjectId": "teach1", "role": "teacher" }));
}

#[tokio::test]
async fn test_login_by_email() {
    let response = test_app()
        .oneshot(post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "root@corkboard.test", "password": PASSWORD }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["user"]["role"], "admin");
}

#[tokio::test]
async fn test_login_wrong_password() {
    let response = test_app()
        .oneshot(post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "teach1", "password": "nope" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Unauthorized");
    assert_eq!(json["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_missing_credentials() {
    let response = test_app().oneshot(get("/api/me", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(
        json,
        json!({ "error": "Unauthorized", "message": "Authentication required" })
    );
}

#[tokio::test]
async fn test_wrong_scheme_and_bad_token() {
    let app = test_app();

    let req = axum::http::Request::builder()
        .uri("/api/me")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        body_json(response).await["message"]
            .as_str()
            .unwrap()
            .contains("Bearer")
    );

    let response = app
        .clone()
        .oneshot(get("/api/me", Some("not.a.jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid token");

    let foreign = corkboard::auth::TokenCodec::new("another-secret-another-secret-xyz", 3600)
        .issue("user123", Role::Admin)
        .unwrap();
    let response = app.oneshot(get("/api/me", Some(&foreign))).await.unwrap();
    assert_eq!(body_json(response).await["message"], "Invalid token");
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let now = chrono::Utc::now().timestamp();
    let forged = codec()
        .sign(&Claims {
            sub: Some("user123".to_string()),
            role: Some(json!("superadmin")),
            iat: Some(now),
            exp: Some(now + 3600),
        })
        .unwrap();

    let response = test_app()
        .oneshot(get("/api/me", Some(&forged)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid user role");
}

#[tokio::test]
async fn test_missing_subject_is_invalid_payload() {
    let now = chrono::Utc::now().timestamp();
    let token = codec()
        .sign(&Claims {
            sub: None,
            role: Some(json!("admin")),
            iat: Some(now),
            exp: Some(now + 3600),
        })
        .unwrap();

    let response = test_app()
        .oneshot(get("/api/me", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Invalid token payload");
}

#[tokio::test]
async fn test_token_resubmitted_after_expiry() {
    let mut config = test_config();
    config.auth.token_ttl_secs = 2;
    let app = app_with(&config);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "user123", "password": PASSWORD }),
        ))
        .await
        .unwrap();
    let token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(get("/api/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(3100)).await;

    let response = app.oneshot(get("/api/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], "Token has expired");
}

#[tokio::test]
async fn test_posts_are_readable_anonymously() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(get("/api/posts", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["viewer"], Value::Null);

    // A bad token degrades to anonymous on optional routes.
    let response = app
        .clone()
        .oneshot(get("/api/posts", Some("garbage")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["viewer"], Value::Null);

    let response = app
        .oneshot(get("/api/posts", Some(&token("user123", Role::Student))))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["viewer"]["subjectId"], "user123");
}

#[tokio::test]
async fn test_create_post_requires_auth() {
    let app = test_app();
    let body = json!({ "content": "hello board" });

    let response = app
        .clone()
        .oneshot(post_json("/api/posts", None, &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/posts",
            Some(&token("user123", Role::Student)),
            &body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["authorId"], "user123");

    let response = app
        .oneshot(post_json(
            "/api/posts",
            Some(&token("user123", Role::Student)),
            &json!({ "content": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_method_gate() {
    let app = test_app();

    for (method, uri) in [
        (Method::PUT, "/api/posts"),
        (Method::DELETE, "/api/users/user123"),
        (Method::PATCH, "/does/not/exist"),
        (Method::OPTIONS, "/api/posts"),
    ] {
        let response = app
            .clone()
            .oneshot(request(method.clone(), uri, None))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::METHOD_NOT_ALLOWED,
            "{method} {uri}"
        );
        assert_eq!(response.headers()[header::ALLOW], "GET, POST, HEAD");

        let json = body_json(response).await;
        assert_eq!(json["error"], "Method Not Allowed");
        assert_eq!(json["allowedMethods"], json!(["GET", "POST", "HEAD"]));
    }
}

#[tokio::test]
async fn test_ownership_route() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(get(
            "/api/users/user123",
            Some(&token("user123", Role::Student)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "Sam Student");

    let response = app
        .clone()
        .oneshot(get("/api/users/teach1", Some(&token("user123", Role::Student))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Forbidden");
    assert!(json["message"].as_str().unwrap().contains("your own resources"));

    let response = app
        .clone()
        .oneshot(get("/api/users/teach1", Some(&token("root", Role::Admin))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_json(
            "/api/users/user123",
            Some(&token("user123", Role::Student)),
            &json!({ "name": "Sam S." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["updatedBy"], "user123");
}

#[tokio::test]
async fn test_moderation_requires_teacher() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(get(
            "/api/comments/moderation",
            Some(&token("user123", Role::Student)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await["message"],
        "Requires teacher role or higher"
    );

    for role in [Role::Teacher, Role::Admin] {
        let response = app
            .clone()
            .oneshot(get("/api/comments/moderation", Some(&token("x", role))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_pin_requires_teacher_or_admin() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/posts/p1/pin",
            Some(&token("user123", Role::Student)),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await["message"],
        "Teacher or admin access required"
    );

    let response = app
        .oneshot(post_json(
            "/api/posts/p1/pin",
            Some(&token("teach1", Role::Teacher)),
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["postId"], "p1");
    assert_eq!(json["pinnedBy"], "teach1");
}

#[tokio::test]
async fn test_admin_route_without_allowlist() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(get("/api/admin/users", Some(&token("teach1", Role::Teacher))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["message"], "Admin access required");

    let response = app
        .oneshot(get("/api/admin/users", Some(&token("root", Role::Admin))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_admin_allowlist() {
    let mut config = test_config();
    config.admission.allowlist = Some("10.0.0.0/8, 192.168.1.0/24".to_string());
    let app = app_with(&config);
    let admin = token("root", Role::Admin);

    let admin_from = |addr: &str| {
        let mut req = get("/api/admin/users", Some(&admin));
        req.extensions_mut().insert(peer(addr));
        req
    };

    for allowed in ["10.1.2.3:4000", "192.168.1.77:80", "[::ffff:10.1.2.3]:5000"] {
        let response = app.clone().oneshot(admin_from(allowed)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{allowed}");
    }

    let response = app.clone().oneshot(admin_from("172.16.0.1:4000")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Forbidden", "message": "Forbidden" })
    );

    // The network check runs before authentication.
    let mut req = get("/api/admin/users", None);
    req.extensions_mut().insert(peer("172.16.0.1:4000"));
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // No resolvable client address.
    let response = app
        .clone()
        .oneshot(get("/api/admin/users", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Other routes are not affected.
    let mut req = get("/health", None);
    req.extensions_mut().insert(peer("172.16.0.1:4000"));
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_allowlist_with_trusted_proxy() {
    let mut config = test_config();
    config.admission.allowlist = Some("10.0.0.0/8".to_string());
    config.admission.trust_proxy = true;
    let app = app_with(&config);
    let admin = token("root", Role::Admin);

    let mut req = get("/api/admin/users", Some(&admin));
    req.headers_mut()
        .insert("x-forwarded-for", "10.9.9.9, 203.0.113.5".parse().unwrap());
    req.extensions_mut().insert(peer("127.0.0.1:9000"));
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut req = get("/api/admin/users", Some(&admin));
    req.headers_mut()
        .insert("x-forwarded-for", "203.0.113.5, 10.9.9.9".parse().unwrap());
    req.extensions_mut().insert(peer("10.0.0.1:9000"));
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unparseable_allowlist_fails_closed() {
    let mut config = test_config();
    config.admission.allowlist = Some("not-a-cidr".to_string());
    let app = app_with(&config);

    for addr in ["10.1.2.3:1", "127.0.0.1:1", "[::1]:1"] {
        let mut req = get("/api/admin/users", Some(&token("root", Role::Admin)));
        req.extensions_mut().insert(peer(addr));
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{addr}");
    }
}

#[tokio::test]
async fn test_sensitive_tier_window() {
    let mut config = test_config();
    config.rate_limit.sensitive = RateLimitSettings {
        window_ms: 1000,
        max: 2,
    };
    let app = app_with(&config);
    let login = || {
        let mut req = post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "user123", "password": PASSWORD }),
        );
        req.extensions_mut().insert(peer("198.51.100.7:5555"));
        req
    };

    for remaining in ["1", "0"] {
        let response = app.clone().oneshot(login()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-limit"], "2");
        assert_eq!(response.headers()["ratelimit-remaining"], remaining);
    }

    let response = app.clone().oneshot(login()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["ratelimit-limit"], "2");
    assert_eq!(response.headers()["ratelimit-remaining"], "0");
    assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    let json = body_json(response).await;
    assert_eq!(json["error"], "Too Many Requests");

    // Other routes only see the global tier.
    let mut req = get("/health", None);
    req.extensions_mut().insert(peer("198.51.100.7:5555"));
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let response = app.oneshot(login()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_global_tier() {
    let mut config = test_config();
    config.rate_limit.global = RateLimitSettings {
        window_ms: 60_000,
        max: 3,
    };
    let state = common::test_state(&config);
    let app = corkboard::api::create_router(state.clone());

    let from = |addr: &str| {
        let mut req = get("/health", None);
        req.extensions_mut().insert(peer(addr));
        req
    };

    for _ in 0..3 {
        let response = app.clone().oneshot(from("198.51.100.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(from("198.51.100.1:1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(response).await["message"],
        "Too many requests, please try again later."
    );

    // Separate client key.
    let response = app.clone().oneshot(from("198.51.100.2:1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Counters are resettable.
    state.admission.reset_rate_limits();
    let response = app.oneshot(from("198.51.100.1:1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_global_tier_rejects_login_before_sensitive() {
    let mut config = test_config();
    config.rate_limit.global = RateLimitSettings {
        window_ms: 60_000,
        max: 2,
    };
    let app = app_with(&config);

    let login = || {
        let mut req = post_json(
            "/api/auth/login",
            None,
            &json!({ "username": "user123", "password": PASSWORD }),
        );
        req.extensions_mut().insert(peer("198.51.100.7:1"));
        req
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(login()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-limit"], "100");
    }

    let response = app.oneshot(login()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["ratelimit-limit"], "2");
}

#[tokio::test]
async fn test_cors_enabled() {
    let mut config = test_config();
    config.admission.cors_enabled = true;
    config.admission.allowed_origins = vec!["http://localhost:3000".to_string()];
    let app = app_with(&config);

    let req = axum::http::Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/posts")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );

    // OPTIONS joins the allowed set.
    let response = app
        .oneshot(request(Method::PUT, "/api/posts", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        body_json(response).await["allowedMethods"],
        json!(["GET", "POST", "HEAD", "OPTIONS"])
    );
}
