mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use python_feedback_api::config::Config;
use serde_json::json;
use tower::ServiceExt;

use common::{create_test_app, full_reply, post_analyze, post_raw, test_config, ScriptedProvider};

#[tokio::test]
async fn test_health_reports_provider_status() {
    let app = create_test_app(test_config(), None);

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["provider"], "disabled");
    assert!(json["rule_catalog"].is_string());
}

#[tokio::test]
async fn test_analyze_returns_full_shape() {
    let app = create_test_app(test_config(), None);

    let (status, json) = post_analyze(
        &app,
        json!({ "code": "print('hello')\n", "help_mode": "diagnostic" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["summary"], "No static issues detected.");
    assert_eq!(json["error_clusters"], json!([]));
    assert_eq!(json["hints"], json!([]));
    assert!(json["full_solution"].is_null());
    assert!(json["complexity"].is_null());
    assert_eq!(json["key_concepts"], json!([]));
    assert_eq!(json["best_practices"], json!([]));
}

#[tokio::test]
async fn test_findings_carry_type_line_and_severity() {
    let app = create_test_app(test_config(), None);

    let (status, json) = post_analyze(
        &app,
        json!({ "code": "total = 10\nprint(total / 0)\n", "help_mode": "diagnostic" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let clusters = json["error_clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["type"], "ZeroDivisionError");
    assert_eq!(clusters[0]["line"], 2);
    assert_eq!(clusters[0]["severity"], "error");
    assert!(clusters[0]["why"].as_str().unwrap().len() > 10);
}

#[tokio::test]
async fn test_malformed_json_is_unprocessable() {
    let app = create_test_app(test_config(), None);

    let (status, json) = post_raw(&app, "{\"code\": ".to_string()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn test_missing_code_is_unprocessable() {
    let app = create_test_app(test_config(), None);

    let (status, json) = post_analyze(&app, json!({ "help_mode": "guided" })).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["detail"].as_str().unwrap().contains("code"));
}

#[tokio::test]
async fn test_unknown_help_mode_is_unprocessable() {
    let app = create_test_app(test_config(), None);

    let (status, _) = post_analyze(&app, json!({ "code": "x = 1", "help_mode": "expert" })).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_hint_depth_out_of_range_is_unprocessable() {
    let app = create_test_app(test_config(), None);

    for depth in [0, 4] {
        let (status, json) =
            post_analyze(&app, json!({ "code": "x = 1", "hint_depth": depth })).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "depth {}", depth);
        assert_eq!(json["detail"], "hint_depth must be between 1 and 3");
    }

    let (status, _) = post_analyze(&app, json!({ "code": "x = 1", "hint_depth": -1 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_oversize_code_is_rejected_without_provider_call() {
    let provider = ScriptedProvider::replying(full_reply());
    let config = Config {
        max_code_chars: 10,
        ..test_config()
    };
    let app = create_test_app(config, Some(provider.clone()));

    let (status, json) = post_analyze(&app, json!({ "code": "x = 12345678" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Code too large. Max allowed characters is 10.");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_code_at_limit_is_accepted() {
    let config = Config {
        max_code_chars: 10,
        ..test_config()
    };
    let app = create_test_app(config, None);

    let (status, _) = post_analyze(&app, json!({ "code": "x = 12345\n" })).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_hint_level_is_accepted_as_depth() {
    let provider = ScriptedProvider::replying(full_reply());
    let app = create_test_app(test_config(), Some(provider.clone()));

    let (by_level_status, by_level) =
        post_analyze(&app, json!({ "code": "x = 1\nprint(x)\n", "hint_level": 2 })).await;
    let (_, by_depth) =
        post_analyze(&app, json!({ "code": "x = 1\nprint(x)\n", "hint_depth": 2 })).await;

    assert_eq!(by_level_status, StatusCode::OK);
    assert_eq!(by_level["hints"].as_array().unwrap().len(), 2);
    assert_eq!(by_level, by_depth);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_trace_id_is_generated_and_echoed() {
    let app = create_test_app(test_config(), None);

    let generated = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(generated.headers().get("x-trace-id").is_some());

    let echoed = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-trace-id", "client-trace-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(echoed.headers()["x-trace-id"], "client-trace-42");
}

#[tokio::test]
async fn test_metrics_require_basic_auth() {
    let app = create_test_app(test_config(), None);

    let (status, _) = post_analyze(&app, json!({ "code": "x = 1" })).await;
    assert_eq!(status, StatusCode::OK);

    let unauthorized = app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let wrong = general_purpose::STANDARD.encode("scraper:wrong");
    let rejected = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header("authorization", format!("Basic {}", wrong))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

    let credentials = general_purpose::STANDARD.encode("scraper:secret");
    let authorized = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header("authorization", format!("Basic {}", credentials))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(authorized.status(), StatusCode::OK);

    let body = to_bytes(authorized.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("analysis_requests_total"));
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_cors_preflight_allows_trace_header() {
    let app = create_test_app(test_config(), None);

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/analyze")
                .header("origin", "http://localhost:3000")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type,x-trace-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    let allowed = response
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-trace-id"));
    assert!(allowed.contains("content-type"));
}

#[tokio::test]
async fn test_indentation_error_is_reported_as_syntax_error() {
    let app = create_test_app(test_config(), None);

    let (status, json) = post_analyze(
        &app,
        json!({ "code": "def f():\nreturn 1\n", "help_mode": "diagnostic" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let clusters = json["error_clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["type"], "SyntaxError");
    assert_eq!(clusters[0]["line"], 2);
}
