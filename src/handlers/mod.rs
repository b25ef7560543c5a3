mod diagrams;
mod health;
mod metrics;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::state::AppState;

pub use diagrams::{diagram_form_handler, diagram_handler};
pub use health::health_handler;
pub use metrics::metrics_handler;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/diagrams", post(diagram_handler))
        .route("/api/diagrams/form", post(diagram_form_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::PhaseAnalyzer;
    use crate::analyzer::tests::{FakeEngine, FakeMaterials, sample_diagram, sample_entries};
    use crate::engine::EngineError;
    use crate::materials::MaterialsError;
    use crate::models::{DiagramResponse, ErrorResponse, HealthResponse};
    use crate::rate_limit::RateLimiter;
    use crate::validation::ValidationLimits;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use serde::de::DeserializeOwned;
    use std::time::Duration;
    use tower::ServiceExt;

    const KEY: &str = "abcdefghijklmnopqrstuvwxyz123456";

    fn app_with(materials: FakeMaterials, engine: FakeEngine, max_requests: u32) -> Router {
        router(Arc::new(AppState {
            app_name: "PhaseNavigator".to_string(),
            version: "test".to_string(),
            rate_limiter: Arc::new(RateLimiter::new(max_requests, Duration::from_secs(30))),
            analyzer: PhaseAnalyzer::new(Arc::new(materials), Arc::new(engine)),
            limits: ValidationLimits::default(),
            api_key_hash_length: 12,
        }))
    }

    fn app(max_requests: u32) -> Router {
        app_with(
            FakeMaterials::returning(Ok(sample_entries())),
            FakeEngine { result: Ok(sample_diagram()) },
            max_requests,
        )
    }

    fn json_request(body: serde_json::Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/diagrams")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "198.51.100.4");
        if let Some(key) = key {
            builder = builder.header("X-API-KEY", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn valid_body() -> serde_json::Value {
        serde_json::json!({
            "f": ["Fe2O3", "Al2O3"],
            "temp": 0,
            "e_cut": 0.2,
            "functional": "GGA_GGA_U_R2SCAN"
        })
    }

    async fn read<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_app_name() {
        let response = app(10)
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = read(response).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.app_name, "PhaseNavigator");
    }

    #[tokio::test]
    async fn generates_a_diagram() {
        let response = app(10).oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");

        let diagram: DiagramResponse = read(response).await;
        assert_eq!(diagram.metadata.num_phases, 3);
        assert_eq!(diagram.metadata.elements, ["Al", "Fe", "O"]);
        assert_eq!(diagram.phase_info[0].formula, "Al2O3");
    }

    #[tokio::test]
    async fn missing_or_malformed_key_is_unauthorized() {
        let response = app(10).oneshot(json_request(valid_body(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let err: ErrorResponse = read(response).await;
        assert_eq!(err.error_code, "INVALID_API_KEY");

        let response = app(10).oneshot(json_request(valid_body(), Some("short"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let one_formula = serde_json::json!({"f": ["Fe2O3"], "temp": 0, "e_cut": 0.2});
        let response = app(10).oneshot(json_request(one_formula, Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = read(response).await;
        assert_eq!(err.error_code, "VALIDATION_ERROR");
        assert_eq!(err.detail, "At least 2 chemical formulas are required");

        let bad_functional = serde_json::json!({"f": ["Fe2O3", "Al2O3"], "functional": "INVALID_FUNCTIONAL"});
        let response = app(10).oneshot(json_request(bad_functional, Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = read(response).await;
        assert!(err.detail.contains("GGA_GGA_U_R2SCAN, R2SCAN, GGA_GGA_U"));

        let too_hot = serde_json::json!({"f": ["Fe2O3", "Al2O3"], "temp": 2001});
        let response = app(10).oneshot(json_request(too_hot, Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_body_still_counts_against_the_limit() {
        let app = app(1);
        let request = Request::builder()
            .method("POST")
            .uri("/api/diagrams")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", "198.51.100.4")
            .header("X-API-KEY", KEY)
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn rate_limited_requests_get_retry_after() {
        let app = app(2);
        for _ in 0..2 {
            let response = app.clone().oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=30).contains(&retry_after));
        let err: ErrorResponse = read(response).await;
        assert_eq!(err.error_code, "RATE_LIMIT_EXCEEDED");
        assert!(err.detail.starts_with("Rate limit exceeded. Please wait"));

        // a different key from the same IP has its own budget
        let other = "zyxwvutsrqponmlkjihgfedcba654321";
        let response = app.oneshot(json_request(valid_body(), Some(other))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn concurrent_burst_admits_exactly_the_limit() {
        let app = app(3);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let app = app.clone();
                tokio::spawn(async move { app.oneshot(json_request(valid_body(), Some(KEY))).await.unwrap().status() })
            })
            .collect();

        let mut ok = 0;
        let mut limited = 0;
        for handle in handles {
            match handle.await.unwrap() {
                StatusCode::OK => ok += 1,
                StatusCode::TOO_MANY_REQUESTS => limited += 1,
                other => panic!("unexpected status {}", other),
            }
        }
        assert_eq!(ok, 3);
        assert_eq!(limited, 5);
    }

    #[tokio::test]
    async fn database_failures_are_classified() {
        let cases = [
            (MaterialsError::Authentication, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL"),
            (
                MaterialsError::NoEntries { elements: vec!["Al".into(), "Fe".into(), "O".into()] },
                StatusCode::NOT_FOUND,
                "NO_MATERIALS_FOUND",
            ),
            (MaterialsError::Api("503 upstream".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];

        for (error, status, code) in cases {
            let app = app_with(
                FakeMaterials::returning(Err(error)),
                FakeEngine { result: Ok(sample_diagram()) },
                10,
            );
            let response = app.oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();
            assert_eq!(response.status(), status);
            let err: ErrorResponse = read(response).await;
            assert_eq!(err.error_code, code);
            assert!(!err.detail.contains("503 upstream"));
        }
    }

    #[tokio::test]
    async fn engine_failure_is_a_generic_server_error() {
        let app = app_with(
            FakeMaterials::returning(Ok(sample_entries())),
            FakeEngine { result: Err(EngineError::Status { status: 500, body: "traceback".into() }) },
            10,
        );
        let response = app.oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: ErrorResponse = read(response).await;
        assert!(!err.detail.contains("traceback"));
    }

    #[tokio::test]
    async fn form_endpoint_accepts_text_fields() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/diagrams/form")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("X-API-KEY", KEY)
            .body(Body::from("formulas=Fe2O3%2C+Al2O3&temp=abc&e_cut=0.5&functional=R2SCAN"))
            .unwrap();

        let response = app(10).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let diagram: DiagramResponse = read(response).await;
        assert_eq!(diagram.metadata.temperature, 0);
        assert_eq!(diagram.metadata.e_cut, 0.5);
        assert_eq!(diagram.metadata.functional.as_str(), "R2SCAN");
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let app = app(10);
        app.clone().oneshot(json_request(valid_body(), Some(KEY))).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("phasenav_diagram_requests_total"));
    }
}
