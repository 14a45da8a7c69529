//! API route table.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Build the `/api` router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        // Traces
        .route("/trace", post(handlers::submit_trace))
        .route("/trace/:trace_id", get(handlers::get_trace_chain))
        .route("/interactions/:service", get(handlers::get_interactions))
        // Snapshots
        .route("/snapshot/:service", post(handlers::capture_snapshot))
        .route("/snapshots/:service", get(handlers::list_snapshots))
        // Recovery
        .route("/analyze-failure/:service", post(handlers::analyze_failure))
        .route("/recover/:service", post(handlers::recover_service))
        .route("/recoveries", get(handlers::list_recoveries))
        // Services (status before parameterized routes)
        .route("/services/status", get(handlers::services_status))
        .route("/services/:name/heal", post(handlers::heal_service))
        .route("/services/:name/inbox", get(handlers::service_inbox))
        .route(
            "/services/:name/state",
            get(handlers::get_service_state).put(handlers::put_service_state),
        )
        .route(
            "/services/:name/config",
            get(handlers::get_service_config).put(handlers::put_service_config),
        )
        // System
        .route("/issues/critical", get(handlers::critical_issues))
        .route("/events", get(handlers::recent_events))
        .route("/system/metrics", get(handlers::system_metrics))
        .with_state(state)
}

/// Engine liveness at root level
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::engine_health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_route() {
        let t = TestApp::new();
        let (status, body) = call(health_routes(t.state.clone()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["services"], 3);
    }

    #[tokio::test]
    async fn test_submit_trace_validates_fields() {
        let t = TestApp::new();
        let app = api_routes(t.state.clone());

        let (status, body) = call(
            app.clone(),
            "POST",
            "/trace",
            Some(json!({"service_name": "payments", "operation": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (status, _) = call(app, "POST", "/trace", Some(json!({"nope": true}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_trace_returns_generated_ids() {
        let t = TestApp::new();
        let (status, body) = call(
            api_routes(t.state.clone()),
            "POST",
            "/trace",
            Some(json!({"service_name": "payments", "operation": "charge"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(!body["data"]["span_id"].as_str().unwrap().is_empty());
        assert!(!body["data"]["trace_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_service_routes_return_404() {
        let t = TestApp::new();
        let app = api_routes(t.state.clone());
        for (method, uri) in [
            ("GET", "/interactions/ghost"),
            ("POST", "/snapshot/ghost"),
            ("GET", "/snapshots/ghost"),
            ("POST", "/analyze-failure/ghost"),
            ("POST", "/recover/ghost"),
            ("GET", "/recoveries?service=ghost"),
            ("POST", "/services/ghost/heal"),
            ("GET", "/services/ghost/inbox"),
            ("GET", "/services/ghost/state"),
        ] {
            let (status, body) = call(app.clone(), method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(body["error"]["code"], "UNKNOWN_SERVICE", "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_missing_trace_is_404() {
        let t = TestApp::new();
        let (status, _) = call(api_routes(t.state.clone()), "GET", "/trace/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_state_round_trip_and_snapshot() {
        let t = TestApp::new();
        let app = api_routes(t.state.clone());

        let (status, _) = call(
            app.clone(),
            "PUT",
            "/services/payments/state",
            Some(json!({"balance": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(app.clone(), "GET", "/services/payments/state", None).await;
        assert_eq!(body["data"]["balance"], 10);

        let (status, body) = call(app.clone(), "POST", "/snapshot/payments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["version"], 1);
        assert_eq!(body["data"]["state"]["balance"], 10);

        let (_, body) = call(app, "GET", "/snapshots/payments", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_then_recover() {
        let t = TestApp::new();
        let app = api_routes(t.state.clone());

        let (status, body) = call(app.clone(), "POST", "/analyze-failure/payments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["strategy"]["confidence"], 10);

        let (status, body) = call(app.clone(), "POST", "/recover/payments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], true);
        assert_eq!(body["data"]["step_results"][0]["action"], "verify_health");

        let (_, body) = call(app, "GET", "/recoveries?service=payments", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_heal_is_accepted() {
        let t = TestApp::new();
        let (status, body) = call(
            api_routes(t.state.clone()),
            "POST",
            "/services/payments/heal",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["service"], "payments");
    }

    #[tokio::test]
    async fn test_status_and_metrics_list_every_service() {
        let t = TestApp::new();
        let app = api_routes(t.state.clone());

        let (_, body) = call(app.clone(), "GET", "/services/status", None).await;
        assert_eq!(body["data"]["payments"]["status"], "unknown");

        let (_, body) = call(app, "GET", "/system/metrics", None).await;
        assert_eq!(body["data"]["services"].as_object().unwrap().len(), 3);
        assert_eq!(body["data"]["services"]["payments"]["critical"], true);
    }
}
