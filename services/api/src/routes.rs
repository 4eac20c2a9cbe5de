use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use mbkm_registration::workflows::registration::{registration_router, RegistrationService};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_registration_routes(service: Arc<RegistrationService>) -> axum::Router {
    registration_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mbkm_registration::config::ScheduleConfig;
    use mbkm_registration::workflows::registration::{
        ActivityRecord, DirectoryFixtures, MemoryBackend, MemoryDirectory, TokenUser, UserRecord,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let directory = MemoryDirectory::from_fixtures(DirectoryFixtures {
            activities: vec![ActivityRecord {
                id: Some("act-a".to_string()),
                name: Some("Kampus Mengajar".to_string()),
                approval_status: Some("APPROVED".to_string()),
                start_period: Some("2024-01-01T00:00:00+07:00".to_string()),
                months_duration: Some(2),
            }],
            users: vec![TokenUser {
                token: "rina".to_string(),
                user: UserRecord {
                    id: Some("u-1".to_string()),
                    nrp: Some("5025201001".to_string()),
                    name: Some("Rina Putri".to_string()),
                    role: Some("MAHASISWA".to_string()),
                    email: Some("rina@student.its.ac.id".to_string()),
                },
            }],
        });
        let backend = MemoryBackend::with_directory(directory);
        let service = Arc::new(RegistrationService::new(
            backend.dependencies(),
            ScheduleConfig::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_registration_routes(service).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str, bearer: Option<&str>) -> axum::response::Response {
        let mut request = Request::builder().uri(uri);
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        app.oneshot(request.body(Body::empty()).expect("request builds"))
            .await
            .expect("route executes")
    }

    #[tokio::test]
    async fn readiness_reflects_startup_state() {
        assert_eq!(
            get(app(false), "/ready", None).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(get(app(true), "/ready", None).await.status(), StatusCode::OK);
        assert_eq!(get(app(true), "/health", None).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn registration_routes_are_mounted_next_to_probes() {
        let response = get(app(true), "/api/v1/eligibility/act-a", Some("rina")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .expect("read body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json payload");
        assert_eq!(payload["eligible"], json!(true));

        let anonymous = get(app(true), "/api/v1/eligibility/act-a", None).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let response = get(app(true), "/metrics", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }
}
