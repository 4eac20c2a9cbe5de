use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ActivityId, DocumentId, DocumentUpload, Page, RegistrationDraft, RegistrationFilter,
    RegistrationId, RegistrationUpdate, ReviewDecision,
};
use super::identity::AccessToken;
use super::service::{RegistrationService, RegistrationServiceError};

type SharedService = State<Arc<RegistrationService>>;

/// Router builder exposing registration, approval, and eligibility endpoints.
pub fn registration_router(service: Arc<RegistrationService>) -> Router {
    Router::new()
        .route("/api/v1/registrations", post(create_handler))
        .route(
            "/api/v1/registrations/:registration_id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route(
            "/api/v1/registrations/:registration_id/documents",
            get(documents_handler).post(add_document_handler),
        )
        .route("/api/v1/registration-lists/all", post(list_all_handler))
        .route("/api/v1/registration-lists/advisor", post(list_advisor_handler))
        .route("/api/v1/registration-lists/student", post(list_student_handler))
        .route("/api/v1/approvals", post(approve_handler))
        .route("/api/v1/approvals/advisor", post(advisor_approval_handler))
        .route("/api/v1/approvals/lo", post(lo_approval_handler))
        .route("/api/v1/eligibility/:activity_id", get(eligibility_handler))
        .route("/api/v1/documents/:document_id", delete(delete_document_handler))
        .route("/api/v1/advisor/summary", get(advisor_summary_handler))
        .with_state(service)
}

/// Filter plus one-based paging, as posted to the listing endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRequest {
    #[serde(flatten)]
    pub filter: RegistrationFilter,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListRequest {
    fn into_parts(self) -> (RegistrationFilter, Page) {
        let page = Page::numbered(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(Page::DEFAULT_LIMIT),
        );
        (self.filter, page)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalRequest {
    pub registration_ids: Vec<RegistrationId>,
    pub decision: ReviewDecision,
}

fn bearer(headers: &HeaderMap) -> Result<AccessToken, Response> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(AccessToken::from_header)
        .ok_or_else(|| {
            let payload = json!({ "error": "Unauthorized" });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn failure(error: RegistrationServiceError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (error.status_code(), Json(payload)).into_response()
}

fn bad_id(kind: &str, raw: &str) -> Response {
    let payload = json!({
        "error": format!("invalid {kind} id '{raw}'"),
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

pub(crate) async fn create_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(draft): Json<RegistrationDraft>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match service.create_registration(draft, &token) {
        Ok(details) => (StatusCode::CREATED, Json(details)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn get_handler(
    State(service): SharedService,
    Path(registration_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Ok(id) = registration_id.parse::<RegistrationId>() else {
        return bad_id("registration", &registration_id);
    };
    match service.get_registration(&id, &token) {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn update_handler(
    State(service): SharedService,
    Path(registration_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<RegistrationUpdate>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Ok(id) = registration_id.parse::<RegistrationId>() else {
        return bad_id("registration", &registration_id);
    };
    match service.update_registration(&id, update, &token) {
        Ok(registration) => (StatusCode::OK, Json(registration)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn delete_handler(
    State(service): SharedService,
    Path(registration_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Ok(id) = registration_id.parse::<RegistrationId>() else {
        return bad_id("registration", &registration_id);
    };
    match service.delete_registration(&id, &token) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn documents_handler(
    State(service): SharedService,
    Path(registration_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Ok(id) = registration_id.parse::<RegistrationId>() else {
        return bad_id("registration", &registration_id);
    };
    match service.documents_for(&id, &token) {
        Ok(documents) => (StatusCode::OK, Json(documents)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn add_document_handler(
    State(service): SharedService,
    Path(registration_id): Path<String>,
    headers: HeaderMap,
    Json(upload): Json<DocumentUpload>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Ok(id) = registration_id.parse::<RegistrationId>() else {
        return bad_id("registration", &registration_id);
    };
    match service.add_document(&id, upload, &token) {
        Ok(document) => (StatusCode::CREATED, Json(document)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn delete_document_handler(
    State(service): SharedService,
    Path(document_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Ok(id) = document_id.parse::<DocumentId>() else {
        return bad_id("document", &document_id);
    };
    match service.delete_document(&id, &token) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn list_all_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(request): Json<ListRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let (filter, page) = request.into_parts();
    match service.list_registrations(filter, page, &token) {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn list_advisor_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(request): Json<ListRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let (filter, page) = request.into_parts();
    match service.list_for_advisor(filter, page, &token) {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn list_student_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(request): Json<ListRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    let (filter, page) = request.into_parts();
    match service.list_for_student(filter, page, &token) {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn approve_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(request): Json<ApprovalRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match service.approve(&request.registration_ids, request.decision, &token) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn advisor_approval_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(request): Json<ApprovalRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match service.advisor_approval(&request.registration_ids, request.decision, &token) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn lo_approval_handler(
    State(service): SharedService,
    headers: HeaderMap,
    Json(request): Json<ApprovalRequest>,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match service.lo_approval(&request.registration_ids, request.decision, &token) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn eligibility_handler(
    State(service): SharedService,
    Path(activity_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match service.check_eligibility(&ActivityId(activity_id), &token) {
        Ok(verdict) => (StatusCode::OK, Json(verdict)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn advisor_summary_handler(
    State(service): SharedService,
    headers: HeaderMap,
) -> Response {
    let token = match bearer(&headers) {
        Ok(token) => token,
        Err(response) => return response,
    };
    match service.advisor_summary(&token) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => failure(error),
    }
}
