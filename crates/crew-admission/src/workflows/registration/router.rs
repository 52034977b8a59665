use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Identity, JoinRequest, LegId, ParticipantId, ParticipantRole, RegistrationFilter,
    RegistrationId, RegistrationStatus,
};
use super::service::{AdmissionError, RegistrationService, ValidationCode};

pub const PARTICIPANT_ID_HEADER: &str = "x-participant-id";
pub const PARTICIPANT_ROLE_HEADER: &str = "x-participant-role";

/// Router builder exposing the registration endpoints.
pub fn registration_router(service: Arc<RegistrationService>) -> Router {
    Router::new()
        .route(
            "/api/v1/registrations",
            post(join_handler).get(list_handler),
        )
        .route(
            "/api/v1/registrations/:registration_id/cancel",
            post(cancel_handler),
        )
        .with_state(service)
}

/// Resolve the caller from gateway headers. A missing role means crew.
pub(crate) fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, AdmissionError> {
    let participant_id = headers
        .get(PARTICIPANT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AdmissionError::Unauthorized)?;

    let role = match headers
        .get(PARTICIPANT_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        None => ParticipantRole::Crew,
        Some(raw) => ParticipantRole::parse(raw).ok_or(AdmissionError::Unauthorized)?,
    };

    Ok(Identity {
        participant_id: ParticipantId(participant_id.to_string()),
        role,
    })
}

pub(crate) async fn join_handler(
    State(service): State<Arc<RegistrationService>>,
    headers: HeaderMap,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Response {
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return AdmissionError::validation(
                ValidationCode::InvalidBody,
                rejection.body_text(),
                None,
            )
            .into_response()
        }
    };

    match service.join(&identity, request).await {
        Ok(outcome) => {
            let status = if outcome.reactivated {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            let payload = json!({
                "registration": outcome.registration,
                "message": outcome.message,
                "reactivated": outcome.reactivated,
                "assessment_dispatched": outcome.assessment_dispatched,
            });
            (status, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    leg_id: Option<String>,
    status: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<RegistrationFilter, AdmissionError> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(RegistrationStatus::parse(raw).ok_or_else(|| {
                AdmissionError::validation(
                    ValidationCode::InvalidBody,
                    format!("unknown registration status `{raw}`"),
                    None,
                )
            })?),
        };
        Ok(RegistrationFilter {
            leg_id: self.leg_id.filter(|id| !id.is_empty()).map(LegId),
            status,
        })
    }
}

pub(crate) async fn list_handler(
    State(service): State<Arc<RegistrationService>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let result = async {
        let identity = identity_from_headers(&headers)?;
        let filter = query.into_filter()?;
        service.list(&identity, &filter).await
    }
    .await;

    match result {
        Ok(registrations) => {
            let payload = json!({
                "count": registrations.len(),
                "registrations": registrations,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn cancel_handler(
    State(service): State<Arc<RegistrationService>>,
    headers: HeaderMap,
    Path(registration_id): Path<String>,
) -> Response {
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    match service
        .cancel(&identity, &RegistrationId(registration_id))
        .await
    {
        Ok(registration) => {
            let payload = json!({ "registration": registration });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) fn status_for(error: &AdmissionError) -> StatusCode {
    match error {
        AdmissionError::Unauthorized => StatusCode::UNAUTHORIZED,
        AdmissionError::Forbidden(_) => StatusCode::FORBIDDEN,
        AdmissionError::NotFound { .. } => StatusCode::NOT_FOUND,
        AdmissionError::ValidationFailed { .. } | AdmissionError::EligibilityFailed(_) => {
            StatusCode::BAD_REQUEST
        }
        AdmissionError::Conflict { .. } => StatusCode::CONFLICT,
        AdmissionError::PersistenceFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        AdmissionError::TimedOut(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let mut payload = json!({
            "error": self.to_string(),
            "category": self.category(),
        });

        match &self {
            AdmissionError::ValidationFailed { code, details, .. } => {
                payload["code"] = json!(code.token());
                if let Some(details) = details {
                    payload["details"] = details.clone();
                }
            }
            AdmissionError::EligibilityFailed(failure) => {
                payload["fail_type"] = json!(failure.fail_type.token());
                payload["details"] = json!({ "requirement_id": failure.requirement_id });
            }
            AdmissionError::Conflict {
                registration_id: Some(existing),
                ..
            } => {
                payload["details"] = json!({ "registration_id": existing });
            }
            AdmissionError::NotFound { resource, id } => {
                payload["details"] = json!({ "resource": resource, "id": id });
            }
            AdmissionError::PersistenceFailed {
                registration: Some(registration),
                ..
            } => {
                payload["registration"] = json!(registration);
            }
            _ => {}
        }

        (status, Json(payload)).into_response()
    }
}
