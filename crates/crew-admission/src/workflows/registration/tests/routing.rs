use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::registration::domain::{JourneyState, ParticipantRole, RegistrationStatus};
use crate::workflows::registration::router::identity_from_headers;
use crate::workflows::registration::{
    registration_router, AdmissionError, PARTICIPANT_ID_HEADER, PARTICIPANT_ROLE_HEADER,
};

fn join_body(answers: Value) -> Body {
    Body::from(
        serde_json::to_vec(&json!({
            "leg_id": LEG,
            "notes": "Happy to cook",
            "answers": answers,
        }))
        .expect("serialise body"),
    )
}

fn complete_answers() -> Value {
    json!([
        { "requirement_id": REQ_MOTIVATION, "answer_text": "Building ocean miles" },
        { "requirement_id": REQ_DIET, "answer_text": "vegetarian" },
    ])
}

fn post_join(participant: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::post("/api/v1/registrations")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(participant) = participant {
        builder = builder.header(PARTICIPANT_ID_HEADER, participant);
    }
    builder.body(body).expect("request builds")
}

fn get_list(query: &str) -> Request<Body> {
    Request::get(format!("/api/v1/registrations{query}"))
        .header(PARTICIPANT_ID_HEADER, CREW)
        .body(Body::empty())
        .expect("request builds")
}

fn post_cancel(participant: &str, registration_id: &str) -> Request<Body> {
    Request::post(format!("/api/v1/registrations/{registration_id}/cancel"))
        .header(PARTICIPANT_ID_HEADER, participant)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn join_route_creates_registration() {
    let harness = harness(seeded_store(JourneyState::Published, false));
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), join_body(complete_answers())))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["reactivated"], false);
    assert_eq!(payload["assessment_dispatched"], false);
    assert_eq!(payload["registration"]["status"], "pending_approval");
    assert_eq!(payload["registration"]["leg_id"], LEG);
    assert!(payload["message"].as_str().is_some());
}

#[tokio::test]
async fn join_route_answers_ok_on_reactivation() {
    let store = seeded_store(JourneyState::Published, true);
    let cancelled = stored_registration(RegistrationStatus::Cancelled, 2);
    store.put_registration(cancelled.clone());
    let harness = harness(store);
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), join_body(complete_answers())))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["reactivated"], true);
    assert_eq!(payload["assessment_dispatched"], true);
    assert_eq!(payload["registration"]["id"], cancelled.id.0.as_str());
    harness.tasks.drain().await;
}

#[tokio::test]
async fn join_route_requires_identity() {
    let harness = harness(seeded_store(JourneyState::Published, false));
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(None, join_body(complete_answers())))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["category"], "unauthorized");
}

#[tokio::test]
async fn join_route_rejects_malformed_body() {
    let harness = harness(seeded_store(JourneyState::Published, false));
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), Body::from("{\"notes\": 3")))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["category"], "validation_failed");
    assert_eq!(payload["code"], "invalid_body");
}

#[tokio::test]
async fn join_route_reports_missing_answers() {
    let harness = harness(seeded_store(JourneyState::Published, false));
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), join_body(json!([]))))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["code"], "missing_answers");
    assert_eq!(
        payload["details"]["missing_requirement_ids"],
        json!([REQ_MOTIVATION])
    );
}

#[tokio::test]
async fn join_route_reports_eligibility_fail_type() {
    let store = seeded_store(JourneyState::Published, false);
    let mut profile = qualified_profile();
    profile.experience_level = None;
    store.add_profile(profile);
    let harness = harness(store);
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), join_body(complete_answers())))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["category"], "eligibility_failed");
    assert_eq!(payload["fail_type"], "missing_experience_level");
    assert_eq!(payload["details"]["requirement_id"], REQ_EXPERIENCE);
}

#[tokio::test]
async fn join_route_conflicts_on_duplicate() {
    let store = seeded_store(JourneyState::Published, false);
    let existing = stored_registration(RegistrationStatus::Approved, 2);
    store.put_registration(existing.clone());
    let harness = harness(store);
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), join_body(complete_answers())))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["category"], "conflict");
    assert_eq!(payload["details"]["registration_id"], existing.id.0.as_str());
}

#[tokio::test]
async fn join_route_reports_partial_write_with_registration() {
    let store = seeded_store(JourneyState::Published, false);
    let repository = Arc::new(ScriptedRepository::new(store.clone()).failing_answers());
    let harness = harness_with(
        store,
        HarnessOptions {
            registrations: Some(repository),
            ..HarnessOptions::default()
        },
    );
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(post_join(Some(CREW), join_body(complete_answers())))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["category"], "persistence_failed");
    assert_eq!(payload["registration"]["status"], "pending_approval");
}

#[tokio::test]
async fn list_route_filters_by_status() {
    let store = seeded_store(JourneyState::Published, false);
    store.put_registration(stored_registration(RegistrationStatus::Cancelled, 1));
    let harness = harness(store);
    let router = registration_router(harness.service.clone());

    let everything = router
        .clone()
        .oneshot(get_list(""))
        .await
        .expect("route executes");
    let approved = router
        .oneshot(get_list("?status=approved"))
        .await
        .expect("route executes");

    assert_eq!(everything.status(), StatusCode::OK);
    let payload = read_json_body(everything).await;
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["registrations"][0]["status"], "cancelled");

    let payload = read_json_body(approved).await;
    assert_eq!(payload["count"], 0);
}

#[tokio::test]
async fn list_route_rejects_unknown_status() {
    let harness = harness(seeded_store(JourneyState::Published, false));
    let router = registration_router(harness.service.clone());

    let response = router
        .oneshot(get_list("?status=sunk"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_route_maps_lifecycle_errors() {
    let store = seeded_store(JourneyState::Published, false);
    let registration = stored_registration(RegistrationStatus::PendingApproval, 1);
    store.put_registration(registration.clone());
    let harness = harness(store);
    let router = registration_router(harness.service.clone());

    let foreign = router
        .clone()
        .oneshot(post_cancel(OTHER_CREW, &registration.id.0))
        .await
        .expect("route executes");
    let first = router
        .clone()
        .oneshot(post_cancel(CREW, &registration.id.0))
        .await
        .expect("route executes");
    let second = router
        .oneshot(post_cancel(CREW, &registration.id.0))
        .await
        .expect("route executes");

    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    assert_eq!(first.status(), StatusCode::OK);
    let payload = read_json_body(first).await;
    assert_eq!(payload["registration"]["status"], "cancelled");
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[test]
fn identity_defaults_to_crew_and_rejects_unknown_roles() {
    let mut headers = HeaderMap::new();
    headers.insert(PARTICIPANT_ID_HEADER, HeaderValue::from_static(CREW));
    let identity = identity_from_headers(&headers).expect("identity");
    assert_eq!(identity.role, ParticipantRole::Crew);
    assert_eq!(identity.participant_id, crew_id());

    headers.insert(PARTICIPANT_ROLE_HEADER, HeaderValue::from_static("Owner"));
    assert_eq!(
        identity_from_headers(&headers).expect("identity").role,
        ParticipantRole::Owner
    );

    headers.insert(PARTICIPANT_ROLE_HEADER, HeaderValue::from_static("captain"));
    assert!(matches!(
        identity_from_headers(&headers),
        Err(AdmissionError::Unauthorized)
    ));

    headers.insert(PARTICIPANT_ID_HEADER, HeaderValue::from_static("   "));
    assert!(matches!(
        identity_from_headers(&headers),
        Err(AdmissionError::Unauthorized)
    ));
}

#[tokio::test]
async fn owner_role_is_forbidden_from_joining() {
    let harness = harness(seeded_store(JourneyState::Published, false));
    let router = registration_router(harness.service.clone());
    let mut request = post_join(Some(CREW), join_body(complete_answers()));
    request
        .headers_mut()
        .insert(PARTICIPANT_ROLE_HEADER, HeaderValue::from_static("owner"));

    let response = router.oneshot(request).await.expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
