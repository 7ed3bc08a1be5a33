use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use futures::future::{BoxFuture, join_all};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{
    router,
    session::{USER_ID_HEADER, USER_ROLE_HEADER},
};
use crate::{
    config::AppConfig,
    dao::ride_store::memory::MemoryRideStore,
    services::push_relay::{DisabledPushGateway, PushError, PushGateway, PushMessage},
    state::{AppState, SharedState},
};

struct BrokenPushGateway {
    attempts: Arc<AtomicUsize>,
}

impl PushGateway for BrokenPushGateway {
    fn deliver(&self, _message: PushMessage) -> BoxFuture<'static, Result<(), PushError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(PushError::Rejected("DeviceNotRegistered".into())) })
    }
}

async fn app_with(push: Arc<dyn PushGateway>) -> (Router, SharedState) {
    let state = AppState::new(AppConfig::default(), push);
    state.set_ride_store(Arc::new(MemoryRideStore::new())).await;
    (router(state.clone()), state)
}

async fn app() -> Router {
    app_with(Arc::new(DisabledPushGateway)).await.0
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    caller: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user, role)) = caller {
        builder = builder
            .header(USER_ID_HEADER, user)
            .header(USER_ROLE_HEADER, role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn passenger(id: &str) -> Option<(&str, &str)> {
    Some((id, "passenger"))
}

fn rider(id: &str) -> Option<(&str, &str)> {
    Some((id, "rider"))
}

async fn approved_rider(app: &Router, id: &str, name: &str) {
    let (status, _) = call(
        app,
        Method::PUT,
        "/profiles/me",
        rider(id),
        Some(json!({
            "name": name,
            "phone": "+233200000000",
            "vehicle": { "model": "Corolla", "plate_number": "GR-1234-22", "color": "Silver" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        app,
        Method::POST,
        "/profiles/me/onboarding",
        rider(id),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn passenger_profile(app: &Router, id: &str, name: &str) {
    let (status, _) = call(
        app,
        Method::PUT,
        "/profiles/me",
        passenger(id),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn request_ride(app: &Router, passenger_id: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/rides",
        passenger(passenger_id),
        Some(json!({
            "pickup": { "lat": 5.6037, "lng": -0.187, "address": "Osu, Accra" },
            "dropoff": "Kotoka International Airport",
            "fare": 45.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    body["id"].as_str().unwrap().to_owned()
}

async fn advance(app: &Router, ride: &str, caller: Option<(&str, &str)>, to: &str) -> StatusCode {
    call(
        app,
        Method::POST,
        &format!("/rides/{ride}/status"),
        caller,
        Some(json!({ "status": to })),
    )
    .await
    .0
}

#[tokio::test]
async fn full_ride_ends_rated_and_updates_rider_aggregate() {
    let app = app().await;
    approved_rider(&app, "r1", "Kojo").await;
    passenger_profile(&app, "p1", "Ama").await;
    let ride = request_ride(&app, "p1").await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/rides/{ride}/claim"),
        rider("r1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["rider_id"], "r1");
    assert_eq!(body["rider_info"]["vehicle"]["plate_number"], "GR-1234-22");
    assert!(body["accepted_at"].is_string());

    assert_eq!(advance(&app, &ride, rider("r1"), "picked_up").await, StatusCode::OK);
    assert_eq!(advance(&app, &ride, rider("r1"), "completed").await, StatusCode::OK);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/rides/{ride}/rating"),
        passenger("p1"),
        Some(json!({ "stars": 4, "feedback": "smooth drive" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ride"]["status"], "rated");
    assert_eq!(body["ride"]["passenger_rating"], 4);
    assert_eq!(body["rider_total_ratings"], 1);
    assert_eq!(body["rider_rating"], 4.0);

    let (_, inbox) = call(&app, Method::GET, "/notifications", passenger("p1"), None).await;
    let titles: Vec<_> = inbox
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["title"].as_str().unwrap().to_owned())
        .collect();
    assert!(titles.contains(&"Ride Accepted".to_owned()));
    assert!(titles.contains(&"Ride Completed".to_owned()));

    let (_, inbox) = call(&app, Method::GET, "/notifications", rider("r1"), None).await;
    assert_eq!(inbox[0]["type"], "new_rating");
    assert_eq!(inbox[0]["body"], "Ama rated you 4 stars");
}

#[tokio::test]
async fn passenger_cancellation_reaches_rider_with_reason() {
    let app = app().await;
    approved_rider(&app, "r1", "Kojo").await;
    let ride = request_ride(&app, "p1").await;
    call(&app, Method::POST, &format!("/rides/{ride}/claim"), rider("r1"), None).await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/rides/{ride}/cancel"),
        passenger("p1"),
        Some(json!({ "reason": "  changed my plans " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancelled_by"], "passenger");
    assert_eq!(body["cancellation_reason"], "changed my plans");

    let (_, inbox) = call(&app, Method::GET, "/notifications", rider("r1"), None).await;
    assert_eq!(inbox[0]["type"], "ride_cancelled");
    assert!(inbox[0]["body"].as_str().unwrap().contains("changed my plans"));
}

#[tokio::test]
async fn exactly_one_concurrent_claim_wins() {
    let app = app().await;
    let riders: Vec<String> = (0..8).map(|i| format!("rider-{i}")).collect();
    for id in &riders {
        approved_rider(&app, id, "Driver").await;
    }
    let ride = request_ride(&app, "p1").await;
    let uri = format!("/rides/{ride}/claim");

    let outcomes = join_all(
        riders
            .iter()
            .map(|id| call(&app, Method::POST, &uri, rider(id), None)),
    )
    .await;

    let winners: Vec<_> = outcomes
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .collect();
    assert_eq!(winners.len(), 1);
    for (status, body) in &outcomes {
        if *status != StatusCode::OK {
            assert_eq!(*status, StatusCode::CONFLICT);
            assert_eq!(body["status"], "accepted");
        }
    }

    let (_, current) = call(&app, Method::GET, &format!("/rides/{ride}"), passenger("p1"), None).await;
    assert_eq!(current["rider_id"], winners[0].1["rider_id"]);
}

#[tokio::test]
async fn terminal_rides_reject_every_transition() {
    let app = app().await;
    approved_rider(&app, "r1", "Kojo").await;
    let ride = request_ride(&app, "p1").await;
    call(
        &app,
        Method::POST,
        &format!("/rides/{ride}/cancel"),
        passenger("p1"),
        Some(json!({})),
    )
    .await;

    let (status, body) = call(&app, Method::POST, &format!("/rides/{ride}/claim"), rider("r1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "cancelled");

    assert_eq!(advance(&app, &ride, passenger("p1"), "cancelled").await, StatusCode::CONFLICT);
    assert_eq!(advance(&app, &ride, rider("r1"), "picked_up").await, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/rides/{ride}/rating"),
        passenger("p1"),
        Some(json!({ "stars": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, current) = call(&app, Method::GET, &format!("/rides/{ride}"), passenger("p1"), None).await;
    assert_eq!(current["status"], "cancelled");
    assert!(current.get("rider_id").is_none());
}

#[tokio::test]
async fn unapproved_riders_cannot_claim() {
    let app = app().await;
    let ride = request_ride(&app, "p1").await;
    call(
        &app,
        Method::PUT,
        "/profiles/me",
        rider("r1"),
        Some(json!({ "name": "Kojo" })),
    )
    .await;

    let (status, _) = call(&app, Method::POST, &format!("/rides/{ride}/claim"), rider("r1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn history_lists_only_the_callers_rides() {
    let app = app().await;
    request_ride(&app, "p1").await;
    request_ride(&app, "p1").await;
    request_ride(&app, "p2").await;

    let (status, body) = call(&app, Method::GET, "/rides/history", passenger("p1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let rides = body.as_array().unwrap();
    assert_eq!(rides.len(), 2);
    assert!(rides.iter().all(|ride| ride["passenger_id"] == "p1"));
}

#[tokio::test]
async fn missing_session_headers_are_unauthorized() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/rides/history", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["retryable"], false);

    let (status, _) = call(&app, Method::GET, "/notifications", Some(("p1", "driver")), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_pickup_is_rejected() {
    let app = app().await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/rides",
        passenger("p1"),
        Some(json!({ "pickup": "   ", "dropoff": "Airport" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn riders_cannot_request_rides() {
    let app = app().await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/rides",
        rider("r1"),
        Some(json!({ "pickup": "Osu", "dropoff": "Airport" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_push_does_not_fail_the_transition() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let (app, _state) = app_with(Arc::new(BrokenPushGateway {
        attempts: attempts.clone(),
    }))
    .await;
    approved_rider(&app, "r1", "Kojo").await;
    passenger_profile(&app, "p1", "Ama").await;
    let (status, _) = call(
        &app,
        Method::PUT,
        "/profiles/me/push-token",
        passenger("p1"),
        Some(json!({ "token": "ExponentPushToken[abc]" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let ride = request_ride(&app, "p1").await;
    let (status, _) = call(&app, Method::POST, &format!("/rides/{ride}/claim"), rider("r1"), None).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..50 {
        if attempts.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    let (_, inbox) = call(&app, Method::GET, "/notifications", passenger("p1"), None).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn inbox_can_be_marked_read_and_cleared() {
    let app = app().await;
    approved_rider(&app, "r1", "Kojo").await;
    let ride = request_ride(&app, "p1").await;
    call(&app, Method::POST, &format!("/rides/{ride}/claim"), rider("r1"), None).await;

    let (_, inbox) = call(&app, Method::GET, "/notifications", passenger("p1"), None).await;
    let id = inbox[0]["id"].as_str().unwrap().to_owned();
    assert_eq!(inbox[0]["read"], false);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/notifications/{id}/read"),
        passenger("p1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/notifications/{id}/read"),
        rider("r1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, cleared) = call(&app, Method::DELETE, "/notifications", passenger("p1"), None).await;
    assert_eq!(cleared["removed"], 1);
}

#[tokio::test]
async fn healthcheck_reports_degraded_without_store() {
    let state = AppState::new(AppConfig::default(), Arc::new(DisabledPushGateway));
    let app = router(state);
    let (status, body) = call(&app, Method::GET, "/healthcheck", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");

    let (status, _) = call(&app, Method::GET, "/rides/history", passenger("p1"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
