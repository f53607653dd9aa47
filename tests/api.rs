// HTTP surface tests: health, scoreboard JSON and metrics exposition.

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use pwnts_collector::api::router;
use pwnts_collector::db::Database;
use pwnts_collector::metrics;
use pwnts_collector::registry::{register_agent, register_team};
use pwnts_collector::scoring::ScoringPolicy;
use uuid::Uuid;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_health() {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let (status, body) = get(router(db, ScoringPolicy::default()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "pwnts-collector");
}

#[tokio::test]
async fn test_scoreboard_json() {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let red = register_team(&db, "Red", "pw", 0).await.unwrap();
    register_team(&db, "Blue", "pw", 0).await.unwrap();
    let agent = Uuid::new_v4();
    register_agent(&db, &agent.to_string(), red.team_id, 0)
        .await
        .unwrap();
    let target = Ipv4Addr::new(10, 0, 0, 1);
    db.add_target(target, 100).await.unwrap();

    // a live checkin, stamped just now
    let now = chrono::Utc::now().timestamp();
    db.append_checkin_guarded(&agent, target, now, 59)
        .await
        .unwrap();

    let (status, body) = get(router(db, ScoringPolicy::default()), "/api/scoreboard").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["Red"]["pwnts"], 100);
    assert_eq!(json["Red"]["pwned_hosts"], 1);
    assert_eq!(json["Blue"]["pwnts"], 0);
    assert_eq!(json["Blue"]["pwned_hosts"], 0);
}

#[tokio::test]
async fn test_scoreboard_empty() {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let (status, body) = get(router(db, ScoringPolicy::default()), "/api/scoreboard").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({}));
}

#[tokio::test]
async fn test_metrics_exposition() {
    metrics::register_metrics();
    metrics::BEACONS_TOTAL.with_label_values(&["persisted"]).inc();

    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let (status, body) = get(router(db, ScoringPolicy::default()), "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("pwnts_beacons_total"));
}

#[tokio::test]
async fn test_unknown_route() {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let (status, _) = get(router(db, ScoringPolicy::default()), "/api/teams").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
