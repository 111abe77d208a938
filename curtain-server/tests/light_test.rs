use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::mock_app::MockApp;

#[tokio::test]
async fn test_current_light_before_any_reading() {
    let app = MockApp::new().await;

    let (status, body) = app.get("/api/v1/light/current").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], json!(null));
    assert_eq!(body["unit"], json!("analog (0-1023)"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_readings_flow_into_history() {
    let app = MockApp::connected().await;

    app.device.push_line("LIGHT:612");
    app.device.push_line("LIGHT:388");
    app.wait_until(|service| service.latest_light().is_some_and(|s| s.raw_value == 388))
        .await;

    let (status, body) = app.get("/api/v1/light/current").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], json!(388));

    let history = app.wait_for_count("/api/v1/light/history?hours=1&limit=10", 2).await;
    let values: Vec<_> = history["readings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|reading| reading["raw_value"].as_i64().unwrap())
        .collect();
    assert!(values.contains(&612));
    assert!(values.contains(&388));

    let (status, body) = app.get("/api/v1/light/statistics?hours=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"]["count"], json!(2));
    assert_eq!(body["statistics"]["average"], json!(500.0));
    assert_eq!(body["statistics"]["minimum"], json!(388));
    assert_eq!(body["statistics"]["maximum"], json!(612));
}

#[tokio::test]
async fn test_history_limit() {
    let app = MockApp::connected().await;

    for value in [100, 200, 300] {
        app.device.push_line(&format!("LIGHT:{value}"));
    }
    app.wait_for_count("/api/v1/light/history", 3).await;

    let (status, body) = app.get("/api/v1/light/history?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));
}

#[tokio::test]
async fn test_malformed_light_is_ignored() {
    let app = MockApp::connected().await;

    app.device.push_line("LIGHT:abc");
    app.device.push_line("LIGHT:42");
    app.wait_until(|service| service.latest_light().is_some()).await;

    assert_eq!(app.service.latest_light().unwrap().raw_value, 42);
}

#[tokio::test]
async fn test_oversized_hours_are_capped() {
    let app = MockApp::connected().await;
    app.device.push_line("LIGHT:250");
    app.wait_for_count("/api/v1/light/history", 1).await;

    let (status, body) = app.get("/api/v1/light/history?hours=200000000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(1));

    let (status, body) = app
        .get(&format!("/api/v1/light/statistics?hours={}", i64::MAX))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hours"], json!(24 * 365 * 10));
    assert_eq!(body["statistics"]["count"], json!(1));

    let (status, body) = app.get("/api/v1/light/history?hours=-3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(0));
}
