use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use warp::http::StatusCode;

use matter_dynamic_bridge::{
    routes, BridgeConfig, BridgeController, BridgeDirectory, BridgeState, InMemoryEngine,
    PrometheusReporter, SettlePolicy,
};

fn settle() -> SettlePolicy {
    SettlePolicy::new(
        Duration::from_millis(5),
        Duration::from_millis(20),
        Duration::from_millis(20),
        Duration::from_millis(5),
    )
    .unwrap()
}

async fn bridge(engine: &Arc<InMemoryEngine>, id: &str, expected: &[&str]) -> Arc<BridgeController> {
    let bridge = BridgeController::new(
        BridgeConfig::new(id),
        engine.clone(),
        settle(),
        Arc::new(PrometheusReporter::new()),
    );
    for device in expected {
        bridge.expect_device(*device);
    }
    bridge.create().await.unwrap();
    bridge
}

async fn wait_online(bridge: &BridgeController) {
    for _ in 0..200 {
        if bridge.state() == BridgeState::Online {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bridge {} never came online", bridge.id());
}

fn json_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_commissioning_reports_pairing_codes() {
    let engine = Arc::new(InMemoryEngine::new());
    let directory = BridgeDirectory::new();
    directory.insert(bridge(&engine, "br-1", &[]).await);
    let api = routes(directory);

    let response = warp::test::request()
        .path("/_matterbridge/commissioning/br-1")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.body());
    assert_eq!(body["state"], "ready");
    assert!(body["qrPairingCode"].as_str().unwrap().starts_with("MT:"));
    assert_eq!(body["manualPairingCode"].as_str().unwrap().len(), 11);

    let response = warp::test::request()
        .path("/_matterbridge/commissioning/unknown")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_commissioned_bridge_hides_codes() {
    let engine = Arc::new(InMemoryEngine::new());
    let directory = BridgeDirectory::new();
    directory.insert(bridge(&engine, "br-2", &[]).await);
    engine.hub("br2").unwrap().commission();

    let response = warp::test::request()
        .path("/_matterbridge/commissioning/br-2")
        .reply(&routes(directory))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response.body()),
        serde_json::json!({"state": "commissioned"})
    );
}

#[tokio::test]
async fn test_reopen_commissioning_window() {
    let engine = Arc::new(InMemoryEngine::new());
    let directory = BridgeDirectory::new();
    let online = bridge(&engine, "br-3", &[]).await;
    wait_online(&online).await;
    directory.insert(online);
    engine.hub("br3").unwrap().commission();
    let api = routes(directory);

    let response = warp::test::request()
        .path("/_matterbridge/reopen/br-3")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response.body())["state"], "ready");

    let response = warp::test::request()
        .path("/_matterbridge/commissioning/br-3")
        .reply(&api)
        .await;
    assert_eq!(json_body(response.body())["state"], "ready");

    let response = warp::test::request()
        .path("/_matterbridge/reopen/missing")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reopen_before_start_is_unavailable() {
    let engine = Arc::new(InMemoryEngine::new());
    let directory = BridgeDirectory::new();
    // Never started while a device is still pending
    let waiting = bridge(&engine, "br-4", &["never-shows"]).await;
    assert_eq!(waiting.state(), BridgeState::Ready);
    directory.insert(waiting);

    let response = warp::test::request()
        .path("/_matterbridge/reopen/br-4")
        .reply(&routes(directory))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_devices_lists_pending_and_state() {
    let engine = Arc::new(InMemoryEngine::new());
    let directory = BridgeDirectory::new();
    directory.insert(bridge(&engine, "br-5", &["lamp-1", "lamp-2"]).await);

    let response = warp::test::request()
        .path("/_matterbridge/devices/br-5")
        .reply(&routes(directory))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.body());
    assert_eq!(body["bridge"], "br-5");
    assert_eq!(body["state"], "READY");
    assert_eq!(body["pending"], serde_json::json!(["lamp-1", "lamp-2"]));
    assert_eq!(body["devices"], serde_json::json!([]));
}

#[tokio::test]
async fn test_interfaces_is_a_json_list() {
    let response = warp::test::request()
        .path("/_matterbridge/interfaces")
        .reply(&routes(BridgeDirectory::new()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response.body()).is_array());
}

#[tokio::test]
async fn test_health_and_liveness() {
    let api = routes(BridgeDirectory::new());

    let response = warp::test::request().path("/health").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.body());
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "matter-dynamic-bridge");

    let response = warp::test::request().path("/livez").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"OK");
}

#[tokio::test]
async fn test_readiness_waits_for_every_bridge() {
    let engine = Arc::new(InMemoryEngine::new());
    let directory = BridgeDirectory::new();
    let online = bridge(&engine, "br-6", &[]).await;
    wait_online(&online).await;
    directory.insert(online);
    let api = routes(directory.clone());

    let response = warp::test::request().path("/readyz").reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response.body())["status"], "ready");

    let waiting = BridgeController::new(
        BridgeConfig::new("br-7").with_port(5541).unwrap(),
        engine.clone(),
        settle(),
        Arc::new(PrometheusReporter::new()),
    );
    waiting.expect_device("late");
    waiting.create().await.unwrap();
    directory.insert(waiting);

    let response = warp::test::request().path("/readyz").reply(&api).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response.body())["status"], "starting");
}

#[tokio::test]
async fn test_metrics_exposition() {
    let _ = PrometheusReporter::init_metrics();
    let response = warp::test::request()
        .path("/metrics")
        .reply(&routes(BridgeDirectory::new()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}
