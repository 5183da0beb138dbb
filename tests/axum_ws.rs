#![cfg(all(feature = "ws", feature = "axum"))]

mod common;
use common::{test_hub, ws_client::ws_client, TestClient};

use ajj_hub::{
    pubsub::{hub_websocket, HubWsCfg},
    HubConfig, HubHandle,
};
use axum::routing::any;
use serde_json::json;

/// Serve the hub over WebSocket using Axum, returning the url.
async fn serve(hub: HubHandle) -> String {
    let axum_router = axum::Router::new()
        .route("/", any(hub_websocket))
        .with_state::<()>(HubWsCfg::new(hub));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, axum_router).await.unwrap() });
    url
}

#[tokio::test]
async fn test_ws() {
    let hub = test_hub(HubConfig::default());
    let url = serve(hub.clone()).await;

    let mut client = ws_client(&url, None).await;
    common::basic_tests(&mut client).await;
    common::subscription_tests(&mut client, &hub).await;
}

#[tokio::test]
async fn identity() {
    let hub = test_hub(HubConfig::default());
    let url = serve(hub).await;

    let mut client = ws_client(&url, Some("carol")).await;
    let next = client.call("whoami", &()).await;
    assert_eq!(next["result"], json!("carol"));

    let mut client = ws_client(&format!("{url}/?client_id=dave"), None).await;
    let next = client.call("whoami", &()).await;
    assert_eq!(next["result"], json!("dave"));

    let mut client = ws_client(&format!("{url}/?client_id=dave+smith%40corp"), None).await;
    let next = client.call("whoami", &()).await;
    assert_eq!(next["result"], json!("dave smith@corp"));
}
