mod common;
use common::{eventually, test_hub, ws_client::ws_client, TestClient};

use ajj_hub::{
    pubsub::{Connect, ServerShutdown},
    HubConfig, HubHandle,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn serve_ws(config: HubConfig) -> (HubHandle, ServerShutdown, String) {
    let hub = test_hub(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let server = listener.serve(&hub).await.unwrap();
    (hub, server, url)
}

#[tokio::test]
async fn basic_ws() {
    let (_hub, _server, url) = serve_ws(HubConfig::default()).await;
    let mut client = ws_client(&url, None).await;
    common::basic_tests(&mut client).await;
}

#[tokio::test]
async fn subscriptions_ws() {
    let (hub, _server, url) = serve_ws(HubConfig::default()).await;
    let mut client = ws_client(&url, None).await;
    common::subscription_tests(&mut client, &hub).await;
}

#[tokio::test]
async fn identity_ws() {
    let (_hub, _server, url) = serve_ws(HubConfig::default()).await;

    let mut client = ws_client(&url, Some("alice")).await;
    let next = client.call("whoami", &()).await;
    assert_eq!(next["result"], json!("alice"));

    let mut client = ws_client(&format!("{url}/?client_id=bob"), None).await;
    let next = client.call("whoami", &()).await;
    assert_eq!(next["result"], json!("bob"));

    let mut client = ws_client(&format!("{url}/?room=1&client_id=bob%40corp"), None).await;
    let next = client.call("whoami", &()).await;
    assert_eq!(next["result"], json!("bob@corp"));

    // Generated ids carry the peer address.
    let mut client = ws_client(&url, None).await;
    let next = client.call("whoami", &()).await;
    assert!(next["result"].as_str().unwrap().starts_with("127.0.0.1:"));
}

#[tokio::test]
async fn disconnect_unregisters_ws() {
    let (hub, _server, url) = serve_ws(HubConfig::default()).await;

    let mut client = ws_client(&url, None).await;
    client.call("subscribe", &"news").await;
    assert_eq!(hub.client_count().await.unwrap(), 1);
    assert_eq!(hub.subscriber_count("news").await.unwrap(), 1);

    drop(client);
    eventually(|| async { hub.client_count().await.unwrap() == 0 }).await;
    assert_eq!(hub.subscriber_count("news").await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_messages_close_the_connection() {
    let config = HubConfig::default().with_max_message_size(1024);
    let (_hub, _server, url) = serve_ws(config).await;

    let mut client = ws_client(&url, None).await;
    let frame = json!({"method": "echo", "params": {"message": "a".repeat(4096)}, "id": 1});
    client.send_raw(&frame.to_string()).await;
    assert!(client.closed_by_server().await);

    // Other connections are unaffected.
    let mut client = ws_client(&url, None).await;
    let next = client.call("ping", &()).await;
    assert_eq!(next["result"], json!("pong"));
}

#[tokio::test]
async fn server_shutdown_closes_connections() {
    let (hub, server, url) = serve_ws(HubConfig::default()).await;

    let mut client = ws_client(&url, None).await;
    client.call("ping", &()).await;

    server.shutdown().await;
    assert!(client.closed_by_server().await);
    assert!(!hub.is_shut_down());
    eventually(|| async { hub.client_count().await.unwrap() == 0 }).await;
}
