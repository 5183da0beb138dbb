mod common;
use common::{eventually, mem_client::mem_client, test_hub, TestClient};

use ajj_hub::{
    pubsub::{FrameSink, InboundFrame},
    ClientState, Hub, HubConfig, MethodArgs, MethodError, Middleware, RawValue, RequestCtx,
    Route,
};
use serde_json::{json, Value};
use std::{future::pending, io, time::Duration};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A sink whose writes never complete.
struct StalledSink;

impl FrameSink for StalledSink {
    type Error = io::Error;

    async fn send_json(&mut self, _json: &RawValue) -> Result<(), Self::Error> {
        pending().await
    }
}

/// Middleware that tags the calling connection and counts its calls.
fn tag_connection() -> Middleware {
    Middleware::new(|inner: Route| {
        Route::from_fn(move |args: MethodArgs| {
            let inner = inner.clone();
            async move {
                if let Some(client) = args.ctx().client() {
                    client
                        .metadata()
                        .insert_if_absent("role".to_owned(), json!("tester"));
                    client.metadata().with_mut(|m| {
                        let calls = m.entry("calls".to_owned()).or_insert(json!(0));
                        *calls = json!(calls.as_u64().unwrap_or(0) + 1);
                    });
                }
                inner.invoke(args).await
            }
        })
    })
}

#[tokio::test]
async fn basic_memory() {
    let hub = test_hub(HubConfig::default());
    let mut client = mem_client(&hub, None);
    common::basic_tests(&mut client).await;
}

#[tokio::test]
async fn subscriptions_memory() {
    let hub = test_hub(HubConfig::default());
    let mut client = mem_client(&hub, None);
    common::subscription_tests(&mut client, &hub).await;
}

#[tokio::test]
async fn identity() {
    let hub = test_hub(HubConfig::default());

    let mut alice = mem_client(&hub, Some("alice"));
    let next = alice.call("whoami", &()).await;
    assert_eq!(next["result"], json!("alice"));

    let mut anon = mem_client(&hub, None);
    let next = anon.call("whoami", &()).await;
    assert!(next["result"].as_str().unwrap().starts_with("client-"));
    assert_ne!(alice.client.conn_id(), anon.client.conn_id());
}

#[tokio::test]
async fn binary_frames_are_rejected() {
    let hub = test_hub(HubConfig::default());
    let mut client = mem_client(&hub, None);

    client
        .send_frame(InboundFrame::Binary(
            br#"{"method":"ping","id":11}"#.as_slice().into(),
        ))
        .await;
    let next: Value = client.recv().await;
    assert_eq!(next["id"], json!(11));
    assert_eq!(next["error"]["code"], json!(-32600));

    // Without a recoverable id, nothing is sent. The connection stays up.
    client
        .send_frame(InboundFrame::Binary(vec![0xde, 0xad].into()))
        .await;
    let next = client.call("ping", &()).await;
    assert_eq!(next["result"], json!("pong"));
}

#[tokio::test]
async fn disconnect_cleans_up() {
    let hub = test_hub(HubConfig::default());
    let mut a = mem_client(&hub, Some("a"));
    let mut b = mem_client(&hub, Some("b"));

    for client in [&mut a, &mut b] {
        let next = client.call("subscribe", &"ticks").await;
        assert_eq!(next["result"], json!(true));
    }
    assert_eq!(hub.client_count().await.unwrap(), 2);
    assert_eq!(hub.subscriber_count("ticks").await.unwrap(), 2);

    a.disconnect();
    eventually(|| async { hub.subscriber_count("ticks").await.unwrap() == 1 }).await;
    assert_eq!(hub.client_count().await.unwrap(), 1);
    eventually(|| async { a.client.state() == ClientState::Closed }).await;
    assert!(a.client.is_cancelled());

    hub.publish_event("ticks", 5).await.unwrap();
    let next: Value = b.recv().await;
    assert_eq!(next, json!({"event": "ticks", "data": 5}));
}

#[tokio::test]
async fn disconnect_cancels_in_flight_requests() {
    let hub = test_hub(HubConfig::default());
    let mut client = mem_client(&hub, None);

    client.send("sleep", &60_000).await;
    eventually(|| async { client.client.in_flight() == 1 }).await;

    client.disconnect();
    eventually(|| async { client.client.in_flight() == 0 }).await;
    eventually(|| async { client.client.state() == ClientState::Closed }).await;
}

#[tokio::test]
async fn requests_time_out() {
    let config = HubConfig::default().with_request_timeout(Duration::from_millis(50));
    let hub = test_hub(config);
    let mut client = mem_client(&hub, None);

    let next = client.call("sleep", &10_000).await;
    assert_eq!(
        next["error"],
        json!({"code": -32603, "message": "request timed out"})
    );

    // The connection survives the timeout.
    let next = client.call("sleep", &1).await;
    assert_eq!(next["result"], json!(1));
}

#[tokio::test]
async fn requests_run_concurrently() {
    let hub = test_hub(HubConfig::default());
    let mut client = mem_client(&hub, None);

    let slow = client.send("sleep", &500).await;
    let fast = client.call("ping", &()).await;
    assert_eq!(fast["result"], json!("pong"));

    let next: Value = client.recv().await;
    assert_eq!(next["id"], json!(slow));
}

#[tokio::test]
async fn concurrent_subscribes_make_one_entry() {
    let hub = test_hub(HubConfig::default());
    let mut client = mem_client(&hub, None);

    let subscribes = (0..16).map(|_| hub.subscribe(&client.client, "ticks"));
    for res in futures_util::future::join_all(subscribes).await {
        res.unwrap();
    }
    assert_eq!(hub.subscriber_count("ticks").await.unwrap(), 1);

    hub.publish_event("ticks", "once").await.unwrap();
    let next: Value = client.recv().await;
    assert_eq!(next, json!({"event": "ticks", "data": "once"}));
    let next = client.call("ping", &()).await;
    assert_eq!(next["result"], json!("pong"));
}

#[tokio::test]
async fn slow_subscriber_does_not_block_others() {
    let config = HubConfig::default().with_outbound_buffer_per_client(1);
    let hub = test_hub(config);

    // The slow client never reads its output.
    let slow = mem_client(&hub, Some("slow"));
    let mut fast = mem_client(&hub, Some("fast"));
    hub.subscribe(&slow.client, "ticks").await.unwrap();
    hub.subscribe(&fast.client, "ticks").await.unwrap();

    for n in 0..40 {
        hub.publish_event("ticks", n).await.unwrap();
        let next: Value = fast.recv().await;
        assert_eq!(next, json!({"event": "ticks", "data": n}));
    }

    // The slow client holds at most its queue, the frame being written, and
    // the channel behind its sink.
    let stats = hub.stats();
    eventually(|| async { stats.delivered() + stats.dropped() == 80 }).await;
    assert_eq!(stats.published(), 40);
    assert!(stats.dropped() >= 20, "dropped {}", stats.dropped());
    assert_eq!(slow.client.state(), ClientState::Active);
}

#[tokio::test]
async fn shutdown_closes_clients() {
    let hub = test_hub(HubConfig::default());
    let client = mem_client(&hub, None);

    hub.shutdown().await;
    assert!(hub.is_shut_down());
    assert_eq!(client.client.state(), ClientState::Closed);
    assert!(hub.client_count().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn middleware_tags_connection_metadata() {
    let mut hub = Hub::new();
    hub.register_method_with(
        "role",
        |ctx: RequestCtx, _: ()| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, MethodError>(ctx.client().and_then(|c| c.metadata().get("role")))
        },
        [tag_connection()],
    )
    .unwrap();
    let hub = hub.start();
    let mut client = mem_client(&hub, None);

    let mut ids = Vec::new();
    for _ in 0..12 {
        ids.push(client.send("role", &()).await);
    }
    for _ in 0..12 {
        let next: Value = client.recv().await;
        assert_eq!(next["result"], json!("tester"));
        let id = next["id"].as_u64().unwrap();
        ids.retain(|i| *i != id);
    }
    assert!(ids.is_empty());

    let metadata = client.client.metadata();
    assert_eq!(metadata.get("calls"), Some(json!(12)));
    assert_eq!(metadata.len(), 2);
}

#[tokio::test]
async fn publish_waits_for_room_in_the_event_queue() {
    let config = HubConfig::default().with_event_queue_size(1);
    let hub = test_hub(config);
    let mut client = mem_client(&hub, None);
    hub.subscribe(&client.client, "ticks").await.unwrap();

    // On this single-threaded runtime the coordinator only runs when the test
    // yields, so the first event fills the queue and the second must wait.
    hub.publish_event("ticks", 1).await.unwrap();
    let second = hub.publish_event("ticks", 2);
    tokio::pin!(second);
    assert!(futures_util::poll!(&mut second).is_pending());
    assert_eq!(hub.stats().published(), 0);

    second.await.unwrap();
    for n in 1..=2 {
        let next: Value = client.recv().await;
        assert_eq!(next, json!({"event": "ticks", "data": n}));
    }
    assert_eq!(hub.stats().published(), 2);
}

#[tokio::test]
async fn stalled_writes_close_the_client() {
    let config = HubConfig::default().with_write_timeout(Duration::from_millis(50));
    let hub = test_hub(config);

    let (frames, inbound) = mpsc::channel(4);
    let client = hub
        .attach(None, StalledSink, ReceiverStream::new(inbound))
        .unwrap();
    frames
        .send(InboundFrame::text(r#"{"method":"ping","id":1}"#.to_owned()))
        .await
        .unwrap();

    eventually(|| async { client.state() == ClientState::Closed }).await;
    assert!(client.is_cancelled());
    assert_eq!(hub.client_count().await.unwrap(), 0);
}
