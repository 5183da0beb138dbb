#![allow(dead_code)]

pub mod mem_client;
pub mod ws_client;

use ajj_hub::{HandlerError, Hub, HubConfig, HubHandle, MethodError, RequestCtx};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct EchoParams {
    message: String,
}

#[derive(Debug, Serialize)]
struct EchoResult {
    echo: String,
}

#[derive(Debug, Deserialize)]
struct PublishParams {
    event: String,
    data: Value,
}

/// Instantiate a hub for testing.
pub fn test_hub(config: HubConfig) -> HubHandle {
    let mut hub = Hub::new().with_config(config);
    hub.register_event("ticks")
        .register_event("news")
        .register_method("ping", |_ctx: RequestCtx, _: ()| async {
            Ok::<_, MethodError>("pong")
        })
        .unwrap()
        .register_method("echo", |_ctx: RequestCtx, p: EchoParams| async move {
            Ok::<_, MethodError>(EchoResult { echo: p.message })
        })
        .unwrap()
        .register_method("subscribe", |ctx: RequestCtx, event: String| async move {
            ctx.subscribe(&event).await?;
            Ok::<_, MethodError>(true)
        })
        .unwrap()
        .register_method("unsubscribe", |ctx: RequestCtx, event: String| async move {
            ctx.unsubscribe(&event).await;
            Ok::<_, MethodError>(true)
        })
        .unwrap()
        .register_method("publish", |ctx: RequestCtx, p: PublishParams| async move {
            ctx.publish_event(p.event, p.data).await?;
            Ok::<_, MethodError>(())
        })
        .unwrap()
        .register_method("whoami", |ctx: RequestCtx, _: ()| async move {
            let id = ctx.client().map(|c| c.id().to_string());
            Ok::<_, MethodError>(id)
        })
        .unwrap()
        .register_method("notify_me", |ctx: RequestCtx, _: ()| async move {
            ctx.notify("direct", "hello").await?;
            Ok::<_, MethodError>(())
        })
        .unwrap()
        .register_method("fail", |_ctx: RequestCtx, _: ()| async {
            Err::<(), _>(HandlerError::new(-32001, "custom failure"))
        })
        .unwrap()
        .register_method("bad_code", |_ctx: RequestCtx, _: ()| async {
            Err::<(), _>(HandlerError::new(7, "secret detail"))
        })
        .unwrap()
        .register_method("sleep", |_ctx: RequestCtx, ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, MethodError>(ms)
        })
        .unwrap();
    hub.start()
}

/// Test clients
pub trait TestClient {
    /// Send a raw text frame.
    async fn send_raw(&mut self, frame: &str);

    /// Receive the next frame as JSON.
    async fn recv<D: serde::de::DeserializeOwned>(&mut self) -> D;

    fn next_id(&mut self) -> u64;

    /// Send a request, returning its id.
    async fn send<S: Serialize>(&mut self, method: &str, params: &S) -> u64 {
        let id = self.next_id();
        let frame = json!({"method": method, "params": params, "id": id});
        self.send_raw(&frame.to_string()).await;
        id
    }

    /// Send a request, and receive the next frame, which must be its
    /// response.
    async fn call<S: Serialize>(&mut self, method: &str, params: &S) -> Value {
        let id = self.send(method, params).await;
        let resp: Value = self.recv().await;
        assert_eq!(resp["id"], json!(id), "unexpected frame: {resp}");
        resp
    }
}

/// Protocol tests: responses, error codes, and malformed frames.
pub async fn basic_tests<T: TestClient>(client: &mut T) {
    client
        .send_raw(r#"{"method":"echo","params":{"message":"hi"},"id":7}"#)
        .await;
    let next: Value = client.recv().await;
    assert_eq!(next, json!({"result": {"echo": "hi"}, "id": 7}));

    client.send_raw(r#"{"method":"nope","id":1}"#).await;
    let next: Value = client.recv().await;
    assert_eq!(
        next,
        json!({"error": {"code": -32601, "message": "Method not found"}, "id": 1})
    );

    // Malformed JSON, and notifications, never produce output. The next frame
    // received is the response to the ping.
    client.send_raw(r#"{"method":"echo","id":"#).await;
    client.send_raw(r#"{"method":"fail"}"#).await;
    client.send_raw(r#"{"method":"nope","id":null}"#).await;
    client.send_raw(r#"{"method":"echo","params":3}"#).await;
    let next = client.call("ping", &()).await;
    assert_eq!(next["result"], json!("pong"));

    let next = client.call("fail", &()).await;
    assert_eq!(
        next["error"],
        json!({"code": -32001, "message": "custom failure"})
    );

    let next = client.call("bad_code", &()).await;
    assert_eq!(
        next["error"],
        json!({"code": -32603, "message": "Internal error"})
    );

    let next = client.call("echo", &5).await;
    assert_eq!(
        next["error"],
        json!({"code": -32602, "message": "Invalid params"})
    );

    client.send_raw(r#"{"method":5,"id":"abc"}"#).await;
    let next: Value = client.recv().await;
    assert_eq!(
        next,
        json!({"error": {"code": -32700, "message": "Parse error"}, "id": "abc"})
    );

    client.send_raw(r#"{"method":"","id":9}"#).await;
    let next: Value = client.recv().await;
    assert_eq!(next["error"]["code"], json!(-32600));
    assert_eq!(next["id"], json!(9));

    client.send_raw(r#"{"method":"ping","id":[1]}"#).await;
    let next: Value = client.recv().await;
    assert_eq!(next["error"]["code"], json!(-32600));
    assert_eq!(next["id"], Value::Null);

    // The notification is enqueued before the response.
    let id = client.send("notify_me", &()).await;
    let next: Value = client.recv().await;
    assert_eq!(next, json!({"event": "direct", "data": "hello"}));
    let next: Value = client.recv().await;
    assert_eq!(next, json!({"result": null, "id": id}));
}

/// Subscription tests. The client must be the only one connected to the hub.
pub async fn subscription_tests<T: TestClient>(client: &mut T, hub: &HubHandle) {
    let next = client.call("subscribe", &"nope").await;
    assert_eq!(next["error"]["code"], json!(-32603));
    assert_eq!(next["error"]["message"], json!("unknown event: nope"));

    let next = client.call("subscribe", &"ticks").await;
    assert_eq!(next["result"], json!(true));
    let next = client.call("subscribe", &"ticks").await;
    assert_eq!(next["result"], json!(true));
    assert_eq!(hub.subscriber_count("ticks").await.unwrap(), 1);

    hub.publish_event("ticks", json!({"n": 1})).await.unwrap();
    let next: Value = client.recv().await;
    assert_eq!(next, json!({"event": "ticks", "data": {"n": 1}}));

    // A duplicate would have been enqueued by the same broadcast, ahead of
    // this response.
    let next = client.call("ping", &()).await;
    assert_eq!(next["result"], json!("pong"));

    // Publishing from a handler reaches the publisher too.
    client
        .send("publish", &json!({"event": "ticks", "data": 2}))
        .await;
    let mut frames: Vec<Value> = vec![client.recv().await, client.recv().await];
    frames.sort_by_key(|f| f.get("event").is_none());
    assert_eq!(frames[0], json!({"event": "ticks", "data": 2}));
    assert_eq!(frames[1]["result"], Value::Null);

    let next = client.call("unsubscribe", &"ticks").await;
    assert_eq!(next["result"], json!(true));
    assert_eq!(hub.subscriber_count("ticks").await.unwrap(), 0);

    hub.publish_event("ticks", json!({"n": 3})).await.unwrap();
    let next = client.call("ping", &()).await;
    assert_eq!(next["result"], json!("pong"));
}

/// Poll until `f` returns true, or panic after a few seconds.
pub async fn eventually<F, Fut>(mut f: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if f().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
