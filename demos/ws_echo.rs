use ajj_hub::{pubsub::Connect, Hub, HubConfig, MethodError, Middleware, RequestCtx};
use serde::Deserialize;
use std::{net::SocketAddr, time::Duration};

#[derive(Deserialize)]
struct Echo {
    message: String,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let port = std::env::args()
        .nth(1)
        .and_then(|src| src.parse().ok())
        .unwrap_or(8080u16);

    let mut hub = Hub::new().with_config(HubConfig::default().with_outbound_buffer_per_client(64));
    hub.register_event("ticks")
        .register_method_with(
            "echo",
            |_ctx: RequestCtx, p: Echo| async move { Ok::<_, MethodError>(p.message) },
            [Middleware::trace()],
        )?
        .register_method("subscribe", |ctx: RequestCtx, event: String| async move {
            ctx.subscribe(&event).await?;
            Ok::<_, MethodError>(true)
        })?
        .register_method("unsubscribe", |ctx: RequestCtx, event: String| async move {
            ctx.unsubscribe(&event).await;
            Ok::<_, MethodError>(true)
        })?;
    let hub = hub.start();

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let server = addr.serve(&hub).await?;
    tracing::info!(%addr, "listening for websocket connections");

    // Publish a tick every second.
    let ticker = hub.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        for n in 0u64.. {
            interval.tick().await;
            if ticker.publish_event("ticks", n).await.is_err() {
                break;
            }
        }
    });

    println!("use Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    server.shutdown().await;
    hub.shutdown().await;
    Ok(())
}
