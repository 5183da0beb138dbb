use ajj_hub::{
    pubsub::{hub_websocket, HubWsCfg},
    Hub, MethodError, RequestCtx,
};
use axum::http::{HeaderValue, Method};
use eyre::{ensure, Context};
use std::{future::IntoFuture, net::SocketAddr};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

fn make_cors(cors: Option<&str>) -> eyre::Result<CorsLayer> {
    let origins = match cors {
        None | Some("*") => AllowOrigin::any(),
        Some(cors) => {
            ensure!(
                !cors.split(',').any(|o| o == "*"),
                "Wildcard '*' is not allowed in CORS domains"
            );

            cors.split(',')
                .map(|domain| {
                    domain
                        .parse::<HeaderValue>()
                        .wrap_err_with(|| format!("Invalid CORS domain: {}", domain))
                })
                .collect::<Result<Vec<_>, _>>()?
                .into()
        }
    };

    Ok(CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(origins)
        .allow_headers(Any))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let cors = std::env::args().nth(1);
    let port = std::env::args()
        .nth(2)
        .and_then(|src| src.parse().ok())
        .unwrap_or(8080u16);

    let mut hub = Hub::new();
    hub.register_event("chat")
        .register_method("join", |ctx: RequestCtx, _: ()| async move {
            ctx.subscribe("chat").await?;
            Ok::<_, MethodError>(())
        })?
        .register_method("say", |ctx: RequestCtx, text: String| async move {
            let from = ctx.client().map(|c| c.id().to_string());
            ctx.publish_event("chat", serde_json::json!({"from": from, "text": text}))
                .await?;
            Ok::<_, MethodError>(())
        })?;
    let hub = hub.start();

    let router = axum::Router::new()
        .route("/ws", axum::routing::any(hub_websocket))
        .with_state(HubWsCfg::new(hub))
        .layer(make_cors(cors.as_deref())?);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening for WS on {}/ws", listener.local_addr()?);

    axum::serve(listener, router).into_future().await?;
    Ok(())
}
