//! ajj-hub: A connection-oriented messaging hub.
//!
//! Clients hold persistent duplex connections (websockets). Over a connection,
//! a client sends requests that are routed to typed method handlers, and
//! receives responses along with notifications for the events it subscribed
//! to. The hub is built around a single coordinator task, which owns the
//! client registry and subscription index.
//!
//! ## Basic usage
//!
//! The [`Hub`] type is used to register events and methods. Starting it
//! produces a [`HubHandle`], which is used to publish events and serve
//! connections.
//!
//! ```no_run
//! use ajj_hub::{Hub, MethodError, RequestCtx};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct EchoParams {
//!     message: String,
//! }
//!
//! #[derive(Serialize)]
//! struct EchoResult {
//!     echo: String,
//! }
//!
//! # async fn _main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut hub = Hub::new();
//! hub.register_event("ticks")
//!     .register_method("echo", |_ctx: RequestCtx, p: EchoParams| async move {
//!         Ok::<_, MethodError>(EchoResult { echo: p.message })
//!     })?
//!     // Handlers get a ctx, which can be used to manage subscriptions.
//!     .register_method("subscribe", |ctx: RequestCtx, event: String| async move {
//!         ctx.subscribe(&event).await?;
//!         Ok::<_, MethodError>(true)
//!     })?;
//!
//! let hub = hub.start();
//! hub.publish_event("ticks", 1u64).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Handlers
//!
//! Methods are routed via the [`Handler`] trait, which is blanket implemented
//! for async functions and closures of the form
//! `(RequestCtx, P) -> Result<R, E>`. Params are decoded into `P` before the
//! handler runs, and `R` is encoded afterwards. Handlers that need a specific
//! error code return a [`HandlerError`] with a code in
//! [`CUSTOM_ERROR_RANGE`].
//!
//! [`Middleware`] wraps handlers at registration time. Any
//! [`tower::Layer`] over [`Route`] may be used as middleware.
//!
//! See the [`Handler`] trait docs for more information.
//!
//! ## Wire format
//!
//! - Request: `{"method": string, "params"?: json, "id"?: string | number}`.
//!   Without an id, the request is a notification, and is never answered.
//! - Response: `{"result": json, "id": id}` or
//!   `{"error": {"code": int, "message": string}, "id": id}`.
//! - Event notification: `{"event": string, "data": json}`.
//!
//! ## Serving the hub
//!
//! The [`pubsub`] module provides implementations of the
//! [`Connect`](pubsub::Connect) trait for [`std::net::SocketAddr`] to create
//! simple websocket servers.
//!
//! ```no_run
//! # #[cfg(feature = "ws")]
//! # {
//! # use ajj_hub::{HubHandle, pubsub::Connect};
//! # async fn _main(hub: HubHandle) {
//! // Serve the hub over websockets on port 3000.
//! let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 3000));
//! // The shutdown object will stop the server when dropped.
//! let shutdown = addr.serve(&hub).await.unwrap();
//! # }}
//! ```
//!
//! When the `"axum"` feature flag is enabled, the
//! [`hub_websocket`](pubsub::hub_websocket) handler serves the hub from an
//! [`axum`] router.
//!
//! See the [`pubsub`] module documentation for more information.
//!
//! [`axum`]: https://docs.rs/axum/latest/axum/index.html

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
pub(crate) mod macros;

mod client;
pub use client::{Client, ClientState};

mod collections;
pub use collections::{Counter, CounterGuard, SyncMap};

mod config;
pub use config::{
    HubConfig, DEFAULT_EVENT_QUEUE_SIZE, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_OUTBOUND_BUFFER_PER_CLIENT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SEND_TIMEOUT,
    DEFAULT_WRITE_TIMEOUT,
};

mod error;
pub use error::{
    CallError, HandlerError, HubClosed, MethodError, NotifyError, PublishError,
    RegistrationError, SendError, SubscribeError,
};

mod hub;
pub use hub::{Hub, HubHandle, HubStats};

mod metrics;

mod primitives;
pub use primitives::{ClientId, ConnectionId, RpcObject, RpcRecv, RpcSend};

pub mod pubsub;

mod routes;
pub use routes::{Handler, MethodArgs, MethodInfo, Middleware, RequestCtx, Route, RouteFuture};

mod tasks;
pub(crate) use tasks::TaskSet;

mod types;
pub use types::{
    ErrorPayload, Rejection, Request, RequestError, CUSTOM_ERROR_RANGE, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};

/// Re-export of the `tower` crate, primarily to provide [`tower::Service`],
/// and [`tower::Layer`].
pub use tower;

/// Re-export of the `serde_json` crate, primarily to provide the `RawValue` type.
pub use serde_json::{self, value::RawValue};
