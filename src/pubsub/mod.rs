//! Pubsub serving utils for a [`Hub`].
//!
//! This module provides the transport layer: traits describing persistent
//! duplex connections, a built-in websocket server, and an [`axum`] handler.
//!
//! ## Usage
//!
//! Typically users want to use a [`Connect`] implementor to create a server
//! using [`Connect::serve`]. This will create a [`Listener`]. [`Listener`]s
//! accept client connections, and attach each to the hub.
//!
//! [`Connect`] is implemented for [`SocketAddr`] and [`TcpListener`], both
//! producing a websocket [`WsListener`]. Connections may also be attached
//! directly with [`HubHandle::attach`], using any [`FrameSink`] and
//! [`FrameStream`]. An [`mpsc::Sender`] is a [`FrameSink`], so a connection
//! can be driven in-memory.
//!
//! ## Backpressure and buffer saturation
//!
//! Each client has a bounded outbound queue, holding both responses and event
//! notifications. Its size is set by
//! [`HubConfig::with_outbound_buffer_per_client`]. When a client stops reading:
//!
//! - Responses wait up to the send timeout for room, then are dropped and
//!   logged.
//! - Event notifications are never waited on. A broadcast skips any
//!   subscriber whose queue is full.
//!
//! Publishers are only ever held back by the hub's own publish queue.
//!
//! ## Internal Structure
//!
//! There are 4 kinds of task:
//! - `ListenerTask` - accepts new connections and attaches them to the hub.
//!   One per server.
//! - `ReadTask` - reads frames from a connection, and spawns a task for each
//!   request. One per connection.
//! - `WriteTask` - drains the outbound queue into the connection. One per
//!   connection.
//! - `Coordinator` - owns the client registry and subscription index. One per
//!   hub.
//!
//! [`Hub`]: crate::Hub
//! [`HubHandle::attach`]: crate::HubHandle::attach
//! [`HubConfig::with_outbound_buffer_per_client`]: crate::HubConfig::with_outbound_buffer_per_client
//! [`SocketAddr`]: std::net::SocketAddr
//! [`TcpListener`]: tokio::net::TcpListener
//! [`mpsc::Sender`]: tokio::sync::mpsc::Sender

mod identity;
pub use identity::{CLIENT_ID_HEADER, CLIENT_ID_QUERY_PARAM};

mod shared;

mod shutdown;
pub use shutdown::ServerShutdown;

mod r#trait;
pub use r#trait::{Connect, Connection, FrameSink, FrameStream, InboundFrame, Listener};

#[cfg(feature = "ws")]
mod ws;
#[cfg(feature = "ws")]
pub use ws::{WsFrameStream, WsListener};

#[cfg(feature = "axum")]
mod axum;
#[cfg(feature = "axum")]
pub use axum::{hub_websocket, HubWsCfg};
