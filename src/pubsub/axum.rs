//! WebSocket connection manager for [`axum`]
//!
//! How this works:
//! `axum` does not provide a connection pattern that allows us to implement
//! [`Listener`] or [`Connect`] directly. Instead, it uses a
//! [`WebSocketUpgrade`] to upgrade a connection to a WebSocket. We make a
//! [`HubWsCfg`] that will be the [`State`] for our handler, and the
//! [`hub_websocket`] handler attaches each upgraded socket to the hub.
//!
//! [`Listener`]: crate::pubsub::Listener
//! [`Connect`]: crate::pubsub::Connect

use crate::{
    pubsub::{
        identity::{resolve_client_id, CLIENT_ID_HEADER, CLIENT_ID_QUERY_PARAM},
        FrameSink, InboundFrame,
    },
    HubHandle,
};
use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use serde_json::value::RawValue;
use std::{
    collections::HashMap,
    pin::Pin,
    task::{ready, Context, Poll},
};
use tracing::debug;

pub(crate) type SendHalf = SplitSink<WebSocket, Message>;
pub(crate) type RecvHalf = SplitStream<WebSocket>;

/// Configuration for serving a hub with [`axum::extract::ws`].
///
/// This struct is used as the [`State`] for the [`hub_websocket`] handler.
/// The message size limit is taken from the hub's [`HubConfig`].
///
/// [`HubConfig`]: crate::HubConfig
#[derive(Debug, Clone)]
pub struct HubWsCfg {
    hub: HubHandle,
}

impl From<HubHandle> for HubWsCfg {
    fn from(hub: HubHandle) -> Self {
        Self::new(hub)
    }
}

impl HubWsCfg {
    /// Create a new [`HubWsCfg`] for a running hub.
    pub const fn new(hub: HubHandle) -> Self {
        Self { hub }
    }

    /// Get a reference to the hub.
    pub const fn hub(&self) -> &HubHandle {
        &self.hub
    }
}

/// Axum handler for WebSocket connections.
///
/// The client identity is read from the `X-Client-Id` header, or the
/// `client_id` query parameter.
///
/// # Examples
///
/// ```no_run
/// # #[cfg(feature = "axum")]
/// # {
/// use ajj_hub::{pubsub::{hub_websocket, HubWsCfg}, HubHandle};
///
/// # fn _main(hub: HubHandle) -> axum::Router<()> {
/// axum::Router::new()
///     .route("/ws", axum::routing::any(hub_websocket))
///     .with_state(HubWsCfg::new(hub))
/// # }}
/// ```
pub async fn hub_websocket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    State(cfg): State<HubWsCfg>,
) -> Response {
    let header = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok());
    let param = match query {
        Ok(Query(mut params)) => params.remove(CLIENT_ID_QUERY_PARAM),
        Err(err) => {
            debug!(%err, "ignoring malformed query string");
            None
        }
    };
    let client_id = resolve_client_id(header, param.as_deref());
    let max_message_size = cfg.hub.config().max_message_size();

    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| {
            let (sink, stream) = socket.split();
            if let Err(err) = cfg
                .hub
                .attach(client_id, sink, WsFrameStream::from(stream))
            {
                debug!(%err, "dropping upgraded connection");
            }
            async {}
        })
}

/// Simple stream adapter for extracting frames from a [`WebSocket`].
#[derive(Debug)]
struct WsFrameStream {
    inner: RecvHalf,
    complete: bool,
}

impl From<RecvHalf> for WsFrameStream {
    fn from(inner: RecvHalf) -> Self {
        Self {
            inner,
            complete: false,
        }
    }
}

impl WsFrameStream {
    /// Handle an incoming [`Message`]
    fn handle(&self, message: Message) -> Result<Option<InboundFrame>, &'static str> {
        match message {
            Message::Text(text) => Ok(Some(InboundFrame::Text(text.into()))),
            Message::Binary(bytes) => Ok(Some(InboundFrame::Binary(bytes))),
            Message::Close(Some(frame)) => {
                let s = "Received close frame with data";
                let reason = format!("{} ({})", frame.reason, frame.code);
                debug!(%reason, "{}", &s);
                Err(s)
            }
            Message::Close(None) => {
                let s = "WS client has gone away";
                debug!("{}", &s);
                Err(s)
            }
            _ => Ok(None),
        }
    }
}

impl Stream for WsFrameStream {
    type Item = InboundFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.complete {
                return Poll::Ready(None);
            }

            let msg = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(msg)) => msg,
                Some(Err(err)) => {
                    debug!(%err, "websocket read failed");
                    self.complete = true;
                    return Poll::Ready(None);
                }
                None => {
                    self.complete = true;
                    return Poll::Ready(None);
                }
            };

            match self.handle(msg) {
                Ok(Some(item)) => return Poll::Ready(Some(item)),
                Ok(None) => continue,
                Err(_) => self.complete = true,
            }
        }
    }
}

impl FrameSink for SendHalf {
    type Error = axum::Error;

    async fn send_json(&mut self, json: &RawValue) -> Result<(), Self::Error> {
        self.send(Message::text(json.get())).await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        SinkExt::close(self).await
    }
}
