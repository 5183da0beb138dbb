use crate::{
    pubsub::{
        identity::{client_id_from_handshake, CLIENT_ID_HEADER},
        Connect, Connection, FrameSink, InboundFrame, Listener,
    },
    HubConfig,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use serde_json::value::RawValue;
use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    task::{ready, Context, Poll},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        protocol::{Message, WebSocketConfig},
    },
    WebSocketStream,
};
use tracing::{debug, debug_span, Instrument};

/// Sending half of a [`WebSocketStream`]
pub(crate) type SendHalf = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Receiving half of a [`WebSocketStream`].
pub(crate) type RecvHalf = SplitStream<WebSocketStream<TcpStream>>;

/// Simple stream adapter for extracting frames from a [`WebSocketStream`].
///
/// Control frames are skipped. The stream ends at the first close frame or
/// transport error, including a frame over the configured size limit.
#[derive(Debug)]
pub struct WsFrameStream {
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
                debug!(reason = %frame, "{}", &s);
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
    type Error = tokio_tungstenite::tungstenite::Error;

    async fn send_json(&mut self, json: &RawValue) -> Result<(), Self::Error> {
        self.send(Message::text(json.get())).await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        SinkExt::close(self).await
    }
}

/// A websocket [`Listener`] over TCP.
///
/// The handshake reads the client identity from the `X-Client-Id` header or
/// the `client_id` query parameter. Frames and messages over the configured
/// size limit are rejected by the websocket layer, and terminate that
/// connection.
#[derive(Debug)]
pub struct WsListener {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WsListener {
    /// Wrap a bound [`TcpListener`], limiting inbound messages to
    /// `max_message_size` bytes.
    pub fn new(listener: TcpListener, max_message_size: usize) -> Self {
        let config = WebSocketConfig::default()
            .max_message_size(Some(max_message_size))
            .max_frame_size(Some(max_message_size));
        Self { listener, config }
    }

    /// The local address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for WsListener {
    type Sink = SendHalf;

    type Stream = WsFrameStream;

    type Error = tokio_tungstenite::tungstenite::Error;

    async fn accept(&self) -> Result<Connection<Self::Sink, Self::Stream>, Self::Error> {
        let (stream, remote_addr) = self.listener.accept().await?;

        let span = debug_span!("ws connection", %remote_addr);

        let mut header = None;
        let mut query = None;
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            header = req
                .headers()
                .get(CLIENT_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            query = req.uri().query().map(str::to_owned);
            Ok(resp)
        };

        let ws_stream = accept_hdr_async_with_config(stream, callback, Some(self.config))
            .instrument(span)
            .await?;

        let (sink, recv) = ws_stream.split();

        Ok(Connection {
            sink,
            stream: recv.into(),
            client_id: client_id_from_handshake(header.as_deref(), query.as_deref()),
            remote_addr: Some(remote_addr),
        })
    }
}

impl Connect for SocketAddr {
    type Listener = WsListener;
    type Error = io::Error;

    async fn make_listener(self, config: HubConfig) -> Result<Self::Listener, Self::Error> {
        let listener = TcpListener::bind(self).await?;
        Ok(WsListener::new(listener, config.max_message_size()))
    }
}

impl Connect for TcpListener {
    type Listener = WsListener;
    type Error = io::Error;

    async fn make_listener(self, config: HubConfig) -> Result<Self::Listener, Self::Error> {
        Ok(WsListener::new(self, config.max_message_size()))
    }
}
