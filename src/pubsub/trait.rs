use crate::{
    pubsub::{shared::ListenerTask, ServerShutdown},
    ClientId, HubConfig, HubHandle,
};
use bytes::Bytes;
use serde_json::value::RawValue;
use std::{future::Future, net::SocketAddr};
use tokio_stream::Stream;

/// Configuration objects for connecting a [`Listener`].
///
/// This object is intended to capture all connection-related configuration and
/// setup, and output only the configured [`Listener`]. This allows it to
/// configure (e.g.) authentication or other connection-oriented policies,
/// without leaking logic into the hub.
///
/// ## Implementer's guide
///
/// Implementing this trait requires either using an existing [`Listener`]
/// or implementing the [`Listener`], [`FrameSink`], and [`FrameStream`]
/// manually. Generally, we recommend re-using the websocket [`Listener`].
///
/// The listener SHOULD enforce [`HubConfig::max_message_size`] at the
/// transport layer, so that oversized frames are rejected before they are
/// buffered in full.
pub trait Connect: Send + Sync + Sized {
    /// The listener type produced by the connect object.
    type Listener: Listener;

    /// The error type for instantiating a [`Listener`].
    type Error: core::error::Error + 'static;

    /// Create the listener.
    fn make_listener(
        self,
        config: HubConfig,
    ) -> impl Future<Output = Result<Self::Listener, Self::Error>> + Send;

    /// Instantiate and run a task to accept connections, returning a shutdown
    /// signal. Accepted connections are attached to the hub.
    ///
    /// We do not recommend overriding this method. Doing so will opt out of
    /// the library's task system. Users overriding this method must manually
    /// handle connection tasks.
    fn serve(
        self,
        hub: &HubHandle,
    ) -> impl Future<Output = Result<ServerShutdown, Self::Error>> + Send {
        let hub = hub.clone();
        async move {
            let tasks = hub.tasks().child();
            let listener = self.make_listener(*hub.config()).await?;

            ListenerTask {
                listener,
                hub,
                tasks: tasks.clone(),
            }
            .spawn();
            Ok(tasks.into())
        }
    }
}

/// An accepted connection, split into its halves.
#[derive(Debug)]
pub struct Connection<Si, St> {
    /// The outbound half.
    pub sink: Si,
    /// The inbound half.
    pub stream: St,
    /// The identity supplied by the peer during the handshake, if any.
    pub client_id: Option<ClientId>,
    /// The peer address, if known.
    pub remote_addr: Option<SocketAddr>,
}

/// A [`Listener`] accepts incoming connections and produces [`FrameSink`] and
/// [`FrameStream`] objects.
///
/// Typically this is done by producing a combined object with a [`Stream`] and
/// a [`Sink`], then using [`StreamExt::split`], however this trait allows for
/// more complex implementations.
///
/// [`Sink`]: futures_util::sink::Sink
/// [`StreamExt::split`]: futures_util::stream::StreamExt::split
pub trait Listener: Send + 'static {
    /// The sink type produced by the listener.
    type Sink: FrameSink;
    /// The stream type produced by the listener.
    type Stream: FrameStream;
    /// The error type for the listener.
    type Error: core::error::Error;

    /// Accept an inbound connection, complete any handshake, and split it.
    fn accept(
        &self,
    ) -> impl Future<Output = Result<Connection<Self::Sink, Self::Stream>, Self::Error>> + Send;
}

/// A sink that accepts JSON text frames.
pub trait FrameSink: Send + 'static {
    /// Error type for the sink.
    type Error: core::error::Error + 'static;

    /// Send json to the sink, as one text frame.
    fn send_json(&mut self, json: &RawValue)
        -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the transport. Called once, when the write pump exits.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async { Ok(()) }
    }
}

impl FrameSink for tokio::sync::mpsc::Sender<Box<RawValue>> {
    type Error = tokio::sync::mpsc::error::SendError<Box<RawValue>>;

    async fn send_json(&mut self, json: &RawValue) -> Result<(), Self::Error> {
        self.send(json.to_owned()).await
    }
}

/// An inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text frame. Expected to hold one request envelope.
    Text(Bytes),
    /// A binary frame. Never dispatched.
    Binary(Bytes),
}

impl InboundFrame {
    /// Create a text frame.
    pub fn text(text: impl Into<Bytes>) -> Self {
        Self::Text(text.into())
    }

    /// The frame payload.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Text(bytes) | Self::Binary(bytes) => bytes,
        }
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload().len()
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }
}

/// A stream of [`InboundFrame`]s. The stream ending means the peer has gone
/// away.
pub trait FrameStream: Stream<Item = InboundFrame> + Send + Unpin + 'static {}

impl<T> FrameStream for T where T: Stream<Item = InboundFrame> + Send + Unpin + 'static {}
