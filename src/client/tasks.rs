use crate::{
    client::{dispatch, Lifecycle},
    pubsub::{FrameSink, FrameStream, InboundFrame},
    types::{Rejection, Request},
    Client, ClientId, ConnectionId, HubHandle,
};
use serde_json::value::RawValue;
use std::{
    fmt,
    sync::{atomic::AtomicU64, Arc},
    time::Duration,
};
use tokio::{select, sync::mpsc, time::timeout};
use tokio_stream::StreamExt;
use tracing::{debug, instrument, trace};

/// Task that reads frames from a connection, and spawns a task to handle each
/// request.
pub(crate) struct ReadTask<St> {
    pub(crate) client: Client,
    pub(crate) hub: HubHandle,
    pub(crate) stream: St,
}

impl<St> fmt::Debug for ReadTask<St> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadTask")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl<St: FrameStream> ReadTask<St> {
    /// Task future, spawned by [`HubHandle::attach`].
    ///
    /// This future is a simple loop, which reads frames from the stream and
    /// spawns a task for each request, so that requests are handled
    /// concurrently. Frames that fail to parse are rejected without stopping
    /// the loop. The loop ends when the stream ends or the client is
    /// cancelled. On the way out, the client is cancelled and unregistered.
    #[instrument(
        name = "ReadTask",
        skip(self),
        fields(client_id = %self.client.id(), conn_id = %self.client.conn_id())
    )]
    pub(crate) async fn task_future(self) {
        let ReadTask {
            client,
            hub,
            mut stream,
        } = self;

        let rx_msg_id = AtomicU64::new(0);

        loop {
            let frame = select! {
                biased;
                _ = client.cancelled() => {
                    debug!("lifecycle cancelled");
                    break;
                }
                frame = stream.next() => frame,
            };

            let Some(frame) = frame else {
                debug!("inbound stream has closed");
                break;
            };

            message_event!(@received, counter: rx_msg_id, bytes: frame.len(),);

            match frame {
                InboundFrame::Text(bytes) => match Request::parse(&bytes) {
                    Ok(req) => dispatch::spawn_request(&hub, &client, req),
                    Err(rejection) => dispatch::reject(&client, rejection),
                },
                InboundFrame::Binary(bytes) => {
                    dispatch::reject(&client, Rejection::binary(&bytes))
                }
            }
        }

        client.cancel();
        hub.unregister(&client);
        client.lifecycle().finish_step();
    }
}

/// The write task is responsible for writing JSON to the outbound
/// connection.
///
/// It holds the client's [`Lifecycle`], but not a [`Client`], so the outbound
/// queue closes once every [`Client`] handle is gone.
pub(crate) struct WriteTask<Si> {
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) client_id: ClientId,
    pub(crate) conn_id: ConnectionId,
    /// Dropping this receiver makes every enqueue fail with
    /// [`SendError::Closed`].
    ///
    /// [`SendError::Closed`]: crate::SendError::Closed
    pub(crate) outbound: mpsc::Receiver<Arc<RawValue>>,
    pub(crate) sink: Si,
    pub(crate) write_timeout: Duration,
}

impl<Si> fmt::Debug for WriteTask<Si> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTask")
            .field("client_id", &self.client_id)
            .field("conn_id", &self.conn_id)
            .finish_non_exhaustive()
    }
}

impl<Si: FrameSink> WriteTask<Si> {
    /// Task future, spawned by [`HubHandle::attach`].
    ///
    /// This is a simple loop that drains the outbound queue into the sink.
    /// It exits when the lifecycle is cancelled, when a write fails or times
    /// out, or when the queue has closed and been drained. On the way out,
    /// it cancels the lifecycle and closes the transport.
    #[instrument(
        name = "WriteTask",
        skip(self),
        fields(client_id = %self.client_id, conn_id = %self.conn_id)
    )]
    pub(crate) async fn task_future(self) {
        let WriteTask {
            lifecycle,
            mut outbound,
            mut sink,
            write_timeout,
            ..
        } = self;

        let tx_msg_id = AtomicU64::new(0);

        loop {
            let json = select! {
                biased;
                _ = lifecycle.cancelled() => {
                    debug!("lifecycle cancelled");
                    break;
                }
                json = outbound.recv() => json,
            };

            let Some(json) = json else {
                debug!("outbound queue has closed");
                break;
            };

            match timeout(write_timeout, sink.send_json(&json)).await {
                Ok(Ok(())) => {
                    message_event!(@sent, counter: tx_msg_id, bytes: json.get().len(),);
                }
                Ok(Err(err)) => {
                    debug!(%err, "failed to write frame");
                    break;
                }
                Err(_) => {
                    debug!(?write_timeout, "write timed out");
                    break;
                }
            }
        }

        lifecycle.cancel();
        outbound.close();
        match timeout(write_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => trace!(%err, "failed to close transport"),
            Err(_) => trace!("timed out closing transport"),
        }
        lifecycle.finish_step();
    }
}
