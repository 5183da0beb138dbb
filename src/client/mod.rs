//! Per-connection client actors.
//!
//! Each connection is served by a [`Client`] handle and two pump tasks:
//!
//! - The read pump reads frames from the transport, parses them, and spawns a
//!   task per request on the client's [`TaskSet`].
//! - The write pump drains the client's bounded outbound queue into the
//!   transport, bounding each write by the hub's write timeout.
//!
//! Responses and event notifications share the outbound queue, so the
//! outbound order for one client is the order in which messages were
//! enqueued. Responses to concurrent requests may be enqueued out of
//! submission order.

mod dispatch;

mod tasks;
pub(crate) use tasks::{ReadTask, WriteTask};

use crate::{
    collections::{Counter, SyncMap},
    ClientId, ConnectionId, SendError, TaskSet,
};
use serde_json::value::RawValue;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TrySendError},
};
use tokio_util::sync::WaitForCancellationFuture;

/// The lifecycle state of a [`Client`].
///
/// Transitions are one-directional: `Created -> Active -> Closing -> Closed`.
/// A client may skip `Active` if it is cancelled before its pumps start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ClientState {
    /// The connection has been accepted, but the pumps are not yet running.
    Created = 0,
    /// Both pumps are running.
    Active = 1,
    /// The lifecycle has been cancelled. Pumps may still be draining.
    Closing = 2,
    /// Both pumps have exited and the hub has unregistered the client.
    Closed = 3,
}

impl ClientState {
    const fn from_u8(n: u8) -> Self {
        match n {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Parties that must finish before a client is `Closed`: the read pump, the
/// write pump, and the coordinator's unregister.
const CLOSE_STEPS: u64 = 3;

/// Lifecycle of one connection. Shared by the [`Client`] handles and the
/// write pump. The write pump does not hold a [`Client`], so that the
/// outbound queue closes once every sender is gone.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    tasks: TaskSet,
    state: AtomicU8,
    remaining: Counter,
    unregistered: AtomicBool,
}

impl Lifecycle {
    fn new(tasks: TaskSet) -> Self {
        Self {
            tasks,
            state: AtomicU8::new(ClientState::Created as u8),
            remaining: Counter::new(CLOSE_STEPS),
            unregistered: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn advance(&self, to: ClientState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }

    pub(crate) fn activate(&self) {
        // Never moves backwards, so a client cancelled before activation stays
        // closing.
        self.advance(ClientState::Active);
    }

    pub(crate) fn cancel(&self) {
        self.advance(ClientState::Closing);
        self.tasks.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.tasks.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.tasks.cancelled()
    }

    pub(crate) const fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// Record that one of the closing parties has finished.
    pub(crate) fn finish_step(&self) {
        if self.remaining.decr() == 0 {
            self.state
                .store(ClientState::Closed as u8, Ordering::Release);
        }
    }

    /// Record that the client has been removed from the hub. Only the first
    /// call counts.
    pub(crate) fn mark_unregistered(&self) {
        if !self.unregistered.swap(true, Ordering::AcqRel) {
            self.finish_step();
        }
    }
}

struct ClientInner {
    id: ClientId,
    conn_id: ConnectionId,
    remote_addr: Option<SocketAddr>,
    outbound: mpsc::Sender<Arc<RawValue>>,
    lifecycle: Arc<Lifecycle>,
    in_flight: Counter,
    metadata: SyncMap<String, serde_json::Value>,
    send_timeout: Duration,
}

/// A handle to a connected client.
///
/// Handles are cheap to clone, and compare equal when they refer to the same
/// connection. The hub holds handles for registered clients, and request
/// handlers reach the calling client via [`RequestCtx::client`].
///
/// [`RequestCtx::client`]: crate::RequestCtx::client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("conn_id", &self.inner.conn_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        self.inner.conn_id == other.inner.conn_id
    }
}

impl Eq for Client {}

impl Client {
    /// Create a client, returning it and the receiving end of its outbound
    /// queue.
    pub(crate) fn new(
        id: ClientId,
        conn_id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        tasks: TaskSet,
        outbound_buffer: usize,
        send_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Arc<RawValue>>) {
        let (outbound, rx) = mpsc::channel(outbound_buffer.max(1));
        let inner = ClientInner {
            id,
            conn_id,
            remote_addr,
            outbound,
            lifecycle: Arc::new(Lifecycle::new(tasks)),
            in_flight: Counter::default(),
            metadata: SyncMap::new(),
            send_timeout,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// The client's display identity.
    pub fn id(&self) -> &ClientId {
        &self.inner.id
    }

    /// The hub-unique connection id.
    pub fn conn_id(&self) -> ConnectionId {
        self.inner.conn_id
    }

    /// The peer address, if the transport provided one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.inner.lifecycle.state()
    }

    /// Cancel the client's lifecycle. This stops both pumps and every
    /// in-flight request. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.inner.lifecycle.cancel();
    }

    /// True if the lifecycle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.lifecycle.is_cancelled()
    }

    /// Get a future that resolves when the lifecycle is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.lifecycle.cancelled()
    }

    /// Number of requests currently being handled for this client.
    pub fn in_flight(&self) -> u64 {
        self.inner.in_flight.get()
    }

    /// Per-client metadata. Middleware may use this to tag a connection, for
    /// example with an authenticated principal.
    pub fn metadata(&self) -> &SyncMap<String, serde_json::Value> {
        &self.inner.metadata
    }

    /// Enqueue a message on the outbound queue, waiting up to the hub's send
    /// timeout for room.
    pub async fn send(&self, json: Arc<RawValue>) -> Result<(), SendError> {
        if self.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(SendError::Cancelled),
            res = self.inner.outbound.send_timeout(json, self.inner.send_timeout) => {
                res.map_err(|err| match err {
                    SendTimeoutError::Timeout(_) => SendError::Full,
                    SendTimeoutError::Closed(_) => SendError::Closed,
                })
            }
        }
    }

    /// Enqueue a message without waiting. Used for broadcasts, where a slow
    /// client must never hold up the others.
    pub fn try_enqueue(&self, json: Arc<RawValue>) -> Result<(), SendError> {
        self.inner.outbound.try_send(json).map_err(|err| match err {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    pub(crate) fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.inner.lifecycle
    }

    pub(crate) fn tasks(&self) -> &TaskSet {
        self.inner.lifecycle.tasks()
    }

    pub(crate) fn in_flight_counter(&self) -> &Counter {
        &self.inner.in_flight
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn client(buffer: usize, timeout: Duration) -> (Client, mpsc::Receiver<Arc<RawValue>>) {
        Client::new(
            ClientId::from("test"),
            ConnectionId::from(1),
            None,
            TaskSet::default(),
            buffer,
            timeout,
        )
    }

    fn json(s: &str) -> Arc<RawValue> {
        Arc::from(RawValue::from_string(s.to_owned()).unwrap())
    }

    #[tokio::test]
    async fn send_outcomes() {
        let (client, mut rx) = client(1, Duration::from_millis(20));

        client.send(json("1")).await.unwrap();
        assert_eq!(client.send(json("2")).await, Err(SendError::Full));
        assert_eq!(client.try_enqueue(json("3")), Err(SendError::Full));

        assert_eq!(rx.recv().await.unwrap().get(), "1");
        drop(rx);
        assert_eq!(client.send(json("4")).await, Err(SendError::Closed));
        assert_eq!(client.try_enqueue(json("5")), Err(SendError::Closed));

        client.cancel();
        assert_eq!(client.send(json("6")).await, Err(SendError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_unblocks_send() {
        let (client, _rx) = client(1, Duration::from_secs(60));
        client.send(json("1")).await.unwrap();

        let c = client.clone();
        let waiting = tokio::spawn(async move { c.send(json("2")).await });
        tokio::task::yield_now().await;
        client.cancel();
        assert_eq!(waiting.await.unwrap(), Err(SendError::Cancelled));
    }

    #[test]
    fn lifecycle_is_one_directional() {
        let (client, _rx) = client(1, Duration::from_secs(1));
        let lifecycle = client.lifecycle();
        assert_eq!(client.state(), ClientState::Created);

        lifecycle.activate();
        assert_eq!(client.state(), ClientState::Active);

        client.cancel();
        client.cancel();
        assert_eq!(client.state(), ClientState::Closing);
        lifecycle.activate();
        assert_eq!(client.state(), ClientState::Closing);

        lifecycle.finish_step();
        lifecycle.mark_unregistered();
        lifecycle.mark_unregistered();
        assert_eq!(client.state(), ClientState::Closing);
        lifecycle.finish_step();
        assert_eq!(client.state(), ClientState::Closed);
    }
}
