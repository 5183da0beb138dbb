//! The hub: method and event registration, and the running coordinator.

mod coordinator;
use coordinator::{Control, Coordinator, QueuedEvent};

use crate::{
    client::{ReadTask, WriteTask},
    collections::Counter,
    pubsub::{FrameSink, FrameStream},
    routes::{into_route, middleware_wrap, Method, MethodInfo, Methods},
    CallError, Client, ClientId, ConnectionId, Handler, HubClosed, HubConfig, Middleware,
    MethodArgs, PublishError, RegistrationError, RequestCtx, RpcRecv, RpcSend, SubscribeError,
    TaskSet,
};
use serde_json::value::RawValue;
use std::{
    collections::BTreeSet,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use tracing::debug;

/// Delivery statistics for event broadcasts.
///
/// Counts are cumulative over the life of the hub. They are also exported as
/// metrics.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub(crate) published: Counter,
    pub(crate) delivered: Counter,
    pub(crate) dropped: Counter,
}

impl HubStats {
    /// Events taken off the publish queue by the coordinator.
    pub fn published(&self) -> u64 {
        self.published.get()
    }

    /// Notifications enqueued onto subscriber outbound queues.
    pub fn delivered(&self) -> u64 {
        self.delivered.get()
    }

    /// Notifications dropped because a subscriber's outbound queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    fn record_delivery(&self, delivered: u64, dropped: u64) {
        self.delivered.add(delivered);
        self.dropped.add(dropped);
    }
}

/// A hub under construction.
///
/// Register methods and events, then call [`Hub::start`] to spawn the
/// coordinator and obtain a [`HubHandle`]. The method registry is frozen at
/// start. Events may also be registered later via
/// [`HubHandle::register_event`].
///
/// ```
/// use ajj_hub::{Hub, MethodError, RequestCtx};
///
/// # fn _main() -> Result<(), ajj_hub::RegistrationError> {
/// let mut hub = Hub::new();
/// hub.register_event("ticks")
///     .register_method("double", |_ctx: RequestCtx, n: u64| async move {
///         Ok::<_, MethodError>(n * 2)
///     })?
///     .register_method("subscribe", |ctx: RequestCtx, event: String| async move {
///         ctx.subscribe(&event).await?;
///         Ok::<_, MethodError>(true)
///     })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Hub {
    config: HubConfig,
    methods: Methods,
    events: BTreeSet<String>,
    handle: Option<Handle>,
}

impl Hub {
    /// Create an empty hub with the default [`HubConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hub configuration.
    pub fn with_config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the runtime handle on which the hub spawns its tasks. Defaults to
    /// the runtime that calls [`Hub::start`].
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Add an event name to the known events. Registering a name twice is a
    /// no-op.
    pub fn register_event(&mut self, name: impl Into<String>) -> &mut Self {
        self.events.insert(name.into());
        self
    }

    /// Register a method handler.
    ///
    /// Fails if the name is empty, longer than 80 bytes, or already
    /// registered. A failed registration leaves the hub unchanged.
    pub fn register_method<H, P, R>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<&mut Self, RegistrationError>
    where
        H: Handler<P, R>,
        P: RpcRecv,
        R: RpcSend + 'static,
    {
        self.register_method_with(name, handler, std::iter::empty())
    }

    /// Register a method handler wrapped in middleware. The first middleware
    /// listed is the outermost, and sees each call first.
    pub fn register_method_with<H, P, R>(
        &mut self,
        name: impl Into<String>,
        handler: H,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) -> Result<&mut Self, RegistrationError>
    where
        H: Handler<P, R>,
        P: RpcRecv,
        R: RpcSend + 'static,
    {
        let middlewares: Vec<_> = middlewares.into_iter().collect();
        let info = MethodInfo {
            name: name.into(),
            params: std::any::type_name::<P>(),
            result: std::any::type_name::<R>(),
            middleware: middlewares.len(),
        };
        let route = middleware_wrap(into_route(handler), &middlewares);
        self.methods.insert(Method::new(route, info))?;
        Ok(self)
    }

    /// Freeze the registry, spawn the coordinator, and return a handle to the
    /// running hub.
    ///
    /// ## Panics
    ///
    /// This will panic if called outside the context of a Tokio runtime, when
    /// no handle was set with [`Hub::with_handle`].
    pub fn start(self) -> HubHandle {
        let Self {
            config,
            methods,
            events,
            handle,
        } = self;

        let tasks = handle.map(TaskSet::with_handle).unwrap_or_default();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_size());
        let stats = HubStats::default();

        debug!(
            methods = methods.len(),
            events = events.len(),
            "starting hub"
        );

        let coordinator =
            Coordinator::new(control_rx, events_rx, tasks.clone(), stats.clone(), events);
        // The coordinator observes cancellation itself, so that it can
        // release registered clients on the way out.
        tasks.spawn_graceful(coordinator.task_future());

        HubHandle {
            inner: Arc::new(HubInner {
                config,
                methods,
                control: control_tx,
                events: events_tx,
                tasks,
                stats,
                next_conn_id: AtomicU64::new(0),
                next_client_seq: AtomicU64::new(0),
            }),
        }
    }
}

#[derive(Debug)]
struct HubInner {
    config: HubConfig,
    methods: Methods,
    control: mpsc::UnboundedSender<Control>,
    events: mpsc::Sender<QueuedEvent>,
    tasks: TaskSet,
    stats: HubStats,
    next_conn_id: AtomicU64,
    next_client_seq: AtomicU64,
}

/// A handle to a running hub. Cheap to clone.
///
/// The handle is used to publish events, manage subscriptions, make
/// in-process calls, and attach connections. Servers created with
/// [`Connect::serve`] and the axum [`hub_websocket`] handler attach their
/// connections through it.
///
/// [`Connect::serve`]: crate::pubsub::Connect::serve
/// [`hub_websocket`]: crate::pubsub::hub_websocket
#[derive(Debug, Clone)]
pub struct HubHandle {
    inner: Arc<HubInner>,
}

impl HubHandle {
    /// The hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Event delivery statistics.
    pub fn stats(&self) -> &HubStats {
        &self.inner.stats
    }

    /// Metadata for every registered method, sorted by name.
    pub fn methods(&self) -> Vec<MethodInfo> {
        self.inner.methods.infos()
    }

    pub(crate) fn tasks(&self) -> &TaskSet {
        &self.inner.tasks
    }

    fn control(&self, cmd: Control) -> Result<(), HubClosed> {
        self.inner.control.send(cmd).map_err(|_| HubClosed)
    }

    /// Send a query to the coordinator and wait for the answer.
    async fn query<T>(&self, f: impl FnOnce(oneshot::Sender<T>) -> Control) -> Result<T, HubClosed> {
        let (tx, rx) = oneshot::channel();
        self.control(f(tx))?;
        rx.await.map_err(|_| HubClosed)
    }

    /// The names of all known events, sorted.
    pub async fn events(&self) -> Result<Vec<String>, HubClosed> {
        self.query(Control::Events).await
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> Result<usize, HubClosed> {
        self.query(Control::ClientCount).await
    }

    /// Number of clients subscribed to an event.
    pub async fn subscriber_count(&self, event: &str) -> Result<usize, HubClosed> {
        let event = event.to_owned();
        self.query(|reply| Control::SubscriberCount { event, reply })
            .await
    }

    /// Add an event name to the known events. Subscriptions made after this
    /// returns will see the event.
    pub fn register_event(&self, name: impl Into<String>) -> Result<(), HubClosed> {
        self.control(Control::RegisterEvent(name.into()))
    }

    /// Subscribe a client to an event. Subscribing twice is a no-op.
    pub async fn subscribe(&self, client: &Client, event: &str) -> Result<(), SubscribeError> {
        let conn_id = client.conn_id();
        let event = event.to_owned();
        self.query(|reply| Control::Subscribe {
            conn_id,
            event,
            reply,
        })
        .await
        .map_err(|_| SubscribeError::HubClosed)?
    }

    /// Unsubscribe a client from an event. This is a no-op when the client is
    /// not subscribed, or the event is unknown.
    pub async fn unsubscribe(&self, client: &Client, event: &str) {
        let conn_id = client.conn_id();
        let event = event.to_owned();
        let _ = self
            .query(|reply| Control::Unsubscribe {
                conn_id,
                event,
                reply,
            })
            .await;
    }

    /// Publish an event to all of its subscribers.
    ///
    /// The data is serialized here, then queued for the coordinator. When the
    /// publish queue is full, this waits for room. Delivery to each
    /// subscriber is best-effort: a subscriber whose outbound queue is full
    /// misses the event.
    pub async fn publish_event<T: RpcSend>(
        &self,
        event: impl Into<String>,
        data: T,
    ) -> Result<(), PublishError> {
        let queued = QueuedEvent {
            name: event.into(),
            data: data.into_raw_value()?,
        };
        self.inner
            .events
            .send(queued)
            .await
            .map_err(|_| PublishError::HubClosed)
    }

    /// Invoke a method in-process with raw params. The call has no client.
    pub async fn call_raw(
        &self,
        method: &str,
        params: Option<Box<RawValue>>,
    ) -> Result<Box<RawValue>, CallError> {
        let ctx = RequestCtx::detached(self.clone(), Arc::from(method));
        self.invoke(ctx, params).await
    }

    /// Invoke a method in-process. The call has no client.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, CallError>
    where
        P: RpcSend,
        R: RpcRecv,
    {
        let params = params.into_raw_value().map_err(CallError::InvalidParams)?;
        let json = self.call_raw(method, Some(params)).await?;
        serde_json::from_str(json.get()).map_err(CallError::DeserializeResult)
    }

    /// Route a call to its method. The call resolves to
    /// [`CallError::Cancelled`] if the context is cancelled first.
    pub(crate) async fn invoke(
        &self,
        ctx: RequestCtx,
        params: Option<Box<RawValue>>,
    ) -> Result<Box<RawValue>, CallError> {
        let Some(method) = self.inner.methods.get(ctx.method()) else {
            return Err(CallError::MethodNotFound(ctx.method().to_owned()));
        };
        let route = method.route().clone();
        let token = ctx.token().clone();

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CallError::Cancelled),
            res = route.invoke(MethodArgs::new(ctx, params)) => res,
        }
    }

    /// Generate a display identity for a connection that did not supply one.
    pub(crate) fn generate_client_id(&self, remote_addr: Option<SocketAddr>) -> ClientId {
        let seq = self.inner.next_client_seq.fetch_add(1, Ordering::Relaxed);
        match remote_addr {
            Some(addr) => ClientId::from(format!("{addr}-{seq:x}")),
            None => ClientId::from(format!("client-{seq:x}")),
        }
    }

    /// Attach a connection to the hub.
    ///
    /// This registers a new [`Client`] with the coordinator and spawns its
    /// read and write pumps. Any [`FrameSink`] and [`FrameStream`] may be
    /// used, including an in-memory channel pair. When `id` is `None`, a
    /// display identity is generated.
    pub fn attach<Si, St>(
        &self,
        id: Option<ClientId>,
        sink: Si,
        stream: St,
    ) -> Result<Client, HubClosed>
    where
        Si: FrameSink,
        St: FrameStream,
    {
        self.attach_with(self.tasks(), id, None, sink, stream)
    }

    /// Attach a connection, with its tasks under `parent`.
    pub(crate) fn attach_with<Si, St>(
        &self,
        parent: &TaskSet,
        id: Option<ClientId>,
        remote_addr: Option<SocketAddr>,
        sink: Si,
        stream: St,
    ) -> Result<Client, HubClosed>
    where
        Si: FrameSink,
        St: FrameStream,
    {
        let conn_id = ConnectionId::from(self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let id = id.unwrap_or_else(|| self.generate_client_id(remote_addr));
        let config = self.config();

        let (client, outbound) = Client::new(
            id,
            conn_id,
            remote_addr,
            parent.child(),
            config.outbound_buffer_per_client(),
            config.send_timeout(),
        );

        // Registration is queued ahead of anything the read pump sends, so
        // the first request from the client always sees it registered.
        self.control(Control::Register(client.clone()))?;

        let write = WriteTask {
            lifecycle: client.lifecycle().clone(),
            client_id: client.id().clone(),
            conn_id,
            outbound,
            sink,
            write_timeout: config.write_timeout(),
        };
        let read = ReadTask {
            client: client.clone(),
            hub: self.clone(),
            stream,
        };

        // Pumps are tracked by the parent, and observe the client's token
        // themselves, so they run their cleanup after cancellation.
        parent.spawn_graceful(write.task_future());
        parent.spawn_graceful(read.task_future());
        client.lifecycle().activate();

        Ok(client)
    }

    /// Ask the coordinator to unregister a client. When the coordinator is
    /// gone, the client is released directly.
    pub(crate) fn unregister(&self, client: &Client) {
        if self.control(Control::Unregister(client.conn_id())).is_err() {
            client.lifecycle().mark_unregistered();
        }
    }

    /// True if the hub has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.inner.tasks.is_cancelled()
    }

    /// Shut down the hub. This cancels every attached client, every in-flight
    /// request, and the coordinator, then waits for the hub's tasks to exit.
    ///
    /// Servers created with [`Connect::serve`] are children of the hub, and
    /// are cancelled too. Their tasks are awaited through their own
    /// [`ServerShutdown`].
    ///
    /// [`Connect::serve`]: crate::pubsub::Connect::serve
    /// [`ServerShutdown`]: crate::pubsub::ServerShutdown
    pub async fn shutdown(&self) {
        self.inner.tasks.shutdown().await;
    }
}
