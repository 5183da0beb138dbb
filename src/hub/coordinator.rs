use crate::{
    hub::HubStats, types::EventNotification, Client, ConnectionId, SendError, SubscribeError,
    TaskSet,
};
use serde_json::value::RawValue;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

/// Commands processed by the [`Coordinator`]. Every mutation of the client
/// registry, the subscription index, and the known events goes through here.
#[derive(Debug)]
pub(crate) enum Control {
    /// Add a client to the registry.
    Register(Client),
    /// Remove a client from the registry and from every subscriber set.
    Unregister(ConnectionId),
    Subscribe {
        conn_id: ConnectionId,
        event: String,
        reply: oneshot::Sender<Result<(), SubscribeError>>,
    },
    Unsubscribe {
        conn_id: ConnectionId,
        event: String,
        reply: oneshot::Sender<()>,
    },
    RegisterEvent(String),
    ClientCount(oneshot::Sender<usize>),
    SubscriberCount {
        event: String,
        reply: oneshot::Sender<usize>,
    },
    Events(oneshot::Sender<Vec<String>>),
}

/// An event waiting in the publish queue. The data is serialized by the
/// publisher, so the coordinator never runs user serialization code.
#[derive(Debug)]
pub(crate) struct QueuedEvent {
    pub(crate) name: String,
    pub(crate) data: Box<RawValue>,
}

/// A registered client, and the events it is subscribed to.
#[derive(Debug)]
struct Registered {
    client: Client,
    events: HashSet<String>,
}

/// The single owner of the hub's mutable state.
///
/// The coordinator runs as one task. It applies control commands and
/// broadcasts queued events, one at a time, so a disconnect and a publish can
/// never interleave.
#[derive(Debug)]
pub(crate) struct Coordinator {
    control: mpsc::UnboundedReceiver<Control>,
    events: mpsc::Receiver<QueuedEvent>,
    tasks: TaskSet,
    stats: HubStats,

    clients: HashMap<ConnectionId, Registered>,
    known_events: BTreeSet<String>,
    subscriptions: HashMap<String, HashMap<ConnectionId, Client>>,
}

impl Coordinator {
    pub(crate) fn new(
        control: mpsc::UnboundedReceiver<Control>,
        events: mpsc::Receiver<QueuedEvent>,
        tasks: TaskSet,
        stats: HubStats,
        known_events: BTreeSet<String>,
    ) -> Self {
        Self {
            control,
            events,
            tasks,
            stats,
            clients: HashMap::new(),
            known_events,
            subscriptions: HashMap::new(),
        }
    }

    /// Task future, spawned by [`Hub::start`].
    ///
    /// Control commands are preferred over queued events. A client that
    /// disconnects before an event is dequeued never receives it.
    ///
    /// [`Hub::start`]: crate::Hub::start
    #[instrument(name = "Coordinator", skip(self))]
    pub(crate) async fn task_future(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.tasks.cancelled() => {
                    debug!("hub cancelled");
                    break;
                }
                cmd = self.control.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all hub handles dropped");
                        break;
                    };
                    self.handle(cmd);
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        debug!("event queue closed");
                        break;
                    };
                    self.broadcast(event);
                }
            }
        }
        self.close();
    }

    fn handle(&mut self, cmd: Control) {
        match cmd {
            Control::Register(client) => self.register(client),
            Control::Unregister(conn_id) => self.unregister(conn_id),
            Control::Subscribe {
                conn_id,
                event,
                reply,
            } => {
                let _ = reply.send(self.subscribe(conn_id, event));
            }
            Control::Unsubscribe {
                conn_id,
                event,
                reply,
            } => {
                self.unsubscribe(conn_id, &event);
                let _ = reply.send(());
            }
            Control::RegisterEvent(name) => {
                if self.known_events.insert(name.clone()) {
                    debug!(event = %name, "registered event");
                }
            }
            Control::ClientCount(reply) => {
                let _ = reply.send(self.clients.len());
            }
            Control::SubscriberCount { event, reply } => {
                let _ = reply.send(self.subscriptions.get(&event).map_or(0, HashMap::len));
            }
            Control::Events(reply) => {
                let _ = reply.send(self.known_events.iter().cloned().collect());
            }
        }
    }

    fn register(&mut self, client: Client) {
        let conn_id = client.conn_id();
        debug!(client_id = %client.id(), %conn_id, "client registered");
        crate::metrics::record_connect();
        self.clients.insert(
            conn_id,
            Registered {
                client,
                events: HashSet::new(),
            },
        );
    }

    fn unregister(&mut self, conn_id: ConnectionId) {
        let Some(Registered { client, events }) = self.clients.remove(&conn_id) else {
            trace!(%conn_id, "unregister for unknown client");
            return;
        };

        for event in events {
            if let Some(subscribers) = self.subscriptions.get_mut(&event) {
                subscribers.remove(&conn_id);
                if subscribers.is_empty() {
                    self.subscriptions.remove(&event);
                }
            }
        }

        debug!(client_id = %client.id(), %conn_id, "client unregistered");
        crate::metrics::record_disconnect();
        client.lifecycle().mark_unregistered();
    }

    fn subscribe(&mut self, conn_id: ConnectionId, event: String) -> Result<(), SubscribeError> {
        if !self.known_events.contains(&event) {
            return Err(SubscribeError::UnknownEvent(event));
        }
        let registered = self
            .clients
            .get_mut(&conn_id)
            .ok_or(SubscribeError::NotConnected)?;

        if registered.events.insert(event.clone()) {
            trace!(%conn_id, %event, "subscribed");
            self.subscriptions
                .entry(event)
                .or_default()
                .insert(conn_id, registered.client.clone());
        }
        Ok(())
    }

    fn unsubscribe(&mut self, conn_id: ConnectionId, event: &str) {
        let Some(registered) = self.clients.get_mut(&conn_id) else {
            return;
        };
        if !registered.events.remove(event) {
            return;
        }
        if let Some(subscribers) = self.subscriptions.get_mut(event) {
            subscribers.remove(&conn_id);
            if subscribers.is_empty() {
                self.subscriptions.remove(event);
            }
        }
        trace!(%conn_id, %event, "unsubscribed");
    }

    /// Deliver an event to every subscriber, without waiting on any of them.
    fn broadcast(&mut self, event: QueuedEvent) {
        self.stats.published.incr();

        let Some(subscribers) = self.subscriptions.get(&event.name) else {
            trace!(event = %event.name, "no subscribers");
            crate::metrics::record_broadcast(&event.name, 0, 0);
            return;
        };

        let notification = EventNotification {
            event: &event.name,
            data: &event.data,
        };
        let json: Arc<RawValue> = match notification.to_json() {
            Ok(json) => Arc::from(json),
            Err(err) => {
                warn!(%err, event = %event.name, "failed to build event notification");
                return;
            }
        };

        let (mut delivered, mut dropped) = (0u64, 0u64);
        for client in subscribers.values() {
            match client.try_enqueue(json.clone()) {
                Ok(()) => delivered += 1,
                Err(SendError::Full) => {
                    dropped += 1;
                    warn!(
                        client_id = %client.id(),
                        conn_id = %client.conn_id(),
                        event = %event.name,
                        "outbound queue full, dropping event for slow subscriber"
                    );
                }
                Err(err) => {
                    trace!(%err, conn_id = %client.conn_id(), "subscriber is going away");
                }
            }
        }

        self.stats.record_delivery(delivered, dropped);
        crate::metrics::record_broadcast(&event.name, delivered, dropped);
    }

    /// Release every registered client. Clients whose registration is still
    /// queued are released as well.
    fn close(&mut self) {
        self.control.close();
        while let Ok(cmd) = self.control.try_recv() {
            if let Control::Register(client) = cmd {
                client.cancel();
                client.lifecycle().mark_unregistered();
            }
        }

        for (_, Registered { client, .. }) in self.clients.drain() {
            client.cancel();
            crate::metrics::record_disconnect();
            client.lifecycle().mark_unregistered();
        }
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ClientId, ClientState};
    use std::time::Duration;

    struct Harness {
        coordinator: Coordinator,
        stats: HubStats,
        _control: mpsc::UnboundedSender<Control>,
        _events: mpsc::Sender<QueuedEvent>,
    }

    fn harness() -> Harness {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(8);
        let stats = HubStats::default();
        let known = ["ticks".to_owned(), "news".to_owned()].into_iter().collect();
        Harness {
            coordinator: Coordinator::new(
                control_rx,
                events_rx,
                TaskSet::default(),
                stats.clone(),
                known,
            ),
            stats,
            _control: control_tx,
            _events: events_tx,
        }
    }

    fn client(id: u64, buffer: usize) -> (Client, mpsc::Receiver<Arc<RawValue>>) {
        Client::new(
            ClientId::from(format!("c{id}")),
            ConnectionId::from(id),
            None,
            TaskSet::default(),
            buffer,
            Duration::from_millis(10),
        )
    }

    fn event(name: &str, data: &str) -> QueuedEvent {
        QueuedEvent {
            name: name.to_owned(),
            data: RawValue::from_string(data.to_owned()).unwrap(),
        }
    }

    #[test]
    fn subscribe_requires_known_event_and_client() {
        let mut h = harness();
        let (a, _rx) = client(1, 4);

        assert_eq!(
            h.coordinator.subscribe(a.conn_id(), "ticks".into()),
            Err(SubscribeError::NotConnected)
        );
        h.coordinator.register(a.clone());
        assert_eq!(
            h.coordinator.subscribe(a.conn_id(), "nope".into()),
            Err(SubscribeError::UnknownEvent("nope".into()))
        );
        assert_eq!(h.coordinator.subscribe(a.conn_id(), "ticks".into()), Ok(()));
    }

    #[test]
    fn repeated_subscribe_is_one_entry() {
        let mut h = harness();
        let (a, mut rx) = client(1, 8);
        h.coordinator.register(a.clone());

        for _ in 0..5 {
            h.coordinator.subscribe(a.conn_id(), "ticks".into()).unwrap();
        }
        assert_eq!(h.coordinator.subscriptions["ticks"].len(), 1);

        h.coordinator.broadcast(event("ticks", "1"));
        assert_eq!(
            rx.try_recv().unwrap().get(),
            r#"{"event":"ticks","data":1}"#
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut h = harness();
        let (a, mut rx) = client(1, 8);
        h.coordinator.register(a.clone());
        h.coordinator.subscribe(a.conn_id(), "ticks".into()).unwrap();

        h.coordinator.unsubscribe(a.conn_id(), "ticks");
        h.coordinator.unsubscribe(a.conn_id(), "ticks");
        h.coordinator.unsubscribe(a.conn_id(), "unknown");

        h.coordinator.broadcast(event("ticks", "1"));
        assert!(rx.try_recv().is_err());
        assert!(!h.coordinator.subscriptions.contains_key("ticks"));
    }

    #[test]
    fn unregister_cleans_every_subscription() {
        let mut h = harness();
        let (a, _rx_a) = client(1, 8);
        let (b, mut rx_b) = client(2, 8);
        h.coordinator.register(a.clone());
        h.coordinator.register(b.clone());
        for c in [&a, &b] {
            h.coordinator.subscribe(c.conn_id(), "ticks".into()).unwrap();
            h.coordinator.subscribe(c.conn_id(), "news".into()).unwrap();
        }

        h.coordinator.unregister(a.conn_id());
        assert!(h
            .coordinator
            .subscriptions
            .values()
            .all(|subs| !subs.contains_key(&a.conn_id())));

        h.coordinator.broadcast(event("news", r#""hello""#));
        assert_eq!(
            rx_b.try_recv().unwrap().get(),
            r#"{"event":"news","data":"hello"}"#
        );
        assert_eq!(h.stats.delivered(), 1);

        // subscribing after unregister is refused
        assert_eq!(
            h.coordinator.subscribe(a.conn_id(), "ticks".into()),
            Err(SubscribeError::NotConnected)
        );
    }

    #[test]
    fn slow_subscriber_is_skipped() {
        let mut h = harness();
        let (slow, mut slow_rx) = client(1, 1);
        let (fast, mut fast_rx) = client(2, 8);
        for c in [&slow, &fast] {
            h.coordinator.register(c.clone());
            h.coordinator.subscribe(c.conn_id(), "ticks".into()).unwrap();
        }

        h.coordinator.broadcast(event("ticks", "1"));
        h.coordinator.broadcast(event("ticks", "2"));

        assert_eq!(h.stats.dropped(), 1);
        assert_eq!(h.stats.delivered(), 3);
        assert_eq!(h.stats.published(), 2);

        assert!(slow_rx.try_recv().unwrap().get().contains("1"));
        assert!(slow_rx.try_recv().is_err());
        assert!(fast_rx.try_recv().unwrap().get().contains("1"));
        assert!(fast_rx.try_recv().unwrap().get().contains("2"));
    }

    #[test]
    fn runtime_event_registration() {
        let mut h = harness();
        let (a, _rx) = client(1, 4);
        h.coordinator.register(a.clone());

        h.coordinator.handle(Control::RegisterEvent("late".into()));
        h.coordinator.handle(Control::RegisterEvent("late".into()));
        assert_eq!(h.coordinator.subscribe(a.conn_id(), "late".into()), Ok(()));
        assert_eq!(h.coordinator.known_events.len(), 3);
    }

    #[test]
    fn close_releases_clients() {
        let mut h = harness();
        let (a, _rx) = client(1, 4);
        h.coordinator.register(a.clone());

        // read pump and write pump have exited
        a.lifecycle().finish_step();
        a.lifecycle().finish_step();
        assert_eq!(a.state(), ClientState::Created);

        h.coordinator.close();
        assert!(a.is_cancelled());
        assert_eq!(a.state(), ClientState::Closed);
    }
}
