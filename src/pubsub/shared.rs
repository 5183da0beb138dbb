use crate::{
    pubsub::{Connection, Listener},
    HubHandle, TaskSet,
};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// The `ListenerTask` listens for new connections, and attaches each to the
/// hub.
pub(crate) struct ListenerTask<T: Listener> {
    pub(crate) listener: T,
    pub(crate) hub: HubHandle,
    /// The server's task set. Connections are children of this set, so
    /// dropping the server's shutdown signal cancels them.
    pub(crate) tasks: TaskSet,
}

impl<T> ListenerTask<T>
where
    T: Listener,
{
    /// Task future, which will be run by [`Self::spawn`].
    ///
    /// This future is a simple loop that accepts new connections, and
    /// attaches them to the hub.
    #[instrument(name = "ListenerTask", skip(self))]
    pub(crate) async fn task_future(self) {
        let ListenerTask {
            listener,
            hub,
            tasks,
        } = self;

        loop {
            let Connection {
                sink,
                stream,
                client_id,
                remote_addr,
            } = match listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    debug!(%err, "failed to accept connection");
                    continue;
                }
            };

            if let Err(err) = hub.attach_with(&tasks, client_id, remote_addr, sink, stream) {
                debug!(%err, "hub has shut down, no longer accepting connections");
                break;
            }
        }
    }

    /// Spawn the future produced by [`Self::task_future`].
    pub(crate) fn spawn(self) -> JoinHandle<Option<()>> {
        let tasks = self.tasks.clone();
        let future = self.task_future();
        tasks.spawn(future)
    }
}
