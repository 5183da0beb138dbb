use crate::{
    types::EventNotification, CallError, Client, HubHandle, NotifyError, PublishError, RpcRecv,
    RpcSend, SubscribeError, TaskSet,
};
use serde_json::value::RawValue;
use std::{future::Future, sync::Arc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug_span, Span};

/// The context of a single method invocation.
///
/// The context carries the calling [`Client`] (absent for calls made directly
/// on a [`HubHandle`]), the hub itself, and a cancellation token. The token is
/// a child of the client's lifecycle, so it fires when the client disconnects,
/// and additionally when the request times out.
///
/// Handlers use the context to manage the calling client's subscriptions, to
/// publish events, and to invoke other methods in-process without going over
/// the wire.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    hub: HubHandle,
    client: Option<Client>,
    method: Arc<str>,
    token: CancellationToken,
    tasks: TaskSet,
    span: Span,
}

impl RequestCtx {
    /// Create a context for a request from a client. The token is a fresh
    /// child of the client's lifecycle.
    pub(crate) fn for_client(hub: HubHandle, client: Client, method: Arc<str>, span: Span) -> Self {
        let tasks = client.tasks().clone();
        Self {
            hub,
            token: tasks.child_token(),
            tasks,
            client: Some(client),
            method,
            span,
        }
    }

    /// Create a context for a call made directly on the hub, with no client.
    pub(crate) fn detached(hub: HubHandle, method: Arc<str>) -> Self {
        let tasks = hub.tasks().clone();
        let span = debug_span!("hub call", %method);
        Self {
            hub,
            token: tasks.child_token(),
            tasks,
            client: None,
            method,
            span,
        }
    }

    /// Derive the context for a nested in-process call.
    fn nested(&self, method: &str) -> Self {
        Self {
            hub: self.hub.clone(),
            client: self.client.clone(),
            method: Arc::from(method),
            token: self.token.child_token(),
            tasks: self.tasks.clone(),
            span: debug_span!(parent: &self.span, "in-process call", method),
        }
    }

    /// Get a reference to the hub.
    pub const fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Get a reference to the calling client, if any.
    pub const fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    /// The name of the method being invoked.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request span.
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// True if the request has been cancelled, either because it timed out or
    /// because the client went away.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Get a future that resolves when the request is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Get the request's cancellation token.
    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Subscribe the calling client to an event.
    pub async fn subscribe(&self, event: &str) -> Result<(), SubscribeError> {
        let client = self.client.as_ref().ok_or(SubscribeError::NotConnected)?;
        self.hub.subscribe(client, event).await
    }

    /// Unsubscribe the calling client from an event. This is a no-op when not
    /// subscribed, or when called without a client.
    pub async fn unsubscribe(&self, event: &str) {
        if let Some(client) = self.client.as_ref() {
            self.hub.unsubscribe(client, event).await;
        }
    }

    /// Publish an event to all of its subscribers.
    pub async fn publish_event<T: RpcSend>(
        &self,
        event: impl Into<String>,
        data: T,
    ) -> Result<(), PublishError> {
        self.hub.publish_event(event, data).await
    }

    /// Send an event notification to the calling client only, regardless of
    /// its subscriptions.
    pub async fn notify<T: RpcSend>(&self, event: &str, data: T) -> Result<(), NotifyError> {
        let client = self.client.as_ref().ok_or(NotifyError::NotConnected)?;
        let data = data.into_raw_value()?;
        let json = EventNotification { event, data: &data }.to_json()?;
        client.send(Arc::from(json)).await?;
        Ok(())
    }

    /// Invoke another registered method in-process, with raw params.
    ///
    /// The call runs with the same client, and is cancelled with this request.
    pub async fn call_raw(
        &self,
        method: &str,
        params: Option<Box<RawValue>>,
    ) -> Result<Box<RawValue>, CallError> {
        self.hub.invoke(self.nested(method), params).await
    }

    /// Invoke another registered method in-process.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, CallError>
    where
        P: RpcSend,
        R: RpcRecv,
    {
        let params = params.into_raw_value().map_err(CallError::InvalidParams)?;
        let json = self.call_raw(method, Some(params)).await?;
        serde_json::from_str(json.get()).map_err(CallError::DeserializeResult)
    }

    /// Spawn a task tied to the calling client. The task is dropped when the
    /// client disconnects (or, for detached calls, when the hub shuts down).
    pub fn spawn<F>(&self, f: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(f);
    }
}
