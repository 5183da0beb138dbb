use crate::{
    types::{Rejection, Request, RequestError, Response},
    CallError, Client, HubHandle, RequestCtx, SendError,
};
use serde_json::value::RawValue;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, debug_span, warn, Instrument};

/// Enqueue a response, logging by outcome. Returns true if it was enqueued.
pub(crate) async fn respond(client: &Client, json: Box<RawValue>) -> bool {
    match client.send(Arc::from(json)).await {
        Ok(()) => true,
        Err(SendError::Full) => {
            warn!("outbound queue full, dropping response");
            false
        }
        Err(err) => {
            debug!(%err, "dropping response");
            false
        }
    }
}

/// Answer a frame that was rejected before dispatch, if it carried an id.
pub(crate) fn reject(client: &Client, rejection: Rejection) {
    let Rejection { error, id } = rejection;

    crate::metrics::record_rejected_frame(match &error {
        RequestError::InvalidJson(_) => "parse",
        RequestError::BinaryFrame => "binary",
        _ => "invalid",
    });

    let Some(id) = id else {
        debug!(%error, "rejected frame without a recoverable id");
        return;
    };
    debug!(%error, id = %id, "rejected frame");

    let json = Response::error(&id, &error.error_payload());
    let client_handle = client.clone();
    client
        .tasks()
        .spawn(async move { respond(&client_handle, json).await });
}

/// Spawn a task that handles one request on the client's task set.
///
/// The request runs under the hub's request timeout, and is cancelled with
/// the client. Notifications never produce output, even on error.
pub(crate) fn spawn_request(hub: &HubHandle, client: &Client, req: Request) {
    let (method, params, id) = req.into_parts();
    let method: Arc<str> = Arc::from(method);

    let span = debug_span!(
        "request",
        %method,
        id = id.as_deref().map(RawValue::get),
    );

    let ctx = RequestCtx::for_client(hub.clone(), client.clone(), method.clone(), span.clone());
    let token = ctx.token().clone();
    let request_timeout = hub.config().request_timeout();
    let hub = hub.clone();
    let client = client.clone();
    let tasks = client.tasks().clone();

    let fut = async move {
        let _in_flight = client.in_flight_counter().guard();
        crate::metrics::record_call(&method);

        let res = match timeout(request_timeout, hub.invoke(ctx, params)).await {
            Ok(res) => res,
            Err(_) => {
                token.cancel();
                Err(CallError::Timeout)
            }
        };

        if let Err(CallError::MethodNotFound(_)) = &res {
            crate::metrics::record_method_not_found(&method);
        }

        let Some(id) = id else {
            if let Err(err) = &res {
                debug!(%err, "notification failed");
            }
            crate::metrics::record_completion(&method, res.is_ok(), false);
            return;
        };

        let json = match &res {
            Ok(result) => Response::success(&id, result),
            Err(err) => {
                debug!(%err, handler = err.is_handler_error(), "request failed");
                Response::error(&id, &err.error_payload())
            }
        };

        let sent = respond(&client, json).await;
        crate::metrics::record_completion(&method, res.is_ok(), sent);
    };

    tasks.spawn(fut.instrument(span));
}
