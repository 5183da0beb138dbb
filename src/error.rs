use crate::types::{ErrorPayload, CUSTOM_ERROR_RANGE};
use std::{borrow::Cow, error::Error};
use tracing::warn;

/// Errors that can occur when registering methods on a [`Hub`].
///
/// [`Hub`]: crate::Hub
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A method with this name is already registered.
    #[error("method already registered: {0}")]
    DuplicateMethod(String),
    /// The method name is empty, or too long to ever be routed.
    #[error("invalid method name: {0:?}")]
    InvalidName(String),
}

/// Errors that can occur when subscribing a client to an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// The event has not been registered.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    /// The client is not registered with the hub. Either it has disconnected,
    /// or the call was made outside a client context.
    #[error("client is not connected")]
    NotConnected,
    /// The hub coordinator has shut down.
    #[error("hub has shut down")]
    HubClosed,
}

/// Errors that can occur when publishing an event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The event data failed to serialize.
    #[error("failed to serialize event data: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The hub coordinator has shut down.
    #[error("hub has shut down")]
    HubClosed,
}

/// Returned by registration and query calls when the coordinator has gone
/// away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hub has shut down")]
pub struct HubClosed;

/// Errors that can occur when notifying a single client.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The notification data failed to serialize.
    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The notification could not be enqueued.
    #[error(transparent)]
    Send(#[from] SendError),
    /// There is no client to notify.
    #[error("client is not connected")]
    NotConnected,
}

/// Outcomes of a failed enqueue onto a client's outbound queue.
///
/// These are distinct failure causes. [`SendError::Full`] is a backpressure
/// signal from a slow client. [`SendError::Cancelled`] and
/// [`SendError::Closed`] mean the connection is already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The outbound queue stayed full for the whole wait.
    #[error("outbound queue is full")]
    Full,
    /// The client's lifecycle was cancelled.
    #[error("connection is closing")]
    Cancelled,
    /// The write task has gone away.
    #[error("outbound queue is closed")]
    Closed,
}

/// An application error with a code in [`CUSTOM_ERROR_RANGE`].
///
/// Handlers return this (via [`MethodError`]) to send a specific code and
/// message to the client. Codes outside the custom range are NOT trusted.
/// They are coerced to an internal error, and logged server-side.
///
/// ```
/// # use ajj_hub::HandlerError;
/// let err = HandlerError::new(-32001, "insufficient funds");
/// assert!(err.in_custom_range());
/// assert!(!HandlerError::new(42, "nope").in_custom_range());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct HandlerError {
    code: i64,
    message: Cow<'static, str>,
}

impl HandlerError {
    /// Create a new handler error.
    pub fn new(code: i64, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error code.
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if the code is in [`CUSTOM_ERROR_RANGE`].
    pub fn in_custom_range(&self) -> bool {
        CUSTOM_ERROR_RANGE.contains(&self.code)
    }
}

/// The error type returned by method handlers.
///
/// Any handler error type that converts into [`MethodError`] may be used.
/// Conversions exist for [`HandlerError`], [`CallError`] (so handlers can `?`
/// in-process calls), strings, and common error types. Use
/// [`MethodError::other`] for anything else.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    /// An error with an application-defined code.
    #[error(transparent)]
    Coded(#[from] HandlerError),
    /// A failed in-process call to another method.
    #[error(transparent)]
    Call(Box<CallError>),
    /// Any other error. Answered as an internal error.
    #[error("{0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl MethodError {
    /// Wrap any error as an unclassified error.
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// The error payload to send to the client.
    ///
    /// Unclassified errors echo their `Display` output in the message. Coded
    /// errors outside the custom range are coerced to a generic internal
    /// error, and the original code and message are logged.
    pub fn error_payload(&self) -> ErrorPayload {
        match self {
            Self::Coded(err) if err.in_custom_range() => {
                ErrorPayload::new(err.code, err.message.clone())
            }
            Self::Coded(err) => {
                warn!(
                    code = err.code,
                    message = %err.message,
                    "handler error code outside the custom range, coercing to internal error"
                );
                ErrorPayload::internal_error()
            }
            Self::Call(err) => err.error_payload(),
            Self::Other(err) => ErrorPayload::internal_error_message(err.to_string().into()),
        }
    }
}

impl From<CallError> for MethodError {
    fn from(err: CallError) -> Self {
        Self::Call(Box::new(err))
    }
}

impl From<&'static str> for MethodError {
    fn from(err: &'static str) -> Self {
        Self::other(err)
    }
}

impl From<String> for MethodError {
    fn from(err: String) -> Self {
        Self::other(err)
    }
}

impl From<serde_json::Error> for MethodError {
    fn from(err: serde_json::Error) -> Self {
        Self::other(err)
    }
}

impl From<std::io::Error> for MethodError {
    fn from(err: std::io::Error) -> Self {
        Self::other(err)
    }
}

impl From<SubscribeError> for MethodError {
    fn from(err: SubscribeError) -> Self {
        Self::other(err)
    }
}

impl From<PublishError> for MethodError {
    fn from(err: PublishError) -> Self {
        Self::other(err)
    }
}

impl From<NotifyError> for MethodError {
    fn from(err: NotifyError) -> Self {
        Self::other(err)
    }
}

/// Errors produced by invoking a method, either from the wire or in-process.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// No method is registered under this name.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// The params did not decode into the handler's param type.
    #[error("invalid params: {0}")]
    InvalidParams(#[source] serde_json::Error),
    /// The handler's result failed to serialize.
    #[error("failed to serialize result: {0}")]
    SerializeResult(#[source] serde_json::Error),
    /// The result did not decode into the caller's expected type. Only
    /// produced by typed in-process calls.
    #[error("failed to deserialize result: {0}")]
    DeserializeResult(#[source] serde_json::Error),
    /// The request exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// The request was cancelled, usually because the client disconnected.
    #[error("request cancelled")]
    Cancelled,
    /// The handler returned an error.
    #[error(transparent)]
    Handler(#[from] MethodError),
}

impl CallError {
    /// The error payload to send to the client.
    pub fn error_payload(&self) -> ErrorPayload {
        match self {
            Self::MethodNotFound(_) => ErrorPayload::method_not_found(),
            Self::InvalidParams(_) => ErrorPayload::invalid_params(),
            Self::Handler(err) => err.error_payload(),
            _ => ErrorPayload::internal_error_message(self.to_string().into()),
        }
    }

    /// True if the error was produced by the handler itself, rather than by
    /// dispatch.
    pub const fn is_handler_error(&self) -> bool {
        matches!(self, Self::Handler(_))
    }
}
