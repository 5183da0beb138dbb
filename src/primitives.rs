use core::fmt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;

/// A unique internal identifier for a connection.
///
/// Connection ids are assigned by the hub and are never reused for the
/// lifetime of a hub. Unlike the [`ClientId`], which may be supplied by the
/// remote peer, the connection id is guaranteed to be unique.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl ConnectionId {
    /// Get the raw connection id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The display identity of a client.
///
/// This is taken from the `X-Client-Id` header or the `client_id` query
/// parameter when the peer provides one. Otherwise it is derived from the
/// remote address plus a generated suffix. It is NOT guaranteed to be unique,
/// as peers may reuse identities across connections. Use the
/// [`ConnectionId`] when uniqueness matters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(Arc<str>);

impl ClientId {
    /// Create a new client id.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Get the client id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object that can be sent over the hub.
///
/// This trait is blanket-implemented for every [`Serialize`] type that
/// satisfies the required bounds. It is used to indicate that a type can
/// be sent as a method result or event payload.
///
/// The [`into_raw_value`] method consumes `self` and produces a serialized
/// [`RawValue`]. Types that do not implement [`Serialize`] can implement
/// `RpcSend` directly, which is useful for pre-serialized data.
///
/// ```
/// use ajj_hub::RpcSend;
///
/// let json = vec![1usize, 2, 3].into_raw_value().unwrap();
/// assert_eq!(json.get(), "[1,2,3]");
/// ```
///
/// [`into_raw_value`]: RpcSend::into_raw_value
pub trait RpcSend: Send + Sync + Unpin {
    /// Consume this value and serialize it into a [`RawValue`].
    fn into_raw_value(self) -> serde_json::Result<Box<RawValue>>;
}

impl<T> RpcSend for T
where
    T: Serialize + Send + Sync + Unpin,
{
    fn into_raw_value(self) -> serde_json::Result<Box<RawValue>> {
        serde_json::value::to_raw_value(&self)
    }
}

/// An object that can be received over the hub.
///
/// This marker trait is blanket-implemented for every qualifying type. It is
/// used to indicate that a type can be decoded from method params.
///
/// # Note
///
/// We add the `'static` lifetime to the supertraits to indicate that the type
/// can't borrow. Params are decoded once per request, and handed to the
/// handler by value.
pub trait RpcRecv: DeserializeOwned + Send + Sync + Unpin + 'static {}

impl<T> RpcRecv for T where T: DeserializeOwned + Send + Sync + Unpin + 'static {}

/// An object that can be both sent and received over the hub.
pub trait RpcObject: RpcSend + RpcRecv {}

impl<T> RpcObject for T where T: RpcSend + RpcRecv {}
