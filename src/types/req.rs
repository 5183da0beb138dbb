use crate::types::{RequestError, ID_LEN_LIMIT, METHOD_LEN_LIMIT};
use serde::Deserialize;
use serde_json::value::RawValue;

/// A parsed request envelope: `{"method": string, "params"?: json, "id"?: id}`.
///
/// A request without an id is a notification. Notifications are dispatched
/// as normal, but never answered. An explicit `"id": null` is treated the same
/// as an absent id.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    method: String,
    #[serde(default)]
    params: Option<Box<RawValue>>,
    #[serde(default)]
    id: Option<Box<RawValue>>,
}

/// Just the id of an envelope. Used to recover an id from a frame that failed
/// to parse as a full request.
#[derive(Deserialize)]
struct IdOnly {
    #[serde(default)]
    id: Option<Box<RawValue>>,
}

/// A frame that was rejected before dispatch.
#[derive(Debug)]
pub struct Rejection {
    /// Why the frame was rejected.
    pub error: RequestError,
    /// The id to answer with, if one was recoverable.
    pub id: Option<Box<RawValue>>,
}

impl Rejection {
    /// Create a rejection, recovering the id from the frame if possible.
    fn recover(error: RequestError, bytes: &[u8]) -> Self {
        let id = serde_json::from_slice::<IdOnly>(bytes)
            .ok()
            .and_then(|envelope| envelope.id)
            .filter(|id| validate_id(id).is_ok());
        Self { error, id }
    }

    /// Create a rejection for a binary frame. These are never dispatched, but
    /// are answered when the payload carries an id.
    pub fn binary(bytes: &[u8]) -> Self {
        Self::recover(RequestError::BinaryFrame, bytes)
    }
}

fn validate_id(id: &RawValue) -> Result<(), RequestError> {
    let raw = id.get();
    if raw.len() > ID_LEN_LIMIT {
        return Err(RequestError::IdTooLarge(raw.len()));
    }
    match raw.as_bytes().first() {
        Some(b'"' | b'-' | b'0'..=b'9') => Ok(()),
        _ => Err(RequestError::InvalidId),
    }
}

impl Request {
    /// Parse and validate a request envelope from a text frame.
    pub fn parse(bytes: &[u8]) -> Result<Self, Rejection> {
        let req = serde_json::from_slice::<Self>(bytes)
            .map_err(|err| Rejection::recover(RequestError::InvalidJson(err), bytes))?;

        if let Some(id) = req.id.as_deref() {
            // The id is bad, so we cannot echo it. Answer with a null id.
            validate_id(id).map_err(|error| Rejection {
                error,
                id: Some(RawValue::NULL.to_owned()),
            })?;
        }

        let rejection = |error| Rejection {
            error,
            id: req.id.clone(),
        };
        if req.method.is_empty() {
            return Err(rejection(RequestError::EmptyMethod));
        }
        if req.method.len() > METHOD_LEN_LIMIT {
            return Err(rejection(RequestError::MethodTooLarge(req.method.len())));
        }

        Ok(req)
    }

    /// The method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw params, if any.
    pub fn params(&self) -> Option<&RawValue> {
        self.params.as_deref()
    }

    /// The raw id, if any.
    pub fn id(&self) -> Option<&RawValue> {
        self.id.as_deref()
    }

    /// True if the request has no id, and will not be answered.
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Split into the method name, params, and id.
    pub fn into_parts(self) -> (String, Option<Box<RawValue>>, Option<Box<RawValue>>) {
        (self.method, self.params, self.id)
    }
}
