use crate::types::{ErrorPayload, ID_LEN_LIMIT, METHOD_LEN_LIMIT};

/// Error when deserializing a request envelope.
///
/// These are protocol errors. They are rejected before dispatch, and are only
/// answered when an id could be recovered from the frame.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Invalid JSON, or JSON that does not match the request envelope.
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The frame was not a text frame.
    #[error("Binary frames are not supported")]
    BinaryFrame,

    /// Id is too large
    ///
    /// The limit is 80 bytes. 80 is selected as a reasonable limit for
    /// most use-cases, and will hold UUIDs as well as 0x-prefixed 256-bit
    /// hashes encoded as hex. If you need to send a large id, consider
    /// not doing that.
    #[error("Id is too large, limit of {ID_LEN_LIMIT} bytes. Got: {0}")]
    IdTooLarge(usize),

    /// Id is neither a string nor a number.
    #[error("Id must be a string or a number")]
    InvalidId,

    /// Method is empty.
    #[error("Method is empty")]
    EmptyMethod,

    /// Method is too large
    ///
    /// The limit is 80 bytes. 80 is selected as a reasonable limit for
    /// most use-cases. If you need to send a large method name, consider
    /// not doing that.
    #[error("Method is too large, limit of {METHOD_LEN_LIMIT} bytes. Got: {0}")]
    MethodTooLarge(usize),
}

impl RequestError {
    /// The error payload to send to the client, if the error is answered.
    pub fn error_payload(&self) -> ErrorPayload {
        match self {
            Self::InvalidJson(_) => ErrorPayload::parse_error(),
            _ => ErrorPayload::invalid_request_message(self.to_string().into()),
        }
    }

    /// True if the error is a parse error (as opposed to an invalid request).
    pub const fn is_parse_error(&self) -> bool {
        matches!(self, Self::InvalidJson(_))
    }
}
