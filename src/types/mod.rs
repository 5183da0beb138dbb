//! Wire envelopes, like [`Request`], and the error code space.

mod req;
pub use req::{Rejection, Request};

mod resp;
pub(crate) use resp::Response;
pub use resp::{
    ErrorPayload, CUSTOM_ERROR_RANGE, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};

mod event;
pub(crate) use event::EventNotification;

mod error;
pub use error::RequestError;

pub(crate) const ID_LEN_LIMIT: usize = 80;
pub(crate) const METHOD_LEN_LIMIT: usize = 80;
