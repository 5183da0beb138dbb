use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use std::{borrow::Cow, fmt, ops::RangeInclusive};

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request envelope.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error.
pub const INTERNAL_ERROR: i64 = -32603;

/// The range reserved for handler-defined error codes.
///
/// Codes in this range are forwarded to the client verbatim. Codes outside it
/// are coerced to [`INTERNAL_ERROR`], and logged as a contract violation.
pub const CUSTOM_ERROR_RANGE: RangeInclusive<i64> = -32099..=-32000;

const PARSE_ERROR_MSG: &str = "Parse error";
const INVALID_REQUEST_MSG: &str = "Invalid request";
const METHOD_NOT_FOUND_MSG: &str = "Method not found";
const INVALID_PARAMS_MSG: &str = "Invalid params";
const INTERNAL_ERROR_MSG: &str = "Internal error";

/// The error object of a response: `{"code": int, "message": string}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// The error code.
    pub code: i64,
    /// The error message.
    pub message: Cow<'static, str>,
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error code {}: {}", self.code, self.message)
    }
}

impl ErrorPayload {
    /// Create a new error payload.
    pub const fn new(code: i64, message: Cow<'static, str>) -> Self {
        Self { code, message }
    }

    /// Create a new error payload for a parse error.
    pub const fn parse_error() -> Self {
        Self::new(PARSE_ERROR, Cow::Borrowed(PARSE_ERROR_MSG))
    }

    /// Create a new error payload for an invalid request.
    pub const fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, Cow::Borrowed(INVALID_REQUEST_MSG))
    }

    /// Create a new error payload for an invalid request with a custom
    /// message.
    pub const fn invalid_request_message(message: Cow<'static, str>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    /// Create a new error payload for a method not found error.
    pub const fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, Cow::Borrowed(METHOD_NOT_FOUND_MSG))
    }

    /// Create a new error payload for an invalid params error.
    pub const fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, Cow::Borrowed(INVALID_PARAMS_MSG))
    }

    /// Create a new error payload for an internal error.
    pub const fn internal_error() -> Self {
        Self::new(INTERNAL_ERROR, Cow::Borrowed(INTERNAL_ERROR_MSG))
    }

    /// Create a new error payload for an internal error with a custom message.
    pub const fn internal_error_message(message: Cow<'static, str>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// True if the code is one of the reserved protocol codes.
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self.code,
            PARSE_ERROR | INVALID_REQUEST | METHOD_NOT_FOUND | INVALID_PARAMS | INTERNAL_ERROR
        )
    }
}

/// The body of a response: either a result or an error, never both.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Payload<'a> {
    Success(&'a RawValue),
    Failure(&'a ErrorPayload),
}

/// Response envelope: `{"result"|"error": .., "id": ..}`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Response<'a> {
    pub(crate) id: &'a RawValue,
    pub(crate) payload: Payload<'a>,
}

impl<'a> Response<'a> {
    /// Success response.
    pub(crate) fn success(id: &'a RawValue, result: &'a RawValue) -> Box<RawValue> {
        Self {
            id,
            payload: Payload::Success(result),
        }
        .to_json()
    }

    /// Error response.
    pub(crate) fn error(id: &'a RawValue, error: &'a ErrorPayload) -> Box<RawValue> {
        Self {
            id,
            payload: Payload::Failure(error),
        }
        .to_json()
    }

    /// Response failed to serialize. This is a last resort and should not
    /// happen, as both payload variants hold already-valid JSON.
    fn serialization_failure(id: &RawValue) -> Box<RawValue> {
        RawValue::from_string(format!(
            r#"{{"error":{{"code":{INTERNAL_ERROR},"message":"response serialization error"}},"id":{}}}"#,
            id.get()
        ))
        .unwrap_or_else(|_| RawValue::NULL.to_owned())
    }

    pub(crate) fn to_json(&self) -> Box<RawValue> {
        serde_json::value::to_raw_value(self).unwrap_or_else(|err| {
            tracing::debug!(%err, id = %self.id, "failed to serialize response");
            Self::serialization_failure(self.id)
        })
    }
}

impl Serialize for Response<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        match self.payload {
            Payload::Success(result) => map.serialize_entry("result", result)?,
            Payload::Failure(error) => map.serialize_entry("error", error)?,
        }
        map.serialize_entry("id", self.id)?;
        map.end()
    }
}
