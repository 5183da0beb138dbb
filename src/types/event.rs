use serde::Serialize;
use serde_json::value::RawValue;

/// Event notification envelope: `{"event": string, "data": json}`.
///
/// Notifications carry no id, and are never answered.
#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct EventNotification<'a> {
    pub(crate) event: &'a str,
    pub(crate) data: &'a RawValue,
}

impl EventNotification<'_> {
    /// Serialize the notification.
    pub(crate) fn to_json(self) -> serde_json::Result<Box<RawValue>> {
        serde_json::value::to_raw_value(&self)
    }
}
