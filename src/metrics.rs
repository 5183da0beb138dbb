use metrics::{counter, gauge, Counter, Gauge};
use std::sync::LazyLock;

/// Metric name for tracking connected clients.
pub(crate) const CONNECTED_CLIENTS: &str = "ajj.hub.connected_clients";
pub(crate) const CONNECTED_CLIENTS_HELP: &str = "Number of clients currently connected to the hub";

/// Metric name for counting method calls.
pub(crate) const METHOD_CALLS: &str = "ajj.hub.calls";
pub(crate) const METHOD_CALLS_HELP: &str =
    "Number of method calls dispatched by the hub. Not all calls will result in a response.";

/// Metric name for counting errored method executions.
pub(crate) const METHOD_ERRORS: &str = "ajj.hub.errors";
pub(crate) const METHOD_ERRORS_HELP: &str =
    "Number of errored method executions. This does NOT imply a response was sent.";

/// Metric name for counting responses.
pub(crate) const RESPONSES: &str = "ajj.hub.responses";
pub(crate) const RESPONSES_HELP: &str =
    "Number of responses enqueued. Notifications never result in a response.";

/// Metric for counting method not found errors.
pub(crate) const METHOD_NOT_FOUND: &str = "ajj.hub.method_not_found";
pub(crate) const METHOD_NOT_FOUND_HELP: &str =
    "Number of calls to methods that are not registered.";

// Metric for counting frames rejected before dispatch.
pub(crate) const REJECTED_FRAMES: &str = "ajj.hub.rejected_frames";
pub(crate) const REJECTED_FRAMES_HELP: &str =
    "Number of inbound frames rejected before dispatch. A response is sent only if an id was recoverable.";

/// Metric for tracking active calls.
pub(crate) const ACTIVE_CALLS: &str = "ajj.hub.active_calls";
pub(crate) const ACTIVE_CALLS_HELP: &str = "Number of active calls being processed";

/// Metric for counting published events.
pub(crate) const EVENTS_PUBLISHED: &str = "ajj.hub.events_published";
pub(crate) const EVENTS_PUBLISHED_HELP: &str = "Number of events broadcast by the coordinator";

/// Metric for counting event notifications enqueued to subscribers.
pub(crate) const NOTIFICATIONS_DELIVERED: &str = "ajj.hub.notifications_delivered";
pub(crate) const NOTIFICATIONS_DELIVERED_HELP: &str =
    "Number of event notifications enqueued to subscriber outbound queues";

/// Metric for counting event notifications dropped for slow subscribers.
pub(crate) const NOTIFICATIONS_DROPPED: &str = "ajj.hub.notifications_dropped";
pub(crate) const NOTIFICATIONS_DROPPED_HELP: &str =
    "Number of event notifications dropped because a subscriber's outbound queue was full";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    metrics::describe_gauge!(
        CONNECTED_CLIENTS,
        metrics::Unit::Count,
        CONNECTED_CLIENTS_HELP
    );
    metrics::describe_counter!(METHOD_CALLS, metrics::Unit::Count, METHOD_CALLS_HELP);
    metrics::describe_counter!(METHOD_ERRORS, metrics::Unit::Count, METHOD_ERRORS_HELP);
    metrics::describe_counter!(RESPONSES, metrics::Unit::Count, RESPONSES_HELP);
    metrics::describe_counter!(
        METHOD_NOT_FOUND,
        metrics::Unit::Count,
        METHOD_NOT_FOUND_HELP
    );
    metrics::describe_counter!(REJECTED_FRAMES, metrics::Unit::Count, REJECTED_FRAMES_HELP);
    metrics::describe_gauge!(ACTIVE_CALLS, metrics::Unit::Count, ACTIVE_CALLS_HELP);
    metrics::describe_counter!(
        EVENTS_PUBLISHED,
        metrics::Unit::Count,
        EVENTS_PUBLISHED_HELP
    );
    metrics::describe_counter!(
        NOTIFICATIONS_DELIVERED,
        metrics::Unit::Count,
        NOTIFICATIONS_DELIVERED_HELP
    );
    metrics::describe_counter!(
        NOTIFICATIONS_DROPPED,
        metrics::Unit::Count,
        NOTIFICATIONS_DROPPED_HELP
    );
});

/// Get or register the connected clients gauge.
pub(crate) fn connected_clients() -> Gauge {
    let _ = &DESCRIBE;
    gauge!(CONNECTED_CLIENTS)
}

/// Record a client registering with the coordinator.
pub(crate) fn record_connect() {
    connected_clients().increment(1);
}

/// Record a client unregistering from the coordinator.
pub(crate) fn record_disconnect() {
    connected_clients().decrement(1);
}

/// Get or register a counter for calls to a specific method.
pub(crate) fn calls(method: &str) -> Counter {
    let _ = &DESCRIBE;
    counter!(METHOD_CALLS, "method" => method.to_string())
}

/// Get or register the active calls gauge for a specific method.
pub(crate) fn active_calls(method: &str) -> Gauge {
    let _ = &DESCRIBE;
    gauge!(ACTIVE_CALLS, "method" => method.to_string())
}

/// Record a call to a specific method.
pub(crate) fn record_call(method: &str) {
    calls(method).increment(1);
    active_calls(method).increment(1);
}

/// Get or register a counter for errors from a specific method.
pub(crate) fn errors(method: &str) -> Counter {
    let _ = &DESCRIBE;
    counter!(METHOD_ERRORS, "method" => method.to_string())
}

/// Get or register a counter for responses from a specific method.
pub(crate) fn responses(method: &str) -> Counter {
    let _ = &DESCRIBE;
    counter!(RESPONSES, "method" => method.to_string())
}

/// Record the completion of a call, and whether it errored or produced a
/// response.
pub(crate) fn record_completion(method: &str, success: bool, response_sent: bool) {
    if !success {
        errors(method).increment(1);
    }
    if response_sent {
        responses(method).increment(1);
    }
    active_calls(method).decrement(1);
}

/// Get or register a counter for method not found errors.
pub(crate) fn method_not_found_errors(method: &str) -> Counter {
    let _ = &DESCRIBE;
    counter!(METHOD_NOT_FOUND, "method" => method.to_string())
}

/// Record a method not found error.
pub(crate) fn record_method_not_found(method: &str) {
    method_not_found_errors(method).increment(1);
}

/// Get or register a counter for rejected frames.
pub(crate) fn rejected_frames(kind: &'static str) -> Counter {
    let _ = &DESCRIBE;
    counter!(REJECTED_FRAMES, "kind" => kind)
}

/// Record a frame rejected before dispatch.
pub(crate) fn record_rejected_frame(kind: &'static str) {
    rejected_frames(kind).increment(1);
}

/// Record an event broadcast, with its delivery outcome.
pub(crate) fn record_broadcast(event: &str, delivered: u64, dropped: u64) {
    let _ = &DESCRIBE;
    counter!(EVENTS_PUBLISHED, "event" => event.to_string()).increment(1);
    counter!(NOTIFICATIONS_DELIVERED, "event" => event.to_string()).increment(delivered);
    if dropped > 0 {
        counter!(NOTIFICATIONS_DROPPED, "event" => event.to_string()).increment(dropped);
    }
}
