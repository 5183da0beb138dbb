use std::time::Duration;

/// Default outbound buffer size per client.
pub const DEFAULT_OUTBOUND_BUFFER_PER_CLIENT: usize = 16;

/// Default size of the hub's event publish queue.
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 64;

/// Default timeout for a single request, measured from dispatch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single write to the transport.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a response may wait for room in the outbound buffer.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum size of an inbound message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Configuration for a [`Hub`].
///
/// All settings have defaults, and may be overridden with the `with_*`
/// methods.
///
/// ## Backpressure
///
/// There are two independent knobs:
/// - [`Self::event_queue_size`] bounds the hub's publish queue. When it is
///   full, [`HubHandle::publish_event`] waits for room. This is the only place
///   the hub pushes back on publishers.
/// - [`Self::outbound_buffer_per_client`] bounds each client's outbound
///   queue. When it is full, event notifications for that client are dropped,
///   and responses wait at most [`Self::send_timeout`] before being dropped.
///
/// The outbound buffer is allocated for EACH connection. Setting it too high
/// may allow a slow client to consume significant server memory.
///
/// ```
/// # use ajj_hub::HubConfig;
/// # use std::time::Duration;
/// let config = HubConfig::default()
///     .with_outbound_buffer_per_client(64)
///     .with_request_timeout(Duration::from_secs(5));
/// assert_eq!(config.outbound_buffer_per_client(), 64);
/// ```
///
/// [`Hub`]: crate::Hub
/// [`HubHandle::publish_event`]: crate::HubHandle::publish_event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    outbound_buffer_per_client: usize,
    event_queue_size: usize,
    request_timeout: Duration,
    write_timeout: Duration,
    send_timeout: Duration,
    max_message_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer_per_client: DEFAULT_OUTBOUND_BUFFER_PER_CLIENT,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl HubConfig {
    /// Set the outbound buffer size per client. Values below 1 are raised
    /// to 1.
    pub fn with_outbound_buffer_per_client(mut self, size: usize) -> Self {
        self.outbound_buffer_per_client = size.max(1);
        self
    }

    /// Set the publish queue size. Values below 1 are raised to 1.
    pub fn with_event_queue_size(mut self, size: usize) -> Self {
        self.event_queue_size = size.max(1);
        self
    }

    /// Set the per-request timeout.
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the per-write timeout.
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the time a response may wait for room in the outbound buffer.
    pub const fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size, in bytes.
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// The outbound buffer size per client.
    pub const fn outbound_buffer_per_client(&self) -> usize {
        self.outbound_buffer_per_client
    }

    /// The publish queue size.
    pub const fn event_queue_size(&self) -> usize {
        self.event_queue_size
    }

    /// The per-request timeout.
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// The per-write timeout.
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// The time a response may wait for room in the outbound buffer.
    pub const fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// The maximum inbound message size, in bytes.
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_sizes_are_raised() {
        let config = HubConfig::default()
            .with_outbound_buffer_per_client(0)
            .with_event_queue_size(0);
        assert_eq!(config.outbound_buffer_per_client(), 1);
        assert_eq!(config.event_queue_size(), 1);
    }
}
