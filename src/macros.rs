/// Log a message event to the current span.
///
/// See <https://github.com/open-telemetry/semantic-conventions/blob/d66109ff41e75f49587114e5bff9d101b87f40bd/docs/rpc/rpc-spans.md#events>
macro_rules! message_event {
    ($type:literal, counter: $counter:expr, bytes: $bytes:expr,) => {{
        ::tracing::info!(
            "rpc.message.id" = $counter.fetch_add(1, ::std::sync::atomic::Ordering::Relaxed),
            "rpc.message.type" = $type,
            "rpc.message.uncompressed_size" = $bytes,
            "rpc.message"
        );
    }};

    (@received, counter: $counter:expr, bytes: $bytes:expr, ) => {
        message_event!("RECEIVED", counter: $counter, bytes: $bytes,);
    };

    (@sent, counter: $counter:expr, bytes: $bytes:expr, ) => {
        message_event!("SENT", counter: $counter, bytes: $bytes,);
    };
}
