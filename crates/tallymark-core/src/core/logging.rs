//! Logging macros
//!
//! Thin wrappers over `tracing` so call sites across the engine read the same
//! way and the backend can be swapped in one place.

/// Logging macros exported at the crate root
pub mod logging {

    /// Info level logging - lifecycle and state transitions
    #[macro_export]
    macro_rules! log_info {
        ($($arg:tt)*) => {{
            tracing::info!($($arg)*);
        }};
    }

    /// Warning level logging - recoverable failures such as flush retries
    #[macro_export]
    macro_rules! log_warn {
        ($($arg:tt)*) => {{
            tracing::warn!($($arg)*);
        }};
    }

    /// Error level logging - failures that lose or defer work
    #[macro_export]
    macro_rules! log_error {
        ($($arg:tt)*) => {{
            tracing::error!($($arg)*);
        }};
    }

    /// Debug level logging - per-cycle maintenance summaries
    #[macro_export]
    macro_rules! log_debug {
        ($($arg:tt)*) => {{
            tracing::debug!($($arg)*);
        }};
    }

    /// Trace level logging - per-operation detail
    ///
    /// Compiled out unless the `debug-logging` feature is enabled, since the
    /// add path calls it several times per operation.
    #[macro_export]
    macro_rules! log_trace {
        ($($arg:tt)*) => {{
            #[cfg(feature = "debug-logging")]
            tracing::trace!($($arg)*);
        }};
    }
}
