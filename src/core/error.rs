//! Error types for the tallymark server and CLI

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the process layer
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine errors
    #[error("Engine error: {0}")]
    Core(#[from] tallymark_core::Error),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registration errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A response could not be rendered for the caller
    #[error("Response error: {0}")]
    Translate(#[from] tallymark_core::translator::TranslateError),

    /// Admin server errors
    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new server error
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_convert() {
        let err: Error = tallymark_core::Error::Shutdown.into();
        assert!(matches!(err, Error::Core(tallymark_core::Error::Shutdown)));
        assert_eq!(err.to_string(), "Engine error: Engine is shut down");
    }

    #[test]
    fn config_helper_formats() {
        assert_eq!(Error::config("bad port").to_string(), "Configuration error: bad port");
    }
}
