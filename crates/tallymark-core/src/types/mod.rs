//! Type definitions shared across the engine

/// Error types
pub mod error;

/// Identifier and key types
pub mod ids;

/// Typed engine responses
pub mod response;

pub use error::{Error, Result, StorageError, ValidationError};
pub use ids::{BitmapKey, BucketKey, CounterKey, IntId};
pub use response::{Payload, Response, ResponseKind};
