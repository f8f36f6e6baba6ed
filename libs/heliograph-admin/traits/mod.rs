//! Core traits and types for the Heliograph admin SDK
//!
//! - **AdminError / Result**: the SDK-wide error taxonomy
//! - **ReconnectionStrategy**: controls re-dialing after a transport drop
//! - **ReadRoute / WriteRoute**: route descriptors with their local handlers

pub mod error;
pub mod reconnect;
pub mod routes;

// Re-export commonly used types
pub use error::{AdminError, Result};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use routes::{
    DbWriteType, HandlerError, ReadQueryFn, ReadRoute, WriteDoc, WriteDocFn, WriteRoute,
};
