//! # Heliograph Admin SDK
//!
//! Server-side client for the Heliograph realtime document-sync service.
//!
//! The SDK keeps one persistent WebSocket session to the service, registers
//! the application's read and write routes, serves the route requests the
//! service forwards, and survives disconnects transparently: after every
//! reconnection the last declared route set is replayed without caller
//! involvement.
//!
//! ## Example
//!
//! ```rust,ignore
//! use heliograph_admin::{AdminCredentials, HeliographAdmin, ReadRoute, SdkConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> heliograph_admin::Result<()> {
//!     let admin = HeliographAdmin::new(
//!         AdminCredentials::new("my-project", "secret-key"),
//!         SdkConfig::development(),
//!     );
//!
//!     admin.reads().route(
//!         ReadRoute::new("users", "users").query(|payload| Ok(json!({ "active": true }))),
//!     )?;
//!
//!     admin.start().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    config, connection_state, correlator, protocol, session,
    config::{AdminCredentials, SdkConfig},
    connection_state::{ConnectionState, Metrics},
    protocol::{AdminAction, ApiCommand, ApiError, ApiResponse, EventFrame},
    session::AdminSocketClient,
};

// Re-export the facade
pub use admin::HeliographAdmin;
