//! Core session machinery
//!
//! Everything with real state lives here: the connection state machine, the
//! request correlation table, the wire protocol, and the session task that
//! owns the physical link.

pub mod config;
pub mod connection_state;
pub mod correlator;
pub mod protocol;
pub mod session;
pub mod token;

// Re-export main types
pub use config::{AdminCredentials, SdkConfig, DEV_SDK_DOMAIN, SDK_DOMAIN};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use correlator::RequestCorrelator;
pub use protocol::{AdminAction, ApiCommand, ApiError, ApiResponse, EventFrame, InboundRequest};
pub use session::AdminSocketClient;
pub use token::{generate_response_token, random_string};
