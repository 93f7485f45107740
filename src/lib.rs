//! Live-session backend: a WebSocket signaling relay for classroom video
//! calls and the HTTP-driven lifecycle store that records when each live
//! session starts and ends.

pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod relay;

pub use error::{RelayError, Result};
