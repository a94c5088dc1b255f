//! Self-ping keepalive.

pub mod service;

pub use service::{HeartbeatResult, HeartbeatService};
