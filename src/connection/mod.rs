//! Hub link management
//!
//! This module handles:
//! - The persistent WebSocket connection to the hub
//! - Liveness probe replies
//! - Turning press/release frames into arbitrator mutations
//! - Triggering shutdown when the link is lost

mod manager;

pub use manager::{HubSocket, LinkConfig, LinkError, LinkManager};
