//! Safety Module
//!
//! Process-wide stop signal shared by the link loop, the actuation worker
//! and the outer driver in `main`.

mod shutdown;

pub use shutdown::{ShutdownFlag, ShutdownReason};
