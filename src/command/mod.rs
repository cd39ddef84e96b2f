//! Command arbitration
//!
//! Turns discrete press/release events into a continuously-maintained set
//! of held actions and decides which one the motors should follow.

mod arbitrator;

pub use arbitrator::{ArbitrationPolicy, CommandArbitrator};
