//! Quorumcast consensus
//!
//! Leader election and timed quorum voting:
//! - Node agents that join the overlay and report readiness
//! - Highest-rating leader selection over the ready pool
//! - A single 2000 ms vote window at a time, 90% quorum

pub mod agent;
pub mod coordinator;
pub mod leader;
pub mod registry;
pub mod window;

pub use agent::*;
pub use coordinator::*;
pub use leader::*;
pub use registry::*;
pub use window::*;
