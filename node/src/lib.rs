//! Quorumcast node
//!
//! Process roles built on the consensus crate:
//! - Bootstrap peer with a persisted identity
//! - Simulation of several rated agents electing a leader and voting

mod bootstrap;
mod keys;
mod simulation;

pub use bootstrap::*;
pub use keys::*;
pub use simulation::*;
