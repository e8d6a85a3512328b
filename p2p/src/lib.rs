//! Quorumcast P2P Networking
//!
//! Provides the overlay the validation protocol runs on:
//! - Gossipsub over TCP with Noise encryption and Yamux multiplexing
//! - mDNS and bootstrap-list peer discovery
//! - A JSON wire codec selected by topic
//! - A per-node message router with scoped topic handlers
//! - An in-memory hub implementing the same overlay contract

pub mod behaviour;
pub mod memory;
pub mod message;
pub mod network;
pub mod overlay;
pub mod peer;
pub mod router;

pub use behaviour::*;
pub use memory::*;
pub use message::*;
pub use network::*;
pub use overlay::*;
pub use peer::*;
pub use router::*;
