//! Quorumcast Core Library
//!
//! Core types, errors and configuration shared by every quorumcast crate:
//! topic names, protocol constants, the error taxonomy and the node
//! configuration tree.

pub mod types;
pub mod error;
pub mod config;

pub use types::*;
pub use error::*;
pub use config::*;
