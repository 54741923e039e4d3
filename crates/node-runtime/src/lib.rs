//! # Node Runtime Library
//!
//! Configuration loading and node assembly, exposed for testing. The main
//! entry point is the `main.rs` binary.

#![warn(missing_docs)]

pub mod config;
pub mod node;

pub use config::{NodeConfig, NodeConfigError};
pub use node::NodeRuntime;
