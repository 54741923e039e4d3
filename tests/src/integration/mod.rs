//! # Integration Tests
//!
//! End-to-end extension flows between two nodes.

pub mod contract_extension_flow;
