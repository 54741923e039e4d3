//! # Quantum-Chain Test Suite
//!
//! Cross-node scenarios for the private contract extension subsystem.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Two nodes sharing one development chain
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests integration::
//! ```

pub mod integration;
