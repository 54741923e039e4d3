//! # Shared Types Crate
//!
//! Chain primitives shared by every crate in the workspace: addresses,
//! hashes, 256-bit integers, event logs and transactions.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every crate names chain data with these types.
//! - **Stable Text Form**: `Address` and `Hash` serialize as `0x` hex strings,
//!   which keeps persisted files human-readable and usable as JSON map keys.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
