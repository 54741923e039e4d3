//! # Domain Module
//!
//! Core domain types for contract extension.

pub mod abi;
pub mod entities;
pub mod errors;
pub mod value_objects;

pub use abi::AbiError;
pub use entities::*;
pub use errors::*;
pub use value_objects::*;
