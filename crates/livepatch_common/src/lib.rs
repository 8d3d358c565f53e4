//! Shared foundational types used across the livepatch workspace.
//!
//! This crate provides content hashing for class-file bytes and the internal
//! error type used for invariant violations.

#![warn(missing_docs)]

pub mod hash;
pub mod result;

pub use hash::ContentHash;
pub use result::{InternalError, LiveResult};
