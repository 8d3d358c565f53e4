//! Per-session class model cache and baseline class lookup.
//!
//! [`ClassCache`] remembers the last accepted version of every class compiled
//! during a live session. Classes not compiled yet in the session are looked
//! up through a [`BaselineProvider`], typically [`DirBaseline`] over the class
//! files of the deployed build.

#![warn(missing_docs)]

pub mod baseline;
pub mod cache;
pub mod error;

pub use baseline::{BaselineProvider, DirBaseline, NoBaseline};
pub use cache::ClassCache;
pub use error::CacheError;
