//! # Versa Testkit
//!
//! Test utilities for Versa.
//!
//! This crate provides:
//! - Test fixtures and store helpers
//! - A replica set harness wiring a primary to its secondaries
//! - Property-based test generators and a reference model
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use versa_testkit::prelude::*;
//!
//! with_store(|store| {
//!     put(store, 1, "one".to_string()).unwrap();
//!     assert_eq!(get(store, &1).unwrap().as_deref(), Some("one"));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod replica;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::replica::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use replica::*;
pub use stress::*;
