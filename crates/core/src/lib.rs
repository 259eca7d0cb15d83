//! Core error types and utilities shared across the strata workspace.
//!
//! The library crates (`strata-graph`, `strata-reconciler`) carry their own
//! domain error enums; this crate covers the boring edges every front-end
//! needs: file I/O and manifest/state-file parsing.

pub mod error;

pub use error::{Error, Result};
