//! Utilities for schema_promote
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;

// Re-export key utility functions
pub use naming::{full_name, identity_key, quote_identifier};
