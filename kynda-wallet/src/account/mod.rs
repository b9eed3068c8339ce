//! Account functionality
//!
//! This module provides address validation and display formatting for the
//! accounts a linked wallet exposes, across the supported chain families.

mod address;

pub use address::*;
