//! Balanced class allocation.
//!
//! A roster is ranked, cut into top/middle/bottom tiers, each tier is split by
//! gender (and urban/rural origin when the sheet has it), and every sub-group
//! is dealt across the classes in snake order from a shuffled class sequence.

pub mod allocator;
pub mod error;
pub mod grouping;
pub mod loader;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod snake;
pub mod tiers;

pub use error::{AllocationError, Result};
