//! Update-diff engine
//!
//! Compares the stored version of an item with the desired one and emits
//! a single update expression covering every difference.

mod diff;

pub use diff::{build_update, UpdatePatch, MAX_DIFF_DEPTH};
