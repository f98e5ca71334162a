//! File system traversal and staging copies.

pub mod snapshot;
pub mod walker;
