//! Render layer - materializing descriptions and keeping them live
//!
//! - `binding`: per-position records tying descriptions to their DOM nodes
//! - `reconcile`: rendering, patching, and keyed child reconciliation
//! - `boundary`: error containment, fallbacks, and retry
//! - `mount`: attaching a description tree to a document

mod binding;
mod boundary;
mod mount;
mod reconcile;

pub use boundary::error_boundary;
pub use mount::{mount, MountHandle};
