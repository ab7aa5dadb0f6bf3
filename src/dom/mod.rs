//! DOM layer - the tree the renderer writes into
//!
//! - `document`: slab-backed node arena with tree surgery, attributes,
//!   listeners, and diagnostics (`to_html`, `mutation_count`)
//! - `event`: dispatch payload and handler types

pub mod document;
pub mod event;

pub use document::{Document, NodeId};
pub use event::{Event, EventHandler, ListenerId};
