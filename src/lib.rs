//! # cinder-dom
//!
//! Fine-grained reactive DOM rendering.
//!
//! Descriptions are cheap data plus thunks; rendering walks a description
//! once and wires one narrow subscription per dynamic aspect. After that
//! there is no tree-wide diffing: a cell write re-runs exactly the thunks
//! that read it, and each one patches its own corner of the document.
//!
//! ## Architecture
//!
//! ```text
//! cells (Signal / Computed / Store) ──writes──► flush
//!        ▲                                        │
//!        │ reads tracked per thunk                │ re-runs narrow subscriptions
//!        │                                        ▼
//! descriptions (VNode) ──mount──► bindings ──targeted patches──► Document
//!        ▲                                                          │
//!        └───────────── listeners ◄──────── dispatch ◄──── events ──┘
//! ```
//!
//! ## Modules
//!
//! - [`reactive`] - cells, subscriptions, and the synchronous flush loop
//! - [`dom`] - the in-memory document: nodes, attributes, listeners
//! - [`vnode`] - node descriptions, components, keys, mount hooks
//! - [`render`] - mounting, reconciliation, error boundaries
//! - [`error`] - the render error type
//!
//! ## Example
//!
//! ```ignore
//! use cinder_dom::*;
//!
//! let count = signal(0i64);
//! let doc = Document::new();
//! let step = count.clone();
//! let view = el("div")
//!     .child(dyn_text(move || Ok(format!("count: {}", count.get()))))
//!     .child(el("button").on("click", move |_| step.update(|n| *n += 1)).child("+"));
//! let handle = mount(&doc, doc.root(), view);
//! ```

pub mod dom;
pub mod error;
pub mod reactive;
pub mod render;
pub mod vnode;

// Re-export the working surface; runtime internals stay under `reactive::`.
pub use error::RenderError;

pub use reactive::{
    batch, computed, create_state, effect, flush, on_cleanup, reset, signal, try_computed,
    untrack, Cleanup, Computed, EffectHandle, List, Signal, Store, Value,
};

pub use dom::{Document, Event, EventHandler, ListenerId, NodeId};

pub use vnode::{
    component, dyn_text, dynamic, el, text, AttrValue, BoundarySpec, Children, Component, Key,
    MountHook, NodeType, Prop, Thunk, VNode,
};

pub use render::{error_boundary, mount, MountHandle};
