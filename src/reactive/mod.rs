//! Reactive layer - cells, subscriptions, and update scheduling
//!
//! Everything the renderer observes lives here:
//!
//! - `runtime`: the dependency graph and the synchronous flush loop
//! - `signal`: writable cells
//! - `computed`: lazy cached derived cells
//! - `effect`: deferred observers with per-run cleanup
//! - `store`: the nested state tree (`Store`, `List`, `Value`)
//!
//! The runtime is thread-local; handles must stay on the thread that
//! created them.

pub mod computed;
pub mod effect;
pub mod runtime;
pub mod signal;
pub mod store;

pub use computed::{computed, try_computed, Computed};
pub use effect::{effect, on_cleanup, EffectHandle};
pub use runtime::{
    batch, create_source, flush, notify_write, release_source, reset, track_read, untrack,
    SourceId, MAX_UPDATE_PASSES,
};
pub use signal::{signal, Signal};
pub use store::{create_state, List, Store, Value};

/// Deferred teardown for a subscription or a mounted resource.
pub type Cleanup = Box<dyn FnOnce()>;
