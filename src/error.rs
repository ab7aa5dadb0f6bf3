//! Render Errors - the failure channel of the engine
//!
//! Every fallible stage of rendering (component functions, dynamic thunks,
//! computed cell evaluators) reports through [`RenderError`]. Errors travel
//! up the render tree as ordinary `Result` values until an error boundary
//! intercepts them; an error that reaches the root is shown as a visible
//! marker element instead of unwinding.
//!
//! Structural mismatches (old tree shape vs. new tree shape) are never
//! errors - the reconciler resolves them by replacing nodes.

use thiserror::Error;

/// A render-time failure raised by user code or by a cell it read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// A component function or dynamic thunk failed.
    #[error("{0}")]
    Message(String),

    /// A computed cell's evaluator failed while a render context read it.
    /// Wraps the underlying failure so provenance survives cell chains.
    #[error("computed cell failed: {0}")]
    Computed(Box<RenderError>),

    /// A computed cell read itself (directly or through other cells)
    /// during its own evaluation.
    #[error("cyclic computed read")]
    ComputeCycle,

    /// A dynamic node type kept resolving to another dynamic thunk.
    #[error("dynamic node type did not resolve after {0} steps")]
    TypeResolution(usize),
}

impl RenderError {
    /// Shorthand for the common free-form failure.
    pub fn msg(message: impl Into<String>) -> Self {
        RenderError::Message(message.into())
    }
}
