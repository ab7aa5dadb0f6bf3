//! Computed Cells - lazy derived values
//!
//! A computed cell caches the result of its evaluator and re-tracks its
//! dependencies on every evaluation. When a dependency changes, the cell is
//! only marked dirty (the invalidation propagates through its own
//! subscribers immediately); the evaluator runs again on the next read.
//! A clean cell serves the cached value without evaluating.
//!
//! Evaluators are fallible. A failed evaluation leaves the cell dirty and
//! surfaces the error, wrapped for provenance, to whichever context
//! performed the read.
//!
//! # Example
//! ```ignore
//! let count = signal(2);
//! let doubled = computed(move || count.get() * 2);
//! assert_eq!(doubled.get().unwrap(), 4);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::runtime::{self, ObserverId, ObserverKind, SourceId};
use crate::error::RenderError;

struct ComputedInner<T> {
    source: SourceId,
    observer: ObserverId,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    computing: Cell<bool>,
    eval: Box<dyn Fn() -> Result<T, RenderError>>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        runtime::dispose_observer(self.observer);
        runtime::release_source(self.source);
    }
}

/// Lazy cached derived cell. Cloning the handle shares the cell.
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Computed {
            inner: self.inner.clone(),
        }
    }
}

/// Creates a computed cell from an infallible evaluator.
pub fn computed<T: Clone + 'static>(f: impl Fn() -> T + 'static) -> Computed<T> {
    try_computed(move || Ok(f()))
}

/// Creates a computed cell from a fallible evaluator.
pub fn try_computed<T: Clone + 'static>(
    f: impl Fn() -> Result<T, RenderError> + 'static,
) -> Computed<T> {
    let inner = Rc::new(ComputedInner {
        source: runtime::create_source(),
        observer: runtime::create_observer(ObserverKind::Immediate),
        value: RefCell::new(None),
        dirty: Cell::new(true),
        computing: Cell::new(false),
        eval: Box::new(f),
    });
    let weak = Rc::downgrade(&inner);
    runtime::set_action(
        inner.observer,
        Rc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.dirty.get() {
                inner.dirty.set(true);
                runtime::notify_write(inner.source);
            }
        }),
    );
    Computed { inner }
}

impl<T: Clone + 'static> Computed<T> {
    /// Tracked read. Recomputes first when the cell is dirty.
    pub fn get(&self) -> Result<T, RenderError> {
        runtime::track_read(self.inner.source);
        if self.inner.computing.get() {
            return Err(RenderError::ComputeCycle);
        }
        if self.inner.dirty.get() {
            self.inner.computing.set(true);
            let result = runtime::run_tracked(self.inner.observer, || (self.inner.eval)());
            self.inner.computing.set(false);
            match result {
                Ok(value) => {
                    *self.inner.value.borrow_mut() = Some(value);
                    self.inner.dirty.set(false);
                }
                Err(err) => return Err(RenderError::Computed(Box::new(err))),
            }
        }
        self.inner
            .value
            .borrow()
            .clone()
            .ok_or_else(|| RenderError::msg("computed cell has no value"))
    }

    /// Untracked read. Still recomputes when dirty.
    pub fn peek(&self) -> Result<T, RenderError> {
        runtime::untrack(|| self.get())
    }
}
