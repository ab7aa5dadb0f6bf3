//! Signals - writable reactive cells
//!
//! A signal owns one value and one source cell. Reads inside a tracked
//! context subscribe that context; writes notify subscribers synchronously.
//! Writes always notify, even when the new value compares equal to the old
//! one - deduplication is the consumer's job (the renderer skips DOM calls
//! on unchanged resolved values).
//!
//! # Example
//! ```ignore
//! let count = signal(0);
//! count.set(count.peek() + 1);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::runtime::{self, SourceId};

struct SignalInner<T> {
    source: SourceId,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        runtime::release_source(self.source);
    }
}

/// Writable reactive cell. Cloning the handle shares the cell.
pub struct Signal<T: Clone + 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal {
            inner: self.inner.clone(),
        }
    }
}

/// Creates a signal holding `value`.
pub fn signal<T: Clone + 'static>(value: T) -> Signal<T> {
    Signal {
        inner: Rc::new(SignalInner {
            source: runtime::create_source(),
            value: RefCell::new(value),
        }),
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Tracked read: subscribes the current observer, if any.
    pub fn get(&self) -> T {
        runtime::track_read(self.inner.source);
        self.inner.value.borrow().clone()
    }

    /// Untracked read.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Replaces the value and notifies subscribers.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        runtime::notify_write(self.inner.source);
    }

    /// Mutates the value in place and notifies subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        runtime::notify_write(self.inner.source);
    }
}
