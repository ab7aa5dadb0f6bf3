//! Effects - deferred observers that re-run on dependency changes
//!
//! An effect runs its body once at creation and again whenever a source it
//! read during its last run changes. Dependencies are re-tracked on every
//! run, so a branch that stops reading a cell stops subscribing to it.
//! Writes made inside a run never re-enter the body; they queue and drain
//! after it returns, first run included.
//!
//! [`on_cleanup`] registers teardown for the work of one run; registered
//! cleanups fire before the next run and when the effect is disposed.
//! Effects are not scope-owned: whoever created one holds its
//! [`EffectHandle`] and must call [`EffectHandle::dispose`].

use std::cell::RefCell;
use std::rc::Rc;

use super::runtime::{self, ObserverId, ObserverKind};
use super::Cleanup;

thread_local! {
    static CLEANUP_SINKS: RefCell<Vec<Rc<RefCell<Vec<Cleanup>>>>> = RefCell::new(Vec::new());
}

/// Owner handle for a running effect. Dropping the handle does nothing;
/// dispose explicitly to stop the effect.
pub struct EffectHandle {
    observer: ObserverId,
    cleanups: Rc<RefCell<Vec<Cleanup>>>,
}

/// Creates an effect and runs it immediately.
pub fn effect(f: impl FnMut() + 'static) -> EffectHandle {
    let observer = runtime::create_observer(ObserverKind::Deferred);
    let cleanups: Rc<RefCell<Vec<Cleanup>>> = Rc::new(RefCell::new(Vec::new()));
    let body = RefCell::new(f);
    let sink = cleanups.clone();
    let action: Rc<dyn Fn()> = Rc::new(move || {
        run_pending(&sink);
        CLEANUP_SINKS.with(|sinks| sinks.borrow_mut().push(sink.clone()));
        runtime::run_tracked(observer, || (body.borrow_mut())());
        CLEANUP_SINKS.with(|sinks| {
            sinks.borrow_mut().pop();
        });
    });
    runtime::set_action(observer, action.clone());
    // Batched so a write inside the first run queues a re-run instead of
    // re-entering the body mid-borrow.
    runtime::batch(|| action());
    EffectHandle { observer, cleanups }
}

/// Registers teardown for the currently running effect's pass. Outside an
/// effect run there is nothing to attach to; the callback is dropped with
/// a warning.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let attached = CLEANUP_SINKS.with(|sinks| {
        let sinks = sinks.borrow();
        match sinks.last() {
            Some(sink) => {
                sink.borrow_mut().push(Box::new(f));
                true
            }
            None => false,
        }
    });
    if !attached {
        log::warn!("on_cleanup called outside an effect run; callback dropped");
    }
}

fn run_pending(cleanups: &Rc<RefCell<Vec<Cleanup>>>) {
    let pending = std::mem::take(&mut *cleanups.borrow_mut());
    for cleanup in pending {
        cleanup();
    }
}

impl EffectHandle {
    /// Stops the effect: runs pending cleanups and unlinks every
    /// subscription.
    pub fn dispose(self) {
        run_pending(&self.cleanups);
        runtime::dispose_observer(self.observer);
    }

    pub(crate) fn observer_id(&self) -> ObserverId {
        self.observer
    }
}
