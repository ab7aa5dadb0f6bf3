//! Reactive Runtime - dependency graph and update scheduling
//!
//! One thread-local arena holds every reactive source (signal, store key,
//! list structure, computed output) and every observer (effect, computed
//! invalidator, render subscription). Sources know their subscribers;
//! observers know the sources they read during their last run, so each run
//! refreshes the dependency set from scratch.
//!
//! Writes are synchronous: `notify_write` runs computed invalidators
//! immediately (they only mark dirtiness) and queues deferred observers,
//! then flushes unless a batch is open. Writes performed while a flush pass
//! is draining are queued into a follow-up pass, never interleaved into the
//! current one, and a cascade that keeps scheduling new passes is cut off
//! at [`MAX_UPDATE_PASSES`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Ceiling on follow-up notification passes in a single flush. A cascade
/// that is still scheduling work past this depth is assumed to be a
/// write-loop between observers; the remaining queue is dropped with an
/// error log instead of hanging the thread.
pub const MAX_UPDATE_PASSES: usize = 64;

/// Handle to a reactive source cell in the runtime arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

/// Handle to an observer record in the runtime arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ObserverId(usize);

/// How an observer reacts when one of its sources changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObserverKind {
    /// Runs inline during `notify_write`. Used by computed cells to mark
    /// themselves dirty and propagate invalidation before any deferred
    /// observer sees the write.
    Immediate,
    /// Queued and run by the flush loop. Used by effects, per-key
    /// subscriptions, and render subscriptions.
    Deferred,
}

struct SourceRecord {
    subscribers: Vec<ObserverId>,
}

struct ObserverRecord {
    kind: ObserverKind,
    action: Option<Rc<dyn Fn()>>,
    deps: Vec<SourceId>,
    queued: bool,
}

enum Frame {
    /// Reads subscribe this observer.
    Observer(ObserverId),
    /// Reads subscribe nothing until the frame is popped.
    Untracked,
}

#[derive(Default)]
struct Runtime {
    sources: Vec<Option<SourceRecord>>,
    free_sources: Vec<usize>,
    observers: Vec<Option<ObserverRecord>>,
    free_observers: Vec<usize>,
    frames: Vec<Frame>,
    captures: Vec<Vec<SourceId>>,
    current: VecDeque<ObserverId>,
    next: VecDeque<ObserverId>,
    batch_depth: usize,
    notify_depth: usize,
    flushing: bool,
}

impl Runtime {
    fn source_mut(&mut self, id: SourceId) -> Option<&mut SourceRecord> {
        self.sources.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    fn observer_mut(&mut self, id: ObserverId) -> Option<&mut ObserverRecord> {
        self.observers.get_mut(id.0).and_then(|slot| slot.as_mut())
    }
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::default());
}

// =============================================================================
// Sources
// =============================================================================

/// Allocates a source cell. Freed slots are reused.
pub fn create_source() -> SourceId {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        let record = SourceRecord {
            subscribers: Vec::new(),
        };
        match rt.free_sources.pop() {
            Some(index) => {
                rt.sources[index] = Some(record);
                SourceId(index)
            }
            None => {
                rt.sources.push(Some(record));
                SourceId(rt.sources.len() - 1)
            }
        }
    })
}

/// Releases a source cell. Subscribers are unlinked; stale ids left in
/// observer dep lists are harmless because dep lists are rebuilt on every
/// tracked run and removal is by-id. Reached from handle `Drop` impls, so
/// during thread-local teardown (runtime already destroyed) it no-ops.
pub fn release_source(source: SourceId) {
    let _ = RUNTIME.try_with(|rt| {
        let mut rt = rt.borrow_mut();
        if let Some(slot) = rt.sources.get_mut(source.0) {
            if slot.take().is_some() {
                rt.free_sources.push(source.0);
            }
        }
    });
}

/// Records a read of `source` against the innermost tracking frame, and
/// into every open capture frame regardless of tracking state.
pub fn track_read(source: SourceId) {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        for frame in rt.captures.iter_mut() {
            if !frame.contains(&source) {
                frame.push(source);
            }
        }
        let observer = match rt.frames.last() {
            Some(Frame::Observer(id)) => *id,
            _ => return,
        };
        let Some(record) = rt.source_mut(source) else {
            return;
        };
        if !record.subscribers.contains(&observer) {
            record.subscribers.push(observer);
        }
        if let Some(record) = rt.observer_mut(observer) {
            if !record.deps.contains(&source) {
                record.deps.push(source);
            }
        }
    });
}

/// Notifies every subscriber of `source` in subscription order: immediate
/// observers run inline, deferred observers are queued for the next flush
/// pass. Outside a batch and outside a flush, drains the queue before
/// returning.
pub fn notify_write(source: SourceId) {
    let subscribers = RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        rt.notify_depth += 1;
        rt.source_mut(source)
            .map(|record| record.subscribers.clone())
            .unwrap_or_default()
    });
    for observer in subscribers {
        let run_now = RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            let Some(record) = rt.observer_mut(observer) else {
                return None;
            };
            match record.kind {
                ObserverKind::Immediate => record.action.clone(),
                ObserverKind::Deferred => {
                    if !record.queued {
                        record.queued = true;
                        rt.next.push_back(observer);
                    }
                    None
                }
            }
        });
        if let Some(action) = run_now {
            action();
        }
    }
    RUNTIME.with(|rt| rt.borrow_mut().notify_depth -= 1);
    maybe_flush();
}

// =============================================================================
// Observers
// =============================================================================

pub(crate) fn create_observer(kind: ObserverKind) -> ObserverId {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        let record = ObserverRecord {
            kind,
            action: None,
            deps: Vec::new(),
            queued: false,
        };
        match rt.free_observers.pop() {
            Some(index) => {
                rt.observers[index] = Some(record);
                ObserverId(index)
            }
            None => {
                rt.observers.push(Some(record));
                ObserverId(rt.observers.len() - 1)
            }
        }
    })
}

pub(crate) fn set_action(observer: ObserverId, action: Rc<dyn Fn()>) {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        if let Some(record) = rt.observer_mut(observer) {
            record.action = Some(action);
        }
    });
}

/// Unlinks the observer from every source and scrubs it from both flush
/// queues so a recycled slot can never fire a stale action. Reached from
/// handle `Drop` impls, so during thread-local teardown (runtime already
/// destroyed) it no-ops.
pub(crate) fn dispose_observer(observer: ObserverId) {
    let _ = RUNTIME.try_with(|rt| {
        let mut rt = rt.borrow_mut();
        let record = match rt.observers.get_mut(observer.0) {
            Some(slot) => slot.take(),
            None => None,
        };
        let Some(record) = record else {
            return;
        };
        for dep in record.deps {
            if let Some(source) = rt.source_mut(dep) {
                source.subscribers.retain(|id| *id != observer);
            }
        }
        rt.free_observers.push(observer.0);
        rt.current.retain(|id| *id != observer);
        rt.next.retain(|id| *id != observer);
    });
}

/// Snapshot of the sources the observer read during its last run.
pub(crate) fn observer_sources(observer: ObserverId) -> Vec<SourceId> {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        rt.observer_mut(observer)
            .map(|record| record.deps.clone())
            .unwrap_or_default()
    })
}

/// Links observer to source without a tracked read. Used for retry
/// subscriptions built from a captured read set.
pub(crate) fn subscribe(observer: ObserverId, source: SourceId) {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        if let Some(record) = rt.source_mut(source) {
            if !record.subscribers.contains(&observer) {
                record.subscribers.push(observer);
            }
        }
        if let Some(record) = rt.observer_mut(observer) {
            if !record.deps.contains(&source) {
                record.deps.push(source);
            }
        }
    });
}

/// Runs `f` as the observer's tracked body: the previous dependency set is
/// dropped first, then every read inside `f` re-links.
pub(crate) fn run_tracked<R>(observer: ObserverId, f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        let deps = match rt.observer_mut(observer) {
            Some(record) => std::mem::take(&mut record.deps),
            None => Vec::new(),
        };
        for dep in deps {
            if let Some(source) = rt.source_mut(dep) {
                source.subscribers.retain(|id| *id != observer);
            }
        }
        rt.frames.push(Frame::Observer(observer));
    });
    let result = f();
    RUNTIME.with(|rt| {
        rt.borrow_mut().frames.pop();
    });
    result
}

// =============================================================================
// Scoping
// =============================================================================

/// Runs `f` with read tracking suppressed. Reads still count toward open
/// capture frames.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.borrow_mut().frames.push(Frame::Untracked));
    let result = f();
    RUNTIME.with(|rt| {
        rt.borrow_mut().frames.pop();
    });
    result
}

/// Runs `f` and returns every source it read, in first-read order,
/// tracked or not.
pub(crate) fn capture_reads<R>(f: impl FnOnce() -> R) -> (R, Vec<SourceId>) {
    RUNTIME.with(|rt| rt.borrow_mut().captures.push(Vec::new()));
    let result = f();
    let reads = RUNTIME.with(|rt| rt.borrow_mut().captures.pop().unwrap_or_default());
    (result, reads)
}

/// Defers notification flushing until `f` returns, so a group of writes is
/// observed as one update pass.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.borrow_mut().batch_depth += 1);
    let result = f();
    RUNTIME.with(|rt| rt.borrow_mut().batch_depth -= 1);
    maybe_flush();
    result
}

// =============================================================================
// Flushing
// =============================================================================

fn maybe_flush() {
    let ready = RUNTIME.with(|rt| {
        let rt = rt.borrow();
        rt.batch_depth == 0 && rt.notify_depth == 0 && !rt.flushing && !rt.next.is_empty()
    });
    if ready {
        flush();
    }
}

enum Drained {
    Run(Rc<dyn Fn()>),
    Skip,
    Done,
}

/// Drains queued deferred observers in passes until the queue settles or
/// [`MAX_UPDATE_PASSES`] is hit. Observers scheduled while a pass runs go
/// into the next pass.
pub fn flush() {
    let entered = RUNTIME.with(|rt| {
        let mut rt = rt.borrow_mut();
        if rt.flushing {
            false
        } else {
            rt.flushing = true;
            true
        }
    });
    if !entered {
        return;
    }

    let mut passes = 0usize;
    loop {
        let has_work = RUNTIME.with(|rt| {
            let mut rt = rt.borrow_mut();
            if rt.next.is_empty() {
                false
            } else {
                rt.current = std::mem::take(&mut rt.next);
                true
            }
        });
        if !has_work {
            break;
        }
        passes += 1;
        if passes > MAX_UPDATE_PASSES {
            let dropped = RUNTIME.with(|rt| {
                let mut rt = rt.borrow_mut();
                let count = rt.current.len() + rt.next.len();
                rt.current.clear();
                rt.next.clear();
                count
            });
            log::error!(
                "update cascade exceeded {MAX_UPDATE_PASSES} passes; dropping {dropped} queued updates"
            );
            break;
        }
        loop {
            let drained = RUNTIME.with(|rt| {
                let mut rt = rt.borrow_mut();
                match rt.current.pop_front() {
                    None => Drained::Done,
                    Some(id) => match rt.observer_mut(id) {
                        Some(record) => {
                            record.queued = false;
                            match &record.action {
                                Some(action) => Drained::Run(action.clone()),
                                None => Drained::Skip,
                            }
                        }
                        None => Drained::Skip,
                    },
                }
            });
            match drained {
                Drained::Done => break,
                Drained::Skip => continue,
                Drained::Run(action) => action(),
            }
        }
    }

    RUNTIME.with(|rt| rt.borrow_mut().flushing = false);
}

/// Drops the entire reactive graph. Test helper; live handles into the old
/// graph become inert.
pub fn reset() {
    RUNTIME.with(|rt| {
        *rt.borrow_mut() = Runtime::default();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn deferred(action: impl Fn() + 'static) -> ObserverId {
        let id = create_observer(ObserverKind::Deferred);
        set_action(id, Rc::new(action));
        id
    }

    #[test]
    fn test_tracked_read_links_and_notify_runs_action() {
        reset();
        let source = create_source();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let id = deferred(move || runs_in.set(runs_in.get() + 1));
        run_tracked(id, || track_read(source));
        notify_write(source);
        assert_eq!(runs.get(), 1, "deferred observer should run once per write");
        notify_write(source);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_rerun_refreshes_dependency_set() {
        reset();
        let a = create_source();
        let b = create_source();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let id = deferred(move || runs_in.set(runs_in.get() + 1));
        run_tracked(id, || track_read(a));
        // Re-run against b only; a must no longer notify.
        run_tracked(id, || track_read(b));
        notify_write(a);
        assert_eq!(runs.get(), 0, "stale dependency should be dropped on re-run");
        notify_write(b);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_untrack_suppresses_subscription() {
        reset();
        let source = create_source();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let id = deferred(move || runs_in.set(runs_in.get() + 1));
        run_tracked(id, || untrack(|| track_read(source)));
        notify_write(source);
        assert_eq!(runs.get(), 0, "untracked read must not subscribe");
    }

    #[test]
    fn test_batch_coalesces_into_single_queue_drain() {
        reset();
        let a = create_source();
        let b = create_source();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let id = deferred(move || runs_in.set(runs_in.get() + 1));
        run_tracked(id, || {
            track_read(a);
            track_read(b);
        });
        batch(|| {
            notify_write(a);
            notify_write(b);
            assert_eq!(runs.get(), 0, "no observer runs while the batch is open");
        });
        assert_eq!(runs.get(), 1, "two writes in a batch coalesce to one run");
    }

    #[test]
    fn test_write_during_flush_lands_in_next_pass() {
        reset();
        let first = create_source();
        let second = create_source();
        let order = Rc::new(RefCell::new(Vec::new()));

        let order_a = order.clone();
        let a = deferred(move || {
            order_a.borrow_mut().push("a-start");
            notify_write(second);
            order_a.borrow_mut().push("a-end");
        });
        run_tracked(a, || track_read(first));

        let order_b = order.clone();
        let b = deferred(move || order_b.borrow_mut().push("b"));
        run_tracked(b, || track_read(second));

        notify_write(first);
        assert_eq!(
            *order.borrow(),
            vec!["a-start", "a-end", "b"],
            "write during a pass must not interleave into the running pass"
        );
    }

    #[test]
    fn test_cascade_is_cut_off_at_pass_ceiling() {
        reset();
        let source = create_source();
        let runs = Rc::new(Cell::new(0usize));
        let runs_in = runs.clone();
        let source_copy = source;
        let id = deferred(move || {
            runs_in.set(runs_in.get() + 1);
            // Re-triggers itself forever; the flush ceiling must stop it.
            notify_write(source_copy);
        });
        run_tracked(id, || track_read(source));
        notify_write(source);
        assert!(
            runs.get() <= MAX_UPDATE_PASSES,
            "self-reviving observer ran {} times, past the ceiling",
            runs.get()
        );
    }

    #[test]
    fn test_disposed_observer_is_scrubbed_from_queue() {
        reset();
        let source = create_source();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let victim = deferred(move || runs_in.set(runs_in.get() + 1));
        run_tracked(victim, || track_read(source));
        batch(|| {
            notify_write(source);
            dispose_observer(victim);
        });
        assert_eq!(runs.get(), 0, "queued observer disposed before flush must not run");
    }

    #[test]
    fn test_capture_records_untracked_reads() {
        reset();
        let a = create_source();
        let b = create_source();
        let ((), reads) = capture_reads(|| {
            track_read(a);
            untrack(|| track_read(b));
            track_read(a);
        });
        assert_eq!(reads, vec![a, b], "capture dedups and keeps first-read order");
    }

    #[test]
    fn test_source_slot_reuse_does_not_leak_subscribers() {
        reset();
        let source = create_source();
        let runs = Rc::new(Cell::new(0));
        let runs_in = runs.clone();
        let id = deferred(move || runs_in.set(runs_in.get() + 1));
        run_tracked(id, || track_read(source));
        release_source(source);
        let reused = create_source();
        assert_eq!(reused, source, "free slot should be reused");
        notify_write(reused);
        assert_eq!(runs.get(), 0, "new source in a recycled slot starts with no subscribers");
    }
}
