//! Error Boundaries - containment and recovery for render failures
//!
//! A boundary renders its wrapped subtree; if building it fails, the
//! error stops here. The fallback takes the failed subtree's place, and
//! the boundary re-attempts the content when any cell read during the
//! failed attempt changes. Errors surfacing later through a narrow
//! subscription inside the subtree arrive via [`trip`] and follow the
//! same path.
//!
//! Fallbacks render against the *enclosing* boundary, so a failing
//! fallback escalates outward instead of looping. With no boundary left
//! the error is logged and the failed subtree stays down.
//!
//! # Example
//! ```ignore
//! let view = error_boundary(
//!     move || Ok(el("section").child(dyn_text(move || body.get()))),
//!     |err| el("div").attr("class", "error").child(text(err.to_string())),
//! );
//! ```

use std::rc::Rc;

use crate::error::RenderError;
use crate::reactive::runtime::{self, ObserverKind, SourceId};
use crate::vnode::{BoundarySpec, VNode};

use super::binding::{
    flush_mount_hooks, live_node, queue_mount_hook, teardown, Binding, BindingFlags, BindingRef,
    BindingWeak, BoundaryState, BoundaryStatus, Rendered,
};
use super::reconcile::{render_vnode, RenderCx};

/// Wraps a subtree in an error boundary. `render` produces the content;
/// `fallback` maps a render error to the description shown in its place.
pub fn error_boundary(
    render: impl Fn() -> Result<VNode, RenderError> + 'static,
    fallback: impl Fn(&RenderError) -> VNode + 'static,
) -> VNode {
    VNode::boundary(BoundarySpec {
        attempt: Rc::new(render),
        fallback: Rc::new(fallback),
    })
}

pub(crate) fn render_boundary(
    desc: &VNode,
    spec: BoundarySpec,
    cx: &RenderCx,
) -> Result<BindingRef, RenderError> {
    // Bootstrap node so the binding exists before its content renders;
    // the content's context points back at this binding.
    let shell = cx.doc.create_placeholder();
    let rc = Binding::new(
        cx.doc.clone(),
        desc.clone(),
        shell,
        Rendered::Boundary(spec),
        cx.enclosing_weak(),
    );
    rc.borrow_mut().boundary = Some(BoundaryState {
        status: BoundaryStatus::Ok,
        retry: None,
    });
    if let Err(err) = attempt_content(&rc) {
        teardown(&rc, true);
        return Err(err);
    }
    cx.doc.remove(shell);
    if desc.mount.is_some() {
        queue_mount_hook(&rc);
    }
    Ok(rc)
}

/// Runs the attempt and installs either the content or the fallback.
/// `Err` means the fallback itself failed to render.
fn attempt_content(rc: &BindingRef) -> Result<(), RenderError> {
    let (doc, spec) = {
        let b = rc.borrow();
        let spec = match &b.rendered {
            Rendered::Boundary(spec) => spec.clone(),
            _ => return Ok(()),
        };
        (b.doc.clone(), spec)
    };
    let cx_inside = RenderCx {
        doc,
        boundary: Some(rc.clone()),
    };
    let (outcome, reads) = runtime::capture_reads(|| {
        (spec.attempt)().and_then(|content| render_vnode(&content, &cx_inside))
    });
    match outcome {
        Ok(content) => {
            swap_inner(rc, content);
            let mut b = rc.borrow_mut();
            b.flags.remove(BindingFlags::FALLBACK_ACTIVE);
            if let Some(state) = &mut b.boundary {
                state.status = BoundaryStatus::Ok;
                if let Some(retry) = state.retry.take() {
                    runtime::dispose_observer(retry);
                }
            }
            Ok(())
        }
        Err(err) => {
            log::warn!("error boundary caught: {err}");
            show_fallback(rc, err, reads)
        }
    }
}

/// Entry point for errors surfacing through a subscription after the
/// initial render. Walks to the nearest live boundary; without one the
/// error is terminal for that subtree.
pub(crate) fn trip(enclosing: Option<BindingWeak>, err: RenderError, sources: Vec<SourceId>) {
    let Some(rc) = enclosing.and_then(|weak| weak.upgrade()) else {
        log::error!("render error escaped all boundaries: {err}");
        return;
    };
    if rc.borrow().flags.contains(BindingFlags::TORN_DOWN) {
        log::error!("render error escaped all boundaries: {err}");
        return;
    }
    log::warn!("error boundary caught: {err}");
    let escalation_sources = sources.clone();
    let (outcome, fallback_reads) =
        runtime::capture_reads(|| show_fallback(&rc, err, sources));
    match outcome {
        Ok(()) => flush_mount_hooks(),
        Err(fallback_err) => {
            let next = rc.borrow().enclosing.clone();
            let mut combined = escalation_sources;
            combined.extend(fallback_reads);
            trip(next, fallback_err, combined);
        }
    }
}

/// Shows the fallback for `err` and arms a retry on `retry_sources`. A
/// repeat of the error already on display re-arms without re-rendering.
fn show_fallback(
    rc: &BindingRef,
    err: RenderError,
    retry_sources: Vec<SourceId>,
) -> Result<(), RenderError> {
    let repeat = {
        let b = rc.borrow();
        b.flags.contains(BindingFlags::FALLBACK_ACTIVE)
            && matches!(
                &b.boundary,
                Some(state) if matches!(&state.status, BoundaryStatus::Failed(prev) if *prev == err)
            )
    };
    if !repeat {
        let (doc, spec, enclosing) = {
            let b = rc.borrow();
            let spec = match &b.rendered {
                Rendered::Boundary(spec) => spec.clone(),
                _ => return Ok(()),
            };
            (b.doc.clone(), spec, b.enclosing.clone())
        };
        // The fallback lives outside this boundary: its failures escalate
        // rather than loop back here.
        let cx = RenderCx {
            doc,
            boundary: enclosing.and_then(|weak| weak.upgrade()),
        };
        let fb_desc = (spec.fallback)(&err);
        let fb = render_vnode(&fb_desc, &cx)?;
        swap_inner(rc, fb);
    }
    {
        let mut b = rc.borrow_mut();
        b.flags.insert(BindingFlags::FALLBACK_ACTIVE);
        if let Some(state) = &mut b.boundary {
            state.status = BoundaryStatus::Failed(err);
        }
    }
    arm_retry(rc, retry_sources);
    Ok(())
}

/// Replaces the boundary's current expansion (content or fallback) with
/// a freshly rendered one, at the same position.
fn swap_inner(rc: &BindingRef, fresh: BindingRef) {
    let doc = rc.borrow().doc.clone();
    let old = rc.borrow().inner.clone();
    if let Some(old_binding) = &old {
        let old_live = live_node(old_binding);
        if let Some(parent) = doc.parent(old_live) {
            doc.insert_before(parent, live_node(&fresh), Some(old_live));
        }
    }
    rc.borrow_mut().inner = Some(fresh);
    if let Some(old_binding) = old {
        teardown(&old_binding, true);
    }
}

fn arm_retry(rc: &BindingRef, sources: Vec<SourceId>) {
    {
        let mut b = rc.borrow_mut();
        if let Some(state) = &mut b.boundary {
            if let Some(old) = state.retry.take() {
                runtime::dispose_observer(old);
            }
        }
    }
    let observer = runtime::create_observer(ObserverKind::Deferred);
    let weak: BindingWeak = Rc::downgrade(rc);
    runtime::set_action(observer, Rc::new(move || retry_attempt(&weak)));
    for source in &sources {
        runtime::subscribe(observer, *source);
    }
    if let Some(state) = &mut rc.borrow_mut().boundary {
        state.retry = Some(observer);
    }
}

fn retry_attempt(weak: &BindingWeak) {
    let Some(rc) = weak.upgrade() else {
        return;
    };
    let failed = {
        let b = rc.borrow();
        !b.flags.contains(BindingFlags::TORN_DOWN)
            && matches!(
                &b.boundary,
                Some(state) if matches!(state.status, BoundaryStatus::Failed(_))
            )
    };
    if !failed {
        return;
    }
    let (outcome, reads) = runtime::capture_reads(|| attempt_content(&rc));
    match outcome {
        Ok(()) => flush_mount_hooks(),
        Err(err) => {
            let enclosing = rc.borrow().enclosing.clone();
            trip(enclosing, err, reads);
        }
    }
}
