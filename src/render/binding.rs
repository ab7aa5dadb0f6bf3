//! Live Bindings - the record tying a description position to the DOM
//!
//! Every rendered position owns one binding: the node it produced, the
//! resolved type it rendered as, the applied attribute cache, listener
//! registrations, child bindings, and the narrow subscriptions that keep
//! each dynamic aspect current. Subscriptions hold only `Weak` references
//! back to their binding, so tearing a subtree down drops everything.
//!
//! Mount hooks are queued while a subtree is built detached and run once
//! the tree is attached, children before parents. Teardown runs hook
//! cleanups first (parents before children), then disposes subscriptions
//! and listeners, and removes the DOM subtree last.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::dom::{Document, EventHandler, ListenerId, NodeId};
use crate::error::RenderError;
use crate::reactive::runtime::{self, ObserverId};
use crate::reactive::{Cleanup, EffectHandle};
use crate::vnode::{AttrValue, BoundarySpec, Component, Key, VNode};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct BindingFlags: u8 {
        /// The mount hook already ran for the current node.
        const HOOK_RAN = 1 << 0;
        /// Boundary binding currently showing its fallback.
        const FALLBACK_ACTIVE = 1 << 1;
        /// Torn down; every operation on this binding is a no-op.
        const TORN_DOWN = 1 << 2;
        /// Node type is thunk-driven.
        const DYNAMIC_TYPE = 1 << 3;
    }
}

/// The type a position actually rendered as, after thunk resolution.
#[derive(Clone)]
pub(crate) enum Rendered {
    Tag(String),
    Text(String),
    Empty,
    Component(Component),
    Boundary(BoundarySpec),
}

/// Error-boundary bookkeeping, present only on boundary bindings.
pub(crate) struct BoundaryState {
    pub status: BoundaryStatus,
    /// Re-attempt subscription armed while Failed.
    pub retry: Option<ObserverId>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum BoundaryStatus {
    Ok,
    Failed(RenderError),
}

pub(crate) type BindingRef = Rc<RefCell<Binding>>;
pub(crate) type BindingWeak = Weak<RefCell<Binding>>;

pub(crate) struct Binding {
    pub doc: Document,
    pub desc: VNode,
    /// Own DOM node for Tag/Text/Empty bindings. Bindings with `inner`
    /// (components, boundaries) have no node of their own; use
    /// [`live_node`] for positioning.
    pub node: NodeId,
    pub rendered: Rendered,
    /// Effective reconciliation key (duplicates demoted to unkeyed).
    pub key: Option<Key>,
    pub flags: BindingFlags,
    /// Resolved attribute values as last applied.
    pub attrs: HashMap<String, AttrValue>,
    /// Listener registrations by event name.
    pub listeners: HashMap<String, (ListenerId, EventHandler)>,
    pub children: Vec<BindingRef>,
    /// Expansion of a component body or active boundary content/fallback.
    pub inner: Option<BindingRef>,
    pub type_sub: Option<EffectHandle>,
    pub prop_subs: Vec<EffectHandle>,
    pub children_sub: Option<EffectHandle>,
    pub boundary: Option<BoundaryState>,
    /// Nearest enclosing error boundary.
    pub enclosing: Option<BindingWeak>,
    pub hook_cleanup: Option<Cleanup>,
}

impl Binding {
    pub fn new(
        doc: Document,
        desc: VNode,
        node: NodeId,
        rendered: Rendered,
        enclosing: Option<BindingWeak>,
    ) -> BindingRef {
        let key = desc.get_key().cloned();
        Rc::new(RefCell::new(Binding {
            doc,
            desc,
            node,
            rendered,
            key,
            flags: BindingFlags::default(),
            attrs: HashMap::new(),
            listeners: HashMap::new(),
            children: Vec::new(),
            inner: None,
            type_sub: None,
            prop_subs: Vec::new(),
            children_sub: None,
            boundary: None,
            enclosing,
            hook_cleanup: None,
        }))
    }
}

/// The DOM node currently occupying this binding's position.
pub(crate) fn live_node(binding: &BindingRef) -> NodeId {
    let b = binding.borrow();
    match &b.inner {
        Some(inner) => live_node(inner),
        None => b.node,
    }
}

/// Tears a binding down: hook cleanup, subscriptions, listeners, children,
/// then (at the subtree root) the DOM node itself. Idempotent.
pub(crate) fn teardown(binding: &BindingRef, remove_node: bool) {
    let taken = {
        let mut b = binding.borrow_mut();
        if b.flags.contains(BindingFlags::TORN_DOWN) {
            return;
        }
        b.flags.insert(BindingFlags::TORN_DOWN);
        (
            b.doc.clone(),
            b.node,
            b.hook_cleanup.take(),
            b.type_sub.take(),
            std::mem::take(&mut b.prop_subs),
            b.children_sub.take(),
            std::mem::take(&mut b.children),
            b.inner.take(),
            b.boundary.take(),
            std::mem::take(&mut b.listeners),
        )
    };
    let (doc, node, cleanup, type_sub, prop_subs, children_sub, children, inner, boundary, listeners) =
        taken;

    if let Some(cleanup) = cleanup {
        cleanup();
    }
    for sub in type_sub.into_iter().chain(prop_subs).chain(children_sub) {
        sub.dispose();
    }
    if let Some(state) = boundary {
        if let Some(retry) = state.retry {
            runtime::dispose_observer(retry);
        }
    }
    for (_, (id, _)) in listeners {
        doc.remove_listener(node, id);
    }
    for child in &children {
        teardown(child, false);
    }
    let has_inner = inner.is_some();
    if let Some(inner) = inner {
        // The inner binding owns the real node; removal propagates there.
        teardown(&inner, remove_node);
    }
    if remove_node && !has_inner {
        doc.remove(node);
    }
}

// =============================================================================
// Mount hook queue
// =============================================================================

thread_local! {
    static PENDING_HOOKS: RefCell<Vec<BindingRef>> = RefCell::new(Vec::new());
}

/// Queues a binding's mount hook. Hooks queue while subtrees build
/// detached; render entry points flush after attaching.
pub(crate) fn queue_mount_hook(binding: &BindingRef) {
    PENDING_HOOKS.with(|pending| pending.borrow_mut().push(binding.clone()));
}

/// Runs queued hooks in queue order (children first). A hook may trigger
/// further renders; anything they queue is drained too. Hook bodies run
/// untracked, so a read inside a hook never subscribes the render
/// subscription whose re-run flushed it.
pub(crate) fn flush_mount_hooks() {
    loop {
        let next = PENDING_HOOKS.with(|pending| {
            let mut pending = pending.borrow_mut();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        });
        let Some(binding) = next else {
            break;
        };
        let ready = {
            let b = binding.borrow();
            !b.flags
                .intersects(BindingFlags::TORN_DOWN | BindingFlags::HOOK_RAN)
        };
        if !ready {
            continue;
        }
        let (doc, hook) = {
            let b = binding.borrow();
            (b.doc.clone(), b.desc.mount.clone())
        };
        let Some(hook) = hook else {
            continue;
        };
        binding.borrow_mut().flags.insert(BindingFlags::HOOK_RAN);
        let node = live_node(&binding);
        let cleanup = runtime::untrack(|| hook(&doc, node));
        let mut b = binding.borrow_mut();
        if b.flags.contains(BindingFlags::TORN_DOWN) {
            // Hook tore its own subtree down; run the cleanup right away.
            drop(b);
            if let Some(cleanup) = cleanup {
                cleanup();
            }
        } else {
            b.hook_cleanup = cleanup;
        }
    }
}

