//! Reconciler - materializes descriptions and keeps them current
//!
//! Rendering walks a description once and wires one narrow subscription
//! per dynamic aspect:
//!
//! - a dynamic prop thunk patches exactly that attribute
//! - a dynamic child-list thunk re-runs only child reconciliation
//! - a dynamic type thunk replaces the whole node when the resolved type
//!   changes, and does nothing otherwise (text payloads patch in place)
//!
//! Matching during child reconciliation is identity-first: keyed entries
//! match their key anywhere in the old list, unkeyed entries match the
//! previous unkeyed entries in order. Matched bindings keep their DOM
//! nodes; moves are minimized by keeping the longest increasing run of
//! surviving old positions in place and inserting everything else.
//!
//! Every applied value is cached on the binding, and a resolved value
//! equal to the cache is dropped before any document call. Re-rendering
//! with unchanged state is observable as zero mutations.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::dom::{Document, NodeId};
use crate::error::RenderError;
use crate::reactive::effect::effect;
use crate::reactive::runtime::{self, ObserverId};
use crate::reactive::{untrack, EffectHandle};
use crate::vnode::{AttrValue, Children, Key, NodeType, Prop, Thunk, VNode};

use super::binding::{
    flush_mount_hooks, live_node, queue_mount_hook, teardown, Binding, BindingFlags, BindingRef,
    BindingWeak, Rendered,
};
use super::boundary;

/// How many times a dynamic type may resolve to another dynamic thunk
/// before the position is declared unresolvable.
const TYPE_RESOLUTION_LIMIT: usize = 8;

/// Ambient state for a render walk: the target document and the nearest
/// enclosing error boundary.
#[derive(Clone)]
pub(crate) struct RenderCx {
    pub doc: Document,
    pub boundary: Option<BindingRef>,
}

impl RenderCx {
    pub fn enclosing_weak(&self) -> Option<BindingWeak> {
        self.boundary.as_ref().map(Rc::downgrade)
    }
}

/// Rebuilds the context a binding was rendered under, for subscription
/// re-runs. Holds the boundary only as long as the call.
fn cx_for(binding: &BindingRef) -> RenderCx {
    let b = binding.borrow();
    RenderCx {
        doc: b.doc.clone(),
        boundary: b.enclosing.as_ref().and_then(std::rc::Weak::upgrade),
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Renders a description into a detached binding tree. The caller attaches
/// the tree (and flushes mount hooks) once it is positioned.
pub(crate) fn render_vnode(desc: &VNode, cx: &RenderCx) -> Result<BindingRef, RenderError> {
    match &desc.node_type {
        NodeType::Tag(tag) => render_tag(desc, tag.clone(), cx),
        NodeType::Text(s) => {
            let node = cx.doc.create_text(s.clone());
            let rc = Binding::new(
                cx.doc.clone(),
                desc.clone(),
                node,
                Rendered::Text(s.clone()),
                cx.enclosing_weak(),
            );
            if desc.mount.is_some() {
                queue_mount_hook(&rc);
            }
            Ok(rc)
        }
        NodeType::Empty => {
            let node = cx.doc.create_placeholder();
            let rc = Binding::new(
                cx.doc.clone(),
                desc.clone(),
                node,
                Rendered::Empty,
                cx.enclosing_weak(),
            );
            if desc.mount.is_some() {
                queue_mount_hook(&rc);
            }
            Ok(rc)
        }
        NodeType::Component(comp) => render_component(desc, cx, comp.clone()),
        NodeType::Boundary(spec) => boundary::render_boundary(desc, spec.clone(), cx),
        NodeType::Dynamic(thunk) => render_dynamic(desc, thunk.clone(), cx),
    }
}

fn render_tag(desc: &VNode, tag: String, cx: &RenderCx) -> Result<BindingRef, RenderError> {
    let node = cx.doc.create_element(&tag);
    let rc = Binding::new(
        cx.doc.clone(),
        desc.clone(),
        node,
        Rendered::Tag(tag),
        cx.enclosing_weak(),
    );
    let built = sync_props(&rc).and_then(|()| setup_children(&rc, cx));
    if let Err(err) = built {
        teardown(&rc, true);
        return Err(err);
    }
    if desc.mount.is_some() {
        queue_mount_hook(&rc);
    }
    Ok(rc)
}

fn render_component(
    desc: &VNode,
    cx: &RenderCx,
    comp: crate::vnode::Component,
) -> Result<BindingRef, RenderError> {
    if !desc.props.is_empty() {
        log::warn!("props on a component description are ignored; capture inputs in the closure");
    }
    // Component bodies run once, untracked: reactivity belongs to the
    // thunks inside the description they return.
    let body = untrack(|| comp.call())?;
    let inner = render_vnode(&body, cx)?;
    let rc = Binding::new(
        cx.doc.clone(),
        desc.clone(),
        live_node(&inner),
        Rendered::Component(comp),
        cx.enclosing_weak(),
    );
    rc.borrow_mut().inner = Some(inner);
    if desc.mount.is_some() {
        queue_mount_hook(&rc);
    }
    Ok(rc)
}

fn render_dynamic(desc: &VNode, thunk: Thunk<NodeType>, cx: &RenderCx) -> Result<BindingRef, RenderError> {
    let node = cx.doc.create_placeholder();
    let rc = Binding::new(
        cx.doc.clone(),
        desc.clone(),
        node,
        Rendered::Empty,
        cx.enclosing_weak(),
    );
    rc.borrow_mut().flags.insert(BindingFlags::DYNAMIC_TYPE);
    if let Err(err) = install_type_sub(&rc, thunk) {
        teardown(&rc, true);
        return Err(err);
    }
    Ok(rc)
}

fn resolve_type(thunk: &Thunk<NodeType>) -> Result<Rendered, RenderError> {
    let mut current = thunk()?;
    for _ in 0..TYPE_RESOLUTION_LIMIT {
        match current {
            NodeType::Tag(tag) => return Ok(Rendered::Tag(tag)),
            NodeType::Text(s) => return Ok(Rendered::Text(s)),
            NodeType::Empty => return Ok(Rendered::Empty),
            NodeType::Component(comp) => return Ok(Rendered::Component(comp)),
            NodeType::Boundary(spec) => return Ok(Rendered::Boundary(spec)),
            NodeType::Dynamic(inner) => current = inner()?,
        }
    }
    Err(RenderError::TypeResolution(TYPE_RESOLUTION_LIMIT))
}

fn static_shape(node_type: &NodeType) -> Option<Rendered> {
    match node_type {
        NodeType::Tag(tag) => Some(Rendered::Tag(tag.clone())),
        NodeType::Text(s) => Some(Rendered::Text(s.clone())),
        NodeType::Empty => Some(Rendered::Empty),
        NodeType::Component(comp) => Some(Rendered::Component(comp.clone())),
        NodeType::Boundary(spec) => Some(Rendered::Boundary(spec.clone())),
        NodeType::Dynamic(_) => None,
    }
}

fn same_shape(a: &Rendered, b: &Rendered) -> bool {
    match (a, b) {
        (Rendered::Tag(x), Rendered::Tag(y)) => x == y,
        (Rendered::Text(_), Rendered::Text(_)) => true,
        (Rendered::Empty, Rendered::Empty) => true,
        (Rendered::Component(x), Rendered::Component(y)) => {
            crate::vnode::Component::ptr_eq(x, y)
        }
        (Rendered::Boundary(x), Rendered::Boundary(y)) => {
            crate::vnode::BoundarySpec::ptr_eq(x, y)
        }
        _ => false,
    }
}

// =============================================================================
// Guarded subscriptions
// =============================================================================

/// Wires a narrow subscription for one dynamic aspect of a binding. The
/// body runs immediately; an error from that first run aborts the render
/// and is returned here. Errors from later runs trip the binding's
/// nearest enclosing boundary, carrying the subscription's current read
/// set for the boundary's retry.
fn guarded_effect(
    binding: &BindingRef,
    mut run: impl FnMut(&BindingRef, bool) -> Result<(), RenderError> + 'static,
) -> Result<EffectHandle, RenderError> {
    let weak = Rc::downgrade(binding);
    let initial = Rc::new(Cell::new(true));
    let first_error: Rc<RefCell<Option<RenderError>>> = Rc::new(RefCell::new(None));
    let own_observer: Rc<Cell<Option<ObserverId>>> = Rc::new(Cell::new(None));

    let initial_in = initial.clone();
    let error_in = first_error.clone();
    let observer_in = own_observer.clone();
    let handle = effect(move || {
        let Some(binding) = weak.upgrade() else {
            return;
        };
        if binding.borrow().flags.contains(BindingFlags::TORN_DOWN) {
            return;
        }
        if let Err(err) = run(&binding, initial_in.get()) {
            if initial_in.get() {
                *error_in.borrow_mut() = Some(err);
            } else {
                let sources = observer_in
                    .get()
                    .map(runtime::observer_sources)
                    .unwrap_or_default();
                let enclosing = binding.borrow().enclosing.clone();
                boundary::trip(enclosing, err, sources);
            }
        }
    });
    own_observer.set(Some(handle.observer_id()));
    initial.set(false);
    if let Some(err) = first_error.borrow_mut().take() {
        handle.dispose();
        return Err(err);
    }
    Ok(handle)
}

// =============================================================================
// Props
// =============================================================================

/// Applies the binding's current prop list against its caches: literal
/// values compare-and-set, dynamic values get one subscription each,
/// listeners replace only on identity change, and props gone from the
/// description are removed.
fn sync_props(rc: &BindingRef) -> Result<(), RenderError> {
    let (doc, node, props) = {
        let b = rc.borrow();
        (b.doc.clone(), b.node, b.desc.props.clone())
    };
    let mut listener_names: HashSet<String> = HashSet::new();
    let mut attr_names: HashSet<String> = HashSet::new();

    for (name, prop) in props {
        match prop {
            Prop::Listener(handler) => {
                listener_names.insert(name.clone());
                let existing = rc
                    .borrow()
                    .listeners
                    .get(&name)
                    .map(|(id, current)| (*id, Rc::ptr_eq(current, &handler)));
                match existing {
                    Some((_, true)) => {}
                    Some((old_id, false)) => {
                        doc.remove_listener(node, old_id);
                        let id = doc.add_listener(node, name.as_str(), handler.clone());
                        rc.borrow_mut().listeners.insert(name, (id, handler));
                    }
                    None => {
                        let id = doc.add_listener(node, name.as_str(), handler.clone());
                        rc.borrow_mut().listeners.insert(name, (id, handler));
                    }
                }
            }
            Prop::Value(value) => {
                attr_names.insert(name.clone());
                apply_attr(&doc, node, rc, &name, value);
            }
            Prop::Dynamic(thunk) => {
                attr_names.insert(name.clone());
                let doc_in = doc.clone();
                let name_in = name.clone();
                let sub = guarded_effect(rc, move |binding, _initial| {
                    let value = thunk()?;
                    apply_attr(&doc_in, node, binding, &name_in, value);
                    Ok(())
                })?;
                rc.borrow_mut().prop_subs.push(sub);
            }
        }
    }

    let stale_listeners: Vec<(String, crate::dom::ListenerId)> = rc
        .borrow()
        .listeners
        .iter()
        .filter(|(name, _)| !listener_names.contains(*name))
        .map(|(name, (id, _))| (name.clone(), *id))
        .collect();
    for (name, id) in stale_listeners {
        doc.remove_listener(node, id);
        rc.borrow_mut().listeners.remove(&name);
    }

    let stale_attrs: Vec<(String, bool)> = rc
        .borrow()
        .attrs
        .iter()
        .filter(|(name, _)| !attr_names.contains(*name))
        .map(|(name, value)| (name.clone(), value.is_present()))
        .collect();
    for (name, present) in stale_attrs {
        if present {
            doc.remove_attribute(node, &name);
        }
        rc.borrow_mut().attrs.remove(&name);
    }
    Ok(())
}

/// Presence-aware attribute write, skipped entirely when the resolved
/// value matches the cache.
fn apply_attr(doc: &Document, node: NodeId, binding: &BindingRef, name: &str, new: AttrValue) {
    let prev = binding.borrow().attrs.get(name).cloned();
    if prev.as_ref() == Some(&new) {
        return;
    }
    let was_present = prev.map(|p| p.is_present()).unwrap_or(false);
    if new.is_present() {
        doc.set_attribute(node, name, new.text());
    } else if was_present {
        doc.remove_attribute(node, name);
    }
    binding.borrow_mut().attrs.insert(name.to_string(), new);
}

// =============================================================================
// Children
// =============================================================================

fn setup_children(rc: &BindingRef, cx: &RenderCx) -> Result<(), RenderError> {
    let children_desc = rc.borrow().desc.children.clone();
    match children_desc {
        Children::Static(descs) => reconcile_children(rc, descs, cx),
        Children::Dynamic(thunk) => {
            let sub = guarded_effect(rc, move |binding, initial| {
                let descs = thunk()?;
                let cx = cx_for(binding);
                reconcile_children(binding, descs, &cx)?;
                if !initial {
                    flush_mount_hooks();
                }
                Ok(())
            })?;
            rc.borrow_mut().children_sub = Some(sub);
            Ok(())
        }
    }
}

/// Reconciles an element's live child bindings against a new description
/// list: match (keyed anywhere, unkeyed in order), tear down the
/// unmatched, patch survivors, mount the new, then reorder with minimal
/// moves.
pub(crate) fn reconcile_children(
    parent: &BindingRef,
    descs: Vec<VNode>,
    cx: &RenderCx,
) -> Result<(), RenderError> {
    let (doc, parent_node, old) = {
        let b = parent.borrow();
        (b.doc.clone(), b.node, b.children.clone())
    };
    let old: Vec<BindingRef> = old
        .into_iter()
        .filter(|b| !b.borrow().flags.contains(BindingFlags::TORN_DOWN))
        .collect();

    let eff_keys = effective_keys(&descs);

    let mut by_key: HashMap<Key, usize> = HashMap::new();
    let mut unkeyed_old: VecDeque<usize> = VecDeque::new();
    for (i, b) in old.iter().enumerate() {
        match b.borrow().key.clone() {
            Some(key) => {
                by_key.entry(key).or_insert(i);
            }
            None => unkeyed_old.push_back(i),
        }
    }

    let mut claimed = vec![false; old.len()];
    let mut matches: Vec<Option<usize>> = Vec::with_capacity(descs.len());
    for key in &eff_keys {
        let idx = match key {
            Some(key) => by_key.get(key).copied().filter(|i| !claimed[*i]),
            None => unkeyed_old.pop_front(),
        };
        if let Some(i) = idx {
            claimed[i] = true;
        }
        matches.push(idx);
    }

    for (i, b) in old.iter().enumerate() {
        if !claimed[i] {
            teardown(b, true);
        }
    }

    let mut new_children: Vec<(BindingRef, Option<usize>)> = Vec::with_capacity(descs.len());
    let mut built: Vec<BindingRef> = Vec::new();
    for ((desc, eff_key), old_idx) in descs.into_iter().zip(eff_keys).zip(matches) {
        let attempt = match old_idx {
            Some(i) => patch_binding(&old[i], &desc, cx),
            None => render_vnode(&desc, cx),
        };
        match attempt {
            Ok(rc) => {
                rc.borrow_mut().key = eff_key;
                let fresh = match old_idx {
                    Some(i) => !Rc::ptr_eq(&rc, &old[i]),
                    None => true,
                };
                if fresh {
                    built.push(rc.clone());
                }
                new_children.push((rc, old_idx));
            }
            Err(err) => {
                for b in &built {
                    teardown(b, true);
                }
                return Err(err);
            }
        }
    }

    let survivors: Vec<(usize, usize)> = new_children
        .iter()
        .enumerate()
        .filter_map(|(new_i, (_, old_i))| old_i.map(|o| (new_i, o)))
        .collect();
    let stable = longest_increasing_run(&survivors);
    let mut anchor: Option<NodeId> = None;
    for i in (0..new_children.len()).rev() {
        let (rc, old_i) = &new_children[i];
        let node = live_node(rc);
        if old_i.is_some() && stable.contains(&i) {
            anchor = Some(node);
            continue;
        }
        doc.insert_before(parent_node, node, anchor);
        anchor = Some(node);
    }

    parent.borrow_mut().children = new_children.into_iter().map(|(rc, _)| rc).collect();
    Ok(())
}

/// First occurrence of a key wins; later duplicates are demoted to
/// unkeyed with a warning.
fn effective_keys(descs: &[VNode]) -> Vec<Option<Key>> {
    let mut seen: HashSet<Key> = HashSet::new();
    descs
        .iter()
        .map(|desc| match desc.get_key() {
            Some(key) if seen.insert(key.clone()) => Some(key.clone()),
            Some(key) => {
                log::warn!("duplicate key {key:?} in child list; extra entry treated as unkeyed");
                None
            }
            None => None,
        })
        .collect()
}

/// Positions (into the new list) of the longest run of survivors whose
/// old indices already increase; those keep their DOM order.
fn longest_increasing_run(entries: &[(usize, usize)]) -> HashSet<usize> {
    if entries.is_empty() {
        return HashSet::new();
    }
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; entries.len()];
    for (i, &(_, old)) in entries.iter().enumerate() {
        let pos = tails.partition_point(|&t| entries[t].1 < old);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }
    let mut stable = HashSet::new();
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        stable.insert(entries[i].0);
        cursor = prev[i];
    }
    stable
}

// =============================================================================
// Patching
// =============================================================================

/// Brings a live binding up to a new description at the same position.
/// Returns the same binding when the resolved type allows reuse, or a
/// freshly rendered replacement already swapped into the DOM.
pub(crate) fn patch_binding(
    old: &BindingRef,
    desc: &VNode,
    cx: &RenderCx,
) -> Result<BindingRef, RenderError> {
    if old.borrow().flags.contains(BindingFlags::TORN_DOWN) {
        return render_vnode(desc, cx);
    }

    // Old thunk subscriptions die with the old description.
    let (type_sub, prop_subs, children_sub) = {
        let mut b = old.borrow_mut();
        (
            b.type_sub.take(),
            std::mem::take(&mut b.prop_subs),
            b.children_sub.take(),
        )
    };
    for sub in type_sub.into_iter().chain(prop_subs).chain(children_sub) {
        sub.dispose();
    }

    let was_wrapper = old.borrow().flags.contains(BindingFlags::DYNAMIC_TYPE);
    if let NodeType::Dynamic(thunk) = &desc.node_type {
        if was_wrapper {
            old.borrow_mut().desc = desc.clone();
            install_type_sub(old, thunk.clone())?;
            return Ok(old.clone());
        }
        return replace_binding(old, desc, cx);
    }
    if was_wrapper {
        return replace_binding(old, desc, cx);
    }

    let Some(shape) = static_shape(&desc.node_type) else {
        return replace_binding(old, desc, cx);
    };
    if !same_shape(&old.borrow().rendered, &shape) {
        return replace_binding(old, desc, cx);
    }

    old.borrow_mut().desc = desc.clone();
    match shape {
        Rendered::Text(s) => patch_text(old, s),
        Rendered::Tag(_) => {
            sync_props(old)?;
            setup_children(old, cx)?;
        }
        Rendered::Empty | Rendered::Component(_) | Rendered::Boundary(_) => {}
    }
    Ok(old.clone())
}

fn patch_text(binding: &BindingRef, s: String) {
    let (doc, node, current) = {
        let b = binding.borrow();
        let current = match &b.rendered {
            Rendered::Text(t) => t.clone(),
            _ => String::new(),
        };
        (b.doc.clone(), b.node, current)
    };
    if current != s {
        doc.set_text(node, s.clone());
        binding.borrow_mut().rendered = Rendered::Text(s);
    }
}

fn replace_binding(old: &BindingRef, desc: &VNode, cx: &RenderCx) -> Result<BindingRef, RenderError> {
    let fresh = render_vnode(desc, cx)?;
    let doc = old.borrow().doc.clone();
    let old_live = live_node(old);
    if let Some(parent) = doc.parent(old_live) {
        doc.insert_before(parent, live_node(&fresh), Some(old_live));
    }
    teardown(old, true);
    Ok(fresh)
}

// =============================================================================
// Dynamic node types
// =============================================================================

fn install_type_sub(binding: &BindingRef, thunk: Thunk<NodeType>) -> Result<(), RenderError> {
    let sub = guarded_effect(binding, move |binding, initial| {
        let shape = resolve_type(&thunk)?;
        retarget(binding, shape, initial)?;
        if !initial {
            flush_mount_hooks();
        }
        Ok(())
    })?;
    binding.borrow_mut().type_sub = Some(sub);
    Ok(())
}

/// Settles a dynamic position on a resolved shape. Same shape: patch text
/// in place (or, on the first run after a description change, re-patch
/// props and children too). Different shape: render fresh content from
/// the stored description, swap it into position, tear the old down.
fn retarget(binding: &BindingRef, shape: Rendered, settle: bool) -> Result<(), RenderError> {
    let inner_rc = binding.borrow().inner.clone();
    if let Some(inner) = &inner_rc {
        let matches = {
            let i = inner.borrow();
            same_shape(&i.rendered, &shape)
        };
        if matches {
            if settle {
                let synth = synth_desc(binding, &shape);
                let cx = cx_for(binding);
                let fresh = patch_binding(inner, &synth, &cx)?;
                if !Rc::ptr_eq(&fresh, inner) {
                    binding.borrow_mut().inner = Some(fresh);
                }
            } else if let Rendered::Text(s) = shape {
                patch_text(inner, s);
            }
            return Ok(());
        }
    }

    let synth = synth_desc(binding, &shape);
    let cx = cx_for(binding);
    let fresh = render_vnode(&synth, &cx)?;
    let doc = binding.borrow().doc.clone();
    let old_live = live_node(binding);
    if let Some(parent) = doc.parent(old_live) {
        doc.insert_before(parent, live_node(&fresh), Some(old_live));
    }
    let old_inner = binding.borrow_mut().inner.take();
    match old_inner {
        Some(old) => teardown(&old, true),
        // First resolution replaces the bootstrap placeholder.
        None => doc.remove(old_live),
    }
    binding.borrow_mut().inner = Some(fresh);
    Ok(())
}

/// The stored description re-typed with a resolved shape. The inner
/// binding carries the mount hook so it re-fires after type changes.
fn synth_desc(binding: &BindingRef, shape: &Rendered) -> VNode {
    let b = binding.borrow();
    let node_type = match shape {
        Rendered::Tag(tag) => NodeType::Tag(tag.clone()),
        Rendered::Text(s) => NodeType::Text(s.clone()),
        Rendered::Empty => NodeType::Empty,
        Rendered::Component(comp) => NodeType::Component(comp.clone()),
        Rendered::Boundary(spec) => NodeType::Boundary(spec.clone()),
    };
    VNode {
        node_type,
        props: b.desc.props.clone(),
        children: b.desc.children.clone(),
        key: None,
        mount: b.desc.mount.clone(),
    }
}
