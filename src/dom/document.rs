//! In-Memory DOM - arena-backed node tree
//!
//! The render target is a plain tree of elements, text nodes, and
//! placeholders stored in one slab. `NodeId`s index into the slab; freed
//! slots are reused. The handle is cheaply cloneable and single-threaded,
//! so render subscriptions and event handlers can all hold it.
//!
//! Invalid operations (unknown ids, detached references, would-be cycles)
//! log a warning and do nothing instead of panicking: callers above this
//! layer are reactive and a hard failure here would take the whole update
//! pass down with it.
//!
//! Every successful mutating call, including a `set_attribute` that writes
//! the value already present, increments [`mutation_count`]. Skipping
//! redundant writes is the renderer's job, and the counter is how tests
//! hold it to that.
//!
//! [`mutation_count`]: Document::mutation_count

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use super::event::{Event, EventHandler, ListenerId};

/// Handle to a node in the document slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

enum NodeKind {
    Root,
    Element {
        tag: String,
        attrs: HashMap<String, String>,
    },
    Text(String),
    /// Zero-width marker that keeps a sibling slot occupied.
    Placeholder,
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct ListenerRecord {
    id: ListenerId,
    event: String,
    handler: EventHandler,
}

struct DocInner {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    listeners: HashMap<NodeId, Vec<ListenerRecord>>,
    next_listener: u64,
    mutations: u64,
}

impl DocInner {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let node = Node {
            kind,
            parent: None,
            children: Vec::new(),
        };
        self.mutations += 1;
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn unlink_from_parent(&mut self, child: NodeId) {
        let Some(parent) = self.node(child).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|id| *id != child);
        }
        if let Some(child_node) = self.node_mut(child) {
            child_node.parent = None;
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id.0).and_then(|slot| slot.take()) {
            Some(node) => {
                self.free.push(id.0);
                self.listeners.remove(&id);
                node.children
            }
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut cursor = self.node(of).and_then(|node| node.parent);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.node(id).and_then(|node| node.parent);
        }
        false
    }
}

/// Cheaply cloneable handle to one document tree.
#[derive(Clone)]
pub struct Document {
    inner: Rc<RefCell<DocInner>>,
    root: NodeId,
}

impl Document {
    pub fn new() -> Document {
        let mut inner = DocInner {
            nodes: Vec::new(),
            free: Vec::new(),
            listeners: HashMap::new(),
            next_listener: 0,
            mutations: 0,
        };
        let root = inner.alloc(NodeKind::Root);
        inner.mutations = 0;
        Document {
            inner: Rc::new(RefCell::new(inner)),
            root,
        }
    }

    /// The document root. Containers hang off it.
    pub fn root(&self) -> NodeId {
        self.root
    }

    // =========================================================================
    // Construction
    // =========================================================================

    pub fn create_element(&self, tag: impl Into<String>) -> NodeId {
        self.inner.borrow_mut().alloc(NodeKind::Element {
            tag: tag.into(),
            attrs: HashMap::new(),
        })
    }

    pub fn create_text(&self, text: impl Into<String>) -> NodeId {
        self.inner
            .borrow_mut()
            .alloc(NodeKind::Text(text.into()))
    }

    pub fn create_placeholder(&self) -> NodeId {
        self.inner.borrow_mut().alloc(NodeKind::Placeholder)
    }

    // =========================================================================
    // Tree surgery
    // =========================================================================

    /// Inserts `child` into `parent` before `reference` (`None` appends).
    /// A child that already has a parent is moved, like DOM `insertBefore`.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let mut inner = self.inner.borrow_mut();
        if inner.node(parent).is_none() || inner.node(child).is_none() {
            log::warn!("insert_before on missing node (parent {parent:?}, child {child:?})");
            return;
        }
        if child == parent || inner.is_ancestor(child, parent) {
            log::warn!("insert_before would create a cycle (parent {parent:?}, child {child:?})");
            return;
        }
        inner.unlink_from_parent(child);
        let position = match reference {
            Some(reference) => {
                let Some(parent_node) = inner.node(parent) else {
                    return;
                };
                match parent_node.children.iter().position(|id| *id == reference) {
                    Some(index) => index,
                    None => {
                        log::warn!("insert_before reference {reference:?} is not a child of {parent:?}; appending");
                        parent_node.children.len()
                    }
                }
            }
            None => match inner.node(parent) {
                Some(parent_node) => parent_node.children.len(),
                None => return,
            },
        };
        if let Some(parent_node) = inner.node_mut(parent) {
            parent_node.children.insert(position, child);
        }
        if let Some(child_node) = inner.node_mut(child) {
            child_node.parent = Some(parent);
        }
        inner.mutations += 1;
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Detaches `child` from `parent` and frees its whole subtree,
    /// including listener registrations.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) {
        let mut inner = self.inner.borrow_mut();
        let actual = inner.node(child).and_then(|node| node.parent);
        if actual != Some(parent) {
            log::warn!("remove_child: {child:?} is not a child of {parent:?}");
            return;
        }
        inner.unlink_from_parent(child);
        inner.free_subtree(child);
        inner.mutations += 1;
    }

    /// Frees a subtree wherever it is, detaching it first if attached.
    pub fn remove(&self, node: NodeId) {
        let mut inner = self.inner.borrow_mut();
        if inner.node(node).is_none() {
            return;
        }
        inner.unlink_from_parent(node);
        inner.free_subtree(node);
        inner.mutations += 1;
    }

    /// Removes every child of `parent`.
    pub fn clear_children(&self, parent: NodeId) {
        let children = self.children_of(parent);
        for child in children {
            self.remove(child);
        }
    }

    // =========================================================================
    // Content mutation
    // =========================================================================

    pub fn set_text(&self, node: NodeId, text: impl Into<String>) {
        let mut inner = self.inner.borrow_mut();
        let updated = match inner.node_mut(node) {
            Some(record) => match &mut record.kind {
                NodeKind::Text(current) => {
                    *current = text.into();
                    true
                }
                _ => {
                    log::warn!("set_text on non-text node {node:?}");
                    false
                }
            },
            None => {
                log::warn!("set_text on missing node {node:?}");
                false
            }
        };
        if updated {
            inner.mutations += 1;
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.inner.borrow_mut();
        let updated = match inner.node_mut(node) {
            Some(record) => match &mut record.kind {
                NodeKind::Element { attrs, .. } => {
                    attrs.insert(name.into(), value.into());
                    true
                }
                _ => {
                    log::warn!("set_attribute on non-element node {node:?}");
                    false
                }
            },
            None => {
                log::warn!("set_attribute on missing node {node:?}");
                false
            }
        };
        if updated {
            inner.mutations += 1;
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut inner = self.inner.borrow_mut();
        let removed = match inner.node_mut(node) {
            Some(record) => match &mut record.kind {
                NodeKind::Element { attrs, .. } => attrs.remove(name).is_some(),
                _ => {
                    log::warn!("remove_attribute on non-element node {node:?}");
                    false
                }
            },
            None => {
                log::warn!("remove_attribute on missing node {node:?}");
                false
            }
        };
        if removed {
            inner.mutations += 1;
        }
    }

    // =========================================================================
    // Listeners and dispatch
    // =========================================================================

    pub fn add_listener(
        &self,
        node: NodeId,
        event: impl Into<String>,
        handler: EventHandler,
    ) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        if inner.node(node).is_none() {
            log::warn!("add_listener on missing node {node:?}");
            return id;
        }
        inner.listeners.entry(node).or_default().push(ListenerRecord {
            id,
            event: event.into(),
            handler,
        });
        inner.mutations += 1;
        id
    }

    pub fn remove_listener(&self, node: NodeId, id: ListenerId) {
        let mut inner = self.inner.borrow_mut();
        let removed = match inner.listeners.get_mut(&node) {
            Some(records) => {
                let before = records.len();
                records.retain(|record| record.id != id);
                records.len() != before
            }
            None => false,
        };
        if removed {
            inner.mutations += 1;
        } else {
            log::warn!("remove_listener: {id:?} not registered on {node:?}");
        }
    }

    /// Invokes every handler registered on `node` for `event`, in
    /// registration order. The handler list is cloned before the first
    /// call, so handlers may freely mutate the document or re-register.
    /// Returns how many handlers ran.
    pub fn dispatch(&self, node: NodeId, event: &str) -> usize {
        let handlers: Vec<EventHandler> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .get(&node)
                .map(|records| {
                    records
                        .iter()
                        .filter(|record| record.event == event)
                        .map(|record| record.handler.clone())
                        .collect()
                })
                .unwrap_or_default()
        };
        let payload = Event {
            name: event.to_string(),
            target: node,
        };
        for handler in &handlers {
            handler(&payload);
        }
        handlers.len()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn exists(&self, node: NodeId) -> bool {
        self.inner.borrow().node(node).is_some()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.inner.borrow().node(node).map(|record| &record.kind) {
            Some(NodeKind::Element { tag, .. }) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match self.inner.borrow().node(node).map(|record| &record.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// All attributes, sorted by name.
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let mut pairs = match self.inner.borrow().node(node).map(|record| &record.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        };
        pairs.sort();
        pairs
    }

    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .borrow()
            .node(node)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.borrow().node(node).and_then(|record| record.parent)
    }

    /// Payload of a text node.
    pub fn text(&self, node: NodeId) -> Option<String> {
        match self.inner.borrow().node(node).map(|record| &record.kind) {
            Some(NodeKind::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn is_placeholder(&self, node: NodeId) -> bool {
        matches!(
            self.inner.borrow().node(node).map(|record| &record.kind),
            Some(NodeKind::Placeholder)
        )
    }

    /// Concatenated text of the subtree, skipping placeholders.
    pub fn text_content(&self, node: NodeId) -> String {
        let inner = self.inner.borrow();
        let mut out = String::new();
        collect_text(&inner, node, &mut out);
        out
    }

    /// Serializes the subtree for diagnostics and assertions. Attributes
    /// are sorted; an empty attribute value renders as a bare name;
    /// placeholders render as empty comments.
    pub fn to_html(&self, node: NodeId) -> String {
        let inner = self.inner.borrow();
        let mut out = String::new();
        write_html(&inner, node, &mut out);
        out
    }

    /// Live node count, root included.
    pub fn node_count(&self) -> usize {
        self.inner
            .borrow()
            .nodes
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Total successful mutating calls since creation.
    pub fn mutation_count(&self) -> u64 {
        self.inner.borrow().mutations
    }

    /// Registered listener count on one node.
    pub fn listener_count(&self, node: NodeId) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(&node)
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

impl Default for Document {
    fn default() -> Document {
        Document::new()
    }
}

fn collect_text(inner: &DocInner, node: NodeId, out: &mut String) {
    let Some(record) = inner.node(node) else {
        return;
    };
    match &record.kind {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Placeholder => {}
        NodeKind::Root | NodeKind::Element { .. } => {
            for child in &record.children {
                collect_text(inner, *child, out);
            }
        }
    }
}

fn write_html(inner: &DocInner, node: NodeId, out: &mut String) {
    let Some(record) = inner.node(node) else {
        return;
    };
    match &record.kind {
        NodeKind::Root => {
            for child in &record.children {
                write_html(inner, *child, out);
            }
        }
        NodeKind::Text(text) => out.push_str(&escape_text(text)),
        NodeKind::Placeholder => out.push_str("<!---->"),
        NodeKind::Element { tag, attrs } => {
            let _ = write!(out, "<{tag}");
            let mut names: Vec<&String> = attrs.keys().collect();
            names.sort();
            for name in names {
                let value = &attrs[name];
                if value.is_empty() {
                    let _ = write!(out, " {name}");
                } else {
                    let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
                }
            }
            out.push('>');
            for child in &record.children {
                write_html(inner, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}
