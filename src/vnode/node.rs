//! Node Descriptions - the cheap tree the renderer consumes
//!
//! A [`VNode`] is pure data plus thunks: building one never touches the
//! document and never subscribes to anything. The renderer walks the
//! description once, materializes DOM nodes, and wires one narrow
//! subscription per dynamic aspect (type, each dynamic prop, the child
//! list).
//!
//! # Example
//! ```ignore
//! let count = signal(0);
//! let view = el("div")
//!     .attr("class", "counter")
//!     .child(dyn_text(move || Ok(count.get().to_string())))
//!     .child(el("button").on("click", move |_| step.set(1)).child(text("+")));
//! ```

use std::fmt;
use std::rc::Rc;

use crate::dom::{Document, Event, EventHandler, NodeId};
use crate::error::RenderError;
use crate::reactive::Cleanup;

use super::props::{AttrValue, Prop, Thunk};

// =============================================================================
// Components and boundaries
// =============================================================================

/// A component: a function from captured inputs to a description. The
/// renderer matches components by function identity, so create a
/// component once and clone it into descriptions; a closure rebuilt on
/// every pass is a different component and remounts.
#[derive(Clone)]
pub struct Component {
    body: Rc<dyn Fn() -> Result<VNode, RenderError>>,
}

/// Wraps a render function into a [`Component`].
pub fn component(f: impl Fn() -> Result<VNode, RenderError> + 'static) -> Component {
    Component { body: Rc::new(f) }
}

impl Component {
    pub(crate) fn call(&self) -> Result<VNode, RenderError> {
        (self.body)()
    }

    /// Same underlying function.
    pub fn ptr_eq(a: &Component, b: &Component) -> bool {
        Rc::ptr_eq(&a.body, &b.body)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({:p})", Rc::as_ptr(&self.body))
    }
}

/// Attempt/fallback pair for an error boundary position. Built by
/// [`error_boundary`](crate::render::error_boundary).
#[derive(Clone)]
pub struct BoundarySpec {
    pub(crate) attempt: Rc<dyn Fn() -> Result<VNode, RenderError>>,
    pub(crate) fallback: Rc<dyn Fn(&RenderError) -> VNode>,
}

impl BoundarySpec {
    pub(crate) fn ptr_eq(a: &BoundarySpec, b: &BoundarySpec) -> bool {
        Rc::ptr_eq(&a.attempt, &b.attempt)
    }
}

impl fmt::Debug for BoundarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundarySpec({:p})", Rc::as_ptr(&self.attempt))
    }
}

// =============================================================================
// Node type
// =============================================================================

/// What a description position renders as.
#[derive(Clone)]
pub enum NodeType {
    /// Element with this tag name.
    Tag(String),
    /// Text node.
    Text(String),
    /// Component expansion.
    Component(Component),
    /// Nothing visible; a placeholder keeps the sibling slot.
    Empty,
    /// Error boundary around a wrapped subtree.
    Boundary(BoundarySpec),
    /// Type decided by a thunk under its own subscription. A change of
    /// resolved type replaces the whole node.
    Dynamic(Thunk<NodeType>),
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Tag(tag) => write!(f, "Tag({tag:?})"),
            NodeType::Text(s) => write!(f, "Text({s:?})"),
            NodeType::Component(c) => c.fmt(f),
            NodeType::Empty => f.write_str("Empty"),
            NodeType::Boundary(b) => b.fmt(f),
            NodeType::Dynamic(_) => f.write_str("Dynamic(<thunk>)"),
        }
    }
}

/// Identity key for list reconciliation.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl From<i64> for Key {
    fn from(n: i64) -> Key {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Key {
        Key::Int(n as i64)
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Key {
        Key::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Key {
        Key::Str(s)
    }
}

/// Child list of an element description.
#[derive(Clone)]
pub enum Children {
    Static(Vec<VNode>),
    /// Recomputed under one subscription; each pass is reconciled against
    /// the live child bindings.
    Dynamic(Thunk<Vec<VNode>>),
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Children::Static(nodes) => write!(f, "Static({} nodes)", nodes.len()),
            Children::Dynamic(_) => f.write_str("Dynamic(<thunk>)"),
        }
    }
}

/// Runs once after the node is first attached; the returned cleanup runs
/// before the node is detached.
pub type MountHook = Rc<dyn Fn(&Document, NodeId) -> Option<Cleanup>>;

// =============================================================================
// VNode
// =============================================================================

/// One position in a description tree.
#[derive(Clone)]
pub struct VNode {
    pub(crate) node_type: NodeType,
    pub(crate) props: Vec<(String, Prop)>,
    pub(crate) children: Children,
    pub(crate) key: Option<Key>,
    pub(crate) mount: Option<MountHook>,
}

impl VNode {
    fn with_type(node_type: NodeType) -> VNode {
        VNode {
            node_type,
            props: Vec::new(),
            children: Children::Static(Vec::new()),
            key: None,
            mount: None,
        }
    }

    /// A node that renders nothing but keeps its sibling slot.
    pub fn empty() -> VNode {
        VNode::with_type(NodeType::Empty)
    }

    pub(crate) fn boundary(spec: BoundarySpec) -> VNode {
        VNode::with_type(NodeType::Boundary(spec))
    }

    /// Literal attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> VNode {
        self.props.push((name.into(), Prop::Value(value.into())));
        self
    }

    /// Attribute recomputed under its own subscription.
    pub fn attr_dyn(
        mut self,
        name: impl Into<String>,
        f: impl Fn() -> Result<AttrValue, RenderError> + 'static,
    ) -> VNode {
        self.props.push((name.into(), Prop::Dynamic(Rc::new(f))));
        self
    }

    /// Event listener. Each call to `on` makes a fresh handler identity;
    /// for a handler that survives description rebuilds unchanged, build
    /// the `Rc` once and use [`VNode::on_handler`].
    pub fn on(self, event: impl Into<String>, f: impl Fn(&Event) + 'static) -> VNode {
        self.on_handler(event, Rc::new(f))
    }

    /// Event listener with caller-managed handler identity.
    pub fn on_handler(mut self, event: impl Into<String>, handler: EventHandler) -> VNode {
        self.props.push((event.into(), Prop::Listener(handler)));
        self
    }

    /// Appends one static child.
    pub fn child(mut self, child: impl Into<VNode>) -> VNode {
        match &mut self.children {
            Children::Static(nodes) => nodes.push(child.into()),
            Children::Dynamic(_) => {
                log::warn!("child() on a node with dynamic children is ignored");
            }
        }
        self
    }

    /// Appends static children.
    pub fn children(mut self, nodes: impl IntoIterator<Item = VNode>) -> VNode {
        match &mut self.children {
            Children::Static(existing) => existing.extend(nodes),
            Children::Dynamic(_) => {
                log::warn!("children() on a node with dynamic children is ignored");
            }
        }
        self
    }

    /// Replaces the child list with a thunk reconciled on every change.
    pub fn children_dyn(
        mut self,
        f: impl Fn() -> Result<Vec<VNode>, RenderError> + 'static,
    ) -> VNode {
        self.children = Children::Dynamic(Rc::new(f));
        self
    }

    /// Reconciliation identity among siblings.
    pub fn key(mut self, key: impl Into<Key>) -> VNode {
        self.key = Some(key.into());
        self
    }

    /// Hook run once after first attach; its cleanup runs before detach.
    pub fn on_mount(
        mut self,
        f: impl Fn(&Document, NodeId) -> Option<Cleanup> + 'static,
    ) -> VNode {
        self.mount = Some(Rc::new(f));
        self
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn get_key(&self) -> Option<&Key> {
        self.key.as_ref()
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNode")
            .field("type", &self.node_type)
            .field("props", &self.props.len())
            .field("children", &self.children)
            .field("key", &self.key)
            .finish()
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Element description.
pub fn el(tag: impl Into<String>) -> VNode {
    VNode::with_type(NodeType::Tag(tag.into()))
}

/// Static text description.
pub fn text(s: impl Into<String>) -> VNode {
    VNode::with_type(NodeType::Text(s.into()))
}

/// Text recomputed under its own subscription.
pub fn dyn_text(f: impl Fn() -> Result<String, RenderError> + 'static) -> VNode {
    dynamic(move || f().map(NodeType::Text))
}

/// Node whose type is decided by a thunk.
pub fn dynamic(f: impl Fn() -> Result<NodeType, RenderError> + 'static) -> VNode {
    VNode::with_type(NodeType::Dynamic(Rc::new(f)))
}

impl From<&str> for VNode {
    fn from(s: &str) -> VNode {
        text(s)
    }
}

impl From<String> for VNode {
    fn from(s: String) -> VNode {
        text(s)
    }
}

impl From<i64> for VNode {
    fn from(n: i64) -> VNode {
        text(n.to_string())
    }
}

impl From<f64> for VNode {
    fn from(x: f64) -> VNode {
        text(x.to_string())
    }
}

impl From<Component> for VNode {
    fn from(c: Component) -> VNode {
        VNode::with_type(NodeType::Component(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::reset;
    use crate::reactive::signal::signal;
    use std::cell::Cell;

    #[test]
    fn test_construction_is_inert() {
        reset();
        let count = signal(0);
        let thunk_runs = Rc::new(Cell::new(0));
        let runs_in = thunk_runs.clone();
        let count_in = count.clone();
        let _view = el("div")
            .attr("id", "root")
            .attr_dyn("data-count", move || {
                runs_in.set(runs_in.get() + 1);
                Ok(AttrValue::Int(count_in.get()))
            })
            .child(text("hi"));
        assert_eq!(thunk_runs.get(), 0, "building a description must not evaluate thunks");
    }

    #[test]
    fn test_literal_children_normalize_to_text() {
        let view = el("p").child("total: ").child(42i64);
        match &view.children {
            Children::Static(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert!(matches!(&nodes[0].node_type, NodeType::Text(s) if s == "total: "));
                assert!(matches!(&nodes[1].node_type, NodeType::Text(s) if s == "42"));
            }
            other => panic!("expected static children, got {other:?}"),
        }
    }

    #[test]
    fn test_component_identity_is_by_function() {
        let a = component(|| Ok(el("div")));
        let b = a.clone();
        let c = component(|| Ok(el("div")));
        assert!(Component::ptr_eq(&a, &b));
        assert!(!Component::ptr_eq(&a, &c));
    }

    #[test]
    fn test_child_after_children_dyn_is_ignored() {
        let view = el("ul")
            .children_dyn(|| Ok(vec![text("a")]))
            .child(text("ignored"));
        assert!(matches!(view.children, Children::Dynamic(_)));
    }

    #[test]
    fn test_keys_convert_from_common_types() {
        assert_eq!(Key::from(3usize), Key::Int(3));
        assert_eq!(Key::from("row-1"), Key::Str("row-1".to_string()));
    }
}
