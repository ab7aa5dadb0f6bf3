//! Description layer - cheap render trees
//!
//! - `node`: node descriptions, components, keys, mount hooks
//! - `props`: attribute values, dynamic props, listeners

pub mod node;
pub mod props;

pub use node::{
    component, dyn_text, dynamic, el, text, BoundarySpec, Children, Component, Key, MountHook,
    NodeType, VNode,
};
pub use props::{AttrValue, Prop, Thunk};
