//! Mounting - attaching a description tree to a document
//!
//! [`mount`] clears the container, renders the description, and appends
//! the result. The whole tree sits inside an implicit root boundary: a
//! description that fails to build renders an error marker instead of
//! panicking or leaving the container empty.
//!
//! # Example
//! ```ignore
//! let doc = Document::new();
//! let handle = mount(&doc, doc.root(), view);
//! // ... dispatch events, write cells ...
//! handle.unmount();
//! ```

use crate::dom::{Document, NodeId};
use crate::error::RenderError;
use crate::vnode::{el, text, VNode};

use super::binding::{flush_mount_hooks, live_node, teardown, BindingRef};
use super::boundary::error_boundary;
use super::reconcile::{render_vnode, RenderCx};

/// A mounted tree. Dropping the handle unmounts: hook cleanups run,
/// subscriptions are disposed, and the rendered subtree is removed.
pub struct MountHandle {
    binding: Option<BindingRef>,
}

/// Renders `desc` into `container`, replacing any children the container
/// already has. Errors anywhere in the build land in the implicit root
/// boundary and render as a `pre` carrying the error text.
pub fn mount(doc: &Document, container: NodeId, desc: VNode) -> MountHandle {
    if !doc.exists(container) {
        log::warn!("mount target {container:?} does not exist");
        return MountHandle { binding: None };
    }
    doc.clear_children(container);

    let root_desc = error_boundary(move || Ok(desc.clone()), root_fallback);
    let cx = RenderCx {
        doc: doc.clone(),
        boundary: None,
    };
    match render_vnode(&root_desc, &cx) {
        Ok(binding) => {
            doc.append_child(container, live_node(&binding));
            flush_mount_hooks();
            MountHandle {
                binding: Some(binding),
            }
        }
        Err(err) => {
            // The marker fallback is static, so this path means the
            // document itself rejected the build; record what we can.
            log::error!("mount failed: {err}");
            let marker = doc.create_element("pre");
            doc.set_attribute(marker, "data-render-error", err.to_string());
            let message = doc.create_text(err.to_string());
            doc.append_child(marker, message);
            doc.append_child(container, marker);
            MountHandle { binding: None }
        }
    }
}

/// Fallback for the implicit root boundary.
fn root_fallback(err: &RenderError) -> VNode {
    el("pre")
        .attr("data-render-error", err.to_string())
        .child(text(err.to_string()))
}

impl MountHandle {
    /// Tears the mounted tree down now. Equivalent to dropping the
    /// handle; provided for call sites where the intent should be
    /// explicit.
    pub fn unmount(mut self) {
        self.teardown_now();
    }

    fn teardown_now(&mut self) {
        if let Some(binding) = self.binding.take() {
            teardown(&binding, true);
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.teardown_now();
    }
}
