//! DOM Events - dispatch payload and handler types

use std::rc::Rc;

use super::document::NodeId;

/// Payload passed to listeners during [`dispatch`](super::Document::dispatch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event name as registered, e.g. `"click"`.
    pub name: String,
    /// Node the event was dispatched on.
    pub target: NodeId,
}

/// Shared listener callback. Handlers are compared by `Rc` identity when
/// the renderer decides whether to replace a registration.
pub type EventHandler = Rc<dyn Fn(&Event)>;

/// Registration handle returned by `add_listener`, used to remove exactly
/// that registration later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
