//! Prop Values - literal and dynamic node properties
//!
//! A prop is either a literal attribute value, a thunk re-evaluated under
//! its own subscription, or an event listener. Attribute values follow
//! presence semantics: `Null` and `Bool(false)` mean the attribute is
//! absent, `Bool(true)` means present with an empty value, everything else
//! stringifies.

use std::fmt;
use std::rc::Rc;

use crate::dom::EventHandler;
use crate::error::RenderError;
use crate::reactive::Value;

/// A lazily evaluated description fragment. Thunks are fallible so cell
/// errors can surface through the render path.
pub type Thunk<T> = Rc<dyn Fn() -> Result<T, RenderError>>;

/// Resolved attribute value.
#[derive(Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// Whether the attribute exists on the element at all.
    pub fn is_present(&self) -> bool {
        !matches!(self, AttrValue::Null | AttrValue::Bool(false))
    }

    /// The string written into the DOM when present. `Bool(true)` is a
    /// bare attribute, so its text is empty.
    pub fn text(&self) -> String {
        match self {
            AttrValue::Null | AttrValue::Bool(false) | AttrValue::Bool(true) => String::new(),
            AttrValue::Int(n) => n.to_string(),
            AttrValue::Float(x) => x.to_string(),
            AttrValue::Str(s) => s.clone(),
        }
    }
}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => f.write_str("Null"),
            AttrValue::Bool(b) => write!(f, "Bool({b})"),
            AttrValue::Int(n) => write!(f, "Int({n})"),
            AttrValue::Float(x) => write!(f, "Float({x})"),
            AttrValue::Str(s) => write!(f, "Str({s:?})"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> AttrValue {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> AttrValue {
        AttrValue::Int(n)
    }
}

impl From<i32> for AttrValue {
    fn from(n: i32) -> AttrValue {
        AttrValue::Int(n as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> AttrValue {
        AttrValue::Float(x)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> AttrValue {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> AttrValue {
        AttrValue::Str(s)
    }
}

/// State-tree values carry over directly; containers stringify.
impl From<Value> for AttrValue {
    fn from(value: Value) -> AttrValue {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(b),
            Value::Int(n) => AttrValue::Int(n),
            Value::Float(x) => AttrValue::Float(x),
            Value::Str(s) => AttrValue::Str(s),
            other => AttrValue::Str(other.to_string()),
        }
    }
}

/// One named property of an element description.
#[derive(Clone)]
pub enum Prop {
    /// Literal attribute value.
    Value(AttrValue),
    /// Attribute value recomputed under its own narrow subscription.
    Dynamic(Thunk<AttrValue>),
    /// Event listener, keyed by the prop name as event name.
    Listener(EventHandler),
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Value(value) => write!(f, "Value({value:?})"),
            Prop::Dynamic(_) => f.write_str("Dynamic(<thunk>)"),
            Prop::Listener(_) => f.write_str("Listener(<handler>)"),
        }
    }
}
