//! Reactive Store - nested observable state tree
//!
//! A [`Store`] is a map of string keys to [`Value`]s with one reactive cell
//! per key. Reading a key inside a tracked context subscribes to exactly
//! that key; reading a missing key observes `Null` (and creates the cell,
//! so a later write is seen). Nested maps and lists are themselves reactive
//! handles, so a deep write notifies only the subscribers of the deep key,
//! never the ancestors.
//!
//! A [`List`] carries a single structure cell: every structural mutation
//! (push, insert, remove, move, item replacement) notifies it exactly once,
//! and readers re-derive what changed. That keeps list subscribers at one
//! notification per operation instead of one per index.
//!
//! # Example
//! ```ignore
//! let state = create_state([("count", Value::Int(0))]);
//! let stop = state.on_update("count", |v| println!("count is now {v}"));
//! state.set("count", 1);
//! stop();
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::{self, ObserverKind, SourceId};
use super::Cleanup;

// =============================================================================
// Value
// =============================================================================

/// A value in the state tree. Scalars compare structurally; maps and lists
/// compare by handle identity, because two handles to the same reactive
/// container are the same state.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(List),
    Map(Store),
}

impl Value {
    /// Shorthand for `Value::Str`.
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    /// Builds a reactive list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(List::new(items))
    }

    /// Builds a reactive map value.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(create_state(entries))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<List> {
        match self {
            Value::List(list) => Some(list.clone()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<Store> {
        match self {
            Value::Map(store) => Some(store.clone()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => List::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Store::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(list) => {
                let items = list.snapshot();
                let mut first = true;
                for item in items {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(_) => f.write_str("[object]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(list) => write!(f, "List({:?})", list.snapshot()),
            Value::Map(store) => write!(f, "Map({:?})", store.keys()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Value {
        Value::List(list)
    }
}

impl From<Store> for Value {
    fn from(store: Store) -> Value {
        Value::Map(store)
    }
}

// =============================================================================
// Store
// =============================================================================

struct Entry {
    source: SourceId,
    value: Value,
}

struct StoreInner {
    entries: RefCell<HashMap<String, Entry>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        for entry in self.entries.borrow().values() {
            runtime::release_source(entry.source);
        }
    }
}

/// Reactive map with one cell per key. Cloning the handle shares the map.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Builds a store from initial entries.
pub fn create_state<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Store {
    let store = Store::new();
    for (key, value) in entries {
        store.set(key, value);
    }
    store
}

impl Store {
    pub fn new() -> Store {
        Store {
            inner: Rc::new(StoreInner {
                entries: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Two handles to the same underlying map.
    pub fn ptr_eq(a: &Store, b: &Store) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    fn entry_source(&self, key: &str) -> SourceId {
        let mut entries = self.inner.entries.borrow_mut();
        entries
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                source: runtime::create_source(),
                value: Value::Null,
            })
            .source
    }

    /// Tracked read. A missing key reads as `Null` and its cell is created
    /// so the absence itself is observable.
    pub fn get(&self, key: &str) -> Value {
        let (source, value) = {
            let mut entries = self.inner.entries.borrow_mut();
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                source: runtime::create_source(),
                value: Value::Null,
            });
            (entry.source, entry.value.clone())
        };
        runtime::track_read(source);
        value
    }

    /// Untracked read.
    pub fn peek(&self, key: &str) -> Value {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map(|entry| entry.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Writes the key's cell and notifies its subscribers. Always
    /// notifies, even when the value is unchanged.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let source = {
            let mut entries = self.inner.entries.borrow_mut();
            let entry = entries.entry(key).or_insert_with(|| Entry {
                source: runtime::create_source(),
                value: Value::Null,
            });
            entry.value = value;
            entry.source
        };
        runtime::notify_write(source);
    }

    /// Clears the key to `Null`, keeping the cell (and its subscribers)
    /// alive. Returns the previous value.
    pub fn remove(&self, key: &str) -> Value {
        let previous = self.peek(key);
        if !previous.is_null() {
            self.set(key, Value::Null);
        }
        previous
    }

    /// Subscribes to one key. The callback receives the value after each
    /// write to that key. The returned cleanup ends the subscription.
    pub fn on_update(&self, key: &str, callback: impl Fn(&Value) + 'static) -> Cleanup {
        let source = self.entry_source(key);
        let observer = runtime::create_observer(ObserverKind::Deferred);
        let weak: Weak<StoreInner> = Rc::downgrade(&self.inner);
        let key = key.to_string();
        runtime::set_action(
            observer,
            Rc::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let value = inner
                    .entries
                    .borrow()
                    .get(&key)
                    .map(|entry| entry.value.clone())
                    .unwrap_or(Value::Null);
                callback(&value);
            }),
        );
        runtime::subscribe(observer, source);
        Box::new(move || runtime::dispose_observer(observer))
    }

    /// Sugar for `get(key).as_map()`.
    pub fn map(&self, key: &str) -> Option<Store> {
        self.get(key).as_map()
    }

    /// Sugar for `get(key).as_list()`.
    pub fn list(&self, key: &str) -> Option<List> {
        self.get(key).as_list()
    }

    /// Sorted key snapshot. Untracked.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for Store {
    fn default() -> Store {
        Store::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store{:?}", self.keys())
    }
}

// =============================================================================
// List
// =============================================================================

struct ListInner {
    items: RefCell<Vec<Value>>,
    structure: SourceId,
}

impl Drop for ListInner {
    fn drop(&mut self) {
        runtime::release_source(self.structure);
    }
}

/// Reactive sequence with a single structure cell: every mutation notifies
/// once, whatever it touched. Cloning the handle shares the sequence.
#[derive(Clone)]
pub struct List {
    inner: Rc<ListInner>,
}

impl List {
    pub fn new(items: impl IntoIterator<Item = Value>) -> List {
        List {
            inner: Rc::new(ListInner {
                items: RefCell::new(items.into_iter().collect()),
                structure: runtime::create_source(),
            }),
        }
    }

    /// Two handles to the same underlying sequence.
    pub fn ptr_eq(a: &List, b: &List) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Tracked read of the whole sequence.
    pub fn to_vec(&self) -> Vec<Value> {
        runtime::track_read(self.inner.structure);
        self.inner.items.borrow().clone()
    }

    /// Untracked read of the whole sequence.
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Tracked length.
    pub fn len(&self) -> usize {
        runtime::track_read(self.inner.structure);
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked read of one index.
    pub fn get(&self, index: usize) -> Option<Value> {
        runtime::track_read(self.inner.structure);
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.inner.items.borrow_mut().push(value.into());
        runtime::notify_write(self.inner.structure);
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                log::warn!("list insert index {index} out of range (len {})", items.len());
                return;
            }
            items.insert(index, value.into());
        }
        runtime::notify_write(self.inner.structure);
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                log::warn!("list remove index {index} out of range (len {})", items.len());
                return None;
            }
            items.remove(index)
        };
        runtime::notify_write(self.inner.structure);
        Some(removed)
    }

    /// Moves the item at `from` so it ends up at index `to`.
    pub fn move_item(&self, from: usize, to: usize) {
        {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            if from >= len || to >= len {
                log::warn!("list move {from} -> {to} out of range (len {len})");
                return;
            }
            let item = items.remove(from);
            items.insert(to, item);
        }
        runtime::notify_write(self.inner.structure);
    }

    /// Replaces the item at `index`.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                log::warn!("list set index {index} out of range (len {})", items.len());
                return;
            }
            items[index] = value.into();
        }
        runtime::notify_write(self.inner.structure);
    }

    /// Replaces the whole sequence.
    pub fn replace(&self, items: impl IntoIterator<Item = Value>) {
        *self.inner.items.borrow_mut() = items.into_iter().collect();
        runtime::notify_write(self.inner.structure);
    }

    pub fn clear(&self) {
        self.inner.items.borrow_mut().clear();
        runtime::notify_write(self.inner.structure);
    }

    /// Subscribes to structural changes. The callback receives the
    /// sequence after each mutation.
    pub fn on_change(&self, callback: impl Fn(&[Value]) + 'static) -> Cleanup {
        let observer = runtime::create_observer(ObserverKind::Deferred);
        let weak = Rc::downgrade(&self.inner);
        runtime::set_action(
            observer,
            Rc::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let items = inner.items.borrow().clone();
                callback(&items);
            }),
        );
        runtime::subscribe(observer, self.inner.structure);
        Box::new(move || runtime::dispose_observer(observer))
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List{:?}", self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::runtime::reset;
    use std::cell::Cell;

    #[test]
    fn test_set_then_get() {
        reset();
        let state = create_state([("count", Value::Int(0))]);
        assert_eq!(state.get("count"), Value::Int(0));
        state.set("count", 7);
        assert_eq!(state.get("count"), Value::Int(7));
    }

    #[test]
    fn test_scalar_accessors_and_list_sugar() {
        reset();
        let state = create_state([
            ("ready", Value::Bool(true)),
            ("ratio", Value::Float(0.5)),
            ("count", Value::Int(3)),
            ("items", Value::list([Value::Int(1), Value::Int(2)])),
        ]);
        assert_eq!(state.get("ready").as_bool(), Some(true));
        assert_eq!(state.get("ratio").as_float(), Some(0.5));
        assert_eq!(state.get("count").as_float(), Some(3.0), "ints widen through as_float");
        assert_eq!(state.get("count").as_bool(), None, "as_bool never coerces");
        let items = state.list("items");
        assert_eq!(items.map(|list| list.len()), Some(2));
        assert!(state.list("count").is_none(), "list sugar rejects non-list values");
    }

    #[test]
    fn test_missing_key_reads_null_and_later_write_is_seen() {
        reset();
        let state = Store::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        assert!(state.get("title").is_null());
        let seen_in = seen.clone();
        let _stop = state.on_update("title", move |v| {
            seen_in.borrow_mut().push(v.clone());
        });
        state.set("title", "hello");
        assert_eq!(*seen.borrow(), vec![Value::str("hello")]);
    }

    #[test]
    fn test_deep_write_notifies_only_that_key() {
        reset();
        let leaf = create_state([("sub", Value::Int(1))]);
        let mid = create_state([("obj", Value::Map(leaf.clone()))]);
        let root = create_state([("obj", Value::Map(mid.clone())), ("other", Value::Int(0))]);

        let root_hits = Rc::new(Cell::new(0));
        let mid_hits = Rc::new(Cell::new(0));
        let leaf_hits = Rc::new(Cell::new(0));
        let (a, b, c) = (root_hits.clone(), mid_hits.clone(), leaf_hits.clone());
        let _s1 = root.on_update("obj", move |_| a.set(a.get() + 1));
        let _s2 = mid.on_update("obj", move |_| b.set(b.get() + 1));
        let _s3 = leaf.on_update("sub", move |_| c.set(c.get() + 1));

        leaf.set("sub", 2);
        assert_eq!(leaf_hits.get(), 1, "leaf subscriber must fire");
        assert_eq!(mid_hits.get(), 0, "mid level must not hear a leaf write");
        assert_eq!(root_hits.get(), 0, "root level must not hear a leaf write");
    }

    #[test]
    fn test_replacing_subtree_notifies_parent_key() {
        reset();
        let state = create_state([("user", Value::map([("name", Value::str("ada"))]))]);
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let _stop = state.on_update("user", move |_| hits_in.set(hits_in.get() + 1));
        state.set("user", Value::map([("name", Value::str("grace"))]));
        assert_eq!(hits.get(), 1);
        let name = state.map("user").map(|user| user.get("name"));
        assert_eq!(name, Some(Value::str("grace")));
    }

    #[test]
    fn test_on_update_cleanup_ends_subscription() {
        reset();
        let state = create_state([("count", Value::Int(0))]);
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let stop = state.on_update("count", move |_| hits_in.set(hits_in.get() + 1));
        state.set("count", 1);
        stop();
        state.set("count", 2);
        assert_eq!(hits.get(), 1, "no callbacks after cleanup");
    }

    #[test]
    fn test_list_mutations_notify_once_each() {
        reset();
        let list = List::new([Value::Int(1), Value::Int(2)]);
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let _stop = list.on_change(move |_| hits_in.set(hits_in.get() + 1));

        list.push(3);
        assert_eq!(hits.get(), 1, "push notifies once");
        list.insert(0, 0);
        assert_eq!(hits.get(), 2);
        list.move_item(0, 3);
        assert_eq!(hits.get(), 3);
        list.remove(3);
        assert_eq!(hits.get(), 4);
        list.set(0, 9);
        assert_eq!(hits.get(), 5, "item replacement is one structural notification");
        list.replace([Value::Int(5)]);
        assert_eq!(hits.get(), 6);
        list.clear();
        assert_eq!(hits.get(), 7);
    }

    #[test]
    fn test_list_out_of_range_ops_do_not_notify() {
        reset();
        let list = List::new([Value::Int(1)]);
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let _stop = list.on_change(move |_| hits_in.set(hits_in.get() + 1));
        list.remove(5);
        list.set(5, 0);
        list.move_item(0, 5);
        list.insert(9, 0);
        assert_eq!(hits.get(), 0, "rejected operations must not notify");
        assert_eq!(list.snapshot(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_value_equality_is_structural_for_scalars_identity_for_containers() {
        reset();
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::str("a"), Value::str("a"));
        let list = List::new([]);
        assert_eq!(Value::List(list.clone()), Value::List(list.clone()));
        assert_ne!(Value::List(list), Value::List(List::new([])));
    }

    #[test]
    fn test_remove_keeps_cell_alive() {
        reset();
        let state = create_state([("flag", Value::Bool(true))]);
        let hits = Rc::new(Cell::new(0));
        let hits_in = hits.clone();
        let _stop = state.on_update("flag", move |_| hits_in.set(hits_in.get() + 1));
        let old = state.remove("flag");
        assert_eq!(old, Value::Bool(true));
        assert_eq!(hits.get(), 1, "removal is observed as a write to Null");
        state.set("flag", false);
        assert_eq!(hits.get(), 2, "subscription survives removal");
    }
}
