//! Reconciliation behavior through the public API.
//!
//! Every scenario mounts a description against a fresh document and
//! drives it with cell writes. [`Document::mutation_count`] counts every
//! mutating call that reaches the document, so "no redundant work" is
//! asserted as an exact delta, and node identity is asserted by comparing
//! `NodeId`s across updates.

use std::cell::Cell;
use std::rc::Rc;

use cinder_dom::*;

// =============================================================================
// HELPERS
// =============================================================================

fn mounted(desc: VNode) -> (Document, MountHandle) {
    // No reset() here: the caller has already built cells for `desc`, and
    // each test runs on its own thread with a fresh thread-local runtime.
    let doc = Document::new();
    let handle = mount(&doc, doc.root(), desc);
    (doc, handle)
}

/// The single content node mount appended under the root.
fn content_root(doc: &Document) -> NodeId {
    let children = doc.children_of(doc.root());
    assert_eq!(children.len(), 1, "mount should append exactly one node");
    children[0]
}

// =============================================================================
// STATIC STRUCTURE
// =============================================================================

#[test]
fn test_static_tree_renders() {
    let view = el("div")
        .attr("class", "app")
        .child(el("span").child("hello"))
        .child(" world");
    let (doc, _handle) = mounted(view);
    assert_eq!(
        doc.to_html(doc.root()),
        "<div class=\"app\"><span>hello</span> world</div>"
    );
}

#[test]
fn test_boolean_attrs_follow_presence() {
    let view = el("input")
        .attr("disabled", true)
        .attr("readonly", false)
        .attr("title", "x");
    let (doc, _handle) = mounted(view);
    assert_eq!(doc.to_html(doc.root()), "<input disabled title=\"x\"></input>");
}

// =============================================================================
// FINE-GRAINED UPDATES
// =============================================================================

#[test]
fn test_dyn_text_patches_in_place() {
    let count = signal(0i64);
    let count_in = count.clone();
    let view = el("div").child(dyn_text(move || Ok(format!("count: {}", count_in.get()))));
    let (doc, _handle) = mounted(view);
    let div = content_root(&doc);
    let text_node = doc.children_of(div)[0];

    let before = doc.mutation_count();
    count.set(1);
    assert_eq!(doc.text_content(div), "count: 1");
    assert_eq!(
        doc.mutation_count() - before,
        1,
        "one text write, nothing else"
    );
    assert_eq!(
        doc.children_of(div)[0],
        text_node,
        "text node identity survives updates"
    );
}

#[test]
fn test_unchanged_value_writes_nothing() {
    let count = signal(5i64);
    let count_in = count.clone();
    let view = el("div")
        .attr_dyn("data-count", move || Ok(AttrValue::Int(count_in.get())))
        .child(dyn_text({
            let count = count.clone();
            move || Ok(count.get().to_string())
        }));
    let (doc, _handle) = mounted(view);

    let before = doc.mutation_count();
    count.set(5);
    assert_eq!(
        doc.mutation_count(),
        before,
        "a write of the same value must reach the document zero times"
    );
}

#[test]
fn test_independent_cells_update_independently() {
    let left = signal(String::from("L"));
    let right = signal(String::from("R"));
    let left_in = left.clone();
    let right_in = right.clone();
    let view = el("div")
        .child(el("span").child(dyn_text(move || Ok(left_in.get()))))
        .child(el("span").child(dyn_text(move || Ok(right_in.get()))));
    let (doc, _handle) = mounted(view);

    let before = doc.mutation_count();
    left.set(String::from("L2"));
    assert_eq!(
        doc.mutation_count() - before,
        1,
        "writing one cell must not touch the other subscription's node"
    );
    assert_eq!(doc.text_content(content_root(&doc)), "L2R");
}

#[test]
fn test_batch_coalesces_writes() {
    let a = signal(1i64);
    let b = signal(2i64);
    let a_in = a.clone();
    let b_in = b.clone();
    let view = el("div").child(dyn_text(move || Ok(format!("{}", a_in.get() + b_in.get()))));
    let (doc, _handle) = mounted(view);

    let before = doc.mutation_count();
    batch(|| {
        a.set(10);
        b.set(20);
    });
    assert_eq!(doc.text_content(content_root(&doc)), "30");
    assert_eq!(
        doc.mutation_count() - before,
        1,
        "two writes in a batch settle as one patch"
    );
}

#[test]
fn test_dynamic_attr_presence_transitions() {
    let enabled = signal(false);
    let enabled_in = enabled.clone();
    let view = el("button").attr_dyn("disabled", move || Ok(AttrValue::Bool(!enabled_in.get())));
    let (doc, _handle) = mounted(view);
    let button = content_root(&doc);
    assert_eq!(doc.attribute(button, "disabled"), Some(String::new()));

    enabled.set(true);
    assert_eq!(
        doc.attribute(button, "disabled"),
        None,
        "false means the attribute is gone, not present-and-false"
    );

    enabled.set(false);
    assert_eq!(doc.attribute(button, "disabled"), Some(String::new()));
}

#[test]
fn test_attr_thunk_writing_its_own_input_settles() {
    let count = signal(0i64);
    let count_in = count.clone();
    let view = el("div").attr_dyn("data-gen", move || {
        let seen = count_in.get();
        if seen < 1 {
            count_in.set(seen + 1);
        }
        Ok(AttrValue::Int(seen))
    });
    let (doc, _handle) = mounted(view);
    assert_eq!(
        doc.attribute(content_root(&doc), "data-gen"),
        Some(String::from("1")),
        "a write during the thunk's first run re-applies once the value settles"
    );
    assert_eq!(count.get(), 1);
}

// =============================================================================
// KEYED LISTS
// =============================================================================

fn item_row(id: i64, label: String) -> VNode {
    el("li").key(id).child(text(label))
}

#[test]
fn test_keyed_append_keeps_existing_nodes() {
    let items = List::new([Value::str("a"), Value::str("b"), Value::str("c")]);
    let items_in = items.clone();
    let view = el("ul").children_dyn(move || {
        Ok(items_in
            .to_vec()
            .into_iter()
            .enumerate()
            .map(|(i, v)| item_row(i as i64, v.as_str().unwrap_or("").to_string()))
            .collect())
    });
    let (doc, _handle) = mounted(view);
    let ul = content_root(&doc);
    let before_ids = doc.children_of(ul);
    assert_eq!(before_ids.len(), 3);

    items.push(Value::str("d"));
    let after_ids = doc.children_of(ul);
    assert_eq!(after_ids.len(), 4);
    assert_eq!(
        &after_ids[..3],
        &before_ids[..],
        "existing keyed rows keep their nodes on append"
    );
    assert_eq!(doc.text_content(ul), "abcd");
}

#[test]
fn test_keyed_reorder_permutes_same_nodes() {
    let items = List::new([Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
    let items_in = items.clone();
    let view = el("ul").children_dyn(move || {
        Ok(items_in
            .to_vec()
            .into_iter()
            .map(|v| {
                let n = v.as_int().unwrap_or(0);
                item_row(n, n.to_string())
            })
            .collect())
    });
    let (doc, _handle) = mounted(view);
    let ul = content_root(&doc);
    let before_ids = doc.children_of(ul);

    // [1 2 3 4] -> [4 1 2 3]
    items.move_item(3, 0);
    let after_ids = doc.children_of(ul);
    assert_eq!(doc.text_content(ul), "4123");
    assert_eq!(after_ids[0], before_ids[3], "moved row keeps its node");
    assert_eq!(&after_ids[1..], &before_ids[..3]);
}

#[test]
fn test_keyed_remove_drops_only_that_row() {
    let items = List::new([Value::Int(1), Value::Int(2), Value::Int(3)]);
    let items_in = items.clone();
    let view = el("ul").children_dyn(move || {
        Ok(items_in
            .to_vec()
            .into_iter()
            .map(|v| {
                let n = v.as_int().unwrap_or(0);
                item_row(n, n.to_string())
            })
            .collect())
    });
    let (doc, _handle) = mounted(view);
    let ul = content_root(&doc);
    let before_ids = doc.children_of(ul);

    items.remove(1);
    let after_ids = doc.children_of(ul);
    assert_eq!(doc.text_content(ul), "13");
    assert_eq!(after_ids, vec![before_ids[0], before_ids[2]]);
}

#[test]
fn test_identical_list_rerender_is_free() {
    let items = List::new([Value::Int(1), Value::Int(2), Value::Int(3)]);
    let items_in = items.clone();
    let view = el("ul").children_dyn(move || {
        Ok(items_in
            .to_vec()
            .into_iter()
            .map(|v| {
                let n = v.as_int().unwrap_or(0);
                item_row(n, n.to_string())
            })
            .collect())
    });
    let (doc, _handle) = mounted(view);
    let ul = content_root(&doc);
    let before_ids = doc.children_of(ul);
    let before = doc.mutation_count();

    // Structural notify with identical contents: reconciliation runs,
    // resolves every row to its existing binding, and touches nothing.
    items.replace([Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(
        doc.mutation_count(),
        before,
        "re-rendering an unchanged list must be mutation-free"
    );
    assert_eq!(doc.children_of(ul), before_ids);
}

#[test]
fn test_duplicate_keys_still_render() {
    let items = List::new([Value::Int(7), Value::Int(7), Value::Int(8)]);
    let items_in = items.clone();
    let view = el("ul").children_dyn(move || {
        Ok(items_in
            .to_vec()
            .into_iter()
            .map(|v| {
                let n = v.as_int().unwrap_or(0);
                item_row(n, n.to_string())
            })
            .collect())
    });
    let (doc, _handle) = mounted(view);
    let ul = content_root(&doc);
    assert_eq!(
        doc.children_of(ul).len(),
        3,
        "a duplicate key demotes to unkeyed instead of dropping the row"
    );
    assert_eq!(doc.text_content(ul), "778");
}

// =============================================================================
// DYNAMIC NODE TYPES
// =============================================================================

#[test]
fn test_type_change_replaces_node_and_reapplies_props() {
    let heading = signal(false);
    let label = signal(String::from("first"));
    let heading_in = heading.clone();
    let label_in = label.clone();
    let view = el("div").child(
        dynamic(move || {
            Ok(if heading_in.get() {
                NodeType::Tag(String::from("h1"))
            } else {
                NodeType::Tag(String::from("p"))
            })
        })
        .attr_dyn("data-label", move || Ok(AttrValue::Str(label_in.get())))
        .child(text("body")),
    );
    let (doc, _handle) = mounted(view);
    let div = content_root(&doc);
    let par = doc.children_of(div)[0];
    assert_eq!(doc.tag(par), Some(String::from("p")));
    assert_eq!(doc.attribute(par, "data-label"), Some(String::from("first")));

    // Change the label while the node exists, then flip the type: the
    // replacement must carry the current value, not the mount-time one.
    label.set(String::from("second"));
    heading.set(true);
    let h1 = doc.children_of(div)[0];
    assert_ne!(h1, par, "a type change builds a new node");
    assert_eq!(doc.tag(h1), Some(String::from("h1")));
    assert_eq!(
        doc.attribute(h1, "data-label"),
        Some(String::from("second")),
        "replacement renders from current cell values"
    );
    assert_eq!(doc.text_content(h1), "body");
}

#[test]
fn test_same_type_resolution_is_stable() {
    let tick = signal(0i64);
    let tick_in = tick.clone();
    let view = el("div").child(
        dynamic(move || {
            tick_in.get();
            Ok(NodeType::Tag(String::from("span")))
        })
        .child(text("steady")),
    );
    let (doc, _handle) = mounted(view);
    let div = content_root(&doc);
    let span = doc.children_of(div)[0];

    let before = doc.mutation_count();
    tick.set(1);
    assert_eq!(
        doc.mutation_count(),
        before,
        "re-resolving to the same tag must not rebuild"
    );
    assert_eq!(doc.children_of(div)[0], span);
}

#[test]
fn test_empty_keeps_sibling_slot() {
    let visible = signal(true);
    let visible_in = visible.clone();
    let view = el("div")
        .child(text("before"))
        .child(dynamic(move || {
            Ok(if visible_in.get() {
                NodeType::Tag(String::from("em"))
            } else {
                NodeType::Empty
            })
        }))
        .child(text("after"));
    let (doc, _handle) = mounted(view);
    let div = content_root(&doc);
    let first = doc.children_of(div)[0];
    let last = doc.children_of(div)[2];

    visible.set(false);
    assert_eq!(doc.to_html(div), "<div>before<!---->after</div>");
    assert_eq!(doc.children_of(div)[0], first, "leading sibling unaffected");
    assert_eq!(doc.children_of(div)[2], last, "trailing sibling unaffected");

    visible.set(true);
    assert_eq!(doc.to_html(div), "<div>before<em></em>after</div>");
}

#[test]
fn test_dyn_text_type_changes_patch_without_rebuild() {
    let word = signal(String::from("one"));
    let word_in = word.clone();
    let view = el("p").child(dyn_text(move || Ok(word_in.get())));
    let (doc, _handle) = mounted(view);
    let p = content_root(&doc);
    let text_node = doc.children_of(p)[0];

    word.set(String::from("two"));
    assert_eq!(doc.text_content(p), "two");
    assert_eq!(
        doc.children_of(p)[0],
        text_node,
        "text-to-text resolution patches the payload in place"
    );
}

// =============================================================================
// LISTENERS
// =============================================================================

#[test]
fn test_listeners_fire_and_stay_exclusive() {
    let hits = Rc::new(Cell::new((0u32, 0u32)));
    let hits_a = hits.clone();
    let hits_b = hits.clone();
    let view = el("div")
        .child(el("button").on("click", move |_| {
            let (a, b) = hits_a.get();
            hits_a.set((a + 1, b));
        }))
        .child(el("button").on("click", move |_| {
            let (a, b) = hits_b.get();
            hits_b.set((a, b + 1));
        }));
    let (doc, _handle) = mounted(view);
    let div = content_root(&doc);
    let buttons = doc.children_of(div);

    assert_eq!(doc.dispatch(buttons[0], "click"), 1);
    assert_eq!(doc.dispatch(buttons[0], "click"), 1);
    assert_eq!(doc.dispatch(buttons[1], "click"), 1);
    assert_eq!(hits.get(), (2, 1), "each button only triggers its own handler");
}

#[test]
fn test_event_write_render_loop() {
    let count = signal(0i64);
    let count_read = count.clone();
    let count_write = count.clone();
    let view = el("div")
        .child(dyn_text(move || Ok(format!("n={}", count_read.get()))))
        .child(el("button").on("click", move |_| count_write.update(|n| *n += 1)));
    let (doc, _handle) = mounted(view);
    let div = content_root(&doc);
    let button = doc.children_of(div)[1];

    doc.dispatch(button, "click");
    doc.dispatch(button, "click");
    assert_eq!(
        doc.text_content(div),
        "n=2",
        "handler writes flush back into the DOM synchronously"
    );
}

#[test]
fn test_patched_row_swaps_handler_not_node() {
    let items = List::new([Value::Int(1)]);
    let clicks = Rc::new(Cell::new(0i64));
    let items_in = items.clone();
    let clicks_in = clicks.clone();
    let view = el("ul").children_dyn(move || {
        Ok(items_in
            .to_vec()
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let n = v.as_int().unwrap_or(0);
                let clicks = clicks_in.clone();
                el("li")
                    .key(i)
                    .on("click", move |_| clicks.set(clicks.get() + n))
                    .child(text(n.to_string()))
            })
            .collect())
    });
    let (doc, _handle) = mounted(view);
    let ul = content_root(&doc);
    let row = doc.children_of(ul)[0];
    assert_eq!(doc.listener_count(row), 1);

    // Same key, new description pass: the closure identity changed, so
    // the listener is replaced, but never doubled.
    items.set(0, Value::Int(5));
    assert_eq!(doc.children_of(ul)[0], row, "keyed row keeps its node");
    assert_eq!(doc.listener_count(row), 1, "old handler must be dropped");
    doc.dispatch(row, "click");
    assert_eq!(clicks.get(), 5, "dispatch reaches the latest handler");
}

// =============================================================================
// COMPONENTS
// =============================================================================

#[test]
fn test_component_body_runs_once() {
    let body_runs = Rc::new(Cell::new(0u32));
    let label = signal(String::from("hi"));
    let runs_in = body_runs.clone();
    let label_in = label.clone();
    let card = component(move || {
        runs_in.set(runs_in.get() + 1);
        let label = label_in.clone();
        Ok(el("section").child(dyn_text(move || Ok(label.get()))))
    });
    let view = el("div").child(card.clone());
    let (doc, _handle) = mounted(view);
    assert_eq!(body_runs.get(), 1);

    label.set(String::from("again"));
    assert_eq!(doc.text_content(doc.root()), "again");
    assert_eq!(
        body_runs.get(),
        1,
        "updates flow through thunks, not body re-runs"
    );
}

#[test]
fn test_component_reads_do_not_subscribe_body() {
    let mode = signal(0i64);
    let mode_in = mode.clone();
    // The body reads a cell directly; that read must not create a
    // subscription that re-renders the component.
    let gauge = component(move || {
        let initial = mode_in.get();
        Ok(el("span").child(text(format!("start={initial}"))))
    });
    let view = el("div").child(gauge.clone());
    let (doc, _handle) = mounted(view);
    let before = doc.mutation_count();

    mode.set(9);
    assert_eq!(
        doc.mutation_count(),
        before,
        "component bodies are untracked"
    );
    assert_eq!(doc.text_content(doc.root()), "start=0");
}
