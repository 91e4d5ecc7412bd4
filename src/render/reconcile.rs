// ============================================================================
// cinder - Keyed List Reconciler
// ============================================================================
//
// Transforms the node region between a list slot's comment anchors from the
// old keyed sequence to the new one with minimal live DOM operations:
// two-pointer prefix/suffix trim, bulk insert/remove, a reversed-pair swap
// fast path, then a key-index map choosing between contiguous block moves
// and single replace_child swaps. Diffing and mutation are interleaved;
// there is no staged operation buffer.
//
// Reused keys keep their node identity (and therefore listeners and any
// internal state). Same-shape value changes patch text in place. Key
// collisions resolve last-write-wins on the key map with a warning.
// ============================================================================

use std::fmt;

use indexmap::IndexMap;

use crate::dom::node::Node;
use crate::error::{Result, RuntimeError};
use crate::primitives::effect::detached;
use crate::render::bind::{render, TemplateInstance};
use crate::template::value::Value;

// =============================================================================
// LIST ENTRY
// =============================================================================

/// One keyed item: its key, its single root node, and (for template items)
/// the owning instance whose effects die with the entry.
pub struct ListEntry {
    key: String,
    node: Node,
    instance: Option<TemplateInstance>,
    value: Value,
}

impl fmt::Debug for ListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListEntry")
            .field("key", &self.key)
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl ListEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub(crate) fn into_instance(self) -> Option<TemplateInstance> {
        self.instance
    }

    fn dispose(&self) {
        if let Some(instance) = &self.instance {
            instance.dispose();
        }
    }
}

/// Key derivation: the template's explicit `key=` slot, else the positional
/// fallback. Both passes (old and new) must use the same rule or spurious
/// remove/insert pairs result.
fn item_key(item: &Value, index: usize) -> String {
    match item {
        Value::Tpl(tpl) => tpl
            .key()
            .unwrap_or_else(|| format!("index-{}", index)),
        _ => format!("index-{}", index),
    }
}

// =============================================================================
// RECONCILE
// =============================================================================

/// Reconcile the region ending at `before` (the slot's end anchor) under
/// `parent` from `old` entries to `items`, returning the new entries.
pub fn reconcile(
    parent: &Node,
    before: &Node,
    old: Vec<ListEntry>,
    items: &[Value],
) -> Result<Vec<ListEntry>> {
    let old_nodes: Vec<Node> = old.iter().map(|e| e.node.clone()).collect();
    let mut old_map: IndexMap<String, ListEntry> =
        old.into_iter().map(|e| (e.key.clone(), e)).collect();

    let mut new_entries: Vec<ListEntry> = Vec::with_capacity(items.len());
    let mut seen: IndexMap<String, usize> = IndexMap::new();

    for (i, item) in items.iter().enumerate() {
        let key = item_key(item, i);
        if let Some(first) = seen.insert(key.clone(), i) {
            tracing::warn!(
                key = %key,
                first_index = first,
                second_index = i,
                "duplicate list key; key map resolves last-write-wins"
            );
        }

        match old_map.shift_remove(&key) {
            Some(mut entry) => {
                if entry.value != *item {
                    if same_shape(&entry.value, item) {
                        patch_entry(&mut entry, item);
                    } else {
                        // Shape changed: the old node leaves with the diff,
                        // a fresh entry takes the key
                        entry.dispose();
                        new_entries.push(create_entry(key, item)?);
                        continue;
                    }
                }
                new_entries.push(entry);
            }
            None => new_entries.push(create_entry(key, item)?),
        }
    }

    let new_nodes: Vec<Node> = new_entries.iter().map(|e| e.node.clone()).collect();
    apply_diff(parent, &old_nodes, &new_nodes, before);

    // Entries whose key vanished: nodes are already out of the DOM
    for (_, entry) in old_map {
        entry.dispose();
    }

    Ok(new_entries)
}

fn same_shape(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Tpl(a), Value::Tpl(b)) => a.statics_id() == b.statics_id(),
        (a, b) => a.is_scalar() && b.is_scalar(),
    }
}

fn patch_entry(entry: &mut ListEntry, item: &Value) {
    match item {
        Value::Tpl(tpl) => {
            if let Some(instance) = &entry.instance {
                instance.patch(tpl);
            }
        }
        scalar => {
            entry.node.set_text(scalar.as_text());
        }
    }
    entry.value = item.clone();
}

fn create_entry(key: String, item: &Value) -> Result<ListEntry> {
    match item {
        Value::Tpl(tpl) => {
            // Items render detached so the enclosing region effect's re-runs
            // never tear down item effects; the entry owns them instead.
            let instance = detached(|| render(tpl))?;
            let nodes = instance.nodes();
            if nodes.len() != 1 {
                instance.dispose();
                return Err(RuntimeError::ListItemShape(nodes.len()));
            }
            let Some(node) = nodes.into_iter().next() else {
                return Err(RuntimeError::ListItemShape(0));
            };
            node.set_key(&key);
            Ok(ListEntry {
                key,
                node,
                instance: Some(instance),
                value: item.clone(),
            })
        }
        other => {
            let node = Node::text(other.as_text());
            node.set_key(&key);
            Ok(ListEntry {
                key,
                node,
                instance: None,
                value: other.clone(),
            })
        }
    }
}

// =============================================================================
// NODE-LEVEL DIFF
// =============================================================================

/// Mutate `parent` so the region before `before` changes from node sequence
/// `a` to node sequence `b`. Node comparison is pointer identity.
pub(crate) fn apply_diff(parent: &Node, a: &[Node], b: &[Node], before: &Node) {
    let mut a: Vec<Node> = a.to_vec();
    let mut a_start = 0usize;
    let mut a_end = a.len();
    let mut b_start = 0usize;
    let mut b_end = b.len();
    let mut map: Option<IndexMap<usize, usize>> = None;

    while a_start < a_end || b_start < b_end {
        if a_end == a_start {
            // Old window exhausted: bulk-insert the remaining new nodes
            // before the suffix (already in place) or the end anchor
            let reference = if b_end < b.len() {
                b[b_end].clone()
            } else {
                before.clone()
            };
            while b_start < b_end {
                parent.insert_before(&b[b_start], Some(&reference));
                b_start += 1;
            }
        } else if b_end == b_start {
            // New window exhausted: bulk-remove the remaining old nodes
            while a_start < a_end {
                let keep = map
                    .as_ref()
                    .is_some_and(|m| m.contains_key(&a[a_start].id()));
                if !keep {
                    parent.remove_child(&a[a_start]);
                }
                a_start += 1;
            }
        } else if a[a_start].ptr_eq(&b[b_start]) {
            // Matching prefix
            a_start += 1;
            b_start += 1;
        } else if a[a_end - 1].ptr_eq(&b[b_end - 1]) {
            // Matching suffix
            a_end -= 1;
            b_end -= 1;
        } else if a[a_start].ptr_eq(&b[b_end - 1]) && b[b_start].ptr_eq(&a[a_end - 1]) {
            // Reversed-pair swap fast path: two insert_before calls
            a_end -= 1;
            b_end -= 1;
            let after_last = a[a_end].next_sibling();
            let after_first = a[a_start].next_sibling();
            parent.insert_before(&b[b_start], after_first.as_ref());
            a_start += 1;
            b_start += 1;
            parent.insert_before(&b[b_end], after_last.as_ref().or(Some(before)));
            a[a_end] = b[b_end].clone();
        } else {
            if map.is_none() {
                let mut m = IndexMap::new();
                for (i, node) in b.iter().enumerate().take(b_end).skip(b_start) {
                    m.insert(node.id(), i);
                }
                map = Some(m);
            }
            let Some(m) = map.as_ref() else { continue };

            match m.get(&a[a_start].id()) {
                Some(&index) if b_start < index && index < b_end => {
                    // Count the run of old nodes that are already contiguous
                    // in the new order
                    let mut i = a_start + 1;
                    let mut sequence = 1usize;
                    while i < a_end && i < b_end {
                        match m.get(&a[i].id()) {
                            Some(&next) if next == index + sequence => {
                                sequence += 1;
                                i += 1;
                            }
                            _ => break,
                        }
                    }
                    if sequence > index - b_start {
                        // Block move: bring the few preceding new nodes in
                        // front of the run instead of moving the run
                        let anchor = a[a_start].clone();
                        while b_start < index {
                            parent.insert_before(&b[b_start], Some(&anchor));
                            b_start += 1;
                        }
                    } else {
                        parent.replace_child(&b[b_start], &a[a_start]);
                        b_start += 1;
                        a_start += 1;
                    }
                }
                Some(_) => {
                    // Needed later in this window; leave it for now
                    a_start += 1;
                }
                None => {
                    parent.remove_child(&a[a_start]);
                    a_start += 1;
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
