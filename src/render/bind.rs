// ============================================================================
// cinder - Renderer / Binder
// ============================================================================
//
// Rendering clones a compiled template's prototype tree, walks it for marker
// sites, and binds each site to its value. Each slot's Static-or-Reactive
// nature is decided exactly once, here at bind time:
//
//   - scalar values write once into the cloned tree (no effect)
//   - Getter values get one effect per slot, scoped to the instance
//   - Tpl / List values render recursively between comment anchors
//
// Every reactive slot runs inside catch_unwind: a panicking getter logs and
// leaves its own region stale while all sibling slots keep updating.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::dom::node::Node;
use crate::error::{Result, RuntimeError};
use crate::primitives::effect::{detached, render_effect};
use crate::primitives::scope::{effect_scope, EffectScope};
use crate::reactivity::batching::untrack;
use crate::render::reconcile::{reconcile, ListEntry};
use crate::template::compile::{collect_marker_sites, MarkerSite, SlotShape, Template};
use crate::template::value::Value;

// =============================================================================
// TEMPLATE INSTANCE
// =============================================================================

/// A rendered template: the cloned tree plus the effect scope owning every
/// binding effect created for it. Dropping (or disposing) the instance stops
/// the scope, which disposes all slot effects.
pub struct TemplateInstance {
    root: Node,
    nodes: Vec<Node>,
    scope: EffectScope,

    /// Static scalar text slots, addressable for in-place patching when a
    /// keyed list reuses this instance with new values.
    text_slots: Vec<(usize, Node)>,

    /// Static scalar attribute slots, patched the same way.
    attr_slots: Vec<(usize, Node, String)>,

    /// Instances of statically nested templates and list items, owned so
    /// their effects die with this instance.
    children: RefCell<Vec<TemplateInstance>>,
}

impl fmt::Debug for TemplateInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateInstance")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("children", &self.children.borrow().len())
            .finish_non_exhaustive()
    }
}

impl TemplateInstance {
    /// The root fragment (children may have been moved out by `mount`).
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Top-level nodes produced by the render.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.clone()
    }

    /// Stop the instance's effect scope, disposing every slot effect, and
    /// recursively dispose nested instances. Does not touch the DOM; the
    /// caller decides whether nodes are removed or discarded wholesale.
    pub fn dispose(&self) {
        self.scope.stop();
        for child in self.children.borrow().iter() {
            child.dispose();
        }
    }

    /// Patch static scalar text slots with the values of a newer template
    /// from the same call site. Reactive slots keep their own effects and
    /// are left alone.
    pub(crate) fn patch(&self, template: &Template) {
        let values = template.values();
        for (idx, node) in &self.text_slots {
            if let Some(value) = values.get(*idx) {
                if value.is_scalar() {
                    node.set_text(value.as_text());
                }
            }
        }
        for (idx, node, name) in &self.attr_slots {
            if let Some(value) = values.get(*idx) {
                if value.is_scalar() {
                    apply_attr(node, name, value);
                }
            }
        }
    }
}

// =============================================================================
// RENDER / MOUNT
// =============================================================================

/// Render a template into a detached fragment, binding every slot.
pub fn render(template: &Template) -> Result<TemplateInstance> {
    let compiled = template.compiled().clone();
    let root = compiled.prototype.deep_clone();
    let scope = effect_scope(true);

    if compiled.static_only {
        let nodes = root.children();
        return Ok(TemplateInstance {
            root,
            nodes,
            scope,
            text_slots: Vec::new(),
            attr_slots: Vec::new(),
            children: RefCell::new(Vec::new()),
        });
    }

    let sites = collect_marker_sites(&root);
    let values = template.values();
    if sites.len() != values.len() {
        return Err(RuntimeError::SlotCountMismatch {
            expected: sites.len(),
            supplied: values.len(),
        });
    }

    let mut text_slots = Vec::new();
    let mut attr_slots = Vec::new();
    let children = RefCell::new(Vec::new());

    let outcome = scope
        .run(|| -> Result<()> {
            for (idx, site) in sites.into_iter().enumerate() {
                bind_slot(
                    site,
                    &values[idx],
                    idx,
                    &mut text_slots,
                    &mut attr_slots,
                    &children,
                )?;
            }
            Ok(())
        })
        .unwrap_or(Ok(()));
    outcome?;

    // Top-level nodes are captured after binding: markers at the root may
    // have been replaced by anchors
    let nodes = root.children();

    Ok(TemplateInstance {
        root,
        nodes,
        scope,
        text_slots,
        attr_slots,
        children,
    })
}

/// Render a template and append its nodes into `target`.
pub fn mount(template: &Template, target: &Node) -> Result<TemplateInstance> {
    let instance = render(template)?;
    for node in instance.nodes() {
        target.append_child(&node);
    }
    Ok(instance)
}

/// Render a template into the element with the given `id` under `root`.
pub fn mount_by_id(template: &Template, root: &Node, id: &str) -> Result<TemplateInstance> {
    let target = root
        .find_by_id(id)
        .ok_or_else(|| RuntimeError::TargetNotFound(id.to_string()))?;
    mount(template, &target)
}

// =============================================================================
// SLOT BINDING
// =============================================================================

fn bind_slot(
    site: MarkerSite,
    value: &Value,
    idx: usize,
    text_slots: &mut Vec<(usize, Node)>,
    attr_slots: &mut Vec<(usize, Node, String)>,
    children: &RefCell<Vec<TemplateInstance>>,
) -> Result<()> {
    match site.shape {
        SlotShape::Text => bind_text_slot(site.node, value, idx, text_slots, children),
        SlotShape::Attr(name) => bind_attr_slot(site.node, &name, value, idx, attr_slots),
    }
}

fn bind_text_slot(
    marker: Node,
    value: &Value,
    idx: usize,
    text_slots: &mut Vec<(usize, Node)>,
    children: &RefCell<Vec<TemplateInstance>>,
) -> Result<()> {
    let Some(parent) = marker.parent() else {
        return Ok(());
    };

    match value {
        Value::Getter(getter) => {
            bind_reactive_region(&parent, &marker, getter.clone());
            Ok(())
        }
        Value::Tpl(tpl) => {
            let instance = render(tpl)?;
            for node in instance.nodes() {
                parent.insert_before(&node, Some(&marker));
            }
            parent.remove_child(&marker);
            children.borrow_mut().push(instance);
            Ok(())
        }
        Value::List(items) => {
            let mut region = Region::replace_marker(parent, &marker);
            region.update(Value::List(items.clone()))?;
            // A static list never reconciles again; the entries' instances
            // move to the parent so their effects stay alive
            if let RegionContent::List(entries) = region.take_content() {
                let mut owned = children.borrow_mut();
                for entry in entries {
                    if let Some(instance) = entry.into_instance() {
                        owned.push(instance);
                    }
                }
            }
            Ok(())
        }
        scalar => {
            marker.set_text(scalar.as_text());
            text_slots.push((idx, marker));
            Ok(())
        }
    }
}

fn bind_attr_slot(
    node: Node,
    name: &str,
    value: &Value,
    idx: usize,
    attr_slots: &mut Vec<(usize, Node, String)>,
) -> Result<()> {
    // key= feeds the reconciler, never the rendered output
    if name == "key" {
        node.remove_attribute(name);
        let key = match value {
            Value::Getter(getter) => untrack(|| getter()).as_text(),
            other => other.as_text(),
        };
        node.set_key(key);
        return Ok(());
    }

    // ref= hands the live node to the callback once, after it exists
    if name == "ref" {
        if let Value::NodeRef(callback) = value {
            node.remove_attribute(name);
            callback(&node);
            return Ok(());
        }
    }

    // on*= with a handler becomes a listener; replacement keeps re-renders
    // idempotent
    if let Some(event_type) = name.strip_prefix("on") {
        if let Value::Handler(handler) = value {
            node.remove_attribute(name);
            node.add_listener(event_type.to_lowercase(), handler.clone());
            return Ok(());
        }
    }

    // style= with a style object merges onto the existing style attribute
    if name == "style" {
        match value {
            Value::Style(map) => {
                merge_style(&node, map);
                return Ok(());
            }
            Value::Getter(getter) => {
                let getter = getter.clone();
                let node = node.clone();
                render_effect(isolated(move || {
                    if let Value::Style(map) = getter() {
                        merge_style(&node, &map);
                    } else {
                        tracing::error!("style slot getter did not produce a style object");
                    }
                }));
                return Ok(());
            }
            _ => {}
        }
    }

    // Form state lives on properties, not attributes
    if matches!(name, "value" | "checked" | "selected") {
        node.remove_attribute(name);
        match value {
            Value::Getter(getter) => {
                let getter = getter.clone();
                let node = node.clone();
                let prop = name.to_string();
                render_effect(isolated(move || {
                    node.set_prop(prop.clone(), getter());
                }));
            }
            other => node.set_prop(name, other.clone()),
        }
        return Ok(());
    }

    // Custom elements receive live values as props in their bag
    if node.is_custom_element() && matches!(value, Value::Getter(_) | Value::Handler(_)) {
        node.remove_attribute(name);
        match value {
            Value::Getter(getter) => {
                let getter = getter.clone();
                let node = node.clone();
                let prop = name.to_string();
                render_effect(isolated(move || {
                    node.set_prop(prop.clone(), getter());
                }));
            }
            other => node.set_prop(name, other.clone()),
        }
        return Ok(());
    }

    // Plain attribute with truthiness rules
    match value {
        Value::Getter(getter) => {
            let getter = getter.clone();
            let node = node.clone();
            let attr = name.to_string();
            render_effect(isolated(move || {
                apply_attr(&node, &attr, &getter());
            }));
        }
        other => {
            apply_attr(&node, name, other);
            if other.is_scalar() {
                attr_slots.push((idx, node.clone(), name.to_string()));
            }
        }
    }
    Ok(())
}

/// Truthiness attribute rules: absent/false removes, true sets bare,
/// anything else sets the string form.
fn apply_attr(node: &Node, name: &str, value: &Value) {
    match value {
        Value::Null | Value::Bool(false) => node.remove_attribute(name),
        Value::Bool(true) => node.set_attribute(name, ""),
        other => node.set_attribute(name, other.as_text()),
    }
}

/// Overlay style properties onto the node's existing style attribute,
/// keeping properties the object does not mention.
fn merge_style(node: &Node, map: &indexmap::IndexMap<String, String>) {
    let mut merged: indexmap::IndexMap<String, String> = indexmap::IndexMap::new();
    if let Some(existing) = node.get_attribute("style") {
        for decl in existing.split(';') {
            if let Some((prop, val)) = decl.split_once(':') {
                let prop = prop.trim();
                let val = val.trim();
                if !prop.is_empty() {
                    merged.insert(prop.to_string(), val.to_string());
                }
            }
        }
    }
    for (prop, val) in map {
        merged.insert(prop.clone(), val.clone());
    }
    let text = merged
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("; ");
    node.set_attribute("style", text);
}

// =============================================================================
// REACTIVE REGIONS
// =============================================================================

/// What currently lives between a region's comment anchors.
enum RegionContent {
    Empty,
    Text(Node),
    Tpl {
        statics_id: usize,
        instance: TemplateInstance,
    },
    List(Vec<ListEntry>),
}

/// A reactive text-position slot: the span between a `<!--slot-->` /
/// `<!--/slot-->` anchor pair, retargeted on every getter re-run.
struct Region {
    parent: Node,
    start: Node,
    end: Node,
    content: RegionContent,
}

impl Region {
    /// Replace a marker text node with a fresh anchor pair.
    fn replace_marker(parent: Node, marker: &Node) -> Region {
        let start = Node::comment("slot");
        let end = Node::comment("/slot");
        parent.insert_before(&start, Some(marker));
        parent.insert_before(&end, Some(marker));
        parent.remove_child(marker);
        Region {
            parent,
            start,
            end,
            content: RegionContent::Empty,
        }
    }

    fn take_content(&mut self) -> RegionContent {
        std::mem::replace(&mut self.content, RegionContent::Empty)
    }

    fn insert(&self, node: &Node) {
        self.parent.insert_before(node, Some(&self.end));
    }

    /// Remove every node between the anchors and dispose owned instances.
    fn clear(&mut self) {
        loop {
            let Some(next) = self.start.next_sibling() else {
                break;
            };
            if next.ptr_eq(&self.end) {
                break;
            }
            self.parent.remove_child(&next);
        }
        match self.take_content() {
            RegionContent::Tpl { instance, .. } => instance.dispose(),
            RegionContent::List(entries) => {
                for entry in entries {
                    if let Some(instance) = entry.into_instance() {
                        instance.dispose();
                    }
                }
            }
            _ => {}
        }
    }

    fn update(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Getter(getter) => {
                // A getter returning a getter: unwrap while still tracking
                self.update(getter())
            }
            Value::Tpl(tpl) => {
                if let RegionContent::Tpl {
                    statics_id,
                    instance,
                } = &self.content
                {
                    if *statics_id == tpl.statics_id() {
                        // Same call site: patch text in place, keep the tree
                        instance.patch(&tpl);
                        return Ok(());
                    }
                }
                self.clear();
                let instance = detached(|| render(&tpl))?;
                for node in instance.nodes() {
                    self.insert(&node);
                }
                self.content = RegionContent::Tpl {
                    statics_id: tpl.statics_id(),
                    instance,
                };
                Ok(())
            }
            Value::List(items) => {
                let old = match self.take_content() {
                    RegionContent::List(entries) => entries,
                    other => {
                        self.content = other;
                        self.clear();
                        Vec::new()
                    }
                };
                let entries = reconcile(&self.parent, &self.end, old, &items)?;
                self.content = RegionContent::List(entries);
                Ok(())
            }
            scalar => {
                if let RegionContent::Text(node) = &self.content {
                    node.set_text(scalar.as_text());
                    return Ok(());
                }
                self.clear();
                let node = Node::text(scalar.as_text());
                self.insert(&node);
                self.content = RegionContent::Text(node);
                Ok(())
            }
        }
    }
}

fn bind_reactive_region(parent: &Node, marker: &Node, getter: Rc<dyn Fn() -> Value>) {
    let region = RefCell::new(Region::replace_marker(parent.clone(), marker));
    render_effect(move || {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let value = getter();
            region.borrow_mut().update(value)
        }));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "slot update failed; other slots unaffected");
            }
            Err(_) => {
                tracing::error!("slot update panicked; other slots unaffected");
            }
        }
        None
    });
}

/// Wrap a slot updater so one panicking slot never takes down its siblings.
fn isolated<F>(mut f: F) -> impl FnMut() -> Option<crate::primitives::effect::CleanupFn>
where
    F: FnMut() + 'static,
{
    move || {
        if catch_unwind(AssertUnwindSafe(|| f())).is_err() {
            tracing::error!("slot update panicked; other slots unaffected");
        }
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================
