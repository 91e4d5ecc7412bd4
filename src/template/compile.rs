// ============================================================================
// cinder - Template Compiler
// Sentinel join + per-call-site compiled template cache
// ============================================================================
//
// A template call site supplies a `&'static [&'static str]` statics array
// (materialised by the html! macro) and a values vector. The statics are
// joined with a reserved sentinel character, parsed once into a prototype
// node tree, and cached keyed by the statics array's address - the same
// call site never re-parses, exactly like template-literal identity.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dom::node::Node;
use crate::error::{Result, RuntimeError};
use crate::template::parser::parse;
use crate::template::value::Value;

/// Reserved sentinel standing in for one interpolation. A private-use code
/// point never expected in user content.
pub const MARKER: char = '\u{E001}';

// =============================================================================
// SLOT SHAPES
// =============================================================================

/// Where a marker sits in the prototype tree, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotShape {
    /// A dedicated text node holding the sentinel.
    Text,
    /// An attribute whose value is the sentinel.
    Attr(String),
}

/// A marker location found by walking a (cloned) tree.
pub(crate) struct MarkerSite {
    pub node: Node,
    pub shape: SlotShape,
}

/// Depth-first walk collecting marker sites in source order: an element's
/// attributes come before its children, siblings in document order.
pub(crate) fn collect_marker_sites(root: &Node) -> Vec<MarkerSite> {
    let mut sites = Vec::new();
    collect_into(root, &mut sites);
    sites
}

fn collect_into(node: &Node, sites: &mut Vec<MarkerSite>) {
    let marker_str = MARKER.to_string();
    if node.is_text() && node.raw_text() == marker_str {
        sites.push(MarkerSite {
            node: node.clone(),
            shape: SlotShape::Text,
        });
        return;
    }
    if node.is_element() {
        for (name, value) in node.attributes() {
            if value == marker_str {
                sites.push(MarkerSite {
                    node: node.clone(),
                    shape: SlotShape::Attr(name),
                });
            }
        }
    }
    for child in node.children() {
        collect_into(&child, sites);
    }
}

// =============================================================================
// COMPILED TEMPLATE
// =============================================================================

/// The cached result of parsing one call site's statics. Never holds live
/// values; those are supplied fresh on every `html()` call.
pub struct CompiledTemplate {
    /// Prototype tree, deep-cloned per render.
    pub(crate) prototype: Node,

    /// Slot shapes in source order; length equals the interpolation count.
    pub(crate) slots: Vec<SlotShape>,

    /// Index of the `key=` slot, if the root element declares one.
    pub(crate) key_slot: Option<usize>,

    /// Zero interpolations: renders clone the prototype without a tree walk.
    pub(crate) static_only: bool,
}

impl CompiledTemplate {
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_static(&self) -> bool {
        self.static_only
    }
}

// =============================================================================
// CACHE
// =============================================================================

thread_local! {
    /// Compiled templates keyed by statics-array address.
    static TEMPLATE_CACHE: RefCell<IndexMap<usize, Rc<CompiledTemplate>>> =
        RefCell::new(IndexMap::new());
}

/// Compile a statics array, reusing the cache when this call site was seen
/// before.
pub fn compile(statics: &'static [&'static str]) -> Result<Rc<CompiledTemplate>> {
    let cache_key = statics.as_ptr() as usize;

    if let Some(hit) = TEMPLATE_CACHE.with(|c| c.borrow().get(&cache_key).cloned()) {
        return Ok(hit);
    }

    let compiled = Rc::new(compile_uncached(statics)?);
    TEMPLATE_CACHE.with(|c| {
        c.borrow_mut().insert(cache_key, compiled.clone());
    });
    Ok(compiled)
}

fn compile_uncached(statics: &'static [&'static str]) -> Result<CompiledTemplate> {
    let expected = statics.len().saturating_sub(1);

    // Fully static fast path: no join, no marker walk
    if expected == 0 {
        let source = statics.first().copied().unwrap_or("");
        let prototype = parse(source)?;
        return Ok(CompiledTemplate {
            prototype,
            slots: Vec::new(),
            key_slot: None,
            static_only: true,
        });
    }

    let mut source = String::new();
    for (i, part) in statics.iter().enumerate() {
        if i > 0 {
            source.push(MARKER);
        }
        source.push_str(part);
    }

    let prototype = parse(&source)?;
    let sites = collect_marker_sites(&prototype);
    if sites.len() != expected {
        return Err(RuntimeError::Parse(format!(
            "template produced {} marker positions for {} interpolations \
             (markers inside comments or tag names are not bindable)",
            sites.len(),
            expected
        )));
    }

    let slots: Vec<SlotShape> = sites.into_iter().map(|s| s.shape).collect();
    let key_slot = slots
        .iter()
        .position(|s| matches!(s, SlotShape::Attr(name) if name == "key"));

    Ok(CompiledTemplate {
        prototype,
        slots,
        key_slot,
        static_only: false,
    })
}

/// Number of distinct call sites compiled so far (test/diagnostic hook).
pub fn compiled_count() -> usize {
    TEMPLATE_CACHE.with(|c| c.borrow().len())
}

// =============================================================================
// TEMPLATE
// =============================================================================

/// A template: one call site's compiled statics plus this call's values.
/// Cheap to clone; rendering is performed by [`crate::render::bind::render`].
#[derive(Clone)]
pub struct Template {
    compiled: Rc<CompiledTemplate>,
    values: Vec<Value>,
    statics_id: usize,
}

impl Template {
    pub fn compiled(&self) -> &Rc<CompiledTemplate> {
        &self.compiled
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Identity of the originating statics array; two templates from the
    /// same call site share it.
    pub fn statics_id(&self) -> usize {
        self.statics_id
    }

    /// The reconciliation key, when the template declares a `key=` slot.
    pub fn key(&self) -> Option<String> {
        self.compiled
            .key_slot
            .map(|idx| self.values[idx].as_text())
    }

    pub fn is_static(&self) -> bool {
        self.compiled.static_only
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("slots", &self.compiled.slot_count())
            .field("static_only", &self.compiled.static_only)
            .finish()
    }
}

/// Build a template from a statics array and its interpolated values.
///
/// Mismatched value counts and malformed statics are programmer errors and
/// panic: a silently skipped slot would corrupt the rendered tree.
pub fn html(statics: &'static [&'static str], values: Vec<Value>) -> Template {
    let compiled = match compile(statics) {
        Ok(c) => c,
        Err(e) => panic!("{}", e),
    };
    let expected = compiled.slot_count();
    if values.len() != expected {
        let err = RuntimeError::SlotCountMismatch {
            expected,
            supplied: values.len(),
        };
        panic!("{}", err);
    }
    Template {
        compiled,
        values,
        statics_id: statics.as_ptr() as usize,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_template_has_no_slots() {
        static STATICS: &[&str] = &["<p>hi</p>"];
        let tpl = html(STATICS, vec![]);
        assert!(tpl.is_static());
        assert_eq!(tpl.compiled().slot_count(), 0);
    }

    #[test]
    fn slots_are_collected_in_source_order() {
        static STATICS: &[&str] = &["<div class=\"", "\" title=\"", "\">", "</div>"];
        let tpl = html(
            STATICS,
            vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("c"),
            ],
        );
        let slots = &tpl.compiled().slots;
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], SlotShape::Attr("class".into()));
        assert_eq!(slots[1], SlotShape::Attr("title".into()));
        assert_eq!(slots[2], SlotShape::Text);
    }

    #[test]
    fn same_call_site_reuses_compiled_template() {
        static STATICS: &[&str] = &["<div>", "</div>"];
        let first = html(STATICS, vec![Value::from("X")]);
        let second = html(STATICS, vec![Value::from("Y")]);

        assert!(
            Rc::ptr_eq(first.compiled(), second.compiled()),
            "same statics identity must reuse the compiled template"
        );
        assert_ne!(first.values()[0], second.values()[0]);
    }

    #[test]
    fn distinct_call_sites_compile_separately() {
        static A: &[&str] = &["<p>", "</p>"];
        static B: &[&str] = &["<p>", "</p>"];
        let a = html(A, vec![Value::from(1)]);
        let b = html(B, vec![Value::from(1)]);
        assert!(!Rc::ptr_eq(a.compiled(), b.compiled()));
    }

    #[test]
    fn repeated_compiles_hit_the_cache() {
        static STATICS: &[&str] = &["<span>", "</span>"];
        let before = compile(STATICS).unwrap();
        for _ in 0..1000 {
            let again = compile(STATICS).unwrap();
            assert!(Rc::ptr_eq(&before, &again));
        }
    }

    #[test]
    fn key_attribute_slot_is_recorded() {
        static STATICS: &[&str] = &["<li key=\"", "\">", "</li>"];
        let tpl = html(STATICS, vec![Value::from("item-1"), Value::from("text")]);
        assert_eq!(tpl.compiled().key_slot, Some(0));
        assert_eq!(tpl.key().as_deref(), Some("item-1"));
    }

    #[test]
    fn template_without_key_slot() {
        static STATICS: &[&str] = &["<li>", "</li>"];
        let tpl = html(STATICS, vec![Value::from("x")]);
        assert_eq!(tpl.key(), None);
    }

    #[test]
    #[should_panic(expected = "interpolated values")]
    fn value_count_mismatch_panics() {
        static STATICS: &[&str] = &["<div>", " and ", "</div>"];
        let _ = html(STATICS, vec![Value::from(1)]);
    }

    #[test]
    #[should_panic(expected = "template parse error")]
    fn malformed_statics_panic() {
        static STATICS: &[&str] = &["<div><span>", "</div>"];
        let _ = html(STATICS, vec![Value::from(1)]);
    }
}
