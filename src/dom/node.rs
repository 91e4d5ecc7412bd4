// ============================================================================
// cinder - Retained DOM
// A lightweight in-memory node tree standing in for the browser DOM
// ============================================================================
//
// Node is a cheap-clone Rc handle; node identity is Rc pointer identity.
// The renderer and reconciler mutate the tree through live operations
// (insert_before / remove_child / replace_child), never through a staged
// diff buffer, so reconciliation tests can observe real node reuse.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::dom::event::{Event, ListenerFn};
use crate::template::value::Value;

// =============================================================================
// NODE KIND
// =============================================================================

/// What a node is. Fragment is a parent-less container used for template
/// roots; its children are spliced into a real parent on mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element { tag: String },
    Text,
    Comment,
    Fragment,
}

// =============================================================================
// MUTATION ACCOUNTING
// =============================================================================

thread_local! {
    static NODES_CREATED: Cell<u64> = const { Cell::new(0) };
    static STRUCTURAL_OPS: Cell<u64> = const { Cell::new(0) };
}

/// Running count of nodes constructed on this thread. Reconciliation tests
/// diff this across an update to assert zero allocation on pure reorders.
pub fn nodes_created() -> u64 {
    NODES_CREATED.with(|c| c.get())
}

/// Running count of structural mutations (insert/remove/replace) on this
/// thread. Moving a node counts once: the detach from the old position is
/// part of the insertion, as in a real DOM.
pub fn structural_ops() -> u64 {
    STRUCTURAL_OPS.with(|c| c.get())
}

fn note_structural_op() {
    STRUCTURAL_OPS.with(|c| c.set(c.get() + 1));
}

// =============================================================================
// NODE INNER
// =============================================================================

struct NodeInner {
    kind: NodeKind,

    /// Text content for Text/Comment nodes
    text: RefCell<String>,

    /// Attributes (insertion-ordered, Element only)
    attrs: RefCell<IndexMap<String, String>>,

    /// Prop bag: live values set as properties rather than attributes
    /// (value/checked/selected, custom-element props)
    props: RefCell<IndexMap<String, Value>>,

    /// Event listeners, one per event type
    listeners: RefCell<IndexMap<String, ListenerFn>>,

    /// Reconciliation key, if this node is a keyed list item root
    key: RefCell<Option<String>>,

    children: RefCell<Vec<Node>>,
    parent: RefCell<Option<Weak<NodeInner>>>,
}

// =============================================================================
// NODE HANDLE
// =============================================================================

/// A handle to a DOM node. Cloning the handle does not clone the node;
/// use [`Node::deep_clone`] for that. Identity is pointer identity.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        NODES_CREATED.with(|c| c.set(c.get() + 1));
        Self {
            inner: Rc::new(NodeInner {
                kind,
                text: RefCell::new(String::new()),
                attrs: RefCell::new(IndexMap::new()),
                props: RefCell::new(IndexMap::new()),
                listeners: RefCell::new(IndexMap::new()),
                key: RefCell::new(None),
                children: RefCell::new(Vec::new()),
                parent: RefCell::new(None),
            }),
        }
    }

    /// Create an element node.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(NodeKind::Element { tag: tag.into() })
    }

    /// Create a text node.
    pub fn text(content: impl Into<String>) -> Self {
        let node = Self::new(NodeKind::Text);
        *node.inner.text.borrow_mut() = content.into();
        node
    }

    /// Create a comment node.
    pub fn comment(content: impl Into<String>) -> Self {
        let node = Self::new(NodeKind::Comment);
        *node.inner.text.borrow_mut() = content.into();
        node
    }

    /// Create an empty fragment.
    pub fn fragment() -> Self {
        Self::new(NodeKind::Fragment)
    }

    // =========================================================================
    // Identity and kind
    // =========================================================================

    /// Pointer identity check.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable identity usable as a map key.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub fn kind(&self) -> NodeKind {
        self.inner.kind.clone()
    }

    pub fn is_element(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        self.inner.kind == NodeKind::Text
    }

    pub fn is_comment(&self) -> bool {
        self.inner.kind == NodeKind::Comment
    }

    pub fn is_fragment(&self) -> bool {
        self.inner.kind == NodeKind::Fragment
    }

    /// Element tag name, empty for non-elements.
    pub fn tag(&self) -> String {
        match &self.inner.kind {
            NodeKind::Element { tag } => tag.clone(),
            _ => String::new(),
        }
    }

    /// Custom elements are recognised by a hyphen in the tag name.
    pub fn is_custom_element(&self) -> bool {
        match &self.inner.kind {
            NodeKind::Element { tag } => tag.contains('-'),
            _ => false,
        }
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .parent
            .borrow()
            .as_ref()
            .and_then(|w| w.upgrade())
            .map(|inner| Node { inner })
    }

    pub fn children(&self) -> Vec<Node> {
        self.inner.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.inner.children.borrow().first().cloned()
    }

    /// The next sibling under this node's parent, if any.
    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let children = parent.inner.children.borrow();
        let idx = children.iter().position(|c| c.ptr_eq(self))?;
        children.get(idx + 1).cloned()
    }

    fn index_of(&self, child: &Node) -> Option<usize> {
        self.inner
            .children
            .borrow()
            .iter()
            .position(|c| c.ptr_eq(child))
    }

    /// Append a child at the end. Detaches the child from any previous parent.
    pub fn append_child(&self, child: &Node) {
        note_structural_op();
        child.detach();
        *child.inner.parent.borrow_mut() = Some(Rc::downgrade(&self.inner));
        self.inner.children.borrow_mut().push(child.clone());
    }

    /// Insert `new` before `reference`. With `reference` None this appends.
    /// A missing reference appends, matching browser tolerance.
    ///
    /// Inserting a node before itself is a no-op, as in the browser DOM
    /// (insertBefore(n, n) leaves n before its own next sibling). The
    /// reconciler's swap path relies on this: the reference must keep its
    /// position, not resolve after the detach.
    pub fn insert_before(&self, new: &Node, reference: Option<&Node>) {
        if reference.is_some_and(|r| r.ptr_eq(new)) {
            return;
        }
        note_structural_op();
        new.detach();
        *new.inner.parent.borrow_mut() = Some(Rc::downgrade(&self.inner));
        let idx = reference.and_then(|r| self.index_of(r));
        let mut children = self.inner.children.borrow_mut();
        match idx {
            Some(i) => children.insert(i, new.clone()),
            None => children.push(new.clone()),
        }
    }

    /// Remove a direct child. No-op when `child` is not a child of this node.
    pub fn remove_child(&self, child: &Node) {
        if self.remove_child_quiet(child) {
            note_structural_op();
        }
    }

    fn remove_child_quiet(&self, child: &Node) -> bool {
        let mut children = self.inner.children.borrow_mut();
        if let Some(idx) = children.iter().position(|c| c.ptr_eq(child)) {
            children.remove(idx);
            *child.inner.parent.borrow_mut() = None;
            true
        } else {
            false
        }
    }

    /// Replace `old` with `new` in place.
    pub fn replace_child(&self, new: &Node, old: &Node) {
        let idx = self.index_of(old);
        if let Some(i) = idx {
            note_structural_op();
            new.detach();
            *new.inner.parent.borrow_mut() = Some(Rc::downgrade(&self.inner));
            let removed = {
                let mut children = self.inner.children.borrow_mut();
                std::mem::replace(&mut children[i], new.clone())
            };
            *removed.inner.parent.borrow_mut() = None;
        }
    }

    // Detaching is half of a move, not an operation of its own.
    fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child_quiet(self);
        }
    }

    /// Recursively clone the node structure: kind, text, attributes, key,
    /// children. Listeners and props are per-instance state and are NOT
    /// cloned; the binder re-establishes them on each render.
    pub fn deep_clone(&self) -> Node {
        let clone = Node::new(self.inner.kind.clone());
        *clone.inner.text.borrow_mut() = self.inner.text.borrow().clone();
        *clone.inner.attrs.borrow_mut() = self.inner.attrs.borrow().clone();
        *clone.inner.key.borrow_mut() = self.inner.key.borrow().clone();
        for child in self.inner.children.borrow().iter() {
            clone.append_child(&child.deep_clone());
        }
        clone
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.attrs.borrow_mut().insert(name.into(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) {
        self.inner.attrs.borrow_mut().shift_remove(name);
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.inner.attrs.borrow().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attrs.borrow().contains_key(name)
    }

    pub fn attributes(&self) -> IndexMap<String, String> {
        self.inner.attrs.borrow().clone()
    }

    // =========================================================================
    // Props
    // =========================================================================

    pub fn set_prop(&self, name: impl Into<String>, value: Value) {
        self.inner.props.borrow_mut().insert(name.into(), value);
    }

    pub fn get_prop(&self, name: &str) -> Option<Value> {
        self.inner.props.borrow().get(name).cloned()
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Set a Text/Comment node's content.
    pub fn set_text(&self, content: impl Into<String>) {
        *self.inner.text.borrow_mut() = content.into();
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self.inner.kind {
            NodeKind::Text => self.inner.text.borrow().clone(),
            NodeKind::Comment => String::new(),
            _ => {
                let mut out = String::new();
                for child in self.inner.children.borrow().iter() {
                    out.push_str(&child.text_content());
                }
                out
            }
        }
    }

    /// Raw text for Text/Comment nodes.
    pub fn raw_text(&self) -> String {
        self.inner.text.borrow().clone()
    }

    // =========================================================================
    // Keys
    // =========================================================================

    pub fn set_key(&self, key: impl Into<String>) {
        *self.inner.key.borrow_mut() = Some(key.into());
    }

    pub fn key(&self) -> Option<String> {
        self.inner.key.borrow().clone()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener for an event type, replacing any existing one.
    pub fn add_listener(&self, event_type: impl Into<String>, listener: ListenerFn) {
        self.inner
            .listeners
            .borrow_mut()
            .insert(event_type.into(), listener);
    }

    pub fn remove_listener(&self, event_type: &str) {
        self.inner.listeners.borrow_mut().shift_remove(event_type);
    }

    pub fn has_listener(&self, event_type: &str) -> bool {
        self.inner.listeners.borrow().contains_key(event_type)
    }

    /// Dispatch an event to this node's listener for its type, if any.
    pub fn emit(&self, event: &Event) {
        let listener = self.inner.listeners.borrow().get(&event.event_type).cloned();
        if let Some(listener) = listener {
            listener(event);
        }
    }

    /// Convenience: emit an event of `event_type` with no payload.
    pub fn emit_simple(&self, event_type: &str) {
        self.emit(&Event::new(event_type, self.clone()));
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Depth-first search for an element with the given `id` attribute.
    pub fn find_by_id(&self, id: &str) -> Option<Node> {
        if self.is_element() && self.get_attribute("id").as_deref() == Some(id) {
            return Some(self.clone());
        }
        for child in self.inner.children.borrow().iter() {
            if let Some(found) = child.find_by_id(id) {
                return Some(found);
            }
        }
        None
    }

    /// Depth-first search for the first element with the given tag name.
    pub fn find_by_tag(&self, tag: &str) -> Option<Node> {
        if let NodeKind::Element { tag: t } = &self.inner.kind {
            if t == tag {
                return Some(self.clone());
            }
        }
        for child in self.inner.children.borrow().iter() {
            if let Some(found) = child.find_by_tag(tag) {
                return Some(found);
            }
        }
        None
    }

    // =========================================================================
    // Serialisation
    // =========================================================================

    /// Serialise the subtree to an HTML string. Fragments serialise as
    /// their children concatenated.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match &self.inner.kind {
            NodeKind::Text => out.push_str(&escape_text(&self.inner.text.borrow())),
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&self.inner.text.borrow());
                out.push_str("-->");
            }
            NodeKind::Fragment => {
                for child in self.inner.children.borrow().iter() {
                    child.write_html(out);
                }
            }
            NodeKind::Element { tag } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in self.inner.attrs.borrow().iter() {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_attr(value));
                        out.push('"');
                    }
                }
                if is_void_element(tag) {
                    out.push_str(">");
                    return;
                }
                out.push('>');
                for child in self.inner.children.borrow().iter() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            NodeKind::Element { tag } => write!(f, "<{}> ({} children)", tag, self.child_count()),
            NodeKind::Text => write!(f, "#text {:?}", self.inner.text.borrow()),
            NodeKind::Comment => write!(f, "<!--{}-->", self.inner.text.borrow()),
            NodeKind::Fragment => write!(f, "#fragment ({} children)", self.child_count()),
        }
    }
}

/// Elements with no closing tag.
pub fn is_void_element(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "track"
            | "wbr"
    )
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn tree_operations() {
        let parent = Node::element("ul");
        let a = Node::element("li");
        let b = Node::element("li");
        let c = Node::element("li");

        parent.append_child(&a);
        parent.append_child(&c);
        parent.insert_before(&b, Some(&c));

        let children = parent.children();
        assert_eq!(children.len(), 3);
        assert!(children[0].ptr_eq(&a));
        assert!(children[1].ptr_eq(&b));
        assert!(children[2].ptr_eq(&c));

        assert!(a.next_sibling().unwrap().ptr_eq(&b));
        assert!(c.next_sibling().is_none());

        parent.remove_child(&b);
        assert_eq!(parent.child_count(), 2);
        assert!(b.parent().is_none());

        let d = Node::element("li");
        parent.replace_child(&d, &a);
        assert!(parent.children()[0].ptr_eq(&d));
        assert!(a.parent().is_none());
    }

    #[test]
    fn insert_before_itself_is_a_no_op() {
        let parent = Node::element("ul");
        let a = Node::element("li");
        let b = Node::element("li");
        let c = Node::element("li");
        parent.append_child(&a);
        parent.append_child(&b);
        parent.append_child(&c);

        let ops = structural_ops();
        parent.insert_before(&b, Some(&b));

        // Nothing moved, nothing counted
        assert_eq!(structural_ops(), ops);
        let children = parent.children();
        assert!(children[0].ptr_eq(&a));
        assert!(children[1].ptr_eq(&b));
        assert!(children[2].ptr_eq(&c));
    }

    #[test]
    fn move_within_a_parent_is_one_structural_op() {
        let parent = Node::element("ul");
        let a = Node::element("li");
        let b = Node::element("li");
        parent.append_child(&a);
        parent.append_child(&b);

        let ops = structural_ops();
        parent.insert_before(&b, Some(&a));

        assert_eq!(structural_ops() - ops, 1);
        assert!(parent.children()[0].ptr_eq(&b));
        assert!(parent.children()[1].ptr_eq(&a));
    }

    #[test]
    fn insert_moves_node_between_parents() {
        let p1 = Node::element("div");
        let p2 = Node::element("div");
        let child = Node::text("x");

        p1.append_child(&child);
        assert_eq!(p1.child_count(), 1);

        p2.append_child(&child);
        assert_eq!(p1.child_count(), 0, "child should leave the old parent");
        assert_eq!(p2.child_count(), 1);
        assert!(child.parent().unwrap().ptr_eq(&p2));
    }

    #[test]
    fn deep_clone_copies_structure_not_identity() {
        let div = Node::element("div");
        div.set_attribute("class", "card");
        let span = Node::element("span");
        span.append_child(&Node::text("hello"));
        div.append_child(&span);

        let clone = div.deep_clone();
        assert!(!clone.ptr_eq(&div));
        assert_eq!(clone.get_attribute("class").as_deref(), Some("card"));
        assert_eq!(clone.text_content(), "hello");
        assert!(!clone.children()[0].ptr_eq(&span));
    }

    #[test]
    fn deep_clone_does_not_copy_listeners() {
        let button = Node::element("button");
        button.add_listener("click", Rc::new(|_| {}));

        let clone = button.deep_clone();
        assert!(button.has_listener("click"));
        assert!(!clone.has_listener("click"));
    }

    #[test]
    fn listener_replacement_is_idempotent() {
        let count = Rc::new(Cell::new(0));
        let button = Node::element("button");

        for _ in 0..3 {
            let count = count.clone();
            button.add_listener(
                "click",
                Rc::new(move |_| {
                    count.set(count.get() + 1);
                }),
            );
        }

        button.emit_simple("click");
        assert_eq!(count.get(), 1, "only one listener per event type");
    }

    #[test]
    fn find_by_id_searches_subtree() {
        let root = Node::element("div");
        let inner = Node::element("section");
        let target = Node::element("p");
        target.set_attribute("id", "message");
        inner.append_child(&target);
        root.append_child(&inner);

        assert!(root.find_by_id("message").unwrap().ptr_eq(&target));
        assert!(root.find_by_id("missing").is_none());
    }

    #[test]
    fn custom_element_detection() {
        assert!(Node::element("my-widget").is_custom_element());
        assert!(!Node::element("div").is_custom_element());
        assert!(!Node::text("a-b").is_custom_element());
    }

    #[test]
    fn to_html_round_trip() {
        let div = Node::element("div");
        div.set_attribute("class", "greeting");
        div.append_child(&Node::text("hi & bye"));
        div.append_child(&Node::comment("anchor"));
        let img = Node::element("img");
        img.set_attribute("src", "x.png");
        div.append_child(&img);

        assert_eq!(
            div.to_html(),
            "<div class=\"greeting\">hi &amp; bye<!--anchor--><img src=\"x.png\"></div>"
        );
    }

    #[test]
    fn fragment_serialises_children_only() {
        let frag = Node::fragment();
        frag.append_child(&Node::element("p"));
        frag.append_child(&Node::text("tail"));
        assert_eq!(frag.to_html(), "<p></p>tail");
    }
}
