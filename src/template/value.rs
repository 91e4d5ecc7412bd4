// ============================================================================
// cinder - Interpolated Values
// ============================================================================
//
// Every interpolation is converted to a tagged Value exactly once, at the
// html! call site. The binder dispatches on the tag at bind time instead of
// re-inspecting shapes on every update: a slot is either static (scalar,
// template, list) or reactive (Getter), decided when it is bound.
// ============================================================================

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dom::event::Event;
use crate::dom::node::Node;
use crate::reactivity::equality::safe_equals_f64;
use crate::template::compile::Template;

/// A value interpolated into a template slot.
#[derive(Clone)]
pub enum Value {
    /// Absent value; removes attributes, renders as empty text.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A nested template, rendered recursively.
    Tpl(Template),
    /// A list of items, routed to the keyed reconciler.
    List(Vec<Value>),
    /// A reactive slot: re-evaluated inside an effect, re-rendering the slot
    /// whenever a dependency changes.
    Getter(Rc<dyn Fn() -> Value>),
    /// An event handler for `on*` attribute slots.
    Handler(Rc<dyn Fn(&Event)>),
    /// A `ref` callback invoked with the bound node.
    NodeRef(Rc<dyn Fn(&Node)>),
    /// A style object merged onto the node's style attribute.
    Style(IndexMap<String, String>),
}

impl Value {
    /// Wrap a closure as a reactive getter slot.
    pub fn getter<F>(f: F) -> Value
    where
        F: Fn() -> Value + 'static,
    {
        Value::Getter(Rc::new(f))
    }

    /// Wrap a closure as an event handler slot.
    pub fn handler<F>(f: F) -> Value
    where
        F: Fn(&Event) + 'static,
    {
        Value::Handler(Rc::new(f))
    }

    /// Wrap a closure as a `ref` callback slot.
    pub fn node_ref<F>(f: F) -> Value
    where
        F: Fn(&Node) + 'static,
    {
        Value::NodeRef(Rc::new(f))
    }

    /// Build a style object from `(property, value)` pairs.
    pub fn style<I, K, V>(pairs: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Value::Style(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Whether this slot needs an effect.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Value::Getter(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_)
        )
    }

    /// Display form used for text nodes and attribute strings.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Text(s) => s.clone(),
            Value::Tpl(_) => String::from("[template]"),
            Value::List(_) => String::from("[list]"),
            Value::Getter(_) => String::from("[getter]"),
            Value::Handler(_) => String::from("[handler]"),
            Value::NodeRef(_) => String::from("[ref]"),
            Value::Style(map) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Attribute truthiness: `Null` and `false` remove the attribute,
    /// `true` sets it with an empty value, anything else sets its string form.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }
}

/// Floats print like integers when fractionless, matching JS display rules.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

// =============================================================================
// Equality - same-value-zero on floats, pointer identity on callables
// =============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => safe_equals_f64(a, b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Tpl(a), Value::Tpl(b)) => {
                a.statics_id() == b.statics_id() && a.values() == b.values()
            }
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Getter(a), Value::Getter(b)) => Rc::ptr_eq(a, b),
            (Value::Handler(a), Value::Handler(b)) => Rc::ptr_eq(a, b),
            (Value::NodeRef(a), Value::NodeRef(b)) => Rc::ptr_eq(a, b),
            (Value::Style(a), Value::Style(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Tpl(_) => write!(f, "Tpl(..)"),
            Value::List(items) => write!(f, "List({} items)", items.len()),
            Value::Getter(_) => write!(f, "Getter(..)"),
            Value::Handler(_) => write!(f, "Handler(..)"),
            Value::NodeRef(_) => write!(f, "NodeRef(..)"),
            Value::Style(map) => write!(f, "Style({} props)", map.len()),
        }
    }
}

// =============================================================================
// From conversions for html! interpolations
// =============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Template> for Value {
    fn from(v: Template) -> Self {
        Value::Tpl(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Vec<Template>> for Value {
    fn from(v: Vec<Template>) -> Self {
        Value::List(v.into_iter().map(Value::Tpl).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
