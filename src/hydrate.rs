// ============================================================================
// cinder - SSR Hydration State
// ============================================================================
//
// Server-rendered documents carry their reactive slot values in a JSON
// payload inside a `<script type="application/json">` element. Slots are
// numbered in bind order and keyed `s0`, `s1`, ... so the client can seed
// its signals with the values the server rendered, avoiding a flash of
// recomputed content.
// ============================================================================

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dom::node::Node;
use crate::error::{Result, RuntimeError};
use crate::template::value::Value;

/// MIME type of the embedded state script.
pub const STATE_SCRIPT_TYPE: &str = "application/json";

/// The serialized slot values of a server render, keyed `s0`, `s1`, ...
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct HydrationState {
    slots: IndexMap<String, serde_json::Value>,
}

impl HydrationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record a slot value under its bind-order index.
    pub fn set_slot(&mut self, index: usize, value: serde_json::Value) {
        self.slots.insert(format!("s{}", index), value);
    }

    /// The raw JSON value for a slot index, if the server recorded one.
    pub fn get_slot(&self, index: usize) -> Option<&serde_json::Value> {
        self.slots.get(&format!("s{}", index))
    }

    /// The slot value converted to a template [`Value`], if present and
    /// representable (objects other than null/bool/number/string/array are
    /// not template scalars).
    pub fn slot_value(&self, index: usize) -> Option<Value> {
        self.get_slot(index).and_then(json_to_value)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.slots)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the script element a server render embeds in its document.
    pub fn script_node(&self) -> Result<Node> {
        let script = Node::element("script");
        script.set_attribute("type", STATE_SCRIPT_TYPE);
        script.append_child(&Node::text(self.to_json()?));
        Ok(script)
    }

    /// Recover the state from a rendered document by locating the state
    /// script element and parsing its JSON body.
    pub fn from_document(root: &Node) -> Result<Self> {
        let script = find_state_script(root).ok_or(RuntimeError::HydrationStateMissing)?;
        Self::from_json(&script.text_content())
    }
}

fn find_state_script(node: &Node) -> Option<Node> {
    if node.is_element()
        && node.tag() == "script"
        && node.get_attribute("type").as_deref() == Some(STATE_SCRIPT_TYPE)
    {
        return Some(node.clone());
    }
    for child in node.children() {
        if let Some(found) = find_state_script(&child) {
            return Some(found);
        }
    }
    None
}

fn json_to_value(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::Null => Some(Value::Null),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        serde_json::Value::String(s) => Some(Value::Text(s.clone())),
        serde_json::Value::Array(items) => {
            let values: Option<Vec<Value>> = items.iter().map(json_to_value).collect();
            values.map(Value::List)
        }
        serde_json::Value::Object(_) => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================
