// ============================================================================
// cinder - DOM Events
// ============================================================================

use std::rc::Rc;

use crate::dom::node::Node;

/// An event dispatched to listeners registered on a node.
#[derive(Clone)]
pub struct Event {
    /// The event type, e.g. `"click"` or `"input"`.
    pub event_type: String,

    /// The node the event was emitted on.
    pub target: Node,

    /// Optional structured payload, e.g. an input's new value.
    pub detail: Option<serde_json::Value>,
}

impl Event {
    /// Create an event with no payload.
    pub fn new(event_type: impl Into<String>, target: Node) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            detail: None,
        }
    }

    /// Create an event carrying a payload.
    pub fn with_detail(
        event_type: impl Into<String>,
        target: Node,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            detail: Some(detail),
        }
    }
}

/// Listener callback type. One listener per event type per node; registering
/// a second listener for the same type replaces the first.
pub type ListenerFn = Rc<dyn Fn(&Event)>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::Node;

    #[test]
    fn event_carries_type_and_detail() {
        let node = Node::element("button");
        let event = Event::with_detail("click", node.clone(), serde_json::json!({"x": 3}));
        assert_eq!(event.event_type, "click");
        assert!(event.target.ptr_eq(&node));
        assert_eq!(event.detail.unwrap()["x"], 3);
    }
}
