// ============================================================================
// cinder - DOM Module
// Retained node tree + event dispatch
// ============================================================================

pub mod event;
pub mod node;

pub use event::{Event, ListenerFn};
pub use node::{is_void_element, Node, NodeKind};
