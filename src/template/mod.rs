// ============================================================================
// cinder - Template Module
// Tagged-template compilation: values, parser, compile cache
// ============================================================================

pub mod compile;
pub mod parser;
pub mod value;

pub use compile::{compile, html, CompiledTemplate, SlotShape, Template, MARKER};
pub use value::Value;
