// ============================================================================
// cinder - A Fine-Grained Reactive UI Runtime for Rust
// ============================================================================
//
// Signals, effects and computed values drive a tagged-template renderer:
// templates compile once per call site, render into a retained node tree,
// and keyed lists reconcile with minimal node moves. Reactivity is
// fine-grained - a changed signal re-runs exactly the slot effects that
// read it, never a component tree.
// ============================================================================

pub mod core;
pub mod dom;
pub mod error;
pub mod hydrate;
pub mod macros;
pub mod primitives;
pub mod reactivity;
pub mod render;
pub mod template;

// Re-export core items at crate root for ergonomic access
pub use crate::core::constants;
pub use crate::core::context::{
    flush_mode, is_batching, is_tracking, is_untracking, read_version, set_flush_mode,
    with_context, write_version, FlushMode, ReactiveContext,
};
pub use crate::core::types::{default_equals, AnyReaction, AnySource, EqualsFn, SourceInner};

// Re-export primitives at crate root
pub use primitives::computed::{computed, computed_with_equals, Computed, ComputedInner};
pub use primitives::effect::{
    detached, effect, effect_root, effect_tracking, effect_with_cleanup, CleanupFn, DisposeFn,
    Effect, EffectFn, EffectInner,
};
pub use primitives::scope::{
    effect_scope, get_current_scope, on_scope_dispose, EffectScope, ScopeCleanupFn,
};
pub use primitives::signal::{
    mutable_source, signal, signal_f32, signal_f64, signal_with_equals, Signal,
};

// Re-export reactivity functions
pub use reactivity::batching::{batch, peek, tick, untrack};
pub use reactivity::equality::{
    always_equals, by_field, equals, never_equals, safe_equals_f32, safe_equals_f64,
    safe_equals_option_f64, safe_not_equal_f32, safe_not_equal_f64, shallow_equals_slice,
    shallow_equals_vec,
};
pub use reactivity::scheduling::flush_sync;
pub use reactivity::tracking::{
    is_dirty, mark_reactions, notify_write, remove_reactions, set_signal_status, track_read,
};

// Re-export the DOM and template surface
pub use dom::event::{Event, ListenerFn};
pub use dom::node::{Node, NodeKind};
pub use error::{Result, RuntimeError};
pub use hydrate::HydrationState;
pub use render::bind::{mount, mount_by_id, render, TemplateInstance};
pub use render::reconcile::{reconcile, ListEntry};
pub use template::compile::{compile, html, CompiledTemplate, Template};
pub use template::value::Value;

// =============================================================================
// TESTS
// =============================================================================
