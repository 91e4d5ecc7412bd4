// ============================================================================
// cinder - Primitives Module
// Core reactive primitives: signal, computed, effect, scope
// ============================================================================

pub mod computed;
pub mod effect;
pub mod scope;
pub mod signal;

// Re-export for convenience
pub use computed::{computed, computed_with_equals, Computed, ComputedInner};
pub use effect::{
    destroy_effect, detached, effect, effect_root, effect_tracking, effect_with_cleanup,
    update_effect, CleanupFn, DisposeFn, Effect, EffectFn, EffectInner,
};
pub use scope::{
    effect_scope, get_current_scope, on_scope_dispose, register_effect_with_scope, EffectScope,
    ScopeCleanupFn,
};
pub use signal::{
    mutable_source, signal, signal_f32, signal_f64, signal_with_equals, Signal,
};
