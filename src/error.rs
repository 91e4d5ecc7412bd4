// ============================================================================
// cinder - Error Taxonomy
// ============================================================================
//
// Renderer and hydration errors surface as RuntimeError. Reactive-core
// invariant breaches (writes inside computeds, runaway flush loops) stay
// panics: they are programmer errors with no sensible recovery.
// ============================================================================

use thiserror::Error;

/// Errors surfaced by the template compiler, renderer, and hydration layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The joined template statics did not parse as well-formed markup.
    #[error("template parse error: {0}")]
    Parse(String),

    /// The number of interpolated values does not match the template's
    /// marker count.
    #[error("template expects {expected} interpolated values but {supplied} were supplied")]
    SlotCountMismatch { expected: usize, supplied: usize },

    /// A mount target lookup failed. Names the missing id.
    #[error("mount target not found: no element with id `{0}`")]
    TargetNotFound(String),

    /// A keyed list item template rendered something other than exactly one
    /// root node.
    #[error("keyed list items must render exactly one root node, got {0}")]
    ListItemShape(usize),

    /// The hydration state payload was not valid JSON.
    #[error("invalid hydration state: {0}")]
    HydrationJson(#[from] serde_json::Error),

    /// No hydration state script was found under the given root.
    #[error("hydration state script not found in document")]
    HydrationStateMissing,
}

/// Convenience alias used across the renderer.
pub type Result<T> = std::result::Result<T, RuntimeError>;
