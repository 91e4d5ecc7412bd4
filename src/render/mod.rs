// ============================================================================
// cinder - Render Module
// Binder and keyed list reconciler
// ============================================================================

pub mod bind;
pub mod reconcile;

pub use bind::{mount, mount_by_id, render, TemplateInstance};
pub use reconcile::{reconcile, ListEntry};
