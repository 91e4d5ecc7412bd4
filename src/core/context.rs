// ============================================================================
// cinder - Reactive Context
// Thread-local state for tracking the current reaction context
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::types::{AnyReaction, AnySource};

// =============================================================================
// FLUSH MODE
// =============================================================================

/// Controls when pending effects run after a write.
///
/// `Immediate` flushes synchronously as soon as the outermost write (or batch)
/// completes. `Deferred` only enqueues; the host loop drains the queue with
/// `tick()` or `flush_sync()`, modelling a microtask boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    #[default]
    Immediate,
    Deferred,
}

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local reactive context holding all global state for reactivity.
///
/// The runtime context is an explicit object rather than scattered globals;
/// everything the graph needs (active reaction, versions, the pending queue)
/// lives here behind `with_context`.
pub struct ReactiveContext {
    // =========================================================================
    // REACTION TRACKING
    // =========================================================================
    /// Currently executing reaction (effect or computed)
    pub active_reaction: RefCell<Option<Weak<dyn AnyReaction>>>,

    /// Currently executing effect (for effect tree management)
    pub active_effect: RefCell<Option<Weak<dyn AnyReaction>>>,

    /// Whether we're currently untracking (reading without creating dependencies)
    pub untracking: Cell<bool>,

    // =========================================================================
    // VERSION COUNTERS
    // =========================================================================
    /// Global write version - incremented on every signal write
    pub write_version: Cell<u32>,

    /// Global read version - incremented on every reaction run
    pub read_version: Cell<u32>,

    // =========================================================================
    // DEPENDENCY TRACKING (during reaction execution)
    // =========================================================================
    /// New dependencies collected during current reaction execution
    pub new_deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Number of existing dependencies that matched (optimization)
    pub skipped_deps: Cell<usize>,

    // =========================================================================
    // SCHEDULING
    // =========================================================================
    /// Current batch depth (for nested batches)
    pub batch_depth: Cell<u32>,

    /// Pending effects, insertion-ordered and deduplicated by reaction
    /// identity (keyed by the Rc data pointer)
    pub pending_effects: RefCell<IndexMap<usize, Weak<dyn AnyReaction>>>,

    /// Whether we're currently inside a flush cycle
    pub is_flushing: Cell<bool>,

    /// When effects run relative to writes
    pub flush_mode: Cell<FlushMode>,
}

impl ReactiveContext {
    /// Create a new reactive context with default values
    pub fn new() -> Self {
        Self {
            active_reaction: RefCell::new(None),
            active_effect: RefCell::new(None),
            untracking: Cell::new(false),
            write_version: Cell::new(1),
            read_version: Cell::new(0),
            new_deps: RefCell::new(Vec::new()),
            skipped_deps: Cell::new(0),
            batch_depth: Cell::new(0),
            pending_effects: RefCell::new(IndexMap::new()),
            is_flushing: Cell::new(false),
            flush_mode: Cell::new(FlushMode::Immediate),
        }
    }

    // =========================================================================
    // REACTION TRACKING
    // =========================================================================

    /// Set the active reaction, returning the previous one
    pub fn set_active_reaction(
        &self,
        reaction: Option<Weak<dyn AnyReaction>>,
    ) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.replace(reaction)
    }

    /// Get the active reaction
    pub fn get_active_reaction(&self) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.borrow().clone()
    }

    /// Check if there's an active reaction
    pub fn has_active_reaction(&self) -> bool {
        self.active_reaction.borrow().is_some()
    }

    /// Set the active effect, returning the previous one
    pub fn set_active_effect(
        &self,
        effect: Option<Weak<dyn AnyReaction>>,
    ) -> Option<Weak<dyn AnyReaction>> {
        self.active_effect.replace(effect)
    }

    /// Get the active effect
    pub fn get_active_effect(&self) -> Option<Weak<dyn AnyReaction>> {
        self.active_effect.borrow().clone()
    }

    /// Set untracking mode, returning previous value
    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    /// Check if currently untracking
    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    // =========================================================================
    // VERSION COUNTERS
    // =========================================================================

    /// Increment and return the write version
    pub fn increment_write_version(&self) -> u32 {
        let v = self.write_version.get() + 1;
        self.write_version.set(v);
        v
    }

    /// Get the current write version
    pub fn get_write_version(&self) -> u32 {
        self.write_version.get()
    }

    /// Increment and return the read version
    pub fn increment_read_version(&self) -> u32 {
        let v = self.read_version.get() + 1;
        self.read_version.set(v);
        v
    }

    /// Get the current read version
    pub fn get_read_version(&self) -> u32 {
        self.read_version.get()
    }

    // =========================================================================
    // DEPENDENCY TRACKING
    // =========================================================================

    /// Swap out the new_deps list, returning the old one
    pub fn swap_new_deps(&self, deps: Vec<Rc<dyn AnySource>>) -> Vec<Rc<dyn AnySource>> {
        self.new_deps.replace(deps)
    }

    /// Add a dependency to the new_deps list
    pub fn add_new_dep(&self, source: Rc<dyn AnySource>) {
        self.new_deps.borrow_mut().push(source);
    }

    /// Get the number of new deps collected
    pub fn new_dep_count(&self) -> usize {
        self.new_deps.borrow().len()
    }

    /// Set skipped_deps count, returning previous
    pub fn set_skipped_deps(&self, count: usize) -> usize {
        self.skipped_deps.replace(count)
    }

    /// Get skipped_deps count
    pub fn get_skipped_deps(&self) -> usize {
        self.skipped_deps.get()
    }

    /// Increment skipped_deps
    pub fn increment_skipped_deps(&self) {
        self.skipped_deps.set(self.skipped_deps.get() + 1);
    }

    // =========================================================================
    // SCHEDULING
    // =========================================================================

    /// Increment batch depth, returns new depth
    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    /// Decrement batch depth, returns new depth
    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    /// Get current batch depth
    pub fn get_batch_depth(&self) -> u32 {
        self.batch_depth.get()
    }

    /// Check if currently in a batch
    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    /// Enqueue a pending effect. First-enqueued order wins: re-enqueueing an
    /// already-pending effect keeps its original queue position.
    pub fn enqueue_effect(&self, key: usize, effect: Weak<dyn AnyReaction>) {
        self.pending_effects
            .borrow_mut()
            .entry(key)
            .or_insert(effect);
    }

    /// Take all pending effects in insertion order, clearing the queue
    pub fn take_pending_effects(&self) -> Vec<Weak<dyn AnyReaction>> {
        let mut queue = self.pending_effects.borrow_mut();
        queue.drain(..).map(|(_, w)| w).collect()
    }

    /// Number of effects currently pending
    pub fn pending_count(&self) -> usize {
        self.pending_effects.borrow().len()
    }

    /// Set flushing state, returning previous
    pub fn set_flushing(&self, value: bool) -> bool {
        self.is_flushing.replace(value)
    }

    /// Check if currently inside a flush cycle
    pub fn is_flushing(&self) -> bool {
        self.is_flushing.get()
    }

    /// Set the flush mode, returning the previous one
    pub fn set_flush_mode(&self, mode: FlushMode) -> FlushMode {
        self.flush_mode.replace(mode)
    }

    /// Get the current flush mode
    pub fn get_flush_mode(&self) -> FlushMode {
        self.flush_mode.get()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local reactive context
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
///
/// # Example
///
/// ```ignore
/// with_context(|ctx| {
///     ctx.increment_write_version();
/// });
/// ```
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================
//
// These provide direct access to common operations without needing
// to go through with_context for every call.
// =============================================================================

/// Check if currently tracking dependencies (inside a reaction, not untracking)
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction() && !ctx.is_untracking())
}

/// Check if currently untracking
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

/// Check if currently in a batch
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

/// Get the current write version
pub fn write_version() -> u32 {
    with_context(|ctx| ctx.get_write_version())
}

/// Get the current read version
pub fn read_version() -> u32 {
    with_context(|ctx| ctx.get_read_version())
}

/// Set the global flush mode, returning the previous one
pub fn set_flush_mode(mode: FlushMode) -> FlushMode {
    with_context(|ctx| ctx.set_flush_mode(mode))
}

/// Get the current flush mode
pub fn flush_mode() -> FlushMode {
    with_context(|ctx| ctx.get_flush_mode())
}

// =============================================================================
// TESTS
// =============================================================================
