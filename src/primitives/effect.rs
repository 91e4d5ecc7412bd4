// ============================================================================
// cinder - Effect System
// Side effects that re-run when dependencies change
// ============================================================================
//
// Effects are reactions that run side effects when their dependencies change.
// Unlike computeds, effects don't produce values - they just run code.
//
// Key features:
// - Automatic dependency tracking with per-run re-tracking
// - Cleanup/teardown functions
// - Effect tree (parent/child relationships)
// - Panic-safe restoration of the tracking context
// - RAII disposal
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource};
use crate::primitives::scope::register_effect_with_scope;
use crate::reactivity::scheduling::maybe_flush;
use crate::reactivity::tracking::{remove_reactions, set_signal_status};

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Cleanup function returned by effects, runs before next execution
pub type CleanupFn = Box<dyn FnOnce()>;

/// Effect function signature - returns optional cleanup
pub type EffectFn = Box<dyn FnMut() -> Option<CleanupFn>>;

/// Dispose function returned when creating effects
pub type DisposeFn = Box<dyn FnOnce()>;

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The inner effect implementation.
///
/// Implements AnyReaction (but NOT AnySource - effects are reactions only).
/// Holds the effect function, dependencies, teardown, and effect tree structure.
pub struct EffectInner {
    /// Flags bitmask for state tracking
    flags: Cell<u32>,

    /// Write version - when this effect last ran
    write_version: Cell<u32>,

    /// The effect function
    func: RefCell<Option<EffectFn>>,

    /// Dependencies (sources/computeds this effect reads)
    deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Teardown/cleanup function from last run
    teardown: RefCell<Option<CleanupFn>>,

    // =========================================================================
    // Effect tree (parent/children/siblings)
    // =========================================================================
    /// Parent effect in the effect tree
    parent: RefCell<Option<Weak<EffectInner>>>,

    /// First child effect
    first_child: RefCell<Option<Rc<EffectInner>>>,

    /// Last child effect (Weak to avoid cycles)
    last_child: RefCell<Option<Weak<EffectInner>>>,

    /// Previous sibling (Weak to avoid cycles)
    prev_sibling: RefCell<Option<Weak<EffectInner>>>,

    /// Next sibling
    next_sibling: RefCell<Option<Rc<EffectInner>>>,

    /// Weak reference to self (set after Rc creation) for trait object conversion
    self_weak: RefCell<Weak<EffectInner>>,
}

impl EffectInner {
    /// Create a new effect inner
    pub fn new(effect_type: u32, func: Option<EffectFn>) -> Rc<Self> {
        let effect = Rc::new(Self {
            flags: Cell::new(effect_type | DIRTY),
            write_version: Cell::new(0),
            func: RefCell::new(func),
            deps: RefCell::new(Vec::new()),
            teardown: RefCell::new(None),
            parent: RefCell::new(None),
            first_child: RefCell::new(None),
            last_child: RefCell::new(None),
            prev_sibling: RefCell::new(None),
            next_sibling: RefCell::new(None),
            self_weak: RefCell::new(Weak::new()),
        });

        // Store weak self-reference
        *effect.self_weak.borrow_mut() = Rc::downgrade(&effect);

        effect
    }

    /// Get this effect as a weak reference to AnyReaction
    pub fn as_weak_reaction(&self) -> Weak<dyn AnyReaction> {
        if let Some(rc) = self.self_weak.borrow().upgrade() {
            Rc::downgrade(&(rc as Rc<dyn AnyReaction>))
        } else {
            Weak::<EffectInner>::new() as Weak<dyn AnyReaction>
        }
    }

    /// Get parent effect
    pub fn parent(&self) -> Option<Rc<EffectInner>> {
        self.parent.borrow().as_ref().and_then(|w| w.upgrade())
    }

    /// Set parent effect
    pub fn set_parent(&self, parent: Option<Weak<EffectInner>>) {
        *self.parent.borrow_mut() = parent;
    }

    /// Get first child effect
    pub fn first_child(&self) -> Option<Rc<EffectInner>> {
        self.first_child.borrow().clone()
    }

    /// Get last child effect
    pub fn last_child(&self) -> Option<Rc<EffectInner>> {
        self.last_child.borrow().as_ref().and_then(|w| w.upgrade())
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        // Run teardown if present
        if let Some(cleanup) = self.teardown.borrow_mut().take() {
            cleanup();
        }
    }
}

// =============================================================================
// AnyReaction IMPLEMENTATION
// =============================================================================

impl AnyReaction for EffectInner {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn add_dep(&self, source: Rc<dyn AnySource>) {
        self.deps.borrow_mut().push(source);
    }

    fn clear_deps(&self) {
        self.deps.borrow_mut().clear();
    }

    fn remove_deps_from(&self, start: usize) {
        self.deps.borrow_mut().truncate(start);
    }

    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<dyn AnySource>) -> bool) {
        for dep in self.deps.borrow().iter() {
            if !f(dep) {
                break;
            }
        }
    }

    fn remove_source(&self, source: &Rc<dyn AnySource>) {
        let source_ptr = Rc::as_ptr(source) as *const ();
        self.deps.borrow_mut().retain(|dep| {
            let dep_ptr = Rc::as_ptr(dep) as *const ();
            dep_ptr != source_ptr
        });
    }

    fn update(&self) -> bool {
        // Effects don't have a "value changed" concept; update() runs the
        // effect function and always returns false.

        // Skip if destroyed
        if (self.flags.get() & DESTROYED) != 0 {
            return false;
        }

        // Get Rc<Self> from the stored weak reference
        if let Some(rc_self) = self.self_weak.borrow().upgrade() {
            update_effect(&rc_self);
        }

        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
        // Effects are NOT sources - they don't have dependents
        None
    }
}

// =============================================================================
// EFFECT WRAPPER
// =============================================================================

/// Public effect wrapper providing the user API.
///
/// Holds an Rc<EffectInner> and provides methods for disposal.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect from an EffectInner
    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    /// Get access to the inner effect
    pub fn inner(&self) -> &Rc<EffectInner> {
        &self.inner
    }

    /// Check if this effect is destroyed
    pub fn is_destroyed(&self) -> bool {
        (self.inner.flags.get() & DESTROYED) != 0
    }

    /// Dispose/destroy this effect
    pub fn dispose(&self) {
        destroy_effect(self.inner.clone(), true);
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        // Auto-destroy if this is the last strong reference to the inner effect.
        // If it has a parent, the parent holds it strongly, so strong_count > 1.
        // If it's a root effect, strong_count == 1 (this handle).
        if Rc::strong_count(&self.inner) == 1 {
            self.dispose();
        }
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

// =============================================================================
// PUSH EFFECT - Add to parent's child list
// =============================================================================

/// Add an effect to its parent's child list
pub(crate) fn push_effect(effect: &Rc<EffectInner>, parent: &Rc<EffectInner>) {
    let parent_last = parent.last_child();

    match parent_last {
        None => {
            // First child
            *parent.first_child.borrow_mut() = Some(effect.clone());
            *parent.last_child.borrow_mut() = Some(Rc::downgrade(effect));
        }
        Some(last) => {
            // Append to end
            *last.next_sibling.borrow_mut() = Some(effect.clone());
            *effect.prev_sibling.borrow_mut() = Some(Rc::downgrade(&last));
            *parent.last_child.borrow_mut() = Some(Rc::downgrade(effect));
        }
    }
}

// =============================================================================
// UNLINK EFFECT - Remove from parent's child list
// =============================================================================

/// Remove an effect from its parent's child list
fn unlink_effect(effect: &Rc<EffectInner>) {
    let prev = effect
        .prev_sibling
        .borrow()
        .as_ref()
        .and_then(|w| w.upgrade());
    let next = effect.next_sibling.borrow().clone();

    // Update prev's next pointer
    if let Some(ref prev_rc) = prev {
        *prev_rc.next_sibling.borrow_mut() = next.clone();
    }

    // Update next's prev pointer
    if let Some(ref next_rc) = next {
        *next_rc.prev_sibling.borrow_mut() = prev.as_ref().map(Rc::downgrade);
    }

    // Update parent's first/last pointers
    if let Some(parent) = effect.parent() {
        // Check if we're the first child
        let is_first = parent
            .first_child
            .borrow()
            .as_ref()
            .is_some_and(|first| Rc::ptr_eq(first, effect));
        if is_first {
            *parent.first_child.borrow_mut() = next.clone();
        }

        // Check if we're the last child
        let is_last = parent
            .last_child
            .borrow()
            .as_ref()
            .and_then(|w| w.upgrade())
            .is_some_and(|last| Rc::ptr_eq(&last, effect));
        if is_last {
            *parent.last_child.borrow_mut() = prev.as_ref().map(Rc::downgrade);
        }
    }

    // Clear our own pointers
    *effect.prev_sibling.borrow_mut() = None;
    *effect.next_sibling.borrow_mut() = None;
}

// =============================================================================
// EXECUTE TEARDOWN
// =============================================================================

/// Run an effect's teardown function
pub(crate) fn execute_teardown(effect: &EffectInner) {
    let teardown = effect.teardown.borrow_mut().take();
    if let Some(cleanup) = teardown {
        cleanup();
    }
}

// =============================================================================
// DESTROY EFFECT CHILDREN
// =============================================================================

/// Destroy all children of an effect
pub(crate) fn destroy_effect_children(effect: &Rc<EffectInner>) {
    let mut child = effect.first_child.borrow_mut().take();
    *effect.last_child.borrow_mut() = None;

    // Collect all children first to avoid structural modifications during
    // iteration (e.g. if a teardown triggers unlinking of a sibling)
    let mut children = Vec::new();
    while let Some(c) = child {
        child = c.next_sibling.borrow_mut().take();
        // Clear prev sibling too to fully detach
        *c.prev_sibling.borrow_mut() = None;
        children.push(c);
    }

    for child_rc in children {
        // Don't destroy preserved or root effects
        let flags = child_rc.flags.get();
        if (flags & (EFFECT_PRESERVED | ROOT_EFFECT)) == 0 {
            destroy_effect(child_rc, false);
        }
    }
}

// =============================================================================
// DESTROY EFFECT
// =============================================================================

/// Destroy an effect and all its children
pub fn destroy_effect(effect: Rc<EffectInner>, remove_from_parent: bool) {
    // Recursively destroy children
    destroy_effect_children(&effect);

    // Remove from all dependencies
    remove_reactions(effect.clone() as Rc<dyn AnyReaction>, 0);

    // Mark as destroyed
    set_signal_status(&*effect, DESTROYED);

    // Run teardown
    execute_teardown(&effect);

    // Remove from parent's child list
    if remove_from_parent && effect.parent().is_some() {
        unlink_effect(&effect);
    }

    // Clear parent reference
    *effect.parent.borrow_mut() = None;

    // Nullify for cleanup (let Rc drop handles do their job)
    *effect.func.borrow_mut() = None;
    *effect.teardown.borrow_mut() = None;
    effect.deps.borrow_mut().clear();
    *effect.first_child.borrow_mut() = None;
    *effect.last_child.borrow_mut() = None;
    *effect.prev_sibling.borrow_mut() = None;
    *effect.next_sibling.borrow_mut() = None;
}

// =============================================================================
// UPDATE EFFECT - Run an effect
// =============================================================================

/// Restores the tracking context on every exit path, including unwinds from
/// a panicking effect body.
struct TrackingGuard {
    effect: Rc<EffectInner>,
    prev_reaction: Option<Weak<dyn AnyReaction>>,
    prev_effect: Option<Weak<dyn AnyReaction>>,
    prev_skipped: usize,
    prev_new_deps: Option<Vec<Rc<dyn AnySource>>>,
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        self.effect
            .set_flags(self.effect.flags() & !REACTION_IS_UPDATING);
        let prev_reaction = self.prev_reaction.take();
        let prev_effect = self.prev_effect.take();
        let prev_new_deps = self.prev_new_deps.take().unwrap_or_default();
        let prev_skipped = self.prev_skipped;
        with_context(|ctx| {
            ctx.set_active_reaction(prev_reaction);
            ctx.set_active_effect(prev_effect);
            ctx.set_skipped_deps(prev_skipped);
            ctx.swap_new_deps(prev_new_deps);
        });
    }
}

/// Run an effect and track its dependencies.
///
/// This is the core function that:
/// 1. Sets up the reaction context (restored by guard on all exit paths)
/// 2. Destroys child effects from previous run
/// 3. Runs teardown from previous run
/// 4. Executes the effect function with dependency tracking
/// 5. Rebuilds the dependency list (stale subscriptions removed)
/// 6. Stores new teardown if returned
pub fn update_effect(effect: &Rc<EffectInner>) {
    // Skip if destroyed
    if (effect.flags.get() & DESTROYED) != 0 {
        return;
    }

    // Mark as clean
    set_signal_status(&**effect, CLEAN);

    // Destroy child effects from previous run
    destroy_effect_children(effect);

    // Run teardown from previous run
    execute_teardown(effect);

    // Set up reaction context; the guard restores it even if the body panics
    let guard = with_context(|ctx| {
        let prev_reaction = ctx.set_active_reaction(Some(effect.as_weak_reaction()));
        let prev_effect = ctx.set_active_effect(Some(effect.as_weak_reaction()));

        // Start new read cycle
        ctx.increment_read_version();

        // Set up for dependency collection
        let prev_skipped = ctx.set_skipped_deps(0);
        let prev_new_deps = ctx.swap_new_deps(Vec::new());

        // Mark as updating (also the re-entrancy guard against self-writes)
        effect.set_flags(effect.flags() | REACTION_IS_UPDATING);

        TrackingGuard {
            effect: effect.clone(),
            prev_reaction,
            prev_effect,
            prev_skipped,
            prev_new_deps: Some(prev_new_deps),
        }
    });

    // Run the effect function
    let teardown = {
        let mut func_borrow = effect.func.borrow_mut();
        if let Some(ref mut func) = *func_borrow {
            func()
        } else {
            None
        }
    };

    // Capture collected deps before the guard restores the context
    let (skipped, new_deps) = with_context(|ctx| {
        let skipped = ctx.get_skipped_deps();
        let new_deps = ctx.swap_new_deps(Vec::new());
        (skipped, new_deps)
    });

    drop(guard);

    // Install dependencies: remove stale, add new
    remove_reactions(effect.clone() as Rc<dyn AnyReaction>, skipped);

    for dep in new_deps {
        effect.add_dep(dep.clone());
        dep.add_reaction(Rc::downgrade(&(effect.clone() as Rc<dyn AnyReaction>)));
    }

    // Update write version
    with_context(|ctx| {
        effect.write_version.set(ctx.increment_write_version());
    });

    // Store teardown if returned
    *effect.teardown.borrow_mut() = teardown;
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create an effect that runs when dependencies change.
///
/// The effect function runs synchronously once on creation and is tracked for
/// dependencies - any signals read inside will be registered. When those
/// signals change, the effect re-runs, rebuilding its dependency list each
/// time.
///
/// Returns a dispose function that destroys the effect when called.
///
/// # Example
///
/// ```ignore
/// let count = signal(0);
///
/// let dispose = effect(|| {
///     println!("Count: {}", count.get());
/// });
///
/// count.set(1); // Effect runs: "Count: 1"
/// count.set(2); // Effect runs: "Count: 2"
///
/// dispose(); // Effect is destroyed
/// count.set(3); // Effect does NOT run
/// ```
pub fn effect<F>(mut f: F) -> impl FnOnce()
where
    F: FnMut() + 'static,
{
    effect_with_cleanup(move || {
        f();
        None
    })
}

/// Create an effect that can return a cleanup function.
///
/// The cleanup function runs before each re-execution and when disposed.
///
/// # Example
///
/// ```ignore
/// let count = signal(0);
///
/// let dispose = effect_with_cleanup(|| {
///     let id = subscribe_to_something();
///     println!("Count: {}", count.get());
///
///     Some(Box::new(move || {
///         unsubscribe(id);
///     }))
/// });
/// ```
pub fn effect_with_cleanup<F>(f: F) -> impl FnOnce()
where
    F: FnMut() -> Option<CleanupFn> + 'static,
{
    let effect = create_effect(EFFECT | USER_EFFECT, Box::new(f), true);
    let effect_clone = effect.clone();
    move || destroy_effect(effect_clone, true)
}

/// Create a render effect (internal; used by the template binder).
///
/// Identical to a user effect except for its flag, which lets disposal and
/// diagnostics distinguish DOM-updating effects from user code.
pub(crate) fn render_effect<F>(f: F) -> Rc<EffectInner>
where
    F: FnMut() -> Option<CleanupFn> + 'static,
{
    create_effect(EFFECT | RENDER_EFFECT, Box::new(f), true)
}

/// Create a root effect scope.
///
/// A root effect creates a scope for child effects. When the root is disposed,
/// all child effects are also disposed.
///
/// Returns a dispose function that destroys the root and all its children.
///
/// # Example
///
/// ```ignore
/// let dispose = effect_root(|| {
///     effect(|| println!("Effect A"));
///     effect(|| println!("Effect B"));
/// });
///
/// // Later, clean up all effects at once
/// dispose();
/// ```
pub fn effect_root<F>(f: F) -> impl FnOnce()
where
    F: FnOnce() + 'static,
{
    // Root effects run their function once (FnOnce), not repeatedly
    let f_cell = Cell::new(Some(f));

    let effect = create_effect(
        ROOT_EFFECT | EFFECT_PRESERVED,
        Box::new(move || {
            if let Some(func) = f_cell.take() {
                func();
            }
            None
        }),
        true,
    );

    let effect_clone = effect.clone();
    move || destroy_effect(effect_clone, true)
}

/// Check if we're currently inside a tracking context.
///
/// Returns true if code is running inside an effect or computed,
/// meaning signal reads will be tracked as dependencies.
pub fn effect_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction())
}

/// Run a closure with no active reaction or effect.
///
/// New effects created inside are not parented to the currently running
/// effect, so they survive its re-runs. Used by the list reconciler: item
/// instances must outlive the region effect that creates them.
pub fn detached<R>(f: impl FnOnce() -> R) -> R {
    let (prev_reaction, prev_effect) = with_context(|ctx| {
        (ctx.set_active_reaction(None), ctx.set_active_effect(None))
    });

    struct DetachGuard {
        prev_reaction: Option<Weak<dyn AnyReaction>>,
        prev_effect: Option<Weak<dyn AnyReaction>>,
    }

    impl Drop for DetachGuard {
        fn drop(&mut self) {
            let prev_reaction = self.prev_reaction.take();
            let prev_effect = self.prev_effect.take();
            with_context(|ctx| {
                ctx.set_active_reaction(prev_reaction);
                ctx.set_active_effect(prev_effect);
            });
        }
    }

    let _guard = DetachGuard {
        prev_reaction,
        prev_effect,
    };
    f()
}

// =============================================================================
// CREATE EFFECT (Internal)
// =============================================================================

/// Create an effect (internal).
///
/// # Arguments
///
/// * `effect_type` - Effect type flags (EFFECT, RENDER_EFFECT, ROOT_EFFECT, etc.)
/// * `func` - The effect function
/// * `push` - Whether to add to parent's child list
fn create_effect(effect_type: u32, func: EffectFn, push: bool) -> Rc<EffectInner> {
    let effect = EffectInner::new(effect_type, Some(func));

    // Register with current scope (if any)
    register_effect_with_scope(&effect);

    // Get parent effect if we're inside one
    let parent = with_context(|ctx| ctx.get_active_effect().and_then(|w| w.upgrade()));

    // Set parent on the new effect
    if let Some(ref parent_rc) = parent {
        // Try to downcast to EffectInner
        if let Some(parent_inner) = parent_rc.as_any().downcast_ref::<EffectInner>() {
            // Get the parent's Rc from its self_weak
            if let Some(parent_effect) = parent_inner.self_weak.borrow().upgrade() {
                effect.set_parent(Some(Rc::downgrade(&parent_effect)));

                // Add to parent's child list if push is true
                if push {
                    push_effect(&effect, &parent_effect);
                }
            }
        }
    }

    // Effects run synchronously on creation
    update_effect(&effect);
    effect.set_flags(effect.flags() | EFFECT_RAN);

    // A write to one of the effect's own dependencies during the first run
    // only parked it in the queue. Drain now, unless an enclosing reaction is
    // still running; its completion (or the surrounding flush) drains instead.
    if !with_context(|ctx| ctx.has_active_reaction()) {
        maybe_flush();
    }

    effect
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::signal::signal;

    #[test]
    fn effect_runs_on_dependency_change() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let count = signal(0);
        let count_clone = count.clone();

        let _dispose = effect(move || {
            let _ = count_clone.get(); // Create dependency
            run_count_clone.set(run_count_clone.get() + 1);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1, "Effect should run on creation");

        // Change signal - effect should run again
        count.set(1);
        assert_eq!(
            run_count.get(),
            2,
            "Effect should run when dependency changes"
        );

        // Change signal again
        count.set(2);
        assert_eq!(run_count.get(), 3, "Effect should run on each change");
    }

    #[test]
    fn cleanup_function_called_before_rerun() {
        let cleanup_count = Rc::new(Cell::new(0));
        let cleanup_clone = cleanup_count.clone();

        let count = signal(0);
        let count_clone = count.clone();

        let _dispose = effect_with_cleanup(move || {
            let _ = count_clone.get();
            let cc = cleanup_clone.clone();
            Some(Box::new(move || {
                cc.set(cc.get() + 1);
            }) as CleanupFn)
        });

        // Cleanup hasn't run yet (effect just created)
        assert_eq!(cleanup_count.get(), 0);

        // Change signal - cleanup from previous run should execute
        count.set(1);
        assert_eq!(cleanup_count.get(), 1, "Cleanup should run before re-run");

        // Change again
        count.set(2);
        assert_eq!(cleanup_count.get(), 2, "Cleanup should run each time");
    }

    #[test]
    fn effect_runs_synchronously_on_creation() {
        let run_order = Rc::new(RefCell::new(Vec::new()));
        let run_order_clone = run_order.clone();

        run_order.borrow_mut().push("before");

        let count = signal(0);
        let count_clone = count.clone();

        let _dispose = effect(move || {
            let _ = count_clone.get();
            run_order_clone.borrow_mut().push("effect");
        });

        run_order.borrow_mut().push("after");

        // Effect should have run synchronously, between before and after
        assert_eq!(
            *run_order.borrow(),
            vec!["before", "effect", "after"],
            "Effect should run immediately on creation"
        );
    }

    #[test]
    fn effect_root_creates_scope() {
        let effect_a_runs = Rc::new(Cell::new(0));
        let effect_b_runs = Rc::new(Cell::new(0));
        let effect_a_runs_clone = effect_a_runs.clone();
        let effect_b_runs_clone = effect_b_runs.clone();

        let count = signal(0);
        let count_a = count.clone();
        let count_b = count.clone();

        let dispose = effect_root(move || {
            // Child effects - their dispose functions are ignored since root manages them
            let _dispose_a = effect(move || {
                let _ = count_a.get();
                effect_a_runs_clone.set(effect_a_runs_clone.get() + 1);
            });
            let _dispose_b = effect(move || {
                let _ = count_b.get();
                effect_b_runs_clone.set(effect_b_runs_clone.get() + 1);
            });
        });

        // Both effects should have run
        assert_eq!(effect_a_runs.get(), 1);
        assert_eq!(effect_b_runs.get(), 1);

        // Dispose the root - children should be destroyed
        dispose();

        // Change signal - effects should NOT run (they're disposed)
        count.set(1);
        assert_eq!(
            effect_a_runs.get(),
            1,
            "Effect A should not run after root disposed"
        );
        assert_eq!(
            effect_b_runs.get(),
            1,
            "Effect B should not run after root disposed"
        );
    }

    #[test]
    fn dispose_function_destroys_effect() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let count = signal(0);
        let count_clone = count.clone();

        let dispose = effect(move || {
            let _ = count_clone.get();
            run_count_clone.set(run_count_clone.get() + 1);
        });

        assert_eq!(run_count.get(), 1);

        // Dispose the effect
        dispose();

        // Change signal - effect should NOT run
        count.set(1);
        assert_eq!(run_count.get(), 1, "Effect should not run after dispose");

        count.set(2);
        assert_eq!(run_count.get(), 1, "Effect should remain disposed");
    }

    #[test]
    fn dispose_runs_cleanup() {
        let cleanup_called = Rc::new(Cell::new(false));
        let cleanup_called_clone = cleanup_called.clone();

        let count = signal(0);
        let count_clone = count.clone();

        let dispose = effect_with_cleanup(move || {
            let _ = count_clone.get();
            let cc = cleanup_called_clone.clone();
            Some(Box::new(move || {
                cc.set(true);
            }) as CleanupFn)
        });

        assert!(!cleanup_called.get());

        // Dispose should trigger cleanup
        dispose();

        assert!(cleanup_called.get(), "Cleanup should run on dispose");
    }

    #[test]
    fn effect_tracking_function() {
        assert!(!effect_tracking(), "Should be false outside effect");

        let was_tracking = Rc::new(Cell::new(false));
        let was_tracking_clone = was_tracking.clone();

        let _dispose = effect(move || {
            was_tracking_clone.set(effect_tracking());
        });

        assert!(was_tracking.get(), "Should be true inside effect");
    }

    #[test]
    fn guarded_self_write_converges() {
        // An effect that writes its own dependency re-runs on the next flush
        // cycle until its guard stops producing new values.
        let count = signal(0);
        let count_clone = count.clone();
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let _dispose = effect(move || {
            let current = count_clone.get();
            run_count_clone.set(run_count_clone.get() + 1);
            if current < 3 {
                count_clone.set(current + 1);
            }
        });

        // Creation run plus one per self-write until the guard holds
        assert_eq!(count.get(), 3);
        assert_eq!(run_count.get(), 4);

        // An external write below the threshold converges again
        count.set(1);
        assert_eq!(count.get(), 3);
        assert_eq!(run_count.get(), 7);
    }

    #[test]
    #[should_panic(expected = "Maximum update depth exceeded")]
    fn unguarded_self_write_hits_the_flush_cap() {
        let count = signal(0);
        let count_clone = count.clone();

        let _dispose = effect(move || {
            let current = count_clone.get();
            count_clone.set(current + 1);
        });
    }

    #[test]
    #[should_panic(expected = "Maximum update depth exceeded")]
    fn mutual_trigger_loop_detection() {
        // Two effects that keep writing each other's dependency form a cycle
        // the re-entrancy guard cannot break; the flush cap catches it.
        let a = signal(0);
        let b = signal(0);

        let a1 = a.clone();
        let b1 = b.clone();
        let _dispose_ab = effect(move || {
            let v = a1.get();
            b1.set(v + 1);
        });

        let a2 = a.clone();
        let b2 = b.clone();
        let _dispose_ba = effect(move || {
            let v = b2.get();
            a2.set(v + 1);
        });

        // Kick off the ping-pong
        a.set(100);
    }

    #[test]
    fn effect_retracks_dependencies_per_run() {
        // An effect that branches between signals only depends on the one it
        // last read.
        let use_a = signal(true);
        let a = signal(0);
        let b = signal(0);
        let run_count = Rc::new(Cell::new(0));

        let use_a_clone = use_a.clone();
        let a_clone = a.clone();
        let b_clone = b.clone();
        let run_count_clone = run_count.clone();
        let _dispose = effect(move || {
            if use_a_clone.get() {
                let _ = a_clone.get();
            } else {
                let _ = b_clone.get();
            }
            run_count_clone.set(run_count_clone.get() + 1);
        });

        assert_eq!(run_count.get(), 1);

        // Tracking a: updates to a re-run, b is ignored
        a.set(1);
        assert_eq!(run_count.get(), 2);
        b.set(1);
        assert_eq!(run_count.get(), 2);

        // Switch the branch
        use_a.set(false);
        assert_eq!(run_count.get(), 3);

        // Now b re-runs and a is a stale dependency that was removed
        b.set(2);
        assert_eq!(run_count.get(), 4);
        a.set(2);
        assert_eq!(run_count.get(), 4);
    }

    #[test]
    fn panicking_effect_restores_tracking_context() {
        let trigger = signal(0);
        let trigger_clone = trigger.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _dispose = effect(move || {
                let _ = trigger_clone.get();
                panic!("intentional panic");
            });
        }));
        assert!(result.is_err());

        // Context is clean: no stuck active reaction
        assert!(!effect_tracking());

        // New effects work normally afterwards
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();
        let trigger2 = trigger.clone();
        let _dispose = effect(move || {
            let _ = trigger2.get();
            run_count_clone.set(run_count_clone.get() + 1);
        });
        assert_eq!(run_count.get(), 1);
        trigger.set(1);
        assert_eq!(run_count.get(), 2);
    }

    #[test]
    fn detached_effects_survive_parent_rerun() {
        let outer = signal(0);
        let inner = signal(0);
        let inner_runs = Rc::new(Cell::new(0));

        let outer_clone = outer.clone();
        let inner_clone = inner.clone();
        let inner_runs_clone = inner_runs.clone();
        let created = Rc::new(Cell::new(false));
        let created_clone = created.clone();

        let _dispose = effect(move || {
            let _ = outer_clone.get();
            if !created_clone.get() {
                created_clone.set(true);
                let inner_sig = inner_clone.clone();
                let runs = inner_runs_clone.clone();
                detached(|| {
                    let _keep = effect(move || {
                        let _ = inner_sig.get();
                        runs.set(runs.get() + 1);
                    });
                    // Leak the dispose handle for the test: the effect has no
                    // parent so it stays alive via its dependency edges
                    std::mem::forget(_keep);
                });
            }
        });

        assert_eq!(inner_runs.get(), 1);

        // Re-running the outer effect must not destroy the detached child
        outer.set(1);
        inner.set(1);
        assert_eq!(inner_runs.get(), 2);
    }

    // =========================================================================
    // UNIT TESTS
    // =========================================================================

    #[test]
    fn effect_inner_creation() {
        let effect = EffectInner::new(EFFECT | USER_EFFECT, None);

        // Should have EFFECT and USER_EFFECT flags plus DIRTY
        let flags = effect.flags.get();
        assert!((flags & EFFECT) != 0);
        assert!((flags & USER_EFFECT) != 0);
        assert!((flags & DIRTY) != 0);
    }

    #[test]
    fn effect_inner_implements_any_reaction() {
        let effect = EffectInner::new(EFFECT, None);

        // Test AnyReaction methods
        assert_eq!(effect.dep_count(), 0);
        assert!(!effect.is_clean());
        assert!(effect.is_dirty());

        effect.mark_clean();
        assert!(effect.is_clean());
    }

    #[test]
    fn effect_tree_structure() {
        let parent = EffectInner::new(ROOT_EFFECT, None);
        let child1 = EffectInner::new(EFFECT, None);
        let child2 = EffectInner::new(EFFECT, None);

        // Set parent on children
        child1.set_parent(Some(Rc::downgrade(&parent)));
        child2.set_parent(Some(Rc::downgrade(&parent)));

        // Push children to parent
        push_effect(&child1, &parent);
        push_effect(&child2, &parent);

        // Verify tree structure
        assert!(parent.first_child().is_some());
        assert!(Rc::ptr_eq(&parent.first_child().unwrap(), &child1));
        assert!(Rc::ptr_eq(&parent.last_child().unwrap(), &child2));

        // Verify sibling links
        assert!(child1.next_sibling.borrow().is_some());
        assert!(child2
            .prev_sibling
            .borrow()
            .as_ref()
            .unwrap()
            .upgrade()
            .is_some());
    }

    #[test]
    fn effect_teardown() {
        let teardown_called = Rc::new(Cell::new(false));
        let teardown_called_clone = teardown_called.clone();

        let effect = EffectInner::new(EFFECT, None);
        *effect.teardown.borrow_mut() = Some(Box::new(move || {
            teardown_called_clone.set(true);
        }));

        assert!(!teardown_called.get());
        execute_teardown(&effect);
        assert!(teardown_called.get());

        // Teardown should be consumed
        assert!(effect.teardown.borrow().is_none());
    }

    #[test]
    fn destroy_effect_marks_destroyed() {
        let effect = EffectInner::new(EFFECT, None);

        assert!((effect.flags.get() & DESTROYED) == 0);

        destroy_effect(effect.clone(), false);

        assert!((effect.flags.get() & DESTROYED) != 0);
    }

    #[test]
    fn destroy_effect_runs_teardown() {
        let teardown_called = Rc::new(Cell::new(false));
        let teardown_called_clone = teardown_called.clone();

        let effect = EffectInner::new(EFFECT, None);
        *effect.teardown.borrow_mut() = Some(Box::new(move || {
            teardown_called_clone.set(true);
        }));

        destroy_effect(effect.clone(), false);

        assert!(teardown_called.get());
    }

    #[test]
    fn destroy_effect_destroys_children() {
        let parent = EffectInner::new(EFFECT, None);
        let child = EffectInner::new(EFFECT, None);

        child.set_parent(Some(Rc::downgrade(&parent)));
        push_effect(&child, &parent);

        // Verify child is linked
        assert!(parent.first_child().is_some());

        // Destroy parent
        destroy_effect(parent.clone(), false);

        // Parent should have no children
        assert!(parent.first_child().is_none());

        // Child should be destroyed
        assert!((child.flags.get() & DESTROYED) != 0);
    }

    #[test]
    fn update_effect_runs_function() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = EffectInner::new(
            EFFECT,
            Some(Box::new(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                None
            })),
        );

        assert_eq!(run_count.get(), 0);

        update_effect(&effect);

        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn update_effect_stores_teardown() {
        let effect = EffectInner::new(
            EFFECT,
            Some(Box::new(|| Some(Box::new(|| {}) as CleanupFn))),
        );

        assert!(effect.teardown.borrow().is_none());

        update_effect(&effect);

        assert!(effect.teardown.borrow().is_some());
    }

    #[test]
    fn update_effect_runs_previous_teardown() {
        let teardown_run = Rc::new(Cell::new(0));
        let teardown_run_clone = teardown_run.clone();

        let effect = EffectInner::new(
            EFFECT,
            Some(Box::new(move || {
                let tr = teardown_run_clone.clone();
                Some(Box::new(move || {
                    tr.set(tr.get() + 1);
                }) as CleanupFn)
            })),
        );

        // First run - no teardown yet
        update_effect(&effect);
        assert_eq!(teardown_run.get(), 0);

        // Second run - previous teardown should run
        update_effect(&effect);
        assert_eq!(teardown_run.get(), 1);

        // Third run - teardown runs again
        update_effect(&effect);
        assert_eq!(teardown_run.get(), 2);
    }

    #[test]
    fn update_effect_marks_clean() {
        let effect = EffectInner::new(EFFECT, Some(Box::new(|| None)));

        // Starts dirty
        assert!(effect.is_dirty());

        update_effect(&effect);

        // Should be clean after running
        assert!(effect.is_clean());
    }

    #[test]
    fn update_effect_skips_destroyed() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = EffectInner::new(
            EFFECT,
            Some(Box::new(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                None
            })),
        );

        // Destroy the effect
        effect.set_flags(effect.flags.get() | DESTROYED);

        update_effect(&effect);

        // Should not have run
        assert_eq!(run_count.get(), 0);
    }
}
