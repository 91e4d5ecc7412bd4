// ============================================================================
// cinder - Computed Signals
// Lazy memoized values that cache and update when dependencies change
// ============================================================================
//
// A Computed is BOTH a Source (can be read, has reactions) AND a Reaction
// (has deps, can be marked dirty, has update method). This dual nature is
// essential for the MAYBE_DIRTY optimization.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{default_equals, AnyReaction, AnySource, EqualsFn};
use crate::reactivity::tracking::{install_dependencies, set_source_status, track_read};

// =============================================================================
// COMPUTED INNER
// =============================================================================

/// The internal data for a computed signal.
///
/// Implements BOTH AnySource (can be read, has reactions) AND AnyReaction
/// (has deps, can be marked dirty, executes computation).
pub struct ComputedInner<T> {
    /// Flags bitmask (COMPUTED | status)
    flags: Cell<u32>,

    /// The computation function
    fn_: RefCell<Option<Box<dyn Fn() -> T>>>,

    /// Cached value (None = uninitialized)
    value: RefCell<Option<T>>,

    /// Equality function for comparing values
    equals: EqualsFn<T>,

    /// Write version - incremented when value changes
    write_version: Cell<u32>,

    /// Read version - for dependency deduplication
    read_version: Cell<u32>,

    /// Reactions that depend on this computed (Source side)
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,

    /// Dependencies this computed reads from (Reaction side)
    deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Self-reference for trait object conversion.
    /// Set immediately during construction in new_with_equals()
    self_ref: RefCell<Option<Weak<ComputedInner<T>>>>,
}

impl<T> ComputedInner<T> {
    /// Create a new computed with the given computation function
    pub fn new<F>(fn_: F) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
        T: PartialEq,
    {
        Self::new_with_equals(fn_, default_equals)
    }

    /// Create a new computed with a custom equality function
    pub fn new_with_equals<F>(fn_: F, equals: EqualsFn<T>) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new(Self {
            flags: Cell::new(COMPUTED | SOURCE | DIRTY), // Needs first computation
            fn_: RefCell::new(Some(Box::new(fn_))),
            value: RefCell::new(None),
            equals,
            write_version: Cell::new(0),
            read_version: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
            deps: RefCell::new(Vec::new()),
            self_ref: RefCell::new(None),
        });

        *inner.self_ref.borrow_mut() = Some(Rc::downgrade(&inner));

        inner
    }

    /// Get the cached value (panics if uninitialized)
    pub fn get_value(&self) -> T
    where
        T: Clone,
    {
        self.value
            .borrow()
            .as_ref()
            .expect("computed not initialized")
            .clone()
    }

    /// Check if the value has been computed at least once
    pub fn is_initialized(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Execute the computation and update the cached value.
    /// Returns true if the value changed.
    pub fn compute(&self) -> bool
    where
        T: Clone,
    {
        let new_value = {
            let fn_ref = self.fn_.borrow();
            let fn_ = fn_ref.as_ref().expect("computed fn disposed");
            fn_()
        };

        // Same-value writes don't count as changes
        let changed = {
            let current = self.value.borrow();
            match current.as_ref() {
                Some(v) => !(self.equals)(v, &new_value),
                None => true, // First computation
            }
        };

        if changed {
            *self.value.borrow_mut() = Some(new_value);
            with_context(|ctx| {
                self.write_version.set(ctx.increment_write_version());
            });
        }

        changed
    }

    /// Get the equality function
    pub fn equals_fn(&self) -> EqualsFn<T> {
        self.equals
    }
}

// =============================================================================
// AnySource implementation for ComputedInner
// =============================================================================

impl<T: 'static + Clone> AnySource for ComputedInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn write_version(&self) -> u32 {
        self.write_version.get()
    }

    fn set_write_version(&self, version: u32) {
        self.write_version.set(version);
    }

    fn read_version(&self) -> u32 {
        self.read_version.get()
    }

    fn set_read_version(&self, version: u32) {
        self.read_version.set(version);
    }

    fn reaction_count(&self) -> usize {
        self.reactions.borrow().len()
    }

    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>) {
        self.reactions.borrow_mut().push(reaction);
    }

    fn cleanup_dead_reactions(&self) {
        self.reactions.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool) {
        let reactions = self.reactions.borrow();
        for weak in reactions.iter() {
            if let Some(rc) = weak.upgrade() {
                if !f(rc) {
                    break;
                }
            }
        }
    }

    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>) {
        let reaction_ptr = Rc::as_ptr(reaction) as *const ();
        self.reactions.borrow_mut().retain(|weak| {
            if let Some(rc) = weak.upgrade() {
                let ptr = Rc::as_ptr(&rc) as *const ();
                ptr != reaction_ptr
            } else {
                false // remove dead refs
            }
        });
    }

    fn clear_reactions(&self) {
        self.reactions.borrow_mut().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_computed_reaction(&self) -> Option<Rc<dyn AnyReaction>> {
        // Return self as Rc<dyn AnyReaction> for MAYBE_DIRTY checking
        self.self_ref
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(|rc| rc as Rc<dyn AnyReaction>)
    }
}

// =============================================================================
// AnyReaction implementation for ComputedInner
// =============================================================================

impl<T: 'static + Clone> AnyReaction for ComputedInner<T> {
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
        self.compute()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_computed_source(&self) -> Option<Rc<dyn AnySource>> {
        // Return self as Rc<dyn AnySource> for cascade propagation
        self.self_ref
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .map(|rc| rc as Rc<dyn AnySource>)
    }
}

// =============================================================================
// COMPUTED<T> WRAPPER
// =============================================================================

/// A computed signal - a lazily memoized value that caches and updates.
///
/// Computeds only recompute when their dependencies change. They implement
/// the MAYBE_DIRTY optimization: if a dependency is marked MAYBE_DIRTY but
/// its value didn't actually change, the computed doesn't recompute, and
/// downstream reactions never fire.
///
/// # Example
/// ```ignore
/// let count = signal(1);
/// let doubled = computed(move || count.get() * 2);
/// assert_eq!(doubled.get(), 2);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
#[derive(Clone)]
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: 'static + Clone> Computed<T> {
    /// Create a new computed signal from an inner
    pub(crate) fn from_inner(inner: Rc<ComputedInner<T>>) -> Self {
        Self { inner }
    }

    /// Get the computed's value.
    ///
    /// If the computed is dirty, it will recompute first.
    /// If inside a reaction, registers this computed as a dependency.
    pub fn get(&self) -> T {
        // Resolve dirtiness before reading
        update_computed_chain(self.inner.clone() as Rc<dyn AnySource>);

        // Track the read (registers dependency if inside a reaction)
        track_read(self.inner.clone() as Rc<dyn AnySource>);

        self.inner.get_value()
    }

    /// Get access to the inner for graph operations
    pub fn inner(&self) -> &Rc<ComputedInner<T>> {
        &self.inner
    }

    /// Convert to type-erased AnySource
    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone() as Rc<dyn AnySource>
    }

    /// Convert to type-erased AnyReaction
    pub fn as_any_reaction(&self) -> Rc<dyn AnyReaction> {
        self.inner.clone() as Rc<dyn AnyReaction>
    }
}

impl<T: std::fmt::Debug + Clone + 'static> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("initialized", &self.inner.is_initialized())
            .finish()
    }
}

// =============================================================================
// PUBLIC API
// =============================================================================

/// Create a computed signal.
///
/// Computeds are lazy - they only compute when read.
/// They cache their value and only recompute when dependencies change.
///
/// # Example
/// ```ignore
/// let count = signal(1);
/// let doubled = computed(move || count.get() * 2);
/// assert_eq!(doubled.get(), 2);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub fn computed<T, F>(fn_: F) -> Computed<T>
where
    T: 'static + Clone + PartialEq,
    F: Fn() -> T + 'static,
{
    Computed::from_inner(ComputedInner::new(fn_))
}

/// Create a computed signal with a custom equality function.
pub fn computed_with_equals<T, F>(fn_: F, equals: EqualsFn<T>) -> Computed<T>
where
    T: 'static + Clone,
    F: Fn() -> T + 'static,
{
    Computed::from_inner(ComputedInner::new_with_equals(fn_, equals))
}

// =============================================================================
// UPDATE COMPUTED CHAIN - The MAYBE_DIRTY optimization
// =============================================================================

/// Update a computed and all its dirty dependencies iteratively.
///
/// This is the key algorithm for the MAYBE_DIRTY optimization:
/// 1. Collect all dirty/maybe-dirty computeds in the dependency chain
/// 2. Process from deepest (sources) to shallowest (target)
/// 3. For DIRTY: always update
/// 4. For MAYBE_DIRTY: check if any dep's write_version > self.write_version
///
/// Uses an iterative approach to avoid stack overflow on deep chains.
pub fn update_computed_chain(target: Rc<dyn AnySource>) {
    let flags = target.flags();
    if (flags & (DIRTY | MAYBE_DIRTY)) == 0 {
        return;
    }

    // Walk from target toward sources, collecting dirty/maybe-dirty computeds
    let mut chain: Vec<Rc<dyn AnySource>> = vec![target.clone()];
    let mut visited: Vec<*const ()> = vec![Rc::as_ptr(&target) as *const ()];
    let mut idx = 0;

    while idx < chain.len() {
        let current = chain[idx].clone();
        idx += 1;

        let flags = current.flags();
        if (flags & (DIRTY | MAYBE_DIRTY)) == 0 {
            continue;
        }

        if let Some(reaction) = current.as_computed_reaction() {
            let mut deps_to_add = Vec::new();
            reaction.for_each_dep(&mut |dep| {
                let dep_flags = dep.flags();
                if (dep_flags & COMPUTED) != 0 && (dep_flags & (DIRTY | MAYBE_DIRTY)) != 0 {
                    let dep_ptr = Rc::as_ptr(dep) as *const ();
                    if !visited.contains(&dep_ptr) {
                        deps_to_add.push(dep.clone());
                        visited.push(dep_ptr);
                    }
                }
                true // continue
            });
            chain.extend(deps_to_add);
        }
    }

    // Update from deepest (end) to shallowest (start)
    for i in (0..chain.len()).rev() {
        let current = &chain[i];

        // Might have been cleaned by a previous iteration
        let flags = current.flags();
        if (flags & (DIRTY | MAYBE_DIRTY)) == 0 {
            continue;
        }

        if (flags & DIRTY) != 0 {
            update_computed(current);
        } else {
            // MAYBE_DIRTY - only recompute if a dep actually changed
            if check_deps_changed(current) {
                update_computed(current);
            } else {
                set_source_status(&**current, CLEAN);
            }
        }
    }
}

/// Check if any dependency has a newer write_version than the computed.
fn check_deps_changed(source: &Rc<dyn AnySource>) -> bool {
    let self_wv = source.write_version();

    if let Some(reaction) = source.as_computed_reaction() {
        let mut changed = false;
        reaction.for_each_dep(&mut |dep| {
            if dep.write_version() > self_wv {
                changed = true;
                false // stop iteration
            } else {
                true // continue
            }
        });
        changed
    } else {
        false
    }
}

/// Restores the tracking context on unwind as well as normal return.
struct ComputeGuard {
    reaction: Rc<dyn AnyReaction>,
    prev_reaction: Option<Weak<dyn AnyReaction>>,
    prev_new_deps: Option<Vec<Rc<dyn AnySource>>>,
}

impl Drop for ComputeGuard {
    fn drop(&mut self) {
        self.reaction
            .set_flags(AnyReaction::flags(&*self.reaction) & !REACTION_IS_UPDATING);
        let prev_reaction = self.prev_reaction.take();
        let prev_new_deps = self.prev_new_deps.take().unwrap_or_default();
        with_context(|ctx| {
            ctx.set_active_reaction(prev_reaction);
            ctx.swap_new_deps(prev_new_deps);
        });
    }
}

/// Update a single computed signal.
///
/// This function:
/// 1. Sets up the tracking context (active reaction, read version)
/// 2. Runs the computation function (which calls signal.get() and tracks deps)
/// 3. Installs the new dependencies (wires up the reactive graph)
/// 4. Marks the computed as clean
fn update_computed(source: &Rc<dyn AnySource>) {
    if let Some(reaction) = source.as_computed_reaction() {
        let guard = with_context(|ctx| {
            let prev_reaction = ctx.set_active_reaction(Some(Rc::downgrade(&reaction)));
            let prev_new_deps = ctx.swap_new_deps(Vec::new());
            ctx.increment_read_version();

            reaction.set_flags(AnyReaction::flags(&*reaction) | REACTION_IS_UPDATING);

            ComputeGuard {
                reaction: reaction.clone(),
                prev_reaction,
                prev_new_deps: Some(prev_new_deps),
            }
        });

        let _changed = reaction.update();

        // Wire up the collected deps while they are still in the context;
        // the guard then restores the previous tracking state
        install_dependencies(reaction.clone(), 0);
        set_source_status(&**source, CLEAN);
        drop(guard);
    }
}

// =============================================================================
// TESTS
// =============================================================================
