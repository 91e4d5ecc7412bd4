// ============================================================================
// cinder - Dependency Tracking
// The core of the reactivity system - tracking reads and propagating writes
// ============================================================================
//
// The key challenge in Rust is borrow scoping: we must release RefCell borrows
// before mutating, using the "collect-then-mutate" pattern.
// ============================================================================

use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource};
use crate::reactivity::scheduling::{enqueue_reaction, schedule_reaction};

// =============================================================================
// TRACK READ - Register dependency when reading a signal
// =============================================================================

/// Track a read of a source, registering it as a dependency if inside a reaction.
///
/// Called by Signal::get() after reading the value.
///
/// # Borrow Safety
/// This function accesses the thread-local context and may modify both the
/// source's reactions list and the reaction's deps list. Care is taken to
/// not hold borrows across these mutations.
pub fn track_read(source: Rc<dyn AnySource>) {
    with_context(|ctx| {
        // Only track if we're inside a reaction and not untracking
        if !ctx.has_active_reaction() || ctx.is_untracking() {
            return;
        }

        // Get the active reaction
        let reaction_weak = match ctx.get_active_reaction() {
            Some(r) => r,
            None => return,
        };

        let reaction = match reaction_weak.upgrade() {
            Some(r) => r,
            None => return,
        };

        // Check if we're in the reaction's update cycle
        if (reaction.flags() & REACTION_IS_UPDATING) != 0 {
            // Version-based deduplication: only add if not already tracked this cycle
            let read_version = ctx.get_read_version();

            if source.read_version() < read_version {
                // First read of this source in this cycle
                source.set_read_version(read_version);

                // Add to the new deps list being built
                ctx.add_new_dep(source.clone());
            }
            // If rv >= read_version, we already tracked this source this cycle - skip
        } else {
            // Outside update cycle (e.g., reading after reaction setup)
            // Add dependency directly

            // Add source to reaction's deps
            reaction.add_dep(source.clone());

            // Add reaction to source's reactions
            source.add_reaction(Rc::downgrade(&reaction));
        }
    });
}

// =============================================================================
// NOTIFY WRITE - Called when a signal's value changes
// =============================================================================

/// Notify the reactive system that a source's value has changed.
///
/// Called by Signal::set() after the value is updated.
/// This triggers mark_reactions to propagate dirty state through the graph.
pub fn notify_write(source: Rc<dyn AnySource>) {
    // Check for unsafe mutation inside a computed
    with_context(|ctx| {
        if let Some(reaction_weak) = ctx.get_active_reaction() {
            if let Some(reaction) = reaction_weak.upgrade() {
                if (reaction.flags() & COMPUTED) != 0 {
                    panic!(
                        "Cannot write to signals inside a computed. \
                         Computeds should be pure computations with no side effects."
                    );
                }
            }
        }
    });

    // Mark all reactions as dirty
    mark_reactions(source, DIRTY);
}

// =============================================================================
// MARK REACTIONS - Propagate dirty state through the graph
// =============================================================================

/// Mark all reactions of a source with the given status.
///
/// For direct dependents: mark with the given status (usually DIRTY)
/// For computeds: cascade MAYBE_DIRTY to their dependents
/// For effects: schedule them for execution
///
/// Re-entrancy: a reaction that is currently running its own function
/// (REACTION_IS_UPDATING) is never run synchronously. An effect writing its
/// own dependency is marked and parked in the queue instead, so it re-runs in
/// the next flush cycle.
///
/// # Algorithm
/// Uses an iterative approach with an explicit stack to avoid stack overflow
/// on deep dependency chains.
///
/// # Borrow Safety
/// The key challenge: we iterate over a source's reactions while also needing
/// to modify those reactions (set their flags) and potentially iterate THEIR
/// reactions (for computeds).
///
/// Solution: "collect-then-mutate" pattern
/// 1. Collect reactions into a temporary Vec (releases the borrow)
/// 2. Iterate the Vec and mutate freely
pub fn mark_reactions(source: Rc<dyn AnySource>, status: u32) {
    // Collect effects to schedule (we can't schedule inside the graph walk)
    let mut effects_to_schedule: Vec<Rc<dyn AnyReaction>> = Vec::new();

    // Use iterative approach with explicit stack
    let mut stack: Vec<(Rc<dyn AnySource>, u32)> = vec![(source, status)];

    while let Some((current_source, current_status)) = stack.pop() {
        // Clean up dead reactions first (prevents memory growth in reaction lists)
        current_source.cleanup_dead_reactions();

        // BORROW SAFETY: Collect reactions first, then release the borrow
        let reactions: Vec<Rc<dyn AnyReaction>> = {
            let mut collected = Vec::new();
            current_source.for_each_reaction(&mut |reaction| {
                collected.push(reaction);
                true // continue iteration
            });
            collected
        };
        // Borrow on current_source.reactions is now released

        for reaction in reactions {
            let flags = reaction.flags();

            // A reaction that is mid-run never re-enters synchronously. An
            // effect writing one of its own dependencies parks itself in the
            // queue and re-runs in the next flush cycle; the flush cap catches
            // writers with no convergence guard.
            if (flags & REACTION_IS_UPDATING) != 0 {
                if (flags & EFFECT) != 0 && (flags & DIRTY) == 0 {
                    set_signal_status(&*reaction, current_status);
                    enqueue_reaction(reaction);
                }
                continue;
            }

            // Skip if already DIRTY (don't downgrade to MAYBE_DIRTY)
            let not_dirty = (flags & DIRTY) == 0;

            if not_dirty {
                set_signal_status(&*reaction, current_status);
            }

            // For computed signals, cascade MAYBE_DIRTY to their dependents
            if (flags & COMPUTED) != 0 {
                // A computed is also a source - push it to process its reactions
                if let Some(computed_as_source) = reaction.as_computed_source() {
                    stack.push((computed_as_source, MAYBE_DIRTY));
                }
            } else if not_dirty && (flags & EFFECT) != 0 {
                // For effects that just became dirty, schedule them for execution
                effects_to_schedule.push(reaction);
            }
        }
    }

    // Schedule all dirty effects
    for effect in effects_to_schedule {
        schedule_reaction(effect);
    }
}

// =============================================================================
// SET SIGNAL STATUS - Helper to update status flags
// =============================================================================

/// Set the status flags of a reaction (CLEAN, DIRTY, MAYBE_DIRTY).
///
/// Clears the existing status bits and sets the new status.
pub fn set_signal_status(target: &dyn AnyReaction, status: u32) {
    let new_flags = (target.flags() & STATUS_MASK) | status;
    target.set_flags(new_flags);
}

/// Set status on an AnySource (for consistency, same operation)
pub fn set_source_status(target: &dyn AnySource, status: u32) {
    let new_flags = (target.flags() & STATUS_MASK) | status;
    target.set_flags(new_flags);
}

// =============================================================================
// IS DIRTY - Check if a reaction needs to update
// =============================================================================

/// Check if a reaction is dirty and needs to be updated.
///
/// - DIRTY: definitely needs update
/// - MAYBE_DIRTY: an upstream computed may have changed; recompute those
///   deps and see whether any actually produced a new value
/// - CLEAN: no update needed
pub fn is_dirty(reaction: &dyn AnyReaction) -> bool {
    let flags = reaction.flags();

    // Definitely dirty
    if (flags & DIRTY) != 0 {
        return true;
    }

    // Not maybe dirty - definitely clean
    if (flags & MAYBE_DIRTY) == 0 {
        return false;
    }

    // MAYBE_DIRTY: resolve by updating computed deps and checking whether
    // any of them actually changed value.
    let mut changed = false;

    // Collect computed deps first to avoid holding the deps borrow while
    // updating (an update re-enters the graph).
    let mut computed_deps: Vec<Rc<dyn AnyReaction>> = Vec::new();
    reaction.for_each_dep(&mut |dep| {
        if dep.is_computed() {
            if let Some(computed) = dep.as_computed_reaction() {
                computed_deps.push(computed);
            }
        }
        true
    });

    for computed in computed_deps {
        if is_dirty(&*computed) && computed.update() {
            changed = true;
        }
    }

    if changed {
        reaction.mark_dirty();
        true
    } else {
        reaction.mark_clean();
        false
    }
}

// =============================================================================
// REMOVE REACTIONS - Clean up stale dependencies
// =============================================================================

/// Remove a reaction from its dependencies, starting at the given index.
///
/// When a reaction re-runs, its dependencies might change. This function
/// removes the reaction from dependencies that are no longer used.
///
/// # Borrow Safety
/// We iterate the reaction's deps (which requires borrowing) and then
/// modify each dep's reactions list. The collect-then-mutate pattern
/// ensures we don't hold conflicting borrows.
pub fn remove_reactions(reaction: Rc<dyn AnyReaction>, start: usize) {
    // Collect deps to remove from (starting at index 'start')
    let deps_to_remove: Vec<Rc<dyn AnySource>> = {
        let mut collected = Vec::new();
        let mut idx = 0;
        reaction.for_each_dep(&mut |dep| {
            if idx >= start {
                collected.push(dep.clone());
            }
            idx += 1;
            true
        });
        collected
    };
    // Borrow on reaction.deps is released

    // Now remove the reaction from each dep's reactions list
    for dep in deps_to_remove {
        dep.remove_reaction(&reaction);
    }

    // Truncate the reaction's deps list
    reaction.remove_deps_from(start);
}

// =============================================================================
// INSTALL DEPENDENCIES - Wire up deps after reaction execution
// =============================================================================

/// Install new dependencies after a reaction has run.
///
/// Called after a reaction's function executes. Takes the collected new_deps
/// and wires them up properly:
/// 1. Keep deps that were skipped (read in same order as last time)
/// 2. Add new deps
/// 3. Register the reaction with each new dep
pub fn install_dependencies(reaction: Rc<dyn AnyReaction>, skipped: usize) {
    with_context(|ctx| {
        // Take the new deps collected during execution
        let new_deps = ctx.swap_new_deps(Vec::new());

        if new_deps.is_empty() && skipped == 0 {
            // No dependencies at all
            reaction.clear_deps();
            return;
        }

        // Remove old deps that are no longer used (from skipped onwards)
        remove_reactions(reaction.clone(), skipped);

        // Add new deps to the reaction
        for dep in &new_deps {
            reaction.add_dep(dep.clone());
            dep.add_reaction(Rc::downgrade(&reaction));
        }
    });
}

// =============================================================================
// TESTS
// =============================================================================
