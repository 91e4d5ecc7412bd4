// ============================================================================
// cinder - Effect Scheduling
// The pending-effect queue and flush loop
// ============================================================================
//
// In a browser runtime effects would flush on a microtask. Here the queue is
// explicit: writes enqueue effects (insertion-ordered, deduplicated by
// reaction identity), and the flush either happens synchronously right after
// the write (FlushMode::Immediate, the default) or when the host calls
// tick()/flush_sync() (FlushMode::Deferred).
//
// Key functions:
// - schedule_reaction: enqueue an effect, flushing if appropriate
// - flush_sync: drain the queue with snapshot-then-clear-then-run cycles
// ============================================================================

use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::{with_context, FlushMode};
use crate::core::types::AnyReaction;
use crate::reactivity::tracking::is_dirty;

/// Maximum flush cycles before we consider it an infinite loop
pub const MAX_FLUSH_COUNT: u32 = 1000;

// =============================================================================
// SCHEDULE
// =============================================================================

/// Schedule a reaction for execution.
///
/// The queue is keyed by the Rc data pointer: re-enqueueing a pending effect
/// is a no-op, and within one flush effects run in first-enqueued order.
///
/// Outside a batch, in Immediate mode, this flushes synchronously. Inside a
/// batch or an ongoing flush it only enqueues; the batch exit or the current
/// flush loop picks the effect up.
pub fn schedule_reaction(reaction: Rc<dyn AnyReaction>) {
    let key = Rc::as_ptr(&reaction) as *const () as usize;
    with_context(|ctx| {
        ctx.enqueue_effect(key, Rc::downgrade(&reaction));
    });

    maybe_flush();
}

/// Enqueue a reaction without flushing.
///
/// Used for writes that land while the reaction itself is mid-run: the
/// effect parks itself in the queue and the next flush cycle (or the next
/// explicit flush) picks it up. Flushing here would re-enter the running
/// effect.
pub(crate) fn enqueue_reaction(reaction: Rc<dyn AnyReaction>) {
    let key = Rc::as_ptr(&reaction) as *const () as usize;
    with_context(|ctx| {
        ctx.enqueue_effect(key, Rc::downgrade(&reaction));
    });
}

/// Flush now if nothing is holding the queue (no batch, no ongoing flush,
/// Immediate mode).
pub fn maybe_flush() {
    let should_flush = with_context(|ctx| {
        !ctx.is_batching()
            && !ctx.is_flushing()
            && ctx.get_flush_mode() == FlushMode::Immediate
            && ctx.pending_count() > 0
    });

    if should_flush {
        flush_sync();
    }
}

// =============================================================================
// FLUSH
// =============================================================================

/// Synchronously drain the pending-effect queue.
///
/// Each cycle snapshots the queue, clears it, then runs the snapshot in
/// insertion order; effects enqueued while running land in the next cycle.
/// Effects that were disposed or became clean after enqueueing are skipped.
/// After MAX_FLUSH_COUNT cycles we assume effects keep triggering each other
/// and panic.
pub fn flush_sync() {
    let was_flushing = with_context(|ctx| ctx.set_flushing(true));
    if was_flushing {
        // Already inside a flush; that loop will drain anything we enqueued.
        return;
    }

    // Restore the flushing flag on all exit paths, including panics from
    // effect bodies.
    struct FlushGuard;
    impl Drop for FlushGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_flushing(false));
        }
    }
    let _guard = FlushGuard;

    let mut flush_count = 0u32;

    loop {
        flush_count += 1;
        if flush_count > MAX_FLUSH_COUNT {
            tracing::debug!(cycles = flush_count, "flush cycle cap reached");
            panic!(
                "Maximum update depth exceeded. This can happen when an effect \
                 continuously triggers itself. Check for effects that write to \
                 signals they depend on without proper guards."
            );
        }

        // Snapshot-then-clear: effects scheduled during this cycle go to the
        // next one.
        let pending = with_context(|ctx| ctx.take_pending_effects());

        if pending.is_empty() {
            break;
        }

        for reaction_weak in pending {
            if let Some(reaction) = reaction_weak.upgrade() {
                let flags = reaction.flags();

                // Skip destroyed effects (disposed after enqueue)
                if (flags & DESTROYED) != 0 {
                    continue;
                }

                // An effect can only be pending while mid-run if its own body
                // forced a flush; never re-enter it.
                if (flags & REACTION_IS_UPDATING) != 0 {
                    continue;
                }

                // Re-check dirtiness at run time
                if !is_dirty(&*reaction) {
                    continue;
                }

                if (flags & EFFECT) != 0 {
                    reaction.update();
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::set_flush_mode;
    use crate::primitives::effect::EffectInner;
    use std::cell::Cell;

    #[test]
    fn flush_sync_runs_pending_effects() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = EffectInner::new(
            EFFECT | USER_EFFECT,
            Some(Box::new(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                None
            })),
        );
        effect.mark_dirty();

        // Enqueue directly, bypassing the immediate flush
        let reaction: Rc<dyn AnyReaction> = effect.clone();
        let key = Rc::as_ptr(&reaction) as *const () as usize;
        with_context(|ctx| {
            ctx.enqueue_effect(key, Rc::downgrade(&reaction));
        });

        assert_eq!(run_count.get(), 0);

        flush_sync();

        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn queue_deduplicates_by_identity() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = EffectInner::new(
            EFFECT | USER_EFFECT,
            Some(Box::new(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                None
            })),
        );
        effect.mark_dirty();

        let reaction: Rc<dyn AnyReaction> = effect.clone();
        let key = Rc::as_ptr(&reaction) as *const () as usize;

        with_context(|ctx| {
            ctx.enqueue_effect(key, Rc::downgrade(&reaction));
            ctx.enqueue_effect(key, Rc::downgrade(&reaction));
            ctx.enqueue_effect(key, Rc::downgrade(&reaction));
            assert_eq!(ctx.pending_count(), 1);
        });

        flush_sync();

        // Ran once despite triple enqueue
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn destroyed_effect_is_skipped_at_flush_time() {
        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = EffectInner::new(
            EFFECT | USER_EFFECT,
            Some(Box::new(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                None
            })),
        );
        effect.mark_dirty();

        let reaction: Rc<dyn AnyReaction> = effect.clone();
        let key = Rc::as_ptr(&reaction) as *const () as usize;
        with_context(|ctx| {
            ctx.enqueue_effect(key, Rc::downgrade(&reaction));
        });

        // Dispose after enqueue
        effect.mark_destroyed();

        flush_sync();

        assert_eq!(run_count.get(), 0);
    }

    #[test]
    fn deferred_mode_only_enqueues() {
        let prev = set_flush_mode(FlushMode::Deferred);

        let run_count = Rc::new(Cell::new(0));
        let run_count_clone = run_count.clone();

        let effect = EffectInner::new(
            EFFECT | USER_EFFECT,
            Some(Box::new(move || {
                run_count_clone.set(run_count_clone.get() + 1);
                None
            })),
        );
        effect.mark_dirty();

        schedule_reaction(effect.clone());

        // Not flushed: deferred mode waits for an explicit flush
        assert_eq!(run_count.get(), 0);

        flush_sync();
        assert_eq!(run_count.get(), 1);

        set_flush_mode(prev);
    }

    #[test]
    fn max_flush_count_is_bounded() {
        assert_eq!(MAX_FLUSH_COUNT, 1000);
    }
}
