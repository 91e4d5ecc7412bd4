// ============================================================================
// cinder - Constants
// Flag constants for reactive graph node state
// ============================================================================

// =============================================================================
// NODE TYPE FLAGS
// =============================================================================

/// Source signal (basic reactive value)
pub const SOURCE: u32 = 1 << 0;

/// Node is a computed value (both source and reaction)
pub const COMPUTED: u32 = 1 << 1;

/// Node is an effect
pub const EFFECT: u32 = 1 << 2;

/// Effect updates the DOM - created by the template binder
pub const RENDER_EFFECT: u32 = 1 << 3;

/// Effect is a root effect (created via effect_root())
pub const ROOT_EFFECT: u32 = 1 << 4;

/// Effect is a user effect (created via effect())
pub const USER_EFFECT: u32 = 1 << 5;

// =============================================================================
// STATE FLAGS
// =============================================================================

/// Node is clean (up-to-date)
pub const CLEAN: u32 = 1 << 10;

/// Node is dirty (definitely needs update)
pub const DIRTY: u32 = 1 << 11;

/// Node might be dirty (needs to check dependencies)
pub const MAYBE_DIRTY: u32 = 1 << 12;

/// Reaction is currently executing its function
pub const REACTION_IS_UPDATING: u32 = 1 << 13;

/// Effect has been destroyed
pub const DESTROYED: u32 = 1 << 14;

/// Effect has run at least once
pub const EFFECT_RAN: u32 = 1 << 15;

/// Effect is preserved (not destroyed with parent)
pub const EFFECT_PRESERVED: u32 = 1 << 16;

// =============================================================================
// STATUS MASK (for clearing status bits)
// =============================================================================

/// Mask to clear all status bits (CLEAN, DIRTY, MAYBE_DIRTY)
pub const STATUS_MASK: u32 = !(DIRTY | MAYBE_DIRTY | CLEAN);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_distinct() {
        let all_flags = [
            SOURCE,
            COMPUTED,
            EFFECT,
            RENDER_EFFECT,
            ROOT_EFFECT,
            USER_EFFECT,
            CLEAN,
            DIRTY,
            MAYBE_DIRTY,
            REACTION_IS_UPDATING,
            DESTROYED,
            EFFECT_RAN,
            EFFECT_PRESERVED,
        ];

        for (i, &a) in all_flags.iter().enumerate() {
            for (j, &b) in all_flags.iter().enumerate() {
                if i != j {
                    assert_eq!(
                        a & b,
                        0,
                        "Flags at index {} and {} overlap: {:b} & {:b}",
                        i,
                        j,
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn status_mask_clears_status_bits() {
        let flags = COMPUTED | DIRTY | EFFECT_RAN;
        let cleared = flags & STATUS_MASK;

        // Should clear DIRTY but keep COMPUTED and EFFECT_RAN
        assert_eq!(cleared & DIRTY, 0);
        assert_ne!(cleared & COMPUTED, 0);
        assert_ne!(cleared & EFFECT_RAN, 0);
    }

    #[test]
    fn can_check_and_modify_flags() {
        let mut flags = SOURCE | CLEAN;

        assert_ne!(flags & SOURCE, 0);
        assert_ne!(flags & CLEAN, 0);
        assert_eq!(flags & DIRTY, 0);

        // Clear CLEAN, set DIRTY
        flags = (flags & STATUS_MASK) | DIRTY;

        assert_ne!(flags & SOURCE, 0);
        assert_eq!(flags & CLEAN, 0);
        assert_ne!(flags & DIRTY, 0);
    }
}
