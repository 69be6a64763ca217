//! Property-based invariant tests for position resolution.
//!
//! 1. `resolve` never yields an out-of-range position
//! 2. Negative positions agree with counting from the end
//! 3. `insertion` always yields a position in `0..=len`
//! 4. `movement` results are in range and distinct
//! 5. `removal_order` is strictly descending and in range
//! 6. Applying `removal_order` to a vector removes exactly the named slots

use dview_core::index::{insertion, movement, removal_order, resolve};
use proptest::prelude::*;

// ═════════════════════════════════════════════════════════════════════════
// 1–2. resolve
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn resolve_in_range(index in -50isize..50, len in 0usize..20) {
        if let Some(resolved) = resolve(index, len) {
            prop_assert!(resolved < len);
        } else {
            prop_assert!(len == 0 || index >= len as isize);
        }
    }

    #[test]
    fn negative_counts_from_end(back in 1usize..20, len in 1usize..20) {
        prop_assume!(back <= len);
        prop_assert_eq!(resolve(-(back as isize), len), Some(len - back));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. insertion
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn insertion_in_bounds(index in proptest::option::of(-50isize..50), len in 0usize..20) {
        prop_assert!(insertion(index, len) <= len);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. movement
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn movement_in_range(old in -30isize..30, new in -30isize..30, len in 0usize..15) {
        if let Some((from, to)) = movement(old, new, len) {
            prop_assert!(from < len);
            prop_assert!(to < len);
            prop_assert_ne!(from, to);
            prop_assert!(len >= 2);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5–6. removal_order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn removal_order_descending(
        indices in proptest::collection::vec(-30isize..30, 0..10),
        len in 0usize..15,
    ) {
        let order = removal_order(&indices, len);
        prop_assert!(order.windows(2).all(|w| w[0] > w[1]));
        prop_assert!(order.iter().all(|&i| i < len));
    }

    #[test]
    fn removal_order_removes_named_slots(
        indices in proptest::collection::vec(-30isize..30, 0..10),
        len in 0usize..15,
    ) {
        let mut items: Vec<usize> = (0..len).collect();
        let order = removal_order(&indices, len);
        for &i in &order {
            items.remove(i);
        }

        let named: Vec<usize> = indices.iter().filter_map(|&i| resolve(i, len)).collect();
        prop_assert_eq!(items.len(), len - order.len());
        prop_assert!(items.iter().all(|i| !named.contains(i)));
    }
}
