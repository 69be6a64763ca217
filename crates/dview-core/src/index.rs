#![forbid(unsafe_code)]

//! Position resolution for ordered collections.
//!
//! Positions are 0-based. Negative positions count from the end (`-1` is the
//! last element); magnitudes larger than the length wrap around modulo the
//! length. Every function here is pure, so the observable list and the
//! derived entry list share exactly the same arithmetic.

/// Resolve `index` to an in-range position, or `None`.
///
/// Non-negative indices must be `< len`; negative ones wrap from the end.
#[must_use]
pub fn resolve(index: isize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if index >= 0 {
        let index = index.unsigned_abs();
        return (index < len).then_some(index);
    }
    Some(index.rem_euclid(len as isize) as usize)
}

/// Insertion position for an add: `None` and anything past the end append.
#[must_use]
pub fn insertion(index: Option<isize>, len: usize) -> usize {
    match index {
        _ if len == 0 => 0,
        None => len,
        Some(i) if i >= 0 => i.unsigned_abs().min(len),
        Some(i) => resolve(i, len).unwrap_or(len),
    }
}

/// Resolve a move from `old` to `new`.
///
/// Returns `None` when the move is a no-op: fewer than two elements, `old`
/// out of range, or both resolving to the same position. A `new` past the
/// end clamps to the last position.
#[must_use]
pub fn movement(old: isize, new: isize, len: usize) -> Option<(usize, usize)> {
    if len < 2 {
        return None;
    }
    let old = resolve(old, len)?;
    let new = if new >= 0 && new.unsigned_abs() >= len {
        len - 1
    } else {
        resolve(new, len)?
    };
    (old != new).then_some((old, new))
}

/// Resolve a batch of removal positions against the length *before* any
/// removal, dropping invalid and duplicate entries.
///
/// The result is sorted highest first, so removing in order never shifts a
/// position that is still pending.
#[must_use]
pub fn removal_order(indices: &[isize], len: usize) -> Vec<usize> {
    let mut resolved: Vec<usize> = indices.iter().filter_map(|&i| resolve(i, len)).collect();
    resolved.sort_unstable_by(|a, b| b.cmp(a));
    resolved.dedup();
    resolved
}
