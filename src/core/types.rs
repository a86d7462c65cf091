/*!
 * Core Types
 * Address arithmetic used across the crate
 */

/// Round `value` up to the next multiple of `align`.
///
/// `align` must be a power of two. Returns `None` on overflow.
#[inline]
pub fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Whether the half-open ranges `[a, a + a_len)` and `[b, b + b_len)` overlap
#[inline]
pub fn ranges_overlap(a: usize, a_len: usize, b: usize, b_len: usize) -> bool {
    a_len != 0 && b_len != 0 && a < b.saturating_add(b_len) && b < a.saturating_add(a_len)
}
