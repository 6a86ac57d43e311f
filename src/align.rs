/// Rounds `$value` up to the next multiple of `$unit`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(13, 16), 16);
/// assert_eq!(align!(32, 16), 32);
/// assert_eq!(align!(33, 8), 40);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr, $unit:expr) => {
    ($value + $unit - 1) & !($unit - 1)
  };
}

/// Rounds `value` up to a multiple of [`ALIGNMENT`](crate::ALIGNMENT).
pub const fn align_up(value: usize) -> usize {
  align!(value, crate::ALIGNMENT)
}

/// Like [`align_up`], but `None` when the rounded value does not fit in `usize`.
pub const fn checked_align_up(value: usize) -> Option<usize> {
  match value.checked_add(crate::ALIGNMENT - 1) {
    Some(padded) => Some(padded & !(crate::ALIGNMENT - 1)),
    None => None,
  }
}
