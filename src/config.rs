/// Tunables for a [`Heap`](crate::Heap).
///
/// ```rust
/// use tagalloc::HeapConfig;
///
/// let config = HeapConfig::default().with_verify(true).with_region_limit(1 << 20);
/// assert!(config.verify);
/// assert_eq!(config.region_limit, Some(1 << 20));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapConfig {
  /// Run the consistency checker after every `allocate`/`release` and
  /// `debug_assert!` that it found nothing. Ignored in release builds.
  pub verify: bool,
  /// Growth that would take the region past this many bytes fails as if the
  /// backing store were exhausted.
  pub region_limit: Option<usize>,
}

impl HeapConfig {
  pub const fn with_verify(
    mut self,
    verify: bool,
  ) -> Self {
    self.verify = verify;
    self
  }

  pub const fn with_region_limit(
    mut self,
    limit: usize,
  ) -> Self {
    self.region_limit = Some(limit);
    self
  }
}
