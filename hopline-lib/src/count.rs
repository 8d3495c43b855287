use std::{
  sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
  },
  time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Clone, Default)]
/// Counter for serving connections
pub struct RequestCount(Arc<AtomicUsize>);

impl RequestCount {
  pub fn current(&self) -> usize {
    self.0.load(Ordering::Relaxed)
  }

  pub fn increment(&self) -> usize {
    self.0.fetch_add(1, Ordering::Relaxed)
  }

  /// Decrements the counter without going below zero, returning the previous value
  pub fn decrement(&self) -> usize {
    self
      .0
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| count.checked_sub(1))
      .unwrap_or(0)
  }
}

#[derive(Debug, Clone)]
/// Process-wide request id generator.
/// Ids increase monotonically from the wall clock milliseconds at creation.
pub struct RequestIdGenerator(Arc<AtomicU64>);

impl RequestIdGenerator {
  pub fn starting_at(seed: u64) -> Self {
    Self(Arc::new(AtomicU64::new(seed)))
  }

  pub fn next_id(&self) -> u64 {
    self.0.fetch_add(1, Ordering::Relaxed)
  }
}

impl Default for RequestIdGenerator {
  fn default() -> Self {
    let seed = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_millis() as u64)
      .unwrap_or_default();
    Self::starting_at(seed)
  }
}
