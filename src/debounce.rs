use std::time::{Duration, Instant};

/// A value that only takes effect after it stopped changing for `delay`.
///
/// Poll it from the event loop tick; [`Debounced::poll`] returns `true` when
/// the pending value was applied.
#[derive(Debug, Clone)]
pub struct Debounced<T> {
  current: T,
  pending: Option<(T, Instant)>,
  delay: Duration,
}

impl<T: Clone + PartialEq> Debounced<T> {
  pub fn new(initial: T, delay: Duration) -> Self {
    Self {
      current: initial,
      pending: None,
      delay,
    }
  }

  /// The applied value.
  pub fn value(&self) -> &T {
    &self.current
  }

  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  pub fn set(&mut self, value: T) {
    self.set_at(value, Instant::now());
  }

  pub fn set_at(&mut self, value: T, now: Instant) {
    if self.pending.is_none() && value == self.current {
      return;
    }
    self.pending = Some((value, now));
  }

  /// Apply immediately, skipping the delay.
  pub fn flush(&mut self) -> bool {
    match self.pending.take() {
      Some((value, _)) if value != self.current => {
        self.current = value;
        true
      }
      _ => false,
    }
  }

  pub fn poll(&mut self) -> bool {
    self.poll_at(Instant::now())
  }

  pub fn poll_at(&mut self, now: Instant) -> bool {
    match &self.pending {
      Some((_, changed)) if now.duration_since(*changed) >= self.delay => self.flush(),
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_applies_after_quiet_period() {
    let start = Instant::now();
    let mut search = Debounced::new(String::new(), Duration::from_millis(300));

    search.set_at("v".into(), start);
    search.set_at("vp".into(), start + Duration::from_millis(100));
    search.set_at("vpn".into(), start + Duration::from_millis(200));

    assert!(!search.poll_at(start + Duration::from_millis(400)));
    assert_eq!(search.value(), "");
    assert!(search.poll_at(start + Duration::from_millis(500)));
    assert_eq!(search.value(), "vpn");
    assert!(!search.is_pending());
  }

  #[test]
  fn test_returning_to_current_value_is_not_a_change() {
    let start = Instant::now();
    let mut search = Debounced::new("a".to_string(), Duration::from_millis(300));

    search.set_at("ab".into(), start);
    search.set_at("a".into(), start + Duration::from_millis(10));

    assert!(!search.poll_at(start + Duration::from_secs(1)));
    assert_eq!(search.value(), "a");
  }

  #[test]
  fn test_flush_skips_delay() {
    let mut search = Debounced::new(String::new(), Duration::from_secs(60));
    search.set("printer".into());
    assert!(search.flush());
    assert_eq!(search.value(), "printer");
  }
}
