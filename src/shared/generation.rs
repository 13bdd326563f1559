//! Generation counters for cooperative cancellation
//!
//! An async load captures the live generation before it starts; navigating
//! away bumps the counter, and a stale result is discarded on arrival
//! instead of clobbering the current context.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-context epoch number
#[derive(Debug, Default)]
pub struct GenerationCounter {
	current: AtomicU64,
}

impl GenerationCounter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Capture the live generation before starting an async load
	pub fn current(&self) -> u64 {
		self.current.load(Ordering::Acquire)
	}

	/// Invalidate every in-flight load for this context
	pub fn bump(&self) -> u64 {
		self.current.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Whether a captured generation is still the live one
	pub fn is_current(&self, captured: u64) -> bool {
		self.current() == captured
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn captured_generation_goes_stale_on_bump() {
		let counter = GenerationCounter::new();
		let captured = counter.current();
		assert!(counter.is_current(captured));

		counter.bump();
		assert!(!counter.is_current(captured));
		assert!(counter.is_current(counter.current()));
	}

	#[test]
	fn bump_is_monotonic() {
		let counter = GenerationCounter::new();
		let a = counter.bump();
		let b = counter.bump();
		assert!(b > a);
	}
}
