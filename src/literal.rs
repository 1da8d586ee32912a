//! Interned string literals.
//!
//! Atoms never store strings inline; a string field persists as a pointer
//! to a literal atom, deduplicated process-wide through this pool.

use std::collections::HashMap;

use parking_lot::Mutex;

use atom::{Atom, AtomRef};

/// Process-wide string → literal-atom map.
pub struct LiteralPool {
	inner: Mutex<HashMap<String, AtomRef>>,
}

impl LiteralPool {
	pub fn new() -> LiteralPool {
		LiteralPool {
			inner: Mutex::new(HashMap::new()),
		}
	}

	/// The literal atom for `s`, creating an unpointed one on first sight.
	pub fn intern(&self, s: &str) -> AtomRef {
		let mut inner = self.inner.lock();
		if let Some(literal) = inner.get(s) {
			return literal.clone();
		}

		let literal = AtomRef::new(Atom::Literal(s.to_owned()));
		inner.insert(s.to_owned(), literal.clone());
		literal
	}

	/// Seeds the pool with an already-persisted literal.
	pub fn adopt(&self, s: &str, literal: AtomRef) {
		self.inner.lock().entry(s.to_owned()).or_insert(literal);
	}

	/// Drops every interned entry.
	pub fn clear(&self) {
		self.inner.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::LiteralPool;

	#[test]
	fn test_interning_is_idempotent() {
		let pool = LiteralPool::new();
		let a = pool.intern("hello");
		let b = pool.intern("hello");
		let c = pool.intern("world");

		assert_eq!(a.identity(), b.identity());
		assert_ne!(a.identity(), c.identity());
	}
}
