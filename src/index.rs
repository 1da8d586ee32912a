//! Secondary-index hook points.
//!
//! Collections report membership transitions here: list insert/remove and
//! the counted set's 0→1 and 1→0 count changes. Index maintenance itself is
//! not implemented; the hooks only fix the call sites.

use value::Value;

/// An attached secondary-index set. Does nothing yet.
#[derive(Debug, Default)]
pub struct Indexes;

impl Indexes {
	/// A value became a member.
	pub fn add(&self, _value: &Value) {}

	/// A value is no longer a member.
	pub fn remove(&self, _value: &Value) {}
}
