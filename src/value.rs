//! The value universe stored in persistent collections.
//!
//! Scalars are kept inline; strings persist through the literal pool and
//! composite values persist as atom references. Two orderings live here:
//!
//! - `order_key`, the deterministic cross-type ordering used by the ordered
//!   dictionary (group first, normalized value within the group),
//! - `stable_hash_32`, a 32-bit projection of SHA-256 over a canonical byte
//!   encoding, used by the hash dictionary, set and counted set.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use atom::AtomRef;

/// A single stored value.
#[derive(Debug, Clone)]
pub enum Value {
	/// The empty value. Out-of-range and absent-key reads return this.
	None,
	/// A boolean.
	Bool(bool),
	/// A signed integer.
	Int(i64),
	/// A double.
	Float(f64),
	/// A string. Persisted as a pointer to an interned literal.
	Str(String),
	/// A byte blob. Persisted base-64 encoded.
	Bytes(Vec<u8>),
	/// A timestamp with round-trip precision.
	DateTime(DateTime<Utc>),
	/// A duration with microsecond precision.
	Duration(Duration),
	/// A reference to another persisted atom.
	Atom(AtomRef),
}

impl Value {
	/// Returns true for `Value::None`.
	pub fn is_none(&self) -> bool {
		match *self {
			Value::None => true,
			_ => false,
		}
	}

	/// The atom reference, if this value is one.
	pub fn atom(&self) -> Option<&AtomRef> {
		match *self {
			Value::Atom(ref atom) => Some(atom),
			_ => None,
		}
	}

	/// The string content, if this value is one.
	pub fn as_str(&self) -> Option<&str> {
		match *self {
			Value::Str(ref s) => Some(s),
			_ => None,
		}
	}

	/// Textual form used when a value falls into the catch-all ordering
	/// group and by the canonical hash encoding.
	fn textual(&self) -> String {
		match *self {
			Value::None => "None".into(),
			Value::Bool(b) => b.to_string(),
			Value::Int(i) => i.to_string(),
			Value::Float(f) => f.to_string(),
			Value::Str(ref s) => s.clone(),
			Value::Bytes(ref b) => ::base64::encode(b),
			Value::DateTime(ref dt) => dt.to_rfc3339(),
			Value::Duration(ref d) => d.num_microseconds().unwrap_or(0).to_string(),
			Value::Atom(ref atom) => match atom.pointer() {
				Some(pointer) => format!("atom:{}", pointer),
				None => format!("atom:@{}", atom.identity()),
			},
		}
	}
}

impl PartialEq for Value {
	/// Semantic equality: numeric across `Int`/`Float`, pointer identity for
	/// pointed atoms, reference identity for unpointed ones.
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(&Value::None, &Value::None) => true,
			(&Value::Bool(a), &Value::Bool(b)) => a == b,
			(&Value::Int(a), &Value::Int(b)) => a == b,
			(&Value::Float(a), &Value::Float(b)) => a == b,
			(&Value::Int(a), &Value::Float(b)) |
			(&Value::Float(b), &Value::Int(a)) => cmp_int_float(a, b) == Ordering::Equal,
			(&Value::Str(ref a), &Value::Str(ref b)) => a == b,
			(&Value::Bytes(ref a), &Value::Bytes(ref b)) => a == b,
			(&Value::DateTime(ref a), &Value::DateTime(ref b)) => a == b,
			(&Value::Duration(ref a), &Value::Duration(ref b)) => a == b,
			(&Value::Atom(ref a), &Value::Atom(ref b)) => a == b,
			_ => false,
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Value {
		Value::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Value {
		Value::Int(i)
	}
}

impl From<f64> for Value {
	fn from(f: f64) -> Value {
		Value::Float(f)
	}
}

impl<'a> From<&'a str> for Value {
	fn from(s: &'a str) -> Value {
		Value::Str(s.into())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Value {
		Value::Str(s)
	}
}

impl From<Vec<u8>> for Value {
	fn from(b: Vec<u8>) -> Value {
		Value::Bytes(b)
	}
}

impl From<AtomRef> for Value {
	fn from(atom: AtomRef) -> Value {
		Value::Atom(atom)
	}
}

/// Normalized number: exact when the source was an integer, a double
/// otherwise. Mixed comparisons stay exact instead of rounding the integer.
#[derive(Debug, Clone, PartialEq)]
pub enum Num {
	Int(i64),
	Float(f64),
}

fn cmp_floats(a: f64, b: f64) -> Ordering {
	// NaN sorts after every number and equals itself, which keeps the
	// ordering total.
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => a.partial_cmp(&b)
			.expect("both operands are numbers; qed"),
	}
}

fn cmp_int_float(i: i64, f: f64) -> Ordering {
	if f.is_nan() {
		return Ordering::Less;
	}
	if f < i64::min_value() as f64 {
		return Ordering::Greater;
	}
	if f >= i64::max_value() as f64 {
		return Ordering::Less;
	}

	let trunc = f.trunc() as i64;
	match i.cmp(&trunc) {
		Ordering::Equal if f.fract() > 0.0 => Ordering::Less,
		Ordering::Equal if f.fract() < 0.0 => Ordering::Greater,
		ordering => ordering,
	}
}

impl Num {
	fn cmp(&self, other: &Num) -> Ordering {
		match (self, other) {
			(&Num::Int(a), &Num::Int(b)) => a.cmp(&b),
			(&Num::Float(a), &Num::Float(b)) => cmp_floats(a, b),
			(&Num::Int(a), &Num::Float(b)) => cmp_int_float(a, b),
			(&Num::Float(a), &Num::Int(b)) => cmp_int_float(b, a).reverse(),
		}
	}
}

/// Deterministic cross-type ordering key: a group tag plus the value
/// normalized within its group. Groups compare in the declared order;
/// booleans deliberately sort after numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
	Number(Num),
	Bool(bool),
	Str(String),
	Bytes(Vec<u8>),
}

impl OrderKey {
	fn group(&self) -> u8 {
		match *self {
			OrderKey::Number(_) => 0,
			OrderKey::Bool(_) => 1,
			OrderKey::Str(_) => 2,
			OrderKey::Bytes(_) => 3,
		}
	}

	pub fn cmp(&self, other: &OrderKey) -> Ordering {
		match (self, other) {
			(&OrderKey::Number(ref a), &OrderKey::Number(ref b)) => a.cmp(b),
			(&OrderKey::Bool(a), &OrderKey::Bool(b)) => a.cmp(&b),
			(&OrderKey::Str(ref a), &OrderKey::Str(ref b)) => a.cmp(b),
			(&OrderKey::Bytes(ref a), &OrderKey::Bytes(ref b)) => a.cmp(b),
			(a, b) => a.group().cmp(&b.group()),
		}
	}
}

/// The ordering key of a value.
pub fn order_key(value: &Value) -> OrderKey {
	match *value {
		Value::Bool(b) => OrderKey::Bool(b),
		Value::Int(i) => OrderKey::Number(Num::Int(i)),
		Value::Float(f) => OrderKey::Number(Num::Float(f)),
		Value::Str(ref s) => OrderKey::Str(s.clone()),
		Value::Bytes(ref b) => OrderKey::Bytes(b.clone()),
		ref other => OrderKey::Str(other.textual()),
	}
}

/// Compares two values under the cross-type ordering.
pub fn cmp_order(a: &Value, b: &Value) -> Ordering {
	order_key(a).cmp(&order_key(b))
}

/// 32-bit projection of SHA-256 over the canonical byte encoding of a
/// value. Collisions are expected and chained by the callers.
pub fn stable_hash_32(value: &Value) -> i32 {
	let mut hasher = Sha256::new();

	match *value {
		Value::Atom(ref atom) => match atom.pointer() {
			Some(pointer) => hasher.update(&pointer.canonical_bytes()),
			None => {
				hasher.update(b"id:");
				hasher.update(&atom.identity().to_le_bytes());
			},
		},
		Value::Str(ref s) => hasher.update(s.as_bytes()),
		Value::Bytes(ref b) => {
			hasher.update(b"bytes:");
			hasher.update(b);
		},
		ref other => {
			let tag = match *other {
				Value::None => "none",
				Value::Bool(_) => "bool",
				Value::Int(_) => "int",
				Value::Float(_) => "float",
				Value::DateTime(_) => "datetime",
				Value::Duration(_) => "duration",
				_ => unreachable!("atoms, strings and bytes are handled above; qed"),
			};
			hasher.update(tag.as_bytes());
			hasher.update(b":");
			hasher.update(other.textual().as_bytes());
		},
	}

	let digest = hasher.finalize();
	i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}
