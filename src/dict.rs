//! Persistent ordered dictionary: a sorted sequence of `(key, value)`
//! items under the deterministic cross-type ordering of `value::order_key`.
//! Lookup is a binary search; mutation copies the item sequence into a new
//! atom.

use std::cmp::Ordering;

use atom::{Atom, AtomRef};
use error::{ErrorKind, Result};
use value::{Value, cmp_order};

/// The item sequence, sorted by `order_key`. Keys are unique under the
/// ordering combined with semantic equality.
#[derive(Debug)]
pub struct DictBody {
	pub(crate) items: Vec<(Value, Value)>,
}

/// An immutable, persistent ordered dictionary.
#[derive(Clone)]
pub struct Dictionary {
	root: AtomRef,
}

impl Dictionary {
	/// An empty dictionary.
	pub fn new() -> Dictionary {
		Dictionary {
			root: AtomRef::new(Atom::Dict(DictBody {
				items: Vec::new(),
			})),
		}
	}

	/// Wraps a persisted dictionary atom.
	pub fn from_atom(atom: AtomRef) -> Result<Dictionary> {
		let class = atom.class_name()?;
		if class != "Dictionary" {
			bail!(ErrorKind::Corruption(format!("expected a Dictionary atom, found {}", class)));
		}
		Ok(Dictionary {
			root: atom,
		})
	}

	/// The dictionary stored in `value`, which must be a dictionary atom.
	pub fn from_value(value: &Value) -> Result<Dictionary> {
		match value.atom() {
			Some(atom) => Dictionary::from_atom(atom.clone()),
			None => Err(ErrorKind::Corruption("value is not a dictionary atom".into()).into()),
		}
	}

	/// The underlying atom.
	pub fn as_atom(&self) -> &AtomRef {
		&self.root
	}

	fn with_items(items: Vec<(Value, Value)>) -> Dictionary {
		Dictionary {
			root: AtomRef::new(Atom::Dict(DictBody {
				items,
			})),
		}
	}

	/// Number of entries.
	pub fn count(&self) -> Result<u64> {
		Ok(self.root.body()?.as_dict()?.items.len() as u64)
	}

	/// Binary-searches for `key`. `Ok` carries the index of the matching
	/// entry, `Err` the insertion point.
	pub fn find_index(&self, key: &Value) -> Result<::std::result::Result<usize, usize>> {
		let body = self.root.body()?;
		let items = &body.as_dict()?.items;

		// lower bound of the order-equal run
		let mut low = 0;
		let mut high = items.len();
		while low < high {
			let mid = (low + high) / 2;
			match cmp_order(&items[mid].0, key) {
				Ordering::Less => low = mid + 1,
				_ => high = mid,
			}
		}

		// the run may hold several order-equal keys that are semantically
		// distinct; only a semantically equal entry is a match
		let mut index = low;
		while index < items.len() && cmp_order(&items[index].0, key) == Ordering::Equal {
			if items[index].0 == *key {
				return Ok(Ok(index));
			}
			index += 1;
		}

		Ok(Err(low))
	}

	/// The value stored under `key`, or the empty value.
	pub fn get_at(&self, key: &Value) -> Result<Value> {
		let body = self.root.body()?;
		let items = &body.as_dict()?.items;

		match self.find_index(key)? {
			Ok(index) => Ok(items[index].1.clone()),
			Err(_) => Ok(Value::None),
		}
	}

	/// Whether `key` is present.
	pub fn has(&self, key: &Value) -> Result<bool> {
		Ok(self.find_index(key)?.is_ok())
	}

	/// Inserts or replaces the value under `key`.
	pub fn set_at(&self, key: &Value, value: &Value) -> Result<Dictionary> {
		let body = self.root.body()?;
		let mut items = body.as_dict()?.items.clone();

		match self.find_index(key)? {
			Ok(index) => items[index] = (key.clone(), value.clone()),
			Err(index) => items.insert(index, (key.clone(), value.clone())),
		}
		Ok(Dictionary::with_items(items))
	}

	/// Removes the entry under `key`, if present.
	pub fn remove_at(&self, key: &Value) -> Result<Dictionary> {
		let index = match self.find_index(key)? {
			Ok(index) => index,
			Err(_) => return Ok(self.clone()),
		};

		let body = self.root.body()?;
		let mut items = body.as_dict()?.items.clone();
		items.remove(index);
		Ok(Dictionary::with_items(items))
	}

	/// Applies every entry of `other` in its iteration order; entries of
	/// `other` win on key clashes.
	pub fn merge(&self, other: &Dictionary) -> Result<Dictionary> {
		let mut merged = self.clone();
		for entry in other.iter()? {
			let (key, value) = entry?;
			merged = merged.set_at(&key, &value)?;
		}
		Ok(merged)
	}

	/// Iterator over entries in key order.
	pub fn iter(&self) -> Result<Iter> {
		let body = self.root.body()?;
		Ok(Iter {
			items: body.as_dict()?.items.clone().into_iter(),
		})
	}

	/// All keys, in order.
	pub fn keys(&self) -> Result<Vec<Value>> {
		self.iter()?.map(|entry| entry.map(|(key, _)| key)).collect()
	}
}

impl From<Dictionary> for Value {
	fn from(dict: Dictionary) -> Value {
		Value::Atom(dict.root)
	}
}

/// Key-ordered traversal over a snapshot of the entries.
pub struct Iter {
	items: ::std::vec::IntoIter<(Value, Value)>,
}

impl Iterator for Iter {
	type Item = Result<(Value, Value)>;

	fn next(&mut self) -> Option<Self::Item> {
		self.items.next().map(Ok)
	}
}

#[cfg(test)]
mod tests {
	use value::Value;
	use super::Dictionary;

	#[test]
	fn test_heterogeneous_keys_iterate_in_group_order() {
		let mut dict = Dictionary::new();
		for (key, value) in vec![
			(Value::Bool(true), 1i64),
			(Value::Int(0), 2),
			(Value::Float(1.5), 3),
			(Value::from("b"), 4),
			(Value::from("a"), 5),
		] {
			dict = dict.set_at(&key, &Value::Int(value)).unwrap();
		}

		assert_eq!(dict.keys().unwrap(), vec![
			Value::Int(0),
			Value::Float(1.5),
			Value::Bool(true),
			Value::from("a"),
			Value::from("b"),
		]);
	}

	#[test]
	fn test_set_replaces_and_remove_drops() {
		let dict = Dictionary::new()
			.set_at(&Value::from("k"), &Value::Int(1)).unwrap()
			.set_at(&Value::from("k"), &Value::Int(2)).unwrap();

		assert_eq!(dict.count().unwrap(), 1);
		assert_eq!(dict.get_at(&Value::from("k")).unwrap(), Value::Int(2));

		let dict = dict.remove_at(&Value::from("k")).unwrap();
		assert_eq!(dict.count().unwrap(), 0);
		assert_eq!(dict.get_at(&Value::from("k")).unwrap(), Value::None);

		// removing an absent key is a no-op
		let dict = dict.remove_at(&Value::from("gone")).unwrap();
		assert_eq!(dict.count().unwrap(), 0);
	}

	#[test]
	fn test_numeric_keys_are_semantically_unified() {
		let dict = Dictionary::new()
			.set_at(&Value::Int(1), &Value::from("int")).unwrap()
			.set_at(&Value::Float(1.0), &Value::from("float")).unwrap();

		// 1 and 1.0 are the same key
		assert_eq!(dict.count().unwrap(), 1);
		assert_eq!(dict.get_at(&Value::Int(1)).unwrap(), Value::from("float"));
	}

	#[test]
	fn test_find_index_reports_insertion_point() {
		let dict = Dictionary::new()
			.set_at(&Value::Int(10), &Value::None).unwrap()
			.set_at(&Value::Int(30), &Value::None).unwrap();

		assert_eq!(dict.find_index(&Value::Int(10)).unwrap(), Ok(0));
		assert_eq!(dict.find_index(&Value::Int(20)).unwrap(), Err(1));
		assert_eq!(dict.find_index(&Value::Int(40)).unwrap(), Err(2));
	}

	#[test]
	fn test_merge_later_wins() {
		let left = Dictionary::new()
			.set_at(&Value::from("a"), &Value::Int(1)).unwrap()
			.set_at(&Value::from("b"), &Value::Int(2)).unwrap();
		let right = Dictionary::new()
			.set_at(&Value::from("b"), &Value::Int(20)).unwrap()
			.set_at(&Value::from("c"), &Value::Int(30)).unwrap();

		let merged = left.merge(&right).unwrap();

		assert_eq!(merged.count().unwrap(), 3);
		assert_eq!(merged.get_at(&Value::from("a")).unwrap(), Value::Int(1));
		assert_eq!(merged.get_at(&Value::from("b")).unwrap(), Value::Int(20));
		assert_eq!(merged.get_at(&Value::from("c")).unwrap(), Value::Int(30));
	}

	quickcheck! {
		fn quickcheck_iteration_follows_the_cross_type_order(seeds: Vec<(u8, i64)>) -> bool {
			use std::cmp::Ordering;
			use value::cmp_order;

			let mut dict = Dictionary::new();
			for &(tag, seed) in &seeds {
				let key = match tag % 4 {
					0 => Value::Int(seed),
					1 => Value::Float(seed as f64 / 4.0),
					2 => Value::Bool(seed % 2 == 0),
					_ => Value::Str(format!("k{}", seed % 100)),
				};
				dict = dict.set_at(&key, &Value::Int(seed)).unwrap();
			}

			let keys = dict.keys().unwrap();
			keys.windows(2).all(|pair| {
				match cmp_order(&pair[0], &pair[1]) {
					Ordering::Less => true,
					// order-equal neighbours must be semantically distinct
					Ordering::Equal => pair[0] != pair[1],
					Ordering::Greater => false,
				}
			})
		}
	}

	#[test]
	fn test_mutations_share_nothing_backwards() {
		let dict = Dictionary::new().set_at(&Value::from("a"), &Value::Int(1)).unwrap();
		let _ = dict.set_at(&Value::from("b"), &Value::Int(2)).unwrap();
		let _ = dict.remove_at(&Value::from("a")).unwrap();

		assert_eq!(dict.count().unwrap(), 1);
		assert_eq!(dict.get_at(&Value::from("a")).unwrap(), Value::Int(1));
	}
}
