//! Persistent counted set (multiset).
//!
//! Four ordered dictionaries keyed by the element's stable hash: the unique
//! items, their counts, and staged mirrors for elements added since the
//! last save. Iteration yields unique items exactly once; the 0→1 and 1→0
//! count transitions are the membership changes secondary indexes hear
//! about.

use std::sync::Arc;

use atom::{Atom, AtomRef, SaveContext};
use dict::Dictionary;
use error::{ErrorKind, Result};
use index::Indexes;
use set::SetOp;
use value::{Value, stable_hash_32};

/// Persisted state. The staged dictionaries never reach disk; a save folds
/// them away after re-keying freshly pointered members.
#[derive(Debug)]
pub struct CountedSetBody {
	pub(crate) items: AtomRef,
	pub(crate) counts: AtomRef,
	pub(crate) staged_items: AtomRef,
	pub(crate) staged_counts: AtomRef,
}

impl CountedSetBody {
	/// Saves staged member atoms and re-keys their entries under the
	/// pointer-based hash, then drops the staged mirrors. The result is
	/// what actually gets serialized.
	pub(crate) fn fold(&self, ctx: &SaveContext) -> Result<CountedSetBody> {
		let mut items = Dictionary::from_atom(self.items.clone())?;
		let mut counts = Dictionary::from_atom(self.counts.clone())?;
		let staged_items = Dictionary::from_atom(self.staged_items.clone())?;

		for entry in staged_items.iter()? {
			let (key, item) = entry?;
			let atom = match item.atom() {
				Some(atom) if atom.pointer().is_none() => atom.clone(),
				_ => continue,
			};
			atom.save(ctx)?;

			let rekeyed = Value::Int(stable_hash_32(&item) as i64);
			if rekeyed != key {
				let count = counts.get_at(&key)?;
				items = items.remove_at(&key)?.set_at(&rekeyed, &item)?;
				counts = counts.remove_at(&key)?.set_at(&rekeyed, &count)?;
			}
		}

		Ok(CountedSetBody {
			items: items.as_atom().clone(),
			counts: counts.as_atom().clone(),
			staged_items: Dictionary::new().as_atom().clone(),
			staged_counts: Dictionary::new().as_atom().clone(),
		})
	}
}

fn hash_key(item: &Value) -> Value {
	Value::Int(stable_hash_32(item) as i64)
}

fn count_of(value: &Value) -> Result<i64> {
	match *value {
		Value::None => Ok(0),
		Value::Int(count) => Ok(count),
		ref other => Err(ErrorKind::Corruption(format!(
			"count entry holds {:?} instead of an integer", other
		)).into()),
	}
}

/// An immutable, persistent multiset.
#[derive(Clone, Debug)]
pub struct CountedSet {
	root: AtomRef,
	log: Vec<SetOp>,
	indexes: Option<Arc<Indexes>>,
}

impl CountedSet {
	/// An empty counted set.
	pub fn new() -> CountedSet {
		CountedSet::from_body(CountedSetBody {
			items: Dictionary::new().as_atom().clone(),
			counts: Dictionary::new().as_atom().clone(),
			staged_items: Dictionary::new().as_atom().clone(),
			staged_counts: Dictionary::new().as_atom().clone(),
		}, Vec::new(), None)
	}

	fn from_body(body: CountedSetBody, log: Vec<SetOp>, indexes: Option<Arc<Indexes>>) -> CountedSet {
		CountedSet {
			root: AtomRef::new(Atom::CountedSet(body)),
			log,
			indexes,
		}
	}

	/// Wraps a persisted counted-set atom. The log starts empty.
	pub fn from_atom(atom: AtomRef) -> Result<CountedSet> {
		let class = atom.class_name()?;
		if class != "CountedSet" {
			bail!(ErrorKind::Corruption(format!("expected a CountedSet atom, found {}", class)));
		}
		Ok(CountedSet {
			root: atom,
			log: Vec::new(),
			indexes: None,
		})
	}

	/// The counted set stored in `value`, which must be a counted-set atom.
	pub fn from_value(value: &Value) -> Result<CountedSet> {
		match value.atom() {
			Some(atom) => CountedSet::from_atom(atom.clone()),
			None => Err(ErrorKind::Corruption("value is not a counted-set atom".into()).into()),
		}
	}

	/// Attaches secondary indexes notified on the 0→1 and 1→0 transitions.
	pub fn with_indexes(mut self, indexes: Arc<Indexes>) -> CountedSet {
		self.indexes = Some(indexes);
		self
	}

	/// The underlying atom.
	pub fn as_atom(&self) -> &AtomRef {
		&self.root
	}

	/// The recorded operations, oldest first.
	pub fn log(&self) -> &[SetOp] {
		&self.log
	}

	fn dicts(&self) -> Result<(Dictionary, Dictionary, Dictionary, Dictionary)> {
		let body = self.root.body()?;
		let body = body.as_counted_set()?;
		Ok((
			Dictionary::from_atom(body.items.clone())?,
			Dictionary::from_atom(body.counts.clone())?,
			Dictionary::from_atom(body.staged_items.clone())?,
			Dictionary::from_atom(body.staged_counts.clone())?,
		))
	}

	fn rebuild(
		&self,
		items: Dictionary,
		counts: Dictionary,
		staged_items: Dictionary,
		staged_counts: Dictionary,
		op: SetOp,
	) -> CountedSet {
		let mut log = self.log.clone();
		log.push(op);
		CountedSet::from_body(CountedSetBody {
			items: items.as_atom().clone(),
			counts: counts.as_atom().clone(),
			staged_items: staged_items.as_atom().clone(),
			staged_counts: staged_counts.as_atom().clone(),
		}, log, self.indexes.clone())
	}

	/// Adds one occurrence of `item`.
	pub fn add(&self, item: &Value) -> Result<CountedSet> {
		let (items, counts, staged_items, staged_counts) = self.dicts()?;
		let key = hash_key(item);
		let op = SetOp::Add(item.clone());

		let staged_here = !staged_items.get_at(&key)?.is_none();
		let count = count_of(&counts.get_at(&key)?)?;

		if count > 0 && !staged_here {
			let counts = counts.set_at(&key, &Value::Int(count + 1))?;
			return Ok(self.rebuild(items, counts, staged_items, staged_counts, op));
		}

		if staged_here {
			let staged_count = count_of(&staged_counts.get_at(&key)?)? + 1;
			let counts = counts.set_at(&key, &Value::Int(staged_count))?;
			let staged_counts = staged_counts.set_at(&key, &Value::Int(staged_count))?;
			return Ok(self.rebuild(items, counts, staged_items, staged_counts, op));
		}

		// first occurrence: this is the membership transition
		if let Some(ref indexes) = self.indexes {
			indexes.add(item);
		}
		let items = items.set_at(&key, item)?;
		let counts = counts.set_at(&key, &Value::Int(1))?;
		let staged_items = staged_items.set_at(&key, item)?;
		let staged_counts = staged_counts.set_at(&key, &Value::Int(1))?;
		Ok(self.rebuild(items, counts, staged_items, staged_counts, op))
	}

	fn apply_remove(&self, item: &Value, strict: bool) -> Result<CountedSet> {
		let (items, counts, staged_items, staged_counts) = self.dicts()?;
		let key = hash_key(item);
		let op = SetOp::Remove(item.clone());

		let count = count_of(&counts.get_at(&key)?)?;
		if count == 0 {
			if strict {
				bail!(ErrorKind::Concurrency(format!(
					"cannot replay removal of {:?}: no occurrences remain", item
				)));
			}
			return Ok(self.rebuild(items, counts, staged_items, staged_counts, op));
		}

		if count == 1 {
			// last occurrence: the membership transition
			if let Some(ref indexes) = self.indexes {
				indexes.remove(item);
			}
			let items = items.remove_at(&key)?;
			let counts = counts.remove_at(&key)?;
			let staged_items = staged_items.remove_at(&key)?;
			let staged_counts = staged_counts.remove_at(&key)?;
			return Ok(self.rebuild(items, counts, staged_items, staged_counts, op));
		}

		let counts = counts.set_at(&key, &Value::Int(count - 1))?;
		let staged_counts = if staged_items.get_at(&key)?.is_none() {
			staged_counts
		} else {
			staged_counts.set_at(&key, &Value::Int(count - 1))?
		};
		Ok(self.rebuild(items, counts, staged_items, staged_counts, op))
	}

	/// Removes one occurrence of `item`. Removing an absent item is a
	/// no-op (but still logged).
	pub fn remove(&self, item: &Value) -> Result<CountedSet> {
		self.apply_remove(item, false)
	}

	/// Occurrences of `item`.
	pub fn get_count(&self, item: &Value) -> Result<u64> {
		let (_, counts, _, _) = self.dicts()?;
		Ok(count_of(&counts.get_at(&hash_key(item))?)? as u64)
	}

	/// Whether at least one occurrence of `item` is present.
	pub fn has(&self, item: &Value) -> Result<bool> {
		Ok(self.get_count(item)? > 0)
	}

	/// Number of distinct items.
	pub fn unique_count(&self) -> Result<u64> {
		let (items, _, _, _) = self.dicts()?;
		items.count()
	}

	/// Total number of occurrences.
	pub fn total_count(&self) -> Result<u64> {
		let (_, counts, _, _) = self.dicts()?;
		let mut total = 0u64;
		for entry in counts.iter()? {
			let (_, count) = entry?;
			total += count_of(&count)? as u64;
		}
		Ok(total)
	}

	/// Every distinct item, exactly once, in hash-key order.
	pub fn items(&self) -> Result<Vec<Value>> {
		let (items, _, _, _) = self.dicts()?;
		items.iter()?.map(|entry| entry.map(|(_, item)| item)).collect()
	}

	/// Rebases this set's operation log onto `current`, a newer state of
	/// the same set. A removal that no longer finds an occurrence is a
	/// contradiction and fails with a concurrency error.
	pub fn concurrent_update(&self, current: &CountedSet) -> Result<CountedSet> {
		let mut result = current.clone();
		for op in &self.log {
			result = match *op {
				SetOp::Add(ref item) => result.add(item)?,
				SetOp::Remove(ref item) => result.apply_remove(item, true)?,
			};
		}
		Ok(result)
	}
}

impl From<CountedSet> for Value {
	fn from(set: CountedSet) -> Value {
		Value::Atom(set.root)
	}
}

#[cfg(test)]
mod tests {
	use error::ErrorKind;
	use value::Value;
	use super::CountedSet;

	fn build(items: &[&str]) -> CountedSet {
		let mut set = CountedSet::new();
		for item in items {
			set = set.add(&Value::from(*item)).unwrap();
		}
		set
	}

	#[test]
	fn test_counts() {
		let set = build(&["a", "b", "a", "a", "b"]);

		assert_eq!(set.unique_count().unwrap(), 2);
		assert_eq!(set.total_count().unwrap(), 5);
		assert_eq!(set.get_count(&Value::from("a")).unwrap(), 3);
		assert_eq!(set.get_count(&Value::from("b")).unwrap(), 2);
		assert_eq!(set.get_count(&Value::from("c")).unwrap(), 0);

		let mut items: Vec<String> = set.items().unwrap().into_iter()
			.map(|item| item.as_str().unwrap().to_owned())
			.collect();
		items.sort();
		assert_eq!(items, vec!["a", "b"]);
	}

	#[test]
	fn test_remove_decrements_and_drops() {
		let set = build(&["a", "a", "b"]);

		let set = set.remove(&Value::from("a")).unwrap();
		assert_eq!(set.get_count(&Value::from("a")).unwrap(), 1);
		assert_eq!(set.unique_count().unwrap(), 2);

		let set = set.remove(&Value::from("a")).unwrap();
		assert_eq!(set.get_count(&Value::from("a")).unwrap(), 0);
		assert_eq!(set.unique_count().unwrap(), 1);
		assert!(!set.has(&Value::from("a")).unwrap());

		// lenient when applied directly
		let set = set.remove(&Value::from("a")).unwrap();
		assert_eq!(set.total_count().unwrap(), 1);
	}

	#[test]
	fn test_mutations_leave_the_original_untouched() {
		let set = build(&["a", "a"]);
		let _ = set.add(&Value::from("a")).unwrap();
		let _ = set.remove(&Value::from("a")).unwrap();

		assert_eq!(set.get_count(&Value::from("a")).unwrap(), 2);
	}

	#[test]
	fn test_concurrent_update_replays_counts() {
		let base = build(&["a"]);
		let first = base.add(&Value::from("a")).unwrap();
		let second = base.add(&Value::from("b")).unwrap();

		let merged = second.concurrent_update(&first).unwrap();
		// `second`'s log re-adds "a" once and adds "b"
		assert_eq!(merged.get_count(&Value::from("a")).unwrap(), 3);
		assert_eq!(merged.get_count(&Value::from("b")).unwrap(), 1);
	}

	#[test]
	fn test_concurrent_update_rejects_contradictory_removal() {
		// the log ends with a removal that found nothing even directly
		let set = CountedSet::new()
			.add(&Value::from("a")).unwrap()
			.remove(&Value::from("a")).unwrap()
			.remove(&Value::from("a")).unwrap();

		let err = set.concurrent_update(&CountedSet::new()).unwrap_err();
		assert!(matches!(*err.kind(), ErrorKind::Concurrency(_)));
	}
}
