//! Persistent set with optimistic concurrency.
//!
//! Membership is the union of persisted collision chains (keyed by the
//! 32-bit stable hash) and a staged buffer of atoms that cannot be hashed
//! until a save assigns them a pointer. Every mutation is also recorded in
//! an in-memory operation log so the set can be rebased onto a newer state
//! when a competing transaction commits first.

use atom::{Atom, AtomRef, SaveContext};
use chain;
use error::{ErrorKind, Result};
use hash_dict::HashDictionary;
use value::{Value, stable_hash_32};

/// One logged mutation. A tagged variant rather than a closure, so a
/// rebase can be inspected and replayed deterministically.
#[derive(Debug, Clone)]
pub enum SetOp {
	/// The value was added.
	Add(Value),
	/// The value was removed.
	Remove(Value),
}

/// Persisted state: the chain dictionary plus the staged members. The
/// staged buffer never reaches disk; a save folds it into `content`.
#[derive(Debug)]
pub struct SetBody {
	pub(crate) content: AtomRef,
	pub(crate) staged: Vec<AtomRef>,
}

impl SetBody {
	/// Saves every staged member and folds it into the chain dictionary
	/// under its now-pointer-based hash. The result carries no staged
	/// members and is what actually gets serialized.
	pub(crate) fn fold(&self, ctx: &SaveContext) -> Result<SetBody> {
		let mut content = HashDictionary::from_atom(self.content.clone())?;

		for member in &self.staged {
			member.save(ctx)?;
			let item = Value::Atom(member.clone());
			content = add_to_content(&content, &item)?.unwrap_or(content);
		}

		Ok(SetBody {
			content: content.as_atom().clone(),
			staged: Vec::new(),
		})
	}
}

/// Inserts `item` into the chain dictionary. `None` means it was already
/// present.
fn add_to_content(content: &HashDictionary, item: &Value) -> Result<Option<HashDictionary>> {
	let hash = stable_hash_32(item);
	let chain = match content.get_at(hash)?.atom().cloned() {
		Some(head) => {
			if chain::contains(&head, item)? {
				return Ok(None);
			}
			chain::prepend(Some(&head), item.clone())
		},
		None => chain::prepend(None, item.clone()),
	};
	Ok(Some(content.set_at(hash, &Value::Atom(chain))?))
}

/// An immutable, persistent set.
#[derive(Clone)]
pub struct Set {
	root: AtomRef,
	log: Vec<SetOp>,
}

impl Set {
	/// An empty set.
	pub fn new() -> Set {
		Set::from_body(SetBody {
			content: HashDictionary::new().as_atom().clone(),
			staged: Vec::new(),
		}, Vec::new())
	}

	fn from_body(body: SetBody, log: Vec<SetOp>) -> Set {
		Set {
			root: AtomRef::new(Atom::Set(body)),
			log,
		}
	}

	/// Wraps a persisted set atom. The log starts empty.
	pub fn from_atom(atom: AtomRef) -> Result<Set> {
		let class = atom.class_name()?;
		if class != "Set" {
			bail!(ErrorKind::Corruption(format!("expected a Set atom, found {}", class)));
		}
		Ok(Set {
			root: atom,
			log: Vec::new(),
		})
	}

	/// The set stored in `value`, which must be a set atom.
	pub fn from_value(value: &Value) -> Result<Set> {
		match value.atom() {
			Some(atom) => Set::from_atom(atom.clone()),
			None => Err(ErrorKind::Corruption("value is not a set atom".into()).into()),
		}
	}

	/// The underlying atom.
	pub fn as_atom(&self) -> &AtomRef {
		&self.root
	}

	/// The recorded operations, oldest first.
	pub fn log(&self) -> &[SetOp] {
		&self.log
	}

	fn content(&self) -> Result<HashDictionary> {
		let body = self.root.body()?;
		HashDictionary::from_atom(body.as_set()?.content.clone())
	}

	fn staged(&self) -> Result<Vec<AtomRef>> {
		let body = self.root.body()?;
		Ok(body.as_set()?.staged.clone())
	}

	fn logged(&self, op: SetOp) -> Vec<SetOp> {
		let mut log = self.log.clone();
		log.push(op);
		log
	}

	/// Adds `item`, returning the new set. Unpointed atoms are staged
	/// until a save can hash them by pointer.
	pub fn add(&self, item: &Value) -> Result<Set> {
		let log = self.logged(SetOp::Add(item.clone()));

		if let Value::Atom(ref atom) = *item {
			if atom.pointer().is_none() {
				let mut staged = self.staged()?;
				if !staged.iter().any(|member| member == atom) {
					staged.push(atom.clone());
				}
				return Ok(Set::from_body(SetBody {
					content: self.content()?.as_atom().clone(),
					staged,
				}, log));
			}
		}

		let content = match add_to_content(&self.content()?, item)? {
			Some(content) => content,
			None => self.content()?,
		};
		Ok(Set::from_body(SetBody {
			content: content.as_atom().clone(),
			staged: self.staged()?,
		}, log))
	}

	/// Removes `item`, returning the new set. Removing an absent item is a
	/// no-op (but still logged, so a rebase sees the intent).
	pub fn remove(&self, item: &Value) -> Result<Set> {
		let log = self.logged(SetOp::Remove(item.clone()));

		let mut staged = self.staged()?;
		if let Value::Atom(ref atom) = *item {
			if atom.pointer().is_none() {
				staged.retain(|member| member != atom);
				return Ok(Set::from_body(SetBody {
					content: self.content()?.as_atom().clone(),
					staged,
				}, log));
			}
		}

		let content = self.content()?;
		let hash = stable_hash_32(item);
		let content = match content.get_at(hash)?.atom().cloned() {
			Some(head) => match chain::remove(&head, item)? {
				Some(chain) => content.set_at(hash, &Value::Atom(chain))?,
				None => content.remove_at(hash)?,
			},
			None => content,
		};

		Ok(Set::from_body(SetBody {
			content: content.as_atom().clone(),
			staged,
		}, log))
	}

	/// Whether `item` is a member (persisted or staged).
	pub fn has(&self, item: &Value) -> Result<bool> {
		for member in self.staged()? {
			if Value::Atom(member) == *item {
				return Ok(true);
			}
		}

		let hash = stable_hash_32(item);
		match self.content()?.get_at(hash)?.atom() {
			Some(head) => chain::contains(head, item),
			None => Ok(false),
		}
	}

	/// Every member: persisted chains in hash order, then staged.
	pub fn items(&self) -> Result<Vec<Value>> {
		let mut out = Vec::new();
		for entry in self.content()?.iter()? {
			let (_, chain_value) = entry?;
			let head = chain_value.atom().ok_or_else(|| {
				ErrorKind::Corruption("hash entry does not hold a chain".into())
			})?;
			out.extend(chain::items(head)?);
		}
		for member in self.staged()? {
			out.push(Value::Atom(member));
		}
		Ok(out)
	}

	/// Number of members.
	pub fn count(&self) -> Result<u64> {
		Ok(self.items()?.len() as u64)
	}

	/// Members of `self` or `other`.
	pub fn union(&self, other: &Set) -> Result<Set> {
		let mut result = self.clone();
		for item in other.items()? {
			result = result.add(&item)?;
		}
		Ok(result)
	}

	/// Members of both `self` and `other`.
	pub fn intersection(&self, other: &Set) -> Result<Set> {
		let mut result = Set::new();
		for item in self.items()? {
			if other.has(&item)? {
				result = result.add(&item)?;
			}
		}
		Ok(result)
	}

	/// Members of `self` that are not in `other`.
	pub fn difference(&self, other: &Set) -> Result<Set> {
		let mut result = Set::new();
		for item in self.items()? {
			if !other.has(&item)? {
				result = result.add(&item)?;
			}
		}
		Ok(result)
	}

	/// Rebases this set's operation log onto `current`, a newer state of
	/// the same set, and returns the reconciled result.
	pub fn concurrent_update(&self, current: &Set) -> Result<Set> {
		let mut result = current.clone();
		for op in &self.log {
			result = match *op {
				SetOp::Add(ref item) => result.add(item)?,
				SetOp::Remove(ref item) => result.remove(item)?,
			};
		}
		Ok(result)
	}
}

impl From<Set> for Value {
	fn from(set: Set) -> Value {
		Value::Atom(set.root)
	}
}
