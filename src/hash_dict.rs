//! Persistent hash-keyed dictionary: the list's AVL skeleton keyed by a
//! signed 32-bit integer (a stable hash). The building block for sets.

use std::cmp::Ordering;
use std::sync::Arc;

use atom::{Atom, AtomRef};
use error::{ErrorKind, Result};
use value::Value;

/// One node of the hash tree. The empty tree is a sentinel node whose key
/// is unset.
#[derive(Debug)]
pub struct HashNode {
	pub(crate) key: Option<i32>,
	pub(crate) value: Value,
	pub(crate) left: Option<AtomRef>,
	pub(crate) right: Option<AtomRef>,
	pub(crate) count: u64,
	pub(crate) height: u8,
}

impl HashNode {
	pub(crate) fn sentinel() -> HashNode {
		HashNode {
			key: None,
			value: Value::None,
			left: None,
			right: None,
			count: 0,
			height: 0,
		}
	}
}

fn meta(link: &Option<AtomRef>) -> Result<(u64, u8)> {
	match *link {
		Some(ref atom) => {
			let body = atom.body()?;
			let node = body.as_hash_dict()?;
			Ok((node.count, node.height))
		},
		None => Ok((0, 0)),
	}
}

fn key_of(node: &HashNode) -> Result<i32> {
	node.key.ok_or_else(|| {
		ErrorKind::Corruption("sentinel node inside a hash tree".into()).into()
	})
}

fn make(key: i32, value: Value, left: Option<AtomRef>, right: Option<AtomRef>) -> Result<AtomRef> {
	let (left_count, left_height) = meta(&left)?;
	let (right_count, right_height) = meta(&right)?;

	Ok(AtomRef::new(Atom::HashDict(HashNode {
		key: Some(key),
		value,
		left,
		right,
		count: 1 + left_count + right_count,
		height: 1 + left_height.max(right_height),
	})))
}

fn rebalance(key: i32, value: Value, left: Option<AtomRef>, right: Option<AtomRef>) -> Result<AtomRef> {
	let (_, left_height) = meta(&left)?;
	let (_, right_height) = meta(&right)?;
	let balance = right_height as i16 - left_height as i16;

	if balance > 1 {
		let right_atom = right.expect("positive balance requires a right child; qed").body()?;
		let right_node = right_atom.as_hash_dict()?;
		let (_, rl_height) = meta(&right_node.left)?;
		let (_, rr_height) = meta(&right_node.right)?;

		if rr_height >= rl_height {
			let new_left = make(key, value, left, right_node.left.clone())?;
			return make(key_of(right_node)?, right_node.value.clone(), Some(new_left), right_node.right.clone());
		}
		let pivot_atom = right_node.left.clone()
			.expect("inner grandchild is taller than an existing subtree; qed")
			.body()?;
		let pivot = pivot_atom.as_hash_dict()?;
		let new_left = make(key, value, left, pivot.left.clone())?;
		let new_right = make(key_of(right_node)?, right_node.value.clone(), pivot.right.clone(), right_node.right.clone())?;
		return make(key_of(pivot)?, pivot.value.clone(), Some(new_left), Some(new_right));
	}

	if balance < -1 {
		let left_atom = left.expect("negative balance requires a left child; qed").body()?;
		let left_node = left_atom.as_hash_dict()?;
		let (_, ll_height) = meta(&left_node.left)?;
		let (_, lr_height) = meta(&left_node.right)?;

		if ll_height >= lr_height {
			let new_right = make(key, value, left_node.right.clone(), right)?;
			return make(key_of(left_node)?, left_node.value.clone(), left_node.left.clone(), Some(new_right));
		}
		let pivot_atom = left_node.right.clone()
			.expect("inner grandchild is taller than an existing subtree; qed")
			.body()?;
		let pivot = pivot_atom.as_hash_dict()?;
		let new_left = make(key_of(left_node)?, left_node.value.clone(), left_node.left.clone(), pivot.left.clone())?;
		let new_right = make(key, value, pivot.right.clone(), right)?;
		return make(key_of(pivot)?, pivot.value.clone(), Some(new_left), Some(new_right));
	}

	make(key, value, left, right)
}

fn insert(link: &Option<AtomRef>, key: i32, value: &Value) -> Result<AtomRef> {
	let atom = match *link {
		Some(ref atom) => atom.body()?,
		None => return make(key, value.clone(), None, None),
	};
	let node = atom.as_hash_dict()?;
	let node_key = key_of(node)?;

	match key.cmp(&node_key) {
		Ordering::Less => {
			let new_left = insert(&node.left, key, value)?;
			rebalance(node_key, node.value.clone(), Some(new_left), node.right.clone())
		},
		Ordering::Greater => {
			let new_right = insert(&node.right, key, value)?;
			rebalance(node_key, node.value.clone(), node.left.clone(), Some(new_right))
		},
		Ordering::Equal => make(key, value.clone(), node.left.clone(), node.right.clone()),
	}
}

/// Removes the leftmost node, returning the remaining tree and its entry.
fn remove_min(atom: &AtomRef) -> Result<(Option<AtomRef>, i32, Value)> {
	let body = atom.body()?;
	let node = body.as_hash_dict()?;

	match node.left {
		Some(ref left) => {
			let (rest, key, value) = remove_min(left)?;
			let tree = rebalance(key_of(node)?, node.value.clone(), rest, node.right.clone())?;
			Ok((Some(tree), key, value))
		},
		None => Ok((node.right.clone(), key_of(node)?, node.value.clone())),
	}
}

fn remove(atom: &AtomRef, key: i32) -> Result<(Option<AtomRef>, Option<Value>)> {
	let body = atom.body()?;
	let node = body.as_hash_dict()?;
	let node_key = key_of(node)?;

	match key.cmp(&node_key) {
		Ordering::Less => match node.left {
			Some(ref left) => {
				let (new_left, removed) = remove(left, key)?;
				if removed.is_none() {
					return Ok((Some(atom.clone()), None));
				}
				let tree = rebalance(node_key, node.value.clone(), new_left, node.right.clone())?;
				Ok((Some(tree), removed))
			},
			None => Ok((Some(atom.clone()), None)),
		},
		Ordering::Greater => match node.right {
			Some(ref right) => {
				let (new_right, removed) = remove(right, key)?;
				if removed.is_none() {
					return Ok((Some(atom.clone()), None));
				}
				let tree = rebalance(node_key, node.value.clone(), node.left.clone(), new_right)?;
				Ok((Some(tree), removed))
			},
			None => Ok((Some(atom.clone()), None)),
		},
		Ordering::Equal => {
			let removed = Some(node.value.clone());
			let tree = match (node.left.clone(), node.right.clone()) {
				(None, None) => None,
				(Some(left), None) => Some(left),
				(None, Some(right)) => Some(right),
				(Some(left), Some(right)) => {
					// substitute the in-order successor
					let (rest, successor_key, successor_value) = remove_min(&right)?;
					Some(rebalance(successor_key, successor_value, Some(left), rest)?)
				},
			};
			Ok((tree, removed))
		},
	}
}

/// An immutable dictionary keyed by 32-bit stable hashes.
#[derive(Clone)]
pub struct HashDictionary {
	root: AtomRef,
}

impl HashDictionary {
	/// An empty dictionary.
	pub fn new() -> HashDictionary {
		HashDictionary {
			root: AtomRef::new(Atom::HashDict(HashNode::sentinel())),
		}
	}

	/// Wraps a persisted hash-dictionary atom.
	pub fn from_atom(atom: AtomRef) -> Result<HashDictionary> {
		let class = atom.class_name()?;
		if class != "HashDictionary" {
			bail!(ErrorKind::Corruption(format!("expected a HashDictionary atom, found {}", class)));
		}
		Ok(HashDictionary {
			root: atom,
		})
	}

	/// The underlying atom.
	pub fn as_atom(&self) -> &AtomRef {
		&self.root
	}

	fn subtree(&self) -> Result<Option<AtomRef>> {
		let body = self.root.body()?;
		let node = body.as_hash_dict()?;
		if node.key.is_none() {
			Ok(None)
		} else {
			Ok(Some(self.root.clone()))
		}
	}

	fn with_subtree(&self, subtree: Option<AtomRef>) -> HashDictionary {
		HashDictionary {
			root: subtree.unwrap_or_else(|| AtomRef::new(Atom::HashDict(HashNode::sentinel()))),
		}
	}

	/// Number of entries.
	pub fn count(&self) -> Result<u64> {
		Ok(self.root.body()?.as_hash_dict()?.count)
	}

	/// The value stored under `key`, or the empty value.
	pub fn get_at(&self, key: i32) -> Result<Value> {
		let mut link = self.subtree()?;
		while let Some(atom) = link {
			let body = atom.body()?;
			let node = body.as_hash_dict()?;
			match key.cmp(&key_of(node)?) {
				Ordering::Less => link = node.left.clone(),
				Ordering::Greater => link = node.right.clone(),
				Ordering::Equal => return Ok(node.value.clone()),
			}
		}
		Ok(Value::None)
	}

	/// Inserts or replaces the value under `key`.
	pub fn set_at(&self, key: i32, value: &Value) -> Result<HashDictionary> {
		let new = insert(&self.subtree()?, key, value)?;
		Ok(self.with_subtree(Some(new)))
	}

	/// Removes the entry under `key`, if present.
	pub fn remove_at(&self, key: i32) -> Result<HashDictionary> {
		let subtree = match self.subtree()? {
			Some(subtree) => subtree,
			None => return Ok(self.clone()),
		};
		let (new, removed) = remove(&subtree, key)?;
		if removed.is_none() {
			return Ok(self.clone());
		}
		Ok(self.with_subtree(new))
	}

	/// The entry with the smallest key.
	pub fn get_first(&self) -> Result<Option<(i32, Value)>> {
		let mut link = self.subtree()?;
		let mut found = None;
		while let Some(atom) = link {
			let body = atom.body()?;
			let node = body.as_hash_dict()?;
			found = Some((key_of(node)?, node.value.clone()));
			link = node.left.clone();
		}
		Ok(found)
	}

	/// The entry with the largest key.
	pub fn get_last(&self) -> Result<Option<(i32, Value)>> {
		let mut link = self.subtree()?;
		let mut found = None;
		while let Some(atom) = link {
			let body = atom.body()?;
			let node = body.as_hash_dict()?;
			found = Some((key_of(node)?, node.value.clone()));
			link = node.right.clone();
		}
		Ok(found)
	}

	/// In-order (ascending key) iterator.
	pub fn iter(&self) -> Result<Iter> {
		let mut iter = Iter {
			stack: Vec::new(),
			failed: false,
		};
		iter.push_left(self.subtree()?)?;
		Ok(iter)
	}
}

impl From<HashDictionary> for Value {
	fn from(dict: HashDictionary) -> Value {
		Value::Atom(dict.root)
	}
}

/// Ascending-key traversal.
pub struct Iter {
	stack: Vec<Arc<Atom>>,
	failed: bool,
}

impl Iter {
	fn push_left(&mut self, mut link: Option<AtomRef>) -> Result<()> {
		while let Some(atom) = link {
			let body = atom.body()?;
			link = body.as_hash_dict()?.left.clone();
			self.stack.push(body);
		}
		Ok(())
	}
}

impl Iterator for Iter {
	type Item = Result<(i32, Value)>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}
		let body = self.stack.pop()?;
		let step = {
			let node = match body.as_hash_dict() {
				Ok(node) => node,
				Err(err) => {
					self.failed = true;
					return Some(Err(err));
				},
			};
			match key_of(node) {
				Ok(key) => Ok((key, node.value.clone(), node.right.clone())),
				Err(err) => Err(err),
			}
		};
		match step {
			Ok((key, value, right)) => {
				if let Err(err) = self.push_left(right) {
					self.failed = true;
					return Some(Err(err));
				}
				Some(Ok((key, value)))
			},
			Err(err) => {
				self.failed = true;
				Some(Err(err))
			},
		}
	}
}
