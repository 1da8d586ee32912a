//! Persistent list: a height-balanced BST ordered by rank.
//!
//! Positional insert and remove are the only shape-changing operations, so
//! in-order traversal yields elements in insertion order. Every mutation
//! returns a new list and rebuilds only the O(log n) spine it touched;
//! untouched nodes are shared between the old and new values.

use std::sync::Arc;

use atom::{Atom, AtomRef};
use error::{ErrorKind, Result};
use index::Indexes;
use value::Value;

/// One node of the list tree. The empty list is a real, saveable node with
/// the `empty` flag set; children of non-empty nodes are absent rather than
/// empty nodes.
#[derive(Debug)]
pub struct ListNode {
	pub(crate) empty: bool,
	pub(crate) value: Value,
	pub(crate) left: Option<AtomRef>,
	pub(crate) right: Option<AtomRef>,
	pub(crate) count: u64,
	pub(crate) height: u8,
}

impl ListNode {
	pub(crate) fn empty_node() -> ListNode {
		ListNode {
			empty: true,
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
			let node = body.as_list()?;
			Ok((node.count, node.height))
		},
		None => Ok((0, 0)),
	}
}

fn count_of(link: &Option<AtomRef>) -> Result<u64> {
	meta(link).map(|(count, _)| count)
}

/// Builds a node from already-balanced children.
fn make(value: Value, left: Option<AtomRef>, right: Option<AtomRef>) -> Result<AtomRef> {
	let (left_count, left_height) = meta(&left)?;
	let (right_count, right_height) = meta(&right)?;

	Ok(AtomRef::new(Atom::List(ListNode {
		empty: false,
		value,
		left,
		right,
		count: 1 + left_count + right_count,
		height: 1 + left_height.max(right_height),
	})))
}

/// Builds a node and restores the AVL invariant with a single or double
/// rotation when one child grew or shrank by one level.
fn rebalance(value: Value, left: Option<AtomRef>, right: Option<AtomRef>) -> Result<AtomRef> {
	let (_, left_height) = meta(&left)?;
	let (_, right_height) = meta(&right)?;
	let balance = right_height as i16 - left_height as i16;

	if balance > 1 {
		let right_atom = right.expect("positive balance requires a right child; qed").body()?;
		let right_node = right_atom.as_list()?;
		let (_, rl_height) = meta(&right_node.left)?;
		let (_, rr_height) = meta(&right_node.right)?;

		if rr_height >= rl_height {
			// left rotation
			let new_left = make(value, left, right_node.left.clone())?;
			return make(right_node.value.clone(), Some(new_left), right_node.right.clone());
		}
		// right-left double rotation
		let pivot_atom = right_node.left.clone()
			.expect("inner grandchild is taller than an existing subtree; qed")
			.body()?;
		let pivot = pivot_atom.as_list()?;
		let new_left = make(value, left, pivot.left.clone())?;
		let new_right = make(right_node.value.clone(), pivot.right.clone(), right_node.right.clone())?;
		return make(pivot.value.clone(), Some(new_left), Some(new_right));
	}

	if balance < -1 {
		let left_atom = left.expect("negative balance requires a left child; qed").body()?;
		let left_node = left_atom.as_list()?;
		let (_, ll_height) = meta(&left_node.left)?;
		let (_, lr_height) = meta(&left_node.right)?;

		if ll_height >= lr_height {
			// right rotation
			let new_right = make(value, left_node.right.clone(), right)?;
			return make(left_node.value.clone(), left_node.left.clone(), Some(new_right));
		}
		// left-right double rotation
		let pivot_atom = left_node.right.clone()
			.expect("inner grandchild is taller than an existing subtree; qed")
			.body()?;
		let pivot = pivot_atom.as_list()?;
		let new_left = make(left_node.value.clone(), left_node.left.clone(), pivot.left.clone())?;
		let new_right = make(value, pivot.right.clone(), right)?;
		return make(pivot.value.clone(), Some(new_left), Some(new_right));
	}

	make(value, left, right)
}

fn insert(link: &Option<AtomRef>, index: u64, value: &Value) -> Result<AtomRef> {
	let atom = match *link {
		Some(ref atom) => atom.body()?,
		None => return make(value.clone(), None, None),
	};
	let node = atom.as_list()?;
	let left_count = count_of(&node.left)?;

	if index <= left_count {
		let new_left = insert(&node.left, index, value)?;
		rebalance(node.value.clone(), Some(new_left), node.right.clone())
	} else {
		let new_right = insert(&node.right, index - left_count - 1, value)?;
		rebalance(node.value.clone(), node.left.clone(), Some(new_right))
	}
}

fn remove(atom: &AtomRef, index: u64) -> Result<(Option<AtomRef>, Value)> {
	let body = atom.body()?;
	let node = body.as_list()?;
	let left_count = count_of(&node.left)?;

	if index < left_count {
		let left = node.left.as_ref().expect("index is below the left count; qed");
		let (new_left, removed) = remove(left, index)?;
		let tree = rebalance(node.value.clone(), new_left, node.right.clone())?;
		return Ok((Some(tree), removed));
	}
	if index > left_count {
		let right = node.right.as_ref().expect("index is beyond the left subtree and the root; qed");
		let (new_right, removed) = remove(right, index - left_count - 1)?;
		let tree = rebalance(node.value.clone(), node.left.clone(), new_right)?;
		return Ok((Some(tree), removed));
	}

	let removed = node.value.clone();
	let tree = match (node.left.clone(), node.right.clone()) {
		(None, None) => None,
		(Some(left), None) => Some(left),
		(None, Some(right)) => Some(right),
		(Some(left), Some(right)) => {
			let (rest, successor) = remove(&right, 0)?;
			Some(rebalance(successor, Some(left), rest)?)
		},
	};
	Ok((tree, removed))
}

fn set(atom: &AtomRef, index: u64, value: &Value) -> Result<AtomRef> {
	let body = atom.body()?;
	let node = body.as_list()?;
	let left_count = count_of(&node.left)?;

	if index < left_count {
		let left = node.left.as_ref().expect("index is below the left count; qed");
		let new_left = set(left, index, value)?;
		make(node.value.clone(), Some(new_left), node.right.clone())
	} else if index > left_count {
		let right = node.right.as_ref().expect("index is beyond the left subtree and the root; qed");
		let new_right = set(right, index - left_count - 1, value)?;
		make(node.value.clone(), node.left.clone(), Some(new_right))
	} else {
		make(value.clone(), node.left.clone(), node.right.clone())
	}
}

/// Joins two balanced trees around a middle value, descending the taller
/// side until the heights meet. The result is balanced whatever the height
/// difference was.
fn join(left: Option<AtomRef>, value: Value, right: Option<AtomRef>) -> Result<AtomRef> {
	let (_, left_height) = meta(&left)?;
	let (_, right_height) = meta(&right)?;

	if left_height as i16 - right_height as i16 > 1 {
		let atom = left.expect("taller side is non-empty; qed").body()?;
		let node = atom.as_list()?;
		let new_right = join(node.right.clone(), value, right)?;
		return rebalance(node.value.clone(), node.left.clone(), Some(new_right));
	}
	if right_height as i16 - left_height as i16 > 1 {
		let atom = right.expect("taller side is non-empty; qed").body()?;
		let node = atom.as_list()?;
		let new_left = join(left, value, node.left.clone())?;
		return rebalance(node.value.clone(), Some(new_left), node.right.clone());
	}

	make(value, left, right)
}

/// First `index` elements of the subtree.
fn take(link: &Option<AtomRef>, index: u64) -> Result<Option<AtomRef>> {
	let atom = match *link {
		Some(ref atom) if index > 0 => atom.body()?,
		_ => return Ok(None),
	};
	let node = atom.as_list()?;
	if index >= node.count {
		return Ok(link.clone());
	}
	let left_count = count_of(&node.left)?;

	if index <= left_count {
		take(&node.left, index)
	} else {
		let tail = take(&node.right, index - left_count - 1)?;
		Ok(Some(join(node.left.clone(), node.value.clone(), tail)?))
	}
}

/// The subtree without its first `index` elements.
fn drop_front(link: &Option<AtomRef>, index: u64) -> Result<Option<AtomRef>> {
	let atom = match *link {
		Some(ref atom) if index > 0 => atom.body()?,
		_ => return Ok(link.clone()),
	};
	let node = atom.as_list()?;
	if index >= node.count {
		return Ok(None);
	}
	let left_count = count_of(&node.left)?;

	if index <= left_count {
		let head = drop_front(&node.left, index)?;
		Ok(Some(join(head, node.value.clone(), node.right.clone())?))
	} else {
		drop_front(&node.right, index - left_count - 1)
	}
}

fn concat(left: Option<AtomRef>, right: Option<AtomRef>) -> Result<Option<AtomRef>> {
	let right = match right {
		Some(right) => right,
		None => return Ok(left),
	};
	if left.is_none() {
		return Ok(Some(right));
	}

	let (rest, first) = remove(&right, 0)?;
	Ok(Some(join(left, first, rest)?))
}

/// An immutable, persistent list.
#[derive(Clone)]
pub struct List {
	root: AtomRef,
	indexes: Option<Arc<Indexes>>,
}

impl List {
	/// An empty list.
	pub fn new() -> List {
		List::from_subtree(None)
	}

	fn from_subtree(subtree: Option<AtomRef>) -> List {
		let root = subtree.unwrap_or_else(|| AtomRef::new(Atom::List(ListNode::empty_node())));
		List {
			root,
			indexes: None,
		}
	}

	/// Wraps a persisted list atom.
	pub fn from_atom(atom: AtomRef) -> Result<List> {
		let class = atom.class_name()?;
		if class != "List" {
			bail!(ErrorKind::Corruption(format!("expected a List atom, found {}", class)));
		}
		Ok(List {
			root: atom,
			indexes: None,
		})
	}

	/// The list stored in `value`, which must be a list atom.
	pub fn from_value(value: &Value) -> Result<List> {
		match value.atom() {
			Some(atom) => List::from_atom(atom.clone()),
			None => Err(ErrorKind::Corruption("value is not a list atom".into()).into()),
		}
	}

	/// Attaches secondary indexes notified on insert and remove.
	pub fn with_indexes(mut self, indexes: Arc<Indexes>) -> List {
		self.indexes = Some(indexes);
		self
	}

	/// The underlying atom.
	pub fn as_atom(&self) -> &AtomRef {
		&self.root
	}

	fn subtree(&self) -> Result<Option<AtomRef>> {
		let body = self.root.body()?;
		let node = body.as_list()?;
		if node.empty {
			Ok(None)
		} else {
			Ok(Some(self.root.clone()))
		}
	}

	fn with_subtree(&self, subtree: Option<AtomRef>) -> List {
		let mut list = List::from_subtree(subtree);
		list.indexes = self.indexes.clone();
		list
	}

	fn add_to_indexes(&self, value: &Value) {
		if let Some(ref indexes) = self.indexes {
			indexes.add(value);
		}
	}

	fn remove_from_indexes(&self, value: &Value) {
		if let Some(ref indexes) = self.indexes {
			indexes.remove(value);
		}
	}

	/// Number of elements.
	pub fn count(&self) -> Result<u64> {
		Ok(self.root.body()?.as_list()?.count)
	}

	fn normalize(&self, index: i64) -> Result<Option<u64>> {
		let count = self.count()? as i64;
		let index = if index < 0 { index + count } else { index };
		if index < 0 || index >= count {
			Ok(None)
		} else {
			Ok(Some(index as u64))
		}
	}

	/// The element at `index`. Negative indices wrap from the end;
	/// out-of-range reads return the empty value.
	pub fn get_at(&self, index: i64) -> Result<Value> {
		let index = match self.normalize(index)? {
			Some(index) => index,
			None => return Ok(Value::None),
		};
		let subtree = self.subtree()?.expect("a normalized index implies a non-empty list; qed");

		fn get(atom: &AtomRef, index: u64) -> Result<Value> {
			let body = atom.body()?;
			let node = body.as_list()?;
			let left_count = count_of(&node.left)?;

			if index < left_count {
				let left = node.left.as_ref().expect("index is below the left count; qed");
				get(left, index)
			} else if index > left_count {
				let right = node.right.as_ref().expect("index is beyond the left subtree and the root; qed");
				get(right, index - left_count - 1)
			} else {
				Ok(node.value.clone())
			}
		}

		get(&subtree, index)
	}

	/// Replaces the element at `index` without changing the shape.
	/// Out-of-range indices leave the list unchanged.
	pub fn set_at(&self, index: i64, value: &Value) -> Result<List> {
		let index = match self.normalize(index)? {
			Some(index) => index,
			None => return Ok(self.clone()),
		};
		let subtree = self.subtree()?.expect("a normalized index implies a non-empty list; qed");
		let new = set(&subtree, index, value)?;
		Ok(self.with_subtree(Some(new)))
	}

	/// Inserts `value` before position `index`. Negative indices wrap from
	/// the end; anything past the end appends.
	pub fn insert_at(&self, index: i64, value: &Value) -> Result<List> {
		let count = self.count()? as i64;
		let index = if index < 0 { index + count } else { index };
		let index = index.max(0).min(count) as u64;

		let new = insert(&self.subtree()?, index, value)?;
		self.add_to_indexes(value);
		Ok(self.with_subtree(Some(new)))
	}

	/// Removes the element at `index`. Out-of-range indices leave the list
	/// unchanged.
	pub fn remove_at(&self, index: i64) -> Result<List> {
		let index = match self.normalize(index)? {
			Some(index) => index,
			None => return Ok(self.clone()),
		};
		let subtree = self.subtree()?.expect("a normalized index implies a non-empty list; qed");
		let (new, removed) = remove(&subtree, index)?;
		self.remove_from_indexes(&removed);
		Ok(self.with_subtree(new))
	}

	/// Prepends an element.
	pub fn append_first(&self, value: &Value) -> Result<List> {
		self.insert_at(0, value)
	}

	/// Appends an element.
	pub fn append_last(&self, value: &Value) -> Result<List> {
		let count = self.count()?;
		self.insert_at(count as i64, value)
	}

	/// The first `count` elements.
	pub fn head(&self, count: u64) -> Result<List> {
		let new = take(&self.subtree()?, count)?;
		Ok(self.with_subtree(new))
	}

	/// The elements from position `index` to the end.
	pub fn tail(&self, index: u64) -> Result<List> {
		let new = drop_front(&self.subtree()?, index)?;
		Ok(self.with_subtree(new))
	}

	/// The elements of the half-open range `[from, to)`, clamped to the
	/// list bounds.
	pub fn slice(&self, from: u64, to: u64) -> Result<List> {
		if to <= from {
			return Ok(self.with_subtree(None));
		}
		let new = take(&drop_front(&self.subtree()?, from)?, to - from)?;
		Ok(self.with_subtree(new))
	}

	/// Appends every element of `other`, in order.
	pub fn extend(&self, other: &List) -> Result<List> {
		let new = concat(self.subtree()?, other.subtree()?)?;
		Ok(self.with_subtree(new))
	}

	/// In-order iterator.
	pub fn iter(&self) -> Result<Iter> {
		let mut iter = Iter {
			stack: Vec::new(),
			failed: false,
		};
		iter.push_left(self.subtree()?)?;
		Ok(iter)
	}

	/// All elements, in order.
	pub fn to_vec(&self) -> Result<Vec<Value>> {
		self.iter()?.collect()
	}
}

impl From<List> for Value {
	fn from(list: List) -> Value {
		Value::Atom(list.root)
	}
}

/// In-order (left, root, right) traversal, loading lazy nodes on demand.
pub struct Iter {
	stack: Vec<Arc<Atom>>,
	failed: bool,
}

impl Iter {
	fn push_left(&mut self, mut link: Option<AtomRef>) -> Result<()> {
		while let Some(atom) = link {
			let body = atom.body()?;
			link = body.as_list()?.left.clone();
			self.stack.push(body);
		}
		Ok(())
	}
}

impl Iterator for Iter {
	type Item = Result<Value>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}
		let body = self.stack.pop()?;
		let (value, right) = {
			let node = match body.as_list() {
				Ok(node) => node,
				Err(err) => {
					self.failed = true;
					return Some(Err(err));
				},
			};
			(node.value.clone(), node.right.clone())
		};
		if let Err(err) = self.push_left(right) {
			self.failed = true;
			return Some(Err(err));
		}
		Some(Ok(value))
	}
}

#[cfg(test)]
mod tests {
	use atom::AtomRef;
	use value::Value;
	use super::{List, count_of, meta};

	fn int_list(values: &[i64]) -> List {
		let mut list = List::new();
		for &value in values {
			list = list.append_last(&Value::Int(value)).unwrap();
		}
		list
	}

	fn ints(list: &List) -> Vec<i64> {
		list.to_vec().unwrap().into_iter().map(|value| match value {
			Value::Int(i) => i,
			other => panic!("expected an int, got {:?}", other),
		}).collect()
	}

	/// Walks the whole tree checking the AVL and count invariants.
	fn check_invariants(list: &List) {
		fn check(link: &Option<AtomRef>) -> (u64, u8) {
			let atom = match *link {
				Some(ref atom) => atom.body().unwrap(),
				None => return (0, 0),
			};
			let node = atom.as_list().unwrap();
			assert!(!node.empty, "empty nodes must not appear inside a tree");

			let (left_count, left_height) = check(&node.left);
			let (right_count, right_height) = check(&node.right);

			assert_eq!(node.count, 1 + left_count + right_count, "count mismatch");
			assert_eq!(node.height, 1 + left_height.max(right_height), "height mismatch");
			assert!(
				(left_height as i16 - right_height as i16).abs() <= 1,
				"AVL balance violated: left {} right {}", left_height, right_height
			);

			(node.count, node.height)
		}

		let body = list.as_atom().body().unwrap();
		let node = body.as_list().unwrap();
		if node.empty {
			assert_eq!(node.count, 0);
		} else {
			check(&Some(list.as_atom().clone()));
		}
	}

	#[test]
	fn test_insert_and_remove_keep_order() {
		let list = int_list(&[10, 20, 30, 40]);
		check_invariants(&list);

		let list = list.insert_at(2, &Value::Int(25)).unwrap();
		assert_eq!(ints(&list), vec![10, 20, 25, 30, 40]);
		check_invariants(&list);

		let list = list.remove_at(0).unwrap();
		assert_eq!(ints(&list), vec![20, 25, 30, 40]);
		check_invariants(&list);
	}

	#[test]
	fn test_mutations_leave_the_original_untouched() {
		let list = int_list(&[1, 2, 3]);
		let _ = list.insert_at(1, &Value::Int(9)).unwrap();
		let _ = list.remove_at(2).unwrap();
		let _ = list.set_at(0, &Value::Int(9)).unwrap();

		assert_eq!(ints(&list), vec![1, 2, 3]);
	}

	#[test]
	fn test_get_at_wraps_and_tolerates_out_of_range() {
		let list = int_list(&[1, 2, 3]);

		assert_eq!(list.get_at(0).unwrap(), Value::Int(1));
		assert_eq!(list.get_at(-1).unwrap(), Value::Int(3));
		assert_eq!(list.get_at(-3).unwrap(), Value::Int(1));
		assert_eq!(list.get_at(3).unwrap(), Value::None);
		assert_eq!(list.get_at(-4).unwrap(), Value::None);
	}

	#[test]
	fn test_set_at_replaces_in_place() {
		let list = int_list(&[1, 2, 3]);
		let updated = list.set_at(1, &Value::Int(9)).unwrap();

		assert_eq!(ints(&updated), vec![1, 9, 3]);
		assert_eq!(updated.count().unwrap(), 3);
		check_invariants(&updated);
	}

	#[test]
	fn test_head_tail_slice() {
		let list = int_list(&[1, 2, 3, 4, 5, 6, 7]);

		assert_eq!(ints(&list.head(3).unwrap()), vec![1, 2, 3]);
		assert_eq!(ints(&list.tail(3).unwrap()), vec![4, 5, 6, 7]);
		assert_eq!(ints(&list.slice(2, 5).unwrap()), vec![3, 4, 5]);
		assert_eq!(ints(&list.slice(5, 2).unwrap()), Vec::<i64>::new());
		assert_eq!(ints(&list.head(100).unwrap()), vec![1, 2, 3, 4, 5, 6, 7]);
		assert_eq!(ints(&list.tail(100).unwrap()), Vec::<i64>::new());

		check_invariants(&list.head(3).unwrap());
		check_invariants(&list.tail(3).unwrap());
		check_invariants(&list.slice(2, 5).unwrap());
	}

	#[test]
	fn test_extend_appends_in_order() {
		let list = int_list(&[1, 2, 3]).extend(&int_list(&[4, 5])).unwrap();

		assert_eq!(ints(&list), vec![1, 2, 3, 4, 5]);
		check_invariants(&list);

		let list = List::new().extend(&int_list(&[1])).unwrap();
		assert_eq!(ints(&list), vec![1]);
	}

	#[test]
	fn test_balance_under_sequential_append() {
		let list = int_list(&(0..128).collect::<Vec<_>>());
		check_invariants(&list);

		let body = list.as_atom().body().unwrap();
		let node = body.as_list().unwrap();
		// a rank tree of 128 sequential appends stays logarithmic
		assert!(node.height <= 9, "height {} is not logarithmic", node.height);
	}

	quickcheck! {
		fn quickcheck_random_edits_match_a_vec(operations: Vec<(u8, i64)>) -> bool {
			let mut list = List::new();
			let mut model: Vec<i64> = Vec::new();

			for (kind, value) in operations {
				match kind % 3 {
					0 => {
						let position = if model.is_empty() {
							0
						} else {
							(value.unsigned_abs() % (model.len() as u64 + 1)) as usize
						};
						list = list.insert_at(position as i64, &Value::Int(value)).unwrap();
						model.insert(position, value);
					},
					1 if !model.is_empty() => {
						let position = (value.unsigned_abs() % model.len() as u64) as usize;
						list = list.remove_at(position as i64).unwrap();
						model.remove(position);
					},
					_ if !model.is_empty() => {
						let position = (value.unsigned_abs() % model.len() as u64) as usize;
						list = list.set_at(position as i64, &Value::Int(value)).unwrap();
						model[position] = value;
					},
					_ => {},
				}
			}

			check_invariants(&list);
			ints(&list) == model
		}
	}

	#[test]
	fn test_meta_of_missing_child() {
		assert_eq!(meta(&None).unwrap(), (0, 0));
		assert_eq!(count_of(&None).unwrap(), 0);
	}
}
