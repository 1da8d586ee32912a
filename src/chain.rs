//! Collision chains: cons-lists of elements whose 32-bit stable hashes
//! collide. A chain hangs off one hash-dictionary entry.

use atom::{Atom, AtomRef};
use error::Result;
use value::Value;

/// One chain link.
#[derive(Debug)]
pub struct ChainNode {
	pub(crate) item: Value,
	pub(crate) next: Option<AtomRef>,
}

/// A new chain with `item` in front of `next`.
pub fn prepend(next: Option<&AtomRef>, item: Value) -> AtomRef {
	AtomRef::new(Atom::Chain(ChainNode {
		item,
		next: next.cloned(),
	}))
}

/// Whether `item` is structurally present in the chain.
pub fn contains(head: &AtomRef, item: &Value) -> Result<bool> {
	let mut link = Some(head.clone());
	while let Some(atom) = link {
		let body = atom.body()?;
		let node = body.as_chain()?;
		if node.item == *item {
			return Ok(true);
		}
		link = node.next.clone();
	}
	Ok(false)
}

/// Splices `item` out of the chain. Links in front of the removed one are
/// rebuilt, the suffix is shared. Returns `None` when the chain empties,
/// the unchanged chain when `item` was absent.
pub fn remove(head: &AtomRef, item: &Value) -> Result<Option<AtomRef>> {
	let mut prefix = Vec::new();
	let mut link = Some(head.clone());

	while let Some(atom) = link {
		let body = atom.body()?;
		let node = body.as_chain()?;
		if node.item == *item {
			let mut rebuilt = node.next.clone();
			for item in prefix.into_iter().rev() {
				rebuilt = Some(prepend(rebuilt.as_ref(), item));
			}
			return Ok(rebuilt);
		}
		prefix.push(node.item.clone());
		link = node.next.clone();
	}

	Ok(Some(head.clone()))
}

/// Every item in the chain, front to back.
pub fn items(head: &AtomRef) -> Result<Vec<Value>> {
	let mut out = Vec::new();
	let mut link = Some(head.clone());
	while let Some(atom) = link {
		let body = atom.body()?;
		let node = body.as_chain()?;
		out.push(node.item.clone());
		link = node.next.clone();
	}
	Ok(out)
}
