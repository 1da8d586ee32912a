//! Atom identity, lazy materialization and recursive save.
//!
//! An atom is the unit of persistence: one length-prefixed record holding a
//! flat JSON map. In memory it lives inside an `AtomCell`; `AtomRef` is the
//! cheap shared handle collections hold. A ref may carry a pointer and no
//! body (lazy, loads on first access), a body and no pointer (fresh, gets a
//! pointer on first save), or both.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use chain::ChainNode;
use codec;
use counted_set::CountedSetBody;
use dict::DictBody;
use error::{Error, ErrorKind, Result};
use hash_dict::HashNode;
use list::ListNode;
use literal::LiteralPool;
use pointer::Pointer;
use set::SetBody;
use space::RootBody;
use store::Storage;

/// Entries swept from the atom cache every this many inserts.
const SWEEP_INTERVAL: usize = 256;

/// A materialized atom.
#[derive(Debug)]
pub enum Atom {
	/// An interned string.
	Literal(String),
	/// A root object anchoring a space's object and literal trees.
	Root(RootBody),
	/// A persistent list node.
	List(ListNode),
	/// An ordered dictionary.
	Dict(DictBody),
	/// A hash dictionary node.
	HashDict(HashNode),
	/// A collision chain link.
	Chain(ChainNode),
	/// A set.
	Set(SetBody),
	/// A counted set.
	CountedSet(CountedSetBody),
}

impl Atom {
	/// The wire name of this variant.
	pub fn class_name(&self) -> &'static str {
		match *self {
			Atom::Literal(_) => "Literal",
			Atom::Root(_) => "RootObject",
			Atom::List(_) => "List",
			Atom::Dict(_) => "Dictionary",
			Atom::HashDict(_) => "HashDictionary",
			Atom::Chain(_) => "Chain",
			Atom::Set(_) => "Set",
			Atom::CountedSet(_) => "CountedSet",
		}
	}

	fn expected(&self, wanted: &str) -> Error {
		ErrorKind::Corruption(format!(
			"expected a {} atom, found {}", wanted, self.class_name()
		)).into()
	}

	/// The literal string, or a corruption error for other variants.
	pub fn as_literal(&self) -> Result<&str> {
		match *self {
			Atom::Literal(ref s) => Ok(s),
			ref other => Err(other.expected("Literal")),
		}
	}

	/// The root-object body, or a corruption error for other variants.
	pub fn as_root(&self) -> Result<&RootBody> {
		match *self {
			Atom::Root(ref body) => Ok(body),
			ref other => Err(other.expected("RootObject")),
		}
	}

	/// The list node, or a corruption error for other variants.
	pub fn as_list(&self) -> Result<&ListNode> {
		match *self {
			Atom::List(ref node) => Ok(node),
			ref other => Err(other.expected("List")),
		}
	}

	/// The dictionary body, or a corruption error for other variants.
	pub fn as_dict(&self) -> Result<&DictBody> {
		match *self {
			Atom::Dict(ref body) => Ok(body),
			ref other => Err(other.expected("Dictionary")),
		}
	}

	/// The hash node, or a corruption error for other variants.
	pub fn as_hash_dict(&self) -> Result<&HashNode> {
		match *self {
			Atom::HashDict(ref node) => Ok(node),
			ref other => Err(other.expected("HashDictionary")),
		}
	}

	/// The chain link, or a corruption error for other variants.
	pub fn as_chain(&self) -> Result<&ChainNode> {
		match *self {
			Atom::Chain(ref node) => Ok(node),
			ref other => Err(other.expected("Chain")),
		}
	}

	/// The set body, or a corruption error for other variants.
	pub fn as_set(&self) -> Result<&SetBody> {
		match *self {
			Atom::Set(ref body) => Ok(body),
			ref other => Err(other.expected("Set")),
		}
	}

	/// The counted-set body, or a corruption error for other variants.
	pub fn as_counted_set(&self) -> Result<&CountedSetBody> {
		match *self {
			Atom::CountedSet(ref body) => Ok(body),
			ref other => Err(other.expected("CountedSet")),
		}
	}
}

struct AtomCell {
	pointer: Mutex<Option<Pointer>>,
	body: RwLock<Option<Arc<Atom>>>,
	loader: Mutex<Option<Arc<Loader>>>,
	class_hint: Mutex<Option<String>>,
	saving: AtomicBool,
}

/// Shared handle to an atom.
#[derive(Clone)]
pub struct AtomRef {
	cell: Arc<AtomCell>,
}

impl ::std::fmt::Debug for AtomRef {
	fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
		match self.pointer() {
			Some(pointer) => write!(f, "AtomRef({})", pointer),
			None => write!(f, "AtomRef(@{})", self.identity()),
		}
	}
}

impl PartialEq for AtomRef {
	/// Pointer equality when both sides are persisted, reference identity
	/// otherwise.
	fn eq(&self, other: &Self) -> bool {
		if Arc::ptr_eq(&self.cell, &other.cell) {
			return true;
		}
		match (self.pointer(), other.pointer()) {
			(Some(a), Some(b)) => a == b,
			_ => false,
		}
	}
}

impl AtomRef {
	/// A fresh in-memory atom. It gains a pointer on first save.
	pub fn new(atom: Atom) -> AtomRef {
		let hint = atom.class_name().to_owned();
		AtomRef {
			cell: Arc::new(AtomCell {
				pointer: Mutex::new(None),
				body: RwLock::new(Some(Arc::new(atom))),
				loader: Mutex::new(None),
				class_hint: Mutex::new(Some(hint)),
				saving: AtomicBool::new(false),
			}),
		}
	}

	fn lazy(pointer: Pointer, loader: Arc<Loader>, class_hint: &str) -> AtomRef {
		AtomRef {
			cell: Arc::new(AtomCell {
				pointer: Mutex::new(Some(pointer)),
				body: RwLock::new(None),
				loader: Mutex::new(Some(loader)),
				class_hint: Mutex::new(Some(class_hint.to_owned())),
				saving: AtomicBool::new(false),
			}),
		}
	}

	/// The pointer, once assigned by a save.
	pub fn pointer(&self) -> Option<Pointer> {
		*self.cell.pointer.lock()
	}

	/// Per-instance identity, used to hash and compare unpointed atoms.
	pub fn identity(&self) -> usize {
		Arc::as_ptr(&self.cell) as usize
	}

	/// The variant name, available without materializing the body.
	pub fn class_name(&self) -> Result<String> {
		if let Some(ref hint) = *self.cell.class_hint.lock() {
			return Ok(hint.clone());
		}
		Ok(self.body()?.class_name().to_owned())
	}

	/// The materialized body, loading it through the owning loader on
	/// first access.
	pub fn body(&self) -> Result<Arc<Atom>> {
		if let Some(ref body) = *self.cell.body.read() {
			return Ok(body.clone());
		}

		let pointer = self.pointer().ok_or_else(|| {
			ErrorKind::Corruption("atom has neither body nor pointer".into())
		})?;
		let loader = self.cell.loader.lock().clone().ok_or_else(|| {
			ErrorKind::Corruption(format!(
				"atom {} has no loader attached and cannot be materialized", pointer
			))
		})?;

		let atom = loader.load(&pointer)?;

		let mut body = self.cell.body.write();
		if body.is_none() {
			*self.cell.class_hint.lock() = Some(atom.class_name().to_owned());
			*body = Some(atom);
		}
		Ok(body.clone().expect("just populated above; qed"))
	}

	/// Depth-first save. Returns the existing pointer for already-persisted
	/// atoms; otherwise serializes the body (saving children first) and
	/// assigns the pointer of the pushed record.
	pub fn save(&self, ctx: &SaveContext) -> Result<Pointer> {
		if let Some(pointer) = self.pointer() {
			return Ok(pointer);
		}

		// cycles are not constructible through the collection API; a
		// re-entered save means the object graph is malformed
		if self.cell.saving.swap(true, Ordering::SeqCst) {
			bail!(ErrorKind::Corruption("reference cycle detected while saving".into()));
		}
		let result = self.save_body(ctx);
		self.cell.saving.store(false, Ordering::SeqCst);
		result
	}

	fn save_body(&self, ctx: &SaveContext) -> Result<Pointer> {
		let body = self.cell.body.read().clone().ok_or_else(|| {
			ErrorKind::Corruption("unpointed atom has no body to save".into())
		})?;

		let bytes = codec::encode(&body, ctx)?;
		let pointer = ctx.storage().push_bytes(&bytes)?;

		*self.cell.pointer.lock() = Some(pointer);
		*self.cell.loader.lock() = Some(ctx.loader().clone());
		ctx.loader().register(pointer, self);
		Ok(pointer)
	}
}

/// Loads atoms from storage and keeps the weak, pointer-keyed cache that
/// makes two paths to the same record share one instance. Owned by the
/// object space; cleared on close.
pub struct Loader {
	storage: Arc<Storage>,
	literals: Arc<LiteralPool>,
	cache: Mutex<HashMap<Pointer, Weak<AtomCell>>>,
	inserts: AtomicUsize,
	// weak self-handle so `&self` methods can hand out owning clones
	this: Mutex<Weak<Loader>>,
}

impl Loader {
	/// A loader over `storage` with an empty cache. Literal atoms met while
	/// decoding are adopted into `literals`.
	pub fn new(storage: Arc<Storage>, literals: Arc<LiteralPool>) -> Arc<Loader> {
		let loader = Arc::new(Loader {
			storage,
			literals,
			cache: Mutex::new(HashMap::new()),
			inserts: AtomicUsize::new(0),
			this: Mutex::new(Weak::new()),
		});
		*loader.this.lock() = Arc::downgrade(&loader);
		loader
	}

	/// The backing storage.
	pub fn storage(&self) -> &Arc<Storage> {
		&self.storage
	}

	/// Seeds the literal pool with a persisted literal met during a load,
	/// so later saves of the same string reuse its record.
	pub fn adopt_literal(&self, s: &str, literal: &AtomRef) {
		self.literals.adopt(s, literal.clone());
	}

	fn handle(&self) -> Arc<Loader> {
		self.this.lock().upgrade().expect("self-handle is set at construction; qed")
	}

	fn load(&self, pointer: &Pointer) -> Result<Arc<Atom>> {
		let bytes = self.storage.get_bytes(pointer)?;
		Ok(Arc::new(codec::decode(&bytes, self)?))
	}

	/// The ref for a pointer, shared with every other path that reached
	/// the same record while the previous instance is still alive.
	pub fn resolve(&self, pointer: Pointer, class_hint: &str) -> AtomRef {
		let mut cache = self.cache.lock();
		if let Some(cell) = cache.get(&pointer).and_then(Weak::upgrade) {
			return AtomRef { cell };
		}

		let atom = AtomRef::lazy(pointer, self.handle(), class_hint);
		cache.insert(pointer, Arc::downgrade(&atom.cell));
		self.sweep(&mut cache);
		atom
	}

	/// Records a freshly saved atom under its new pointer.
	pub fn register(&self, pointer: Pointer, atom: &AtomRef) {
		let mut cache = self.cache.lock();
		cache.insert(pointer, Arc::downgrade(&atom.cell));
		self.sweep(&mut cache);
	}

	fn sweep(&self, cache: &mut HashMap<Pointer, Weak<AtomCell>>) {
		if self.inserts.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
			cache.retain(|_, cell| cell.upgrade().is_some());
		}
	}

	/// Drops every cached entry.
	pub fn clear(&self) {
		self.cache.lock().clear();
	}
}

/// Everything a recursive save needs: the storage to push records to and
/// the literal pool for string fields. Interned strings are collected so a
/// committing transaction can fold them into the persisted literal root.
pub struct SaveContext {
	loader: Arc<Loader>,
	literals: Arc<LiteralPool>,
	interned: Mutex<Vec<(String, AtomRef)>>,
}

impl SaveContext {
	pub fn new(loader: Arc<Loader>, literals: Arc<LiteralPool>) -> SaveContext {
		SaveContext {
			loader,
			literals,
			interned: Mutex::new(Vec::new()),
		}
	}

	pub fn loader(&self) -> &Arc<Loader> {
		&self.loader
	}

	pub fn storage(&self) -> &Arc<Storage> {
		self.loader.storage()
	}

	/// The saved literal atom for `s`, interned process-wide.
	pub fn literal(&self, s: &str) -> Result<AtomRef> {
		let literal = self.literals.intern(s);
		literal.save(self)?;
		if literal.pointer().is_none() {
			bail!(ErrorKind::Corruption(format!(
				"literal save produced no pointer for {:?}", s
			)));
		}
		self.interned.lock().push((s.to_owned(), literal.clone()));
		Ok(literal)
	}

	/// The literals interned through this context, for promotion into the
	/// literal root.
	pub fn take_interned(&self) -> Vec<(String, AtomRef)> {
		::std::mem::replace(&mut *self.interned.lock(), Vec::new())
	}
}
