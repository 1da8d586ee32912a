//! The object space: named databases over one backing store.
//!
//! All durable state hangs off a single pointer in the store's root slot.
//! It names the head of the root history, a persistent list of root
//! objects, newest first. A commit builds the next root object, prepends
//! it and swings the pointer; readers keep whatever head they sampled.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use atom::{Atom, AtomRef, Loader, SaveContext};
use dict::Dictionary;
use error::{ErrorKind, Result};
use list::List;
use literal::LiteralPool;
use options::Options;
use store::Storage;
use transaction::Transaction;
use value::Value;

/// The top-level atom a commit anchors.
#[derive(Debug)]
pub struct RootBody {
	/// Database name → database root dictionary.
	pub(crate) object_root: AtomRef,
	/// Interned string → literal atom.
	pub(crate) literal_root: AtomRef,
	/// Commit timestamp, used for history queries.
	pub(crate) created_at: DateTime<Utc>,
}

pub(crate) struct SpaceInner {
	pub(crate) storage: Arc<Storage>,
	pub(crate) loader: Arc<Loader>,
	pub(crate) literals: Arc<LiteralPool>,
	/// Serializes writers; readers never take it.
	pub(crate) lock: Mutex<()>,
}

impl SpaceInner {
	/// The root history list, empty if nothing was ever committed.
	pub(crate) fn history(&self) -> Result<List> {
		match self.storage.current_root() {
			Some(pointer) => List::from_atom(self.loader.resolve(pointer, "List")),
			None => Ok(List::new()),
		}
	}

	/// The object and literal dictionaries of the current head.
	pub(crate) fn head_roots(&self) -> Result<(Dictionary, Dictionary)> {
		let head = self.history()?.get_at(0)?;
		match head.atom() {
			Some(atom) => {
				let body = atom.body()?;
				let root = body.as_root()?;
				Ok((
					Dictionary::from_atom(root.object_root.clone())?,
					Dictionary::from_atom(root.literal_root.clone())?,
				))
			},
			None => Ok((Dictionary::new(), Dictionary::new())),
		}
	}

	/// Commits a new head: applies `mutate` to the current object root,
	/// folds freshly interned literals into the literal root, prepends a
	/// new root object to the history and swings the store pointer.
	pub(crate) fn swing<F>(&self, mutate: F, staged_literals: Vec<(String, AtomRef)>) -> Result<()>
	where F: FnOnce(&Dictionary) -> Result<Dictionary> {
		let _guard = self.lock.lock();

		let (object_root, literal_root) = self.head_roots()?;
		let object_root = mutate(&object_root)?;

		let ctx = SaveContext::new(self.loader.clone(), self.literals.clone());
		object_root.as_atom().save(&ctx)?;

		// folding may intern the keys it writes; iterate until the save
		// surfaces nothing new
		let mut literal_root = literal_root;
		let mut pending = staged_literals;
		pending.extend(ctx.take_interned());
		while !pending.is_empty() {
			for (string, literal) in pending.drain(..) {
				let key = Value::Str(string);
				if literal_root.get_at(&key)?.is_none() {
					literal_root = literal_root.set_at(&key, &Value::Atom(literal))?;
				}
			}
			literal_root.as_atom().save(&ctx)?;
			pending.extend(ctx.take_interned());
		}

		let root = AtomRef::new(Atom::Root(RootBody {
			object_root: object_root.as_atom().clone(),
			literal_root: literal_root.as_atom().clone(),
			created_at: Utc::now(),
		}));

		let history = self.history()?.append_first(&Value::Atom(root))?;
		let head = history.as_atom().save(&ctx)?;
		self.storage.set_current_root(head);
		debug!("root history advanced to {}", head);
		Ok(())
	}
}

/// An open object space.
#[derive(Clone)]
pub struct ObjectSpace {
	inner: Arc<SpaceInner>,
}

impl ObjectSpace {
	/// Opens a space over the store file at `path`, creating it if absent.
	pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<ObjectSpace> {
		let storage = Arc::new(Storage::open(path, options)?);
		let literals = Arc::new(LiteralPool::new());
		let loader = Loader::new(storage.clone(), literals.clone());

		let space = ObjectSpace {
			inner: Arc::new(SpaceInner {
				storage,
				loader,
				literals,
				lock: Mutex::new(()),
			}),
		};
		space.hydrate_literals()?;
		Ok(space)
	}

	/// Walks the persisted literal root once. Decoding its entries adopts
	/// every literal into the pool, so reopened spaces keep deduplicating
	/// against the records already on disk.
	fn hydrate_literals(&self) -> Result<()> {
		let (_, literal_root) = self.inner.head_roots()?;
		for entry in literal_root.iter()? {
			entry?;
		}
		Ok(())
	}

	/// Closes the space: drops the caches and flushes the store.
	pub fn close(&self) -> Result<()> {
		self.inner.loader.clear();
		self.inner.literals.clear();
		self.inner.storage.close()
	}

	/// The root history, newest first.
	pub fn history(&self) -> Result<List> {
		self.inner.history()
	}

	/// The database map as of the newest root created at or before
	/// `instant`, if any such root exists.
	pub fn root_at(&self, instant: DateTime<Utc>) -> Result<Option<Dictionary>> {
		for entry in self.history()?.iter()? {
			let root = entry?;
			let atom = root.atom().ok_or_else(|| {
				ErrorKind::Corruption("history entry is not a root object".into())
			})?;
			let body = atom.body()?;
			let root = body.as_root()?;
			if root.created_at <= instant {
				return Ok(Some(Dictionary::from_atom(root.object_root.clone())?));
			}
		}
		Ok(None)
	}

	/// Names of all databases in the current head.
	pub fn database_names(&self) -> Result<Vec<String>> {
		let (object_root, _) = self.inner.head_roots()?;
		object_root.keys()?.into_iter()
			.map(|key| key.as_str().map(str::to_owned).ok_or_else(|| {
				ErrorKind::Corruption("database name is not a string".into()).into()
			}))
			.collect()
	}

	/// Creates a database and commits the new head.
	pub fn new_database(&self, name: &str) -> Result<Database> {
		self.inner.swing(|object_root| {
			let key = Value::from(name);
			if !object_root.get_at(&key)?.is_none() {
				bail!(ErrorKind::DatabaseExists(name.into()));
			}
			object_root.set_at(&key, &Dictionary::new().into())
		}, Vec::new())?;

		Ok(Database {
			inner: self.inner.clone(),
			name: name.to_owned(),
		})
	}

	/// A handle to an existing database.
	pub fn database(&self, name: &str) -> Result<Database> {
		let (object_root, _) = self.inner.head_roots()?;
		if object_root.get_at(&Value::from(name))?.is_none() {
			bail!(ErrorKind::UnknownDatabase(name.into()));
		}
		Ok(Database {
			inner: self.inner.clone(),
			name: name.to_owned(),
		})
	}

	/// Renames a database and commits the new head.
	pub fn rename_database(&self, old: &str, new: &str) -> Result<()> {
		self.inner.swing(|object_root| {
			let old_key = Value::from(old);
			let new_key = Value::from(new);

			let root = object_root.get_at(&old_key)?;
			if root.is_none() {
				bail!(ErrorKind::UnknownDatabase(old.into()));
			}
			if !object_root.get_at(&new_key)?.is_none() {
				bail!(ErrorKind::DatabaseExists(new.into()));
			}
			object_root.remove_at(&old_key)?.set_at(&new_key, &root)
		}, Vec::new())
	}

	/// Removes a database and commits the new head.
	pub fn remove_database(&self, name: &str) -> Result<()> {
		self.inner.swing(|object_root| {
			let key = Value::from(name);
			if object_root.get_at(&key)?.is_none() {
				bail!(ErrorKind::UnknownDatabase(name.into()));
			}
			object_root.remove_at(&key)
		}, Vec::new())
	}
}

/// A named database inside a space.
#[derive(Clone)]
pub struct Database {
	inner: Arc<SpaceInner>,
	name: String,
}

impl ::std::fmt::Debug for Database {
	fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
		f.debug_struct("Database").field("name", &self.name).finish()
	}
}

impl Database {
	/// The database name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Begins a transaction. Its snapshot is the database root as of this
	/// call and is unaffected by later commits.
	pub fn begin(&self) -> Result<Transaction> {
		let (object_root, _) = self.inner.head_roots()?;
		let root = object_root.get_at(&Value::from(self.name.as_str()))?;
		if root.is_none() {
			bail!(ErrorKind::UnknownDatabase(self.name.clone()));
		}
		let base_root = Dictionary::from_value(&root)?;
		Ok(Transaction::new(self.inner.clone(), self.name.clone(), base_root))
	}
}
