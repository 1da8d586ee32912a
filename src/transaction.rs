//! Transactions: snapshot reads, staged writes, commit and abort.
//!
//! A transaction snapshots its database root at begin and never sees later
//! commits (snapshot isolation). Writes stage locally; a top-level commit
//! re-reads the current head under the space lock, applies the staged
//! entries in name order and swings the root pointer. A nested commit only
//! merges its staging into the enclosing transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use atom::{AtomRef, SaveContext};
use dict::Dictionary;
use error::{ErrorKind, Result};
use space::SpaceInner;
use value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
	Running,
	Committed,
	Aborted,
}

/// A running unit of work against one database.
pub struct Transaction {
	inner: Arc<SpaceInner>,
	database: String,
	base_root: Dictionary,
	/// Staged root writes, name → value. The empty value stages a removal.
	staged_roots: BTreeMap<String, Value>,
	staged_literals: Vec<(String, AtomRef)>,
	state: State,
	enclosing: Option<Box<Transaction>>,
}

impl Transaction {
	pub(crate) fn new(inner: Arc<SpaceInner>, database: String, base_root: Dictionary) -> Transaction {
		Transaction {
			inner,
			database,
			base_root,
			staged_roots: BTreeMap::new(),
			staged_literals: Vec::new(),
			state: State::Running,
			enclosing: None,
		}
	}

	fn ensure_running(&self) -> Result<()> {
		if self.state != State::Running {
			bail!(ErrorKind::TransactionNotRunning);
		}
		Ok(())
	}

	/// Begins a nested transaction. It sees the enclosing staging and, on
	/// commit, merges back into it without touching storage. Dropping the
	/// nested transaction without finishing it aborts the whole chain.
	pub fn begin_nested(self) -> Transaction {
		let mut nested = Transaction::new(
			self.inner.clone(),
			self.database.clone(),
			self.base_root.clone(),
		);
		nested.staged_roots = self.staged_roots.clone();
		nested.staged_literals = self.staged_literals.clone();
		nested.enclosing = Some(Box::new(self));
		nested
	}

	/// The root value stored under `name`: staged state if present, the
	/// begin-time snapshot otherwise.
	pub fn get_root_object(&self, name: &str) -> Result<Value> {
		self.ensure_running()?;
		if let Some(staged) = self.staged_roots.get(name) {
			return Ok(staged.clone());
		}
		self.base_root.get_at(&Value::from(name))
	}

	/// Stages `value` under `name`. An atom value is saved immediately so
	/// it owns a pointer from here on.
	pub fn set_root_object(&mut self, name: &str, value: Value) -> Result<()> {
		self.ensure_running()?;

		if let Value::Atom(ref atom) = value {
			let ctx = SaveContext::new(self.inner.loader.clone(), self.inner.literals.clone());
			atom.save(&ctx)?;
			self.staged_literals.extend(ctx.take_interned());
		}
		self.staged_roots.insert(name.to_owned(), value);
		Ok(())
	}

	/// Stages the removal of the root under `name`.
	pub fn remove_root_object(&mut self, name: &str) -> Result<()> {
		self.ensure_running()?;
		self.staged_roots.insert(name.to_owned(), Value::None);
		Ok(())
	}

	/// The interned literal atom for `s`, staged for promotion into the
	/// literal root at commit.
	pub fn get_literal(&mut self, s: &str) -> Result<AtomRef> {
		self.ensure_running()?;
		let literal = self.inner.literals.intern(s);
		self.staged_literals.push((s.to_owned(), literal.clone()));
		Ok(literal)
	}

	/// Commits. A nested transaction merges its staging into the enclosing
	/// transaction and returns it; a top-level transaction applies the
	/// staged roots to the current head and swings the store pointer,
	/// returning `None`.
	pub fn commit(mut self) -> Result<Option<Transaction>> {
		self.ensure_running()?;

		if let Some(mut enclosing) = self.enclosing.take() {
			// the nested staging started as a copy of the enclosing one,
			// so it already carries both
			enclosing.staged_roots = ::std::mem::replace(&mut self.staged_roots, BTreeMap::new());
			enclosing.staged_literals = ::std::mem::replace(&mut self.staged_literals, Vec::new());
			self.state = State::Committed;
			return Ok(Some(*enclosing));
		}

		if self.staged_roots.is_empty() && self.staged_literals.is_empty() {
			self.state = State::Committed;
			return Ok(None);
		}

		let database = self.database.clone();
		let staged_roots = ::std::mem::replace(&mut self.staged_roots, BTreeMap::new());
		let staged_literals = ::std::mem::replace(&mut self.staged_literals, Vec::new());

		self.inner.swing(move |object_root| {
			let key = Value::from(database.as_str());
			let current = object_root.get_at(&key)?;
			if current.is_none() {
				bail!(ErrorKind::UnknownDatabase(database.clone()));
			}

			let mut db_root = Dictionary::from_value(&current)?;
			for (name, value) in staged_roots {
				db_root = match value {
					Value::None => db_root.remove_at(&Value::from(name.as_str()))?,
					value => db_root.set_at(&Value::from(name.as_str()), &value)?,
				};
			}
			object_root.set_at(&key, &db_root.into())
		}, staged_literals)?;

		self.state = State::Committed;
		Ok(None)
	}

	/// Aborts, discarding all staged state, and returns the enclosing
	/// transaction if there is one. Dropping an unfinished transaction has
	/// the same effect.
	pub fn abort(mut self) -> Option<Transaction> {
		self.state = State::Aborted;
		self.staged_roots.clear();
		self.staged_literals.clear();
		self.enclosing.take().map(|enclosing| *enclosing)
	}
}
