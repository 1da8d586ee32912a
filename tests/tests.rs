extern crate chrono;
extern crate perennedb;
extern crate tempdir;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tempdir::TempDir;
use perennedb::{
	CountedSet, Database, Dictionary, ErrorKind, List, ObjectSpace, Options, Set,
	Transaction, Value,
};

const DB: &str = "MyTestDb";

fn small_options() -> Options {
	Options {
		page_size: 1024,
		root_flush_debounce: Duration::from_secs(60),
		..Default::default()
	}
}

fn open_space<P: AsRef<Path>>(path: P) -> ObjectSpace {
	ObjectSpace::open(path, small_options()).unwrap()
}

fn string_list(items: &[&str]) -> List {
	let mut list = List::new();
	for item in items {
		list = list.append_last(&Value::from(*item)).unwrap();
	}
	list
}

fn assert_string_list(value: &Value, expected: &[&str]) {
	let list = List::from_value(value).unwrap();
	assert_eq!(list.count().unwrap(), expected.len() as u64);
	for (index, item) in expected.iter().enumerate() {
		assert_eq!(list.get_at(index as i64).unwrap(), Value::from(*item));
	}
}

#[derive(Debug)]
enum Action {
	SetList(&'static str, &'static [&'static str]),
	AssertList(&'static str, &'static [&'static str]),
	AssertNoRoot(&'static str),
	RemoveRoot(&'static str),
	Commit,
	Reopen,
}

use Action::*;

struct Rig {
	path: PathBuf,
	space: ObjectSpace,
	database: Database,
	tx: Option<Transaction>,
}

impl Rig {
	fn new(path: PathBuf) -> Rig {
		let space = open_space(&path);
		let database = space.new_database(DB).unwrap();
		let tx = Some(database.begin().unwrap());
		Rig { path, space, database, tx }
	}

	fn tx(&mut self) -> &mut Transaction {
		self.tx.as_mut().expect("rig always holds a running transaction")
	}

	fn run(&mut self, actions: &[Action]) {
		for action in actions {
			println!("action: {:?}", action);
			match *action {
				SetList(name, items) => {
					let list = string_list(items);
					self.tx().set_root_object(name, list.into()).unwrap();
				},
				AssertList(name, items) => {
					let value = self.tx().get_root_object(name).unwrap();
					assert_string_list(&value, items);
				},
				AssertNoRoot(name) => {
					assert!(self.tx().get_root_object(name).unwrap().is_none());
				},
				RemoveRoot(name) => {
					self.tx().remove_root_object(name).unwrap();
				},
				Commit => {
					self.tx.take().unwrap().commit().unwrap();
					self.tx = Some(self.database.begin().unwrap());
				},
				Reopen => {
					self.tx.take().unwrap().abort();
					self.space.close().unwrap();
					self.space = open_space(&self.path);
					self.database = self.space.database(DB).unwrap();
					self.tx = Some(self.database.begin().unwrap());
				},
			}
		}
	}
}

macro_rules! space_test {
	($name: tt, $($actions: expr),*) => {
		#[test]
		fn $name() {
			let temp = TempDir::new(stringify!($name)).unwrap();
			let mut rig = Rig::new(temp.path().join("space.db"));
			rig.run(&[$($actions),*]);
		}
	}
}

space_test!(
	test_list_roots_survive_commit_and_reopen,
	SetList("my_list", &["hello", "world"]),
	AssertList("my_list", &["hello", "world"]),
	Commit,
	AssertList("my_list", &["hello", "world"]),
	Reopen,
	AssertList("my_list", &["hello", "world"])
);

space_test!(
	test_staged_roots_are_invisible_until_commit,
	SetList("a", &["1"]),
	Commit,
	SetList("b", &["2"]),
	AssertList("b", &["2"]),
	Reopen,
	AssertList("a", &["1"]),
	AssertNoRoot("b")
);

space_test!(
	test_root_removal,
	SetList("a", &["1"]),
	SetList("b", &["2"]),
	Commit,
	RemoveRoot("a"),
	AssertNoRoot("a"),
	AssertList("b", &["2"]),
	Commit,
	AssertNoRoot("a"),
	Reopen,
	AssertNoRoot("a"),
	AssertList("b", &["2"])
);

space_test!(
	test_later_commits_overwrite,
	SetList("a", &["1"]),
	Commit,
	SetList("a", &["1", "2"]),
	Commit,
	Reopen,
	AssertList("a", &["1", "2"])
);

#[test]
fn test_empty_space_to_list_of_two() {
	let temp = TempDir::new("empty_to_two").unwrap();
	let path = temp.path().join("space.db");

	{
		let space = open_space(&path);
		let database = space.new_database(DB).unwrap();
		let mut tx = database.begin().unwrap();

		let list = List::new()
			.append_last(&Value::from("hello")).unwrap()
			.append_last(&Value::from("world")).unwrap();
		tx.set_root_object("my_list", list.into()).unwrap();
		tx.commit().unwrap();
		space.close().unwrap();
	}

	let space = open_space(&path);
	let tx = space.database(DB).unwrap().begin().unwrap();
	let value = tx.get_root_object("my_list").unwrap();
	let list = List::from_value(&value).unwrap();

	assert_eq!(list.count().unwrap(), 2);
	assert_eq!(list.get_at(0).unwrap(), Value::from("hello"));
	assert_eq!(list.get_at(1).unwrap(), Value::from("world"));
}

#[test]
fn test_snapshot_isolation() {
	let temp = TempDir::new("snapshot_isolation").unwrap();
	let space = open_space(temp.path().join("space.db"));
	let database = space.new_database(DB).unwrap();

	let early = database.begin().unwrap();

	let mut writer = database.begin().unwrap();
	writer.set_root_object("seen", string_list(&["yes"]).into()).unwrap();
	writer.commit().unwrap();

	// the earlier transaction keeps its pre-commit snapshot
	assert!(early.get_root_object("seen").unwrap().is_none());

	let late = database.begin().unwrap();
	assert_string_list(&late.get_root_object("seen").unwrap(), &["yes"]);
}

#[test]
fn test_abort_discards_staged_roots() {
	let temp = TempDir::new("abort").unwrap();
	let space = open_space(temp.path().join("space.db"));
	let database = space.new_database(DB).unwrap();

	let mut tx = database.begin().unwrap();
	tx.set_root_object("gone", string_list(&["x"]).into()).unwrap();
	tx.abort();

	let tx = database.begin().unwrap();
	assert!(tx.get_root_object("gone").unwrap().is_none());
}

#[test]
fn test_nested_transactions() {
	let temp = TempDir::new("nested").unwrap();
	let space = open_space(temp.path().join("space.db"));
	let database = space.new_database(DB).unwrap();

	// nested commit merges into the enclosing transaction
	let mut tx = database.begin().unwrap();
	tx.set_root_object("outer", string_list(&["o"]).into()).unwrap();
	let mut nested = tx.begin_nested();
	assert_string_list(&nested.get_root_object("outer").unwrap(), &["o"]);
	nested.set_root_object("inner", string_list(&["i"]).into()).unwrap();
	let tx = nested.commit().unwrap().expect("nested commit returns the enclosing transaction");
	assert_string_list(&tx.get_root_object("inner").unwrap(), &["i"]);
	tx.commit().unwrap();

	let tx = database.begin().unwrap();
	assert_string_list(&tx.get_root_object("outer").unwrap(), &["o"]);
	assert_string_list(&tx.get_root_object("inner").unwrap(), &["i"]);

	// nested abort keeps the enclosing staging intact
	let mut tx = database.begin().unwrap();
	tx.set_root_object("kept", string_list(&["k"]).into()).unwrap();
	let mut nested = tx.begin_nested();
	nested.set_root_object("dropped", string_list(&["d"]).into()).unwrap();
	let tx = nested.abort().expect("nested abort returns the enclosing transaction");
	assert!(tx.get_root_object("dropped").unwrap().is_none());
	assert_string_list(&tx.get_root_object("kept").unwrap(), &["k"]);
}

#[test]
fn test_database_lifecycle() {
	let temp = TempDir::new("db_lifecycle").unwrap();
	let space = open_space(temp.path().join("space.db"));

	space.new_database("first").unwrap();
	assert_eq!(
		*space.new_database("first").unwrap_err().kind(),
		ErrorKind::DatabaseExists("first".into())
	);
	assert_eq!(
		*space.database("absent").unwrap_err().kind(),
		ErrorKind::UnknownDatabase("absent".into())
	);

	space.rename_database("first", "second").unwrap();
	assert!(space.database("first").is_err());
	let database = space.database("second").unwrap();
	let mut tx = database.begin().unwrap();
	tx.set_root_object("x", string_list(&["1"]).into()).unwrap();
	tx.commit().unwrap();

	space.remove_database("second").unwrap();
	assert_eq!(
		*space.remove_database("second").unwrap_err().kind(),
		ErrorKind::UnknownDatabase("second".into())
	);
	assert_eq!(space.database_names().unwrap(), Vec::<String>::new());
}

#[test]
fn test_scalar_roots_roundtrip() {
	let temp = TempDir::new("scalars").unwrap();
	let path = temp.path().join("space.db");

	let datetime = Utc::now();
	let duration = chrono::Duration::microseconds(12_345_678);

	{
		let space = open_space(&path);
		let database = space.new_database(DB).unwrap();
		let mut tx = database.begin().unwrap();
		tx.set_root_object("flag", Value::Bool(true)).unwrap();
		tx.set_root_object("answer", Value::Int(42)).unwrap();
		tx.set_root_object("ratio", Value::Float(0.5)).unwrap();
		tx.set_root_object("name", Value::from("perenne")).unwrap();
		tx.set_root_object("blob", Value::Bytes(vec![1, 2, 3])).unwrap();
		tx.set_root_object("when", Value::DateTime(datetime)).unwrap();
		tx.set_root_object("how_long", Value::Duration(duration)).unwrap();
		tx.commit().unwrap();
		space.close().unwrap();
	}

	let space = open_space(&path);
	let tx = space.database(DB).unwrap().begin().unwrap();
	assert_eq!(tx.get_root_object("flag").unwrap(), Value::Bool(true));
	assert_eq!(tx.get_root_object("answer").unwrap(), Value::Int(42));
	assert_eq!(tx.get_root_object("ratio").unwrap(), Value::Float(0.5));
	assert_eq!(tx.get_root_object("name").unwrap(), Value::from("perenne"));
	assert_eq!(tx.get_root_object("blob").unwrap(), Value::Bytes(vec![1, 2, 3]));
	assert_eq!(tx.get_root_object("when").unwrap(), Value::DateTime(datetime));
	assert_eq!(tx.get_root_object("how_long").unwrap(), Value::Duration(duration));
}

#[test]
fn test_ordered_dictionary_roundtrip() {
	let temp = TempDir::new("dict_roundtrip").unwrap();
	let path = temp.path().join("space.db");

	{
		let space = open_space(&path);
		let database = space.new_database(DB).unwrap();
		let mut tx = database.begin().unwrap();

		let mut dict = Dictionary::new();
		for (key, value) in vec![
			(Value::Bool(true), Value::Int(1)),
			(Value::Int(0), Value::Int(2)),
			(Value::Float(1.5), Value::Int(3)),
			(Value::from("b"), Value::Int(4)),
			(Value::from("a"), Value::Int(5)),
		] {
			dict = dict.set_at(&key, &value).unwrap();
		}
		tx.set_root_object("dict", dict.into()).unwrap();
		tx.commit().unwrap();
		space.close().unwrap();
	}

	let space = open_space(&path);
	let tx = space.database(DB).unwrap().begin().unwrap();
	let dict = Dictionary::from_value(&tx.get_root_object("dict").unwrap()).unwrap();

	// groups: numbers, then booleans, then strings
	assert_eq!(dict.keys().unwrap(), vec![
		Value::Int(0),
		Value::Float(1.5),
		Value::Bool(true),
		Value::from("a"),
		Value::from("b"),
	]);
	assert_eq!(dict.get_at(&Value::from("a")).unwrap(), Value::Int(5));
}

#[test]
fn test_set_roundtrip_and_rebase() {
	let temp = TempDir::new("set_rebase").unwrap();
	let path = temp.path().join("space.db");
	let space = open_space(&path);
	let database = space.new_database(DB).unwrap();

	{
		let mut tx = database.begin().unwrap();
		let base = Set::new().add(&Value::from("a")).unwrap();
		tx.set_root_object("tags", base.into()).unwrap();
		tx.commit().unwrap();
	}

	// two transactions derive divergent sets from the same base
	let tx1 = database.begin().unwrap();
	let tx2 = database.begin().unwrap();
	let first = Set::from_value(&tx1.get_root_object("tags").unwrap()).unwrap()
		.add(&Value::from("b")).unwrap();
	let second = Set::from_value(&tx2.get_root_object("tags").unwrap()).unwrap()
		.add(&Value::from("c")).unwrap();

	{
		let mut tx1 = tx1;
		tx1.set_root_object("tags", first.into()).unwrap();
		tx1.commit().unwrap();
	}

	// the loser rebases its op log onto the committed head
	let committed = Set::from_value(
		&database.begin().unwrap().get_root_object("tags").unwrap()
	).unwrap();
	let merged = second.concurrent_update(&committed).unwrap();
	let mut tx2 = tx2;
	tx2.set_root_object("tags", merged.into()).unwrap();
	tx2.commit().unwrap();

	let reloaded = Set::from_value(
		&database.begin().unwrap().get_root_object("tags").unwrap()
	).unwrap();
	for item in &["a", "b", "c"] {
		assert!(reloaded.has(&Value::from(*item)).unwrap(), "missing {}", item);
	}
	assert_eq!(reloaded.count().unwrap(), 3);
}

#[test]
fn test_counted_set_roundtrip() {
	let temp = TempDir::new("counted_roundtrip").unwrap();
	let path = temp.path().join("space.db");

	{
		let space = open_space(&path);
		let database = space.new_database(DB).unwrap();
		let mut tx = database.begin().unwrap();

		let mut tally = CountedSet::new();
		for item in &["a", "b", "a", "a", "b"] {
			tally = tally.add(&Value::from(*item)).unwrap();
		}
		tx.set_root_object("tally", tally.into()).unwrap();
		tx.commit().unwrap();
		space.close().unwrap();
	}

	let space = open_space(&path);
	let tx = space.database(DB).unwrap().begin().unwrap();
	let tally = CountedSet::from_value(&tx.get_root_object("tally").unwrap()).unwrap();

	assert_eq!(tally.unique_count().unwrap(), 2);
	assert_eq!(tally.total_count().unwrap(), 5);
	assert_eq!(tally.get_count(&Value::from("a")).unwrap(), 3);
	assert_eq!(tally.get_count(&Value::from("b")).unwrap(), 2);
}

#[test]
fn test_history_is_prepended_and_queryable() {
	let temp = TempDir::new("history").unwrap();
	let space = open_space(temp.path().join("space.db"));
	let database = space.new_database(DB).unwrap();

	let after_create = space.history().unwrap().count().unwrap();
	assert_eq!(after_create, 1);

	let mut tx = database.begin().unwrap();
	tx.set_root_object("x", string_list(&["1"]).into()).unwrap();
	tx.commit().unwrap();

	assert_eq!(space.history().unwrap().count().unwrap(), 2);

	// the newest root at or before "now" carries the database
	let roots = space.root_at(Utc::now()).unwrap().unwrap();
	assert!(!roots.get_at(&Value::from(DB)).unwrap().is_none());
}

#[test]
fn test_literals_survive_reopen() {
	let temp = TempDir::new("literals").unwrap();
	let path = temp.path().join("space.db");

	{
		let space = open_space(&path);
		let database = space.new_database(DB).unwrap();
		let mut tx = database.begin().unwrap();
		let literal = tx.get_literal("shared text").unwrap();
		tx.set_root_object("a", string_list(&["shared text"]).into()).unwrap();
		tx.commit().unwrap();
		assert!(literal.pointer().is_some());
		space.close().unwrap();
	}

	let space = open_space(&path);
	let tx = space.database(DB).unwrap().begin().unwrap();
	assert_string_list(&tx.get_root_object("a").unwrap(), &["shared text"]);
}
