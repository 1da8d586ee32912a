#![allow(unknown_lints)]
#![allow(missing_docs)]

use std::io;
use std::path::PathBuf;

use serde_json;

error_chain! {
	foreign_links {
		Io(io::Error);
		Json(serde_json::Error);
	}

	errors {
		UnknownDatabase(name: String) {
			description("No database with that name"),
			display("Unknown database: {}", name),
		}
		DatabaseExists(name: String) {
			description("A database with that name already exists"),
			display("Database already exists: {}", name),
		}
		TransactionNotRunning {
			description("Transaction is already committed or aborted"),
			display("Transaction is no longer running"),
		}
		InvalidRootSlot(text: String) {
			description("Root slot does not contain a valid pointer"),
			display("Invalid root slot content: {:?}", text),
		}
		InvalidOptions(field: &'static str, error: String) {
			description("Invalid options were provided"),
			display("Invalid value of `{}`: {}", field, error),
		}
		FieldMissing(class_name: String, field: String) {
			description("Atom payload carries a field the variant does not accept"),
			display("Atom {} has no field {:?}", class_name, field),
		}
		StoreLocked(path: PathBuf) {
			description("Store file lock is currently acquired"),
			display("Could not acquire store file lock: {}. \
					 If you're sure that no other process is using \
					 the store you can delete this file.", path.display()),
		}
		Corruption(msg: String) {
			description("A persisted invariant does not hold"),
			display("Store corruption detected. {}", msg),
		}
		Concurrency(msg: String) {
			description("Operation log could not be replayed over the newer state"),
			display("Concurrent update could not be reconciled. {}", msg),
		}
	}
}

impl PartialEq for ErrorKind {
	fn eq(&self, other: &Self) -> bool {
		use self::ErrorKind::*;

		match (self, other) {
			(&UnknownDatabase(ref a), &UnknownDatabase(ref b)) if a == b => true,
			(&DatabaseExists(ref a), &DatabaseExists(ref b)) if a == b => true,
			(&TransactionNotRunning, &TransactionNotRunning) => true,
			(&InvalidRootSlot(ref a), &InvalidRootSlot(ref b)) if a == b => true,
			(&InvalidOptions(field, ref error), &InvalidOptions(field2, ref error2))
				if field == field2 && error == error2 => true,
			(&FieldMissing(ref c, ref f), &FieldMissing(ref c2, ref f2))
				if c == c2 && f == f2 => true,
			(&StoreLocked(ref a), &StoreLocked(ref b)) if a == b => true,
			(&Corruption(ref a), &Corruption(ref b)) if a == b => true,
			(&Concurrency(ref a), &Concurrency(ref b)) if a == b => true,
			_ => false,
		}
	}
}
