//! Embedded transactional append-only object store
//!
//! Assumptions:
//!
//! - a family of immutable, persistent collections (list, ordered
//!   dictionary, hash dictionary, set, counted set) is the observable value
//!
//! - collections are trees of atoms with structural sharing; a mutation
//!   returns a new value and rebuilds only the spine it touched
//!
//! - everything durable hangs off one root pointer, swung atomically on
//!   commit; data itself is never rewritten
//!
//! - readers see the root they sampled and are never blocked
//!
//! The backing file is a fixed root slot followed by append-only pages:
//!
//! ```text
//!  root slot   gap      page 1    page 2
//!   /           /        /         /
//! |[0,1024)|..zeros..|--------|--------|...
//! ```
//!
//! Atoms are length-prefixed records addressed by `(stream, offset)`
//! pointers and may straddle page boundaries:
//!
//! ```text
//!  u64_le(len)  payload (flat JSON map)
//!   /           /
//! |........|...............|
//! ```
//!
//! A commit prepends a new root object to the persistent root-history list
//! and swings the slot pointer to the new head; a transaction that began
//! earlier keeps reading the old head (snapshot isolation).

#![warn(missing_docs)]

extern crate base64;
extern crate byteorder;
extern crate chrono;
#[macro_use]
extern crate error_chain;
extern crate fs2;
#[macro_use]
extern crate log;
extern crate parking_lot;
extern crate serde_json;
extern crate sha2;
extern crate uuid;
#[cfg(test)]
#[macro_use]
extern crate matches;
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

mod atom;
mod chain;
mod codec;
mod counted_set;
mod dict;
mod error;
mod hash_dict;
mod index;
mod list;
mod literal;
mod options;
mod pointer;
mod set;
mod space;
mod store;
mod transaction;
mod value;

pub use atom::{Atom, AtomRef};
pub use counted_set::CountedSet;
pub use dict::Dictionary;
pub use error::{Error, ErrorKind, Result};
pub use hash_dict::HashDictionary;
pub use index::Indexes;
pub use list::List;
pub use options::Options;
pub use pointer::Pointer;
pub use set::{Set, SetOp};
pub use space::{Database, ObjectSpace};
pub use store::Storage;
pub use transaction::Transaction;
pub use value::{Value, stable_hash_32};
