//! Serialization codec: atoms to flat JSON maps and back.
//!
//! Every payload is the UTF-8 JSON text of a string-keyed map with a
//! required `className`. Nested atoms are written as pointer envelopes
//! `{className, transaction_id, offset}`; strings as envelopes referencing
//! an interned literal; timestamps, durations and byte blobs as their typed
//! envelopes. Encoding is where the depth-first recursive save happens:
//! serializing a field that references an unpointed atom saves that atom
//! first.

use base64;
use chrono::{DateTime, Duration, Utc};
use serde_json::{self, Map, Number};
use serde_json::Value as Json;
use uuid::Uuid;

use atom::{Atom, AtomRef, Loader, SaveContext};
use chain::ChainNode;
use counted_set::CountedSetBody;
use dict::{DictBody, Dictionary};
use error::{ErrorKind, Result};
use hash_dict::HashNode;
use list::ListNode;
use pointer::Pointer;
use set::SetBody;
use space::RootBody;
use value::Value;

const DATETIME_CLASS: &str = "datetime.datetime";
const DURATION_CLASS: &str = "datetime.timedelta";

/// Serializes an atom, recursively saving everything it references.
pub fn encode(atom: &Atom, ctx: &SaveContext) -> Result<Vec<u8>> {
	let mut map = Map::new();
	map.insert("className".into(), Json::String(atom.class_name().into()));

	match *atom {
		Atom::Literal(ref s) => {
			map.insert("string".into(), Json::String(s.clone()));
		},
		Atom::Root(ref body) => {
			map.insert("object_root".into(), atom_envelope(&body.object_root, ctx)?);
			map.insert("literal_root".into(), atom_envelope(&body.literal_root, ctx)?);
			map.insert("created_at".into(), datetime_envelope(&body.created_at));
		},
		Atom::List(ref node) => {
			map.insert("empty".into(), Json::Bool(node.empty));
			if !node.empty {
				map.insert("value".into(), value_envelope(&node.value, ctx)?);
				map.insert("left".into(), link_envelope(&node.left, ctx)?);
				map.insert("right".into(), link_envelope(&node.right, ctx)?);
				map.insert("count".into(), Json::Number(node.count.into()));
				map.insert("height".into(), Json::Number(u64::from(node.height).into()));
			}
		},
		Atom::Dict(ref body) => {
			map.insert("count".into(), Json::Number((body.items.len() as u64).into()));
			for (index, &(ref key, ref value)) in body.items.iter().enumerate() {
				map.insert(format!("k{}", index), value_envelope(key, ctx)?);
				map.insert(format!("v{}", index), value_envelope(value, ctx)?);
			}
		},
		Atom::HashDict(ref node) => {
			match node.key {
				Some(key) => {
					map.insert("key".into(), Json::Number(i64::from(key).into()));
					map.insert("value".into(), value_envelope(&node.value, ctx)?);
					map.insert("left".into(), link_envelope(&node.left, ctx)?);
					map.insert("right".into(), link_envelope(&node.right, ctx)?);
					map.insert("count".into(), Json::Number(node.count.into()));
					map.insert("height".into(), Json::Number(u64::from(node.height).into()));
				},
				None => {
					map.insert("key".into(), Json::Null);
				},
			}
		},
		Atom::Chain(ref node) => {
			map.insert("item".into(), value_envelope(&node.item, ctx)?);
			map.insert("next".into(), link_envelope(&node.next, ctx)?);
		},
		Atom::Set(ref body) => {
			let folded = body.fold(ctx)?;
			map.insert("content".into(), atom_envelope(&folded.content, ctx)?);
		},
		Atom::CountedSet(ref body) => {
			let folded = body.fold(ctx)?;
			map.insert("items".into(), atom_envelope(&folded.items, ctx)?);
			map.insert("counts".into(), atom_envelope(&folded.counts, ctx)?);
		},
	}

	Ok(serde_json::to_vec(&Json::Object(map))?)
}

fn pointer_envelope(class_name: &str, pointer: &Pointer) -> Json {
	let mut map = Map::new();
	map.insert("className".into(), Json::String(class_name.into()));
	map.insert("transaction_id".into(), Json::String(pointer.stream().to_string()));
	map.insert("offset".into(), Json::Number(pointer.offset().into()));
	Json::Object(map)
}

fn atom_envelope(atom: &AtomRef, ctx: &SaveContext) -> Result<Json> {
	let pointer = atom.save(ctx)?;
	if atom.pointer().is_none() {
		bail!(ErrorKind::Corruption("nested atom was saved without receiving a pointer".into()));
	}
	Ok(pointer_envelope(&atom.class_name()?, &pointer))
}

fn link_envelope(link: &Option<AtomRef>, ctx: &SaveContext) -> Result<Json> {
	match *link {
		Some(ref atom) => atom_envelope(atom, ctx),
		None => Ok(Json::Null),
	}
}

fn datetime_envelope(datetime: &DateTime<Utc>) -> Json {
	let mut map = Map::new();
	map.insert("className".into(), Json::String(DATETIME_CLASS.into()));
	map.insert("iso".into(), Json::String(datetime.to_rfc3339()));
	Json::Object(map)
}

fn value_envelope(value: &Value, ctx: &SaveContext) -> Result<Json> {
	match *value {
		Value::None => Ok(Json::Null),
		Value::Bool(b) => Ok(Json::Bool(b)),
		Value::Int(i) => Ok(Json::Number(i.into())),
		Value::Float(f) => {
			let number = Number::from_f64(f).ok_or_else(|| {
				ErrorKind::Corruption(format!("non-finite float {} cannot be persisted", f))
			})?;
			Ok(Json::Number(number))
		},
		Value::Str(ref s) => {
			let literal = ctx.literal(s)?;
			atom_envelope(&literal, ctx)
		},
		Value::Bytes(ref bytes) => Ok(Json::String(base64::encode(bytes))),
		Value::DateTime(ref datetime) => Ok(datetime_envelope(datetime)),
		Value::Duration(ref duration) => {
			let micros = duration.num_microseconds().ok_or_else(|| {
				ErrorKind::Corruption("duration overflows microsecond precision".into())
			})?;
			let mut map = Map::new();
			map.insert("className".into(), Json::String(DURATION_CLASS.into()));
			map.insert("microseconds".into(), Json::Number(micros.into()));
			Ok(Json::Object(map))
		},
		Value::Atom(ref atom) => atom_envelope(atom, ctx),
	}
}

/// Deserializes an atom payload. Child references stay lazy; literal
/// references resolve eagerly to strings.
pub fn decode(bytes: &[u8], loader: &Loader) -> Result<Atom> {
	let json: Json = serde_json::from_slice(bytes)?;
	let map = match json {
		Json::Object(map) => map,
		_ => bail!(ErrorKind::Corruption("atom payload is not a JSON map".into())),
	};

	let class = match map.get("className").and_then(Json::as_str) {
		Some(class) if !class.is_empty() => class.to_owned(),
		_ => bail!(ErrorKind::Corruption("atom payload is missing its className".into())),
	};

	check_fields(&class, &map)?;

	match class.as_str() {
		"Literal" => {
			let s = field(&map, &class, "string")?.as_str().ok_or_else(|| {
				ErrorKind::Corruption("literal payload holds no string".into())
			})?;
			Ok(Atom::Literal(s.to_owned()))
		},
		"RootObject" => Ok(Atom::Root(RootBody {
			object_root: decode_ref(field(&map, &class, "object_root")?, loader)?,
			literal_root: decode_ref(field(&map, &class, "literal_root")?, loader)?,
			created_at: decode_datetime(field(&map, &class, "created_at")?)?,
		})),
		"List" => {
			let empty = field(&map, &class, "empty")?.as_bool().ok_or_else(|| {
				ErrorKind::Corruption("list node empty flag is not a boolean".into())
			})?;
			if empty {
				return Ok(Atom::List(ListNode::empty_node()));
			}
			Ok(Atom::List(ListNode {
				empty: false,
				value: decode_value(field(&map, &class, "value")?, loader)?,
				left: decode_link(field(&map, &class, "left")?, loader)?,
				right: decode_link(field(&map, &class, "right")?, loader)?,
				count: decode_u64(field(&map, &class, "count")?, "count")?,
				height: decode_u64(field(&map, &class, "height")?, "height")? as u8,
			}))
		},
		"Dictionary" => {
			let count = decode_u64(field(&map, &class, "count")?, "count")? as usize;
			let mut items = Vec::with_capacity(count);
			for index in 0..count {
				let key = decode_value(field(&map, &class, &format!("k{}", index))?, loader)?;
				let value = decode_value(field(&map, &class, &format!("v{}", index))?, loader)?;
				items.push((key, value));
			}
			Ok(Atom::Dict(DictBody {
				items,
			}))
		},
		"HashDictionary" => {
			let key = field(&map, &class, "key")?;
			if key.is_null() {
				return Ok(Atom::HashDict(HashNode::sentinel()));
			}
			let key = key.as_i64().ok_or_else(|| {
				ErrorKind::Corruption("hash node key is not an integer".into())
			})?;
			Ok(Atom::HashDict(HashNode {
				key: Some(key as i32),
				value: decode_value(field(&map, &class, "value")?, loader)?,
				left: decode_link(field(&map, &class, "left")?, loader)?,
				right: decode_link(field(&map, &class, "right")?, loader)?,
				count: decode_u64(field(&map, &class, "count")?, "count")?,
				height: decode_u64(field(&map, &class, "height")?, "height")? as u8,
			}))
		},
		"Chain" => Ok(Atom::Chain(ChainNode {
			item: decode_value(field(&map, &class, "item")?, loader)?,
			next: decode_link(field(&map, &class, "next")?, loader)?,
		})),
		"Set" => Ok(Atom::Set(SetBody {
			content: decode_ref(field(&map, &class, "content")?, loader)?,
			staged: Vec::new(),
		})),
		"CountedSet" => Ok(Atom::CountedSet(CountedSetBody {
			items: decode_ref(field(&map, &class, "items")?, loader)?,
			counts: decode_ref(field(&map, &class, "counts")?, loader)?,
			staged_items: Dictionary::new().as_atom().clone(),
			staged_counts: Dictionary::new().as_atom().clone(),
		})),
		other => Err(ErrorKind::Corruption(format!("unknown atom class {:?}", other)).into()),
	}
}

/// The static schema per variant. A field outside it is a dynamic
/// attribute; only the dictionary accepts those (its numbered entries,
/// bounded by its declared `count`), everything else fails.
fn check_fields(class: &str, map: &Map<String, Json>) -> Result<()> {
	let known: &[&str] = match class {
		"Literal" => &["string"],
		"RootObject" => &["object_root", "literal_root", "created_at"],
		"List" => &["empty", "value", "left", "right", "count", "height"],
		"Dictionary" => &["count"],
		"HashDictionary" => &["key", "value", "left", "right", "count", "height"],
		"Chain" => &["item", "next"],
		"Set" => &["content"],
		"CountedSet" => &["items", "counts"],
		_ => return Ok(()),
	};

	// an unreadable count admits every numbered entry here so the decode
	// proper reports the count itself as the corruption
	let entry_limit = if class == "Dictionary" {
		Some(map.get("count").and_then(Json::as_u64).unwrap_or(u64::max_value()))
	} else {
		None
	};

	for key in map.keys() {
		if key == "className" || known.contains(&key.as_str()) {
			continue;
		}
		if let (Some(limit), Some(index)) = (entry_limit, entry_index(key)) {
			if index < limit {
				continue;
			}
		}
		bail!(ErrorKind::FieldMissing(class.to_owned(), key.clone()));
	}
	Ok(())
}

/// The index of a `k<i>`/`v<i>` entry field, canonical decimal only.
fn entry_index(key: &str) -> Option<u64> {
	if key.len() < 2 || !(key.starts_with('k') || key.starts_with('v')) {
		return None;
	}
	let digits = &key[1..];
	if !digits.chars().all(|c| c.is_ascii_digit()) {
		return None;
	}
	if digits.len() > 1 && digits.starts_with('0') {
		return None;
	}
	digits.parse().ok()
}

fn field<'a>(map: &'a Map<String, Json>, class: &str, name: &str) -> Result<&'a Json> {
	map.get(name).ok_or_else(|| {
		ErrorKind::Corruption(format!("{} payload is missing required key {:?}", class, name)).into()
	})
}

fn decode_u64(json: &Json, name: &str) -> Result<u64> {
	json.as_u64().ok_or_else(|| {
		ErrorKind::Corruption(format!("{} is not an unsigned integer", name)).into()
	})
}

fn decode_ref(json: &Json, loader: &Loader) -> Result<AtomRef> {
	let map = match *json {
		Json::Object(ref map) => map,
		_ => bail!(ErrorKind::Corruption("atom envelope is not a JSON map".into())),
	};

	let class = map.get("className").and_then(Json::as_str);
	let stream = map.get("transaction_id").and_then(Json::as_str);
	let offset = map.get("offset").and_then(Json::as_u64);

	match (class, stream, offset) {
		(Some(class), Some(stream), Some(offset)) => {
			let stream = Uuid::parse_str(stream).map_err(|_| {
				ErrorKind::Corruption(format!("atom envelope stream id {:?} is not a uuid", stream))
			})?;
			Ok(loader.resolve(Pointer::new(stream, offset), class))
		},
		_ => Err(ErrorKind::Corruption("atom envelope is missing required keys".into()).into()),
	}
}

fn decode_link(json: &Json, loader: &Loader) -> Result<Option<AtomRef>> {
	if json.is_null() {
		Ok(None)
	} else {
		decode_ref(json, loader).map(Some)
	}
}

fn decode_datetime(json: &Json) -> Result<DateTime<Utc>> {
	let map = match *json {
		Json::Object(ref map) => map,
		_ => bail!(ErrorKind::Corruption("timestamp envelope is not a JSON map".into())),
	};
	let iso = map.get("iso").and_then(Json::as_str).ok_or_else(|| {
		ErrorKind::Corruption("timestamp envelope is missing its iso text".into())
	})?;

	DateTime::parse_from_rfc3339(iso)
		.map(|datetime| datetime.with_timezone(&Utc))
		.map_err(|err| {
			ErrorKind::Corruption(format!("timestamp {:?} does not parse: {}", iso, err)).into()
		})
}

fn decode_value(json: &Json, loader: &Loader) -> Result<Value> {
	match *json {
		Json::Null => Ok(Value::None),
		Json::Bool(b) => Ok(Value::Bool(b)),
		Json::Number(ref number) => {
			if let Some(i) = number.as_i64() {
				return Ok(Value::Int(i));
			}
			number.as_f64().map(Value::Float).ok_or_else(|| {
				ErrorKind::Corruption(format!("number {} fits neither i64 nor f64", number)).into()
			})
		},
		Json::String(ref s) => {
			let bytes = base64::decode(s).map_err(|_| {
				ErrorKind::Corruption("byte blob is not valid base-64".into())
			})?;
			Ok(Value::Bytes(bytes))
		},
		Json::Object(ref map) => {
			let class = map.get("className").and_then(Json::as_str).ok_or_else(|| {
				ErrorKind::Corruption("value envelope is missing its className".into())
			})?;
			match class {
				DATETIME_CLASS => decode_datetime(json).map(Value::DateTime),
				DURATION_CLASS => {
					let micros = map.get("microseconds").and_then(Json::as_i64).ok_or_else(|| {
						ErrorKind::Corruption("duration envelope is missing its microseconds".into())
					})?;
					Ok(Value::Duration(Duration::microseconds(micros)))
				},
				"Literal" => {
					let literal = decode_ref(json, loader)?;
					let s = literal.body()?.as_literal()?.to_owned();
					loader.adopt_literal(&s, &literal);
					Ok(Value::Str(s))
				},
				_ => decode_ref(json, loader).map(Value::Atom),
			}
		},
		Json::Array(_) => Err(ErrorKind::Corruption("unexpected JSON array in atom payload".into()).into()),
	}
}
