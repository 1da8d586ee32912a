use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use error::{ErrorKind, Result};

/// Identity of a persisted atom: the logical write stream that produced the
/// record and the absolute byte offset of its length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
	stream: Uuid,
	offset: u64,
}

impl Pointer {
	pub fn new(stream: Uuid, offset: u64) -> Self {
		Pointer {
			stream,
			offset,
		}
	}

	/// Identifier of the write stream that produced the record.
	pub fn stream(&self) -> Uuid {
		self.stream
	}

	/// Absolute byte offset of the record's length prefix.
	pub fn offset(&self) -> u64 {
		self.offset
	}

	/// Canonical byte encoding used by the stable hash.
	pub fn canonical_bytes(&self) -> [u8; 24] {
		let mut bytes = [0u8; 24];
		bytes[..16].copy_from_slice(self.stream.as_bytes());
		bytes[16..].copy_from_slice(&self.offset.to_le_bytes());
		bytes
	}
}

impl fmt::Display for Pointer {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{},{}", self.stream, self.offset)
	}
}

impl FromStr for Pointer {
	type Err = ::error::Error;

	fn from_str(s: &str) -> Result<Self> {
		let mut parts = s.splitn(2, ',');
		let stream = parts.next().unwrap_or("");
		let offset = match parts.next() {
			Some(offset) => offset,
			None => return Err(ErrorKind::InvalidRootSlot(s.into()).into()),
		};

		let stream = Uuid::parse_str(stream)
			.map_err(|_| ErrorKind::InvalidRootSlot(s.into()))?;
		let offset = offset.parse::<u64>()
			.map_err(|_| ErrorKind::InvalidRootSlot(s.into()))?;

		Ok(Pointer::new(stream, offset))
	}
}
