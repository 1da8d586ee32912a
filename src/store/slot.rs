use std::time::Instant;

use error::{ErrorKind, Result};
use pointer::Pointer;
use store::ROOT_SLOT_SIZE;

/// In-memory state of the root slot.
#[derive(Debug)]
pub struct RootState {
	pub pointer: Option<Pointer>,
	pub dirty: bool,
	pub last_update: Instant,
}

impl RootState {
	pub fn new(pointer: Option<Pointer>) -> Self {
		RootState {
			pointer,
			dirty: false,
			last_update: Instant::now(),
		}
	}
}

/// Encodes a pointer as the root slot content: ASCII `"<uuid>,<offset>"`
/// NUL-padded to the slot size. No pointer encodes as all NULs.
pub fn encode(pointer: Option<&Pointer>) -> Vec<u8> {
	let mut bytes = vec![0u8; ROOT_SLOT_SIZE];
	if let Some(pointer) = pointer {
		let text = pointer.to_string();
		assert!(text.len() < ROOT_SLOT_SIZE, "pointer text is at most 57 bytes; qed");
		bytes[..text.len()].copy_from_slice(text.as_bytes());
	}
	bytes
}

/// Decodes root slot content. All-NUL content means "no root".
pub fn decode(bytes: &[u8]) -> Result<Option<Pointer>> {
	let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
	if end == 0 {
		return Ok(None);
	}

	let text = ::std::str::from_utf8(&bytes[..end])
		.map_err(|_| ErrorKind::InvalidRootSlot(String::from_utf8_lossy(&bytes[..end]).into_owned()))?;

	text.parse().map(Some)
}

#[cfg(test)]
mod tests {
	use uuid::Uuid;
	use error::ErrorKind;
	use pointer::Pointer;
	use store::ROOT_SLOT_SIZE;
	use super::{encode, decode};

	#[test]
	fn test_slot_roundtrip() {
		let pointer = Pointer::new(Uuid::new_v4(), 2_097_159);
		let bytes = encode(Some(&pointer));

		assert_eq!(bytes.len(), ROOT_SLOT_SIZE);
		assert_eq!(decode(&bytes).unwrap(), Some(pointer));
	}

	#[test]
	fn test_empty_slot_is_no_root() {
		assert_eq!(decode(&encode(None)).unwrap(), None);
	}

	#[test]
	fn test_garbage_slot_is_rejected() {
		let mut bytes = vec![0u8; ROOT_SLOT_SIZE];
		bytes[..9].copy_from_slice(b"busted,42");

		assert_eq!(
			*decode(&bytes).unwrap_err().kind(),
			ErrorKind::InvalidRootSlot("busted,42".into())
		);
	}
}
