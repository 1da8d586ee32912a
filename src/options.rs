use std::time::Duration;

use error::{ErrorKind, Result};
use store;

/// Store options.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
	/// Size of a data page in bytes.
	/// Records may straddle page boundaries, so the page size only affects
	/// I/O granularity, not the maximum record size.
	pub page_size: usize,
	/// Number of pages kept in the in-memory page cache.
	pub cache_pages: usize,
	/// How long the current root pointer may stay dirty before the
	/// background flusher rewrites the root slot.
	pub root_flush_debounce: Duration,
	/// How long the background writer sleeps when its queue is empty.
	pub writer_idle_sleep: Duration,
}

impl Default for Options {
	fn default() -> Self {
		Options {
			page_size: 1024 * 1024,
			cache_pages: 10,
			root_flush_debounce: Duration::from_secs(10),
			writer_idle_sleep: Duration::from_millis(100),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternalOptions {
	pub external: Options,
}

impl InternalOptions {
	pub fn from_external(external: Options) -> Result<Self> {
		if external.page_size < store::ROOT_SLOT_SIZE {
			bail!(ErrorKind::InvalidOptions(
				"page_size",
				format!("{} is smaller than the root slot ({} bytes)",
					external.page_size, store::ROOT_SLOT_SIZE)
			));
		}

		if external.cache_pages == 0 {
			bail!(ErrorKind::InvalidOptions(
				"cache_pages",
				"must not be 0.".into()
			));
		}

		Ok(InternalOptions {
			external,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;
	use super::{Options, InternalOptions};
	use error::ErrorKind;

	#[test]
	fn test_default_options_are_valid() {
		assert!(InternalOptions::from_external(Options::default()).is_ok());
	}

	#[test]
	fn test_rejects_tiny_pages() {
		let options = Options {
			page_size: 512,
			..Default::default()
		};

		assert_eq!(
			*InternalOptions::from_external(options).unwrap_err().kind(),
			ErrorKind::InvalidOptions(
				"page_size",
				"512 is smaller than the root slot (1024 bytes)".into()
			)
		);
	}

	#[test]
	fn test_rejects_empty_cache() {
		let options = Options {
			cache_pages: 0,
			root_flush_debounce: Duration::from_secs(1),
			..Default::default()
		};

		assert!(InternalOptions::from_external(options).is_err());
	}
}
