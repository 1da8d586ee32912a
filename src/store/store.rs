use std::collections::VecDeque;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use fs2::FileExt;
use parking_lot::Mutex;
use uuid::Uuid;

use error::{ErrorKind, Result};
use options::{InternalOptions, Options};
use pointer::Pointer;
use store::ROOT_SLOT_SIZE;
use store::buffer::PageBuffer;
use store::cache::PageCache;
use store::slot::{self, RootState};
use store::writer::{self, QueuedPage};

/// Length prefix of every record.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Upper bound on a single record. A longer length prefix indicates a
/// pointer into the middle of another record.
const MAX_RECORD_LEN: u64 = 1 << 32;

/// State shared with the background writer and flusher threads.
pub struct Shared {
	pub page_size: usize,
	pub idle_sleep: Duration,
	pub debounce: Duration,
	pub file: Mutex<fs::File>,
	pub queue: Mutex<VecDeque<QueuedPage>>,
	pub cache: Mutex<PageCache>,
	pub buffer: Mutex<PageBuffer>,
	pub root: Mutex<RootState>,
	pub shutdown: AtomicBool,
}

/// The paged append-only block store backing an object space.
///
/// ```text
///  root slot   gap      page 1    page 2
///   /           /        /         /
/// |[0,1024)|..zeros..|--------|--------|...
/// ```
///
/// Records are `u64_le(length) || payload`, addressed by the absolute byte
/// offset of their length prefix, and may straddle page boundaries. Pages
/// are written once by a single background thread; the root slot is the
/// only block ever rewritten in place.
pub struct Storage {
	shared: Arc<Shared>,
	stream: Uuid,
	path: PathBuf,
	writer: Mutex<Option<JoinHandle<()>>>,
	flusher: Mutex<Option<JoinHandle<()>>>,
	closed: AtomicBool,
}

impl ::std::fmt::Debug for Storage {
	fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
		f.debug_struct("Storage")
			.field("stream", &self.stream)
			.field("path", &self.path)
			.finish()
	}
}

impl Storage {
	/// Opens the store file, creating it if absent, and starts the
	/// background writer and root flusher.
	pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Storage> {
		let options = InternalOptions::from_external(options)?;
		let page_size = options.external.page_size;
		let path = path.as_ref().to_owned();

		let mut file = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.open(&path)?;
		file.try_lock_exclusive().map_err(|_| ErrorKind::StoreLocked(path.clone()))?;

		let len = file.metadata()?.len();
		let (root_pointer, next_page) = if len == 0 {
			file.write_all(&slot::encode(None))?;
			file.flush()?;
			(None, 1)
		} else {
			if len < ROOT_SLOT_SIZE as u64 {
				bail!(ErrorKind::InvalidRootSlot("<truncated root slot>".into()));
			}
			let mut bytes = vec![0u8; ROOT_SLOT_SIZE];
			file.seek(SeekFrom::Start(0))?;
			file.read_exact(&mut bytes)?;
			let pointer = slot::decode(&bytes)?;

			let next_page = if len <= page_size as u64 {
				1
			} else {
				(len - 1) / page_size as u64 + 1
			};
			(pointer, next_page)
		};

		let shared = Arc::new(Shared {
			page_size,
			idle_sleep: options.external.writer_idle_sleep,
			debounce: options.external.root_flush_debounce,
			file: Mutex::new(file),
			queue: Mutex::new(VecDeque::new()),
			cache: Mutex::new(PageCache::new(options.external.cache_pages)),
			buffer: Mutex::new(PageBuffer::new(page_size, next_page)),
			root: Mutex::new(RootState::new(root_pointer)),
			shutdown: AtomicBool::new(false),
		});

		let writer = {
			let shared = shared.clone();
			thread::Builder::new()
				.name("perennedb-writer".into())
				.spawn(move || writer::run_writer(shared))?
		};
		let flusher = {
			let shared = shared.clone();
			thread::Builder::new()
				.name("perennedb-root-flush".into())
				.spawn(move || writer::run_flusher(shared))?
		};

		debug!("store opened at {}, resuming at page {}", path.display(), next_page);

		Ok(Storage {
			shared,
			stream: Uuid::new_v4(),
			path,
			writer: Mutex::new(Some(writer)),
			flusher: Mutex::new(Some(flusher)),
			closed: AtomicBool::new(false),
		})
	}

	/// Identifier of this process's write stream.
	pub fn stream(&self) -> Uuid {
		self.stream
	}

	/// Configured page size.
	pub fn page_size(&self) -> usize {
		self.shared.page_size
	}

	/// Appends one length-prefixed record and returns its pointer.
	pub fn push_bytes(&self, payload: &[u8]) -> Result<Pointer> {
		let mut buffer = self.shared.buffer.lock();
		let offset = buffer.position();

		let mut header = [0u8; RECORD_HEADER_SIZE];
		LittleEndian::write_u64(&mut header, payload.len() as u64);
		self.write_data(&mut buffer, &header);
		self.write_data(&mut buffer, payload);

		Ok(Pointer::new(self.stream, offset))
	}

	fn write_data(&self, buffer: &mut PageBuffer, mut data: &[u8]) {
		while !data.is_empty() {
			let consumed = buffer.fill(data);
			data = &data[consumed..];
			if buffer.is_full() {
				let (number, bytes) = buffer.take();
				trace!("page {} enqueued", number);
				self.shared.queue.lock().push_back(QueuedPage {
					number,
					bytes: Arc::new(bytes),
				});
			}
		}
	}

	/// Reads back the record named by `pointer`.
	pub fn get_bytes(&self, pointer: &Pointer) -> Result<Vec<u8>> {
		let header = self.read_range(pointer.offset(), RECORD_HEADER_SIZE)?;
		let len = LittleEndian::read_u64(&header);
		if len > MAX_RECORD_LEN {
			bail!(ErrorKind::Corruption(format!(
				"record length {} at offset {} is implausible", len, pointer.offset()
			)));
		}

		self.read_range(pointer.offset() + RECORD_HEADER_SIZE as u64, len as usize)
	}

	fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
		let page_size = self.shared.page_size as u64;
		let mut out = Vec::with_capacity(len);
		let mut pos = offset;

		while out.len() < len {
			let page_number = pos / page_size;
			let in_page = (pos % page_size) as usize;
			let take = (self.shared.page_size - in_page).min(len - out.len());
			let page = self.page(page_number)?;
			out.extend_from_slice(&page[in_page..in_page + take]);
			pos += take as u64;
		}

		Ok(out)
	}

	/// Resolves one page. Precedence: current buffer, write queue, cache,
	/// disk. This order delivers read-your-writes before the writer thread
	/// has reached the disk.
	fn page(&self, page_number: u64) -> Result<Arc<Vec<u8>>> {
		{
			let buffer = self.shared.buffer.lock();
			if buffer.page_number() == page_number {
				return Ok(Arc::new(buffer.snapshot()));
			}
		}

		{
			let queue = self.shared.queue.lock();
			if let Some(page) = queue.iter().rev().find(|page| page.number == page_number) {
				return Ok(page.bytes.clone());
			}
		}

		if let Some(bytes) = self.shared.cache.lock().get(page_number) {
			return Ok(bytes);
		}

		let mut bytes = vec![0u8; self.shared.page_size];
		{
			let mut file = self.shared.file.lock();
			file.seek(SeekFrom::Start(page_number * self.shared.page_size as u64))?;
			file.read_exact(&mut bytes)?;
		}
		let bytes = Arc::new(bytes);
		self.shared.cache.lock().insert(page_number, bytes.clone());
		Ok(bytes)
	}

	/// The current root pointer, if any.
	pub fn current_root(&self) -> Option<Pointer> {
		self.shared.root.lock().pointer
	}

	/// Swings the root pointer. The slot is rewritten on disk by the
	/// debounced flusher and on close.
	pub fn set_current_root(&self, pointer: Pointer) {
		let mut root = self.shared.root.lock();
		root.pointer = Some(pointer);
		root.dirty = true;
		root.last_update = ::std::time::Instant::now();
	}

	/// Durability hook for a write-ahead log. The append-only data region
	/// plus the atomic root-slot rewrite already deliver the contract, so
	/// this does nothing.
	pub fn flush_wal(&self) -> Result<()> {
		Ok(())
	}

	/// Flushes the tail page, stops both background threads and writes the
	/// root slot one final time.
	pub fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		{
			let mut buffer = self.shared.buffer.lock();
			if !buffer.is_empty() {
				let (number, bytes) = buffer.take();
				self.shared.queue.lock().push_back(QueuedPage {
					number,
					bytes: Arc::new(bytes),
				});
			}
		}

		self.shared.shutdown.store(true, Ordering::SeqCst);
		if let Some(writer) = self.writer.lock().take() {
			let _ = writer.join();
		}
		if let Some(flusher) = self.flusher.lock().take() {
			let _ = flusher.join();
		}

		// queue is drained; this only rewrites the slot
		writer::flush_root(&self.shared)?;
		let _ = self.shared.file.lock().unlock();
		debug!("store closed at {}", self.path.display());
		Ok(())
	}
}

impl Drop for Storage {
	fn drop(&mut self) {
		if let Err(err) = self.close() {
			warn!("store close failed on drop: {}", err);
		}
	}
}
