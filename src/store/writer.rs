//! Background page writer and root-slot flusher.

use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use error::Result;
use store::slot;
use store::store::Shared;

/// A full page waiting to be written to disk. Entries stay in the queue
/// until their bytes are both on disk and in the page cache, so the read
/// path never observes a gap.
#[derive(Debug, Clone)]
pub struct QueuedPage {
	pub number: u64,
	pub bytes: Arc<Vec<u8>>,
}

const DRAIN_SLEEP: Duration = Duration::from_millis(10);

/// Writer thread body: drains the FIFO queue one page at a time, sleeping
/// briefly when it is empty. Exits once shutdown is signalled and the queue
/// has been drained.
pub fn run_writer(shared: Arc<Shared>) {
	loop {
		let entry = shared.queue.lock().front().cloned();
		match entry {
			Some(page) => {
				if let Err(err) = write_page(&shared, &page) {
					warn!("failed to write page {}, retrying: {}", page.number, err);
					thread::sleep(shared.idle_sleep);
					continue;
				}
				trace!("page {} written", page.number);
				// cache before dequeueing; see the precedence order in
				// `Storage::page`
				shared.cache.lock().insert(page.number, page.bytes.clone());
				shared.queue.lock().pop_front();
			},
			None => {
				if shared.shutdown.load(Ordering::SeqCst) {
					break;
				}
				thread::sleep(shared.idle_sleep);
			},
		}
	}
}

fn write_page(shared: &Shared, page: &QueuedPage) -> Result<()> {
	let mut file = shared.file.lock();
	file.seek(SeekFrom::Start(page.number * shared.page_size as u64))?;
	file.write_all(&page.bytes)?;
	file.flush()?;
	Ok(())
}

/// Flusher thread body: ticks about once a second and rewrites the root
/// slot once the pointer has been dirty for longer than the debounce
/// window. Transient errors are logged and retried on the next tick.
pub fn run_flusher(shared: Arc<Shared>) {
	const TICK: Duration = Duration::from_secs(1);
	const TICK_SLICE: Duration = Duration::from_millis(100);

	'ticks: loop {
		// sleep one tick in slices so shutdown is noticed promptly
		let mut slept = Duration::from_millis(0);
		while slept < TICK {
			if shared.shutdown.load(Ordering::SeqCst) {
				break 'ticks;
			}
			thread::sleep(TICK_SLICE);
			slept += TICK_SLICE;
		}

		let due = {
			let root = shared.root.lock();
			root.dirty && root.last_update.elapsed() > shared.debounce
		};
		if !due {
			continue;
		}

		if let Err(err) = flush_root(&shared) {
			warn!("root flush failed, will retry: {}", err);
		}
	}
}

/// Drains the write queue, then rewrites the root slot with the pointer
/// sampled before the drain. Sampling first guarantees every byte the
/// written pointer can reach was enqueued before the drain finished.
pub fn flush_root(shared: &Shared) -> Result<()> {
	let captured = shared.root.lock().pointer;

	while !shared.queue.lock().is_empty() {
		thread::sleep(DRAIN_SLEEP);
	}

	let bytes = slot::encode(captured.as_ref());
	{
		let mut file = shared.file.lock();
		file.seek(SeekFrom::Start(0))?;
		file.write_all(&bytes)?;
		file.flush()?;
		file.sync_data()?;
	}
	debug!("root slot flushed: {:?}", captured);

	let mut root = shared.root.lock();
	if root.pointer == captured {
		root.dirty = false;
	}
	Ok(())
}
