use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Fixed-capacity page cache. Eviction drops the least-recently-added page;
/// evicted data stays recoverable from disk.
#[derive(Debug)]
pub struct PageCache {
	capacity: usize,
	order: VecDeque<u64>,
	pages: HashMap<u64, Arc<Vec<u8>>>,
}

impl PageCache {
	pub fn new(capacity: usize) -> Self {
		PageCache {
			capacity,
			order: VecDeque::with_capacity(capacity),
			pages: HashMap::with_capacity(capacity),
		}
	}

	pub fn get(&self, page_number: u64) -> Option<Arc<Vec<u8>>> {
		self.pages.get(&page_number).cloned()
	}

	/// Idempotent insert.
	pub fn insert(&mut self, page_number: u64, bytes: Arc<Vec<u8>>) {
		if self.pages.insert(page_number, bytes).is_some() {
			return;
		}

		self.order.push_back(page_number);
		if self.order.len() > self.capacity {
			let evicted = self.order.pop_front()
				.expect("order length just exceeded a nonzero capacity; qed");
			self.pages.remove(&evicted);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use super::PageCache;

	fn page(byte: u8) -> Arc<Vec<u8>> {
		Arc::new(vec![byte])
	}

	#[test]
	fn test_evicts_least_recently_added() {
		let mut cache = PageCache::new(2);
		cache.insert(1, page(1));
		cache.insert(2, page(2));
		cache.insert(3, page(3));

		assert!(cache.get(1).is_none());
		assert_eq!(*cache.get(2).unwrap(), vec![2]);
		assert_eq!(*cache.get(3).unwrap(), vec![3]);
	}

	#[test]
	fn test_insert_is_idempotent() {
		let mut cache = PageCache::new(2);
		cache.insert(1, page(1));
		cache.insert(1, page(1));
		cache.insert(2, page(2));
		cache.insert(3, page(3));

		// re-inserting page 1 did not occupy a second slot
		assert!(cache.get(1).is_none());
		assert!(cache.get(2).is_some());
		assert!(cache.get(3).is_some());
	}
}
