/*
cfbfread library & toolset
Copyright (C) 2018 Steve Muller <steve.muller@outlook.com>

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

use std::cmp::{max, min};
use std::io::{Error, ErrorKind};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use log::trace;
use lru::LruCache;
use super::ReadAt;

/// Page cache in front of a byte source, with least-recently-used eviction.
///
/// All access goes through an internal mutex, so the reader can be shared between threads as long
/// as the inner source can be sent there.
pub struct PagedReader<R> {
	inner: R,
	page_size: usize,
	cache: Mutex<LruCache<u64, Arc<Vec<u8>>>>,
}

impl<R: ReadAt> PagedReader<R> {
	pub fn new(inner: R, page_size: usize, max_pages: usize) -> PagedReader<R> {
		let capacity = NonZeroUsize::new(max_pages).unwrap_or(NonZeroUsize::MIN);
		PagedReader {
			inner,
			page_size: max(page_size, 1),
			cache: Mutex::new(LruCache::new(capacity)),
		}
	}

	/// Number of pages currently held in memory.
	pub fn cached_pages(&self) -> usize {
		self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
	}

	fn page(&self, index: u64) -> Result<Arc<Vec<u8>>, Error> {
		let mut cache = self.cache.lock()
			.map_err(|_| Error::new(ErrorKind::Other, "Page cache lock poisoned"))?;
		if let Some(page) = cache.get(&index) {
			return Ok(Arc::clone(page));
		}

		trace!("[page] Loading page #{} ({} bytes)", index, self.page_size);
		let mut data = vec![0; self.page_size];
		let have_read = self.inner.read_full_at(&mut data, index * self.page_size as u64)?;
		data.truncate(have_read);
		let page = Arc::new(data);
		cache.put(index, Arc::clone(&page));
		Ok(page)
	}
}

impl<R: ReadAt> ReadAt for PagedReader<R> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		let page_size = self.page_size as u64;
		let mut done = 0;
		while done < buf.len() {
			let position = offset.saturating_add(done as u64);
			let page = self.page(position / page_size)?;
			let page_offset = (position % page_size) as usize;
			if page_offset >= page.len() {
				break;
			}

			let count = min(page.len() - page_offset, buf.len() - done);
			buf[done..done + count].copy_from_slice(&page[page_offset..page_offset + count]);
			done += count;

			// A short page is the last one the source has
			if page.len() < self.page_size {
				break;
			}
		}
		Ok(done)
	}
}
