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

pub mod logger;
mod paged;

pub use self::paged::PagedReader;

use std::cmp::min;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Error, ErrorKind};
use std::sync::{Arc, Mutex};

/// A random-access byte source.
///
/// Reads never move a shared cursor, so a single source can serve any number of stream readers.
pub trait ReadAt {
	/// Reads bytes starting at the absolute `offset` into `buf` and returns how many were read.
	/// Returning 0 for a non-empty buffer means the offset lies at or beyond the end of the data;
	/// returning fewer bytes than requested means the data ends inside the requested range.
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error>;

	/// Keeps reading until `buf` is full or the end of the data is reached.
	fn read_full_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		let mut total = 0;
		while total < buf.len() {
			match self.read_at(&mut buf[total..], offset.saturating_add(total as u64)) {
				Ok(0) => break,
				Ok(n) => total += n,
				Err(ref e) if e.kind() == ErrorKind::Interrupted => {},
				Err(e) => return Err(e),
			}
		}
		Ok(total)
	}

	/// Fills `buf` completely, or fails with `UnexpectedEof`.
	fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
		let have_read = self.read_full_at(buf, offset)?;
		if have_read < buf.len() {
			return Err(Error::new(ErrorKind::UnexpectedEof, format!("Short read at offset {:#X}: got {} of {} bytes", offset, have_read, buf.len())));
		}
		Ok(())
	}
}

impl ReadAt for [u8] {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		if offset >= self.len() as u64 {
			return Ok(0);
		}
		let start = offset as usize;
		let count = min(buf.len(), self.len() - start);
		buf[..count].copy_from_slice(&self[start..start + count]);
		Ok(count)
	}
}

impl ReadAt for Vec<u8> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		self.as_slice().read_at(buf, offset)
	}
}

impl<'a, T: ReadAt + ?Sized> ReadAt for &'a T {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		(**self).read_at(buf, offset)
	}
}

impl<T: ReadAt + ?Sized> ReadAt for Box<T> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		(**self).read_at(buf, offset)
	}
}

impl<T: ReadAt + ?Sized> ReadAt for Arc<T> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		(**self).read_at(buf, offset)
	}
}

impl ReadAt for File {
	#[cfg(unix)]
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		std::os::unix::fs::FileExt::read_at(self, buf, offset)
	}

	#[cfg(windows)]
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		std::os::windows::fs::FileExt::seek_read(self, buf, offset)
	}
}

/// Turns a seekable reader into a random-access source by serialising access behind a mutex.
pub struct SyncReader<R> {
	inner: Mutex<R>,
}

impl<R: Read + Seek> SyncReader<R> {
	pub fn new(inner: R) -> SyncReader<R> {
		SyncReader { inner: Mutex::new(inner) }
	}

	pub fn into_inner(self) -> R {
		self.inner.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

impl<R: Read + Seek> ReadAt for SyncReader<R> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		let mut inner = self.inner.lock()
			.map_err(|_| Error::new(ErrorKind::Other, "Reader lock poisoned"))?;
		inner.seek(SeekFrom::Start(offset))?;
		inner.read(buf)
	}
}

/// Shifts every read by a fixed offset, e.g. for a container embedded in a larger image.
pub struct OffsetReader<R> {
	inner: R,
	offset: u64,
}

impl<R: ReadAt> OffsetReader<R> {
	pub fn new(inner: R, offset: u64) -> OffsetReader<R> {
		OffsetReader { inner, offset }
	}
}

impl<R: ReadAt> ReadAt for OffsetReader<R> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		let absolute = offset.checked_add(self.offset)
			.ok_or_else(|| Error::new(ErrorKind::InvalidInput, "Offset overflows the image"))?;
		self.inner.read_at(buf, absolute)
	}
}

/// Sequential `Read + Seek` view over a random-access source of known size.
pub struct StreamCursor<S> {
	source: S,
	size: u64,
	position: u64,
}

impl<S: ReadAt> StreamCursor<S> {
	pub fn new(source: S, size: u64) -> StreamCursor<S> {
		StreamCursor { source, size, position: 0 }
	}
}

impl<S: ReadAt> Read for StreamCursor<S> {
	fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
		if self.position >= self.size {
			return Ok(0);
		}
		let want_read = min(buf.len() as u64, self.size - self.position) as usize;
		let have_read = self.source.read_at(&mut buf[..want_read], self.position)?;
		self.position += have_read as u64;
		Ok(have_read)
	}
}

impl<S: ReadAt> Seek for StreamCursor<S> {
	fn seek(&mut self, pos: SeekFrom) -> Result<u64, Error> {
		let target = match pos {
			SeekFrom::Start(i) => Some(i),
			SeekFrom::Current(i) => offset_by(self.position, i),
			SeekFrom::End(i) => offset_by(self.size, i),
		};
		match target {
			Some(position) => {
				self.position = position;
				Ok(position)
			},
			None => Err(Error::new(ErrorKind::InvalidInput, "Seek to a negative or overflowing position")),
		}
	}
}

fn offset_by(base: u64, delta: i64) -> Option<u64> {
	if delta >= 0 {
		base.checked_add(delta as u64)
	}
	else {
		base.checked_sub(delta.unsigned_abs())
	}
}
