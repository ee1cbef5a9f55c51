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

use std::borrow::Cow;
use std::cmp::min;
use std::io::Error;
use super::fat::sector_offset;
use super::structures::MINI_SECTOR_SIZE;
use super::super::io::{ReadAt, StreamCursor};

/// Random-access view of a stream stored in a chain of sectors.
///
/// Offsets are logical offsets within the stream. Reads never go beyond the stream size, even if
/// the last sector of the chain holds more data.
pub struct StreamReader<'a, S: ?Sized> {
	source: &'a S,
	sectors: Cow<'a, [u32]>,
	sector_size: u64,
	size: u64,
	/// Added to the position of every sector; skips the header for regular sectors.
	base_offset: u64,
}

impl<'a, S: ReadAt + ?Sized> StreamReader<'a, S> {
	pub fn new<C>(source: &'a S, sectors: C, sector_size: u64, size: u64, base_offset: u64) -> StreamReader<'a, S>
		where C: Into<Cow<'a, [u32]>> {
		StreamReader {
			source,
			sectors: sectors.into(),
			sector_size,
			size,
			base_offset,
		}
	}

	/// A stream made of regular sectors of the file. Its size covers every sector of the chain.
	pub fn regular<C>(source: &'a S, sectors: C, sector_size: u64) -> StreamReader<'a, S>
		where C: Into<Cow<'a, [u32]>> {
		let sectors = sectors.into();
		let size = sectors.len() as u64 * sector_size;
		StreamReader::new(source, sectors, sector_size, size, sector_offset(0, sector_size))
	}

	/// A stream made of mini-sectors; `source` is the mini stream.
	pub fn mini<C>(source: &'a S, sectors: C) -> StreamReader<'a, S>
		where C: Into<Cow<'a, [u32]>> {
		let sectors = sectors.into();
		let size = sectors.len() as u64 * MINI_SECTOR_SIZE;
		StreamReader::new(source, sectors, MINI_SECTOR_SIZE, size, 0)
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn sector_size(&self) -> u64 {
		self.sector_size
	}

	pub fn sectors(&self) -> &[u32] {
		&self.sectors
	}

	/// Shrinks the stream to `declared` bytes if that is positive and smaller than the current size.
	/// A declared size never extends the stream beyond its chain.
	pub fn clamp_size(&mut self, declared: u64) {
		if declared > 0 && declared < self.size {
			self.size = declared;
		}
	}
}

impl<'a, S: ReadAt + ?Sized> ReadAt for StreamReader<'a, S> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		if self.sector_size == 0 || offset >= self.size {
			return Ok(0);
		}
		let mut sector_index = offset / self.sector_size;
		if sector_index >= self.sectors.len() as u64 {
			return Ok(0);
		}

		let mut offset_in_sector = offset % self.sector_size;
		let mut buf_offset = 0usize;
		while buf_offset < buf.len() && sector_index < self.sectors.len() as u64 {
			let available_in_sector = self.sector_size - offset_in_sector;
			let available_in_buffer = (buf.len() - buf_offset) as u64;
			let available_in_stream = self.size - (offset + buf_offset as u64);
			let to_read = min(available_in_sector, min(available_in_buffer, available_in_stream)) as usize;
			if to_read == 0 {
				break;
			}

			let sector = self.sectors[sector_index as usize];
			let position = self.base_offset + self.sector_size * sector as u64 + offset_in_sector;
			self.source.read_exact_at(&mut buf[buf_offset..buf_offset + to_read], position)?;

			sector_index += 1;
			buf_offset += to_read;
			offset_in_sector = 0;
		}
		Ok(buf_offset)
	}
}

/// A stream as handed out by the container: small streams are copied out of the mini stream into
/// memory, large streams are read lazily from their sector chain.
pub enum Stream<'a, S: ?Sized> {
	Memory(Vec<u8>),
	Sectors(StreamReader<'a, S>),
}

impl<'a, S: ReadAt + ?Sized> Stream<'a, S> {
	/// Number of bytes that can be read from this stream.
	///
	/// For a small stream whose mini-sectors run past the end of the mini stream this is less than
	/// the size declared in the directory entry, which `Container::stream_by_directory_id` returns.
	pub fn size(&self) -> u64 {
		match self {
			Stream::Memory(data) => data.len() as u64,
			Stream::Sectors(reader) => reader.size(),
		}
	}

	/// Sequential `Read + Seek` access, e.g. for `std::io::copy`.
	pub fn into_cursor(self) -> StreamCursor<Stream<'a, S>> {
		let size = self.size();
		StreamCursor::new(self, size)
	}
}

impl<'a, S: ReadAt + ?Sized> ReadAt for Stream<'a, S> {
	fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, Error> {
		match self {
			Stream::Memory(data) => data.read_at(buf, offset),
			Stream::Sectors(reader) => reader.read_at(buf, offset),
		}
	}
}
