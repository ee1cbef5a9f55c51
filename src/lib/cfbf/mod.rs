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

mod directory;
mod error;
mod fat;
mod stream;
mod structures;

pub use self::directory::{filetime_to_unix_seconds, unix_seconds_to_filetime, Object, ObjectType};
pub use self::error::{CfbError, Result};
pub use self::fat::TableKind;
pub use self::stream::{Stream, StreamReader};
pub use self::structures::{Header, SectorLocation};
pub use self::structures::{DIFSECT, ENDOFCHAIN, FATSECT, FREESECT};
pub use self::structures::{DIRECTORY_ENTRY_SIZE, HEADER_SIZE, MAX_SECTORS, MINI_SECTOR_SIZE, MINI_STREAM_CUTOFF, SIGNATURE};

use log::{debug, trace, warn};
use self::fat::walk_chain;
use super::io::ReadAt;

/// An opened CFBF file.
///
/// All allocation tables and the directory table are loaded when the container is opened and never
/// change afterwards, so a container can be shared between threads whenever its source can.
pub struct Container<R> {
	source: R,
	header: Header,
	fat_sectors: Vec<u32>,
	fat: Vec<u32>,
	mini_fat: Vec<u32>,
	directories: Vec<Object>,
	/// Sector chain of the mini stream, i.e. the content of the root entry.
	mini_stream_sectors: Vec<u32>,
	mini_stream_size: u64,
}

impl<R: ReadAt> Container<R> {
	/// Decodes the header, the FAT, the directory table and the MiniFAT, in that order.
	pub fn open(source: R) -> Result<Container<R>> {
		debug!("[open] Reading CFBF file header ({} bytes) ...", HEADER_SIZE);
		let header = Header::read_from(&source)?;
		debug!("[open] Version {}.{}, sector size {} bytes", header.major_version, header.minor_version, header.sector_size);

		let fat_sectors = fat::load_fat_sector_list(&source, &header)?;
		let fat = fat::load_fat(&source, header.sector_size, &fat_sectors)?;

		let mut container = Container {
			source,
			header,
			fat_sectors,
			fat,
			mini_fat: Vec::new(),
			directories: Vec::new(),
			mini_stream_sectors: Vec::new(),
			mini_stream_size: 0,
		};
		container.directories = container.load_directories()?;
		container.load_mini_fat()?;
		debug!("[open] Done: {} directory entries, {} FAT entries, {} MiniFAT entries", container.directories.len(), container.fat.len(), container.mini_fat.len());
		Ok(container)
	}

	fn load_directories(&self) -> Result<Vec<Object>> {
		let first_sector = self.header.first_directory_sector_location.0;
		debug!("[load_directories] Reading directory stream starting at sector {:#X} ...", first_sector);
		let reader = self.stream_by_first_sector(first_sector)?;

		let mut directories = Vec::new();
		let mut buffer = [0; DIRECTORY_ENTRY_SIZE];
		let mut offset = 0;
		while offset < reader.size() {
			if reader.read_at(&mut buffer, offset)? < DIRECTORY_ENTRY_SIZE {
				break;
			}
			let object = Object::decode(directories.len() as u32, &buffer);
			trace!("[load_directories] #{} '{}' ({:?}, {} bytes)", object.id, object.name, object.object_type, object.size);
			directories.push(object);
			offset += DIRECTORY_ENTRY_SIZE as u64;
		}
		Ok(directories)
	}

	fn load_mini_fat(&mut self) -> Result<()> {
		let (mini_stream_sectors, mini_stream_size) = {
			let root = self.directory(0)?;
			let mut mini_stream = self.stream_by_first_sector(root.first_sector)?;
			mini_stream.clamp_size(root.size);
			(mini_stream.sectors().to_vec(), mini_stream.size())
		};
		debug!("[load_mini_fat] Mini stream spans {} sectors ({} bytes)", mini_stream_sectors.len(), mini_stream_size);

		let mut mini_fat = Vec::new();
		{
			let first_sector = self.header.first_mini_fat_sector_location.0;
			let reader = self.stream_by_first_sector(first_sector)?;
			let mut buffer = vec![0; self.header.sector_size as usize];
			let mut offset = 0;
			while offset < reader.size() {
				match reader.read_at(&mut buffer, offset) {
					Ok(0) => break,
					Ok(have_read) => mini_fat.extend(fat::decode_sector_ids(&buffer[..have_read])),
					Err(e) => {
						warn!("[load_mini_fat] Stopped reading MiniFAT at offset {:#X}: {}", offset, e);
						break;
					},
				}
				offset += self.header.sector_size;
			}
		}
		debug!("[load_mini_fat] Loaded {} MiniFAT entries", mini_fat.len());

		self.mini_stream_sectors = mini_stream_sectors;
		self.mini_stream_size = mini_stream_size;
		self.mini_fat = mini_fat;
		Ok(())
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn sector_size(&self) -> u64 {
		self.header.sector_size
	}

	pub fn mini_sector_size(&self) -> u64 {
		self.header.mini_sector_size
	}

	pub fn mini_stream_cutoff(&self) -> u64 {
		self.header.mini_stream_cutoff_size as u64
	}

	/// Locations of all FAT sectors, in table order.
	pub fn fat_sectors(&self) -> &[u32] {
		&self.fat_sectors
	}

	pub fn fat(&self) -> &[u32] {
		&self.fat
	}

	pub fn mini_fat(&self) -> &[u32] {
		&self.mini_fat
	}

	/// The flat directory table, indexed by directory ID.
	pub fn directories(&self) -> &[Object] {
		&self.directories
	}

	pub fn directory(&self, index: u64) -> Result<&Object> {
		if index >= self.directories.len() as u64 {
			return Err(CfbError::BadDirectoryIndex(index));
		}
		Ok(&self.directories[index as usize])
	}

	pub fn into_inner(self) -> R {
		self.source
	}

	/// The chain of regular sectors starting at `start`.
	pub fn chain(&self, start: u32) -> Result<Vec<u32>> {
		walk_chain(&self.fat, start, TableKind::Fat)
	}

	/// The chain of mini-sectors starting at `start`.
	pub fn mini_chain(&self, start: u32) -> Result<Vec<u32>> {
		walk_chain(&self.mini_fat, start, TableKind::MiniFat)
	}

	/// The mini stream, which holds the content of all streams smaller than the cutoff.
	pub fn mini_stream(&self) -> StreamReader<'_, R> {
		StreamReader::new(&self.source, &self.mini_stream_sectors[..], self.header.sector_size, self.mini_stream_size, self.header.sector_size)
	}

	/// Opens the chain of regular sectors starting at `sector`. The stream covers every sector of
	/// the chain; the caller has to know the real length of the content.
	pub fn stream_by_first_sector(&self, sector: u32) -> Result<StreamReader<'_, R>> {
		let sectors = self.chain(sector)?;
		trace!("[stream_by_first_sector] Chain starting at {:#X} has {} sectors", sector, sectors.len());
		Ok(StreamReader::regular(&self.source, sectors, self.header.sector_size))
	}

	/// Opens the content of a directory entry and returns it along with its size.
	///
	/// Streams below the mini stream cutoff are copied out of the mini stream, larger ones are read
	/// from their sector chain. The root entry yields the mini stream itself. Entries declaring a
	/// size of 0 always yield an empty stream.
	pub fn stream_by_directory_id(&self, index: u64) -> Result<(Stream<'_, R>, u64)> {
		let object = self.directory(index)?;
		debug!("[stream_by_directory_id] Opening stream #{} ({} bytes)", object.id, object.size);

		if object.size == 0 {
			return Ok((Stream::Memory(Vec::new()), 0));
		}

		if object.object_type == ObjectType::RootStorage && index == 0 {
			let mini_stream = self.mini_stream();
			let size = mini_stream.size();
			return Ok((Stream::Sectors(mini_stream), size));
		}

		if object.size < self.mini_stream_cutoff() {
			let sectors = self.mini_chain(object.first_sector)?;
			let mini_stream = self.mini_stream();
			let mut reader = StreamReader::mini(&mini_stream, sectors);
			reader.clamp_size(object.size);

			let mut data = Vec::with_capacity(reader.size() as usize);
			let mut buffer = [0; MINI_SECTOR_SIZE as usize];
			let mut offset = 0;
			while offset < reader.size() {
				match reader.read_at(&mut buffer, offset) {
					Ok(0) => break,
					Ok(have_read) => data.extend_from_slice(&buffer[..have_read]),
					Err(e) => {
						warn!("[stream_by_directory_id] Mini stream ends early for stream #{}: {}", object.id, e);
						break;
					},
				}
				offset += MINI_SECTOR_SIZE;
			}
			return Ok((Stream::Memory(data), object.size));
		}

		let mut reader = self.stream_by_first_sector(object.first_sector)?;
		reader.clamp_size(object.size);
		let size = reader.size();
		Ok((Stream::Sectors(reader), size))
	}

	/// Opens the first directory entry named `name`.
	pub fn open_by_name(&self, name: &str) -> Result<(Stream<'_, R>, &Object)> {
		let object = self.stat(name)?;
		let (stream, _) = self.stream_by_directory_id(object.id as u64)?;
		Ok((stream, object))
	}

	/// Finds the first directory entry named `name`.
	pub fn stat(&self, name: &str) -> Result<&Object> {
		self.directories.iter()
			.find(|object| object.name == name)
			.ok_or_else(|| CfbError::StreamNotFound(name.to_owned()))
	}

	/// Lists the entries below `path`. The directory tree is not interpreted: the root path (empty,
	/// or only separators) lists every entry of the table, any other path lists nothing.
	pub fn list_directory(&self, path: &str) -> &[Object] {
		let mut components = path.split(|c| c == '\\' || c == '/').filter(|c| !c.is_empty());
		if components.next().is_some() {
			return &[];
		}
		&self.directories
	}
}
