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

// Also see: [MS-CFB]: Compound File Binary File Format specifications, https://msdn.microsoft.com/en-us/library/dd942138.aspx

use std::fmt;
use std::io::Cursor;
use byteorder::{LittleEndian, ReadBytesExt};
use log::warn;
use super::error::{CfbError, Result};
use super::super::io::ReadAt;

pub const SIGNATURE: u64 = 0xE11AB1A1E011CFD0;
pub const HEADER_SIZE: usize = 512;
/// Number of DIFAT entries stored inline at the end of the header.
pub const HEADER_DIFAT_ENTRIES: usize = 109;
pub const DIRECTORY_ENTRY_SIZE: usize = 128;
pub const MINI_SECTOR_SHIFT: u16 = 6;
pub const MINI_SECTOR_SIZE: u64 = 64;
pub const MINI_STREAM_CUTOFF: u32 = 4096;
/// Upper bound on the length of any sector chain or DIFAT walk.
pub const MAX_SECTORS: usize = 1 << 20;

// Special sector IDs
pub const DIFSECT: u32 = 0xFFFFFFFC;
pub const FATSECT: u32 = 0xFFFFFFFD;
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE;
pub const FREESECT: u32 = 0xFFFFFFFF;

/// The header of a CFBF file.
#[derive(Clone, Debug)]
pub struct Header {
	pub signature: u64,
	pub minor_version: u16,
	pub major_version: u16,
	pub byte_order: u16,
	pub sector_shift: u16,
	pub sector_size: u64, // virtual field; not actually contained in CFBF file
	pub mini_sector_shift: u16,
	pub mini_sector_size: u64, // virtual field; not actually contained in CFBF file
	pub number_of_directory_sectors: u32,
	pub number_of_fat_sectors: u32,
	pub first_directory_sector_location: SectorLocation,
	pub mini_stream_cutoff_size: u32,
	pub first_mini_fat_sector_location: SectorLocation,
	pub number_of_mini_fat_sectors: u32,
	pub first_difat_sector_location: SectorLocation,
	pub number_of_difat_sectors: u32,
	pub initial_difat: [u32; HEADER_DIFAT_ENTRIES],
}

/// A physical sector location in a CFBF file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SectorLocation(pub u32);

impl SectorLocation {
	/// Whether this location terminates a chain rather than naming a sector.
	pub fn is_end(self) -> bool {
		self.0 == ENDOFCHAIN || self.0 == FREESECT
	}
}

impl fmt::Display for SectorLocation {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.0 {
			FREESECT => write!(f, "FREESECT"),
			ENDOFCHAIN => write!(f, "ENDOFCHAIN"),
			FATSECT => write!(f, "FATSECT"),
			DIFSECT => write!(f, "DIFSECT"),
			n => write!(f, "{:#X}", n),
		}
	}
}

impl Header {
	/// Reads and validates the header from the first 512 bytes of the source.
	/// A source shorter than that is zero-padded and will then fail validation.
	pub fn read_from<R: ReadAt + ?Sized>(source: &R) -> Result<Header> {
		let mut buffer = [0; HEADER_SIZE];
		source.read_full_at(&mut buffer, 0)?;
		Header::parse(&buffer)
	}

	pub fn parse(buffer: &[u8; HEADER_SIZE]) -> Result<Header> {
		let mut cursor = Cursor::new(&buffer[..]);

		let signature = cursor.read_u64::<LittleEndian>()?;
		if signature != SIGNATURE {
			return Err(CfbError::BadSignature(signature));
		}

		cursor.set_position(24); // skip CLSID (16 bytes)
		let minor_version = cursor.read_u16::<LittleEndian>()?;
		let major_version = cursor.read_u16::<LittleEndian>()?;
		let byte_order = cursor.read_u16::<LittleEndian>()?;
		let sector_shift = cursor.read_u16::<LittleEndian>()?;
		let mini_sector_shift = cursor.read_u16::<LittleEndian>()?;
		cursor.set_position(40); // skip reserved (6 bytes)
		let number_of_directory_sectors = cursor.read_u32::<LittleEndian>()?;
		let number_of_fat_sectors = cursor.read_u32::<LittleEndian>()?;
		let first_directory_sector_location = SectorLocation(cursor.read_u32::<LittleEndian>()?);
		cursor.set_position(56); // skip transaction signature number (4 bytes)
		let mini_stream_cutoff_size = cursor.read_u32::<LittleEndian>()?;
		let first_mini_fat_sector_location = SectorLocation(cursor.read_u32::<LittleEndian>()?);
		let number_of_mini_fat_sectors = cursor.read_u32::<LittleEndian>()?;
		let first_difat_sector_location = SectorLocation(cursor.read_u32::<LittleEndian>()?);
		let number_of_difat_sectors = cursor.read_u32::<LittleEndian>()?;
		let mut initial_difat = [FREESECT; HEADER_DIFAT_ENTRIES];
		cursor.read_u32_into::<LittleEndian>(&mut initial_difat)?;

		let sector_size = match sector_shift {
			0x9 => 512,
			0xC => 4096,
			_ => return Err(CfbError::BadSectorSize(sector_shift)),
		};
		if (major_version == 3 && sector_size != 512) || (major_version == 4 && sector_size != 4096) {
			warn!("[parse] Major version {} does not match a sector size of {} bytes", major_version, sector_size);
		}

		let mini_sector_size = if mini_sector_shift == MINI_SECTOR_SHIFT { MINI_SECTOR_SIZE } else { 1u64.checked_shl(mini_sector_shift as u32).unwrap_or(0) };
		if mini_sector_size != MINI_SECTOR_SIZE || mini_stream_cutoff_size != MINI_STREAM_CUTOFF {
			return Err(CfbError::BadMiniConfig { mini_sector_size, cutoff: mini_stream_cutoff_size });
		}

		Ok(Header {
			signature,
			minor_version,
			major_version,
			byte_order,
			sector_shift,
			sector_size,
			mini_sector_shift,
			mini_sector_size,
			number_of_directory_sectors,
			number_of_fat_sectors,
			first_directory_sector_location,
			mini_stream_cutoff_size,
			first_mini_fat_sector_location,
			number_of_mini_fat_sectors,
			first_difat_sector_location,
			number_of_difat_sectors,
			initial_difat,
		})
	}
}

impl fmt::Display for Header {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		writeln!(f, "Version: {}.{}", self.major_version, self.minor_version)?;
		writeln!(f, "Sector size: {} bytes, mini-sector size: {} bytes, cutoff: {} bytes", self.sector_size, self.mini_sector_size, self.mini_stream_cutoff_size)?;
		writeln!(f, "Directory: {} sectors starting at {}", self.number_of_directory_sectors, self.first_directory_sector_location)?;
		writeln!(f, "FAT: {} sectors", self.number_of_fat_sectors)?;
		writeln!(f, "MiniFAT: {} sectors starting at {}", self.number_of_mini_fat_sectors, self.first_mini_fat_sector_location)?;
		write!(f, "DIFAT: {} sectors starting at {}", self.number_of_difat_sectors, self.first_difat_sector_location)
	}
}
