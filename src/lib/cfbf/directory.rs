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

use std::char::{decode_utf16, REPLACEMENT_CHARACTER};
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use super::structures::DIRECTORY_ENTRY_SIZE;

/// Seconds between the FILETIME epoch (1601-01-01) and the Unix epoch (1970-01-01).
const FILETIME_UNIX_EPOCH_DIFFERENCE: i64 = 11_644_473_600;
/// FILETIME ticks (100 ns) per second.
const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// An entry of the directory table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Object {
	/// Ordinal of the entry in the directory table.
	pub id: u32,
	pub name: String,
	pub object_type: ObjectType,
	/// Declared length of the stream content. For the root entry, the length of the mini stream.
	pub size: u64,
	/// Creation time in seconds since the Unix epoch.
	pub creation_time: i64,
	/// Modification time in seconds since the Unix epoch.
	pub modified_time: i64,
	/// Whether this object is a folder (storage or root storage) rather than a file.
	pub is_dir: bool,
	/// Location of the first sector (or mini-sector) that holds the content.
	pub first_sector: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ObjectType {
	/// An unused slot of the directory table.
	Empty,
	/// A folder.
	Storage,
	/// A file.
	Stream,
	/// The root folder.
	RootStorage,
	Unknown(u8),
}

impl ObjectType {
	pub fn from_code(code: u8) -> ObjectType {
		match code {
			0 => ObjectType::Empty,
			1 => ObjectType::Storage,
			2 => ObjectType::Stream,
			5 => ObjectType::RootStorage,
			_ => ObjectType::Unknown(code),
		}
	}

	pub fn is_dir(self) -> bool {
		self == ObjectType::Storage || self == ObjectType::RootStorage
	}
}

impl Object {
	/// Decodes one 128-byte directory entry.
	pub fn decode(id: u32, buffer: &[u8; DIRECTORY_ENTRY_SIZE]) -> Object {
		let mut name_units = [0u16; 32];
		LittleEndian::read_u16_into(&buffer[0..64], &mut name_units);
		// skip name length (2 bytes); the name ends at the first NUL instead
		let object_type = ObjectType::from_code(buffer[66]);
		// skip color flag, sibling and child IDs, CLSID and state bits (33 bytes)
		let creation_time = LittleEndian::read_u64(&buffer[100..108]);
		let modified_time = LittleEndian::read_u64(&buffer[108..116]);
		let first_sector = LittleEndian::read_u32(&buffer[116..120]);
		let size = LittleEndian::read_u64(&buffer[120..128]);

		let name = decode_utf16(name_units.iter().cloned().take_while(|&unit| unit != 0))
			.map(|r| r.unwrap_or(REPLACEMENT_CHARACTER))
			.collect::<String>();

		Object {
			id,
			name,
			object_type,
			size,
			creation_time: filetime_to_unix_seconds(creation_time),
			modified_time: filetime_to_unix_seconds(modified_time),
			is_dir: object_type.is_dir(),
			first_sector,
		}
	}
}

/// Converts a Windows FILETIME to whole seconds since the Unix epoch.
pub fn filetime_to_unix_seconds(filetime: u64) -> i64 {
	(filetime / FILETIME_TICKS_PER_SECOND) as i64 - FILETIME_UNIX_EPOCH_DIFFERENCE
}

/// Converts seconds since the Unix epoch to a Windows FILETIME. Dates before 1601 map to 0.
pub fn unix_seconds_to_filetime(seconds: i64) -> u64 {
	let since_1601 = seconds.saturating_add(FILETIME_UNIX_EPOCH_DIFFERENCE);
	if since_1601 <= 0 {
		return 0;
	}
	(since_1601 as u64).saturating_mul(FILETIME_TICKS_PER_SECOND)
}
