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

//! Writes small CFBF images for the integration tests.
//!
//! Layout of a built image: the FAT sectors, an optional DIFAT sector, the directory, optional
//! unused padding sectors, the MiniFAT, the mini stream, then one chain per large stream.

#![allow(dead_code)]

use cfbfread::cfbf::{unix_seconds_to_filetime, DIFSECT, ENDOFCHAIN, FATSECT, FREESECT, MINI_STREAM_CUTOFF, SIGNATURE};

const MINI_SECTOR: usize = 64;
/// Creation and modification time of every entry, 2018-01-01T00:00:00Z.
pub const MODIFIED_TIME: i64 = 1_514_764_800;

pub struct CfbBuilder {
	sector_size: usize,
	streams: Vec<(String, Vec<u8>)>,
	padding_sectors: usize,
	fat_in_difat: bool,
}

pub struct Image {
	pub bytes: Vec<u8>,
	pub sector_size: usize,
	/// Number of entries in the FAT.
	pub fat_len: usize,
}

impl Image {
	/// Overwrites one FAT entry. The FAT must fit in its first sector.
	pub fn patch_fat(&mut self, index: u32, value: u32) {
		assert!((index as usize) < self.sector_size / 4);
		let offset = self.sector_size + index as usize * 4;
		self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
	}
}

impl CfbBuilder {
	pub fn new(sector_size: usize) -> CfbBuilder {
		assert!(sector_size == 512 || sector_size == 4096);
		CfbBuilder {
			sector_size,
			streams: Vec::new(),
			padding_sectors: 0,
			fat_in_difat: false,
		}
	}

	pub fn stream(mut self, name: &str, data: Vec<u8>) -> CfbBuilder {
		self.streams.push((name.to_owned(), data));
		self
	}

	/// Leaves `count` free sectors between the directory and the rest of the data.
	pub fn padding_sectors(mut self, count: usize) -> CfbBuilder {
		self.padding_sectors = count;
		self
	}

	/// Lists the FAT sectors in a DIFAT sector instead of the header.
	pub fn fat_in_difat(mut self) -> CfbBuilder {
		self.fat_in_difat = true;
		self
	}

	pub fn build(&self) -> Image {
		let ss = self.sector_size;
		let ids_per_sector = ss / 4;
		let sectors_for = |len: usize| (len + ss - 1) / ss;

		// Mini stream and MiniFAT
		let mut mini_stream = Vec::new();
		let mut mini_fat: Vec<u32> = Vec::new();
		let mut mini_starts = Vec::new();
		for (_, data) in &self.streams {
			if data.is_empty() || data.len() >= MINI_STREAM_CUTOFF as usize {
				mini_starts.push(None);
				continue;
			}
			let start = mini_fat.len() as u32;
			let count = (data.len() + MINI_SECTOR - 1) / MINI_SECTOR;
			for i in 0..count as u32 {
				mini_fat.push(if i + 1 == count as u32 { ENDOFCHAIN } else { start + i + 1 });
			}
			mini_stream.extend_from_slice(data);
			mini_stream.resize(mini_fat.len() * MINI_SECTOR, 0);
			mini_starts.push(Some(start));
		}

		let entries_per_sector = ss / 128;
		let dir_sectors = (1 + self.streams.len() + entries_per_sector - 1) / entries_per_sector;
		let mini_fat_sectors = sectors_for(mini_fat.len() * 4);
		let mini_stream_sectors = sectors_for(mini_stream.len());
		let large_sectors: Vec<usize> = self.streams.iter()
			.map(|(_, data)| if data.len() >= MINI_STREAM_CUTOFF as usize { sectors_for(data.len()) } else { 0 })
			.collect();
		let difat_sectors = if self.fat_in_difat { 1 } else { 0 };
		let content = difat_sectors + dir_sectors + self.padding_sectors + mini_fat_sectors + mini_stream_sectors + large_sectors.iter().sum::<usize>();

		let mut fat_sectors = 1;
		while fat_sectors * ids_per_sector < fat_sectors + content {
			fat_sectors += 1;
		}
		assert!(fat_sectors <= 109 && (!self.fat_in_difat || fat_sectors <= ids_per_sector - 2));
		let total_sectors = fat_sectors + content;

		let mut fat = vec![FREESECT; fat_sectors * ids_per_sector];
		let mut next_sector = 0usize;
		let mut allocate = |fat: &mut Vec<u32>, count: usize, marker: Option<u32>| -> u32 {
			if count == 0 {
				return ENDOFCHAIN;
			}
			let start = next_sector;
			for s in start..start + count {
				fat[s] = match marker {
					Some(m) => m,
					None if s + 1 == start + count => ENDOFCHAIN,
					None => (s + 1) as u32,
				};
			}
			next_sector += count;
			start as u32
		};

		allocate(&mut fat, fat_sectors, Some(FATSECT));
		let difat_start = allocate(&mut fat, difat_sectors, Some(DIFSECT));
		let dir_start = allocate(&mut fat, dir_sectors, None);
		allocate(&mut fat, self.padding_sectors, Some(FREESECT));
		let mini_fat_start = allocate(&mut fat, mini_fat_sectors, None);
		let mini_stream_start = allocate(&mut fat, mini_stream_sectors, None);
		let large_starts: Vec<u32> = large_sectors.iter().map(|&count| allocate(&mut fat, count, None)).collect();

		let mut bytes = vec![0u8; ss * (total_sectors + 1)];

		// Header
		put_u64(&mut bytes, 0, SIGNATURE);
		put_u16(&mut bytes, 24, 0x3E);
		put_u16(&mut bytes, 26, if ss == 512 { 3 } else { 4 });
		put_u16(&mut bytes, 28, 0xFFFE);
		put_u16(&mut bytes, 30, if ss == 512 { 9 } else { 12 });
		put_u16(&mut bytes, 32, 6);
		put_u32(&mut bytes, 40, if ss == 512 { 0 } else { dir_sectors as u32 });
		put_u32(&mut bytes, 44, fat_sectors as u32);
		put_u32(&mut bytes, 48, dir_start);
		put_u32(&mut bytes, 56, MINI_STREAM_CUTOFF);
		put_u32(&mut bytes, 60, mini_fat_start);
		put_u32(&mut bytes, 64, mini_fat_sectors as u32);
		put_u32(&mut bytes, 68, if self.fat_in_difat { difat_start } else { ENDOFCHAIN });
		put_u32(&mut bytes, 72, difat_sectors as u32);
		for i in 0..109 {
			let value = if !self.fat_in_difat && i < fat_sectors { i as u32 } else { FREESECT };
			put_u32(&mut bytes, 76 + i * 4, value);
		}

		let sector_start = |sector: u32| (sector as usize + 1) * ss;

		// FAT and DIFAT
		for (i, entry) in fat.iter().enumerate() {
			put_u32(&mut bytes, ss + i * 4, *entry);
		}
		if self.fat_in_difat {
			let offset = sector_start(difat_start);
			for i in 0..ids_per_sector {
				let value = if i < fat_sectors { i as u32 } else { FREESECT };
				put_u32(&mut bytes, offset + i * 4, value);
			}
			put_u32(&mut bytes, offset + (ids_per_sector - 1) * 4, ENDOFCHAIN);
		}

		// Directory
		let filetime = unix_seconds_to_filetime(MODIFIED_TIME);
		let dir_offset = sector_start(dir_start);
		let root_start = if mini_stream.is_empty() { ENDOFCHAIN } else { mini_stream_start };
		write_entry(&mut bytes, dir_offset, "Root Entry", 5, root_start, mini_stream.len() as u64, filetime);
		for (i, (name, data)) in self.streams.iter().enumerate() {
			let start = match (mini_starts[i], data.is_empty()) {
				(_, true) => ENDOFCHAIN,
				(Some(mini), _) => mini,
				(None, _) => large_starts[i],
			};
			write_entry(&mut bytes, dir_offset + (i + 1) * 128, name, 2, start, data.len() as u64, filetime);
		}

		// MiniFAT, mini stream and large streams
		if mini_fat_sectors > 0 {
			let offset = sector_start(mini_fat_start);
			for i in 0..mini_fat_sectors * ids_per_sector {
				put_u32(&mut bytes, offset + i * 4, mini_fat.get(i).cloned().unwrap_or(FREESECT));
			}
			let offset = sector_start(mini_stream_start);
			bytes[offset..offset + mini_stream.len()].copy_from_slice(&mini_stream);
		}
		for (i, (_, data)) in self.streams.iter().enumerate() {
			if large_sectors[i] > 0 {
				let offset = sector_start(large_starts[i]);
				bytes[offset..offset + data.len()].copy_from_slice(data);
			}
		}

		Image { bytes, sector_size: ss, fat_len: fat.len() }
	}
}

fn write_entry(bytes: &mut [u8], offset: usize, name: &str, code: u8, start: u32, size: u64, filetime: u64) {
	let units: Vec<u16> = name.encode_utf16().collect();
	for (i, unit) in units.iter().take(31).enumerate() {
		put_u16(bytes, offset + i * 2, *unit);
	}
	put_u16(bytes, offset + 64, ((units.len() + 1) * 2) as u16);
	bytes[offset + 66] = code;
	bytes[offset + 67] = 1;
	put_u32(bytes, offset + 68, FREESECT);
	put_u32(bytes, offset + 72, FREESECT);
	put_u32(bytes, offset + 76, FREESECT);
	put_u64(bytes, offset + 100, filetime);
	put_u64(bytes, offset + 108, filetime);
	put_u32(bytes, offset + 116, start);
	put_u64(bytes, offset + 120, size);
}

fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
	bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
	bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(bytes: &mut [u8], offset: usize, value: u64) {
	bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Deterministic content whose bytes differ between neighbouring positions and streams.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
	(0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}
