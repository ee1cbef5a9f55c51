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

use std::collections::HashSet;
use std::io::Error;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace, warn};
use super::error::{CfbError, Result};
use super::structures::{Header, SectorLocation, ENDOFCHAIN, FREESECT, MAX_SECTORS};
use super::super::io::ReadAt;

/// Which allocation table a chain is walked over. Only affects the reported errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TableKind {
	Fat,
	MiniFat,
}

impl TableKind {
	fn out_of_bounds(self, sector: u32, chain: Vec<u32>) -> CfbError {
		match self {
			TableKind::Fat => CfbError::FatOutOfBounds { sector, chain },
			TableKind::MiniFat => CfbError::MiniFatOutOfBounds { sector, chain },
		}
	}

	fn cycle(self, sector: u32, chain: Vec<u32>) -> CfbError {
		match self {
			TableKind::Fat => CfbError::FatCycle { sector, chain },
			TableKind::MiniFat => CfbError::MiniFatCycle { sector, chain },
		}
	}
}

/// Follows a chain through `table`, starting at `start`, until ENDOFCHAIN.
///
/// Every link is bounds-checked and a sector may only appear once. Chains longer than
/// `MAX_SECTORS` are truncated.
pub fn walk_chain(table: &[u32], start: u32, kind: TableKind) -> Result<Vec<u32>> {
	let mut chain = Vec::new();
	let mut seen = HashSet::new();
	let mut sector = start;
	while sector != ENDOFCHAIN {
		chain.push(sector);
		seen.insert(sector);

		let next = match table.get(sector as usize) {
			Some(&next) => next,
			None => return Err(kind.out_of_bounds(sector, chain)),
		};
		if seen.contains(&next) {
			return Err(kind.cycle(next, chain));
		}

		if chain.len() >= MAX_SECTORS {
			warn!("[walk_chain] {:?} chain starting at {:#X} exceeds {} sectors, truncating", kind, start, MAX_SECTORS);
			break;
		}
		sector = next;
	}
	Ok(chain)
}

/// Physical byte offset of a regular sector; the header occupies the first sector-sized block.
pub fn sector_offset(sector: u32, sector_size: u64) -> u64 {
	(sector as u64 + 1) * sector_size
}

/// Reads one full sector into `buffer`, returning how many bytes the source actually had.
pub fn read_sector<R: ReadAt + ?Sized>(source: &R, sector: u32, buffer: &mut [u8]) -> std::result::Result<usize, Error> {
	source.read_full_at(buffer, sector_offset(sector, buffer.len() as u64))
}

/// Decodes little-endian 32-bit sector IDs. Trailing bytes that do not form a full entry are ignored.
pub fn decode_sector_ids(bytes: &[u8]) -> Vec<u32> {
	let mut values = vec![0; bytes.len() / 4];
	LittleEndian::read_u32_into(&bytes[..values.len() * 4], &mut values);
	values
}

/// Collects the locations of all FAT sectors: first the entries stored in the header, then
/// those stored in the DIFAT sector chain.
pub fn load_fat_sector_list<R: ReadAt + ?Sized>(source: &R, header: &Header) -> Result<Vec<u32>> {
	let mut fat_sectors: Vec<u32> = header.initial_difat.iter()
		.cloned()
		.filter(|&s| s != FREESECT)
		.collect();
	debug!("[load_fat_sector_list] {} FAT sectors listed in header", fat_sectors.len());

	let mut buffer = vec![0; header.sector_size as usize];
	let mut seen = HashSet::new();
	let mut sector = header.first_difat_sector_location.0;
	while !SectorLocation(sector).is_end() {
		trace!("[load_fat_sector_list] Reading DIFAT sector {:#X}", sector);
		let have_read = read_sector(source, sector, &mut buffer)?;
		if have_read < buffer.len() {
			debug!("[load_fat_sector_list] DIFAT sector {:#X} is truncated ({} bytes), stopping", sector, have_read);
			break;
		}

		// The last entry links to the next DIFAT sector; the one before it is not used
		let values = decode_sector_ids(&buffer);
		let next = values[values.len() - 1];
		fat_sectors.extend(values[..values.len() - 2].iter().filter(|&&s| s != FREESECT));

		if seen.contains(&next) || seen.len() > MAX_SECTORS {
			return Err(CfbError::DifatCycle { sector, next });
		}
		seen.insert(next);
		sector = next;
	}

	debug!("[load_fat_sector_list] {} FAT sectors in total", fat_sectors.len());
	Ok(fat_sectors)
}

/// Concatenates the entries of all FAT sectors into one table.
pub fn load_fat<R: ReadAt + ?Sized>(source: &R, sector_size: u64, fat_sectors: &[u32]) -> Result<Vec<u32>> {
	let mut fat = Vec::new();
	let mut buffer = vec![0; sector_size as usize];
	for &fat_sector in fat_sectors {
		let have_read = read_sector(source, fat_sector, &mut buffer)?;
		if have_read < buffer.len() {
			return Err(CfbError::TruncatedFat { sector: fat_sector, read: have_read, expected: buffer.len() });
		}
		fat.extend(decode_sector_ids(&buffer));
	}
	debug!("[load_fat] Loaded {} FAT entries from {} sectors", fat.len(), fat_sectors.len());
	Ok(fat)
}

#[cfg(test)]
mod tests {
	use super::*;
	use super::super::structures::tests::sample_header;
	use super::super::structures::{SectorLocation, DIFSECT};

	fn write_ids(image: &mut Vec<u8>, offset: usize, ids: &[u32]) {
		if image.len() < offset + ids.len() * 4 {
			image.resize(offset + ids.len() * 4, 0);
		}
		LittleEndian::write_u32_into(ids, &mut image[offset..offset + ids.len() * 4]);
	}

	#[test]
	fn walks_simple_chain() {
		let fat = vec![1, 2, ENDOFCHAIN, ENDOFCHAIN];
		assert_eq!(walk_chain(&fat, 0, TableKind::Fat).unwrap(), vec![0, 1, 2]);
		assert_eq!(walk_chain(&fat, 3, TableKind::Fat).unwrap(), vec![3]);
	}

	#[test]
	fn end_of_chain_start_is_empty() {
		let fat = vec![ENDOFCHAIN];
		assert!(walk_chain(&fat, ENDOFCHAIN, TableKind::Fat).unwrap().is_empty());
	}

	#[test]
	fn self_loop_is_a_cycle() {
		let mut fat = vec![FREESECT; 8];
		fat[5] = 5;
		match walk_chain(&fat, 5, TableKind::Fat) {
			Err(CfbError::FatCycle { sector: 5, chain }) => assert_eq!(chain, vec![5]),
			other => panic!("unexpected result {:?}", other),
		}
	}

	#[test]
	fn two_sector_loop_is_a_cycle() {
		let mut fat = vec![FREESECT; 8];
		fat[3] = 4;
		fat[4] = 3;
		let err = walk_chain(&fat, 3, TableKind::MiniFat).unwrap_err();
		assert!(matches!(err, CfbError::MiniFatCycle { sector: 3, .. }));
		assert_eq!(err.partial_chain(), Some(&[3, 4][..]));
	}

	#[test]
	fn link_past_table_end_is_out_of_bounds() {
		let fat = vec![1, 2];
		match walk_chain(&fat, 0, TableKind::Fat) {
			Err(CfbError::FatOutOfBounds { sector: 2, chain }) => assert_eq!(chain, vec![0, 1, 2]),
			other => panic!("unexpected result {:?}", other),
		}
		assert!(matches!(walk_chain(&fat, FREESECT, TableKind::MiniFat), Err(CfbError::MiniFatOutOfBounds { .. })));
	}

	#[test]
	fn overlong_chain_is_truncated() {
		let fat: Vec<u32> = (1..=(MAX_SECTORS as u32 + 10)).collect();
		let chain = walk_chain(&fat, 0, TableKind::Fat).unwrap();
		assert_eq!(chain.len(), MAX_SECTORS);
		assert_eq!(chain[MAX_SECTORS - 1], MAX_SECTORS as u32 - 1);
	}

	#[test]
	fn difat_chain_skips_last_two_entries() {
		let mut header = Header::parse(&sample_header(0x9)).unwrap();
		header.first_difat_sector_location = SectorLocation(2);
		header.number_of_difat_sectors = 1;

		let mut image = vec![0u8; 512 * 4];
		let mut difat = vec![FREESECT; 128];
		difat[0] = 5;
		difat[1] = 6;
		difat[126] = 9;
		difat[127] = ENDOFCHAIN;
		write_ids(&mut image, sector_offset(2, 512) as usize, &difat);

		let fat_sectors = load_fat_sector_list(&image, &header).unwrap();
		assert_eq!(fat_sectors, vec![0, 5, 6]);
	}

	#[test]
	fn difat_self_link_is_a_cycle() {
		let mut header = Header::parse(&sample_header(0x9)).unwrap();
		header.first_difat_sector_location = SectorLocation(1);

		let mut image = vec![0u8; 512 * 3];
		let mut difat = vec![FREESECT; 128];
		difat[127] = 1;
		write_ids(&mut image, sector_offset(1, 512) as usize, &difat);

		assert!(matches!(load_fat_sector_list(&image, &header), Err(CfbError::DifatCycle { sector: 1, next: 1 })));
	}

	#[test]
	fn truncated_difat_sector_stops_walk() {
		let mut header = Header::parse(&sample_header(0x9)).unwrap();
		header.first_difat_sector_location = SectorLocation(40);
		let image = vec![0u8; 1024];
		assert_eq!(load_fat_sector_list(&image, &header).unwrap(), vec![0]);
	}

	#[test]
	fn loads_fat_from_sectors() {
		let mut image = vec![0u8; 512 * 3];
		let mut first = vec![FREESECT; 128];
		first[0] = DIFSECT;
		first[1] = ENDOFCHAIN;
		write_ids(&mut image, sector_offset(0, 512) as usize, &first);
		let second = vec![7u32; 128];
		write_ids(&mut image, sector_offset(1, 512) as usize, &second);

		let fat = load_fat(&image, 512, &[0, 1]).unwrap();
		assert_eq!(fat.len(), 256);
		assert_eq!(fat[0], DIFSECT);
		assert_eq!(fat[1], ENDOFCHAIN);
		assert_eq!(fat[128], 7);
	}

	#[test]
	fn short_fat_sector_is_truncated_fat() {
		let image = vec![0u8; 512 + 100];
		assert!(matches!(load_fat(&image, 512, &[0]), Err(CfbError::TruncatedFat { sector: 0, read: 100, expected: 512 })));
	}
}
