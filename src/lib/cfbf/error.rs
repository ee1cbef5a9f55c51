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

use std::io;
use thiserror::Error;

/// Everything that can go wrong while decoding a CFBF container.
#[derive(Error, Debug)]
pub enum CfbError {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("Invalid file signature {0:#018X}")]
	BadSignature(u64),

	#[error("Invalid sector shift {0:#X}, expected 0x9 or 0xC")]
	BadSectorSize(u16),

	#[error("Invalid mini stream configuration: mini sector size {mini_sector_size}, cutoff {cutoff}")]
	BadMiniConfig { mini_sector_size: u64, cutoff: u32 },

	#[error("DIFAT loop detected at sector {sector:#X} linking to {next:#X}")]
	DifatCycle { sector: u32, next: u32 },

	#[error("FAT sector {sector:#X} is truncated: read {read} of {expected} bytes")]
	TruncatedFat { sector: u32, read: usize, expected: usize },

	#[error("FAT reference exceeded at sector {sector:#X} after {} sectors", .chain.len())]
	FatOutOfBounds { sector: u32, chain: Vec<u32> },

	#[error("FAT cycle detected at sector {sector:#X} after {} sectors", .chain.len())]
	FatCycle { sector: u32, chain: Vec<u32> },

	#[error("MiniFAT reference exceeded at mini-sector {sector:#X} after {} mini-sectors", .chain.len())]
	MiniFatOutOfBounds { sector: u32, chain: Vec<u32> },

	#[error("MiniFAT cycle detected at mini-sector {sector:#X} after {} mini-sectors", .chain.len())]
	MiniFatCycle { sector: u32, chain: Vec<u32> },

	#[error("Invalid directory index {0}")]
	BadDirectoryIndex(u64),

	#[error("Stream not found: {0}")]
	StreamNotFound(String),
}

impl CfbError {
	/// The part of a sector chain that was walked before a chain error was detected.
	pub fn partial_chain(&self) -> Option<&[u32]> {
		match self {
			CfbError::FatOutOfBounds { chain, .. }
			| CfbError::FatCycle { chain, .. }
			| CfbError::MiniFatOutOfBounds { chain, .. }
			| CfbError::MiniFatCycle { chain, .. } => Some(chain),
			_ => None,
		}
	}
}

pub type Result<T> = std::result::Result<T, CfbError>;
