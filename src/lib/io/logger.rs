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

use std::io::{stderr, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Writes log records to standard error (STDERR), one per line.
struct StderrLogger {
	level: LevelFilter,
}

impl Log for StderrLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= self.level
	}

	fn log(&self, record: &Record) {
		if self.enabled(record.metadata()) {
			let _ = writeln!(stderr(), "[{}] {}", record.level(), record.args());
		}
	}

	fn flush(&self) {
		let _ = stderr().flush();
	}
}

/// Maps the number of `-v` flags to a log level.
pub fn level_for_verbosity(verbosity: u64) -> LevelFilter {
	match verbosity {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	}
}

/// Installs the STDERR logger. Can only be called once per process.
pub fn init(verbosity: u64) -> Result<(), SetLoggerError> {
	let level = level_for_verbosity(verbosity);
	log::set_boxed_logger(Box::new(StderrLogger { level }))
		.map(|()| log::set_max_level(level))
}
