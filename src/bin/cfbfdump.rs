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

#[macro_use] // enable value_t! macro
extern crate clap;
extern crate cfbfread;

use std::io::{self, stdin, stdout, Read, Write, BufWriter};
use std::fs::File;
use clap::{Arg, App, AppSettings, SubCommand, ArgMatches};
use log::info;
use cfbfread::cfbf::{CfbError, Container};
use cfbfread::io::{logger, OffsetReader, PagedReader, ReadAt, StreamCursor};

/// Geometry of the page cache in front of input files.
const PAGE_SIZE: usize = 1024;
const MAX_PAGES: usize = 10000;

fn main() {
	let matches = App::new("cfbfdump")
		.version("1.0")
		.author("Steve Muller <steve.muller@outlook.com>")
		.about("This utility reads a Compound File Binary File Format (also known as OLE file, COM file, or Structured Storage file) and dumps its directory table or individual streams.")
		.setting(AppSettings::SubcommandRequired)
		.arg(Arg::with_name("verbose")
			.short("v")
			.help("Increases the debug verbosity. This will print a lot of debug messages to standard error (STDERR). Can be used up to 3 times.")
			.multiple(true)
			.takes_value(false))
		.subcommand(SubCommand::with_name("ls")
			.about("Lists the directory table of the CFBF file. Each output line is a JSON object describing one directory entry.")
			.arg(input_arg())
			.arg(Arg::with_name("path")
				.value_name("PATH")
				.help("The path to list, separated by \\. Only the root path lists entries.")
				.default_value("\\")
				.index(2))
			.arg(image_offset_arg())
		)
		.subcommand(SubCommand::with_name("cat")
			.about("Dumps a stream from the CFBF file to standard output (STDOUT).")
			.arg(input_arg())
			.arg(Arg::with_name("id")
				.value_name("ID")
				.help("The ID of the stream that shall be dumped.")
				.default_value("0")
				.index(2))
			.arg(Arg::with_name("sector")
				.long("sector")
				.help("Treats the ID as the first sector of a sector chain, and dumps the whole chain.")
				.takes_value(false))
			.arg(image_offset_arg())
		)
	.get_matches();

	let verbose = matches.occurrences_of("verbose");
	if let Err(e) = logger::init(verbose) {
		eprintln!("Cannot set up logging: {}", e);
	}

	if let Err(e) = dispatch(&matches) {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}
}

fn input_arg<'a, 'b>() -> Arg<'a, 'b> {
	Arg::with_name("input")
		.value_name("FILE")
		.help("A file in Compound File Binary File Format (CFBF). Use '-' to read it from STDIN instead.")
		.required(true)
		.index(1)
}

fn image_offset_arg<'a, 'b>() -> Arg<'a, 'b> {
	Arg::with_name("image_offset")
		.value_name("OFFSET")
		.help("The byte offset of the CFBF data within the input.")
		.long("image-offset")
		.default_value("0")
}

fn dispatch(matches: &ArgMatches) -> Result<(), CfbError> {
	match matches.subcommand() {
		("ls", Some(submatches)) => dispatch_ls(submatches),
		("cat", Some(submatches)) => dispatch_cat(submatches),
		_ => unreachable!("Unrecognised subcommand"),
	}
}

fn open_input(matches: &ArgMatches) -> Result<Container<Box<dyn ReadAt>>, CfbError> {
	let inputfile = matches.value_of("input").unwrap_or("-");
	let image_offset = value_t!(matches, "image_offset", u64).unwrap_or_else(|e| e.exit());

	let input: Box<dyn ReadAt> = match inputfile {
		"" | "-" => {
			let mut data = Vec::new();
			stdin().read_to_end(&mut data)?;
			Box::new(data)
		},
		_ => Box::new(PagedReader::new(File::open(inputfile)?, PAGE_SIZE, MAX_PAGES)),
	};
	let input: Box<dyn ReadAt> = if image_offset > 0 { Box::new(OffsetReader::new(input, image_offset)) } else { input };
	Container::open(input)
}

fn dispatch_ls(matches: &ArgMatches) -> Result<(), CfbError> {
	let container = open_input(matches)?;
	info!("CFBF header:\n{}", container.header());

	let path = matches.value_of("path").unwrap_or("");
	let stdout = stdout();
	let mut output = BufWriter::new(stdout.lock());
	for object in container.list_directory(path) {
		let line = serde_json::to_string(object).map_err(io::Error::from)?;
		writeln!(output, "{}", line)?;
	}
	output.flush()?;
	Ok(())
}

fn dispatch_cat(matches: &ArgMatches) -> Result<(), CfbError> {
	let container = open_input(matches)?;
	let stdout = stdout();
	let mut output = BufWriter::new(stdout.lock());

	if matches.is_present("sector") {
		let sector = value_t!(matches, "id", u32).unwrap_or_else(|e| e.exit());
		let stream = container.stream_by_first_sector(sector)?;
		let size = stream.size();
		info!("Dumping sector chain starting at {:#X} ({} bytes)", sector, size);
		io::copy(&mut StreamCursor::new(stream, size), &mut output)?;
	}
	else {
		let id = value_t!(matches, "id", u64).unwrap_or_else(|e| e.exit());
		let (stream, size) = container.stream_by_directory_id(id)?;
		info!("Dumping stream #{} ({} bytes)", id, size);
		io::copy(&mut StreamCursor::new(stream, size), &mut output)?;
	}
	output.flush()?;
	Ok(())
}
