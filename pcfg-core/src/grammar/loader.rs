use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::UNIX_EPOCH;
use std::{fs, io, thread};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::bucket::BucketTable;
use super::config::{FileGroup, RulesetConfig};
use super::store::GrammarStore;
use super::structure::{BaseStructure, TerminalKey};
use crate::error::LoadError;
use crate::io::{compiled_path, stream_lines, CONFIG_FILENAME};

/// Longest terminal loaded by default. Longer terminal files are skipped.
pub const DEFAULT_MAX_LENGTH: usize = 64;

/// Options controlling how a ruleset is loaded.
#[derive(Clone, Debug)]
pub struct LoadOptions {
	/// Terminal files whose length identifier is above this value are
	/// skipped, together with the base structures that need them.
	pub max_length: usize,
	/// Read `compiled.bin` when present, write it after compiling.
	pub use_cache: bool,
}

impl Default for LoadOptions {
	fn default() -> Self {
		Self {
			max_length: DEFAULT_MAX_LENGTH,
			use_cache: true,
		}
	}
}

/// One terminal file to load.
#[derive(Clone, Debug)]
struct TerminalFile {
	key: TerminalKey,
	path: PathBuf,
}

/// Loads a ruleset directory, using the compiled cache when possible.
///
/// - If `use_cache` is set and `compiled.bin` exists, it is decoded
///   (and fully validated) instead of reading the text files, provided it
///   was built with the same `max_length` from the same source files.
/// - A cache that is stale, or cannot be read or decoded, is ignored and rebuilt.
/// - After compiling, the cache is written; a write failure only logs a warning.
///
/// # Errors
/// See [`compile_ruleset`].
pub fn load_ruleset<P: AsRef<Path>>(ruleset_dir: P, options: &LoadOptions) -> Result<GrammarStore, LoadError> {
	let ruleset_dir = ruleset_dir.as_ref();
	let cache = compiled_path(ruleset_dir);

	// Unreadable sources: no cache, let the compile report the error
	let stamp = if options.use_cache { SourceStamp::of(ruleset_dir, options.max_length) } else { None };

	if let Some(stamp) = &stamp {
		if cache.is_file() {
			match read_compiled(&cache, stamp) {
				Ok(Some(store)) => {
					info!("Loaded compiled grammar {}", cache.display());
					return Ok(store);
				}
				Ok(None) => info!("Compiled grammar {} is out of date", cache.display()),
				Err(e) => warn!("Ignoring compiled grammar: {e}"),
			}
		}
	}

	let store = compile_ruleset(ruleset_dir, options)?;

	if let Some(stamp) = stamp {
		if let Err(e) = write_compiled(&cache, stamp, &store) {
			warn!("Could not write compiled grammar {}: {e}", cache.display());
		}
	}

	Ok(store)
}

/// What a compiled grammar was built from.
///
/// The cache is valid only while every source file keeps its size and
/// modification time, and for the same maximum terminal length.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct SourceStamp {
	max_length: u64,
	/// `(path, size, modification time as (seconds, nanoseconds))`
	files: Vec<(String, u64, Option<(u64, u32)>)>,
}

impl SourceStamp {
	/// Stamps the config, base structure and terminal files of a ruleset.
	///
	/// Returns `None` if the config cannot be read or a file is missing.
	fn of(ruleset_dir: &Path, max_length: usize) -> Option<Self> {
		let config_path = ruleset_dir.join(CONFIG_FILENAME);
		let config = RulesetConfig::load(&config_path).ok()?;

		let mut paths = vec![config_path];
		let group = config.base_structures().ok()?;
		paths.extend(group.filenames.iter().map(|f| ruleset_dir.join(&group.directory).join(f)));
		for group in config.terminal_classes().ok()? {
			let files = terminal_files(ruleset_dir, &group, max_length).ok()?;
			paths.extend(files.into_iter().map(|file| file.path));
		}

		let mut files = Vec::with_capacity(paths.len());
		for path in paths {
			let metadata = fs::metadata(&path).ok()?;
			let modified = metadata
				.modified()
				.ok()
				.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
				.map(|d| (d.as_secs(), d.subsec_nanos()));
			files.push((path.display().to_string(), metadata.len(), modified));
		}

		Some(Self {
			max_length: max_length as u64,
			files,
		})
	}
}

/// On-disk layout of `compiled.bin`.
#[derive(Serialize, Deserialize)]
struct CompiledRuleset {
	stamp: SourceStamp,
	/// [`GrammarStore::to_bytes`] output.
	grammar: Vec<u8>,
}

/// Reads a compiled grammar, returning `None` if it does not match `stamp`.
fn read_compiled(cache: &Path, stamp: &SourceStamp) -> Result<Option<GrammarStore>, LoadError> {
	let bytes = fs::read(cache).map_err(|e| LoadError::io(cache, e))?;
	let compiled: CompiledRuleset = postcard::from_bytes(&bytes)
		.map_err(|e| LoadError::malformed("compiled grammar", e.to_string()))?;
	if compiled.stamp != *stamp {
		return Ok(None);
	}
	GrammarStore::from_bytes(&compiled.grammar).map(Some)
}

fn write_compiled(cache: &Path, stamp: SourceStamp, store: &GrammarStore) -> Result<(), Box<dyn std::error::Error>> {
	let compiled = CompiledRuleset {
		stamp,
		grammar: store.to_bytes()?,
	};
	fs::write(cache, postcard::to_stdvec(&compiled)?)?;
	Ok(())
}

/// Reads a ruleset directory from its text files.
///
/// # Behavior
/// - Reads `config.ini` and checks the ruleset encoding.
/// - Loads every terminal file in parallel (one chunk per CPU).
/// - Loads the base structures, skipping those needing a terminal
///   longer than `max_length`.
/// - Builds and validates the [`GrammarStore`].
///
/// # Errors
/// - `LoadError::Io` if a file cannot be opened
/// - `LoadError::MalformedGrammar` for any invalid content
/// - `LoadError::UnsupportedEncoding` if the ruleset is neither UTF-8 nor ASCII
pub fn compile_ruleset<P: AsRef<Path>>(ruleset_dir: P, options: &LoadOptions) -> Result<GrammarStore, LoadError> {
	let ruleset_dir = ruleset_dir.as_ref();
	info!("Loading ruleset {}", ruleset_dir.display());

	let config = RulesetConfig::load(ruleset_dir.join(CONFIG_FILENAME))?;
	config.check_encoding()?;

	let mut files = Vec::new();
	for group in config.terminal_classes()? {
		files.extend(terminal_files(ruleset_dir, &group, options.max_length)?);
	}
	let tables = load_terminal_files(files)?;

	let group = config.base_structures()?;
	let mut structures = Vec::new();
	for filename in &group.filenames {
		let path = ruleset_dir.join(&group.directory).join(filename);
		structures.extend(load_structure_file(&path, options.max_length)?);
	}

	let store = GrammarStore::new(structures, tables)?;
	info!(
		"Loaded {} base structures and {} terminal tables",
		store.structure_count(),
		store.tables().count()
	);
	Ok(store)
}

/// Extracts the numeric identifier of a terminal file name.
///
/// `"23.txt"` → `23`. The identifier is the terminal length.
///
/// # Errors
/// Returns an error if the name has no extension, the identifier is not
/// a number, or it is not strictly positive.
pub(crate) fn file_identifier(filename: &str) -> Result<usize, String> {
	let (stem, _) = filename
		.split_once('.')
		.ok_or_else(|| format!("file name `{}` has no extension", filename))?;
	let id: i64 = stem
		.parse()
		.map_err(|_| format!("file name `{}` does not start with a number", filename))?;
	if id <= 0 {
		return Err(format!("file name `{}` has a non-positive identifier", filename));
	}
	usize::try_from(id).map_err(|_| format!("file name `{}` identifier is too large", filename))
}

/// Splits a `value<TAB>probability` line.
///
/// # Errors
/// Returns an error if the tab is missing, or the probability is not a
/// finite number within `[0.0, 1.0]`.
pub(crate) fn split_value(line: &str) -> Result<(&str, f64), String> {
	let (value, probability) = line
		.split_once('\t')
		.ok_or_else(|| "missing tab separator".to_owned())?;
	let probability: f64 = probability
		.trim()
		.parse()
		.map_err(|_| format!("invalid probability `{}`", probability.trim()))?;
	if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
		return Err(format!("probability {} is out of range", probability));
	}
	Ok((value, probability))
}

/// Maps a failed line read: undecodable text is malformed data, the rest is I/O.
fn line_error(path: &Path, number: usize, e: io::Error) -> LoadError {
	if e.kind() == io::ErrorKind::InvalidData {
		LoadError::malformed(format!("{}:{}", path.display(), number + 1), "line is not valid UTF-8")
	} else {
		LoadError::io(path, e)
	}
}

/// Lists the terminal files of a class, skipping lengths above `max_length`.
fn terminal_files(ruleset_dir: &Path, group: &FileGroup, max_length: usize) -> Result<Vec<TerminalFile>, LoadError> {
	let mut files = Vec::with_capacity(group.filenames.len());

	for filename in &group.filenames {
		let length = file_identifier(filename)
			.map_err(|reason| LoadError::malformed(format!("[{}]", group.section), reason))?;
		if length > max_length {
			debug!("Skipping {}/{}: length {} > {}", group.directory, filename, length, max_length);
			continue;
		}
		files.push(TerminalFile {
			key: TerminalKey::new(&group.class, length),
			path: ruleset_dir.join(&group.directory).join(filename),
		});
	}

	Ok(files)
}

/// Loads one terminal file in a single streaming pass.
///
/// Consecutive lines with the same probability share a rank bucket;
/// ordering is checked as lines arrive.
fn load_terminal_file(path: &Path) -> Result<BucketTable, LoadError> {
	debug!("Loading {}", path.display());
	let lines = stream_lines(path).map_err(|e| LoadError::io(path, e))?;

	let mut table = BucketTable::default();
	for (number, line) in lines.enumerate() {
		let line = line.map_err(|e| line_error(path, number, e))?;
		if line.is_empty() {
			continue;
		}
		let location = || format!("{}:{}", path.display(), number + 1);
		let (value, probability) = split_value(&line).map_err(|reason| LoadError::malformed(location(), reason))?;
		table
			.push_entry(value.to_owned(), probability)
			.map_err(|reason| LoadError::malformed(location(), reason))?;
	}

	Ok(table)
}

/// Loads terminal files on `num_cpus` threads.
///
/// Results are collected over a channel and put back in file order, so
/// the reported error (if any) is the one of the first failing file.
fn load_terminal_files(files: Vec<TerminalFile>) -> Result<Vec<(TerminalKey, BucketTable)>, LoadError> {
	if files.is_empty() {
		return Ok(Vec::new());
	}

	let threads = num_cpus::get().max(1);
	let chunk_size = files.len().div_ceil(threads);

	let (tx, rx) = mpsc::channel();
	for (chunk_index, chunk) in files.chunks(chunk_size).enumerate() {
		let tx = tx.clone();
		let chunk: Vec<TerminalFile> = chunk.to_vec();
		let first = chunk_index * chunk_size;

		thread::spawn(move || {
			for (offset, file) in chunk.into_iter().enumerate() {
				let result = load_terminal_file(&file.path).map(|table| (file.key, table));
				// Receiver gone: the loader already returned
				if tx.send((first + offset, result)).is_err() {
					break;
				}
			}
		});
	}
	drop(tx);

	let mut results: Vec<Option<Result<(TerminalKey, BucketTable), LoadError>>> = files.iter().map(|_| None).collect();
	for (i, result) in rx.iter() {
		results[i] = Some(result);
	}

	let mut tables = Vec::with_capacity(files.len());
	for (file, result) in files.iter().zip(results) {
		let (key, table) = match result {
			Some(result) => result?,
			None => {
				return Err(LoadError::io(&file.path, io::Error::other("loader thread stopped before reading the file")));
			}
		};
		if table.is_empty() {
			warn!("Skipping {}: no entries", file.path.display());
			continue;
		}
		tables.push((key, table));
	}

	Ok(tables)
}

/// Loads a base-structure file (`A4D2<TAB>probability` lines).
///
/// Structures with a slot longer than `max_length` are skipped.
fn load_structure_file(path: &Path, max_length: usize) -> Result<Vec<BaseStructure>, LoadError> {
	debug!("Loading {}", path.display());
	let lines = stream_lines(path).map_err(|e| LoadError::io(path, e))?;

	let mut structures = Vec::new();
	let mut skipped = 0usize;
	for (number, line) in lines.enumerate() {
		let line = line.map_err(|e| line_error(path, number, e))?;
		if line.is_empty() {
			continue;
		}
		let location = || format!("{}:{}", path.display(), number + 1);
		let (text, probability) = split_value(&line).map_err(|reason| LoadError::malformed(location(), reason))?;
		let structure =
			BaseStructure::parse(text, probability).map_err(|reason| LoadError::malformed(location(), reason))?;

		if structure.slots().iter().any(|slot| slot.length > max_length) {
			skipped += 1;
			continue;
		}
		structures.push(structure);
	}

	if skipped > 0 {
		debug!("Skipped {} base structures longer than {}", skipped, max_length);
	}
	Ok(structures)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_identifiers() {
		assert_eq!(file_identifier("1.txt"), Ok(1));
		assert_eq!(file_identifier("23.txt"), Ok(23));
		assert!(file_identifier("23").is_err());
		assert!(file_identifier("abc.txt").is_err());
		assert!(file_identifier("0.txt").is_err());
		assert!(file_identifier("-4.txt").is_err());
		assert!(file_identifier("99999999999999999999.txt").is_err());
	}

	#[test]
	fn split_values() {
		assert_eq!(split_value("cat\t0.6"), Ok(("cat", 0.6)));
		assert_eq!(split_value("\t1.0"), Ok(("", 1.0)));
		assert_eq!(split_value("a b\t0.5 "), Ok(("a b", 0.5)));
		assert!(split_value("cat 0.6").is_err());
		assert!(split_value("cat\tabc").is_err());
		assert!(split_value("cat\t1.5").is_err());
		assert!(split_value("cat\t-0.1").is_err());
		assert!(split_value("cat\tNaN").is_err());
		assert!(split_value("cat\tinf").is_err());
	}

	#[test]
	fn terminal_file_groups_equal_probabilities() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("3.txt");
		fs::write(&path, "cat\t0.6\ndog\t0.4\nfox\t0.4\n\n").unwrap();

		let table = load_terminal_file(&path).unwrap();
		assert_eq!(table.len(), 2);
		assert_eq!(table.get(1).unwrap().values(), &["dog".to_owned(), "fox".to_owned()]);
	}

	#[test]
	fn terminal_file_errors_name_the_line() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("3.txt");
		fs::write(&path, "cat\t0.4\ndog\t0.6\n").unwrap();

		match load_terminal_file(&path) {
			Err(LoadError::MalformedGrammar { location, .. }) => assert!(location.ends_with(":2")),
			other => panic!("expected a malformed grammar, got {:?}", other),
		}
	}

	#[test]
	fn invalid_utf8_is_malformed() {
		let dir = tempfile::tempdir().unwrap();
		let terminals = dir.path().join("4.txt");
		fs::write(&terminals, b"cafe\t0.5\ncaf\xe9\t0.4\n").unwrap();
		let structures = dir.path().join("grammar.txt");
		fs::write(&structures, b"A\xff4\t1.0\n").unwrap();

		match load_terminal_file(&terminals) {
			Err(LoadError::MalformedGrammar { location, .. }) => assert!(location.ends_with(":2")),
			other => panic!("expected a malformed grammar, got {:?}", other),
		}
		let err = load_structure_file(&structures, 64).unwrap_err();
		assert_eq!(err.exit_code(), 2);
	}

	#[test]
	fn missing_terminal_file_is_io() {
		let dir = tempfile::tempdir().unwrap();
		let result = load_terminal_file(&dir.path().join("9.txt"));
		assert!(matches!(result, Err(LoadError::Io { .. })));
	}

	#[test]
	fn parallel_loading_keeps_file_order() {
		let dir = tempfile::tempdir().unwrap();
		let mut files = Vec::new();
		for length in 1..=20 {
			let path = dir.path().join(format!("{}.txt", length));
			fs::write(&path, format!("{}\t1.0\n", "x".repeat(length))).unwrap();
			files.push(TerminalFile {
				key: TerminalKey::new("A", length),
				path,
			});
		}

		let tables = load_terminal_files(files).unwrap();
		let lengths: Vec<usize> = tables.iter().map(|(key, _)| key.length).collect();
		assert_eq!(lengths, (1..=20).collect::<Vec<_>>());
		assert_eq!(tables[4].1.get(0).unwrap().values(), &["xxxxx".to_owned()]);
	}

	#[test]
	fn long_structures_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("grammar.txt");
		fs::write(&path, "A3\t0.5\nA3D70\t0.3\nD2\t0.2\n").unwrap();

		let structures = load_structure_file(&path, 64).unwrap();
		let names: Vec<String> = structures.iter().map(|s| s.to_string()).collect();
		assert_eq!(names, vec!["A3".to_owned(), "D2".to_owned()]);
	}
}
