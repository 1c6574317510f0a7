use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::env;

/// Name of the configuration file at the root of every ruleset.
pub const CONFIG_FILENAME: &str = "config.ini";

/// Name of the compiled (postcard) grammar stored next to the config.
pub const COMPILED_FILENAME: &str = "compiled.bin";

/// Reads a whole text file into a `String`.
pub(crate) fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<String> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents)
}

/// Opens a text file and streams its lines.
///
/// - Splits on `\n` / `\r\n`
/// - Lines are read lazily, the file is never fully buffered
pub(crate) fn stream_lines<P: AsRef<Path>>(filename: P) -> io::Result<io::Lines<BufReader<File>>> {
	Ok(BufReader::new(File::open(filename)?).lines())
}

/// Builds the directory of a named ruleset.
///
/// Example:
/// `Rules` + `"Default"` → `Rules/Default`
pub fn ruleset_path<P: AsRef<Path>>(rules_root: P, name: &str) -> PathBuf {
	rules_root.as_ref().join(name)
}

/// Path of the compiled grammar for a ruleset directory.
pub(crate) fn compiled_path<P: AsRef<Path>>(ruleset_dir: P) -> PathBuf {
	ruleset_dir.as_ref().join(COMPILED_FILENAME)
}

/// Normalize a folder path.
///
/// - `"."` or `"./"` resolves to the current working directory
/// - Other paths are returned as-is (not canonicalized)
pub fn normalize_folder(input: &str) -> PathBuf {
	if input == "." || input == "./" {
		env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
	} else {
		PathBuf::from(input)
	}
}

/// Lists the rulesets available under a rules root.
///
/// A ruleset is any sub-directory holding a `config.ini`.
/// Returns directory names only (no paths), sorted.
pub fn list_rulesets<P: AsRef<Path>>(rules_root: P) -> io::Result<Vec<String>> {
	let mut rulesets = Vec::new();

	for entry in fs::read_dir(rules_root)? {
		let entry = entry?;
		let path = entry.path();

		if path.is_dir() && path.join(CONFIG_FILENAME).is_file() {
			if let Some(name) = path.file_name() {
				rulesets.push(name.to_string_lossy().to_string());
			}
		}
	}

	rulesets.sort();
	Ok(rulesets)
}
