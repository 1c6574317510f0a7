use std::io;
use std::path::Path;

use crate::error::LoadError;
use crate::io::read_file;

/// Section holding the training details (encoding, ...).
pub const DETAILS_SECTION: &str = "TRAINING_DATASET_DETAILS";

/// Section listing the base-structure files.
pub const BASE_STRUCTURE_SECTION: &str = "START";

/// Encodings the guesser can generate from.
pub const SUPPORTED_ENCODINGS: [&str; 2] = ["utf-8", "ascii"];

/// One `[name]` block of a ruleset configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
	name: String,
	/// Keys are lower-cased, values trimmed. Order is file order.
	entries: Vec<(String, String)>,
}

impl Section {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns the value of `key` (case-insensitive).
	pub fn get(&self, key: &str) -> Option<&str> {
		let key = key.to_ascii_lowercase();
		self.entries
			.iter()
			.rev()
			.find(|(k, _)| *k == key)
			.map(|(_, v)| v.as_str())
	}

	/// Returns the value of `key` parsed as a JSON list of strings.
	///
	/// Example: `filenames = ["1.txt", "2.txt"]`
	///
	/// # Errors
	/// Returns an error if the key is missing or is not a list of strings.
	pub fn get_list(&self, key: &str) -> Result<Vec<String>, String> {
		let value = self
			.get(key)
			.ok_or_else(|| format!("[{}] has no `{}` key", self.name, key))?;
		serde_json::from_str(value).map_err(|e| format!("[{}] `{}` is not a list of strings: {}", self.name, key, e))
	}

	/// Returns the value of `key` read as a boolean (`True`/`False`, any case).
	pub fn get_bool(&self, key: &str) -> Option<bool> {
		match self.get(key)?.to_ascii_lowercase().as_str() {
			"true" | "yes" | "on" | "1" => Some(true),
			"false" | "no" | "off" | "0" => Some(false),
			_ => None,
		}
	}
}

/// A file group of the ruleset: the directory and file names of one
/// section.
#[derive(Clone, Debug, PartialEq)]
pub struct FileGroup {
	/// Section the group comes from.
	pub section: String,
	/// Terminal class name (unused for base structures).
	pub class: String,
	pub directory: String,
	pub filenames: Vec<String>,
}

/// Parsed `config.ini` of a ruleset.
///
/// The format is the INI dialect written by the trainer:
/// - `[section]` headers
/// - `key = value` or `key: value` pairs
/// - `#` and `;` comment lines, blank lines
/// - indented lines continue the previous value
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RulesetConfig {
	sections: Vec<Section>,
}

impl RulesetConfig {
	/// Reads and parses a configuration file.
	///
	/// # Errors
	/// - `LoadError::Io` if the file cannot be read
	/// - `LoadError::MalformedGrammar` if it is not valid INI
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
		let path = path.as_ref();
		let text = read_file(path).map_err(|e| match e.kind() {
			io::ErrorKind::InvalidData => LoadError::malformed(path.display().to_string(), "file is not valid UTF-8"),
			_ => LoadError::io(path, e),
		})?;
		Self::parse(&text).map_err(|reason| LoadError::malformed(path.display().to_string(), reason))
	}

	/// Parses configuration text.
	///
	/// # Errors
	/// Returns a description (with line number) of the first invalid line.
	pub fn parse(text: &str) -> Result<Self, String> {
		let mut config = Self::default();

		for (number, raw) in text.lines().enumerate() {
			let number = number + 1;
			let line = raw.trim();

			if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
				continue;
			}

			// Continuation of a multi-line value
			if raw.starts_with([' ', '\t']) {
				if let Some((_, value)) = config.sections.last_mut().and_then(|s| s.entries.last_mut()) {
					value.push('\n');
					value.push_str(line);
					continue;
				}
			}

			if let Some(header) = line.strip_prefix('[') {
				let name = header
					.strip_suffix(']')
					.map(str::trim)
					.filter(|name| !name.is_empty())
					.ok_or_else(|| format!("line {}: invalid section header `{}`", number, line))?;
				config.sections.push(Section {
					name: name.to_owned(),
					entries: Vec::new(),
				});
				continue;
			}

			let split = line
				.find(['=', ':'])
				.ok_or_else(|| format!("line {}: expected `key = value`, got `{}`", number, line))?;
			let key = line[..split].trim().to_ascii_lowercase();
			let value = line[split + 1..].trim().to_owned();
			if key.is_empty() {
				return Err(format!("line {}: empty key", number));
			}

			match config.sections.last_mut() {
				Some(section) => section.entries.push((key, value)),
				None => return Err(format!("line {}: key `{}` outside of any section", number, key)),
			}
		}

		Ok(config)
	}

	/// Returns the last section named `name`.
	pub fn section(&self, name: &str) -> Option<&Section> {
		self.sections.iter().rev().find(|s| s.name == name)
	}

	pub fn sections(&self) -> impl Iterator<Item = &Section> {
		self.sections.iter()
	}

	/// Checks the encoding the ruleset was trained with.
	///
	/// # Errors
	/// - `LoadError::MalformedGrammar` if the encoding is not declared
	/// - `LoadError::UnsupportedEncoding` if it is neither UTF-8 nor ASCII
	pub fn check_encoding(&self) -> Result<(), LoadError> {
		let encoding = self
			.section(DETAILS_SECTION)
			.and_then(|s| s.get("encoding"))
			.ok_or_else(|| LoadError::malformed(DETAILS_SECTION, "no `encoding` key"))?;

		if SUPPORTED_ENCODINGS.contains(&encoding) {
			Ok(())
		} else {
			Err(LoadError::UnsupportedEncoding(encoding.to_owned()))
		}
	}

	/// Returns the base-structure file group.
	///
	/// # Errors
	/// Returns `LoadError::MalformedGrammar` if the section, its directory
	/// or its file list is missing.
	pub fn base_structures(&self) -> Result<FileGroup, LoadError> {
		let section = self
			.section(BASE_STRUCTURE_SECTION)
			.ok_or_else(|| LoadError::malformed("config", format!("no [{}] section", BASE_STRUCTURE_SECTION)))?;
		Self::file_group(section, String::new())
	}

	/// Returns the file group of every terminal class section.
	///
	/// A terminal section is any section, other than the base-structure
	/// one, declaring both `directory` and `filenames`, unless it sets
	/// `is_terminal = False`. Its class is the `name` key, or the section
	/// name without its `BASE_` prefix.
	///
	/// # Errors
	/// Returns `LoadError::MalformedGrammar` if a file list is invalid.
	pub fn terminal_classes(&self) -> Result<Vec<FileGroup>, LoadError> {
		let mut groups = Vec::new();

		for section in &self.sections {
			if section.name == BASE_STRUCTURE_SECTION
				|| section.get("directory").is_none()
				|| section.get("filenames").is_none()
				|| section.get_bool("is_terminal") == Some(false)
			{
				continue;
			}

			let class = match section.get("name") {
				Some(name) if !name.is_empty() => name.to_owned(),
				_ => section.name.strip_prefix("BASE_").unwrap_or(&section.name).to_owned(),
			};
			groups.push(Self::file_group(section, class)?);
		}

		Ok(groups)
	}

	fn file_group(section: &Section, class: String) -> Result<FileGroup, LoadError> {
		let directory = section
			.get("directory")
			.ok_or_else(|| LoadError::malformed(format!("[{}]", section.name), "no `directory` key"))?;
		let filenames = section
			.get_list("filenames")
			.map_err(|reason| LoadError::malformed(format!("[{}]", section.name), reason))?;

		Ok(FileGroup {
			section: section.name.clone(),
			class,
			directory: directory.to_owned(),
			filenames,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
# Generated by the trainer
[TRAINING_DATASET_DETAILS]
encoding = utf-8
comments: sample ruleset

[START]
name = Base Structure
directory = Grammar
filenames = ["grammar.txt"]
is_terminal = False

[BASE_A]
directory = Alpha
filenames = ["1.txt", "3.txt"]
is_terminal = True

[BASE_D]
name = D
directory = Digits
filenames =
    ["1.txt",
     "2.txt"]

[CAPITALIZATION]
directory = Capitalization
filenames = ["1.txt"]
is_terminal = False
"#;

	#[test]
	fn parses_sections_and_keys() {
		let config = RulesetConfig::parse(CONFIG).unwrap();
		assert_eq!(config.sections().count(), 5);

		let details = config.section(DETAILS_SECTION).unwrap();
		assert_eq!(details.get("encoding"), Some("utf-8"));
		assert_eq!(details.get("Comments"), Some("sample ruleset"));
	}

	#[test]
	fn finds_terminal_classes() {
		let config = RulesetConfig::parse(CONFIG).unwrap();
		let classes = config.terminal_classes().unwrap();

		assert_eq!(classes.len(), 2);
		assert_eq!(classes[0].class, "A");
		assert_eq!(classes[0].directory, "Alpha");
		assert_eq!(classes[0].filenames, vec!["1.txt".to_owned(), "3.txt".to_owned()]);
		assert_eq!(classes[1].class, "D");
		assert_eq!(classes[1].filenames, vec!["1.txt".to_owned(), "2.txt".to_owned()]);

		let base = config.base_structures().unwrap();
		assert_eq!(base.directory, "Grammar");
		assert_eq!(base.filenames, vec!["grammar.txt".to_owned()]);
	}

	#[test]
	fn encoding_checks() {
		let config = RulesetConfig::parse(CONFIG).unwrap();
		assert!(config.check_encoding().is_ok());

		let ascii = RulesetConfig::parse("[TRAINING_DATASET_DETAILS]\nencoding = ascii\n").unwrap();
		assert!(ascii.check_encoding().is_ok());

		let latin = RulesetConfig::parse("[TRAINING_DATASET_DETAILS]\nencoding = latin-1\n").unwrap();
		assert!(matches!(latin.check_encoding(), Err(LoadError::UnsupportedEncoding(e)) if e == "latin-1"));

		let missing = RulesetConfig::parse("[TRAINING_DATASET_DETAILS]\n").unwrap();
		assert!(matches!(missing.check_encoding(), Err(LoadError::MalformedGrammar { .. })));
	}

	#[test]
	fn rejects_invalid_lines() {
		assert!(RulesetConfig::parse("encoding = utf-8").is_err());
		assert!(RulesetConfig::parse("[START]\njust text").is_err());
		assert!(RulesetConfig::parse("[START").is_err());
		assert!(RulesetConfig::parse("[]").is_err());
	}

	#[test]
	fn invalid_file_list_is_malformed() {
		let config = RulesetConfig::parse("[START]\ndirectory = Grammar\nfilenames = grammar.txt\n").unwrap();
		assert!(matches!(config.base_structures(), Err(LoadError::MalformedGrammar { .. })));
	}

	#[test]
	fn undecodable_config_is_malformed() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.ini");
		std::fs::write(&path, b"[TRAINING_DATASET_DETAILS]\nencoding = utf\xff8\n").unwrap();

		let err = RulesetConfig::load(&path).unwrap_err();
		assert!(matches!(err, LoadError::MalformedGrammar { .. }), "got {:?}", err);
	}
}
