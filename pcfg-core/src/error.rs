use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a grammar (or restoring a checkpoint).
///
/// Every variant is fatal: a partially loaded grammar is never returned.
/// The variants are grouped so calling tooling can tell configuration
/// problems apart from data corruption, see [`LoadError::exit_code`].
#[derive(Debug, Error)]
pub enum LoadError {
	/// A file is missing or unreadable.
	#[error("could not read {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	/// The ruleset content is invalid (bad probability, unsorted buckets,
	/// missing tab, bad filename identifier, dangling slot, ...).
	#[error("malformed grammar ({location}): {reason}")]
	MalformedGrammar {
		location: String,
		reason: String,
	},

	/// The ruleset was trained with an encoding other than UTF-8 or ASCII.
	#[error("unsupported ruleset encoding `{0}`, only utf-8 and ascii rulesets are supported")]
	UnsupportedEncoding(String),
}

impl LoadError {
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		LoadError::Io { path: path.into(), source }
	}

	pub(crate) fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
		LoadError::MalformedGrammar {
			location: location.into(),
			reason: reason.into(),
		}
	}

	/// Process exit status for this error.
	///
	/// - `1`: problem opening a file
	/// - `2`: malformed ruleset
	/// - `3`: unsupported encoding or feature
	pub fn exit_code(&self) -> i32 {
		match self {
			LoadError::Io { .. } => 1,
			LoadError::MalformedGrammar { .. } => 2,
			LoadError::UnsupportedEncoding(_) => 3,
		}
	}
}

/// Errors raised while writing guesses out.
///
/// The enumeration itself is pure in-memory work; the output sink is the
/// only thing that can fail once the grammar is loaded.
///
/// `emitted` counts the guesses the sink accepted. With a buffered sink
/// (e.g. `BufWriter`) accepted is not the same as written: a failure on
/// the final flush reports every guess, although the tail of the buffer
/// was lost.
#[derive(Debug, Error)]
pub enum EmitError {
	#[error("output sink failed after {emitted} guesses: {source}")]
	Sink {
		/// Guesses accepted by the sink before the failure.
		emitted: u64,
		#[source]
		source: io::Error,
	},
}

impl EmitError {
	/// Guesses accepted by the sink before the failure.
	pub fn emitted(&self) -> u64 {
		match self {
			EmitError::Sink { emitted, .. } => *emitted,
		}
	}

	/// Underlying I/O error.
	pub fn io_error(&self) -> &io::Error {
		match self {
			EmitError::Sink { source, .. } => source,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes_are_distinct() {
		let io = LoadError::io("config.ini", io::Error::new(io::ErrorKind::NotFound, "missing"));
		let malformed = LoadError::malformed("1.txt:3", "missing tab");
		let encoding = LoadError::UnsupportedEncoding("latin-1".to_owned());

		assert_eq!(io.exit_code(), 1);
		assert_eq!(malformed.exit_code(), 2);
		assert_eq!(encoding.exit_code(), 3);
	}

	#[test]
	fn messages_name_the_location() {
		let err = LoadError::malformed("Alpha/3.txt:7", "probability out of range");
		assert_eq!(err.to_string(), "malformed grammar (Alpha/3.txt:7): probability out of range");
	}
}
