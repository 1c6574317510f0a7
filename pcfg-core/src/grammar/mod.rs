//! Trained grammar representation and ruleset loading.
//!
//! - `GrammarStore`: immutable base structures and terminal tables
//! - `BucketTable` / `RankBucket`: rank-ordered terminal pools
//! - `BaseStructure` / `TerminalKey`: slot templates
//! - `RulesetConfig`: the ruleset `config.ini`
//! - `load_ruleset`: builds a store from a ruleset directory

/// Rank-ordered probability buckets of literal strings.
pub mod bucket;

/// INI configuration of a ruleset directory.
pub mod config;

/// Ruleset directory loading (text files and compiled cache).
pub mod loader;

/// Validated, immutable grammar.
pub mod store;

/// Base structures and their slot descriptors.
pub mod structure;

pub use bucket::{BucketTable, RankBucket};
pub use config::RulesetConfig;
pub use loader::{compile_ruleset, load_ruleset, LoadOptions, DEFAULT_MAX_LENGTH};
pub use store::GrammarStore;
pub use structure::{BaseStructure, TerminalKey};
