//! Probabilistic context-free grammar (PCFG) password guess generation.
//!
//! This crate provides:
//! - Trained grammar loading and validation (`grammar`)
//! - Guess enumeration in non-increasing probability order (`enumerate`)
//! - Random-walk guess sampling
//! - Typed load and output errors
//!
//! Memory use is bounded by the search frontier, never by the number of
//! guesses produced.

/// Enumeration engine: derivations, frontier, expansion, emission, driver.
pub mod enumerate;

/// Error types for loading and emission.
pub mod error;

/// Grammar store and ruleset loading.
pub mod grammar;

/// Ruleset directory helpers (paths, listing).
pub mod io;

#[cfg(test)]
pub(crate) mod testing;

pub use enumerate::{Driver, Report, Termination, TerminationPolicy};
pub use error::{EmitError, LoadError};
pub use grammar::{load_ruleset, GrammarStore, LoadOptions};
