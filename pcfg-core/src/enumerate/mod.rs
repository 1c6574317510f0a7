//! Probability-ordered guess enumeration.
//!
//! This module provides the enumeration engine, including:
//! - Derivation records (`PreTerminal`)
//! - The priority queue of pending derivations (`Frontier`)
//! - Exactly-once child generation (`Expander`)
//! - Lazy cross-product of literal strings (`GuessEmitter`)
//! - The main loop and its termination policy (`Driver`)
//! - Random-walk generation (`Sampler`)

/// Main loop, termination policy, reports and checkpoints.
pub mod driver;

/// Lazy literal guess generation for one derivation.
pub mod emitter;

/// Child derivations of a popped derivation.
///
/// Guarantees every derivation is generated by exactly one path.
pub mod expander;

/// Max-priority queue of derivations.
pub mod frontier;

/// Derivation record and its priority order.
pub mod preterminal;

/// Random-walk guess generation.
pub mod sampler;

pub use driver::{Batch, Checkpoint, Driver, OrderedGuesses, Report, Termination, TerminationPolicy};
pub use emitter::{GuessEmitter, Guesses};
pub use expander::Expander;
pub use frontier::Frontier;
pub use preterminal::PreTerminal;
pub use sampler::{Sample, Sampler};
