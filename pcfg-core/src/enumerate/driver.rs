use std::io::Write;
use std::iter::FusedIterator;
use std::ops::Range;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use super::emitter::{GuessEmitter, Guesses};
use super::expander::Expander;
use super::frontier::Frontier;
use super::preterminal::PreTerminal;
use crate::error::{EmitError, LoadError};
use crate::grammar::GrammarStore;

/// When to stop an enumeration.
///
/// With no limit set, the driver runs until the guess space is exhausted.
///
/// # Invariants
/// - `minimum_probability`, when set, is within `[0.0, 1.0]`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TerminationPolicy {
	/// Stop before popping a derivation below this probability.
	minimum_probability: Option<f64>,

	/// Stop once this many guesses have been emitted.
	pub maximum_guesses: Option<u64>,

	/// Stop once this many derivations have been popped.
	pub maximum_preterminals: Option<u64>,
}

impl TerminationPolicy {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the probability threshold, if any.
	pub fn minimum_probability(&self) -> Option<f64> {
		self.minimum_probability
	}

	/// Sets the probability threshold (`None` disables it).
	///
	/// # Errors
	/// Returns an error if the value is outside `[0.0, 1.0]`.
	pub fn set_minimum_probability(&mut self, probability: Option<f64>) -> Result<(), String> {
		if let Some(p) = probability {
			if !(0.0..=1.0).contains(&p) {
				return Err(format!("Minimum probability must be between 0.0 and 1.0, got {}", p));
			}
		}
		self.minimum_probability = probability;
		Ok(())
	}
}

/// Why an enumeration stopped.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
	/// Every derivation was emitted. This is a normal end, not an error.
	ExhaustedSpace,
	/// The next derivation is below the minimum probability.
	BelowMinimumProbability,
	/// The maximum number of guesses was emitted.
	GuessLimit,
	/// The maximum number of derivations was popped.
	PreTerminalLimit,
}

/// Summary of an enumeration session.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
	/// Guesses emitted during this session.
	pub guesses_emitted: u64,
	/// Guesses emitted since the very first session (includes resumed ones).
	pub total_guesses_emitted: u64,
	/// Derivations popped during this session.
	pub preterminals_popped: u64,
	/// Probability of the last emitted batch, the natural resume point.
	pub last_probability: Option<f64>,
	/// Largest frontier size reached.
	pub peak_frontier: usize,
	pub termination: Termination,
}

/// A derivation whose guesses were cut by the guess limit.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct PendingBatch {
	node: PreTerminal,
	/// Guesses of `node` already emitted.
	offset: u128,
}

/// Serializable state of an enumeration, to resume it later.
///
/// Holds the frontier, the partially emitted batch (if the guess limit
/// split one) and the counters.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Checkpoint {
	structure_count: usize,
	frontier: Vec<PreTerminal>,
	pending: Option<PendingBatch>,
	guesses_emitted: u64,
	last_probability: Option<f64>,
}

impl Checkpoint {
	/// Guesses emitted before this checkpoint (all sessions).
	pub fn guesses_emitted(&self) -> u64 {
		self.guesses_emitted
	}

	/// Probability of the last batch emitted before this checkpoint.
	pub fn last_probability(&self) -> Option<f64> {
		self.last_probability
	}

	/// Number of queued derivations.
	pub fn frontier_len(&self) -> usize {
		self.frontier.len()
	}

	/// Serializes the checkpoint with `postcard`.
	pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
		postcard::to_stdvec(self)
	}

	/// Deserializes a checkpoint written by [`Checkpoint::to_bytes`].
	///
	/// # Errors
	/// Returns `LoadError::MalformedGrammar` if the bytes cannot be decoded.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
		postcard::from_bytes(bytes).map_err(|e| LoadError::malformed("checkpoint", e.to_string()))
	}

	/// Writes the checkpoint to a file.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LoadError> {
		let path = path.as_ref();
		let bytes = self
			.to_bytes()
			.map_err(|e| LoadError::malformed("checkpoint", e.to_string()))?;
		std::fs::write(path, bytes).map_err(|e| LoadError::io(path, e))
	}

	/// Reads a checkpoint file.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
		let path = path.as_ref();
		let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
		Self::from_bytes(&bytes)
	}
}

/// The guesses of one popped derivation.
///
/// All guesses of a batch share the same probability.
#[derive(Debug)]
pub struct Batch<'g> {
	node: PreTerminal,
	guesses: Guesses<'g>,
	count: u64,
	/// Position of the first guess in the derivation's product.
	offset: u128,
}

impl<'g> Batch<'g> {
	pub fn probability(&self) -> f64 {
		self.node.probability()
	}

	/// Index of the base structure of the batch.
	pub fn structure(&self) -> usize {
		self.node.structure()
	}

	pub fn ranks(&self) -> &[usize] {
		self.node.ranks()
	}

	/// Number of guesses in this batch (after the guess limit).
	pub fn len(&self) -> u64 {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	/// Lazy sequence of the batch guesses.
	pub fn into_guesses(self) -> Guesses<'g> {
		self.guesses
	}
}

/// Owns the enumeration loop: pop, emit, expand, push.
///
/// # Responsibilities
/// - Keep the frontier, seeded with one root per base structure
/// - Apply the `TerminationPolicy` between pops
/// - Count emitted guesses and popped derivations
/// - Snapshot and restore its state (`Checkpoint`)
///
/// The probability threshold and the derivation limit are only checked
/// between pops, so a batch of equally likely guesses is never split by
/// them. The guess limit is exact: the batch reaching it is truncated
/// and the rest of it is kept for a resumed session.
#[derive(Debug)]
pub struct Driver<'g> {
	grammar: &'g GrammarStore,
	expander: Expander<'g>,
	emitter: GuessEmitter<'g>,
	frontier: Frontier,
	pending: Option<PendingBatch>,
	policy: TerminationPolicy,
	/// Guesses emitted by earlier sessions.
	prior_guesses: u64,
	guesses_emitted: u64,
	preterminals_popped: u64,
	last_probability: Option<f64>,
}

impl<'g> Driver<'g> {
	/// Creates a driver over every base structure of `grammar`.
	pub fn new(grammar: &'g GrammarStore, policy: TerminationPolicy) -> Self {
		Self::for_structures(grammar, 0..grammar.structure_count(), policy)
	}

	/// Creates a driver over a contiguous range of base structures.
	///
	/// Drivers over disjoint ranges can run on separate threads sharing
	/// the same grammar; each stream is sorted, the union is not.
	/// The range is clamped to the existing structures.
	pub fn for_structures(grammar: &'g GrammarStore, structures: Range<usize>, policy: TerminationPolicy) -> Self {
		let count = grammar.structure_count();
		let structures = structures.start.min(count)..structures.end.min(count);
		Self::with_frontier(grammar, Frontier::with_roots(grammar, structures), policy)
	}

	/// Restores a driver from a checkpoint.
	///
	/// The resumed driver continues the exact sequence the checkpointed
	/// one would have produced. Session counters (and so the limits of
	/// `policy`) start from zero.
	///
	/// # Errors
	/// Returns `LoadError::MalformedGrammar` if the checkpoint does not
	/// match `grammar`.
	pub fn resume(grammar: &'g GrammarStore, checkpoint: Checkpoint, policy: TerminationPolicy) -> Result<Self, LoadError> {
		if checkpoint.structure_count != grammar.structure_count() {
			return Err(LoadError::malformed(
				"checkpoint",
				format!(
					"made for {} base structures, grammar has {}",
					checkpoint.structure_count,
					grammar.structure_count()
				),
			));
		}
		for node in checkpoint.frontier.iter().chain(checkpoint.pending.as_ref().map(|p| &p.node)) {
			node.validate(grammar).map_err(|reason| LoadError::malformed("checkpoint", reason))?;
		}
		if let Some(pending) = &checkpoint.pending {
			if pending.offset >= GuessEmitter::new(grammar).guesses(&pending.node).size() {
				return Err(LoadError::malformed("checkpoint", "pending batch is already complete"));
			}
		}

		let mut driver = Self::with_frontier(grammar, Frontier::from_nodes(checkpoint.frontier), policy);
		driver.pending = checkpoint.pending;
		driver.prior_guesses = checkpoint.guesses_emitted;
		driver.last_probability = checkpoint.last_probability;
		Ok(driver)
	}

	fn with_frontier(grammar: &'g GrammarStore, frontier: Frontier, policy: TerminationPolicy) -> Self {
		Self {
			grammar,
			expander: Expander::new(grammar),
			emitter: GuessEmitter::new(grammar),
			frontier,
			pending: None,
			policy,
			prior_guesses: 0,
			guesses_emitted: 0,
			preterminals_popped: 0,
			last_probability: None,
		}
	}

	pub fn policy(&self) -> &TerminationPolicy {
		&self.policy
	}

	pub fn frontier(&self) -> &Frontier {
		&self.frontier
	}

	pub fn guesses_emitted(&self) -> u64 {
		self.guesses_emitted
	}

	/// Returns the reason to stop now, if any.
	fn check_termination(&self) -> Option<Termination> {
		if self.pending.is_none() && self.frontier.is_empty() {
			return Some(Termination::ExhaustedSpace);
		}
		if self.policy.maximum_guesses.is_some_and(|max| self.guesses_emitted >= max) {
			return Some(Termination::GuessLimit);
		}
		// The rest of a split batch ignores pop-level limits
		if self.pending.is_some() {
			return None;
		}
		if self.policy.maximum_preterminals.is_some_and(|max| self.preterminals_popped >= max) {
			return Some(Termination::PreTerminalLimit);
		}
		if let (Some(min), Some(top)) = (self.policy.minimum_probability, self.frontier.peek()) {
			if top.probability() < min {
				return Some(Termination::BelowMinimumProbability);
			}
		}
		None
	}

	/// Runs one step: pops the best derivation, pushes its children and
	/// returns its guesses.
	///
	/// # Errors
	/// Returns the termination reason once the enumeration is over.
	pub fn next_batch(&mut self) -> Result<Batch<'g>, Termination> {
		if let Some(termination) = self.check_termination() {
			return Err(termination);
		}

		let (node, offset) = match self.pending.take() {
			Some(pending) => (pending.node, pending.offset),
			None => {
				let Some(node) = self.frontier.pop() else {
					return Err(Termination::ExhaustedSpace);
				};
				self.preterminals_popped += 1;
				self.expander.expand_into(&node, &mut self.frontier);
				(node, 0)
			}
		};

		let mut guesses = self.emitter.guesses(&node);
		guesses.seek(offset);

		let available = guesses.remaining();
		let allowed = match self.policy.maximum_guesses {
			Some(max) => u128::from(max.saturating_sub(self.guesses_emitted)),
			None => u128::MAX,
		};
		let count = available.min(allowed);
		guesses.limit(count);

		if count < available {
			self.pending = Some(PendingBatch {
				node: node.clone(),
				offset: offset + count,
			});
		}

		let count = u64::try_from(count).unwrap_or(u64::MAX);
		self.guesses_emitted = self.guesses_emitted.saturating_add(count);
		self.last_probability = Some(node.probability());

		Ok(Batch {
			node,
			guesses,
			count,
			offset,
		})
	}

	/// Runs the loop to completion, writing one guess per line to `sink`.
	///
	/// If a write fails, the guesses of the current batch not yet written
	/// are kept as pending, so [`Driver::checkpoint`] still resumes right
	/// after the last written guess.
	///
	/// # Errors
	/// Returns `EmitError::Sink` if a write fails, with the number of
	/// guesses the sink accepted before the failure.
	pub fn run<W: Write>(&mut self, sink: &mut W) -> Result<Report, EmitError> {
		let termination = loop {
			let batch = match self.next_batch() {
				Ok(batch) => batch,
				Err(termination) => break termination,
			};

			let before = self.guesses_emitted - batch.count;
			let mut written = 0u64;
			for mut guess in batch.guesses {
				guess.push('\n');
				if let Err(source) = sink.write_all(guess.as_bytes()) {
					self.guesses_emitted = before + written;
					self.pending = Some(PendingBatch {
						node: batch.node,
						offset: batch.offset + u128::from(written),
					});
					return Err(EmitError::Sink {
						emitted: self.guesses_emitted,
						source,
					});
				}
				written += 1;
			}
		};

		if let Err(source) = sink.flush() {
			return Err(EmitError::Sink {
				emitted: self.guesses_emitted,
				source,
			});
		}

		let report = self.report(termination);
		debug!(
			"Enumeration stopped ({:?}): {} guesses, {} derivations, peak frontier {}",
			report.termination, report.guesses_emitted, report.preterminals_popped, report.peak_frontier
		);
		Ok(report)
	}

	/// Turns the driver into a flat iterator of `(guess, probability)`.
	pub fn into_guesses(self) -> OrderedGuesses<'g> {
		OrderedGuesses {
			driver: self,
			current: None,
			termination: None,
		}
	}

	/// Summary of the session so far.
	pub fn report(&self, termination: Termination) -> Report {
		Report {
			guesses_emitted: self.guesses_emitted,
			total_guesses_emitted: self.prior_guesses.saturating_add(self.guesses_emitted),
			preterminals_popped: self.preterminals_popped,
			last_probability: self.last_probability,
			peak_frontier: self.frontier.peak_len(),
			termination,
		}
	}

	/// Snapshot of the current state.
	pub fn checkpoint(&self) -> Checkpoint {
		Checkpoint {
			structure_count: self.grammar.structure_count(),
			frontier: self.frontier.snapshot(),
			pending: self.pending.clone(),
			guesses_emitted: self.prior_guesses.saturating_add(self.guesses_emitted),
			last_probability: self.last_probability,
		}
	}
}

/// Flat, ordered stream of `(guess, probability)` pairs.
///
/// Created by [`Driver::into_guesses`].
#[derive(Debug)]
pub struct OrderedGuesses<'g> {
	driver: Driver<'g>,
	current: Option<(f64, Guesses<'g>)>,
	termination: Option<Termination>,
}

impl<'g> OrderedGuesses<'g> {
	/// Why the stream ended, once it has.
	pub fn termination(&self) -> Option<Termination> {
		self.termination
	}

	/// Gives the driver back (e.g. to checkpoint it).
	///
	/// Guesses of the current batch not yet yielded are lost.
	pub fn into_driver(self) -> Driver<'g> {
		self.driver
	}
}

impl Iterator for OrderedGuesses<'_> {
	type Item = (String, f64);

	fn next(&mut self) -> Option<(String, f64)> {
		loop {
			if let Some((probability, guesses)) = &mut self.current {
				if let Some(guess) = guesses.next() {
					return Some((guess, *probability));
				}
			}
			if self.termination.is_some() {
				return None;
			}
			match self.driver.next_batch() {
				Ok(batch) => self.current = Some((batch.probability(), batch.into_guesses())),
				Err(termination) => {
					self.current = None;
					self.termination = Some(termination);
					return None;
				}
			}
		}
	}
}

impl FusedIterator for OrderedGuesses<'_> {}
