use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::grammar::GrammarStore;

/// One point of the derivation space.
///
/// A `PreTerminal` is a base structure with one rank chosen per slot,
/// before literal strings are substituted. It represents every guess
/// of the cross product of the chosen buckets.
///
/// ## Invariants
/// - `ranks.len()` is the slot count of the structure
/// - every rank is valid for its slot's table
/// - `probability` is the structure probability times the chosen
///   buckets' probabilities
/// - `0 <= pivot <= ranks.len()`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PreTerminal {
	/// Index of the base structure in the grammar.
	structure: usize,
	/// Chosen rank per slot.
	ranks: Vec<usize>,
	/// Cached probability (never recomputed from scratch once set).
	probability: f64,
	/// Lowest slot the expander may advance for this node.
	pivot: usize,
}

impl PreTerminal {
	/// Creates the root derivation of a structure: every rank at 0, pivot 0.
	///
	/// # Panics
	/// Panics if `structure` is out of range.
	pub fn root(grammar: &GrammarStore, structure: usize) -> Self {
		let ranks = vec![0; grammar.structure(structure).slot_count()];
		let probability = Self::compute_probability(grammar, structure, &ranks);
		Self {
			structure,
			ranks,
			probability,
			pivot: 0,
		}
	}

	/// Creates a child equal to `self` except for `slot`, advanced by one rank.
	///
	/// The child's pivot is `slot`: its own descendants may only advance
	/// slots at or after it.
	pub(crate) fn advance(&self, slot: usize, probability: f64) -> Self {
		let mut ranks = self.ranks.clone();
		ranks[slot] += 1;
		Self {
			structure: self.structure,
			ranks,
			probability,
			pivot: slot,
		}
	}

	/// Full product: structure probability times every chosen bucket's.
	pub fn compute_probability(grammar: &GrammarStore, structure: usize, ranks: &[usize]) -> f64 {
		ranks
			.iter()
			.enumerate()
			.map(|(slot, &rank)| grammar.slot_table(structure, slot).buckets()[rank].probability())
			.fold(grammar.structure(structure).probability(), |acc, p| acc * p)
	}

	pub fn structure(&self) -> usize {
		self.structure
	}

	pub fn ranks(&self) -> &[usize] {
		&self.ranks
	}

	pub fn probability(&self) -> f64 {
		self.probability
	}

	pub fn pivot(&self) -> usize {
		self.pivot
	}

	/// Checks that this node is consistent with `grammar`.
	///
	/// Used when restoring nodes that did not come from the expander.
	///
	/// # Errors
	/// Returns a description of the first inconsistency.
	pub(crate) fn validate(&self, grammar: &GrammarStore) -> Result<(), String> {
		if self.structure >= grammar.structure_count() {
			return Err(format!("structure #{} does not exist", self.structure));
		}
		let slots = grammar.structure(self.structure).slot_count();
		if self.ranks.len() != slots {
			return Err(format!(
				"structure #{} has {} slots, got {} ranks",
				self.structure,
				slots,
				self.ranks.len()
			));
		}
		for (slot, &rank) in self.ranks.iter().enumerate() {
			if rank >= grammar.slot_table(self.structure, slot).len() {
				return Err(format!("structure #{} slot {}: rank {} does not exist", self.structure, slot, rank));
			}
		}
		if self.pivot > slots {
			return Err(format!("pivot {} is past the last slot", self.pivot));
		}
		if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
			return Err(format!("invalid probability {}", self.probability));
		}
		Ok(())
	}
}

/// Priority order: higher probability first, then lower structure index,
/// then lexicographically smaller rank vector.
///
/// "Greater" means "popped first" so the type can go straight into a
/// max-heap.
impl Ord for PreTerminal {
	fn cmp(&self, other: &Self) -> Ordering {
		self.probability
			.total_cmp(&other.probability)
			.then_with(|| other.structure.cmp(&self.structure))
			.then_with(|| other.ranks.cmp(&self.ranks))
	}
}

impl PartialOrd for PreTerminal {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for PreTerminal {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for PreTerminal {}
