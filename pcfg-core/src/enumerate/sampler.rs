use rand::Rng;

use crate::grammar::GrammarStore;

/// A guess drawn at random from the grammar.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
	pub guess: String,
	/// Probability of the derivation the guess comes from.
	pub probability: f64,
	/// Index of the base structure used.
	pub structure: usize,
}

/// Random-walk generation: draws guesses with the probability the
/// grammar assigns them, instead of in sorted order.
///
/// Each draw picks:
/// - a base structure, weighted by its probability
/// - for each slot, a rank bucket, weighted by `probability * size`
///   (the chance of any string of the bucket)
/// - a string of that bucket, uniformly
///
/// Draws are independent, so the same guess can come out twice.
#[derive(Clone, Debug)]
pub struct Sampler<'g> {
	grammar: &'g GrammarStore,
	/// Sum of the structure probabilities.
	total: f64,
}

impl<'g> Sampler<'g> {
	pub fn new(grammar: &'g GrammarStore) -> Self {
		let total = grammar.structures().map(|s| s.probability()).sum();
		Self { grammar, total }
	}

	/// Draws one guess using the thread-local generator.
	///
	/// Returns `None` if no structure has a positive probability.
	pub fn sample(&self) -> Option<Sample> {
		self.sample_with(&mut rand::rng())
	}

	/// Draws one guess using `rng`.
	///
	/// Returns `None` if no structure (or no bucket of a chosen slot)
	/// has a positive weight.
	pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Sample> {
		let structure = pick(rng, self.grammar.structures().map(|s| s.probability()), self.total)?;
		let base = self.grammar.structure(structure);

		let mut guess = String::new();
		let mut probability = base.probability();
		for slot in 0..base.slot_count() {
			let buckets = self.grammar.slot_table(structure, slot).buckets();
			let weights = buckets.iter().map(|b| b.probability() * b.len() as f64);
			let total: f64 = weights.clone().sum();
			let bucket = &buckets[pick(rng, weights, total)?];

			let values = bucket.values();
			guess.push_str(&values[rng.random_range(0..values.len())]);
			probability *= bucket.probability();
		}

		Some(Sample {
			guess,
			probability,
			structure,
		})
	}
}

/// Weighted choice by cumulative subtraction.
///
/// Returns `None` if `total` is not positive.
fn pick<R, I>(rng: &mut R, weights: I, total: f64) -> Option<usize>
where
	R: Rng + ?Sized,
	I: Iterator<Item = f64>,
{
	if !(total.is_finite() && total > 0.0) {
		return None;
	}

	let mut r = rng.random_range(0.0..total);
	let mut fallback = None;
	for (i, weight) in weights.enumerate() {
		if weight <= 0.0 {
			continue;
		}
		if r < weight {
			return Some(i);
		}
		r -= weight;
		fallback = Some(i);
	}

	// Rounding can leave r just above the last weight
	fallback
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;
	use crate::enumerate::{Driver, TerminationPolicy};
	use crate::testing::grammar;

	#[test]
	fn samples_come_from_the_grammar() {
		let store = grammar(
			&[("A1D1", 0.6), ("D1", 0.4)],
			&[
				("A", 1, &[(0.5, &["a"]), (0.3, &["b", "c"]), (0.2, &["d"])]),
				("D", 1, &[(0.7, &["1"]), (0.2, &["2"]), (0.1, &["3", "4"])]),
			],
		);
		let expected: HashMap<String, f64> = Driver::new(&store, TerminationPolicy::new()).into_guesses().collect();

		let sampler = Sampler::new(&store);
		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..500 {
			let sample = sampler.sample_with(&mut rng).unwrap();
			let probability = expected[&sample.guess];
			assert!((probability - sample.probability).abs() < 1e-12);
		}
	}

	#[test]
	fn zero_probability_structures_are_never_drawn() {
		let store = grammar(
			&[("A1", 0.0), ("D1", 1.0)],
			&[("A", 1, &[(1.0, &["a"])]), ("D", 1, &[(1.0, &["1"])])],
		);
		let sampler = Sampler::new(&store);
		let mut rng = StdRng::seed_from_u64(1);
		for _ in 0..100 {
			assert_eq!(sampler.sample_with(&mut rng).unwrap().guess, "1");
		}
	}

	#[test]
	fn nothing_to_draw() {
		let store = grammar(&[("A1", 0.0)], &[("A", 1, &[(1.0, &["a"])])]);
		assert_eq!(Sampler::new(&store).sample(), None);
	}

	#[test]
	fn frequent_structures_are_drawn_more_often() {
		let store = grammar(
			&[("A1", 0.9), ("D1", 0.1)],
			&[("A", 1, &[(1.0, &["a"])]), ("D", 1, &[(1.0, &["1"])])],
		);
		let sampler = Sampler::new(&store);
		let mut rng = StdRng::seed_from_u64(42);
		let letters = (0..1000)
			.filter(|_| sampler.sample_with(&mut rng).unwrap().structure == 0)
			.count();
		assert!(letters > 800, "got {} letter samples out of 1000", letters);
	}
}
