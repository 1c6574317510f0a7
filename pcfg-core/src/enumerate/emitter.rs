use std::iter::FusedIterator;

use super::preterminal::PreTerminal;
use crate::grammar::GrammarStore;

/// Turns derivations into literal guesses.
#[derive(Clone, Copy, Debug)]
pub struct GuessEmitter<'g> {
	grammar: &'g GrammarStore,
}

impl<'g> GuessEmitter<'g> {
	pub fn new(grammar: &'g GrammarStore) -> Self {
		Self { grammar }
	}

	/// Returns the guesses represented by `node`.
	pub fn guesses(&self, node: &PreTerminal) -> Guesses<'g> {
		Guesses::new(self.grammar, node)
	}
}

/// Lazy cross product of the buckets chosen by one derivation.
///
/// Every guess is the concatenation, in slot order, of one string per
/// slot. The product is walked like an odometer (last slot turns
/// fastest), so only one index per slot is held in memory however
/// large the product is.
///
/// All guesses share the derivation's probability. The sequence is
/// finite, exhaustive and duplicate-free as long as each bucket holds
/// distinct strings; [`Guesses::reset`] restarts it.
#[derive(Clone, Debug)]
pub struct Guesses<'g> {
	/// Strings of the chosen bucket, per slot.
	slots: Vec<&'g [String]>,
	/// Current index per slot.
	odometer: Vec<usize>,
	/// Guesses not yet yielded.
	remaining: u128,
	/// Total number of guesses.
	size: u128,
}

impl<'g> Guesses<'g> {
	fn new(grammar: &'g GrammarStore, node: &PreTerminal) -> Self {
		let slots: Vec<&'g [String]> = node
			.ranks()
			.iter()
			.enumerate()
			.map(|(slot, &rank)| grammar.slot_table(node.structure(), slot).buckets()[rank].values())
			.collect();
		let size = slots
			.iter()
			.map(|values| values.len() as u128)
			.fold(1u128, u128::saturating_mul);

		Self {
			odometer: vec![0; slots.len()],
			slots,
			remaining: size,
			size,
		}
	}

	/// Number of guesses of the whole product (saturating).
	pub fn size(&self) -> u128 {
		self.size
	}

	/// Guesses not yet yielded (saturating).
	pub fn remaining(&self) -> u128 {
		self.remaining
	}

	/// Restarts the sequence from its first guess.
	pub fn reset(&mut self) {
		self.odometer.iter_mut().for_each(|i| *i = 0);
		self.remaining = self.size;
	}

	/// Positions the sequence so the next guess is the `position`-th one
	/// (0-based) of the product.
	pub fn seek(&mut self, position: u128) {
		let position = position.min(self.size);
		let mut rest = position;
		for slot in (0..self.slots.len()).rev() {
			let radix = self.slots[slot].len() as u128;
			self.odometer[slot] = (rest % radix) as usize;
			rest /= radix;
		}
		self.remaining = self.size - position;
	}

	/// Stops the sequence after at most `count` more guesses.
	pub fn limit(&mut self, count: u128) {
		self.remaining = self.remaining.min(count);
	}

	/// Moves the odometer one step, last slot first.
	fn advance(&mut self) {
		for slot in (0..self.slots.len()).rev() {
			self.odometer[slot] += 1;
			if self.odometer[slot] < self.slots[slot].len() {
				return;
			}
			self.odometer[slot] = 0;
		}
	}
}

impl Iterator for Guesses<'_> {
	type Item = String;

	fn next(&mut self) -> Option<String> {
		if self.remaining == 0 {
			return None;
		}

		let mut guess = String::new();
		for (values, &i) in self.slots.iter().zip(&self.odometer) {
			guess.push_str(&values[i]);
		}

		self.remaining -= 1;
		self.advance();
		Some(guess)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		match usize::try_from(self.remaining) {
			Ok(n) => (n, Some(n)),
			Err(_) => (usize::MAX, None),
		}
	}
}

impl FusedIterator for Guesses<'_> {}
