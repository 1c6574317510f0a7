use super::frontier::Frontier;
use super::preterminal::PreTerminal;
use crate::grammar::GrammarStore;

/// Produces the children of popped derivations.
///
/// For a node with ranks `r` and pivot `k`, each slot `i >= k` whose
/// table has a rank `r[i] + 1` yields one child: `r` with slot `i`
/// advanced by one, and pivot `i`.
///
/// Restricting descendants to slots at or after the last advanced one
/// means every rank vector is reached by exactly one path (increments
/// applied in non-decreasing slot order), so the lattice of a structure
/// is enumerated with no duplicate and no gap.
///
/// A child is never more probable than its parent, which is what lets
/// the frontier yield a globally sorted stream.
#[derive(Clone, Copy, Debug)]
pub struct Expander<'g> {
	grammar: &'g GrammarStore,
}

impl<'g> Expander<'g> {
	pub fn new(grammar: &'g GrammarStore) -> Self {
		Self { grammar }
	}

	/// Returns the children of `parent`, in slot order.
	///
	/// Single-step increments only: deeper nodes are reached by popping
	/// the children later.
	pub fn children(&self, parent: &PreTerminal) -> Vec<PreTerminal> {
		let structure = parent.structure();
		let ranks = parent.ranks();

		(parent.pivot()..ranks.len())
			.filter_map(|slot| {
				let table = self.grammar.slot_table(structure, slot);
				let rank = ranks[slot];
				let next = table.get(rank + 1)?;
				let current = table.buckets()[rank].probability();

				// Swap one factor of the cached product
				let probability = if current > 0.0 {
					(parent.probability() / current * next.probability()).min(parent.probability())
				} else {
					// next <= current == 0
					0.0
				};
				Some(parent.advance(slot, probability))
			})
			.collect()
	}

	/// Pushes the children of `parent` into `frontier`.
	///
	/// Returns the number of children pushed.
	pub fn expand_into(&self, parent: &PreTerminal, frontier: &mut Frontier) -> usize {
		let children = self.children(parent);
		let count = children.len();
		frontier.extend(children);
		count
	}
}
