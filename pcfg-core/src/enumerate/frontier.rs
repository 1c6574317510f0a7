use std::collections::BinaryHeap;
use std::ops::Range;

use super::preterminal::PreTerminal;
use crate::grammar::GrammarStore;

/// Max-priority queue of not-yet-expanded derivations.
///
/// Pops follow the [`PreTerminal`] order: highest probability first,
/// ties broken deterministically. Memory is bounded by the number of
/// queued nodes, never by the number of guesses they stand for.
#[derive(Clone, Debug, Default)]
pub struct Frontier {
	heap: BinaryHeap<PreTerminal>,
	/// Largest size reached, for reporting.
	peak: usize,
}

impl Frontier {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a frontier holding the root of every structure in `structures`.
	///
	/// # Panics
	/// Panics if the range goes past the last structure.
	pub fn with_roots(grammar: &GrammarStore, structures: Range<usize>) -> Self {
		let mut frontier = Self::new();
		for structure in structures {
			frontier.push(PreTerminal::root(grammar, structure));
		}
		frontier
	}

	/// Creates a frontier from previously queued nodes.
	pub fn from_nodes(nodes: Vec<PreTerminal>) -> Self {
		let peak = nodes.len();
		Self {
			heap: BinaryHeap::from(nodes),
			peak,
		}
	}

	pub fn push(&mut self, node: PreTerminal) {
		self.heap.push(node);
		self.peak = self.peak.max(self.heap.len());
	}

	/// Removes and returns the highest-priority node.
	pub fn pop(&mut self) -> Option<PreTerminal> {
		self.heap.pop()
	}

	/// Returns the highest-priority node without removing it.
	pub fn peek(&self) -> Option<&PreTerminal> {
		self.heap.peek()
	}

	pub fn len(&self) -> usize {
		self.heap.len()
	}

	pub fn is_empty(&self) -> bool {
		self.heap.is_empty()
	}

	/// Largest number of nodes queued at once.
	pub fn peak_len(&self) -> usize {
		self.peak
	}

	/// Returns a copy of the queued nodes in pop order.
	pub fn snapshot(&self) -> Vec<PreTerminal> {
		let mut nodes = self.heap.clone().into_vec();
		nodes.sort_by(|a, b| b.cmp(a));
		nodes
	}
}

impl Extend<PreTerminal> for Frontier {
	fn extend<I: IntoIterator<Item = PreTerminal>>(&mut self, iter: I) {
		for node in iter {
			self.push(node);
		}
	}
}
