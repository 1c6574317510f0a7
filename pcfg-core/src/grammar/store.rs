use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::bucket::BucketTable;
use super::structure::{BaseStructure, TerminalKey};
use crate::error::LoadError;

/// Immutable in-memory representation of a trained grammar.
///
/// This struct holds:
/// - `structures`: the base structures, in load order (their index is their identity).
/// - `tables`: one rank-ordered bucket table per (class, length) pair.
/// - `slot_tables`: for every structure slot, the index of its table,
///   resolved once at construction so the enumeration never hashes.
///
/// ## Invariants
/// - every slot of every structure resolves to a table
/// - every table is valid (see [`BucketTable::validate`])
/// - every structure has at least one slot and a probability in `[0.0, 1.0]`
///
/// No mutation is possible after construction, so a store can be shared
/// between threads without synchronization.
#[derive(Clone, Debug)]
pub struct GrammarStore {
	structures: Vec<BaseStructure>,
	keys: Vec<TerminalKey>,
	tables: Vec<BucketTable>,
	index: HashMap<TerminalKey, usize>,
	slot_tables: Vec<Vec<usize>>,
}

/// Serialized form of a store, see [`GrammarStore::to_bytes`].
#[derive(Serialize)]
struct GrammarPartsRef<'a> {
	structures: &'a [BaseStructure],
	tables: Vec<(&'a TerminalKey, &'a BucketTable)>,
}

#[derive(Deserialize)]
struct GrammarParts {
	structures: Vec<BaseStructure>,
	tables: Vec<(TerminalKey, BucketTable)>,
}

impl GrammarStore {
	/// Builds a store from base structures and bucket tables.
	///
	/// Tables are kept sorted by key so two stores built from the same
	/// data are identical regardless of the input order.
	///
	/// # Errors
	/// Returns `LoadError::MalformedGrammar` if:
	/// - a table is defined twice or breaks a table invariant
	/// - a structure has no slot or an invalid probability
	/// - a structure references a (class, length) pair without a table
	pub fn new<I>(structures: Vec<BaseStructure>, tables: I) -> Result<Self, LoadError>
	where
		I: IntoIterator<Item = (TerminalKey, BucketTable)>,
	{
		let mut entries: Vec<(TerminalKey, BucketTable)> = tables.into_iter().collect();
		entries.sort_by(|a, b| a.0.cmp(&b.0));

		let mut keys = Vec::with_capacity(entries.len());
		let mut bucket_tables = Vec::with_capacity(entries.len());
		let mut index = HashMap::with_capacity(entries.len());

		for (key, table) in entries {
			table
				.validate()
				.map_err(|reason| LoadError::malformed(format!("table {}", key), reason))?;
			if index.insert(key.clone(), keys.len()).is_some() {
				return Err(LoadError::malformed(format!("table {}", key), "defined twice"));
			}
			keys.push(key);
			bucket_tables.push(table);
		}

		let mut slot_tables = Vec::with_capacity(structures.len());
		for (i, structure) in structures.iter().enumerate() {
			let location = || format!("structure #{} {}", i, structure);

			if structure.slot_count() == 0 {
				return Err(LoadError::malformed(location(), "structure has no slots"));
			}
			let probability = structure.probability();
			if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
				return Err(LoadError::malformed(location(), format!("invalid probability {}", probability)));
			}

			let mut resolved = Vec::with_capacity(structure.slot_count());
			for slot in structure.slots() {
				match index.get(slot) {
					Some(&table) => resolved.push(table),
					None => {
						return Err(LoadError::malformed(location(), format!("no terminal table for {}", slot)));
					}
				}
			}
			slot_tables.push(resolved);
		}

		Ok(Self {
			structures,
			keys,
			tables: bucket_tables,
			index,
			slot_tables,
		})
	}

	/// Number of base structures.
	pub fn structure_count(&self) -> usize {
		self.structures.len()
	}

	/// Returns the base structure at index `i`.
	///
	/// # Panics
	/// Panics if `i >= structure_count()`.
	pub fn structure(&self, i: usize) -> &BaseStructure {
		&self.structures[i]
	}

	/// Iterates over the base structures in index order.
	pub fn structures(&self) -> impl Iterator<Item = &BaseStructure> {
		self.structures.iter()
	}

	/// Returns the rank-ordered buckets of a (class, length) pair.
	pub fn bucket_table(&self, class: &str, length: usize) -> Option<&BucketTable> {
		let i = *self.index.get(&TerminalKey::new(class, length))?;
		Some(&self.tables[i])
	}

	/// Iterates over every (key, table) pair, sorted by key.
	pub fn tables(&self) -> impl Iterator<Item = (&TerminalKey, &BucketTable)> {
		self.keys.iter().zip(self.tables.iter())
	}

	/// Returns the table of slot `slot` of structure `structure`.
	///
	/// This is the lookup used by the enumeration engine: the index was
	/// resolved at construction.
	///
	/// # Panics
	/// Panics if either index is out of range.
	pub fn slot_table(&self, structure: usize, slot: usize) -> &BucketTable {
		&self.tables[self.slot_tables[structure][slot]]
	}

	/// Number of literal guesses a structure can produce.
	///
	/// Saturates at `u128::MAX`.
	pub fn structure_space_size(&self, structure: usize) -> u128 {
		self.slot_tables[structure]
			.iter()
			.map(|&t| self.tables[t].value_count() as u128)
			.fold(1u128, u128::saturating_mul)
	}

	/// Total number of literal guesses of the grammar.
	///
	/// Saturates at `u128::MAX`.
	pub fn guess_space_size(&self) -> u128 {
		(0..self.structures.len())
			.map(|s| self.structure_space_size(s))
			.fold(0u128, u128::saturating_add)
	}

	/// Serializes the store with `postcard`.
	pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
		let parts = GrammarPartsRef {
			structures: &self.structures,
			tables: self.keys.iter().zip(self.tables.iter()).collect(),
		};
		postcard::to_stdvec(&parts)
	}

	/// Deserializes a store written by [`GrammarStore::to_bytes`].
	///
	/// The decoded data goes through [`GrammarStore::new`], so every
	/// invariant is checked again.
	///
	/// # Errors
	/// Returns `LoadError::MalformedGrammar` if the bytes cannot be decoded
	/// or describe an invalid grammar.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
		let parts: GrammarParts = postcard::from_bytes(bytes)
			.map_err(|e| LoadError::malformed("compiled grammar", e.to_string()))?;
		Self::new(parts.structures, parts.tables)
	}
}
