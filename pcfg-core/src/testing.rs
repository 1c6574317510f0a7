//! Helpers to build small grammars in tests.

use crate::grammar::{BaseStructure, BucketTable, GrammarStore, RankBucket, TerminalKey};

/// A terminal table: class, length, `(probability, strings)` buckets.
pub(crate) type TableSpec<'a> = (&'a str, usize, &'a [(f64, &'a [&'a str])]);

/// Builds a validated store from structure texts and table specs.
///
/// # Panics
/// Panics if the description is not a valid grammar.
pub(crate) fn grammar(structures: &[(&str, f64)], tables: &[TableSpec<'_>]) -> GrammarStore {
	let structures = structures
		.iter()
		.map(|(text, p)| BaseStructure::parse(text, *p).unwrap())
		.collect();
	let tables = tables.iter().map(|(class, length, buckets)| {
		let buckets = buckets
			.iter()
			.map(|(p, values)| RankBucket::new(*p, values.iter().map(|v| v.to_string()).collect()))
			.collect();
		(TerminalKey::new(class, *length), BucketTable::new(buckets))
	});
	GrammarStore::new(structures, tables).unwrap()
}
