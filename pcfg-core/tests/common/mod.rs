// Shared helpers for the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use pcfg_core::grammar::{BaseStructure, BucketTable, GrammarStore, RankBucket, TerminalKey};

/// One terminal class directory: class name, directory, `(file name, contents)`.
pub type ClassFiles<'a> = (&'a str, &'a str, &'a [(&'a str, &'a str)]);

/// Writes a ruleset directory.
///
/// - `config.ini` with the given encoding, a `[START]` section and one
///   `[BASE_<class>]` section per class
/// - `Grammar/grammar.txt` with `structures`
/// - one file per terminal
pub fn write_ruleset(dir: &Path, encoding: &str, structures: &str, classes: &[ClassFiles<'_>]) {
	let mut config = format!(
		"[TRAINING_DATASET_DETAILS]\nencoding = {}\n\n[START]\nname = Base Structure\ndirectory = Grammar\nfilenames = [\"grammar.txt\"]\nis_terminal = False\n",
		encoding
	);

	fs::create_dir_all(dir.join("Grammar")).unwrap();
	fs::write(dir.join("Grammar").join("grammar.txt"), structures).unwrap();

	for (class, directory, files) in classes {
		let names: Vec<String> = files.iter().map(|(name, _)| format!("\"{}\"", name)).collect();
		config.push_str(&format!(
			"\n[BASE_{}]\nname = {}\ndirectory = {}\nfilenames = [{}]\nis_terminal = True\n",
			class,
			class,
			directory,
			names.join(", ")
		));

		fs::create_dir_all(dir.join(directory)).unwrap();
		for (name, contents) in files.iter() {
			fs::write(dir.join(directory).join(name), contents).unwrap();
		}
	}

	fs::write(dir.join("config.ini"), config).unwrap();
}

/// Builds a store from owned table descriptions.
pub fn store(structures: &[(&str, f64)], tables: Vec<(&str, usize, Vec<(f64, Vec<String>)>)>) -> GrammarStore {
	let structures = structures
		.iter()
		.map(|(text, p)| BaseStructure::parse(text, *p).unwrap())
		.collect();
	let tables = tables.into_iter().map(|(class, length, buckets)| {
		let buckets = buckets.into_iter().map(|(p, values)| RankBucket::new(p, values)).collect();
		(TerminalKey::new(class, length), BucketTable::new(buckets))
	});
	GrammarStore::new(structures, tables).unwrap()
}

/// Every guess of the grammar with its probability, by plain nested loops.
pub fn brute_force(store: &GrammarStore) -> Vec<(String, f64)> {
	let mut all = Vec::new();

	for s in 0..store.structure_count() {
		let base = store.structure(s);
		let mut partial = vec![(String::new(), base.probability())];

		for slot in 0..base.slot_count() {
			let mut next = Vec::new();
			for (guess, probability) in &partial {
				for bucket in store.slot_table(s, slot).buckets() {
					for value in bucket.values() {
						next.push((format!("{}{}", guess, value), probability * bucket.probability()));
					}
				}
			}
			partial = next;
		}

		all.extend(partial);
	}

	all
}
