use serde::{Deserialize, Serialize};

/// A set of literal strings sharing exactly one probability.
///
/// Conceptually, this is one "rank" of a terminal pool: every string
/// of the bucket is equally likely, and buckets of the same table are
/// ordered from most to least likely.
///
/// ## Invariants
/// - `values` is never empty
/// - `probability` is finite and within `[0.0, 1.0]`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RankBucket {
	/// Probability of each individual string of the bucket.
	probability: f64,
	/// Literal strings, in file order.
	values: Vec<String>,
}

impl RankBucket {
	pub fn new(probability: f64, values: Vec<String>) -> Self {
		Self { probability, values }
	}

	pub fn probability(&self) -> f64 {
		self.probability
	}

	pub fn values(&self) -> &[String] {
		&self.values
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// Rank-ordered buckets of one (terminal class, length) pair.
///
/// Rank 0 is the most probable bucket. A rank index is valid iff it
/// is lower than [`BucketTable::len`].
///
/// ## Invariants (checked by [`BucketTable::validate`])
/// - at least one bucket
/// - probabilities are non-increasing by rank index
/// - every bucket is valid (see [`RankBucket`])
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BucketTable {
	buckets: Vec<RankBucket>,
}

impl BucketTable {
	/// Creates a table from already grouped buckets.
	///
	/// No check is performed here; the grammar store validates every
	/// table it is built from.
	pub fn new(buckets: Vec<RankBucket>) -> Self {
		Self { buckets }
	}

	/// Appends one `(value, probability)` entry read from a terminal file.
	///
	/// - If `probability` equals the last bucket's, the value joins that bucket.
	/// - If it is lower, a new bucket is opened.
	///
	/// # Errors
	/// Returns an error if `probability` is higher than the last bucket's
	/// (the input is not sorted descending).
	pub fn push_entry(&mut self, value: String, probability: f64) -> Result<(), String> {
		match self.buckets.last_mut() {
			Some(last) if last.probability == probability => {
				last.values.push(value);
			}
			Some(last) if last.probability < probability => {
				return Err(format!(
					"probability {} follows {}, entries must be sorted by descending probability",
					probability, last.probability
				));
			}
			_ => self.buckets.push(RankBucket::new(probability, vec![value])),
		}
		Ok(())
	}

	/// Returns the bucket at `rank`, if it exists.
	pub fn get(&self, rank: usize) -> Option<&RankBucket> {
		self.buckets.get(rank)
	}

	pub fn buckets(&self) -> &[RankBucket] {
		&self.buckets
	}

	/// Number of ranks.
	pub fn len(&self) -> usize {
		self.buckets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}

	/// Number of literal strings over every rank.
	pub fn value_count(&self) -> usize {
		self.buckets.iter().map(RankBucket::len).sum()
	}

	/// Checks the table invariants.
	///
	/// # Errors
	/// Returns a description of the first violated invariant.
	pub fn validate(&self) -> Result<(), String> {
		if self.buckets.is_empty() {
			return Err("table has no buckets".to_owned());
		}

		let mut previous = f64::INFINITY;
		for (rank, bucket) in self.buckets.iter().enumerate() {
			if !bucket.probability.is_finite() || !(0.0..=1.0).contains(&bucket.probability) {
				return Err(format!("rank {} has invalid probability {}", rank, bucket.probability));
			}
			if bucket.values.is_empty() {
				return Err(format!("rank {} has no values", rank));
			}
			if bucket.probability > previous {
				return Err(format!(
					"rank {} probability {} is higher than rank {} probability {}",
					rank, bucket.probability, rank - 1, previous
				));
			}
			previous = bucket.probability;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn equal_probabilities_share_a_bucket() {
		let mut table = BucketTable::default();
		table.push_entry("cat".to_owned(), 0.6).unwrap();
		table.push_entry("dog".to_owned(), 0.4).unwrap();
		table.push_entry("fox".to_owned(), 0.4).unwrap();

		assert_eq!(table.len(), 2);
		assert_eq!(table.value_count(), 3);
		assert_eq!(table.get(1).unwrap().values(), &["dog".to_owned(), "fox".to_owned()]);
		assert!(table.get(2).is_none());
		assert!(table.validate().is_ok());
	}

	#[test]
	fn increasing_probability_is_rejected() {
		let mut table = BucketTable::default();
		table.push_entry("a".to_owned(), 0.2).unwrap();
		assert!(table.push_entry("b".to_owned(), 0.3).is_err());
		// The rejected entry is not stored
		assert_eq!(table.value_count(), 1);
	}

	#[test]
	fn validate_catches_each_invariant() {
		assert!(BucketTable::default().validate().is_err());

		let unsorted = BucketTable::new(vec![
			RankBucket::new(0.1, vec!["a".to_owned()]),
			RankBucket::new(0.5, vec!["b".to_owned()]),
		]);
		assert!(unsorted.validate().is_err());

		let empty_bucket = BucketTable::new(vec![RankBucket::new(0.1, vec![])]);
		assert!(empty_bucket.validate().is_err());

		let out_of_range = BucketTable::new(vec![RankBucket::new(1.5, vec!["a".to_owned()])]);
		assert!(out_of_range.validate().is_err());

		let nan = BucketTable::new(vec![RankBucket::new(f64::NAN, vec!["a".to_owned()])]);
		assert!(nan.validate().is_err());
	}

	#[test]
	fn equal_adjacent_buckets_are_accepted() {
		let table = BucketTable::new(vec![
			RankBucket::new(0.5, vec!["a".to_owned()]),
			RankBucket::new(0.5, vec!["b".to_owned()]),
		]);
		assert!(table.validate().is_ok());
	}
}
