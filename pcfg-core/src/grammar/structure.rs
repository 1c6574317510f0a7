use std::fmt;

use serde::{Deserialize, Serialize};

/// A (terminal class, length) pair, e.g. `A4` for four letters.
///
/// Class names are short upper-case identifiers (`A`, `D`, `O`, `K`, ...).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalKey {
	pub class: String,
	pub length: usize,
}

impl TerminalKey {
	pub fn new(class: &str, length: usize) -> Self {
		Self { class: class.to_owned(), length }
	}
}

impl fmt::Display for TerminalKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{}", self.class, self.length)
	}
}

/// A template of slots with an associated prior probability.
///
/// `A4D2` is four letters followed by two digits. The probability is the
/// structure prior computed by the trainer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BaseStructure {
	slots: Vec<TerminalKey>,
	probability: f64,
}

impl BaseStructure {
	pub fn new(slots: Vec<TerminalKey>, probability: f64) -> Self {
		Self { slots, probability }
	}

	/// Parses the textual form of a structure (`A4D2O1`).
	///
	/// Each slot is a run of upper-case letters followed by a run of digits.
	///
	/// # Errors
	/// Returns an error if the text is empty, holds a character other than
	/// an ASCII letter or digit, misses a length, or has a zero length.
	pub fn parse(text: &str, probability: f64) -> Result<Self, String> {
		let mut slots = Vec::new();
		let mut chars = text.chars().peekable();

		while chars.peek().is_some() {
			let mut class = String::new();
			while let Some(c) = chars.next_if(char::is_ascii_uppercase) {
				class.push(c);
			}
			if class.is_empty() {
				return Err(format!("structure `{}`: expected a class name", text));
			}

			let mut digits = String::new();
			while let Some(c) = chars.next_if(char::is_ascii_digit) {
				digits.push(c);
			}
			let length: usize = digits
				.parse()
				.map_err(|_| format!("structure `{}`: class {} has no length", text, class))?;
			if length == 0 {
				return Err(format!("structure `{}`: class {} has a zero length", text, class));
			}

			slots.push(TerminalKey { class, length });
		}

		if slots.is_empty() {
			return Err("empty structure".to_owned());
		}
		Ok(Self { slots, probability })
	}

	pub fn slots(&self) -> &[TerminalKey] {
		&self.slots
	}

	pub fn slot_count(&self) -> usize {
		self.slots.len()
	}

	pub fn probability(&self) -> f64 {
		self.probability
	}
}

impl fmt::Display for BaseStructure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for slot in &self.slots {
			write!(f, "{}", slot)?;
		}
		Ok(())
	}
}
