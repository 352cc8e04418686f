//! Customer identities and custodied amounts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Identity of the caller on whose behalf an operation runs.
///
/// The ledger keys exactly one order slot by this value. How the identity is
/// established (a signed request, a header, a wallet address) is up to the
/// host process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for CustomerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for CustomerId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for CustomerId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// An amount of value in the smallest currency unit.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
	pub const ZERO: Amount = Amount(0);

	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	pub const fn value(&self) -> u64 {
		self.0
	}

	pub const fn is_zero(&self) -> bool {
		self.0 == 0
	}

	pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
		self.0.checked_add(rhs.0).map(Amount)
	}

	pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
		self.0.checked_sub(rhs.0).map(Amount)
	}
}

impl From<u64> for Amount {
	fn from(value: u64) -> Self {
		Self(value)
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Sum for Amount {
	fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
		iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
	}
}
