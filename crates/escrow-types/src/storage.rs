//! Storage-related types.

use std::fmt;

/// Namespaces under which ledger data is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// One order slot per customer.
	OrderSlots,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::OrderSlots => "order_slots",
		}
	}
}

impl fmt::Display for StorageKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
