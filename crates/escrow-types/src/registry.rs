//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each backend module (storage, transfer) provides a `Registry` struct that
/// names itself and hands out its factory function. The name is the key used
/// under `implementations` in the TOML configuration, e.g. `memory` for
/// `[storage.implementations.memory]` or `wallet` for
/// `[transfer.implementations.wallet]`.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
