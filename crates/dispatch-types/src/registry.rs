//! Registry trait for self-registering implementations.
//!
//! Every pluggable collaborator (storage backends, store directories, payment
//! providers, notifiers) exposes a `Registry` type implementing this trait so
//! the service can map configuration names to factory functions.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. "memory" for `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
