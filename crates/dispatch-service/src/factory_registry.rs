//! Registry of every implementation factory compiled into the service.
//!
//! Each collaborator crate publishes its implementations through
//! `get_all_implementations`; the registry collects them once so the
//! configuration can pick implementations by name.

use dispatch_config::Config;
use dispatch_core::{DispatchBuilder, DispatchEngine, DispatchFactories};
use dispatch_directory::DirectoryFactory;
use dispatch_notify::NotificationFactory;
use dispatch_payment::PaymentFactory;
use dispatch_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Factories for every known implementation, keyed by name.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub directory: HashMap<String, DirectoryFactory>,
	pub payment: HashMap<String, PaymentFactory>,
	pub notification: HashMap<String, NotificationFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			directory: HashMap::new(),
			payment: HashMap::new(),
			notification: HashMap::new(),
		}
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Registers the implementations exported by a collaborator crate.
macro_rules! register_all {
	($registry:expr, $field:ident, $crate_name:ident, $component:literal) => {
		for (name, factory) in $crate_name::get_all_implementations() {
			tracing::debug!("Registering {} implementation: {}", $component, name);
			$registry.$field.insert(name.to_string(), factory);
		}
	};
}

/// Returns the process-wide registry, filling it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();
		register_all!(registry, storage, dispatch_storage, "storage");
		register_all!(registry, directory, dispatch_directory, "directory");
		register_all!(registry, payment, dispatch_payment, "payment");
		register_all!(registry, notification, dispatch_notify, "notification");
		registry
	})
}

/// Selects the factories named in a configuration section.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the engine from the implementations the configuration names.
pub fn build_engine_from_config(
	config: Config,
) -> Result<DispatchEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let directory_factories = build_factories!(
		registry,
		config.directory.implementations,
		directory,
		"directory"
	);
	let payment_factories =
		build_factories!(registry, config.payment.implementations, payment, "payment");
	let notification_factories = build_factories!(
		registry,
		config.notification.implementations,
		notification,
		"notification"
	);

	let factories = DispatchFactories {
		storage_factories,
		directory_factories,
		payment_factories,
		notification_factories,
	};

	Ok(DispatchBuilder::new(config).build(factories)?)
}
