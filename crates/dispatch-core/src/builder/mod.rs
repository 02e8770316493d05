//! Builder pattern for constructing dispatch engines.
//!
//! Each collaborator section of the configuration names a primary
//! implementation; the builder instantiates every configured implementation
//! that has a registered factory, then wraps the primary one in its service.

use crate::engine::DispatchEngine;
use dispatch_config::Config;
use dispatch_directory::{DirectoryError, DirectoryService, StoreDirectoryInterface};
use dispatch_notify::{NotificationInterface, NotificationService, NotifyError};
use dispatch_payment::{PaymentError, PaymentInterface, PaymentService};
use dispatch_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable collaborator, keyed by
/// implementation name.
pub struct DispatchFactories<SF, DF, PF, NF> {
	pub storage_factories: HashMap<String, SF>,
	pub directory_factories: HashMap<String, DF>,
	pub payment_factories: HashMap<String, PF>,
	pub notification_factories: HashMap<String, NF>,
}

/// Builder for constructing a DispatchEngine with pluggable implementations.
pub struct DispatchBuilder {
	config: Config,
}

/// Instantiates the configured implementations of one component and returns
/// the primary one.
fn load_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"no valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

impl DispatchBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine using the factories for each component type.
	pub fn build<SF, DF, PF, NF>(
		self,
		factories: DispatchFactories<SF, DF, PF, NF>,
	) -> Result<DispatchEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		DF: Fn(&toml::Value) -> Result<Box<dyn StoreDirectoryInterface>, DirectoryError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotifyError>,
	{
		self.config
			.validate()
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let storage = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let directory = load_primary(
			"directory",
			&self.config.directory.primary,
			&self.config.directory.implementations,
			&factories.directory_factories,
		)?;
		let payment = load_primary(
			"payment",
			&self.config.payment.primary,
			&self.config.payment.implementations,
			&factories.payment_factories,
		)?;
		let notification = load_primary(
			"notification",
			&self.config.notification.primary,
			&self.config.notification.implementations,
			&factories.notification_factories,
		)?;

		let currency = self.config.payment.currency.clone();
		Ok(DispatchEngine::new(
			self.config,
			Arc::new(StorageService::new(storage)),
			Arc::new(DirectoryService::new(directory)),
			Arc::new(PaymentService::new(payment, currency)),
			Arc::new(NotificationService::new(notification)),
		))
	}
}
