//! Configuration builder for tests.
//!
//! Produces a [`Config`] wired to in-process implementations: memory
//! storage, a static store directory, the mock payment provider and the log
//! notifier.

use crate::{
	ApiConfig, Config, DirectoryConfig, GeomatchConfig, NotificationConfig, OrdersConfig,
	PaymentConfig, ServiceConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_cleanup_interval_seconds: u64,
	customer_index: bool,
	geomatch: GeomatchConfig,
	stores: toml::Table,
	currency: String,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			service_id: "dispatch-test".to_string(),
			storage_cleanup_interval_seconds: 60,
			customer_index: true,
			geomatch: GeomatchConfig::default(),
			stores: toml::Table::new(),
			currency: "ILS".to_string(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	pub fn customer_index(mut self, enabled: bool) -> Self {
		self.customer_index = enabled;
		self
	}

	pub fn geomatch(mut self, geomatch: GeomatchConfig) -> Self {
		self.geomatch = geomatch;
		self
	}

	/// Registers a store location with the static directory.
	pub fn store(mut self, store_id: impl Into<String>, lat: f64, lng: f64) -> Self {
		self.stores
			.insert(store_id.into(), toml::Value::String(format!("{},{}", lat, lng)));
		self
	}

	pub fn currency(mut self, currency: impl Into<String>) -> Self {
		self.currency = currency.into();
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		let empty = || toml::Value::Table(toml::Table::new());

		let mut static_directory = toml::Table::new();
		static_directory.insert("stores".to_string(), toml::Value::Table(self.stores));

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([("memory".to_string(), empty())]),
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			orders: OrdersConfig {
				customer_index: self.customer_index,
			},
			geomatch: self.geomatch,
			directory: DirectoryConfig {
				primary: "static".to_string(),
				implementations: HashMap::from([(
					"static".to_string(),
					toml::Value::Table(static_directory),
				)]),
			},
			payment: PaymentConfig {
				primary: "mock".to_string(),
				currency: self.currency,
				implementations: HashMap::from([("mock".to_string(), empty())]),
			},
			notification: NotificationConfig {
				primary: "log".to_string(),
				implementations: HashMap::from([("log".to_string(), empty())]),
			},
			api: self.api,
		}
	}
}
