//! Configuration module for the order dispatch service.
//!
//! Configuration is read from TOML. Every pluggable collaborator section
//! names a `primary` implementation and carries a raw table per
//! implementation, validated later by that implementation's own schema.
//!
//! A root file may split sections out with `include = ["payment.toml"]`;
//! no section may appear in more than one file. `${NAME}` and
//! `${NAME:-default}` are substituted from the environment before parsing.

#[cfg(feature = "testing")]
pub mod builders;
mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "testing")]
pub use builders::ConfigBuilder;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message only; the default rendering echoes the whole input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Storage backend for orders, history and connections.
	pub storage: StorageConfig,
	/// Order store behaviour.
	#[serde(default)]
	pub orders: OrdersConfig,
	/// Bounds for nearby-order scans.
	#[serde(default)]
	pub geomatch: GeomatchConfig,
	/// Store-directory collaborator.
	pub directory: DirectoryConfig,
	/// Payment collaborator.
	pub payment: PaymentConfig,
	/// Customer-notification collaborator.
	pub notification: NotificationConfig,
	/// HTTP API server. The service runs headless when absent or disabled.
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrdersConfig {
	/// Maintain and read the customer -> order index. When false, customer
	/// lookups always scan.
	#[serde(default = "default_true")]
	pub customer_index: bool,
}

impl Default for OrdersConfig {
	fn default() -> Self {
		Self {
			customer_index: true,
		}
	}
}

/// Bounds applied to every nearby-order scan.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeomatchConfig {
	/// Orders read per storage page.
	#[serde(default = "default_page_size")]
	pub page_size: usize,
	/// Hard cap on pages read per call.
	#[serde(default = "default_max_pages")]
	pub max_pages: usize,
	/// Radius used when the caller sends none.
	#[serde(default = "default_radius_km")]
	pub default_radius_km: f64,
	/// Upper clamp for caller-supplied radii.
	#[serde(default = "default_max_radius_km")]
	pub max_radius_km: f64,
	/// Store-directory lookups in flight at once.
	#[serde(default = "default_lookup_concurrency")]
	pub lookup_concurrency: usize,
	/// Per-lookup timeout in milliseconds.
	#[serde(default = "default_lookup_timeout_ms")]
	pub lookup_timeout_ms: u64,
}

impl Default for GeomatchConfig {
	fn default() -> Self {
		Self {
			page_size: default_page_size(),
			max_pages: default_max_pages(),
			default_radius_km: default_radius_km(),
			max_radius_km: default_max_radius_km(),
			lookup_concurrency: default_lookup_concurrency(),
			lookup_timeout_ms: default_lookup_timeout_ms(),
		}
	}
}

/// Configuration for the store-directory collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the payment collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	pub primary: String,
	/// ISO currency code sent with every payment request.
	#[serde(default = "default_currency")]
	pub currency: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the customer-notification collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

fn default_true() -> bool {
	true
}

fn default_page_size() -> usize {
	200
}

fn default_max_pages() -> usize {
	5
}

fn default_radius_km() -> f64 {
	20.0
}

fn default_max_radius_km() -> f64 {
	100.0
}

fn default_lookup_concurrency() -> usize {
	8
}

fn default_lookup_timeout_ms() -> u64 {
	1000
}

fn default_currency() -> String {
	"ILS".to_string()
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

/// 1MB
fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Substitutes `${NAME}` and `${NAME:-default}` from the environment.
///
/// A reference without a default to an unset variable is an error.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_CONFIG_BYTES: usize = 1024 * 1024;
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, the limit is {}",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing: Option<String> = None;
	let resolved = pattern.replace_all(input, |caps: &regex::Captures| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

/// Checks that a collaborator section names a configured primary.
fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file, following include directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates cross-field constraints that serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		validate_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		let geo = &self.geomatch;
		if geo.page_size == 0 || geo.max_pages == 0 {
			return Err(ConfigError::Validation(
				"geomatch page_size and max_pages must be greater than 0".into(),
			));
		}
		if geo.lookup_concurrency == 0 {
			return Err(ConfigError::Validation(
				"geomatch lookup_concurrency must be greater than 0".into(),
			));
		}
		if geo.lookup_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"geomatch lookup_timeout_ms must be greater than 0".into(),
			));
		}
		if !(geo.max_radius_km.is_finite() && geo.max_radius_km > 0.0) {
			return Err(ConfigError::Validation(
				"geomatch max_radius_km must be a positive number".into(),
			));
		}
		if !(geo.default_radius_km.is_finite() && geo.default_radius_km > 0.0) {
			return Err(ConfigError::Validation(
				"geomatch default_radius_km must be a positive number".into(),
			));
		}
		if geo.default_radius_km > geo.max_radius_km {
			return Err(ConfigError::Validation(format!(
				"geomatch default_radius_km ({}) exceeds max_radius_km ({})",
				geo.default_radius_km, geo.max_radius_km
			)));
		}

		validate_primary(
			"directory",
			&self.directory.primary,
			&self.directory.implementations,
		)?;
		validate_primary("payment", &self.payment.primary, &self.payment.implementations)?;
		if self.payment.currency.trim().is_empty() {
			return Err(ConfigError::Validation(
				"payment currency cannot be empty".into(),
			));
		}
		validate_primary(
			"notification",
			&self.notification.primary,
			&self.notification.implementations,
		)?;

		if let Some(api) = &self.api {
			if api.enabled && api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api timeout_seconds must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
