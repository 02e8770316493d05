//! Store directory reached over HTTP.
//!
//! Issues `GET {base_url}/{store_id}` and reads the store's location from
//! the body. The body may be the coordinates themselves (any shape accepted
//! by [`Coordinates::from_json`], or a bare `lat,lng` text body) or a store
//! profile carrying them under `coordinates`.

use crate::{DirectoryError, DirectoryFactory, DirectoryRegistry, StoreDirectoryInterface};
use async_trait::async_trait;
use dispatch_types::{
	ConfigSchema, Coordinates, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use reqwest::{StatusCode, Url};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 2000;

pub struct HttpDirectory {
	client: reqwest::Client,
	base_url: Url,
}

impl HttpDirectory {
	pub fn new(base_url: Url, timeout: Duration) -> Result<Self, DirectoryError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DirectoryError::Configuration(e.to_string()))?;
		Ok(Self { client, base_url })
	}

	fn store_url(&self, store_id: &str) -> Result<Url, DirectoryError> {
		let mut url = self.base_url.clone();
		url.path_segments_mut()
			.map_err(|_| DirectoryError::Configuration("base_url cannot be a base".into()))?
			.pop_if_empty()
			.push(store_id);
		Ok(url)
	}
}

/// Extracts coordinates from a directory response body.
fn coordinates_from_body(body: &str) -> Option<Coordinates> {
	match serde_json::from_str::<serde_json::Value>(body) {
		Ok(json) => Coordinates::from_json(&json).ok().or_else(|| {
			json.get("coordinates")
				.and_then(|nested| Coordinates::from_json(nested).ok())
		}),
		Err(_) => body.trim().parse().ok(),
	}
}

#[async_trait]
impl StoreDirectoryInterface for HttpDirectory {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpDirectorySchema)
	}

	async fn get_coordinates(
		&self,
		store_id: &str,
	) -> Result<Option<Coordinates>, DirectoryError> {
		let url = self.store_url(store_id)?;
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| DirectoryError::Network(e.to_string()))?;

		match response.status() {
			StatusCode::NOT_FOUND => return Ok(None),
			status if !status.is_success() => {
				return Err(DirectoryError::Network(format!(
					"Directory returned {} for store {}",
					status, store_id
				)));
			},
			_ => {},
		}

		let body = response
			.text()
			.await
			.map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
		let coordinates = coordinates_from_body(&body);
		if coordinates.is_none() {
			tracing::debug!(store_id = %store_id, "Directory response carried no usable coordinates");
		}
		Ok(coordinates)
	}
}

pub struct HttpDirectorySchema;

impl ConfigSchema for HttpDirectorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				Url::parse(url)
					.map(|_| ())
					.map_err(|e| format!("invalid URL '{}': {}", url, e))
			})],
			vec![Field::new(
				"timeout_ms",
				FieldType::Integer {
					min: Some(1),
					max: Some(60_000),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP directory client from configuration.
///
/// Configuration parameters:
/// - `base_url`: URL the store id is appended to
/// - `timeout_ms`: client-level request timeout (default: 2000)
pub fn create_directory(
	config: &toml::Value,
) -> Result<Box<dyn StoreDirectoryInterface>, DirectoryError> {
	HttpDirectorySchema
		.validate(config)
		.map_err(|e| DirectoryError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DirectoryError::Configuration("base_url is required".into()))?;
	let base_url =
		Url::parse(base_url).map_err(|e| DirectoryError::Configuration(e.to_string()))?;
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_MS);

	Ok(Box::new(HttpDirectory::new(
		base_url,
		Duration::from_millis(timeout_ms),
	)?))
}

/// Registry for the HTTP directory implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = DirectoryFactory;

	fn factory() -> Self::Factory {
		create_directory
	}
}

impl DirectoryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_body_shapes() {
		let expected = Some(Coordinates::new(32.1, 34.8).unwrap());
		assert_eq!(coordinates_from_body("[32.1, 34.8]"), expected);
		assert_eq!(coordinates_from_body("\"32.1,34.8\""), expected);
		assert_eq!(coordinates_from_body("32.1,34.8"), expected);
		assert_eq!(
			coordinates_from_body(r#"{"store_id":"s1","coordinates":"32.1,34.8"}"#),
			expected
		);
		assert_eq!(coordinates_from_body(r#"{"store_id":"s1"}"#), None);
		assert_eq!(coordinates_from_body("not found"), None);
	}

	#[test]
	fn test_store_url_escapes_id() {
		let directory = HttpDirectory::new(
			Url::parse("http://directory.local/stores/").unwrap(),
			Duration::from_secs(1),
		)
		.unwrap();
		assert_eq!(
			directory.store_url("store 1/a").unwrap().as_str(),
			"http://directory.local/stores/store%201%2Fa"
		);
	}

	#[test]
	fn test_factory_requires_valid_url() {
		let config: toml::Value = toml::from_str("base_url = \"not a url\"").unwrap();
		assert!(matches!(
			create_directory(&config),
			Err(DirectoryError::Configuration(_))
		));
	}
}
