//! Store directory backed by a fixed table in the configuration file.
//!
//! ```toml
//! [directory.implementations.static.stores]
//! store-1 = "32.0853,34.7818"
//! store-2 = [31.7683, 35.2137]
//! ```

use crate::{DirectoryError, DirectoryFactory, DirectoryRegistry, StoreDirectoryInterface};
use async_trait::async_trait;
use dispatch_types::{
	ConfigSchema, Coordinates, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use std::collections::HashMap;

pub struct StaticDirectory {
	stores: HashMap<String, Coordinates>,
}

impl StaticDirectory {
	pub fn new(stores: HashMap<String, Coordinates>) -> Self {
		Self { stores }
	}
}

#[async_trait]
impl StoreDirectoryInterface for StaticDirectory {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticDirectorySchema)
	}

	async fn get_coordinates(
		&self,
		store_id: &str,
	) -> Result<Option<Coordinates>, DirectoryError> {
		Ok(self.stores.get(store_id).copied())
	}
}

pub struct StaticDirectorySchema;

impl ConfigSchema for StaticDirectorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("stores", FieldType::Table(Schema::new(vec![], vec![])))
				.with_validator(|value| {
					let table = value.as_table().ok_or("stores must be a table")?;
					for (store_id, entry) in table {
						parse_entry(entry).map_err(|e| format!("store '{}': {}", store_id, e))?;
					}
					Ok(())
				})],
		);
		schema.validate(config)
	}
}

fn parse_entry(entry: &toml::Value) -> Result<Coordinates, String> {
	let json = serde_json::to_value(entry).map_err(|e| e.to_string())?;
	Coordinates::from_json(&json).map_err(|e| e.to_string())
}

/// Factory function to create a static directory from configuration.
pub fn create_directory(
	config: &toml::Value,
) -> Result<Box<dyn StoreDirectoryInterface>, DirectoryError> {
	StaticDirectorySchema
		.validate(config)
		.map_err(|e| DirectoryError::Configuration(e.to_string()))?;

	let mut stores = HashMap::new();
	if let Some(table) = config.get("stores").and_then(|v| v.as_table()) {
		for (store_id, entry) in table {
			let coordinates = parse_entry(entry).map_err(DirectoryError::Configuration)?;
			stores.insert(store_id.clone(), coordinates);
		}
	}

	tracing::debug!(stores = stores.len(), "Loaded static store directory");
	Ok(Box::new(StaticDirectory::new(stores)))
}

/// Registry for the static directory implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = DirectoryFactory;

	fn factory() -> Self::Factory {
		create_directory
	}
}

impl DirectoryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_lookup_from_config() {
		let config: toml::Value = toml::from_str(
			r#"
[stores]
tlv = "32.0853,34.7818"
jlm = [31.7683, 35.2137]
hfa = { latitude = 32.794, longitude = 34.9896 }
"#,
		)
		.unwrap();

		let directory = create_directory(&config).unwrap();
		let tlv = directory.get_coordinates("tlv").await.unwrap().unwrap();
		assert_eq!(tlv, Coordinates::new(32.0853, 34.7818).unwrap());
		assert!(directory.get_coordinates("jlm").await.unwrap().is_some());
		assert!(directory.get_coordinates("hfa").await.unwrap().is_some());
		assert!(directory.get_coordinates("eilat").await.unwrap().is_none());
	}

	#[test]
	fn test_invalid_entry_rejected() {
		let config: toml::Value = toml::from_str("[stores]\nbad = \"north\"\n").unwrap();
		assert!(matches!(
			create_directory(&config),
			Err(DirectoryError::Configuration(_))
		));
	}
}
