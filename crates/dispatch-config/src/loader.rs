//! Multi-file configuration loading.
//!
//! A root file may pull in other files with an `include` directive holding
//! one path or a list of paths, resolved against the root's directory.
//! Included files are merged at the top level. A section defined in two
//! files is an error, as is a file that is read twice.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a root configuration file together with its includes.
pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths already read.
	seen: HashSet<PathBuf>,
	/// File that defined each top-level section.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			seen: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Reads, merges, parses and validates the configuration rooted at `config_path`.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let root_path = self.locate(config_path.as_ref())?;
		let mut root = self.read_table(&root_path).await?;
		let includes = match root.remove("include") {
			Some(value) => include_paths(&value)?,
			None => Vec::new(),
		};

		self.claim_sections(&root, &root_path)?;
		for include in includes {
			let path = self.locate(&include)?;
			let table = self.read_table(&path).await?;
			self.claim_sections(&table, &path)?;
			root.extend(table);
		}

		let merged = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		merged.parse()
	}

	/// Reads one file with environment variables substituted.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.seen.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include: {} was already loaded",
				canonical.display()
			)));
		}

		let raw = tokio::fs::read_to_string(&canonical).await?;
		Ok(toml::from_str(&resolve_env_vars(&raw)?)?)
	}

	fn claim_sections(&mut self, table: &toml::Table, source: &Path) -> Result<(), ConfigError> {
		for section in table.keys() {
			if let Some(owner) = self.owners.get(section) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' in {} (already defined in {})",
					section,
					source.display(),
					owner.display()
				)));
			}
			self.owners.insert(section.clone(), source.to_path_buf());
		}
		Ok(())
	}

	fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};
		if resolved.exists() {
			Ok(resolved)
		} else {
			Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)))
		}
	}
}

fn include_paths(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || ConfigError::Validation("include must be a path or a list of paths".into());
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.iter()
			.map(|item| item.as_str().map(PathBuf::from).ok_or_else(invalid))
			.collect(),
		_ => Err(invalid()),
	}
}
