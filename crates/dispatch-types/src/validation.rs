//! Schema checks for implementation configuration tables.
//!
//! Each pluggable implementation (storage backend, store directory, payment
//! and notification adapters) describes the TOML table it accepts as a
//! [`Schema`] and checks it in its factory, so a typo in a config file fails
//! at startup instead of on the first request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: &'static str,
		actual: &'static str,
	},
}

impl ValidationError {
	/// Prefixes the offending field with the name of the enclosing table.
	fn within(self, parent: &str) -> Self {
		let join = |field: String| format!("{}.{}", parent, field);
		match self {
			ValidationError::MissingField(field) => ValidationError::MissingField(join(field)),
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: join(field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: join(field),
				expected,
				actual,
			},
		}
	}
}

/// Expected TOML type of a field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// Inclusive bounds; integers are accepted.
	Float { min: Option<f64>, max: Option<f64> },
	/// A nested table checked against its own schema.
	Table(Schema),
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Float { .. } => "float",
			FieldType::Table(_) => "table",
		}
	}

	fn check(&self, field: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let mismatch = || ValidationError::TypeMismatch {
			field: field.to_string(),
			expected: self.name(),
			actual: value.type_str(),
		};
		let out_of_range = |shown: String| ValidationError::InvalidValue {
			field: field.to_string(),
			message: format!("{} is out of range", shown),
		};

		match self {
			FieldType::String => value.as_str().map(|_| ()).ok_or_else(mismatch),
			FieldType::Integer { min, max } => {
				let n = value.as_integer().ok_or_else(mismatch)?;
				if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
					return Err(out_of_range(n.to_string()));
				}
				Ok(())
			},
			FieldType::Float { min, max } => {
				let x = value
					.as_float()
					.or_else(|| value.as_integer().map(|i| i as f64))
					.ok_or_else(mismatch)?;
				if min.is_some_and(|m| x < m) || max.is_some_and(|m| x > m) {
					return Err(out_of_range(x.to_string()));
				}
				Ok(())
			},
			FieldType::Table(schema) => {
				if !value.is_table() {
					return Err(mismatch());
				}
				schema.validate(value).map_err(|e| e.within(field))
			},
		}
	}
}

type Check = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field with its type and an optional extra check.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	check: Option<Check>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("has_check", &self.check.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			check: None,
		}
	}

	/// Adds a check that runs after the type check passed.
	pub fn with_validator<F>(mut self, check: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.check = Some(Box::new(check));
		self
	}

	fn validate(&self, value: &toml::Value) -> Result<(), ValidationError> {
		self.field_type.check(&self.name, value)?;
		match &self.check {
			Some(check) => check(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			}),
			None => Ok(()),
		}
	}
}

/// Required and optional fields of a configuration table. Unknown keys are
/// ignored.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config.as_table().ok_or(ValidationError::TypeMismatch {
			field: "root".to_string(),
			expected: "table",
			actual: config.type_str(),
		})?;

		for field in &self.required {
			match table.get(&field.name) {
				Some(value) => field.validate(value)?,
				None => return Err(ValidationError::MissingField(field.name.clone())),
			}
		}
		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.validate(value)?;
			}
		}
		Ok(())
	}
}

/// Configuration schema of one implementation.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}
