//! Notifier that writes the e-mail to the log instead of sending it.

use crate::{
	NotificationFactory, NotificationInterface, NotificationRegistry, NotifyError, OrderEmail,
};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

pub struct LogNotifier;

#[async_trait]
impl NotificationInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn send_order_email(&self, email: &OrderEmail) -> Result<(), NotifyError> {
		tracing::info!(
			to = %email.customer_contact,
			name = %email.customer_name,
			order_id = %email.order_id,
			body = %email.body,
			"Customer e-mail"
		);
		Ok(())
	}
}

pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotifyError> {
	LogNotifierSchema
		.validate(config)
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;
	Ok(Box::new(LogNotifier))
}

/// Registry for the log notifier.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotificationRegistry for Registry {}
