//! Notification service reached over HTTP.
//!
//! Posts `{customerMail, customerName, orderId, orderInfo}` to the mail
//! endpoint.

use crate::{
	NotificationFactory, NotificationInterface, NotificationRegistry, NotifyError, OrderEmail,
};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use reqwest::Url;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailPayload<'a> {
	customer_mail: &'a str,
	customer_name: &'a str,
	order_id: &'a str,
	order_info: &'a str,
}

impl<'a> From<&'a OrderEmail> for MailPayload<'a> {
	fn from(email: &'a OrderEmail) -> Self {
		Self {
			customer_mail: &email.customer_contact,
			customer_name: &email.customer_name,
			order_id: &email.order_id,
			order_info: &email.body,
		}
	}
}

pub struct HttpNotifier {
	client: reqwest::Client,
	endpoint: Url,
}

impl HttpNotifier {
	pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, NotifyError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotifyError::Configuration(e.to_string()))?;
		Ok(Self { client, endpoint })
	}
}

#[async_trait]
impl NotificationInterface for HttpNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpNotifierSchema)
	}

	async fn send_order_email(&self, email: &OrderEmail) -> Result<(), NotifyError> {
		let response = self
			.client
			.post(self.endpoint.clone())
			.json(&MailPayload::from(email))
			.send()
			.await
			.map_err(|e| NotifyError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(NotifyError::Rejected {
				status: status.as_u16(),
				body,
			});
		}
		Ok(())
	}
}

pub struct HttpNotifierSchema;

impl ConfigSchema for HttpNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("endpoint", FieldType::String).with_validator(|value| {
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

/// Factory function to create an HTTP notifier from configuration.
///
/// Configuration parameters:
/// - `endpoint`: mail service URL
/// - `timeout_ms`: request timeout (default: 8000)
pub fn create_notifier(
	config: &toml::Value,
) -> Result<Box<dyn NotificationInterface>, NotifyError> {
	HttpNotifierSchema
		.validate(config)
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotifyError::Configuration("endpoint is required".into()))?;
	let endpoint = Url::parse(endpoint).map_err(|e| NotifyError::Configuration(e.to_string()))?;
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_MS);

	Ok(Box::new(HttpNotifier::new(
		endpoint,
		Duration::from_millis(timeout_ms),
	)?))
}

/// Registry for the HTTP notifier.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = NotificationFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl NotificationRegistry for Registry {}
