//! Customer notification module for the dispatch engine.
//!
//! Sends the customer the payment link once a delivery is completed. From
//! the engine's point of view a notification is fire-and-forget: failures
//! are reported to the caller, which logs and moves on.

use async_trait::async_trait;
use dispatch_types::{ConfigSchema, ImplementationRegistry};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod log;
}

/// Errors that can occur while sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Notification rejected with status {status}: {body}")]
	Rejected { status: u16, body: String },
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// An e-mail to a customer about one of their orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEmail {
	pub customer_contact: String,
	pub customer_name: String,
	/// Reference shown to the customer; the payment id for delivery mails.
	pub order_id: String,
	pub body: String,
}

#[async_trait]
pub trait NotificationInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn send_order_email(&self, email: &OrderEmail) -> Result<(), NotifyError>;
}

/// Type alias for notification factory functions.
pub type NotificationFactory =
	fn(&toml::Value) -> Result<Box<dyn NotificationInterface>, NotifyError>;

/// Registry trait for notification implementations.
pub trait NotificationRegistry: ImplementationRegistry<Factory = NotificationFactory> {}

/// Get all registered notification implementations.
pub fn get_all_implementations() -> Vec<(&'static str, NotificationFactory)> {
	use implementations::{http, log};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(log::Registry::NAME, log::Registry::factory()),
	]
}

/// Service wrapping the configured notifier.
pub struct NotificationService {
	notifier: Box<dyn NotificationInterface>,
}

impl NotificationService {
	pub fn new(notifier: Box<dyn NotificationInterface>) -> Self {
		Self { notifier }
	}

	pub async fn send_order_email(&self, email: &OrderEmail) -> Result<(), NotifyError> {
		self.notifier.send_order_email(email).await
	}
}
