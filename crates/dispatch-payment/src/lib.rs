//! Payment module for the dispatch engine.
//!
//! Completing a delivery creates a payment request with an external payment
//! provider. The provider returns an approval link the customer follows to
//! pay; the engine never captures funds itself.

use async_trait::async_trait;
use dispatch_types::{ConfigSchema, ImplementationRegistry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Product name used on every payment line.
pub const PAYMENT_PRODUCT_NAME: &str = "prepal order";

/// Errors that can occur while creating a payment.
#[derive(Debug, Error)]
pub enum PaymentError {
	/// The provider could not be reached or timed out.
	#[error("Network error: {0}")]
	Network(String),
	/// The provider answered with a non-success status.
	#[error("Payment rejected with status {status}: {body}")]
	Rejected { status: u16, body: String },
	/// The provider answered 2xx but without the fields we need.
	#[error("Malformed payment response: {0}")]
	Malformed(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A request for payment on a completed delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
	/// Amount rounded to two decimals, always positive.
	pub amount: Decimal,
	/// ISO currency code.
	pub currency: String,
	/// E-mail of the driver receiving the payout.
	pub payee_contact: String,
	pub store_id: String,
}

/// What the provider returns for a created payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
	pub payment_id: String,
	pub approval_url: String,
}

/// Trait defining the interface for payment providers.
///
/// Callers retry `create_payment` after failures, so providers should treat
/// repeated identical requests idempotently.
#[async_trait]
pub trait PaymentInterface: Send + Sync {
	/// Returns the configuration schema for this payment implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates a payment and returns its approval link.
	async fn create_payment(&self, request: &PaymentRequest)
		-> Result<PaymentReceipt, PaymentError>;
}

/// Type alias for payment factory functions.
pub type PaymentFactory = fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError>;

/// Registry trait for payment implementations.
pub trait PaymentRegistry: ImplementationRegistry<Factory = PaymentFactory> {}

/// Get all registered payment implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PaymentFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Service wrapping the configured payment provider.
pub struct PaymentService {
	provider: Box<dyn PaymentInterface>,
	currency: String,
}

impl PaymentService {
	pub fn new(provider: Box<dyn PaymentInterface>, currency: impl Into<String>) -> Self {
		Self {
			provider,
			currency: currency.into(),
		}
	}

	/// Currency used for every payment this service creates.
	pub fn currency(&self) -> &str {
		&self.currency
	}

	/// Requests payment of `amount` to `payee_contact` for a delivery from `store_id`.
	pub async fn create_payment(
		&self,
		amount: Decimal,
		payee_contact: &str,
		store_id: &str,
	) -> Result<PaymentReceipt, PaymentError> {
		let request = PaymentRequest {
			amount,
			currency: self.currency.clone(),
			payee_contact: payee_contact.to_string(),
			store_id: store_id.to_string(),
		};
		tracing::debug!(
			store_id = %store_id,
			amount = %amount,
			currency = %self.currency,
			"Creating payment"
		);
		self.provider.create_payment(&request).await
	}
}
