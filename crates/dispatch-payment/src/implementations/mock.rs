//! In-process payment provider for development and tests.
//!
//! Every request succeeds with a sequential payment id.

use crate::{
	PaymentError, PaymentFactory, PaymentInterface, PaymentReceipt, PaymentRegistry,
	PaymentRequest,
};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_APPROVAL_BASE: &str = "https://payments.invalid/approve";

pub struct MockPayment {
	approval_base_url: String,
	next_id: AtomicU64,
}

impl MockPayment {
	pub fn new(approval_base_url: impl Into<String>) -> Self {
		Self {
			approval_base_url: approval_base_url.into(),
			next_id: AtomicU64::new(1),
		}
	}
}

#[async_trait]
impl PaymentInterface for MockPayment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockPaymentSchema)
	}

	async fn create_payment(
		&self,
		request: &PaymentRequest,
	) -> Result<PaymentReceipt, PaymentError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let payment_id = format!("MOCK-{:06}", id);
		tracing::info!(
			payment_id = %payment_id,
			amount = %request.amount,
			currency = %request.currency,
			payee = %request.payee_contact,
			"Mock payment created"
		);
		Ok(PaymentReceipt {
			approval_url: format!(
				"{}/{}",
				self.approval_base_url.trim_end_matches('/'),
				payment_id
			),
			payment_id,
		})
	}
}

pub struct MockPaymentSchema;

impl ConfigSchema for MockPaymentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("approval_base_url", FieldType::String)])
			.validate(config)
	}
}

/// Factory function to create a mock payment provider.
pub fn create_payment(config: &toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> {
	MockPaymentSchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;
	let base = config
		.get("approval_base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_APPROVAL_BASE);
	Ok(Box::new(MockPayment::new(base)))
}

/// Registry for the mock payment implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = PaymentFactory;

	fn factory() -> Self::Factory {
		create_payment
	}
}

impl PaymentRegistry for Registry {}
