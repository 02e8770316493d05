//! Payment provider reached over HTTP.
//!
//! Posts a single-line order to the provider's create endpoint:
//!
//! ```json
//! {
//!   "products": [{"name": "prepal order", "price": 42.5, "quantity": 1}],
//!   "currency": "ILS",
//!   "store_id": "store-1",
//!   "deliver_email": "driver@example.com"
//! }
//! ```
//!
//! and expects `approval_url` plus the provider's id (`order_id` or
//! `payment_id`) back.

use crate::{
	PaymentError, PaymentFactory, PaymentInterface, PaymentReceipt, PaymentRegistry,
	PaymentRequest, PAYMENT_PRODUCT_NAME,
};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use reqwest::Url;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 12_000;

#[derive(Debug, Serialize)]
struct ProductLine<'a> {
	name: &'a str,
	price: f64,
	quantity: u32,
}

#[derive(Debug, Serialize)]
struct CreatePaymentPayload<'a> {
	products: Vec<ProductLine<'a>>,
	currency: &'a str,
	store_id: &'a str,
	deliver_email: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
	approval_url: Option<String>,
	order_id: Option<String>,
	payment_id: Option<String>,
}

pub struct HttpPayment {
	client: reqwest::Client,
	endpoint: Url,
}

impl HttpPayment {
	pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, PaymentError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| PaymentError::Configuration(e.to_string()))?;
		Ok(Self { client, endpoint })
	}
}

fn payload(request: &PaymentRequest) -> Result<CreatePaymentPayload<'_>, PaymentError> {
	let price = request
		.amount
		.to_f64()
		.ok_or_else(|| PaymentError::Malformed(format!("amount {} out of range", request.amount)))?;
	Ok(CreatePaymentPayload {
		products: vec![ProductLine {
			name: PAYMENT_PRODUCT_NAME,
			price,
			quantity: 1,
		}],
		currency: &request.currency,
		store_id: &request.store_id,
		deliver_email: &request.payee_contact,
	})
}

fn receipt_from_body(body: &str) -> Result<PaymentReceipt, PaymentError> {
	let parsed: CreatePaymentResponse =
		serde_json::from_str(body).map_err(|e| PaymentError::Malformed(e.to_string()))?;
	let payment_id = [parsed.order_id, parsed.payment_id]
		.into_iter()
		.flatten()
		.find(|id| !id.is_empty());
	match (payment_id, parsed.approval_url) {
		(Some(payment_id), Some(approval_url)) if !approval_url.is_empty() => {
			Ok(PaymentReceipt {
				payment_id,
				approval_url,
			})
		},
		_ => Err(PaymentError::Malformed(
			"response missing approval_url or order id".into(),
		)),
	}
}

#[async_trait]
impl PaymentInterface for HttpPayment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpPaymentSchema)
	}

	async fn create_payment(
		&self,
		request: &PaymentRequest,
	) -> Result<PaymentReceipt, PaymentError> {
		let response = self
			.client
			.post(self.endpoint.clone())
			.json(&payload(request)?)
			.send()
			.await
			.map_err(|e| PaymentError::Network(e.to_string()))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| PaymentError::Network(e.to_string()))?;

		if !status.is_success() {
			tracing::error!(status = %status, body = %body, "Payment create failed");
			return Err(PaymentError::Rejected {
				status: status.as_u16(),
				body,
			});
		}

		receipt_from_body(&body)
	}
}

pub struct HttpPaymentSchema;

impl ConfigSchema for HttpPaymentSchema {
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
					max: Some(120_000),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP payment provider from configuration.
///
/// Configuration parameters:
/// - `endpoint`: payment creation URL
/// - `timeout_ms`: request timeout (default: 12000)
pub fn create_payment(config: &toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> {
	HttpPaymentSchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| PaymentError::Configuration("endpoint is required".into()))?;
	let endpoint = Url::parse(endpoint).map_err(|e| PaymentError::Configuration(e.to_string()))?;
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_MS);

	Ok(Box::new(HttpPayment::new(
		endpoint,
		Duration::from_millis(timeout_ms),
	)?))
}

/// Registry for the HTTP payment implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = PaymentFactory;

	fn factory() -> Self::Factory {
		create_payment
	}
}

impl PaymentRegistry for Registry {}
