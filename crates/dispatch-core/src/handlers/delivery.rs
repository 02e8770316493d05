//! Delivery handler: driver acceptance and delivery completion.
//!
//! Completion is strictly ordered. The payment is created first and the live
//! order is deleted only after the provider returned a usable approval link,
//! so a failed payment leaves the order claimed by the same driver and the
//! call can simply be repeated. The customer e-mail comes last and is
//! advisory: its failure is logged and reported, never rolled back.

use crate::error::{require_id, DispatchError};
use crate::state::OrderStore;
use dispatch_notify::{NotificationService, OrderEmail};
use dispatch_payment::{PaymentService, PAYMENT_PRODUCT_NAME};
use dispatch_types::{
	truncate_id, AcceptResponse, FinishRequest, FinishResponse, Order, OrderKey,
	PaymentSummary, PriceInput,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Turns a driver-supplied price into a positive amount with two decimals.
///
/// Text prices may carry `,` thousands separators. Rounding is half away
/// from zero.
pub fn normalize_price(price: &PriceInput) -> Result<Decimal, DispatchError> {
	let invalid = || DispatchError::InvalidArgument(format!("invalid price: {:?}", price));

	let amount = match price {
		PriceInput::Number(n) if n.is_finite() => Decimal::from_f64(*n).ok_or_else(invalid)?,
		PriceInput::Number(_) => return Err(invalid()),
		PriceInput::Text(text) => {
			let cleaned: String = text.chars().filter(|c| *c != ',').collect();
			let cleaned = cleaned.trim();
			match Decimal::from_str(cleaned) {
				Ok(amount) => amount,
				// Exponent forms such as "1e3"
				Err(_) => cleaned
					.parse::<f64>()
					.ok()
					.filter(|n| n.is_finite())
					.and_then(Decimal::from_f64)
					.ok_or_else(invalid)?,
			}
		},
	};

	let amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
	if amount <= Decimal::ZERO {
		return Err(DispatchError::InvalidArgument(format!(
			"price must be positive, got {}",
			amount
		)));
	}
	Ok(amount)
}

/// Text of the customer e-mail sent after a delivery.
fn email_body(amount: Decimal, currency: &str, approval_url: &str) -> String {
	format!(
		"{}\nquantity: 1\nprice: {} {}\n\npayment link: {}",
		PAYMENT_PRODUCT_NAME, amount, currency, approval_url
	)
}

pub struct DeliveryHandler {
	orders: Arc<OrderStore>,
	payment: Arc<PaymentService>,
	notification: Arc<NotificationService>,
}

impl DeliveryHandler {
	pub fn new(
		orders: Arc<OrderStore>,
		payment: Arc<PaymentService>,
		notification: Arc<NotificationService>,
	) -> Self {
		Self {
			orders,
			payment,
			notification,
		}
	}

	/// Claims a ready order for a driver.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), driver_id = %truncate_id(driver_id)))]
	pub async fn accept(
		&self,
		store_id: &str,
		order_id: &str,
		driver_id: &str,
	) -> Result<AcceptResponse, DispatchError> {
		require_id("store_id", store_id)?;
		require_id("order_id", order_id)?;
		require_id("driver_id", driver_id)?;

		let order = self
			.orders
			.claim(&OrderKey::new(store_id, order_id), driver_id)
			.await?;
		tracing::info!("Order accepted");

		Ok(AcceptResponse {
			message: "Order accepted".to_string(),
			order,
		})
	}

	/// Completes a delivery: payment, removal, customer e-mail.
	#[instrument(skip_all, fields(order_id = %truncate_id(&request.order_id), driver_id = %truncate_id(&request.driver_id)))]
	pub async fn finish(&self, request: FinishRequest) -> Result<FinishResponse, DispatchError> {
		require_id("store_id", &request.store_id)?;
		require_id("order_id", &request.order_id)?;
		require_id("driver_id", &request.driver_id)?;
		if request.driver_email.trim().is_empty() {
			return Err(DispatchError::InvalidArgument(
				"driver_email is required".into(),
			));
		}

		let key = OrderKey::new(request.store_id.as_str(), request.order_id.as_str());
		let order = self.orders.require(&key).await?;
		if !order.is_claimed_by(&request.driver_id) {
			return Err(DispatchError::Conflict {
				order_id: order.order_id,
				current_status: Some(order.status),
			});
		}

		let amount = normalize_price(&request.price)?;

		let receipt = self
			.payment
			.create_payment(amount, request.driver_email.trim(), &order.store_id)
			.await
			.map_err(|e| {
				tracing::warn!(error = %e, "Payment creation failed, order left in delivery");
				DispatchError::UpstreamUnavailable(format!("payment creation failed: {}", e))
			})?;
		tracing::info!(payment_id = %receipt.payment_id, amount = %amount, "Payment created");

		if let Err(e) = self.orders.remove(&order).await {
			tracing::error!(
				payment_id = %receipt.payment_id,
				error = %e,
				"Payment created but order removal failed"
			);
			return Err(e);
		}
		tracing::info!("Delivery completed, order removed");

		let email_sent = self
			.send_customer_email(&order, &request, amount, &receipt.payment_id, &receipt.approval_url)
			.await;

		Ok(FinishResponse {
			message: "Delivery completed".to_string(),
			store_id: order.store_id,
			order_id: order.order_id,
			payment: PaymentSummary {
				payment_id: receipt.payment_id,
				approval_url: receipt.approval_url,
				amount,
				currency: self.payment.currency().to_string(),
			},
			email_sent,
		})
	}

	async fn send_customer_email(
		&self,
		order: &Order,
		request: &FinishRequest,
		amount: Decimal,
		payment_id: &str,
		approval_url: &str,
	) -> bool {
		let contact = request
			.customer_email
			.as_deref()
			.filter(|c| !c.trim().is_empty())
			.unwrap_or(order.customer_email.as_str())
			.trim();
		if contact.is_empty() {
			tracing::warn!("No customer e-mail known, skipping payment link mail");
			return false;
		}
		let name = request
			.customer_name
			.as_deref()
			.filter(|n| !n.trim().is_empty())
			.unwrap_or(order.customer_name.as_str());

		let email = OrderEmail {
			customer_contact: contact.to_string(),
			customer_name: name.to_string(),
			order_id: payment_id.to_string(),
			body: email_body(amount, self.payment.currency(), approval_url),
		};
		match self.notification.send_order_email(&email).await {
			Ok(()) => true,
			Err(e) => {
				tracing::warn!(error = %e, "Customer e-mail failed");
				false
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{memory_storage, sample_order, RecordingNotifier, ScriptedPayment};
	use dispatch_payment::PaymentError;
	use dispatch_types::OrderStatus;
	use std::sync::Mutex;

	struct Fixture {
		handler: Arc<DeliveryHandler>,
		orders: Arc<OrderStore>,
		payments: Arc<Mutex<Vec<dispatch_payment::PaymentRequest>>>,
		mails: Arc<Mutex<Vec<OrderEmail>>>,
	}

	fn fixture(payment: ScriptedPayment, notifier: RecordingNotifier) -> Fixture {
		let orders = Arc::new(OrderStore::new(memory_storage(), true));
		let payments = payment.requests.clone();
		let mails = notifier.sent.clone();
		let handler = DeliveryHandler::new(
			orders.clone(),
			Arc::new(PaymentService::new(Box::new(payment), "ILS")),
			Arc::new(NotificationService::new(Box::new(notifier))),
		);
		Fixture {
			handler: Arc::new(handler),
			orders,
			payments,
			mails,
		}
	}

	async fn ready(orders: &OrderStore, order_id: &str) -> Order {
		let order = sample_order("s1", order_id, "c1");
		orders.insert(&order).await.unwrap();
		orders
			.set_status(&order.key(), OrderStatus::Ready)
			.await
			.unwrap()
	}

	fn finish_request(order_id: &str, driver_id: &str, price: PriceInput) -> FinishRequest {
		FinishRequest {
			store_id: "s1".into(),
			order_id: order_id.into(),
			driver_id: driver_id.into(),
			driver_email: "driver@example.com".into(),
			price,
			customer_email: None,
			customer_name: None,
		}
	}

	#[test]
	fn test_normalize_price() {
		let text = |s: &str| PriceInput::Text(s.into());
		assert_eq!(
			normalize_price(&text("1,250.555")).unwrap(),
			Decimal::new(125056, 2)
		);
		assert_eq!(
			normalize_price(&PriceInput::Number(42.1)).unwrap(),
			Decimal::new(421, 1)
		);
		assert_eq!(normalize_price(&text(" 18 ")).unwrap(), Decimal::new(18, 0));
		assert_eq!(normalize_price(&text("1e2")).unwrap(), Decimal::new(100, 0));
		for bad in ["0", "-3", "abc", "", "0.004"] {
			assert!(
				matches!(normalize_price(&text(bad)), Err(DispatchError::InvalidArgument(_))),
				"{bad} should be rejected"
			);
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_accepts_have_one_winner() {
		let f = fixture(ScriptedPayment::default(), RecordingNotifier::default());
		ready(&f.orders, "o1").await;

		let attempts = (0..16).map(|n| {
			let handler = f.handler.clone();
			tokio::spawn(async move { handler.accept("s1", "o1", &format!("driver-{}", n)).await })
		});
		let results: Vec<_> = futures::future::join_all(attempts)
			.await
			.into_iter()
			.map(|joined| joined.unwrap())
			.collect();

		let winners = results.iter().filter(|r| r.is_ok()).count();
		assert_eq!(winners, 1);
		for result in results.iter().filter(|r| r.is_err()) {
			let err = result.as_ref().unwrap_err();
			assert_eq!(err.conflict_status(), Some("in_delivery"));
		}
	}

	#[tokio::test]
	async fn test_failed_payment_leaves_order_then_retry_succeeds() {
		let f = fixture(
			ScriptedPayment::failing_once(PaymentError::Network("timeout".into())),
			RecordingNotifier::default(),
		);
		let order = ready(&f.orders, "o1").await;
		f.handler.accept("s1", "o1", "d1").await.unwrap();

		let err = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Number(42.5)))
			.await
			.unwrap_err();
		assert!(matches!(err, DispatchError::UpstreamUnavailable(_)));
		let still_there = f.orders.require(&order.key()).await.unwrap();
		assert!(still_there.is_claimed_by("d1"));
		assert!(f.mails.lock().unwrap().is_empty());

		let done = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Number(42.5)))
			.await
			.unwrap();
		assert_eq!(done.payment.payment_id, "PAY-2");
		assert_eq!(done.payment.amount, Decimal::new(425, 1));
		assert_eq!(done.payment.currency, "ILS");
		assert!(f.orders.get(&order.key()).await.unwrap().is_none());
		assert_eq!(f.payments.lock().unwrap().len(), 2);

		let again = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Number(42.5)))
			.await;
		assert!(matches!(again, Err(DispatchError::NotFound(_))));
		assert_eq!(f.payments.lock().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_finish_requires_claiming_driver() {
		let f = fixture(ScriptedPayment::default(), RecordingNotifier::default());
		ready(&f.orders, "o1").await;

		// Not yet claimed
		let err = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Number(10.0)))
			.await
			.unwrap_err();
		assert_eq!(err.conflict_status(), Some("ready"));

		f.handler.accept("s1", "o1", "d1").await.unwrap();
		let err = f
			.handler
			.finish(finish_request("o1", "intruder", PriceInput::Number(10.0)))
			.await
			.unwrap_err();
		assert_eq!(err.conflict_status(), Some("in_delivery"));
		assert!(f.payments.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_invalid_price_makes_no_payment() {
		let f = fixture(ScriptedPayment::default(), RecordingNotifier::default());
		let order = ready(&f.orders, "o1").await;
		f.handler.accept("s1", "o1", "d1").await.unwrap();

		let err = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Text("-5".into())))
			.await
			.unwrap_err();
		assert!(matches!(err, DispatchError::InvalidArgument(_)));
		assert!(f.payments.lock().unwrap().is_empty());
		assert!(f.orders.get(&order.key()).await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_payment_request_and_customer_mail() {
		let f = fixture(ScriptedPayment::default(), RecordingNotifier::default());
		ready(&f.orders, "o1").await;
		f.handler.accept("s1", "o1", "d1").await.unwrap();

		let mut request = finish_request("o1", "d1", PriceInput::Text("1,250.5".into()));
		request.customer_email = Some("override@example.com".into());
		let done = f.handler.finish(request).await.unwrap();
		assert!(done.email_sent);

		let payments = f.payments.lock().unwrap();
		assert_eq!(payments[0].payee_contact, "driver@example.com");
		assert_eq!(payments[0].store_id, "s1");
		assert_eq!(payments[0].currency, "ILS");

		let mails = f.mails.lock().unwrap();
		assert_eq!(mails.len(), 1);
		assert_eq!(mails[0].customer_contact, "override@example.com");
		assert_eq!(mails[0].customer_name, "Dana");
		assert_eq!(mails[0].order_id, "PAY-1");
		assert_eq!(
			mails[0].body,
			"prepal order\nquantity: 1\nprice: 1250.5 ILS\n\npayment link: https://pay.example/approve/PAY-1"
		);
	}

	#[tokio::test]
	async fn test_mail_failure_does_not_undo_delivery() {
		let f = fixture(
			ScriptedPayment::default(),
			RecordingNotifier {
				fail: true,
				..Default::default()
			},
		);
		let order = ready(&f.orders, "o1").await;
		f.handler.accept("s1", "o1", "d1").await.unwrap();

		let done = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Number(20.0)))
			.await
			.unwrap();
		assert!(!done.email_sent);
		assert!(f.orders.get(&order.key()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_mail_skipped_without_address() {
		let f = fixture(ScriptedPayment::default(), RecordingNotifier::default());
		let mut order = sample_order("s1", "o1", "c1");
		order.customer_email = String::new();
		f.orders.insert(&order).await.unwrap();
		f.orders
			.set_status(&order.key(), OrderStatus::Ready)
			.await
			.unwrap();
		f.handler.accept("s1", "o1", "d1").await.unwrap();

		let done = f
			.handler
			.finish(finish_request("o1", "d1", PriceInput::Number(20.0)))
			.await
			.unwrap();
		assert!(!done.email_sent);
		assert!(f.mails.lock().unwrap().is_empty());
	}
}
