//! Shared fixtures and collaborator doubles for engine tests.

use async_trait::async_trait;
use chrono::Utc;
use dispatch_directory::{DirectoryError, StoreDirectoryInterface};
use dispatch_notify::{NotificationInterface, NotifyError, OrderEmail};
use dispatch_payment::{PaymentError, PaymentInterface, PaymentReceipt, PaymentRequest};
use dispatch_storage::{implementations::memory::MemoryStorage, StorageService};
use dispatch_types::{ConfigSchema, Coordinates, LineItem, NewOrder, Order, OrderStatus};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

pub fn items() -> Vec<LineItem> {
	vec!["apples:6".parse().unwrap(), "tahini:1".parse().unwrap()]
}

pub fn sample_order(store_id: &str, order_id: &str, customer_id: &str) -> Order {
	Order {
		store_id: store_id.to_string(),
		order_id: order_id.to_string(),
		customer_id: customer_id.to_string(),
		customer_name: "Dana".to_string(),
		customer_email: "dana@example.com".to_string(),
		customer_location: "Herzl 1, Tel Aviv".to_string(),
		total_price: Decimal::new(4250, 2),
		items: items(),
		status: OrderStatus::Pending,
		driver_id: None,
		delivery_started_at: None,
		created_at: Utc::now(),
	}
}

pub fn new_order(store_id: &str, order_id: &str, customer_id: &str) -> NewOrder {
	NewOrder {
		store_id: store_id.to_string(),
		order_id: Some(order_id.to_string()),
		customer_id: customer_id.to_string(),
		customer_name: "Dana".to_string(),
		customer_email: "dana@example.com".to_string(),
		customer_location: "Herzl 1, Tel Aviv".to_string(),
		total_price: Decimal::new(4250, 2),
		items: items(),
	}
}

/// Directory with fixed answers, failures and an optional delay.
#[derive(Default)]
pub struct FixedDirectory {
	pub stores: HashMap<String, Coordinates>,
	pub failing: Vec<String>,
	pub slow: Vec<String>,
	pub delay: Duration,
	pub calls: Arc<AtomicUsize>,
}

impl FixedDirectory {
	pub fn with_store(mut self, store_id: &str, lat: f64, lng: f64) -> Self {
		self.stores
			.insert(store_id.to_string(), Coordinates::new(lat, lng).unwrap());
		self
	}
}

#[async_trait]
impl StoreDirectoryInterface for FixedDirectory {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(dispatch_directory::implementations::table::StaticDirectorySchema)
	}

	async fn get_coordinates(&self, store_id: &str) -> Result<Option<Coordinates>, DirectoryError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.slow.iter().any(|s| s == store_id) {
			tokio::time::sleep(self.delay).await;
		}
		if self.failing.iter().any(|s| s == store_id) {
			return Err(DirectoryError::Network("connection refused".into()));
		}
		Ok(self.stores.get(store_id).copied())
	}
}

/// Payment provider that replays scripted outcomes, then succeeds.
#[derive(Default)]
pub struct ScriptedPayment {
	pub failures: Mutex<VecDeque<PaymentError>>,
	pub requests: Arc<Mutex<Vec<PaymentRequest>>>,
}

impl ScriptedPayment {
	pub fn failing_once(error: PaymentError) -> Self {
		Self {
			failures: Mutex::new(VecDeque::from([error])),
			..Default::default()
		}
	}

	pub fn request_count(&self) -> usize {
		self.requests.lock().unwrap().len()
	}
}

#[async_trait]
impl PaymentInterface for ScriptedPayment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(dispatch_payment::implementations::mock::MockPaymentSchema)
	}

	async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt, PaymentError> {
		self.requests.lock().unwrap().push(request.clone());
		if let Some(error) = self.failures.lock().unwrap().pop_front() {
			return Err(error);
		}
		let n = self.request_count();
		Ok(PaymentReceipt {
			payment_id: format!("PAY-{}", n),
			approval_url: format!("https://pay.example/approve/PAY-{}", n),
		})
	}
}

/// Notifier that records mails and optionally fails every send.
#[derive(Default)]
pub struct RecordingNotifier {
	pub fail: bool,
	pub sent: Arc<Mutex<Vec<OrderEmail>>>,
}

#[async_trait]
impl NotificationInterface for RecordingNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(dispatch_notify::implementations::log::LogNotifierSchema)
	}

	async fn send_order_email(&self, email: &OrderEmail) -> Result<(), NotifyError> {
		if self.fail {
			return Err(NotifyError::Network("smtp relay down".into()));
		}
		self.sent.lock().unwrap().push(email.clone());
		Ok(())
	}
}

/// Engine over memory storage with a store `s1` at (32.08, 34.78).
pub fn engine() -> crate::DispatchEngine {
	engine_with(ScriptedPayment::default(), RecordingNotifier::default())
}

pub fn engine_with(payment: ScriptedPayment, notifier: RecordingNotifier) -> crate::DispatchEngine {
	engine_over(memory_storage(), payment, notifier)
}

/// Engine over the given storage, so several instances can share it.
pub fn engine_over(
	storage: Arc<StorageService>,
	payment: ScriptedPayment,
	notifier: RecordingNotifier,
) -> crate::DispatchEngine {
	let config = dispatch_config::ConfigBuilder::new()
		.store("s1", 32.08, 34.78)
		.build();
	let directory = FixedDirectory::default().with_store("s1", 32.08, 34.78);
	crate::DispatchEngine::new(
		config,
		storage,
		Arc::new(dispatch_directory::DirectoryService::new(Box::new(directory))),
		Arc::new(dispatch_payment::PaymentService::new(Box::new(payment), "ILS")),
		Arc::new(dispatch_notify::NotificationService::new(Box::new(notifier))),
	)
}
