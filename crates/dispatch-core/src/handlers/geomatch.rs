//! Nearby-order matching for drivers.
//!
//! Each call scans a bounded number of order pages, resolves the distinct
//! owning stores through the store directory with a fixed number of lookups
//! in flight, and keeps the answers in a cache that lives for that call only.
//! A store whose lookup fails, times out or has no coordinates is left out of
//! the result; it never fails the call.

use crate::error::DispatchError;
use crate::state::OrderStore;
use dispatch_config::GeomatchConfig;
use dispatch_directory::DirectoryService;
use dispatch_types::{round_to_cents, Coordinates, NearbyOrder, NearbyOrdersResponse, OrderStatus};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub struct GeomatchHandler {
	orders: Arc<OrderStore>,
	directory: Arc<DirectoryService>,
	config: GeomatchConfig,
}

impl GeomatchHandler {
	pub fn new(
		orders: Arc<OrderStore>,
		directory: Arc<DirectoryService>,
		config: GeomatchConfig,
	) -> Self {
		Self {
			orders,
			directory,
			config,
		}
	}

	/// Effective search radius for a caller-supplied value.
	fn radius(&self, requested: Option<f64>) -> Result<f64, DispatchError> {
		match requested {
			None => Ok(self.config.default_radius_km.min(self.config.max_radius_km)),
			Some(r) if !r.is_finite() || r < 0.0 => Err(DispatchError::InvalidArgument(format!(
				"distance_km must be a non-negative number, got {}",
				r
			))),
			Some(r) => Ok(r.min(self.config.max_radius_km)),
		}
	}

	/// Ready orders whose store lies within the radius, nearest first.
	#[instrument(skip_all, fields(lat = %lat, lng = %lng))]
	pub async fn find_nearby(
		&self,
		lat: f64,
		lng: f64,
		radius_km: Option<f64>,
	) -> Result<NearbyOrdersResponse, DispatchError> {
		let driver = Coordinates::new(lat, lng)
			.map_err(|e| DispatchError::InvalidArgument(e.to_string()))?;
		let radius_km = self.radius(radius_km)?;

		let mut cache: HashMap<String, Option<Coordinates>> = HashMap::new();
		let mut matches = Vec::new();
		let mut cursor: Option<String> = None;
		let mut scanned = 0;

		for _ in 0..self.config.max_pages {
			let page = self
				.orders
				.page(cursor.as_deref(), self.config.page_size)
				.await?;
			scanned += page.items.len();

			let ready: Vec<_> = page
				.items
				.into_iter()
				.map(|(_, order)| order)
				.filter(|order| order.status == OrderStatus::Ready)
				.collect();

			let mut unresolved: Vec<String> = ready
				.iter()
				.filter(|order| !cache.contains_key(&order.store_id))
				.map(|order| order.store_id.clone())
				.collect();
			unresolved.sort();
			unresolved.dedup();
			cache.extend(self.resolve(unresolved).await);

			for order in &ready {
				let Some(Some(store)) = cache.get(&order.store_id) else {
					continue;
				};
				let distance = driver.distance_km(store);
				if distance <= radius_km {
					matches.push(NearbyOrder::new(order, store, round_to_cents(distance)));
				}
			}

			match page.next_cursor {
				Some(next) => cursor = Some(next),
				None => break,
			}
		}

		matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
		tracing::debug!(
			scanned,
			stores = cache.len(),
			matched = matches.len(),
			radius_km,
			"Nearby scan complete"
		);

		Ok(NearbyOrdersResponse {
			count: matches.len(),
			orders: matches,
		})
	}

	/// Looks up coordinates for each store with bounded concurrency.
	async fn resolve(&self, store_ids: Vec<String>) -> Vec<(String, Option<Coordinates>)> {
		let timeout = Duration::from_millis(self.config.lookup_timeout_ms);
		stream::iter(store_ids)
			.map(|store_id| async move {
				let result =
					tokio::time::timeout(timeout, self.directory.get_coordinates(&store_id)).await;
				let coordinates = match result {
					Ok(Ok(coordinates)) => {
						if coordinates.is_none() {
							tracing::debug!(store_id = %store_id, "Store has no coordinates");
						}
						coordinates
					},
					Ok(Err(e)) => {
						tracing::warn!(store_id = %store_id, error = %e, "Store lookup failed");
						None
					},
					Err(_) => {
						tracing::warn!(store_id = %store_id, "Store lookup timed out");
						None
					},
				};
				(store_id, coordinates)
			})
			.buffer_unordered(self.config.lookup_concurrency.max(1))
			.collect()
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{memory_storage, sample_order, FixedDirectory};
	use dispatch_types::EARTH_RADIUS_KM;
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Longitude on the equator that lies `km` east of (0, 0).
	fn lng_at(km: f64) -> f64 {
		km / (EARTH_RADIUS_KM * std::f64::consts::PI / 180.0)
	}

	async fn ready_order(orders: &OrderStore, store_id: &str, order_id: &str) {
		let order = sample_order(store_id, order_id, "c1");
		orders.insert(&order).await.unwrap();
		orders
			.set_status(&order.key(), OrderStatus::Ready)
			.await
			.unwrap();
	}

	fn handler(
		orders: Arc<OrderStore>,
		directory: FixedDirectory,
		config: GeomatchConfig,
	) -> GeomatchHandler {
		GeomatchHandler::new(
			orders,
			Arc::new(DirectoryService::new(Box::new(directory))),
			config,
		)
	}

	#[tokio::test]
	async fn test_radius_boundary() {
		let orders = Arc::new(OrderStore::new(memory_storage(), false));
		ready_order(&orders, "near", "o1").await;
		ready_order(&orders, "edge", "o2").await;
		ready_order(&orders, "far", "o3").await;

		let directory = FixedDirectory::default()
			.with_store("near", 0.0, lng_at(5.0))
			.with_store("edge", 0.0, lng_at(9.9))
			.with_store("far", 0.0, lng_at(10.1));
		let geomatch = handler(orders, directory, GeomatchConfig::default());

		let result = geomatch.find_nearby(0.0, 0.0, Some(10.0)).await.unwrap();
		assert_eq!(result.count, 2);
		assert_eq!(result.orders[0].store_id, "near");
		assert!((result.orders[0].distance_km - 5.0).abs() <= 0.01);
		assert_eq!(result.orders[1].store_id, "edge");
		assert!((result.orders[1].distance_km - 9.9).abs() <= 0.01);
	}

	#[tokio::test]
	async fn test_only_ready_orders_match() {
		let orders = Arc::new(OrderStore::new(memory_storage(), false));
		ready_order(&orders, "s1", "o1").await;
		orders.insert(&sample_order("s1", "o2", "c2")).await.unwrap();

		let directory = FixedDirectory::default().with_store("s1", 32.08, 34.78);
		let geomatch = handler(orders, directory, GeomatchConfig::default());

		let result = geomatch.find_nearby(32.08, 34.78, None).await.unwrap();
		assert_eq!(result.count, 1);
		assert_eq!(result.orders[0].order_id, "o1");
		assert_eq!(result.orders[0].distance_km, 0.0);
		assert_eq!(result.orders[0].store_coordinates, "32.08,34.78");
	}

	#[tokio::test]
	async fn test_store_lookups_are_cached_per_call() {
		let orders = Arc::new(OrderStore::new(memory_storage(), false));
		for id in ["o1", "o2", "o3", "o4"] {
			ready_order(&orders, "s1", id).await;
		}
		let calls = Arc::new(AtomicUsize::new(0));
		let directory = FixedDirectory {
			calls: calls.clone(),
			..Default::default()
		}
		.with_store("s1", 0.0, 0.0);

		// Two orders per page forces the second page to reuse the cache
		let config = GeomatchConfig {
			page_size: 2,
			..Default::default()
		};
		let geomatch = handler(orders, directory, config);

		let result = geomatch.find_nearby(0.0, 0.0, Some(1.0)).await.unwrap();
		assert_eq!(result.count, 4);
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		geomatch.find_nearby(0.0, 0.0, Some(1.0)).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_failed_and_slow_stores_are_excluded() {
		let orders = Arc::new(OrderStore::new(memory_storage(), false));
		ready_order(&orders, "ok", "o1").await;
		ready_order(&orders, "broken", "o2").await;
		ready_order(&orders, "slow", "o3").await;
		ready_order(&orders, "unknown", "o4").await;

		let directory = FixedDirectory {
			failing: vec!["broken".into()],
			slow: vec!["slow".into()],
			delay: Duration::from_millis(500),
			..Default::default()
		}
		.with_store("ok", 0.0, 0.0)
		.with_store("broken", 0.0, 0.0)
		.with_store("slow", 0.0, 0.0);

		let config = GeomatchConfig {
			lookup_timeout_ms: 50,
			..Default::default()
		};
		let geomatch = handler(orders, directory, config);

		let result = geomatch.find_nearby(0.0, 0.0, Some(1.0)).await.unwrap();
		assert_eq!(result.count, 1);
		assert_eq!(result.orders[0].store_id, "ok");
	}

	#[tokio::test]
	async fn test_page_cap_bounds_the_scan() {
		let orders = Arc::new(OrderStore::new(memory_storage(), false));
		for id in ["o1", "o2", "o3", "o4", "o5"] {
			ready_order(&orders, "s1", id).await;
		}
		let directory = FixedDirectory::default().with_store("s1", 0.0, 0.0);
		let config = GeomatchConfig {
			page_size: 2,
			max_pages: 2,
			..Default::default()
		};
		let geomatch = handler(orders, directory, config);

		let result = geomatch.find_nearby(0.0, 0.0, Some(1.0)).await.unwrap();
		assert_eq!(result.count, 4);
	}

	#[tokio::test]
	async fn test_radius_validation_and_clamp() {
		let orders = Arc::new(OrderStore::new(memory_storage(), false));
		ready_order(&orders, "s1", "o1").await;
		let directory = FixedDirectory::default().with_store("s1", 0.0, lng_at(150.0));
		let geomatch = handler(orders, directory, GeomatchConfig::default());

		// Clamped to the 100 km maximum
		let result = geomatch.find_nearby(0.0, 0.0, Some(500.0)).await.unwrap();
		assert_eq!(result.count, 0);

		for bad in [-1.0, f64::NAN, f64::INFINITY] {
			assert!(matches!(
				geomatch.find_nearby(0.0, 0.0, Some(bad)).await,
				Err(DispatchError::InvalidArgument(_))
			));
		}
		assert!(matches!(
			geomatch.find_nearby(91.0, 0.0, None).await,
			Err(DispatchError::InvalidArgument(_))
		));
		assert!(matches!(
			geomatch.find_nearby(0.0, -181.0, None).await,
			Err(DispatchError::InvalidArgument(_))
		));
	}
}
