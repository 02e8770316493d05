//! Push channel registration records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live push channel opened by a store client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
	/// Opaque id assigned when the channel was accepted.
	pub connection_id: String,
	/// Store the channel listens for.
	pub store_id: String,
	pub connected_at: DateTime<Utc>,
}

impl Connection {
	pub fn new(connection_id: impl Into<String>, store_id: impl Into<String>) -> Self {
		Self {
			connection_id: connection_id.into(),
			store_id: store_id.into(),
			connected_at: Utc::now(),
		}
	}
}
