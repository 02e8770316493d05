//! In-process outbound queues for channels held by this instance.
//!
//! Several instances may share one connection registry. A registered id the
//! hub never attached belongs to another instance and reports
//! [`PushError::NotHeld`] rather than [`PushError::Closed`].

use crate::push::{PushError, PushTransport};
use async_trait::async_trait;
use dashmap::DashMap;
use dispatch_types::PushEvent;
use tokio::sync::mpsc;

/// Outbound queue per attached channel.
///
/// The socket task owning a channel attaches on connect, drains the
/// receiver into its socket and detaches on close.
#[derive(Default)]
pub struct ChannelHub {
	channels: DashMap<String, mpsc::UnboundedSender<PushEvent>>,
}

impl ChannelHub {
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens the outbound queue for a channel, replacing any previous one.
	pub fn attach(&self, connection_id: &str) -> mpsc::UnboundedReceiver<PushEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.channels.insert(connection_id.to_string(), tx);
		rx
	}

	pub fn detach(&self, connection_id: &str) {
		self.channels.remove(connection_id);
	}

	/// Ids of all attached channels.
	pub fn connection_ids(&self) -> Vec<String> {
		self.channels.iter().map(|entry| entry.key().clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.channels.len()
	}

	pub fn is_empty(&self) -> bool {
		self.channels.is_empty()
	}
}

#[async_trait]
impl PushTransport for ChannelHub {
	async fn deliver(&self, connection_id: &str, event: &PushEvent) -> Result<(), PushError> {
		// Clone the sender so no map guard is held while sending
		let sender = self
			.channels
			.get(connection_id)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| PushError::NotHeld(connection_id.to_string()))?;

		sender.send(event.clone()).map_err(|_| {
			self.channels.remove(connection_id);
			PushError::Closed(connection_id.to_string())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_deliver_to_attached_channel() {
		let hub = ChannelHub::new();
		let mut rx = hub.attach("c-1");

		hub.deliver("c-1", &PushEvent::OrderCount { count: 4 })
			.await
			.unwrap();
		assert_eq!(rx.recv().await, Some(PushEvent::OrderCount { count: 4 }));
	}

	#[tokio::test]
	async fn test_unknown_channel_is_not_held_and_dropped_one_is_closed() {
		let hub = ChannelHub::new();
		let event = PushEvent::OrderCount { count: 0 };
		assert!(matches!(
			hub.deliver("nobody", &event).await,
			Err(PushError::NotHeld(_))
		));

		let rx = hub.attach("c-1");
		drop(rx);
		assert!(matches!(
			hub.deliver("c-1", &event).await,
			Err(PushError::Closed(_))
		));
		assert!(hub.is_empty());
	}
}
