//! Test doubles for the transport seam.
//!
//! [`FakeConnector`] hands out [`FakeConnection`]s and lets a test drive each
//! connection's lifecycle events by sender name, without a browser or bridge.
//!
//! ```ignore
//! let connector = FakeConnector::new();
//! let manager = SessionManager::new(SessionStore::new(), connector.clone(), config);
//! manager.open(&sender).await?;
//! connector.emit("Yuval", ConnectionEvent::PairingCode("2@abc".into()));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::transport::{Connection, ConnectionEvent, Connector, EventStream, TransportError};
use crate::types::{Identity, MessageId, SenderId};

/// A message accepted by a [`FakeConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
	pub phone: String,
	pub body: String,
}

struct FailurePlan {
	error: TransportError,
	/// `None` fails every attempt.
	remaining: Option<usize>,
}

/// Scriptable in-memory connection.
#[derive(Default)]
pub struct FakeConnection {
	identity: Mutex<Option<Identity>>,
	attempts: Mutex<Vec<String>>,
	sent: Mutex<Vec<SentMessage>>,
	failures: Mutex<HashMap<String, FailurePlan>>,
	close_calls: AtomicUsize,
	close_error: Mutex<Option<TransportError>>,
}

impl FakeConnection {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn set_identity(&self, identity: Option<Identity>) {
		*self.identity.lock() = identity;
	}

	/// Every send to `phone` fails with `error`.
	pub fn fail_always(&self, phone: &str, error: TransportError) {
		self.failures.lock().insert(phone.to_string(), FailurePlan { error, remaining: None });
	}

	/// The next `times` sends to `phone` fail with `error`.
	pub fn fail_times(&self, phone: &str, times: usize, error: TransportError) {
		self.failures.lock().insert(
			phone.to_string(),
			FailurePlan {
				error,
				remaining: Some(times),
			},
		);
	}

	/// `close` reports `error` (after closing).
	pub fn fail_close(&self, error: TransportError) {
		*self.close_error.lock() = Some(error);
	}

	/// Phones of every send attempt, failed ones included.
	pub fn attempts(&self) -> Vec<String> {
		self.attempts.lock().clone()
	}

	pub fn sent(&self) -> Vec<SentMessage> {
		self.sent.lock().clone()
	}

	pub fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.close_calls() > 0
	}
}

#[async_trait]
impl Connection for FakeConnection {
	fn identity(&self) -> Option<Identity> {
		self.identity.lock().clone()
	}

	async fn send_text(&self, phone: &str, body: &str) -> Result<MessageId, TransportError> {
		self.attempts.lock().push(phone.to_string());
		if self.is_closed() {
			return Err(TransportError::closed("connection closed"));
		}

		if let Some(plan) = self.failures.lock().get_mut(phone) {
			match &mut plan.remaining {
				None => return Err(plan.error.clone()),
				Some(0) => {}
				Some(n) => {
					*n -= 1;
					return Err(plan.error.clone());
				}
			}
		}

		let mut sent = self.sent.lock();
		sent.push(SentMessage {
			phone: phone.to_string(),
			body: body.to_string(),
		});
		Ok(MessageId(format!("true_{phone}@c.us_{}", sent.len())))
	}

	async fn close(&self) -> Result<(), TransportError> {
		self.close_calls.fetch_add(1, Ordering::SeqCst);
		*self.identity.lock() = None;
		match self.close_error.lock().take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

struct FakeLink {
	connection: Arc<FakeConnection>,
	events: mpsc::UnboundedSender<ConnectionEvent>,
}

/// Connector counting constructions and keeping the latest link per sender.
#[derive(Default)]
pub struct FakeConnector {
	connects: AtomicUsize,
	links: Mutex<HashMap<String, FakeLink>>,
	connect_delay: Mutex<Duration>,
	connect_error: Mutex<Option<TransportError>>,
	stored_credentials: Mutex<Option<Identity>>,
	credential_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeConnector {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// New connections behave as if valid credentials were on disk: they
	/// become ready as `identity` without issuing a pairing code.
	pub fn with_stored_credentials(identity: Identity) -> Arc<Self> {
		let connector = Self::default();
		*connector.stored_credentials.lock() = Some(identity);
		Arc::new(connector)
	}

	pub fn set_connect_delay(&self, delay: Duration) {
		*self.connect_delay.lock() = delay;
	}

	/// The next `connect` fails with `error`.
	pub fn fail_next_connect(&self, error: TransportError) {
		*self.connect_error.lock() = Some(error);
	}

	pub fn connect_count(&self) -> usize {
		self.connects.load(Ordering::SeqCst)
	}

	pub fn credential_dirs(&self) -> Vec<PathBuf> {
		self.credential_dirs.lock().clone()
	}

	/// The most recent connection built for `sender`.
	pub fn connection(&self, sender: &str) -> Option<Arc<FakeConnection>> {
		self.links.lock().get(sender).map(|link| Arc::clone(&link.connection))
	}

	/// Deliver `event` on the latest connection for `sender`.
	///
	/// Identity is updated before the event is sent, the way a real transport
	/// populates it before announcing readiness.
	pub fn emit(&self, sender: &str, event: ConnectionEvent) -> bool {
		let links = self.links.lock();
		let Some(link) = links.get(sender) else {
			return false;
		};
		match &event {
			ConnectionEvent::Ready(identity) => link.connection.set_identity(Some(identity.clone())),
			ConnectionEvent::AuthFailure(_) | ConnectionEvent::Disconnected(_) => link.connection.set_identity(None),
			ConnectionEvent::PairingCode(_) | ConnectionEvent::Authenticated => {}
		}
		link.events.send(event).is_ok()
	}
}

#[async_trait]
impl Connector for FakeConnector {
	async fn connect(&self, sender: &SenderId, credentials: &Path) -> Result<(Arc<dyn Connection>, EventStream), TransportError> {
		self.connects.fetch_add(1, Ordering::SeqCst);

		let delay = *self.connect_delay.lock();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		if let Some(err) = self.connect_error.lock().take() {
			return Err(err);
		}

		self.credential_dirs.lock().push(credentials.to_path_buf());
		let connection = FakeConnection::new();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		let stored = self.stored_credentials.lock().clone();
		if let Some(identity) = stored {
			connection.set_identity(Some(identity.clone()));
			let _ = events_tx.send(ConnectionEvent::Authenticated);
			let _ = events_tx.send(ConnectionEvent::Ready(identity));
		}

		self.links.lock().insert(
			sender.as_str().to_string(),
			FakeLink {
				connection: Arc::clone(&connection),
				events: events_tx,
			},
		);
		Ok((connection as Arc<dyn Connection>, events_rx))
	}
}
