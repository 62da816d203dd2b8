//! Connection lifecycle: open, pairing, readiness, teardown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::state::{Ending, SessionEvent};
use super::store::{CodeWait, Reservation, SessionHandle, SessionStatus, SessionStore, Signal};
use crate::error::{InviteError, Result};
use crate::transport::{Connection, ConnectionEvent, Connector, EventStream, TransportError, TransportErrorKind};
use crate::types::{MessageId, SenderId};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(750);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct ManagerConfig {
	/// Parent of the per-sender credential directories.
	pub credentials_root: PathBuf,
	/// Upper bound between readiness re-checks while waiting; clamped to
	/// 500..=1000 ms.
	pub poll_interval: Duration,
}

impl ManagerConfig {
	pub fn new(credentials_root: impl Into<PathBuf>) -> Self {
		Self {
			credentials_root: credentials_root.into(),
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}
}

/// Result of asking for a pairing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
	/// Already linked; nothing to scan.
	Ready,
	PairingCode(String),
	/// Neither a code nor readiness yet. Normal while stored credentials are
	/// being checked; poll the status.
	Pending,
}

/// Owns one connection per sender.
#[derive(Clone)]
pub struct SessionManager {
	store: SessionStore,
	connector: Arc<dyn Connector>,
	credentials_root: Arc<PathBuf>,
	poll_interval: Duration,
}

impl SessionManager {
	pub fn new(store: SessionStore, connector: Arc<dyn Connector>, config: ManagerConfig) -> Self {
		Self {
			store,
			connector,
			credentials_root: Arc::new(config.credentials_root),
			poll_interval: config.poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL),
		}
	}

	pub fn store(&self) -> &SessionStore {
		&self.store
	}

	/// Directory holding `sender`'s persisted credentials.
	pub fn credential_dir(&self, sender: &SenderId) -> PathBuf {
		self.credentials_root.join(sender.credential_dir_name())
	}

	pub fn status(&self, sender: &SenderId) -> SessionStatus {
		self.store.status(sender)
	}

	pub fn pairing_code(&self, sender: &SenderId) -> Option<String> {
		self.store.pairing_code(sender)
	}

	/// Open the sender's session, or attach to the one already open or opening.
	///
	/// Only the caller that creates the session constructs a connection;
	/// everyone else gets a handle to the same session immediately, possibly
	/// before its connection exists.
	///
	/// # Errors
	///
	/// Connector failures are returned to the creating caller and end the
	/// session for anyone attached to it. They are not retried.
	pub async fn open(&self, sender: &SenderId) -> Result<SessionHandle> {
		let generation = match self.store.reserve(sender) {
			Reservation::Existing(handle) => {
				debug!(target = "invite.session", sender = %sender, generation = handle.generation(), "attached to existing session");
				return Ok(handle);
			}
			Reservation::Created { generation } => generation,
		};

		info!(target = "invite.session", sender = %sender, generation, "opening session");

		// Connect on a task so a dropped caller cannot strand the reservation.
		let task = tokio::spawn(self.clone().connect(sender.clone(), generation));
		match task.await {
			Ok(result) => result,
			Err(e) => {
				self.store.end(sender, Some(generation), Ending::Closed("connect task aborted".to_string()));
				Err(InviteError::SessionClosed {
					sender: sender.to_string(),
					reason: format!("connect task failed: {e}"),
				})
			}
		}
	}

	async fn connect(self, sender: SenderId, generation: u64) -> Result<SessionHandle> {
		let credentials = self.credential_dir(&sender);
		let (connection, events) = match self.connector.connect(&sender, &credentials).await {
			Ok(pair) => pair,
			Err(e) => {
				warn!(target = "invite.session", sender = %sender, error = %e, "failed to start connection");
				self.store.end(&sender, Some(generation), Ending::Closed(e.to_string()));
				return Err(e.into());
			}
		};

		let Some(handle) = self.store.attach(&sender, generation, Arc::clone(&connection)) else {
			debug!(target = "invite.session", sender = %sender, "session removed while connecting");
			close_quietly(&sender, connection.as_ref()).await;
			return Err(InviteError::SessionClosed {
				sender: sender.to_string(),
				reason: "session cleared while connecting".to_string(),
			});
		};

		tokio::spawn(self.pump(sender, generation, events));
		Ok(handle)
	}

	async fn pump(self, sender: SenderId, generation: u64, mut events: EventStream) {
		while let Some(event) = events.recv().await {
			if !self.handle_event(&sender, generation, event).await {
				return;
			}
		}
		self.handle_event(&sender, generation, ConnectionEvent::Disconnected("event stream ended".to_string()))
			.await;
	}

	/// Returns `false` once the session is gone and pumping should stop.
	async fn handle_event(&self, sender: &SenderId, generation: u64, event: ConnectionEvent) -> bool {
		let event = match event {
			ConnectionEvent::PairingCode(code) => {
				info!(target = "invite.session", sender = %sender, "pairing code issued");
				SessionEvent::PairingCode(code)
			}
			ConnectionEvent::Authenticated => {
				info!(target = "invite.session", sender = %sender, "authenticated");
				SessionEvent::Authenticated
			}
			ConnectionEvent::Ready(identity) => {
				info!(target = "invite.session", sender = %sender, account = %identity.id, "session ready");
				SessionEvent::Ready
			}
			ConnectionEvent::AuthFailure(reason) => {
				warn!(target = "invite.session", sender = %sender, reason = %reason, "authentication failed");
				SessionEvent::AuthFailure(reason)
			}
			ConnectionEvent::Disconnected(reason) => {
				info!(target = "invite.session", sender = %sender, reason = %reason, "disconnected");
				SessionEvent::Disconnected(reason)
			}
		};

		let Some(applied) = self.store.apply(sender, generation, event) else {
			debug!(target = "invite.session", sender = %sender, generation, "event for replaced session ignored");
			return false;
		};
		debug!(target = "invite.session", sender = %sender, state = ?applied.next, "session transition");

		match applied.evicted {
			Some(connection) => {
				close_quietly(sender, connection.as_ref()).await;
				false
			}
			None => !applied.next.is_terminal(),
		}
	}

	/// Wait until the sender's connection exposes an identity.
	///
	/// Opens the session if needed. `None` waits without a deadline.
	///
	/// # Errors
	///
	/// `Timeout` when `max_wait` passes, `AuthFailure` when credentials are
	/// rejected, `SessionClosed` when the session ends while waiting.
	pub async fn wait_until_ready(&self, sender: &SenderId, max_wait: Option<Duration>) -> Result<SessionHandle> {
		let wait = self.wait_ready(sender);
		match max_wait {
			None => wait.await,
			Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| InviteError::Timeout {
				ms: limit.as_millis() as u64,
				condition: format!("session {sender} to become ready"),
			})?,
		}
	}

	async fn wait_ready(&self, sender: &SenderId) -> Result<SessionHandle> {
		let mut signal = match self.store.subscribe(sender) {
			Some(rx) => rx,
			None => {
				self.open(sender).await?;
				self.store.subscribe(sender).ok_or_else(|| InviteError::SessionClosed {
					sender: sender.to_string(),
					reason: "session ended while opening".to_string(),
				})?
			}
		};

		loop {
			if let Some(handle) = self.store.ready_handle(sender) {
				return Ok(handle);
			}
			if let Some(err) = ended(sender, &signal.borrow_and_update()) {
				return Err(err);
			}

			tokio::select! {
				changed = signal.changed() => {
					if changed.is_err() {
						return Err(ended(sender, &signal.borrow()).unwrap_or_else(|| InviteError::SessionClosed {
							sender: sender.to_string(),
							reason: "session removed".to_string(),
						}));
					}
				}
				_ = tokio::time::sleep(self.poll_interval) => {}
			}
		}
	}

	/// Open the session and return a pairing code if one shows up within
	/// `wait`.
	pub async fn request_pairing(&self, sender: &SenderId, wait: Duration) -> Result<PairingOutcome> {
		self.open(sender).await?;

		let waiter = match self.store.code_or_waiter(sender) {
			CodeWait::Ready => return Ok(PairingOutcome::Ready),
			CodeWait::Code(code) => return Ok(PairingOutcome::PairingCode(code)),
			CodeWait::Waiting(rx) => rx,
			CodeWait::Missing => {
				return Err(InviteError::SessionClosed {
					sender: sender.to_string(),
					reason: "session ended before pairing".to_string(),
				});
			}
		};

		if let Ok(Ok(code)) = tokio::time::timeout(wait, waiter).await {
			return Ok(PairingOutcome::PairingCode(code));
		}

		// Waiter dropped (ready or ended) or nothing arrived in time.
		if !self.store.contains(sender) {
			return Err(InviteError::SessionClosed {
				sender: sender.to_string(),
				reason: "session ended before pairing".to_string(),
			});
		}
		let status = self.store.status(sender);
		Ok(match (status.ready, status.pairing_code) {
			(true, _) => PairingOutcome::Ready,
			(false, Some(code)) => PairingOutcome::PairingCode(code),
			(false, None) => PairingOutcome::Pending,
		})
	}

	/// Tear down the sender's connection and delete its stored credentials.
	///
	/// The next `open` starts from scratch and needs a fresh pairing code.
	/// Teardown errors from the connection are logged and ignored.
	pub async fn clear_session(&self, sender: &SenderId) -> Result<()> {
		if let Some(Some(connection)) = self.store.end(sender, None, Ending::Closed("session cleared".to_string())) {
			close_quietly(sender, connection.as_ref()).await;
		}

		let dir = self.credential_dir(sender);
		match tokio::fs::remove_dir_all(&dir).await {
			Ok(()) => info!(target = "invite.session", sender = %sender, path = %dir.display(), "removed stored credentials"),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => return Err(e.into()),
		}
		Ok(())
	}

	/// Send through the sender's live connection.
	pub async fn send(&self, sender: &SenderId, phone: &str, body: &str) -> std::result::Result<MessageId, TransportError> {
		let connection = self
			.store
			.connection(sender)
			.ok_or_else(|| TransportError::closed(format!("no live session for {sender}")))?;
		connection.send_text(phone, body).await
	}

	/// Close every session; stored credentials are kept.
	pub async fn shutdown(&self) {
		let connections = self.store.drain("shutting down");
		info!(target = "invite.session", sessions = connections.len(), "closing sessions");
		for (sender, connection) in connections {
			close_quietly(&sender, connection.as_ref()).await;
		}
	}
}

fn ended(sender: &SenderId, signal: &Signal) -> Option<InviteError> {
	match signal {
		Signal::State(_) => None,
		Signal::Ended(Ending::AuthFailed(reason)) => Some(InviteError::AuthFailure {
			sender: sender.to_string(),
			reason: reason.clone(),
		}),
		Signal::Ended(Ending::Closed(reason)) => Some(InviteError::SessionClosed {
			sender: sender.to_string(),
			reason: reason.clone(),
		}),
	}
}

pub(crate) async fn close_quietly(sender: &SenderId, connection: &dyn Connection) {
	match connection.close().await {
		Ok(()) => debug!(target = "invite.session", sender = %sender, "connection closed"),
		Err(e) if e.kind == TransportErrorKind::Closed => {
			debug!(target = "invite.session", sender = %sender, error = %e, "connection already closed")
		}
		Err(e) => warn!(target = "invite.session", sender = %sender, error = %e, "ignoring teardown error"),
	}
}

