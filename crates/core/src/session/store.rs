//! In-memory session store, one entry per sender.
//!
//! All methods are synchronous and never hold the lock across an `.await`;
//! connections handed out of the store are closed by the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use super::state::{Effect, Ending, SessionEvent, SessionState, transition};
use crate::transport::Connection;
use crate::types::{Identity, SenderId};

/// What waiters on a session observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
	State(SessionState),
	Ended(Ending),
}

struct SessionEntry {
	generation: u64,
	/// `None` while the connector is still building the connection.
	connection: Option<Arc<dyn Connection>>,
	state: SessionState,
	/// Cache of `connection.identity().is_some()`, refreshed on every read.
	ready: bool,
	pairing_code: Option<String>,
	code_waiters: Vec<oneshot::Sender<String>>,
	signal: watch::Sender<Signal>,
	updated_at: Instant,
}

impl SessionEntry {
	fn new(generation: u64) -> Self {
		let (signal, _) = watch::channel(Signal::State(SessionState::Initializing));
		Self {
			generation,
			connection: None,
			state: SessionState::Initializing,
			ready: false,
			pairing_code: None,
			code_waiters: Vec::new(),
			signal,
			updated_at: Instant::now(),
		}
	}

	fn identity(&self) -> Option<Identity> {
		self.connection.as_ref().and_then(|c| c.identity())
	}

	/// Re-derive readiness from the connection's identity. A ready session
	/// never keeps a pairing code.
	fn refresh(&mut self) -> bool {
		self.ready = self.identity().is_some();
		if self.ready {
			self.clear_code();
		}
		self.ready
	}

	fn clear_code(&mut self) -> bool {
		let had_code = self.pairing_code.take().is_some() || !self.code_waiters.is_empty();
		self.code_waiters.clear();
		had_code
	}

	fn handle(&self, sender: &SenderId) -> SessionHandle {
		SessionHandle {
			sender: sender.clone(),
			generation: self.generation,
			connection: self.connection.clone(),
		}
	}

	fn end(self, ending: Ending) -> Option<Arc<dyn Connection>> {
		self.signal.send_replace(Signal::Ended(ending));
		self.connection
	}
}

/// Caller-facing reference to a session.
#[derive(Clone)]
pub struct SessionHandle {
	sender: SenderId,
	generation: u64,
	connection: Option<Arc<dyn Connection>>,
}

impl SessionHandle {
	pub fn sender(&self) -> &SenderId {
		&self.sender
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// `None` while the connection is still being constructed.
	pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
		self.connection.as_ref()
	}

	pub fn identity(&self) -> Option<Identity> {
		self.connection.as_ref().and_then(|c| c.identity())
	}

	pub fn is_ready(&self) -> bool {
		self.identity().is_some()
	}
}

impl fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionHandle")
			.field("sender", &self.sender)
			.field("generation", &self.generation)
			.field("connected", &self.connection.is_some())
			.finish()
	}
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
	pub ready: bool,
	pub pairing_code: Option<String>,
	pub state: SessionState,
}

impl SessionStatus {
	fn empty() -> Self {
		Self {
			ready: false,
			pairing_code: None,
			state: SessionState::Empty,
		}
	}
}

pub(crate) enum Reservation {
	Existing(SessionHandle),
	Created { generation: u64 },
}

pub(crate) enum CodeWait {
	Ready,
	Code(String),
	Waiting(oneshot::Receiver<String>),
	Missing,
}

pub(crate) struct Applied {
	pub next: SessionState,
	/// Connection of an evicted entry, to be closed by the caller.
	pub evicted: Option<Arc<dyn Connection>>,
}

/// Shared map from sender to session state.
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct SessionStore {
	sessions: Arc<Mutex<HashMap<SenderId, SessionEntry>>>,
	next_generation: Arc<AtomicU64>,
}

impl SessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.lock().is_empty()
	}

	pub fn contains(&self, sender: &SenderId) -> bool {
		self.sessions.lock().contains_key(sender)
	}

	pub fn status(&self, sender: &SenderId) -> SessionStatus {
		let mut sessions = self.sessions.lock();
		let Some(entry) = sessions.get_mut(sender) else {
			return SessionStatus::empty();
		};
		entry.refresh();
		SessionStatus {
			ready: entry.ready,
			pairing_code: entry.pairing_code.clone(),
			state: entry.state,
		}
	}

	pub fn pairing_code(&self, sender: &SenderId) -> Option<String> {
		self.status(sender).pairing_code
	}

	/// Attach to the sender's existing session, or reserve a new entry in
	/// `Initializing` for the caller to connect.
	pub(crate) fn reserve(&self, sender: &SenderId) -> Reservation {
		let mut sessions = self.sessions.lock();
		if let Some(entry) = sessions.get(sender) {
			return Reservation::Existing(entry.handle(sender));
		}
		let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
		let mut entry = SessionEntry::new(generation);
		entry.state = transition(SessionState::Empty, SessionEvent::Started).next;
		sessions.insert(sender.clone(), entry);
		Reservation::Created { generation }
	}

	/// Store the freshly built connection. Returns `None` if the reservation
	/// was removed in the meantime.
	pub(crate) fn attach(&self, sender: &SenderId, generation: u64, connection: Arc<dyn Connection>) -> Option<SessionHandle> {
		let mut sessions = self.sessions.lock();
		let entry = sessions.get_mut(sender).filter(|e| e.generation == generation)?;
		entry.connection = Some(connection);
		entry.updated_at = Instant::now();
		Some(entry.handle(sender))
	}

	/// Run the state machine for one event and apply its effects.
	///
	/// Returns `None` when the entry is gone or belongs to another generation.
	pub(crate) fn apply(&self, sender: &SenderId, generation: u64, event: SessionEvent) -> Option<Applied> {
		let mut sessions = self.sessions.lock();
		let entry = sessions.get_mut(sender).filter(|e| e.generation == generation)?;

		let t = transition(entry.state, event);
		entry.state = t.next;
		entry.updated_at = Instant::now();

		let mut ending = None;
		let mut evict = false;
		for effect in t.effects {
			match effect {
				Effect::PublishCode(code) => {
					for waiter in entry.code_waiters.drain(..) {
						let _ = waiter.send(code.clone());
					}
					entry.pairing_code = Some(code);
				}
				Effect::ClearCode => {
					entry.clear_code();
				}
				Effect::Fail(e) => ending = Some(e),
				Effect::Evict => evict = true,
			}
		}
		entry.refresh();
		debug_assert!(!(entry.ready && entry.pairing_code.is_some()));

		if evict {
			let ending = ending.unwrap_or_else(|| Ending::Closed("session evicted".to_string()));
			let evicted = sessions.remove(sender).and_then(|entry| entry.end(ending));
			return Some(Applied { next: t.next, evicted });
		}

		if let Some(ending) = ending {
			entry.signal.send_replace(Signal::Ended(ending));
		} else {
			entry.signal.send_replace(Signal::State(t.next));
		}
		Some(Applied { next: t.next, evicted: None })
	}

	/// Remove the sender's entry, telling waiters why. With `generation`,
	/// only that generation is removed.
	///
	/// Returns `None` if nothing was removed, otherwise the entry's
	/// connection (if any) for the caller to close.
	pub(crate) fn end(&self, sender: &SenderId, generation: Option<u64>, ending: Ending) -> Option<Option<Arc<dyn Connection>>> {
		let mut sessions = self.sessions.lock();
		if let Some(generation) = generation {
			if sessions.get(sender).is_none_or(|e| e.generation != generation) {
				return None;
			}
		}
		sessions.remove(sender).map(|entry| entry.end(ending))
	}

	/// Remove every entry; used on shutdown.
	pub(crate) fn drain(&self, reason: &str) -> Vec<(SenderId, Arc<dyn Connection>)> {
		let drained: Vec<_> = self.sessions.lock().drain().collect();
		drained
			.into_iter()
			.filter_map(|(sender, entry)| entry.end(Ending::Closed(reason.to_string())).map(|c| (sender, c)))
			.collect()
	}

	pub(crate) fn subscribe(&self, sender: &SenderId) -> Option<watch::Receiver<Signal>> {
		self.sessions.lock().get(sender).map(|e| e.signal.subscribe())
	}

	/// A handle whose connection exposes an identity, if the session is ready.
	pub(crate) fn ready_handle(&self, sender: &SenderId) -> Option<SessionHandle> {
		let mut sessions = self.sessions.lock();
		let entry = sessions.get_mut(sender)?;
		entry.refresh().then(|| entry.handle(sender))
	}

	pub(crate) fn connection(&self, sender: &SenderId) -> Option<Arc<dyn Connection>> {
		self.sessions.lock().get(sender).and_then(|e| e.connection.clone())
	}

	pub(crate) fn code_or_waiter(&self, sender: &SenderId) -> CodeWait {
		let mut sessions = self.sessions.lock();
		let Some(entry) = sessions.get_mut(sender) else {
			return CodeWait::Missing;
		};
		if entry.refresh() {
			return CodeWait::Ready;
		}
		if let Some(code) = &entry.pairing_code {
			return CodeWait::Code(code.clone());
		}
		entry.code_waiters.retain(|waiter| !waiter.is_closed());
		let (tx, rx) = oneshot::channel();
		entry.code_waiters.push(tx);
		CodeWait::Waiting(rx)
	}

	/// Drop pairing codes and code waiters held by sessions that are ready.
	pub(crate) fn clear_stale_codes(&self) -> Vec<SenderId> {
		let mut sessions = self.sessions.lock();
		sessions
			.iter_mut()
			.filter_map(|(sender, entry)| {
				let had_code = entry.pairing_code.is_some() || !entry.code_waiters.is_empty();
				(had_code && entry.refresh()).then(|| sender.clone())
			})
			.collect()
	}

	/// Remove sessions that have a connection but neither an identity nor a
	/// pairing code, and have not moved for at least `older_than`.
	pub(crate) fn take_stuck(&self, older_than: Duration) -> Vec<(SenderId, Arc<dyn Connection>)> {
		let mut sessions = self.sessions.lock();
		let stuck: Vec<SenderId> = sessions
			.iter_mut()
			.filter(|(_, entry)| entry.connection.is_some() && entry.pairing_code.is_none() && entry.updated_at.elapsed() >= older_than)
			.filter_map(|(sender, entry)| (!entry.refresh()).then(|| sender.clone()))
			.collect();

		stuck
			.into_iter()
			.filter_map(|sender| {
				let entry = sessions.remove(&sender)?;
				let connection = entry.end(Ending::Closed("no progress".to_string()))?;
				Some((sender, connection))
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::FakeConnection;

	fn sender(name: &str) -> SenderId {
		SenderId::new(name).unwrap()
	}

	fn reserve_new(store: &SessionStore, sender: &SenderId) -> u64 {
		match store.reserve(sender) {
			Reservation::Created { generation } => generation,
			Reservation::Existing(_) => panic!("expected a new reservation"),
		}
	}

	fn assert_invariant(store: &SessionStore, sender: &SenderId) {
		let status = store.status(sender);
		assert!(!(status.ready && status.pairing_code.is_some()), "ready session holds a code: {status:?}");
	}

	#[test]
	fn reserve_twice_attaches_to_existing_entry() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		let generation = reserve_new(&store, &yuval);

		match store.reserve(&yuval) {
			Reservation::Existing(handle) => {
				assert_eq!(handle.generation(), generation);
				assert!(handle.connection().is_none());
			}
			Reservation::Created { .. } => panic!("second reservation must attach"),
		}
		assert_eq!(store.status(&yuval).state, SessionState::Initializing);
	}

	#[test]
	fn invariant_holds_after_every_transition() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		let generation = reserve_new(&store, &yuval);
		let connection = FakeConnection::new();
		store.attach(&yuval, generation, connection.clone()).unwrap();

		let steps = [
			SessionEvent::PairingCode("first".into()),
			SessionEvent::PairingCode("second".into()),
			SessionEvent::Authenticated,
			SessionEvent::PairingCode("late".into()),
			SessionEvent::Ready,
		];
		for (i, event) in steps.into_iter().enumerate() {
			if i == 4 {
				connection.set_identity(Some(Identity::new("972501234567@c.us")));
			}
			store.apply(&yuval, generation, event).unwrap();
			assert_invariant(&store, &yuval);
		}

		let status = store.status(&yuval);
		assert!(status.ready);
		assert_eq!(status.state, SessionState::Ready);
		assert_eq!(status.pairing_code, None);
	}

	#[test]
	fn identity_without_ready_event_still_clears_code() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		let generation = reserve_new(&store, &yuval);
		let connection = FakeConnection::new();
		store.attach(&yuval, generation, connection.clone()).unwrap();
		store.apply(&yuval, generation, SessionEvent::PairingCode("code".into())).unwrap();

		connection.set_identity(Some(Identity::new("972501234567@c.us")));

		let status = store.status(&yuval);
		assert!(status.ready);
		assert_eq!(status.pairing_code, None);
	}

	#[test]
	fn stale_generation_events_are_ignored() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		let old = reserve_new(&store, &yuval);
		store.end(&yuval, None, Ending::Closed("cleared".into()));
		let new = reserve_new(&store, &yuval);
		assert_ne!(old, new);

		assert!(store.apply(&yuval, old, SessionEvent::PairingCode("stale".into())).is_none());
		assert!(store.attach(&yuval, old, FakeConnection::new()).is_none());
		assert_eq!(store.pairing_code(&yuval), None);
		assert!(store.end(&yuval, Some(old), Ending::Closed("late".into())).is_none());
		assert!(store.contains(&yuval));
	}

	#[test]
	fn disconnect_evicts_and_signals_waiters() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		let generation = reserve_new(&store, &yuval);
		store.attach(&yuval, generation, FakeConnection::new()).unwrap();
		let rx = store.subscribe(&yuval).unwrap();

		let applied = store.apply(&yuval, generation, SessionEvent::Disconnected("LOGOUT".into())).unwrap();
		assert_eq!(applied.next, SessionState::Disconnected);
		assert!(applied.evicted.is_some());
		assert!(!store.contains(&yuval));
		assert_eq!(*rx.borrow(), Signal::Ended(Ending::Closed("LOGOUT".into())));
	}

	#[test]
	fn code_waiters_receive_the_first_code() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		let generation = reserve_new(&store, &yuval);

		let CodeWait::Waiting(mut rx) = store.code_or_waiter(&yuval) else {
			panic!("expected to wait for a code");
		};
		store.apply(&yuval, generation, SessionEvent::PairingCode("2@abc".into())).unwrap();
		assert_eq!(rx.try_recv().unwrap(), "2@abc");
		assert!(matches!(store.code_or_waiter(&yuval), CodeWait::Code(code) if code == "2@abc"));
	}

	#[test]
	fn abandoned_code_waiters_are_pruned() {
		let store = SessionStore::new();
		let yuval = sender("Yuval");
		reserve_new(&store, &yuval);

		for _ in 0..5 {
			let CodeWait::Waiting(rx) = store.code_or_waiter(&yuval) else {
				panic!("expected to wait for a code");
			};
			drop(rx);
		}

		let waiters = store.sessions.lock().get(&yuval).map(|entry| entry.code_waiters.len());
		assert_eq!(waiters, Some(1));
	}

	#[test]
	fn missing_session_reads_as_empty() {
		let store = SessionStore::new();
		let status = store.status(&sender("nobody"));
		assert_eq!(status, SessionStatus::empty());
		assert!(matches!(store.code_or_waiter(&sender("nobody")), CodeWait::Missing));
	}
}
