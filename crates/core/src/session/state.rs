//! Per-session state machine.
//!
//! [`transition`] is a pure function of the current state and an incoming
//! event; the store applies the returned effects to the session entry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	Empty,
	Initializing,
	/// A pairing code was issued and has not been scanned yet.
	Pairing,
	Authenticated,
	Ready,
	AuthFailed,
	Disconnected,
}

impl SessionState {
	/// States from which no further progress happens for this connection.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::AuthFailed | Self::Disconnected)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
	Started,
	PairingCode(String),
	Authenticated,
	Ready,
	AuthFailure(String),
	Disconnected(String),
}

/// Why a session ended, as seen by anyone waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
	AuthFailed(String),
	Closed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	/// Store the code and hand it to everyone waiting for one.
	PublishCode(String),
	/// Drop the code and any pending code waiters.
	ClearCode,
	/// Tell readiness waiters the session is over.
	Fail(Ending),
	/// Remove the entry and close its connection.
	Evict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
	pub next: SessionState,
	pub effects: Vec<Effect>,
}

impl Transition {
	fn stay(state: SessionState) -> Self {
		Self {
			next: state,
			effects: Vec::new(),
		}
	}

	fn to(next: SessionState, effects: Vec<Effect>) -> Self {
		Self { next, effects }
	}
}

pub fn transition(state: SessionState, event: SessionEvent) -> Transition {
	use SessionEvent as E;
	use SessionState as S;

	match (state, event) {
		(S::Empty, E::Started) => Transition::to(S::Initializing, Vec::new()),
		(S::Empty, _) => Transition::stay(S::Empty),
		(s @ (S::AuthFailed | S::Disconnected), _) => Transition::stay(s),

		(_, E::AuthFailure(reason)) => Transition::to(S::AuthFailed, vec![Effect::ClearCode, Effect::Fail(Ending::AuthFailed(reason)), Effect::Evict]),
		(_, E::Disconnected(reason)) => Transition::to(S::Disconnected, vec![Effect::ClearCode, Effect::Fail(Ending::Closed(reason)), Effect::Evict]),

		(S::Initializing | S::Pairing, E::PairingCode(code)) => Transition::to(S::Pairing, vec![Effect::PublishCode(code)]),
		// Codes arriving after authentication are stale.
		(s @ (S::Authenticated | S::Ready), E::PairingCode(_)) => Transition::stay(s),

		(S::Initializing | S::Pairing, E::Authenticated) => Transition::to(S::Authenticated, vec![Effect::ClearCode]),
		(S::Initializing | S::Pairing | S::Authenticated, E::Ready) => Transition::to(S::Ready, vec![Effect::ClearCode]),
		(s, E::Started | E::Authenticated | E::Ready) => Transition::stay(s),
	}
}
