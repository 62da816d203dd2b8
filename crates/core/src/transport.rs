//! The seam between session management and a concrete messaging transport.
//!
//! A [`Connector`] builds one [`Connection`] per sender and hands back the
//! connection's lifecycle events as a channel. The session manager owns both.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{Identity, MessageId, SenderId};

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
	/// The automation protocol reported a failure mid-call.
	Protocol,
	/// Script evaluation inside the web client failed.
	Evaluation,
	/// The recipient was not (yet) resolved as registered on the network.
	NotRegistered,
	/// The connection or its browser is gone.
	Closed,
	Timeout,
	/// The transport could not be started.
	Launch,
	Other,
}

impl TransportErrorKind {
	/// Whether an operation failing with this kind is worth retrying as-is.
	pub fn is_transient(self) -> bool {
		matches!(self, Self::Protocol | Self::Evaluation | Self::NotRegistered)
	}
}

impl fmt::Display for TransportErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Protocol => "protocol error",
			Self::Evaluation => "evaluation error",
			Self::NotRegistered => "recipient not registered",
			Self::Closed => "connection closed",
			Self::Timeout => "timeout",
			Self::Launch => "launch failed",
			Self::Other => "transport error",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
	pub kind: TransportErrorKind,
	pub message: String,
}

impl TransportError {
	pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	pub fn closed(message: impl Into<String>) -> Self {
		Self::new(TransportErrorKind::Closed, message)
	}

	pub fn is_transient(&self) -> bool {
		self.kind.is_transient()
	}
}

/// Lifecycle notification from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
	/// A (new) pairing code is available; codes rotate until one is scanned.
	PairingCode(String),
	Authenticated,
	/// The connection can send; its identity is populated.
	Ready(Identity),
	AuthFailure(String),
	Disconnected(String),
}

/// Receiver of a connection's lifecycle events, in order.
pub type EventStream = mpsc::UnboundedReceiver<ConnectionEvent>;

/// One live messaging connection, exclusively owned by a sender's session.
#[async_trait]
pub trait Connection: Send + Sync {
	/// The linked account, present only while the connection can send.
	fn identity(&self) -> Option<Identity>;

	/// Send a text message to a normalized phone number.
	async fn send_text(&self, phone: &str, body: &str) -> Result<MessageId, TransportError>;

	/// Tear the connection down; persisted credentials are left alone.
	async fn close(&self) -> Result<(), TransportError>;
}

/// Builds and starts connections.
#[async_trait]
pub trait Connector: Send + Sync {
	/// Construct and start a connection for `sender`, persisting credentials
	/// under `credentials`.
	///
	/// Returns once the connection is started; pairing and readiness arrive
	/// later on the event stream.
	async fn connect(&self, sender: &SenderId, credentials: &Path) -> Result<(Arc<dyn Connection>, EventStream), TransportError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_protocol_evaluation_and_not_registered_are_transient() {
		let transient: Vec<_> = [
			TransportErrorKind::Protocol,
			TransportErrorKind::Evaluation,
			TransportErrorKind::NotRegistered,
			TransportErrorKind::Closed,
			TransportErrorKind::Timeout,
			TransportErrorKind::Launch,
			TransportErrorKind::Other,
		]
		.into_iter()
		.filter(|kind| kind.is_transient())
		.collect();

		assert_eq!(
			transient,
			vec![TransportErrorKind::Protocol, TransportErrorKind::Evaluation, TransportErrorKind::NotRegistered]
		);
	}

	#[test]
	fn error_display_includes_kind() {
		let err = TransportError::closed("Target closed");
		assert_eq!(err.to_string(), "connection closed: Target closed");
	}
}
