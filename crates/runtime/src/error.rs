//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the bridge runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// Bridge script or node executable was not found.
	#[error("Messaging bridge not found. Set INVITE_BRIDGE_JS or install invite-bridge with npm -g")]
	BridgeNotFound,

	/// Failed to launch the bridge process.
	#[error("Failed to launch messaging bridge: {0}. Check that Node.js is installed.")]
	LaunchFailed(String),

	/// Transport-level error (stdio communication).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Protocol-level error (framing or correlation).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error reported by the bridge for a request.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name (e.g. "NotRegisteredError", "TargetClosedError")
		name: String,
		/// Human-readable error message
		message: String,
		/// JavaScript stack trace from the bridge (if available)
		stack: Option<String>,
	},

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// Timeout waiting for a response.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The bridge process or its browser is gone.
	#[error("Target closed: {0}")]
	TargetClosed(String),

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout(_) => true,
			Error::Remote { name, .. } => name == invite_protocol::error_names::TIMEOUT,
			_ => false,
		}
	}

	/// Returns true if the bridge (or the browser behind it) is already gone.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::TargetClosed(_) | Error::ChannelClosed => true,
			Error::Remote { name, .. } => name == invite_protocol::error_names::TARGET_CLOSED,
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn remote_target_closed_is_detected_by_name() {
		let err = Error::Remote {
			name: "TargetClosedError".into(),
			message: "Protocol error (Runtime.callFunctionOn): Target closed.".into(),
			stack: None,
		};
		assert!(err.is_target_closed());
		assert!(!err.is_timeout());
	}

	#[test]
	fn channel_closed_counts_as_target_closed() {
		assert!(Error::ChannelClosed.is_target_closed());
	}
}
