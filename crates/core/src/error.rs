use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, InviteError>;

#[derive(Debug, Error)]
pub enum InviteError {
	#[error("timeout after {ms}ms waiting for: {condition}")]
	Timeout { ms: u64, condition: String },

	/// Credentials were rejected; terminal for this connection attempt.
	#[error("authentication failed for {sender}: {reason}")]
	AuthFailure { sender: String, reason: String },

	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error("data source error: {0}")]
	DataSource(String),

	#[error("configuration error: {0}")]
	Configuration(String),

	/// The session was cleared, reaped or disconnected while a caller waited on it.
	#[error("session for {sender} closed: {reason}")]
	SessionClosed { sender: String, reason: String },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

/// Stable error codes for programmatic handling at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	Timeout,
	AuthFailure,
	TransportError,
	DataSourceError,
	ConfigurationError,
	SessionClosed,
	IoError,
	InternalError,
}

/// Structured failure returned to callers instead of a raw error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
	/// Always `false`.
	pub success: bool,
	/// Human-readable message.
	pub error: String,
	pub code: ErrorCode,
	/// Debug rendering of the error, only with diagnostics enabled.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

impl InviteError {
	pub fn code(&self) -> ErrorCode {
		match self {
			InviteError::Timeout { .. } => ErrorCode::Timeout,
			InviteError::AuthFailure { .. } => ErrorCode::AuthFailure,
			InviteError::Transport(_) => ErrorCode::TransportError,
			InviteError::DataSource(_) => ErrorCode::DataSourceError,
			InviteError::Configuration(_) => ErrorCode::ConfigurationError,
			InviteError::SessionClosed { .. } => ErrorCode::SessionClosed,
			InviteError::Io(_) => ErrorCode::IoError,
			InviteError::Json(_) => ErrorCode::InternalError,
		}
	}

	/// Convert to the boundary representation.
	///
	/// `diagnostics` adds the debug rendering (including any remote stack) as
	/// `details`; otherwise only the message is exposed.
	pub fn to_failure(&self, diagnostics: bool) -> Failure {
		let details = diagnostics.then(|| {
			let mut details = serde_json::json!({ "debug": format!("{self:?}") });
			if let InviteError::Timeout { ms, condition } = self {
				details["timeout_ms"] = serde_json::json!(ms);
				details["condition"] = serde_json::json!(condition);
			}
			details
		});

		Failure {
			success: false,
			error: self.to_string(),
			code: self.code(),
			details,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::TransportErrorKind;

	#[test]
	fn failure_hides_details_without_diagnostics() {
		let err = InviteError::Timeout {
			ms: 1000,
			condition: "session Yuval to become ready".into(),
		};
		let failure = err.to_failure(false);
		assert!(!failure.success);
		assert_eq!(failure.code, ErrorCode::Timeout);
		assert!(failure.details.is_none());

		let json = serde_json::to_value(&failure).unwrap();
		assert_eq!(json["success"], false);
		assert_eq!(json["code"], "TIMEOUT");
		assert!(json.get("details").is_none());
	}

	#[test]
	fn failure_includes_debug_with_diagnostics() {
		let err = InviteError::Transport(TransportError::new(TransportErrorKind::Evaluation, "Evaluation failed: t"));
		let failure = err.to_failure(true);
		assert_eq!(failure.code, ErrorCode::TransportError);
		let debug = failure.details.unwrap()["debug"].as_str().unwrap().to_string();
		assert!(debug.contains("Evaluation"));
	}
}
