//! Method names, parameter shapes and remote error names.

use serde::{Deserialize, Serialize};

/// Method names understood by the bridge.
pub mod methods {
	/// Start the web client; events follow asynchronously.
	pub const INITIALIZE: &str = "initialize";
	/// Send a text message to a chat.
	pub const SEND_MESSAGE: &str = "sendMessage";
	/// Close the browser; credentials stay on disk.
	pub const DESTROY: &str = "destroy";
}

/// Error type names reported in [`crate::ErrorPayload::name`].
pub mod error_names {
	pub const PROTOCOL: &str = "ProtocolError";
	pub const EVALUATION: &str = "EvaluationError";
	pub const NOT_REGISTERED: &str = "NotRegisteredError";
	pub const TARGET_CLOSED: &str = "TargetClosedError";
	pub const TIMEOUT: &str = "TimeoutError";
}

/// Parameters for [`methods::INITIALIZE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
	/// Filesystem-safe client identifier.
	pub client_id: String,
	/// Directory holding the persisted credentials for this client.
	pub data_path: String,
	pub headless: bool,
}

/// Parameters for [`methods::SEND_MESSAGE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
	/// Chat identifier, e.g. `972501234567@c.us`.
	pub chat_id: String,
	pub body: String,
}

/// Result of [`methods::SEND_MESSAGE`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResult {
	/// Serialized message id assigned by the network.
	pub id: String,
}
