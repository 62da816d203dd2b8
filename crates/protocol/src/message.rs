//! Request, response and event envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method call sent to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request ID for correlating the response.
	pub id: u32,
	/// Method name, see [`crate::methods`].
	pub method: String,
	/// Method parameters as a JSON object.
	pub params: Value,
}

/// Reply to a [`Request`]; `result` and `error` are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
}

/// Error reported by the bridge for a failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// Error type name (see [`crate::error_names`]).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Human-readable message.
	pub message: String,
	/// JavaScript stack trace, when the bridge runs with diagnostics.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Account identity reported once the client is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
	/// Serialized account id (e.g. `972501234567@c.us`).
	pub wid: String,
	/// Display name of the linked account.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pushname: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub platform: Option<String>,
}

/// Lifecycle notification emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
	/// A pairing code is available; codes rotate until one is scanned.
	Qr { code: String },
	/// The device was linked (or stored credentials were accepted).
	Authenticated,
	/// The client finished loading and can send.
	Ready { info: ClientInfo },
	/// Stored or scanned credentials were rejected.
	AuthFailure { message: String },
	/// The web client disconnected or the browser went away.
	Disconnected { reason: String },
	/// Loading progress, informational only.
	Loading {
		#[serde(default)]
		percent: u8,
		#[serde(default)]
		message: String,
	},
}

/// Anything the bridge writes to its stdout pipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	/// Response message (has `id` field)
	Response(Response),
	/// Event message (has `event` field)
	Event(BridgeEvent),
	/// Unknown message type (forward-compatible catch-all)
	Unknown(Value),
}
