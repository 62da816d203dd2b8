//! Typed client for one bridge process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use invite_protocol::{BridgeEvent, ClientInfo, InitializeParams, SendMessageParams, SendMessageResult, methods};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::BridgeConnection;
use crate::driver::locate_bridge;
use crate::error::{Error, Result};
use crate::process::BridgeProcess;

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// How long `destroy` may take before the process is killed.
const DESTROY_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for launching a bridge client.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
	/// Filesystem-safe client identifier, one per sender.
	pub client_id: String,
	/// Directory where the bridge persists credentials for this client.
	pub data_path: PathBuf,
	pub headless: bool,
	/// Explicit bridge script; falls back to the lookup in [`locate_bridge`].
	pub script: Option<PathBuf>,
	pub request_timeout: Duration,
}

impl BridgeOptions {
	pub fn new(client_id: impl Into<String>, data_path: impl Into<PathBuf>) -> Self {
		Self {
			client_id: client_id.into(),
			data_path: data_path.into(),
			headless: true,
			script: None,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}
}

/// A running bridge process plus its correlated connection.
pub struct BridgeClient {
	client_id: String,
	connection: Arc<BridgeConnection>,
	process: Mutex<Option<BridgeProcess>>,
	request_timeout: Duration,
}

impl BridgeClient {
	/// Launch the bridge and ask it to start the web client.
	///
	/// Returns once `initialize` is acknowledged; pairing codes and readiness
	/// arrive later on the event receiver.
	///
	/// # Errors
	///
	/// Fails if the bridge cannot be located or launched, or if it rejects
	/// `initialize`.
	pub async fn launch(options: BridgeOptions) -> Result<(Self, mpsc::UnboundedReceiver<BridgeEvent>)> {
		let executable = locate_bridge(options.script.as_deref())?;
		debug!(target = "invite.bridge", client_id = %options.client_id, node = %executable.node.display(), script = %executable.script.display(), "launching bridge");

		let mut process = BridgeProcess::launch(&executable).await?;
		let stdin = process
			.process
			.stdin
			.take()
			.ok_or_else(|| Error::LaunchFailed("bridge stdin unavailable".to_string()))?;
		let stdout = process
			.process
			.stdout
			.take()
			.ok_or_else(|| Error::LaunchFailed("bridge stdout unavailable".to_string()))?;

		let (connection, events) = BridgeConnection::start(stdin, stdout);
		let client = Self {
			client_id: options.client_id.clone(),
			connection,
			process: Mutex::new(Some(process)),
			request_timeout: options.request_timeout,
		};

		let params = InitializeParams {
			client_id: options.client_id,
			data_path: options.data_path.to_string_lossy().into_owned(),
			headless: options.headless,
		};
		if let Err(e) = client.request(methods::INITIALIZE, serde_json::to_value(params)?).await {
			let _ = client.close().await;
			return Err(e);
		}

		info!(target = "invite.bridge", client_id = %client.client_id, "bridge initialized");
		Ok((client, events))
	}

	/// Send a text message; returns the network's message id.
	pub async fn send_message(&self, chat_id: &str, body: &str) -> Result<String> {
		let params = SendMessageParams {
			chat_id: chat_id.to_string(),
			body: body.to_string(),
		};
		let value = self.request(methods::SEND_MESSAGE, serde_json::to_value(params)?).await?;
		let result: SendMessageResult = serde_json::from_value(value)?;
		Ok(result.id)
	}

	/// Identity of the linked account, present only while ready.
	pub fn identity(&self) -> Option<ClientInfo> {
		self.connection.identity()
	}

	/// Destroy the web client and stop the bridge process.
	///
	/// Safe to call more than once; later calls are no-ops.
	pub async fn close(&self) -> Result<()> {
		let Some(process) = self.process.lock().take() else {
			return Ok(());
		};

		if !self.connection.is_closed() {
			match tokio::time::timeout(DESTROY_TIMEOUT, self.connection.send_request(methods::DESTROY, serde_json::json!({}))).await {
				Ok(Ok(_)) => debug!(target = "invite.bridge", client_id = %self.client_id, "bridge destroyed web client"),
				Ok(Err(e)) if e.is_target_closed() => {}
				Ok(Err(e)) => warn!(target = "invite.bridge", client_id = %self.client_id, error = %e, "destroy failed"),
				Err(_) => warn!(target = "invite.bridge", client_id = %self.client_id, "destroy timed out"),
			}
		}

		process.shutdown().await
	}

	async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
		match tokio::time::timeout(self.request_timeout, self.connection.send_request(method, params)).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout(format!("{method} after {}ms", self.request_timeout.as_millis()))),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::TempDir;

	use super::*;

	/// Minimal peer speaking the framed protocol; logs each method it handles
	/// next to itself.
	const MOCK_BRIDGE: &str = r#"
const fs = require("fs");
const path = require("path");
let pending = Buffer.alloc(0);

function write(message) {
  const body = Buffer.from(JSON.stringify(message), "utf8");
  const header = Buffer.alloc(4);
  header.writeUInt32LE(body.length, 0);
  process.stdout.write(Buffer.concat([header, body]));
}

function handle({ id, method, params }) {
  fs.appendFileSync(path.join(__dirname, "calls.log"), method + "\n");
  if (method === "initialize") {
    fs.writeFileSync(path.join(__dirname, "initialize.json"), JSON.stringify(params));
    write({ id, result: {} });
    write({ event: "qr", code: "2@mock" });
    write({ event: "authenticated" });
    write({ event: "ready", info: { wid: "972521112222@c.us", pushname: "Yuval" } });
  } else if (method === "sendMessage" && params.chatId === "972500000000@c.us") {
    write({ id, error: { name: "NotRegisteredError", message: "not on the network" } });
  } else if (method === "sendMessage") {
    write({ id, result: { id: "true_" + params.chatId + "_1" } });
  } else if (method === "destroy") {
    write({ id, result: {} });
    setImmediate(() => process.exit(0));
  }
}

process.stdin.on("data", (chunk) => {
  pending = Buffer.concat([pending, chunk]);
  while (pending.length >= 4) {
    const length = pending.readUInt32LE(0);
    if (pending.length < 4 + length) break;
    const frame = pending.subarray(4, 4 + length).toString("utf8");
    pending = pending.subarray(4 + length);
    handle(JSON.parse(frame));
  }
});
"#;

	fn bridge_env_overridden() -> bool {
		std::env::var_os("INVITE_BRIDGE_JS").is_some() || std::env::var_os("INVITE_BRIDGE_PATH").is_some()
	}

	async fn next_event(events: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> BridgeEvent {
		tokio::time::timeout(Duration::from_secs(10), events.recv())
			.await
			.expect("bridge event timed out")
			.expect("event channel closed")
	}

	#[tokio::test]
	async fn drives_a_node_peer_over_the_framed_pipe() {
		if bridge_env_overridden() || which::which("node").is_err() {
			return;
		}
		let temp = TempDir::new().unwrap();
		let script = temp.path().join("bridge.js");
		fs::write(&script, MOCK_BRIDGE).unwrap();

		let mut options = BridgeOptions::new("Yuval", temp.path().join("session-Yuval"));
		options.script = Some(script);
		options.request_timeout = Duration::from_secs(10);

		let (client, mut events) = BridgeClient::launch(options).await.unwrap();

		assert_eq!(next_event(&mut events).await, BridgeEvent::Qr { code: "2@mock".into() });
		assert_eq!(next_event(&mut events).await, BridgeEvent::Authenticated);
		let BridgeEvent::Ready { info } = next_event(&mut events).await else {
			panic!("expected ready event");
		};
		assert_eq!(info.wid, "972521112222@c.us");
		assert_eq!(client.identity().map(|i| i.wid), Some("972521112222@c.us".to_string()));

		let id = client.send_message("972521112222@c.us", "hello").await.unwrap();
		assert_eq!(id, "true_972521112222@c.us_1");

		let err = client.send_message("972500000000@c.us", "hello").await.unwrap_err();
		assert!(matches!(&err, Error::Remote { name, .. } if name == "NotRegisteredError"), "unexpected error: {err:?}");

		client.close().await.unwrap();
		client.close().await.unwrap();

		let calls = fs::read_to_string(temp.path().join("calls.log")).unwrap();
		assert_eq!(calls.lines().collect::<Vec<_>>(), ["initialize", "sendMessage", "sendMessage", "destroy"]);

		let init: serde_json::Value = serde_json::from_str(&fs::read_to_string(temp.path().join("initialize.json")).unwrap()).unwrap();
		assert_eq!(init["clientId"], "Yuval");
		assert_eq!(init["headless"], true);
		assert!(init["dataPath"].as_str().unwrap().ends_with("session-Yuval"));
	}

	#[test]
	fn options_default_to_headless() {
		let options = BridgeOptions::new("Yuval", "/tmp/credentials/session-Yuval");
		assert!(options.headless);
		assert!(options.script.is_none());
		assert_eq!(options.request_timeout, DEFAULT_REQUEST_TIMEOUT);
	}

	#[tokio::test]
	async fn launch_with_missing_script_fails() {
		if bridge_env_overridden() {
			return;
		}
		let temp = TempDir::new().unwrap();
		let mut options = BridgeOptions::new("Yuval", temp.path());
		options.script = Some(temp.path().join("missing.js"));

		let result = BridgeClient::launch(options).await;
		assert!(result.is_err());
	}
}
