//! [`Connector`] backed by the Node.js messaging bridge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use invite_protocol::{BridgeEvent, ClientInfo, error_names};
use invite_runtime::{BridgeClient, BridgeOptions};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::transport::{Connection, ConnectionEvent, Connector, EventStream, TransportError, TransportErrorKind};
use crate::types::{Identity, MessageId, SenderId};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Launches one bridge process per sender.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
	script: Option<PathBuf>,
	headless: bool,
	request_timeout: Duration,
}

impl Default for BridgeConnector {
	fn default() -> Self {
		Self {
			script: None,
			headless: true,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}
}

impl BridgeConnector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Use this bridge script instead of the environment / PATH lookup.
	pub fn script(mut self, script: Option<PathBuf>) -> Self {
		self.script = script;
		self
	}

	pub fn headless(mut self, headless: bool) -> Self {
		self.headless = headless;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}
}

#[async_trait]
impl Connector for BridgeConnector {
	async fn connect(&self, sender: &SenderId, credentials: &Path) -> Result<(Arc<dyn Connection>, EventStream), TransportError> {
		tokio::fs::create_dir_all(credentials).await.map_err(|e| {
			TransportError::new(
				TransportErrorKind::Launch,
				format!("cannot create credentials directory {}: {e}", credentials.display()),
			)
		})?;

		let options = BridgeOptions {
			script: self.script.clone(),
			headless: self.headless,
			request_timeout: self.request_timeout,
			..BridgeOptions::new(sender.credential_dir_name(), credentials)
		};
		let (client, bridge_events) = BridgeClient::launch(options).await?;
		info!(target = "invite.bridge", sender = %sender, "bridge connection started");

		let (events_tx, events_rx) = mpsc::unbounded_channel();
		tokio::spawn(forward_events(sender.clone(), bridge_events, events_tx));

		let connection = BridgeHandle { client };
		Ok((Arc::new(connection) as Arc<dyn Connection>, events_rx))
	}
}

/// A live bridge client seen through the [`Connection`] seam.
struct BridgeHandle {
	client: BridgeClient,
}

#[async_trait]
impl Connection for BridgeHandle {
	fn identity(&self) -> Option<Identity> {
		self.client.identity().map(Identity::from)
	}

	async fn send_text(&self, phone: &str, body: &str) -> Result<MessageId, TransportError> {
		let id = self.client.send_message(&chat_id(phone), body).await?;
		Ok(MessageId(id))
	}

	async fn close(&self) -> Result<(), TransportError> {
		self.client.close().await.map_err(TransportError::from)
	}
}

async fn forward_events(sender: SenderId, mut bridge_events: mpsc::UnboundedReceiver<BridgeEvent>, events: mpsc::UnboundedSender<ConnectionEvent>) {
	while let Some(event) = bridge_events.recv().await {
		let Some(event) = map_event(event) else {
			continue;
		};
		if events.send(event).is_err() {
			debug!(target = "invite.bridge", sender = %sender, "session stopped listening");
			return;
		}
	}
	debug!(target = "invite.bridge", sender = %sender, "bridge event stream ended");
}

fn map_event(event: BridgeEvent) -> Option<ConnectionEvent> {
	match event {
		BridgeEvent::Qr { code } => Some(ConnectionEvent::PairingCode(code)),
		BridgeEvent::Authenticated => Some(ConnectionEvent::Authenticated),
		BridgeEvent::Ready { info } => Some(ConnectionEvent::Ready(info.into())),
		BridgeEvent::AuthFailure { message } => Some(ConnectionEvent::AuthFailure(message)),
		BridgeEvent::Disconnected { reason } => Some(ConnectionEvent::Disconnected(reason)),
		BridgeEvent::Loading { percent, message } => {
			debug!(target = "invite.bridge", percent, message = %message, "web client loading");
			None
		}
	}
}

/// Individual chat id for a normalized phone number.
fn chat_id(phone: &str) -> String {
	format!("{phone}@c.us")
}

impl From<ClientInfo> for Identity {
	fn from(info: ClientInfo) -> Self {
		Self {
			id: info.wid,
			display_name: info.pushname.filter(|name| !name.is_empty()),
		}
	}
}

impl From<invite_runtime::Error> for TransportError {
	fn from(err: invite_runtime::Error) -> Self {
		use invite_runtime::Error as E;

		let kind = match &err {
			E::Remote { name, .. } => match name.as_str() {
				error_names::PROTOCOL => TransportErrorKind::Protocol,
				error_names::EVALUATION => TransportErrorKind::Evaluation,
				error_names::NOT_REGISTERED => TransportErrorKind::NotRegistered,
				error_names::TARGET_CLOSED => TransportErrorKind::Closed,
				error_names::TIMEOUT => TransportErrorKind::Timeout,
				_ => TransportErrorKind::Other,
			},
			E::TargetClosed(_) | E::ChannelClosed | E::TransportError(_) | E::Io(_) => TransportErrorKind::Closed,
			E::Timeout(_) => TransportErrorKind::Timeout,
			E::BridgeNotFound | E::LaunchFailed(_) => TransportErrorKind::Launch,
			E::ProtocolError(_) | E::Json(_) => TransportErrorKind::Other,
		};
		let message = match &err {
			E::Remote { message, .. } => message.clone(),
			other => other.to_string(),
		};
		TransportError::new(kind, message)
	}
}
