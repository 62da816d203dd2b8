//! Request/response correlation over the bridge pipe.
//!
//! Requests get sequential ids and a oneshot slot; responses are matched by
//! id. Everything without an id is a lifecycle event and is forwarded to the
//! event receiver returned by [`BridgeConnection::start`].


use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use invite_protocol::{BridgeEvent, ClientInfo, ErrorPayload, Message, Request};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::transport::PipeTransport;

/// Pending request callbacks keyed by request id.
type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// Removes the callback slot when a request future is dropped before its
/// response arrives.
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.id).is_some() {
			tracing::debug!(target = "invite.bridge", id = self.id, "dropped orphaned callback");
		}
	}
}

struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// Correlating connection to one bridge process.
pub struct BridgeConnection {
	last_id: AtomicU32,
	callbacks: CallbackMap,
	outbound_tx: mpsc::UnboundedSender<Value>,
	events_tx: mpsc::UnboundedSender<BridgeEvent>,
	/// Account identity from the last `ready` event; cleared on auth failure
	/// and disconnect.
	identity: Mutex<Option<ClientInfo>>,
	closed: AtomicBool,
}

impl BridgeConnection {
	/// Spawn reader, writer and dispatch tasks over the bridge's stdio.
	///
	/// Must be called within a tokio runtime. The returned receiver yields
	/// lifecycle events in arrival order; a final `Disconnected` event is
	/// emitted when the pipe closes.
	pub fn start<W, R>(stdin: W, stdout: R) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeEvent>)
	where
		W: AsyncWrite + Unpin + Send + 'static,
		R: AsyncRead + Unpin + Send + 'static,
	{
		let (transport, mut message_rx) = PipeTransport::new(stdin, stdout);
		let (mut sender, receiver) = transport.into_parts();
		let (connection, mut outbound_rx, events_rx) = Self::new();

		tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::debug!(target = "invite.bridge", error = %e, "bridge read loop ended");
			}
		});

		tokio::spawn(async move {
			while let Some(message) = outbound_rx.recv().await {
				if let Err(e) = sender.send(message).await {
					tracing::error!(target = "invite.bridge", error = %e, "bridge write failed");
					break;
				}
			}
		});

		let weak: Weak<Self> = Arc::downgrade(&connection);
		tokio::spawn(async move {
			while let Some(value) = message_rx.recv().await {
				let Some(connection) = weak.upgrade() else {
					return;
				};
				match serde_json::from_value::<Message>(value) {
					Ok(message) => {
						if let Err(e) = connection.dispatch_internal(message) {
							tracing::warn!(target = "invite.bridge", error = %e, "failed to dispatch bridge message");
						}
					}
					Err(e) => tracing::warn!(target = "invite.bridge", error = %e, "unparseable bridge message"),
				}
			}
			if let Some(connection) = weak.upgrade() {
				connection.handle_pipe_closed();
			}
		});

		(connection, events_rx)
	}

	fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Value>, mpsc::UnboundedReceiver<BridgeEvent>) {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let connection = Arc::new(Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			events_tx,
			identity: Mutex::new(None),
			closed: AtomicBool::new(false),
		});
		(connection, outbound_rx, events_rx)
	}

	/// Send a request and await the correlated response.
	///
	/// # Errors
	///
	/// Returns `Error::Remote` when the bridge reports a failure and
	/// `Error::TargetClosed`/`Error::ChannelClosed` once the pipe is gone.
	pub async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::TargetClosed(format!("bridge closed before {method}")));
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(target = "invite.bridge", id, method, "sending request");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);
		let guard = CancelGuard::new(id, Arc::clone(&self.callbacks));

		let request = Request {
			id,
			method: method.to_string(),
			params,
		};
		if self.outbound_tx.send(serde_json::to_value(&request)?).is_err() {
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Identity of the linked account, if the client is ready.
	pub fn identity(&self) -> Option<ClientInfo> {
		self.identity.lock().clone()
	}

	/// Whether the pipe to the bridge has closed.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	#[cfg(test)]
	pub(crate) fn dispatch(&self, message: Message) -> Result<()> {
		self.dispatch_internal(message)
	}

	fn dispatch_internal(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let callback = self
					.callbacks
					.lock()
					.remove(&response.id)
					.ok_or_else(|| Error::ProtocolError(format!("Cannot find request to respond: id={}", response.id)))?;

				let result = match response.error {
					Some(error) => Err(parse_protocol_error(error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => {
				self.observe_event(&event);
				if self.events_tx.send(event).is_err() {
					tracing::debug!(target = "invite.bridge", "event receiver dropped");
				}
				Ok(())
			}
			Message::Unknown(value) => {
				tracing::debug!(target = "invite.bridge", message = %value, "unknown bridge message ignored");
				Ok(())
			}
		}
	}

	/// Keep the identity cache in step with the event stream so it is already
	/// current when the event is observed downstream.
	fn observe_event(&self, event: &BridgeEvent) {
		match event {
			BridgeEvent::Ready { info } => *self.identity.lock() = Some(info.clone()),
			BridgeEvent::AuthFailure { .. } | BridgeEvent::Disconnected { .. } => *self.identity.lock() = None,
			BridgeEvent::Qr { .. } | BridgeEvent::Authenticated | BridgeEvent::Loading { .. } => {}
		}
	}

	fn handle_pipe_closed(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		for (id, callback) in pending {
			tracing::debug!(target = "invite.bridge", id, "failing pending request after pipe close");
			let _ = callback.send(Err(Error::TargetClosed("bridge pipe closed".to_string())));
		}
		let event = BridgeEvent::Disconnected {
			reason: "bridge process exited".to_string(),
		};
		self.observe_event(&event);
		let _ = self.events_tx.send(event);
	}
}

/// Converts an [`ErrorPayload`] from the bridge into [`Error::Remote`].
fn parse_protocol_error(error: ErrorPayload) -> Error {
	Error::Remote {
		name: error.name.unwrap_or_else(|| "Error".to_string()),
		message: error.message,
		stack: error.stack,
	}
}
