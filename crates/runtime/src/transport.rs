//! Length-prefixed JSON framing over stdio pipes.
//!
//! Every frame is a 4-byte little-endian length followed by that many bytes of
//! UTF-8 JSON, in both directions.


use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Upper bound on a single frame; anything larger is treated as corruption.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Bidirectional framed pipe to the bridge process.
pub struct PipeTransport<W, R> {
	stdin: W,
	stdout: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

/// Write half produced by [`PipeTransport::into_parts`].
pub struct PipeTransportSender<W> {
	stdin: W,
}

/// Read half produced by [`PipeTransport::into_parts`].
pub struct PipeTransportReceiver<R> {
	stdout: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send,
	R: AsyncRead + Unpin + Send,
{
	/// Create a transport over the bridge's stdin (`W`) and stdout (`R`).
	///
	/// Incoming frames are delivered on the returned receiver.
	pub fn new(stdin: W, stdout: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(Self { stdin, stdout, message_tx }, message_rx)
	}

	/// Split into independently owned write and read halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender { stdin: self.stdin },
			PipeTransportReceiver {
				stdout: self.stdout,
				message_tx: self.message_tx,
			},
		)
	}

	/// Write one frame.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		write_frame(&mut self.stdin, &message).await
	}

	/// Read frames until the pipe closes or the receiver is dropped.
	pub async fn run(&mut self) -> Result<()> {
		read_frames(&mut self.stdout, &self.message_tx).await
	}
}

impl<W> PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	/// Write one frame.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		write_frame(&mut self.stdin, &message).await
	}
}

impl<R> PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send,
{
	/// Read frames until the pipe closes or the receiver is dropped.
	pub async fn run(mut self) -> Result<()> {
		read_frames(&mut self.stdout, &self.message_tx).await
	}
}

async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let bytes = serde_json::to_vec(message)?;
	let length = u32::try_from(bytes.len()).map_err(|_| Error::ProtocolError(format!("frame too large: {} bytes", bytes.len())))?;

	writer
		.write_all(&length.to_le_bytes())
		.await
		.map_err(|e| Error::TransportError(format!("Failed to write length prefix: {}", e)))?;
	writer
		.write_all(&bytes)
		.await
		.map_err(|e| Error::TransportError(format!("Failed to write message: {}", e)))?;
	writer.flush().await.map_err(|e| Error::TransportError(format!("Failed to flush: {}", e)))?;
	Ok(())
}

async fn read_frames<R>(reader: &mut R, message_tx: &mpsc::UnboundedSender<Value>) -> Result<()>
where
	R: AsyncRead + Unpin,
{
	loop {
		let mut len_buf = [0u8; 4];
		reader
			.read_exact(&mut len_buf)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {}", e)))?;

		let length = u32::from_le_bytes(len_buf) as usize;
		if length > MAX_FRAME_BYTES {
			return Err(Error::ProtocolError(format!("frame length {length} exceeds limit")));
		}

		let mut message_buf = vec![0u8; length];
		reader
			.read_exact(&mut message_buf)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read message: {}", e)))?;

		let message: Value = serde_json::from_slice(&message_buf)?;
		if message_tx.send(message).is_err() {
			tracing::debug!(target = "invite.bridge", "transport receiver dropped; stopping reader");
			return Ok(());
		}
	}
}
