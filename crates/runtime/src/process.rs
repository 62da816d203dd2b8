//! Bridge process management
//!
//! Launches and tears down the Node.js bridge process for one sender.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::driver::BridgeExecutable;
use crate::error::{Error, Result};

/// Manages one bridge child process.
///
/// The bridge speaks the framed JSON protocol on its stdin/stdout; stderr is
/// inherited so its own logging reaches the operator.
#[derive(Debug)]
pub struct BridgeProcess {
	/// The bridge child process. Public so callers can take the stdio pipes.
	pub process: Child,
}

impl BridgeProcess {
	/// Launch `node <bridge.js>` with piped stdio.
	///
	/// # Errors
	///
	/// Returns `Error::LaunchFailed` if the process fails to start or exits
	/// immediately.
	pub async fn launch(executable: &BridgeExecutable) -> Result<Self> {
		let mut cmd = Command::new(&executable.node);
		cmd.arg(&executable.script)
			.env("INVITE_BRIDGE_PROTOCOL", "pipe")
			.env("INVITE_VERSION", env!("CARGO_PKG_VERSION"))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);

		// Headless Chromium location used by the bridge's puppeteer, when pinned.
		if let Ok(chrome) = std::env::var("PUPPETEER_EXECUTABLE_PATH") {
			cmd.env("PUPPETEER_EXECUTABLE_PATH", chrome);
		}

		let mut child = cmd.spawn().map_err(|e| Error::LaunchFailed(format!("Failed to spawn process: {}", e)))?;

		tokio::time::sleep(Duration::from_millis(100)).await;

		match child.try_wait() {
			Ok(Some(status)) => {
				return Err(Error::LaunchFailed(format!("Bridge process exited immediately with status: {}", status)));
			}
			Ok(None) => {}
			Err(e) => {
				return Err(Error::LaunchFailed(format!("Failed to check process status: {}", e)));
			}
		}

		Ok(Self { process: child })
	}

	/// Terminate the bridge and wait briefly for it to exit.
	///
	/// **Windows**: stdio pipes are closed before killing the process, since
	/// tokio services child stdio on a blocking pool that can otherwise hang.
	pub async fn shutdown(mut self) -> Result<()> {
		#[cfg(windows)]
		{
			drop(self.process.stdin.take());
			drop(self.process.stdout.take());
			drop(self.process.stderr.take());
		}

		if let Ok(Some(_)) = self.process.try_wait() {
			return Ok(());
		}

		self.process
			.kill()
			.await
			.map_err(|e| Error::LaunchFailed(format!("Failed to kill process: {}", e)))?;

		match tokio::time::timeout(Duration::from_secs(5), self.process.wait()).await {
			Ok(Ok(_)) => Ok(()),
			Ok(Err(e)) => Err(Error::LaunchFailed(format!("Failed to wait for process: {}", e))),
			Err(_) => {
				let _ = self.process.start_kill();
				Err(Error::Timeout("bridge shutdown after 5 seconds".to_string()))
			}
		}
	}
}
