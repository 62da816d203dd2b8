//! Bridge driver lookup
//!
//! Locates the Node.js executable and the bridge script that drives the
//! messaging web client.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Package directory name of the bridge when installed with `npm -g`.
const BRIDGE_PACKAGE: &str = "invite-bridge";
/// Entry point inside the bridge package.
const BRIDGE_SCRIPT: &str = "bridge.js";

/// Resolved `node` + bridge script pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeExecutable {
	pub node: PathBuf,
	pub script: PathBuf,
}

/// Locate the bridge executable.
///
/// Search order:
/// 1. `INVITE_BRIDGE_NODE` and `INVITE_BRIDGE_JS` environment variables
/// 2. `INVITE_BRIDGE_PATH` environment variable (`<dir>/node` + `<dir>/bridge.js`)
/// 3. `configured` script path (node taken from PATH)
/// 4. Bridge shipped with the workspace (`bridge/bridge.js`, found by build.rs)
/// 5. Global npm installation (`npm root -g`/invite-bridge/bridge.js)
///
/// Runtime environment variables take precedence over configuration so a
/// wrapper script can pin a specific Node.js build.
///
/// # Errors
///
/// Returns `Error::BridgeNotFound` if no usable candidate exists.
pub fn locate_bridge(configured: Option<&Path>) -> Result<BridgeExecutable> {
	if let Some((node, script)) = try_node_script_env() {
		if let Some(exe) = resolve_candidate_with_fallback("INVITE_BRIDGE_NODE/INVITE_BRIDGE_JS", node, script, find_node_executable) {
			return Ok(exe);
		}
	}

	if let Some((node, script)) = try_bridge_path_env() {
		if let Some(exe) = resolve_candidate_with_fallback("INVITE_BRIDGE_PATH", node, script, find_node_executable) {
			return Ok(exe);
		}
	}

	if let Some(script) = configured {
		if !script.exists() {
			return Err(Error::LaunchFailed(format!("configured bridge script does not exist: {}", script.display())));
		}
		let node = find_node_executable()?;
		if let Some(exe) = resolve_candidate_with_fallback("config", node, script.to_path_buf(), find_node_executable) {
			return Ok(exe);
		}
	}

	if let Some(script) = try_bundled_script() {
		let node = find_node_executable()?;
		if let Some(exe) = resolve_candidate_with_fallback("bundled", node, script, find_node_executable) {
			return Ok(exe);
		}
	}

	if let Some(script) = try_npm_global() {
		let node = find_node_executable()?;
		if let Some(exe) = resolve_candidate_with_fallback("npm global", node, script, find_node_executable) {
			return Ok(exe);
		}
	}

	Err(Error::BridgeNotFound)
}

fn resolve_candidate_with_fallback<F>(label: &str, node: PathBuf, script: PathBuf, find_node: F) -> Option<BridgeExecutable>
where
	F: Fn() -> Result<PathBuf>,
{
	let usable = node_is_usable(&node);
	debug!(target = "invite.bridge", source = label, node = %node.display(), script = %script.display(), usable, "bridge candidate");
	if usable {
		return Some(BridgeExecutable { node, script });
	}

	warn!(
		target = "invite.bridge",
		source = label,
		node = %node.display(),
		"bridge candidate node is not runnable; trying fallback node"
	);

	let fallback_node = find_node().ok()?;
	if fallback_node == node {
		return None;
	}

	if node_is_usable(&fallback_node) {
		warn!(
			target = "invite.bridge",
			source = label,
			node = %fallback_node.display(),
			"using fallback node executable for bridge"
		);
		return Some(BridgeExecutable { node: fallback_node, script });
	}

	None
}

fn try_node_script_env() -> Option<(PathBuf, PathBuf)> {
	let node = PathBuf::from(std::env::var_os("INVITE_BRIDGE_NODE")?);
	let script = PathBuf::from(std::env::var_os("INVITE_BRIDGE_JS")?);
	(node.exists() && script.exists()).then_some((node, script))
}

fn try_bridge_path_env() -> Option<(PathBuf, PathBuf)> {
	let dir = PathBuf::from(std::env::var_os("INVITE_BRIDGE_PATH")?);
	let node = if cfg!(windows) { dir.join("node.exe") } else { dir.join("node") };
	let script = dir.join(BRIDGE_SCRIPT);
	(node.exists() && script.exists()).then_some((node, script))
}

fn try_bundled_script() -> Option<PathBuf> {
	// Set by build.rs when the workspace ships bridge/bridge.js.
	let script = PathBuf::from(option_env!("INVITE_BUNDLED_BRIDGE")?);
	script.exists().then_some(script)
}

fn try_npm_global() -> Option<PathBuf> {
	let output = Command::new("npm").args(["root", "-g"]).output().ok()?;
	if !output.status.success() {
		return None;
	}
	let npm_root = String::from_utf8_lossy(&output.stdout).trim().to_string();
	let script = PathBuf::from(npm_root).join(BRIDGE_PACKAGE).join(BRIDGE_SCRIPT);
	script.exists().then_some(script)
}

fn node_is_usable(node: &Path) -> bool {
	Command::new(node)
		.arg("--version")
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}

/// Find the node executable in PATH or common locations
fn find_node_executable() -> Result<PathBuf> {
	if let Ok(path) = which::which("node") {
		return Ok(path);
	}

	#[cfg(not(windows))]
	let common_locations = ["/usr/local/bin/node", "/usr/bin/node", "/opt/homebrew/bin/node"];

	#[cfg(windows)]
	let common_locations = ["C:\\Program Files\\nodejs\\node.exe", "C:\\Program Files (x86)\\nodejs\\node.exe"];

	common_locations
		.into_iter()
		.map(PathBuf::from)
		.find(|path| path.exists())
		.ok_or_else(|| Error::LaunchFailed("Node.js executable not found. Install Node.js or set INVITE_BRIDGE_NODE.".to_string()))
}
