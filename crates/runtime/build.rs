//! Build script for invite-runtime
//!
//! Points the runtime at the bridge script shipped in the workspace `bridge/`
//! directory, so a source checkout finds it without an npm global install.

use std::env;
use std::path::PathBuf;

fn main() {
	println!("cargo:rerun-if-changed=build.rs");

	let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
	let script = manifest_dir.join("..").join("..").join("bridge").join("bridge.js");
	println!("cargo:rerun-if-changed={}", script.display());

	if script.exists() {
		println!("cargo:rustc-env=INVITE_BUNDLED_BRIDGE={}", script.display());
	}
}
