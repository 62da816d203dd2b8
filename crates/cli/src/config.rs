//! Config file loading and resolution into runtime settings.
//!
//! Every field of the file is optional; missing ones fall back to the
//! defaults below and command-line flags win over both.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use invite::session::DEFAULT_POLL_INTERVAL;
use invite::{
	BridgeConnector, Connector, DEFAULT_COUNTRY_CODE, DEFAULT_TEMPLATE, DispatchConfig, InviteError, ManagerConfig, MessageComposer, PhoneNormalizer,
	ReaperConfig, Result, SessionManager, SessionStore,
};
use serde::{Deserialize, Serialize};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PAIRING_WAIT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
	pub server: ServerSection,
	pub dispatch: DispatchSection,
	pub session: SessionSection,
	pub reaper: ReaperSection,
	pub phone: PhoneSection,
	pub bridge: BridgeSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
	pub host: Option<String>,
	pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
	pub max_attempts: Option<u32>,
	pub retry_backoff_ms: Option<u64>,
	pub inter_message_delay_ms: Option<u64>,
	/// `0` waits for readiness without a deadline.
	pub ready_timeout_ms: Option<u64>,
	pub rsvp_base_url: Option<String>,
	pub template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
	pub poll_interval_ms: Option<u64>,
	/// How long `POST /api/sessions/{sender}` waits for a pairing code.
	pub pairing_wait_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperSection {
	pub codes_interval_secs: Option<u64>,
	pub stuck_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneSection {
	pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
	pub script: Option<PathBuf>,
	pub headless: Option<bool>,
	pub request_timeout_ms: Option<u64>,
}

impl ConfigFile {
	/// Load `explicit`, or the default location if it exists.
	///
	/// # Errors
	///
	/// `Configuration` if an explicitly named file is missing or any file
	/// fails to parse.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		let (path, required) = match explicit {
			Some(path) => (path.to_path_buf(), true),
			None => (default_config_path(), false),
		};

		let raw = match std::fs::read_to_string(&path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => return Ok(Self::default()),
			Err(e) => return Err(InviteError::Configuration(format!("cannot read {}: {e}", path.display()))),
		};
		serde_json::from_str(&raw).map_err(|e| InviteError::Configuration(format!("invalid config {}: {e}", path.display())))
	}
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
	pub host: String,
	pub port: u16,
	pub data_dir: PathBuf,
	pub dispatch: DispatchConfig,
	pub rsvp_base_url: Option<String>,
	pub template: String,
	pub poll_interval: Duration,
	pub pairing_wait: Duration,
	pub reaper: ReaperConfig,
	pub country_code: String,
	pub bridge_script: Option<PathBuf>,
	pub headless: bool,
	pub bridge_request_timeout: Option<Duration>,
	pub diagnostics: bool,
}

impl Settings {
	pub fn resolve(file: ConfigFile, data_dir: Option<PathBuf>, diagnostics: bool) -> Self {
		let defaults = DispatchConfig::default();
		let dispatch = DispatchConfig {
			max_attempts: file.dispatch.max_attempts.unwrap_or(defaults.max_attempts),
			retry_backoff: millis_or(file.dispatch.retry_backoff_ms, defaults.retry_backoff),
			inter_message_delay: millis_or(file.dispatch.inter_message_delay_ms, defaults.inter_message_delay),
			ready_timeout: match file.dispatch.ready_timeout_ms {
				Some(0) => None,
				Some(ms) => Some(Duration::from_millis(ms)),
				None => defaults.ready_timeout,
			},
		};

		let reaper_defaults = ReaperConfig::default();
		let stuck_interval = secs_or(file.reaper.stuck_interval_secs, reaper_defaults.stuck_interval);
		let reaper = ReaperConfig {
			codes_interval: secs_or(file.reaper.codes_interval_secs, reaper_defaults.codes_interval),
			stuck_interval,
			stuck_after: stuck_interval,
		};

		Self {
			host: file.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
			port: file.server.port.unwrap_or(DEFAULT_PORT),
			data_dir: data_dir.unwrap_or_else(default_data_dir),
			dispatch,
			rsvp_base_url: file.dispatch.rsvp_base_url,
			template: file.dispatch.template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
			poll_interval: millis_or(file.session.poll_interval_ms, DEFAULT_POLL_INTERVAL),
			pairing_wait: millis_or(file.session.pairing_wait_ms, DEFAULT_PAIRING_WAIT),
			reaper,
			country_code: file.phone.country_code.unwrap_or_else(|| DEFAULT_COUNTRY_CODE.to_string()),
			bridge_script: file.bridge.script,
			headless: file.bridge.headless.unwrap_or(true),
			bridge_request_timeout: file.bridge.request_timeout_ms.map(Duration::from_millis),
			diagnostics,
		}
	}

	/// Check everything sending depends on, before any session is opened.
	pub fn validate(&self) -> Result<()> {
		if self.dispatch.max_attempts == 0 {
			return Err(InviteError::Configuration("dispatch.max_attempts must be at least 1".to_string()));
		}
		self.phone_normalizer()?;
		self.composer()?;
		Ok(())
	}

	pub fn credentials_dir(&self) -> PathBuf {
		self.data_dir.join("credentials")
	}

	pub fn sheets_dir(&self) -> PathBuf {
		self.data_dir.join("sheets")
	}

	pub fn phone_normalizer(&self) -> Result<PhoneNormalizer> {
		PhoneNormalizer::new(self.country_code.clone())
	}

	pub fn composer(&self) -> Result<MessageComposer> {
		let url = self
			.rsvp_base_url
			.as_deref()
			.ok_or_else(|| InviteError::Configuration("dispatch.rsvp_base_url is required".to_string()))?;
		MessageComposer::new(self.template.clone(), url)
	}

	pub fn connector(&self) -> Arc<dyn Connector> {
		let mut connector = BridgeConnector::new().script(self.bridge_script.clone()).headless(self.headless);
		if let Some(timeout) = self.bridge_request_timeout {
			connector = connector.request_timeout(timeout);
		}
		Arc::new(connector)
	}

	pub fn session_manager(&self, connector: Arc<dyn Connector>) -> SessionManager {
		let config = ManagerConfig {
			poll_interval: self.poll_interval,
			..ManagerConfig::new(self.credentials_dir())
		};
		SessionManager::new(SessionStore::new(), connector, config)
	}
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
	value.map(Duration::from_millis).unwrap_or(default)
}

fn secs_or(value: Option<u64>, default: Duration) -> Duration {
	value.map(Duration::from_secs).unwrap_or(default)
}

fn default_config_path() -> PathBuf {
	dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("invite").join("config.json")
}

fn default_data_dir() -> PathBuf {
	dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("invite")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn settings(json: &str) -> Settings {
		let file: ConfigFile = serde_json::from_str(json).unwrap();
		Settings::resolve(file, Some(PathBuf::from("/tmp/invite")), false)
	}

	#[test]
	fn empty_file_resolves_to_defaults() {
		let settings = settings("{}");
		assert_eq!(settings.port, DEFAULT_PORT);
		assert_eq!(settings.dispatch.max_attempts, 3);
		assert_eq!(settings.dispatch.retry_backoff, Duration::from_secs(5));
		assert_eq!(settings.dispatch.inter_message_delay, Duration::from_secs(3));
		assert_eq!(settings.country_code, "972");
		assert_eq!(settings.reaper.stuck_after, settings.reaper.stuck_interval);
		assert!(settings.headless);
	}

	#[test]
	fn file_values_override_defaults() {
		let settings = settings(
			r#"{
				"server": { "port": 8080 },
				"dispatch": { "inter_message_delay_ms": 1500, "ready_timeout_ms": 0 },
				"reaper": { "stuck_interval_secs": 60 },
				"phone": { "country_code": "44" }
			}"#,
		);
		assert_eq!(settings.port, 8080);
		assert_eq!(settings.host, DEFAULT_HOST);
		assert_eq!(settings.dispatch.inter_message_delay, Duration::from_millis(1500));
		assert_eq!(settings.dispatch.ready_timeout, None);
		assert_eq!(settings.reaper.stuck_interval, Duration::from_secs(60));
		assert_eq!(settings.reaper.stuck_after, Duration::from_secs(60));
		assert_eq!(settings.country_code, "44");
		assert_eq!(settings.credentials_dir(), PathBuf::from("/tmp/invite/credentials"));
	}

	#[test]
	fn validate_requires_rsvp_url() {
		let err = settings("{}").validate().unwrap_err();
		assert!(matches!(err, InviteError::Configuration(msg) if msg.contains("rsvp_base_url")));

		let ok = settings(r#"{ "dispatch": { "rsvp_base_url": "https://example.com/rsvp" } }"#);
		assert!(ok.validate().is_ok());
	}

	#[test]
	fn validate_rejects_zero_attempts_and_bad_country_code() {
		let zero = settings(r#"{ "dispatch": { "max_attempts": 0, "rsvp_base_url": "https://example.com/rsvp" } }"#);
		assert!(matches!(zero.validate(), Err(InviteError::Configuration(_))));

		let bad_code = settings(r#"{ "dispatch": { "rsvp_base_url": "https://example.com/rsvp" }, "phone": { "country_code": "0x" } }"#);
		assert!(matches!(bad_code.validate(), Err(InviteError::Configuration(_))));
	}

	#[test]
	fn explicit_config_must_exist() {
		let tmp = TempDir::new().unwrap();
		let missing = tmp.path().join("config.json");
		assert!(matches!(ConfigFile::load(Some(&missing)), Err(InviteError::Configuration(_))));

		std::fs::write(&missing, r#"{ "server": { "port": 4000 } }"#).unwrap();
		assert_eq!(ConfigFile::load(Some(&missing)).unwrap().server.port, Some(4000));
	}

	#[test]
	fn malformed_config_is_a_configuration_error() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("config.json");
		std::fs::write(&path, "{ not json").unwrap();
		assert!(matches!(ConfigFile::load(Some(&path)), Err(InviteError::Configuration(_))));
	}
}
