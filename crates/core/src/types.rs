//! Identifier newtypes shared across the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InviteError;

/// Free-form key identifying one invitation sender.
///
/// Leading and trailing whitespace is trimmed; the remainder must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
	pub fn new(raw: impl AsRef<str>) -> Result<Self, InviteError> {
		let trimmed = raw.as_ref().trim();
		if trimmed.is_empty() {
			return Err(InviteError::Configuration("sender identifier must not be empty".to_string()));
		}
		Ok(Self(trimmed.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Filesystem-safe directory name for this sender's persisted credentials.
	///
	/// ASCII alphanumerics and `-` are kept; every other byte is written as
	/// `_xx` (lowercase hex), so distinct senders never share a directory.
	pub fn credential_dir_name(&self) -> String {
		let mut name = String::with_capacity(8 + self.0.len());
		name.push_str("session-");
		for byte in self.0.bytes() {
			if byte.is_ascii_alphanumeric() || byte == b'-' {
				name.push(byte as char);
			} else {
				name.push_str(&format!("_{byte:02x}"));
			}
		}
		name
	}
}

impl fmt::Display for SenderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for SenderId {
	type Err = InviteError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

impl<'de> Deserialize<'de> for SenderId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		Self::new(raw).map_err(serde::de::Error::custom)
	}
}

/// Network-assigned id of a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Account identity exposed by a connection once it can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
	/// Account id on the messaging network.
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
}

impl Identity {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			display_name: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sender_id_is_trimmed_and_non_empty() {
		assert_eq!(SenderId::new("  Yuval ").unwrap().as_str(), "Yuval");
		assert!(matches!(SenderId::new("   "), Err(InviteError::Configuration(_))));
	}

	#[test]
	fn credential_dir_name_escapes_unsafe_bytes() {
		assert_eq!(SenderId::new("Yuval").unwrap().credential_dir_name(), "session-Yuval");
		assert_eq!(SenderId::new("Dana & Yuval").unwrap().credential_dir_name(), "session-Dana_20_26_20Yuval");
		assert_eq!(SenderId::new("../etc").unwrap().credential_dir_name(), "session-_2e_2e_2fetc");
	}

	#[test]
	fn credential_dir_name_is_injective_for_escape_lookalikes() {
		let plain = SenderId::new("a_20b").unwrap().credential_dir_name();
		let spaced = SenderId::new("a b").unwrap().credential_dir_name();
		assert_ne!(plain, spaced);
	}

	#[test]
	fn sender_id_deserialize_rejects_blank() {
		assert!(serde_json::from_str::<SenderId>(r#""Yuval""#).is_ok());
		assert!(serde_json::from_str::<SenderId>(r#""  ""#).is_err());
	}
}
