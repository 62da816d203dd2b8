//! Contract with the spreadsheet holding guests and RSVP responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::SenderId;

/// One row of the guest list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
	pub name: String,
	/// Phone as typed into the sheet; normalized at send time.
	pub phone: String,
	/// Extra line appended to the invitation, e.g. "+1 welcome".
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub addons: Option<String>,
	/// Name of the sender who invites this guest.
	#[serde(default)]
	pub sender: String,
	/// Whether the guest is marked for sending.
	#[serde(default)]
	pub send: bool,
}

impl Guest {
	pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			phone: phone.into(),
			addons: None,
			sender: String::new(),
			send: true,
		}
	}

	/// Marked for sending and assigned to `sender` (trimmed, case-insensitive).
	pub fn eligible_for(&self, sender: &SenderId) -> bool {
		self.send && self.sender.trim().to_lowercase() == sender.as_str().to_lowercase()
	}
}

/// An RSVP as submitted through the web form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpResponse {
	pub name: String,
	pub phone: String,
	pub attending: bool,
	#[serde(default)]
	pub guest_count: u32,
}

/// Spreadsheet access. Failures surface as `InviteError::DataSource` and are
/// never retried here.
#[async_trait]
pub trait GuestSource: Send + Sync {
	async fn fetch_guests(&self, sheet_id: &str) -> Result<Vec<Guest>>;

	/// Distinct sender names in first-seen order.
	async fn fetch_senders_distinct(&self, sheet_id: &str) -> Result<Vec<String>>;

	async fn mark_send_status(&self, sheet_id: &str, phone: &str, sent: bool) -> Result<()>;

	/// Add the response, or replace the existing one for the same phone.
	async fn append_or_update_response(&self, sheet_id: &str, response: &RsvpResponse) -> Result<()>;
}

/// Distinct non-blank sender names, compared case-insensitively, in
/// first-seen order.
pub fn distinct_senders<'a>(guests: impl IntoIterator<Item = &'a Guest>) -> Vec<String> {
	let mut seen = std::collections::HashSet::new();
	guests
		.into_iter()
		.map(|g| g.sender.trim())
		.filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn guest(name: &str, sender: &str, send: bool) -> Guest {
		Guest {
			sender: sender.to_string(),
			send,
			..Guest::new(name, "0501234567")
		}
	}

	#[test]
	fn eligibility_needs_flag_and_matching_sender() {
		let yuval = SenderId::new("Yuval").unwrap();
		assert!(guest("Dana", " yuval ", true).eligible_for(&yuval));
		assert!(!guest("Dana", "Yuval", false).eligible_for(&yuval));
		assert!(!guest("Dana", "Noa", true).eligible_for(&yuval));
	}

	#[test]
	fn distinct_senders_keep_first_spelling_and_order() {
		let guests = vec![guest("a", "Yuval", true), guest("b", "Noa", true), guest("c", "yuval", false), guest("d", "  ", true)];
		assert_eq!(distinct_senders(&guests), vec!["Yuval".to_string(), "Noa".to_string()]);
	}

	#[test]
	fn guest_rows_deserialize_with_defaults() {
		let guest: Guest = serde_json::from_str(r#"{"name":"Dana","phone":"050-123-4567"}"#).unwrap();
		assert_eq!(guest.addons, None);
		assert_eq!(guest.sender, "");
		assert!(!guest.send);
	}
}
