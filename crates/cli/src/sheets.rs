//! Guest sheets kept as JSON documents on disk.
//!
//! One file per sheet id under the sheets directory:
//!
//! ```text
//! { "guests": [{ "name": "Dana", "phone": "050-123-4567", "sender": "Yuval", "send": true }],
//!   "responses": [] }
//! ```
//!
//! `sent` is written back on each guest after a dispatch.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use invite::gateway::distinct_senders;
use invite::{Guest, GuestSource, InviteError, PhoneNormalizer, Result, RsvpResponse};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
	#[serde(flatten)]
	pub guest: Guest,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sent: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetDocument {
	#[serde(default)]
	pub guests: Vec<SheetRow>,
	#[serde(default)]
	pub responses: Vec<RsvpResponse>,
}

pub struct SheetStore {
	dir: PathBuf,
	normalizer: PhoneNormalizer,
	/// Serializes read-modify-write cycles.
	write_lock: Mutex<()>,
}

impl SheetStore {
	pub fn new(dir: impl Into<PathBuf>, normalizer: PhoneNormalizer) -> Self {
		Self {
			dir: dir.into(),
			normalizer,
			write_lock: Mutex::new(()),
		}
	}

	fn path(&self, sheet_id: &str) -> Result<PathBuf> {
		let valid = !sheet_id.is_empty() && sheet_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
		if !valid {
			return Err(InviteError::DataSource(format!("invalid sheet id {sheet_id:?}")));
		}
		Ok(self.dir.join(format!("{sheet_id}.json")))
	}

	async fn read(&self, sheet_id: &str) -> Result<SheetDocument> {
		let path = self.path(sheet_id)?;
		let raw = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
			std::io::ErrorKind::NotFound => InviteError::DataSource(format!("sheet {sheet_id} not found")),
			_ => InviteError::DataSource(format!("cannot read sheet {sheet_id}: {e}")),
		})?;
		serde_json::from_str(&raw).map_err(|e| InviteError::DataSource(format!("sheet {sheet_id} is malformed: {e}")))
	}

	async fn write(&self, sheet_id: &str, document: &SheetDocument) -> Result<()> {
		let path = self.path(sheet_id)?;
		let body = serde_json::to_string_pretty(document)?;
		write_replacing(&path, body.as_bytes())
			.await
			.map_err(|e| InviteError::DataSource(format!("cannot write sheet {sheet_id}: {e}")))
	}

	fn same_phone(&self, a: &str, b: &str) -> bool {
		let a = self.normalizer.normalize(a);
		!a.is_empty() && a == self.normalizer.normalize(b)
	}
}

async fn write_replacing(path: &Path, body: &[u8]) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let staging = path.with_extension("json.tmp");
	tokio::fs::write(&staging, body).await?;
	tokio::fs::rename(&staging, path).await
}

#[async_trait]
impl GuestSource for SheetStore {
	async fn fetch_guests(&self, sheet_id: &str) -> Result<Vec<Guest>> {
		let document = self.read(sheet_id).await?;
		Ok(document.guests.into_iter().map(|row| row.guest).collect())
	}

	async fn fetch_senders_distinct(&self, sheet_id: &str) -> Result<Vec<String>> {
		let guests = self.fetch_guests(sheet_id).await?;
		Ok(distinct_senders(&guests))
	}

	async fn mark_send_status(&self, sheet_id: &str, phone: &str, sent: bool) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.read(sheet_id).await?;

		let mut matched = 0;
		for row in document.guests.iter_mut().filter(|row| self.same_phone(&row.guest.phone, phone)) {
			row.sent = Some(sent);
			matched += 1;
		}
		if matched == 0 {
			return Err(InviteError::DataSource(format!("no guest with phone {phone} in sheet {sheet_id}")));
		}

		debug!(target = "invite.sheets", sheet = sheet_id, phone, sent, rows = matched, "send status recorded");
		self.write(sheet_id, &document).await
	}

	async fn append_or_update_response(&self, sheet_id: &str, response: &RsvpResponse) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.read(sheet_id).await?;

		let existing = document.responses.iter_mut().find(|r| self.same_phone(&r.phone, &response.phone));
		match existing {
			Some(slot) => *slot = response.clone(),
			None => document.responses.push(response.clone()),
		}
		self.write(sheet_id, &document).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn store_with(json: &str) -> (SheetStore, TempDir) {
		let tmp = TempDir::new().unwrap();
		std::fs::write(tmp.path().join("main.json"), json).unwrap();
		(SheetStore::new(tmp.path(), PhoneNormalizer::default()), tmp)
	}

	const SHEET: &str = r#"{
		"guests": [
			{ "name": "Dana", "phone": "050-123-4567", "sender": "Yuval", "send": true },
			{ "name": "Omer", "phone": "0527654321", "sender": "Noa", "send": true, "addons": "+1" },
			{ "name": "Lior", "phone": "0541112222", "sender": "yuval" }
		]
	}"#;

	#[tokio::test]
	async fn fetches_guests_and_distinct_senders() {
		let (store, _tmp) = store_with(SHEET);

		let guests = store.fetch_guests("main").await.unwrap();
		assert_eq!(guests.len(), 3);
		assert_eq!(guests[1].addons.as_deref(), Some("+1"));
		assert!(!guests[2].send);

		assert_eq!(store.fetch_senders_distinct("main").await.unwrap(), vec!["Yuval", "Noa"]);
	}

	#[tokio::test]
	async fn marks_status_by_normalized_phone() {
		let (store, tmp) = store_with(SHEET);

		store.mark_send_status("main", "972501234567", true).await.unwrap();

		let raw = std::fs::read_to_string(tmp.path().join("main.json")).unwrap();
		let document: SheetDocument = serde_json::from_str(&raw).unwrap();
		assert_eq!(document.guests[0].sent, Some(true));
		assert_eq!(document.guests[1].sent, None);
		assert_eq!(document.guests[0].guest.name, "Dana");
	}

	#[tokio::test]
	async fn unknown_phone_is_a_data_source_error() {
		let (store, _tmp) = store_with(SHEET);
		let err = store.mark_send_status("main", "972509999999", true).await.unwrap_err();
		assert!(matches!(err, InviteError::DataSource(_)));
	}

	#[tokio::test]
	async fn responses_are_replaced_per_phone() {
		let (store, _tmp) = store_with(SHEET);
		let mut response = RsvpResponse {
			name: "Dana".into(),
			phone: "0501234567".into(),
			attending: true,
			guest_count: 2,
		};
		store.append_or_update_response("main", &response).await.unwrap();

		response.phone = "+972 50-123-4567".into();
		response.attending = false;
		store.append_or_update_response("main", &response).await.unwrap();

		let document = store.read("main").await.unwrap();
		assert_eq!(document.responses.len(), 1);
		assert!(!document.responses[0].attending);
	}

	#[tokio::test]
	async fn missing_sheet_and_bad_ids_fail() {
		let (store, _tmp) = store_with(SHEET);
		assert!(matches!(store.fetch_guests("other").await, Err(InviteError::DataSource(msg)) if msg.contains("not found")));
		assert!(matches!(store.fetch_guests("../main").await, Err(InviteError::DataSource(_))));
	}
}
