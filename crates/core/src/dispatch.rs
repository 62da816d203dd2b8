//! Sequential invitation sending.

#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{InviteError, Result};
use crate::gateway::Guest;
use crate::phone::PhoneNormalizer;
use crate::session::SessionManager;
use crate::transport::TransportError;
use crate::types::{MessageId, SenderId};

pub const DEFAULT_TEMPLATE: &str = "Hi {name}! We are getting married and would love to celebrate with you.{addons}\nPlease let us know if you can make it: {link}";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
	/// Send attempts per guest, the first one included.
	pub max_attempts: u32,
	/// Wait between attempts after a transient failure.
	pub retry_backoff: Duration,
	/// Pause between consecutive guests; not applied after the last one.
	pub inter_message_delay: Duration,
	/// Budget for the sender's session to become ready; `None` waits forever.
	pub ready_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			retry_backoff: Duration::from_secs(5),
			inter_message_delay: Duration::from_secs(3),
			ready_timeout: Some(Duration::from_secs(120)),
		}
	}
}

/// Renders invitation text from a template with `{name}`, `{addons}` and
/// `{link}` placeholders.
#[derive(Debug, Clone)]
pub struct MessageComposer {
	template: String,
	rsvp_base_url: Url,
}

impl MessageComposer {
	/// # Errors
	///
	/// `InviteError::Configuration` if `rsvp_base_url` is not an absolute URL.
	pub fn new(template: impl Into<String>, rsvp_base_url: &str) -> Result<Self> {
		let rsvp_base_url = Url::parse(rsvp_base_url).map_err(|e| InviteError::Configuration(format!("invalid RSVP base URL {rsvp_base_url:?}: {e}")))?;
		Ok(Self {
			template: template.into(),
			rsvp_base_url,
		})
	}

	/// RSVP page link carrying the guest's normalized phone.
	pub fn rsvp_link(&self, phone: &str) -> String {
		let mut url = self.rsvp_base_url.clone();
		url.query_pairs_mut().append_pair("phone", phone);
		url.into()
	}

	pub fn compose(&self, name: &str, addons: Option<&str>, phone: &str) -> String {
		let addons = match addons.map(str::trim) {
			Some(text) if !text.is_empty() => format!("\n{text}"),
			_ => String::new(),
		};
		self.template
			.replace("{name}", name.trim())
			.replace("{addons}", &addons)
			.replace("{link}", &self.rsvp_link(phone))
	}
}

/// Outcome for one guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchDetail {
	pub name: String,
	/// Normalized phone the message went to.
	pub phone: String,
	pub success: bool,
	pub message_id: Option<MessageId>,
	pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
	pub total: usize,
	pub successful: usize,
	pub failed: usize,
	pub details: Vec<DispatchDetail>,
}

impl BatchSummary {
	pub fn from_details(details: Vec<DispatchDetail>) -> Self {
		let successful = details.iter().filter(|d| d.success).count();
		Self {
			total: details.len(),
			successful,
			failed: details.len() - successful,
			details,
		}
	}
}

pub struct Dispatcher {
	sessions: SessionManager,
	normalizer: PhoneNormalizer,
	composer: MessageComposer,
	config: DispatchConfig,
}

impl Dispatcher {
	pub fn new(sessions: SessionManager, normalizer: PhoneNormalizer, composer: MessageComposer, config: DispatchConfig) -> Self {
		Self {
			sessions,
			normalizer,
			composer,
			config,
		}
	}

	/// Send one invitation per guest, in order, one at a time.
	///
	/// Individual failures are recorded in the summary and never abort the
	/// batch.
	///
	/// # Errors
	///
	/// Only when the sender's session cannot be made ready (`Timeout`,
	/// `AuthFailure`, `SessionClosed`, or a connector error).
	pub async fn send_batch(&self, sender: &SenderId, guests: &[Guest]) -> Result<BatchSummary> {
		self.sessions.wait_until_ready(sender, self.config.ready_timeout).await?;
		info!(target = "invite.dispatch", sender = %sender, guests = guests.len(), "dispatching invitations");

		let mut details = Vec::with_capacity(guests.len());
		for (index, guest) in guests.iter().enumerate() {
			details.push(self.dispatch_one(sender, guest).await);
			if index + 1 < guests.len() {
				tokio::time::sleep(self.config.inter_message_delay).await;
			}
		}

		let summary = BatchSummary::from_details(details);
		info!(
			target = "invite.dispatch",
			sender = %sender,
			total = summary.total,
			successful = summary.successful,
			failed = summary.failed,
			"dispatch finished"
		);
		Ok(summary)
	}

	async fn dispatch_one(&self, sender: &SenderId, guest: &Guest) -> DispatchDetail {
		let phone = self.normalizer.normalize(&guest.phone);
		if phone.is_empty() {
			warn!(target = "invite.dispatch", guest = %guest.name, "guest has no usable phone number");
			return DispatchDetail {
				name: guest.name.clone(),
				phone,
				success: false,
				message_id: None,
				error: Some(format!("no usable phone number in {:?}", guest.phone)),
			};
		}

		let body = self.composer.compose(&guest.name, guest.addons.as_deref(), &phone);
		let (message_id, error) = match self.send_with_retry(sender, &phone, &body).await {
			Ok(id) => {
				debug!(target = "invite.dispatch", guest = %guest.name, phone = %phone, message_id = %id, "invitation sent");
				(Some(id), None)
			}
			Err(e) => {
				warn!(target = "invite.dispatch", guest = %guest.name, phone = %phone, error = %e, "invitation failed");
				(None, Some(e.to_string()))
			}
		};

		DispatchDetail {
			name: guest.name.clone(),
			phone,
			success: message_id.is_some(),
			message_id,
			error,
		}
	}

	async fn send_with_retry(&self, sender: &SenderId, phone: &str, body: &str) -> std::result::Result<MessageId, TransportError> {
		let max_attempts = self.config.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			match self.sessions.send(sender, phone, body).await {
				Ok(id) => return Ok(id),
				Err(e) if e.is_transient() && attempt < max_attempts => {
					debug!(
						target = "invite.dispatch",
						phone = %phone,
						attempt,
						error = %e,
						backoff_ms = self.config.retry_backoff.as_millis() as u64,
						"transient send failure; retrying"
					);
					tokio::time::sleep(self.config.retry_backoff).await;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}
}
