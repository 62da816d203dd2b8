//! Wiring shared by the server and the one-shot commands.

use std::sync::Arc;

use invite::{BatchSummary, Connector, Dispatcher, GuestSource, PhoneNormalizer, Result, SenderId, SessionManager};
use tracing::{info, warn};

use crate::config::Settings;
use crate::sheets::SheetStore;

/// Everything a dispatch needs.
#[derive(Clone)]
pub struct App {
	pub sessions: SessionManager,
	pub dispatcher: Arc<Dispatcher>,
	pub sheets: Arc<dyn GuestSource>,
	pub normalizer: PhoneNormalizer,
}

impl App {
	/// # Errors
	///
	/// `Configuration` if the settings cannot support sending.
	pub fn build(settings: &Settings, connector: Arc<dyn Connector>) -> Result<Self> {
		settings.validate()?;
		let normalizer = settings.phone_normalizer()?;
		let sessions = settings.session_manager(connector);
		let dispatcher = Dispatcher::new(sessions.clone(), normalizer.clone(), settings.composer()?, settings.dispatch.clone());
		let sheets = Arc::new(SheetStore::new(settings.sheets_dir(), normalizer.clone()));

		Ok(Self {
			sessions,
			dispatcher: Arc::new(dispatcher),
			sheets,
			normalizer,
		})
	}

	/// Send to every guest of `sheet_id` eligible for `sender` and record the
	/// outcome of each send back into the sheet.
	///
	/// Failing to record a status is logged; the batch result stands.
	pub async fn dispatch_sheet(&self, sheet_id: &str, sender: &SenderId) -> Result<BatchSummary> {
		let guests: Vec<_> = self
			.sheets
			.fetch_guests(sheet_id)
			.await?
			.into_iter()
			.filter(|guest| guest.eligible_for(sender))
			.collect();
		info!(target = "invite.app", sheet = sheet_id, sender = %sender, eligible = guests.len(), "dispatching sheet");

		let summary = self.dispatcher.send_batch(sender, &guests).await?;

		for detail in summary.details.iter().filter(|d| !d.phone.is_empty()) {
			if let Err(e) = self.sheets.mark_send_status(sheet_id, &detail.phone, detail.success).await {
				warn!(target = "invite.app", sheet = sheet_id, phone = %detail.phone, error = %e, "could not record send status");
			}
		}
		Ok(summary)
	}
}
