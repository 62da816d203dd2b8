//! Terminal pairing: print each pairing code as a QR until the sender is linked.

use std::time::Duration;

use anyhow::Result;
use invite::{SenderId, SessionManager};
use qrcode::QrCode;
use tracing::warn;

const CODE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(sessions: &SessionManager, sender: &SenderId, timeout: Duration) -> Result<()> {
	let wait = sessions.wait_until_ready(sender, Some(timeout));
	tokio::pin!(wait);

	let mut ticker = tokio::time::interval(CODE_CHECK_INTERVAL);
	let mut shown: Option<String> = None;

	let handle = loop {
		tokio::select! {
			result = &mut wait => break result?,
			_ = ticker.tick() => {
				let code = sessions.pairing_code(sender);
				if code.is_some() && code != shown {
					if let Some(code) = &code {
						eprintln!("Scan with the messaging app of {sender} (Linked devices):");
						print_qr(code);
					}
					shown = code;
				}
			}
		}
	};

	match handle.identity() {
		Some(identity) => eprintln!("{sender} is linked as {}", identity.display_name.as_deref().unwrap_or(&identity.id)),
		None => eprintln!("{sender} is linked"),
	}
	Ok(())
}

/// Render a QR code to the terminal using Unicode half-blocks.
fn print_qr(data: &str) {
	match QrCode::new(data.as_bytes()) {
		Ok(code) => {
			let image = code.render::<char>().quiet_zone(true).module_dimensions(2, 1).build();
			eprintln!("{image}");
		}
		Err(e) => {
			warn!(target = "invite.cli", error = %e, "QR code generation failed");
			eprintln!("{data}");
		}
	}
}
