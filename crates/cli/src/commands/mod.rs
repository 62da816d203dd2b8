mod pair;

use std::time::Duration;

use anyhow::{Context, Result};
use invite::SenderId;
use tracing::info;

use crate::app::App;
use crate::cli::{Cli, Command};
use crate::config::{ConfigFile, Settings};
use crate::server;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let file = ConfigFile::load(cli.config.as_deref())?;
	let mut settings = Settings::resolve(file, cli.data_dir, cli.diagnostics);

	match cli.command {
		Command::Serve { host, port } => {
			if let Some(host) = host {
				settings.host = host;
			}
			if let Some(port) = port {
				settings.port = port;
			}
			let app = App::build(&settings, settings.connector())?;
			server::serve(&settings, app).await
		}

		Command::Pair { sender, timeout } => {
			let sender = SenderId::new(sender)?;
			let sessions = settings.session_manager(settings.connector());
			let result = pair::run(&sessions, &sender, Duration::from_secs(timeout)).await;
			sessions.shutdown().await;
			result
		}

		Command::Send { sheet, sender } => {
			let sender = SenderId::new(sender)?;
			let app = App::build(&settings, settings.connector())?;
			let result = app.dispatch_sheet(&sheet, &sender).await;
			app.sessions.shutdown().await;

			let summary = result.with_context(|| format!("dispatching sheet {sheet} for {sender}"))?;
			println!("{}", serde_json::to_string_pretty(&summary)?);
			Ok(())
		}

		Command::Clear { sender } => {
			let sender = SenderId::new(sender)?;
			let sessions = settings.session_manager(settings.connector());
			sessions.clear_session(&sender).await?;
			info!(target = "invite.cli", sender = %sender, "credentials cleared");
			eprintln!("Cleared stored credentials for {sender}");
			Ok(())
		}
	}
}
