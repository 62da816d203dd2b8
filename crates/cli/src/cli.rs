use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "invite")]
#[command(about = "Send wedding invitations from each sender's own messaging account")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Directory for sheets and per-sender credentials
	#[arg(long, global = true, value_name = "DIR", env = "INVITE_DATA_DIR")]
	pub data_dir: Option<PathBuf>,

	/// Config file (default: $XDG_CONFIG_HOME/invite/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Include debug details in error output
	#[arg(long, global = true, env = "INVITE_DIAGNOSTICS")]
	pub diagnostics: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Run the HTTP API and RSVP endpoints
	Serve {
		#[arg(long)]
		host: Option<String>,
		#[arg(short, long)]
		port: Option<u16>,
	},

	/// Link a sender's account by scanning pairing codes in the terminal
	Pair {
		sender: String,
		/// Give up if the account is not linked within this many seconds
		#[arg(long, default_value_t = 300, value_name = "SECS")]
		timeout: u64,
	},

	/// Send invitations to every eligible guest of a sender
	Send {
		#[arg(long, value_name = "ID")]
		sheet: String,
		#[arg(long, value_name = "NAME")]
		sender: String,
	},

	/// Forget a sender's linked account
	Clear { sender: String },
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn global_flags_work_after_the_subcommand() {
		let cli = Cli::try_parse_from(["invite", "send", "--sheet", "main", "--sender", "Yuval", "-vv", "--diagnostics"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert!(cli.diagnostics);
		match cli.command {
			Command::Send { sheet, sender } => {
				assert_eq!(sheet, "main");
				assert_eq!(sender, "Yuval");
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn pair_timeout_defaults_to_five_minutes() {
		let cli = Cli::try_parse_from(["invite", "pair", "Yuval"]).unwrap();
		assert!(matches!(cli.command, Command::Pair { timeout: 300, .. }));
	}

	#[test]
	fn send_requires_sheet_and_sender() {
		assert!(Cli::try_parse_from(["invite", "send", "--sheet", "main"]).is_err());
	}
}
