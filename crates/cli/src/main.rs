use clap::Parser;
use invite_cli::{cli::Cli, commands, logging, output};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let diagnostics = cli.diagnostics;

	if let Err(err) = commands::dispatch(cli).await {
		output::print_failure(&output::failure_for(&err, diagnostics));
		std::process::exit(1);
	}
}
