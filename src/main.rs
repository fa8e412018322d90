//! labsupd entry point.

use clap::Parser;

use labsup::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => commands::run(cli.config.as_deref()).await,
        Commands::CheckConfig => commands::check_config(cli.config.as_deref()),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
