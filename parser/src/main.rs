//! ValutaTrade rate parser binary.

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use valutatrade_parser::{init_logging, render_error, App, Cli, Command};
use valutatrade_rates::{ParserConfig, RatesResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ParserConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_level, config.log_json)?;

    info!(data_dir = %config.data_dir.display(), "Starting ValutaTrade parser");

    let app = App::new(config);
    match run(&app, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Command failed");
            eprintln!("{}", render_error(&e, app.registry()));
            std::process::exit(1);
        }
    }
}

async fn run(app: &App, command: Command) -> RatesResult<String> {
    match command {
        Command::UpdateRates { source } => app.update_rates(source.map(Into::into)).await,
        Command::GetRate { from, to } => app.get_rate(&from, &to),
        Command::ShowRates { currency, top } => app.show_rates(currency.as_deref(), top),
        Command::Currencies => Ok(app.currencies()),
        Command::Schedule { interval } => {
            let shutdown = async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Shutdown signal received"),
                    Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
                }
            };
            app.schedule(interval, shutdown).await
        }
    }
}
