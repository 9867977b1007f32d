use std::fmt::Display;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use sitescan_scanner::{ChromiumSessionProvider, ScanConfig, Scanner};

mod cli;
mod output;
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("SITESCAN_LOG").unwrap_or_else(|_| "sitescan=info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            error.exit()
        }
        Err(error) => {
            // clap's rendering already carries the usage line.
            let _ = error.print();
            std::process::exit(1)
        }
    };

    let Some(url) = args.url else {
        usage_error("missing <URL>");
    };
    let config = match ScanConfig::from_settings(&args.settings) {
        Ok(config) => config,
        Err(error) => usage_error(error),
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), url = %url, "sitescan starting");

    let scanner = Scanner::new(Box::new(ChromiumSessionProvider::from_env()), config);
    let scan = scanner.run(&url).await?;
    println!(
        "Resolved final URL: {} (status: {})",
        scan.report.final_url,
        scan.report.status_label()
    );

    let cwd = std::env::current_dir().context("failed to resolve the working directory")?;
    let path = output::write_report(&scan.report, &cwd, &url, Utc::now())?;
    println!("Results written to {}", path.display());
    Ok(())
}

fn usage_error(message: impl Display) -> ! {
    eprintln!("error: {message}");
    eprintln!("{}", Args::command().render_usage());
    std::process::exit(1)
}
