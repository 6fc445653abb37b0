//! Spell CLI - run commands across many Juju controllers

use clap::Parser;
use tracing_subscriber::EnvFilter;

use spell_cli::cli::Cli;
use spell_cli::domain::error::SpellError;
use spell_cli::output::json::format_error;

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        e.exit();
    }
    init_tracing(cli.verbose);
    let json = cli.json;

    match cli.run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if json {
                let code = e.downcast_ref::<SpellError>().map_or("error", SpellError::code);
                match format_error(&format!("{e:#}"), code) {
                    Ok(obj) => eprintln!("{obj}"),
                    Err(_) => eprintln!("Error: {e:#}"),
                }
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
