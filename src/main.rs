//! `lcd-screensaver` entry point.
//!
//! Parses the command line, loads the configuration, installs the logger and
//! hands the invocation to [`commands::App`]. Usage errors exit with 2, any
//! other failure is logged and exits with 1.

use std::process::ExitCode;

use anyhow::Result;
use lcd_screensaver::cli::{self, Cli, USAGE, USAGE_EXIT_CODE};
use lcd_screensaver::commands::App;
use lcd_screensaver::config::Config;
use lcd_screensaver::logging;
use lcd_screensaver::registry::EffectRegistry;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let registry = EffectRegistry::builtin();

    let cli = match cli::parse(&args, &registry) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };

    match run(cli, &registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    cli: Cli,
    registry: &EffectRegistry,
) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    logging::init(&config.logging)?;
    log::debug!("{:?}", cli.invocation);

    App::new(&config, cli.config, registry).execute(&cli.invocation)
}
