//! labnorm command line.

use std::io::{self, IsTerminal};

use clap::Parser;
use labnorm_lib::config;
use labnorm_lib::logging::{init_logging, LogConfig, LogFormat};

mod cli;

use crate::cli::{Cli, LogFormatArg, EXIT_FATAL};

fn main() {
    let cli = Cli::parse();

    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(EXIT_FATAL);
    }
    tracing::debug!(version = config::APP_VERSION, "{} starting", config::APP_NAME);

    let exit_code = match cli::run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            EXIT_FATAL
        }
    };
    std::process::exit(exit_code);
}

fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Json => LogFormat::Json,
    };
    LogConfig::from_flags(cli.verbose, cli.quiet)
        .with_format(format)
        .with_ansi(io::stderr().is_terminal())
}
