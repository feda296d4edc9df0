mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod resource;
mod ui;

use anyhow::{Context as AnyhowContext, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use declarative::CancelToken;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
    /// Set by SIGINT/SIGTERM; checked between resources and between phases
    pub cancel: CancelToken,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let cancel = CancelToken::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancel.flag())
            .context("Failed to install signal handler")?;
    }

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        cancel,
    };

    match cli.command {
        Command::Deploy(args) => commands::deploy::run(&ctx, args),
        Command::Status(args) => commands::status::status(&ctx, args.target.as_deref()),
        Command::Diff(args) => commands::status::diff(&ctx, args.target.as_deref()),
        Command::Render(args) => commands::render::run(&ctx, args),
        Command::Validate => commands::validate::run(&ctx),
        Command::Menus(cmd) => commands::menus::run(&ctx, cmd),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "nocodeploy", &mut io::stdout());
            Ok(())
        }
    }
}
