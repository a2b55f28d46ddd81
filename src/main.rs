mod actions;
mod checks;
mod cli;
mod cluster;
mod commands;
mod config;
mod inventory;
mod local;
mod lock;
mod object;
mod orchestrator;
mod path;
mod paths;
mod progress;
mod proxy;
mod request;
mod resource;
mod results;
mod router;
mod runner;
mod selector;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io::{self, IsTerminal};

use config::NodeConfig;
use paths::Paths;
use ui::Format;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub format: Format,
    pub paths: Paths,
    pub config: NodeConfig,
}

impl Context {
    /// Whether spinners and progress lines may be drawn
    pub fn interactive(&self) -> bool {
        !self.quiet && self.format == Format::Human && io::stderr().is_terminal()
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
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

    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "om", &mut io::stdout());
        return Ok(0);
    }

    let paths = Paths::discover()?;
    let config = NodeConfig::load(&paths)?;
    let ctx = Context {
        quiet: cli.quiet,
        format: cli.format,
        paths,
        config,
    };
    log::debug!(
        "node {} (config {}, var {})",
        ctx.config.nodename(),
        ctx.paths.config_dir().display(),
        ctx.paths.var_dir().display()
    );

    match cli.command {
        Command::Object(args) => commands::object::run(&ctx, args),
        Command::Node(cmd) => commands::node::run(&ctx, cmd),
        Command::Daemon(cmd) => commands::daemon::run(&ctx, cmd),
        Command::Completions { .. } => Ok(0),
    }
}
