//! # Sprig Entry Point
//!
//! Pretty-prints the local branches of a git repository as a Unicode graph,
//! one branch per row, with upstream and merge relationships drawn between
//! them.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use sprig_cli::cli::Cli;
use sprig_cli::display::{RenderConfig, render};
use sprig_cli::watch::watch_loop;
use sprig_core::git::Repo;

fn main() {
  let cmd = Cli::parse();

  // Set up tracing based on verbosity level
  let level = match cmd.verbose {
    0 => tracing::Level::WARN,
    1 => tracing::Level::INFO,
    2 => tracing::Level::DEBUG,
    _ => tracing::Level::TRACE,
  };
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(EnvFilter::from_default_env().add_directive(level.into()))
    .init();

  if let Err(e) = run(&cmd) {
    error!("{e}");
    std::process::exit(1);
  }
}

fn run(cmd: &Cli) -> anyhow::Result<()> {
  let is_tty = console::Term::stdout().is_term();
  let config = RenderConfig {
    color: cmd.use_color(is_tty),
    remote_icons: cmd.use_remote_icons(is_tty),
  };

  if cmd.watch && is_tty {
    return watch_loop(&config, Duration::from_secs_f64(cmd.poll_every));
  }

  let repo = Repo::open()?;
  let mut stdout = std::io::stdout().lock();
  render(&repo, &config, &mut stdout)?;
  stdout.flush()?;
  Ok(())
}
