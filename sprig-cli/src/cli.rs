//! # Command-Line Interface
//!
//! Argument definitions. Color and remote-icon output default to on when
//! stdout is a terminal; each has an explicit off switch that wins when
//! given later on the command line.

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(name = "sprig", version, about = "Pretty-print branch metadata")]
pub struct Cli {
  /// Display colorized output; defaults to true if the output is a TTY
  #[arg(long, overrides_with = "no_color")]
  color: bool,

  /// Disable colorized output
  #[arg(long)]
  no_color: bool,

  /// Display remote status icons; defaults to true if the output is a TTY
  #[arg(long, overrides_with = "no_remote_icons")]
  remote_icons: bool,

  /// Disable remote status icons
  #[arg(long)]
  no_remote_icons: bool,

  /// Watch for changes and keep the graph updated (TTY only)
  #[arg(short = 'w', long)]
  pub watch: bool,

  /// If watching, how often to poll for changes in seconds
  #[arg(long, value_name = "SECS", default_value_t = 1.0)]
  pub poll_every: f64,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
  pub verbose: u8,
}

impl Cli {
  /// Whether to emit ANSI colors, given whether stdout is a terminal.
  pub fn use_color(&self, is_tty: bool) -> bool {
    if self.color {
      true
    } else if self.no_color {
      false
    } else {
      is_tty
    }
  }

  /// Whether to emit remote status icons, given whether stdout is a
  /// terminal.
  pub fn use_remote_icons(&self, is_tty: bool) -> bool {
    if self.remote_icons {
      true
    } else if self.no_remote_icons {
      false
    } else {
      is_tty
    }
  }
}
