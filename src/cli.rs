use std::{ffi::OsString, path::PathBuf};

use clap::{ArgAction, CommandFactory, Parser, ValueEnum};
use log::LevelFilter;

use crate::report::Style;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = "Run a command and report its exit status, CPU time and peak memory usage", long_about = None)]
#[command(after_help = "The report is written to standard error unless -o is given.")]
pub struct Cli {
    /// Write the report to FILE instead of standard error
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Append to the output file instead of overwriting it
    #[arg(short, long, requires = "output")]
    pub append: bool,

    /// Use the POSIX real/user/sys report format
    #[arg(short, long)]
    pub portability: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Do not mention a non-zero exit status of the command
    #[arg(short, long)]
    pub quiet: bool,

    /// Log resolution and launch details (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// The command to run, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}

impl Cli {
    pub fn usage() -> String {
        Cli::command().render_usage().to_string()
    }

    pub fn style(&self) -> Style {
        match (self.portability, self.format) {
            (true, _) => Style::Portable,
            (false, Format::Text) => Style::Verbose,
            (false, Format::Json) => Style::Json,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
