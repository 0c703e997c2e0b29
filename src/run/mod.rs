use std::{env, ffi::OsString, io::Write};

use anyhow::Result;
use cfg_if::cfg_if;
use clap::Parser;
use log::LevelFilter;

use crate::{
    cli::Cli,
    command::{requote, resolve, trailing_text, FinalCommandLine},
    common::TimeError,
    report, signal,
};

mod supervisor;

cfg_if! {
    if #[cfg(windows)] {
        mod windows;
        use self::windows as platform;
    } else {
        mod unix;
        use self::unix as platform;
    }
}

pub use supervisor::{Outcome, StatisticsRecord};

pub fn execute() -> Result<i32> {
    let args: Vec<OsString> = env::args_os().collect();
    let cli = Cli::parse_from(&args);
    init_logger(cli.log_level());
    signal::setup_signal_handler();

    if cli.command.is_empty() {
        let err = TimeError::Usage(Cli::usage());
        eprintln!("{}", err);
        return Ok(err.exit_code());
    }

    let tokens: Vec<String> = args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let target_index = tokens.len() - cli.command.len();

    let full = platform::raw_command_line();
    let (command_text, trailing) = reconstruct(&full, &tokens, target_index);
    let resolved = resolve(&tokens[target_index]);
    let mut command_line = FinalCommandLine::compose(&resolved, &command_text, &trailing);
    if let Some(verbatim) = non_unicode(&args[target_index..]) {
        log::debug!("command has non-Unicode arguments, passing them through unchanged");
        command_line = command_line.with_verbatim(verbatim);
    }

    let destination = report::Destination::open(cli.output.as_deref(), cli.append)?;

    signal::pass_control_to_child();
    let supervision = supervisor::run(&resolved, &command_line);

    if let Some(diagnostic) = supervision.diagnostic() {
        let completed = matches!(supervision.outcome, Outcome::Completed);
        if !(cli.quiet && completed) {
            eprintln!("{}", diagnostic);
        }
    }

    let text = report::render(cli.style(), &command_text, &supervision.record)?;
    destination.write(&text);

    Ok(supervision.exit_status())
}

/// Split the raw invocation into the text from the target onward and the
/// text after the target.
///
/// Falls back to re-quoting the tokens when one of them does not occur
/// literally in `full`, which can happen with escaped quotes.
fn reconstruct(full: &str, tokens: &[String], target_index: usize) -> (String, String) {
    let split = trailing_text(full, tokens, target_index).and_then(|command| {
        let trailing = trailing_text(command, &tokens[target_index..], 1)?;
        Ok((command, trailing))
    });

    match split {
        Ok((command, trailing)) => (command.to_string(), trailing.to_string()),
        Err(err) => {
            log::warn!("{}, re-quoting the arguments", err);
            (
                requote(&tokens[target_index..]),
                requote(&tokens[target_index + 1..]),
            )
        }
    }
}

/// The arguments as received, if any of them would be mangled by a lossy
/// conversion.
fn non_unicode(args: &[OsString]) -> Option<Vec<OsString>> {
    args.iter()
        .any(|arg| arg.to_str().is_none())
        .then(|| args.to_vec())
}

fn init_logger(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: {}: {}",
                env!("CARGO_PKG_NAME"),
                record.level().as_str().to_lowercase(),
                record.args()
            )
        })
        .init();
}
