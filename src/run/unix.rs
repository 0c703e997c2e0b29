use std::{
    env, io,
    os::raw::c_long,
    os::unix::process::{CommandExt, ExitStatusExt},
    path::Path,
    process::{Command, ExitStatus},
    time::Instant,
};

use nix::sys::{
    resource::{getrusage, UsageWho},
    time::TimeVal,
};

use super::supervisor::{statistics_unavailable, StatisticsRecord, Supervision};
use crate::command::{FinalCommandLine, ResolvedCommand, SHELL};

/// Unix has no flat command line, so quote argv the way a POSIX shell would
/// read it back.
pub fn raw_command_line() -> String {
    shell_words::join(env::args_os().map(|arg| arg.to_string_lossy().into_owned()))
}

/// Runs `$0` with `$@`, so the target and its arguments reach the shell as
/// parameters instead of script text.
const VERBATIM_SCRIPT: &str = "\"$0\" \"$@\"";

pub(super) fn run(
    executable: &Path,
    resolved: &ResolvedCommand,
    command_line: &FinalCommandLine,
) -> Supervision {
    let mut command = Command::new(executable);

    if let Some((program, args)) = command_line.verbatim().and_then(<[_]>::split_first) {
        if resolved.is_shell() {
            // Hand the shell the exact bytes as positional parameters.
            command
                .arg(SHELL.switch)
                .arg(VERBATIM_SCRIPT)
                .arg(program)
                .args(args);
        } else {
            command.arg0(program).args(args);
        }
    } else if resolved.is_shell() {
        // The shell gets everything after its switch as one script.
        let script = command_line
            .arguments()
            .strip_prefix(SHELL.switch)
            .unwrap_or(command_line.arguments())
            .trim_start();
        command.arg(SHELL.switch).arg(script);
    } else {
        let words = match shell_words::split(&command_line.to_string()) {
            Ok(words) => words,
            Err(err) => {
                return Supervision::launch_failed(
                    resolved.target(),
                    io::Error::new(io::ErrorKind::InvalidInput, err),
                )
            }
        };
        if let Some((program, args)) = words.split_first() {
            command.arg0(program).args(args);
        }
    }

    let started = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return Supervision::launch_failed(resolved.target(), err),
    };
    log::debug!("child {} running", child.id());

    let status = match child.wait() {
        Ok(status) => status,
        Err(err) => return Supervision::wait_failed(err),
    };
    let elapsed = started.elapsed();

    let mut record = StatisticsRecord {
        exit_code: exit_code(status),
        elapsed_seconds: elapsed.as_secs_f64(),
        ..Default::default()
    };

    // Only one child is ever waited for, so the children's totals are its own.
    match getrusage(UsageWho::RUSAGE_CHILDREN) {
        Ok(usage) => {
            record.user_seconds = seconds(usage.user_time());
            record.kernel_seconds = seconds(usage.system_time());
            record.page_fault_count =
                (usage.minor_page_faults() + usage.major_page_faults()).max(0) as u64;
            record.peak_working_set_kb = max_rss_kb(usage.max_rss());
        }
        Err(errno) => statistics_unavailable("resource usage", errno.into()),
    }

    Supervision::completed(record)
}

fn exit_code(status: ExitStatus) -> u32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code as u32,
        (None, Some(signal)) => 128 + signal as u32,
        (None, None) => 1,
    }
}

fn seconds(time: TimeVal) -> f64 {
    time.tv_sec() as f64 + time.tv_usec() as f64 / 1_000_000.0
}

#[cfg(target_os = "macos")]
fn max_rss_kb(max_rss: c_long) -> u64 {
    // Reported in bytes here.
    max_rss.max(0) as u64 / 1024
}

#[cfg(not(target_os = "macos"))]
fn max_rss_kb(max_rss: c_long) -> u64 {
    max_rss.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeval_to_seconds() {
        assert_eq!(seconds(TimeVal::new(2, 500_000)), 2.5);
    }

    #[test]
    fn raw_line_quotes_arguments() {
        let line = raw_command_line();
        assert!(!line.is_empty());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // Terminated by SIGKILL.
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }
}
