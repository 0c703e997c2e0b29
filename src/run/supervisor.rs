use std::io;

use cfg_if::cfg_if;
use serde::Serialize;

use crate::command::{FinalCommandLine, ResolvedCommand};
use crate::common::TimeError;

cfg_if! {
    if #[cfg(windows)] {
        use super::windows as platform;
    } else {
        use super::unix as platform;
    }
}

/// What the child cost, read once after it terminated.
///
/// Every numeric field stays zero when the OS could not supply it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsRecord {
    pub exit_code: u32,
    pub elapsed_seconds: f64,
    pub kernel_seconds: f64,
    pub user_seconds: f64,
    pub page_fault_count: u64,
    pub peak_working_set_kb: u64,
    pub peak_paged_pool_kb: u64,
    pub peak_nonpaged_pool_kb: u64,
    pub peak_pagefile_kb: u64,
}

pub enum Outcome {
    Completed,
    /// Launch or wait failed, or nothing could be resolved to launch.
    Failed(TimeError),
}

pub struct Supervision {
    pub record: StatisticsRecord,
    pub outcome: Outcome,
}

impl Supervision {
    pub(super) fn completed(record: StatisticsRecord) -> Self {
        log::debug!("child exited with status {}", record.exit_code);
        Self {
            record,
            outcome: Outcome::Completed,
        }
    }

    pub(super) fn failed(error: TimeError) -> Self {
        log::debug!("supervision failed: {:?}", error);
        let record = StatisticsRecord {
            exit_code: error.recorded_code(),
            ..Default::default()
        };
        Self {
            record,
            outcome: Outcome::Failed(error),
        }
    }

    pub(super) fn launch_failed(command: &str, source: io::Error) -> Self {
        Self::failed(TimeError::Launch {
            command: command.to_string(),
            source,
        })
    }

    pub(super) fn wait_failed(source: io::Error) -> Self {
        Self::failed(TimeError::Wait { source })
    }

    /// The status the tool itself should exit with.
    pub fn exit_status(&self) -> i32 {
        match &self.outcome {
            Outcome::Completed => self.record.exit_code as i32,
            Outcome::Failed(error) => error.exit_code(),
        }
    }

    /// One line to print ahead of the report, if anything went wrong.
    pub fn diagnostic(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Completed if self.record.exit_code != 0 => Some(format!(
                "Command exited with non-zero status {}",
                self.record.exit_code
            )),
            Outcome::Completed => None,
            Outcome::Failed(error) => Some(error.to_string()),
        }
    }
}

/// Launch the resolved command with `command_line`, block until it ends and
/// collect its statistics.
///
/// Never fails: launch and wait errors are folded into the returned
/// [`Supervision`] together with a zeroed record.
pub fn run(resolved: &ResolvedCommand, command_line: &FinalCommandLine) -> Supervision {
    let Some(executable) = resolved.executable_path() else {
        return Supervision::failed(TimeError::Resolution {
            command: resolved.target().to_string(),
        });
    };

    log::info!(
        "launching {} from {} as `{}`",
        command_line.program(),
        executable.display(),
        command_line
    );
    platform::run(executable, resolved, command_line)
}

/// Log an unreadable statistic; the record keeps zeros for it.
pub(super) fn statistics_unavailable(what: &'static str, source: io::Error) {
    log::warn!("{}", TimeError::StatisticsUnavailable { what, source });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EXIT_NOT_FOUND;

    #[test]
    fn unresolved_command_is_not_found() {
        let resolved = ResolvedCommand::unresolved("nonexistent-tool-xyz");
        let line = FinalCommandLine::compose(&resolved, "nonexistent-tool-xyz", "");
        let supervision = run(&resolved, &line);

        assert_eq!(supervision.exit_status(), EXIT_NOT_FOUND);
        assert_eq!(supervision.record.exit_code, 127);
        assert_eq!(supervision.record.elapsed_seconds, 0.0);
        assert_eq!(supervision.record.peak_working_set_kb, 0);
        assert!(supervision
            .diagnostic()
            .unwrap()
            .contains("nonexistent-tool-xyz"));
    }

    #[test]
    fn completed_with_failure_status() {
        let supervision = Supervision::completed(StatisticsRecord {
            exit_code: 3,
            ..Default::default()
        });

        assert_eq!(supervision.exit_status(), 3);
        assert_eq!(
            supervision.diagnostic().as_deref(),
            Some("Command exited with non-zero status 3")
        );
    }

    #[test]
    fn completed_successfully_has_no_diagnostic() {
        let supervision = Supervision::completed(StatisticsRecord::default());

        assert_eq!(supervision.exit_status(), 0);
        assert!(supervision.diagnostic().is_none());
    }

    #[test]
    fn wait_failure_keeps_zeroed_statistics() {
        let supervision = Supervision::wait_failed(io::Error::from_raw_os_error(6));

        assert_eq!(supervision.exit_status(), 1);
        assert_eq!(supervision.record.exit_code, 6);
        assert_eq!(supervision.record.user_seconds, 0.0);
        assert!(supervision
            .diagnostic()
            .unwrap()
            .starts_with("cannot wait for process"));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::command::{resolve, SHELL};
        use std::path::PathBuf;

        fn run_line(target: &str, command_text: &str, trailing: &str) -> Supervision {
            let resolved = resolve(target);
            let line = FinalCommandLine::compose(&resolved, command_text, trailing);
            run(&resolved, &line)
        }

        #[test]
        fn reports_zero_exit() {
            let supervision = run_line("true", "true", "");

            assert!(matches!(supervision.outcome, Outcome::Completed));
            assert_eq!(supervision.record.exit_code, 0);
            assert!(supervision.record.elapsed_seconds >= 0.0);
        }

        #[test]
        fn reports_child_exit_code() {
            let supervision = run_line("sh", "sh -c 'exit 7'", "-c 'exit 7'");

            assert_eq!(supervision.record.exit_code, 7);
            assert_eq!(supervision.exit_status(), 7);
        }

        #[test]
        fn shell_fallback_runs_the_command_line() {
            let supervision = run_line(
                "nonexistent-tool-xyz",
                "nonexistent-tool-xyz",
                "",
            );

            // The shell itself reports the missing command.
            assert_eq!(supervision.record.exit_code, 127);
        }

        #[test]
        fn signals_map_to_shell_convention() {
            let supervision = run_line("sh", "sh -c 'kill -9 $$'", "-c 'kill -9 $$'");

            assert_eq!(supervision.record.exit_code, 128 + 9);
        }

        fn verbatim(args: &[&[u8]]) -> Vec<std::ffi::OsString> {
            use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

            args.iter()
                .map(|arg| OsStr::from_bytes(arg).to_os_string())
                .collect()
        }

        #[test]
        fn direct_run_keeps_non_unicode_bytes() {
            let resolved = resolve("test");
            let line = FinalCommandLine::compose(&resolved, "test \u{fffd} = \u{fffd}", "")
                .with_verbatim(verbatim(&[b"test", b"\xff", b"=", b"\xff"]));

            assert_eq!(run(&resolved, &line).record.exit_code, 0);

            let line = FinalCommandLine::compose(&resolved, "test \u{fffd} = \u{fffd}", "")
                .with_verbatim(verbatim(&[b"test", b"\xff", b"=", b"\xfe"]));

            // Both bytes were lossily the same replacement character.
            assert_eq!(run(&resolved, &line).record.exit_code, 1);
        }

        #[test]
        fn shell_run_keeps_non_unicode_bytes() {
            let shell = resolve(SHELL.name).executable_path().unwrap().to_path_buf();
            let resolved = ResolvedCommand::shell("test", shell);
            let line = FinalCommandLine::compose(&resolved, "test", "")
                .with_verbatim(verbatim(&[b"test", b"\xff", b"=", b"\xff"]));

            assert_eq!(run(&resolved, &line).record.exit_code, 0);

            let line = FinalCommandLine::compose(&resolved, "test", "")
                .with_verbatim(verbatim(&[b"test", b"\xff", b"=", b"\xfe"]));

            assert_eq!(run(&resolved, &line).record.exit_code, 1);
        }

        #[test]
        fn launch_failure_is_reported() {
            let resolved = ResolvedCommand::direct(
                "missing",
                PathBuf::from("/nonexistent/dir/missing"),
            );
            let line = FinalCommandLine::compose(&resolved, "missing", "");
            let supervision = run(&resolved, &line);

            assert_eq!(supervision.exit_status(), 127);
            assert_eq!(supervision.record.exit_code, 127);
            assert!(supervision
                .diagnostic()
                .unwrap()
                .starts_with("cannot run missing"));
        }
    }
}
