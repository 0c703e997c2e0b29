//! Turning a finished statistics record into text.

use std::{
    fmt::Write as _,
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::run::StatisticsRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    /// Every counter, one per line.
    Verbose,
    /// POSIX `time -p`.
    Portable,
    /// One JSON object.
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    command: &'a str,
    #[serde(flatten)]
    record: &'a StatisticsRecord,
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        100.0 * part / whole
    } else {
        0.0
    }
}

pub fn render(style: Style, command: &str, record: &StatisticsRecord) -> Result<String> {
    let mut out = String::new();

    match style {
        Style::Verbose => {
            let elapsed = record.elapsed_seconds;
            writeln!(out, "Command being timed: {}", command)?;
            writeln!(
                out,
                "User time (seconds): {:.2} ({:.1}%)",
                record.user_seconds,
                percent(record.user_seconds, elapsed)
            )?;
            writeln!(
                out,
                "System time (seconds): {:.2} ({:.1}%)",
                record.kernel_seconds,
                percent(record.kernel_seconds, elapsed)
            )?;
            writeln!(out, "Elapsed (wall clock) time (seconds): {:.2}", elapsed)?;
            writeln!(
                out,
                "Maximum resident set size (kbytes): {}",
                record.peak_working_set_kb
            )?;
            writeln!(out, "Page faults: {}", record.page_fault_count)?;
            writeln!(out, "Peak paged pool (kbytes): {}", record.peak_paged_pool_kb)?;
            writeln!(
                out,
                "Peak non-paged pool (kbytes): {}",
                record.peak_nonpaged_pool_kb
            )?;
            writeln!(out, "Peak page file usage (kbytes): {}", record.peak_pagefile_kb)?;
            writeln!(out, "Exit status: {}", record.exit_code)?;
        }
        Style::Portable => {
            writeln!(out, "real {:.2}", record.elapsed_seconds)?;
            writeln!(out, "user {:.2}", record.user_seconds)?;
            writeln!(out, "sys {:.2}", record.kernel_seconds)?;
        }
        Style::Json => {
            let json = serde_json::to_string(&JsonReport { command, record })
                .context("failed to serialize the report")?;
            writeln!(out, "{}", json)?;
        }
    }

    Ok(out)
}

/// Where the report goes, opened before the child is launched so a bad
/// `-o` path never costs a run.
pub enum Destination {
    Stderr,
    File { file: File, path: PathBuf },
}

impl Destination {
    pub fn open(output: Option<&Path>, append: bool) -> Result<Self> {
        let Some(path) = output else {
            return Ok(Destination::Stderr);
        };

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .with_context(|| format!("failed to open \"{}\"", path.display()))?;

        Ok(Destination::File {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Write the report. A failing file falls back to standard error so the
    /// report is never lost.
    pub fn write(self, report: &str) {
        if let Destination::File { mut file, path } = self {
            match file.write_all(report.as_bytes()) {
                Ok(()) => return,
                Err(err) => log::warn!(
                    "failed to write the report to \"{}\": {}",
                    path.display(),
                    err
                ),
            }
        }

        if let Err(err) = io::stderr().write_all(report.as_bytes()) {
            log::warn!("failed to write the report: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatisticsRecord {
        StatisticsRecord {
            exit_code: 0,
            elapsed_seconds: 2.0,
            kernel_seconds: 0.5,
            user_seconds: 1.0,
            page_fault_count: 42,
            peak_working_set_kb: 2048,
            peak_paged_pool_kb: 12,
            peak_nonpaged_pool_kb: 3,
            peak_pagefile_kb: 900,
        }
    }

    #[test]
    fn verbose_report() {
        let text = render(Style::Verbose, "echo hi", &sample()).unwrap();

        assert_eq!(
            text,
            "Command being timed: echo hi\n\
             User time (seconds): 1.00 (50.0%)\n\
             System time (seconds): 0.50 (25.0%)\n\
             Elapsed (wall clock) time (seconds): 2.00\n\
             Maximum resident set size (kbytes): 2048\n\
             Page faults: 42\n\
             Peak paged pool (kbytes): 12\n\
             Peak non-paged pool (kbytes): 3\n\
             Peak page file usage (kbytes): 900\n\
             Exit status: 0\n"
        );
    }

    #[test]
    fn zeroed_record_has_no_nan_percentages() {
        let text = render(Style::Verbose, "missing", &StatisticsRecord::default()).unwrap();

        assert!(text.contains("User time (seconds): 0.00 (0.0%)"));
        assert!(!text.contains("NaN"));
    }

    #[test]
    fn portable_report() {
        let text = render(Style::Portable, "echo hi", &sample()).unwrap();
        assert_eq!(text, "real 2.00\nuser 1.00\nsys 0.50\n");
    }

    #[test]
    fn json_report() {
        let text = render(Style::Json, "echo hi", &sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["command"], "echo hi");
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["peak_working_set_kb"], 2048);
        assert_eq!(value["user_seconds"], 1.0);
    }

    #[test]
    fn destination_appends_or_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");

        Destination::open(Some(&path), false).unwrap().write("first\n");
        Destination::open(Some(&path), true).unwrap().write("second\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");

        Destination::open(Some(&path), false).unwrap().write("third\n");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "third\n");
    }

    #[test]
    fn unopenable_destination_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.txt");

        let err = Destination::open(Some(&path), false).err().unwrap();
        assert!(err.to_string().contains("failed to open"));
        assert!(!path.exists());
    }

    #[test]
    fn no_output_means_stderr() {
        assert!(matches!(
            Destination::open(None, true).unwrap(),
            Destination::Stderr
        ));
    }
}
