use std::{
    ffi::OsStr,
    io, iter, mem,
    os::windows::{
        ffi::OsStrExt,
        io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle},
    },
    path::Path,
    ptr, slice,
};

use windows_sys::Win32::{
    Foundation::{FALSE, FILETIME, HANDLE, WAIT_OBJECT_0},
    System::{
        Environment::GetCommandLineW,
        ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS},
        Threading::{
            CreateProcessW, GetExitCodeProcess, GetProcessTimes, WaitForSingleObject, INFINITE,
            PROCESS_INFORMATION, STARTUPINFOW,
        },
    },
};

use super::supervisor::{statistics_unavailable, StatisticsRecord, Supervision};
use crate::command::{FinalCommandLine, ResolvedCommand};
use crate::common::EXIT_FAILURE;

/// Length of one FILETIME tick in seconds.
const TICK_SECONDS: f64 = 1.0e-7;

/// The command line exactly as this process received it.
pub fn raw_command_line() -> String {
    // SAFETY: GetCommandLineW returns the process's NUL-terminated command
    // line, which stays valid for the life of the process.
    unsafe {
        let line = GetCommandLineW();
        let mut len = 0;
        while *line.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(slice::from_raw_parts(line, len))
    }
}

fn to_wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(iter::once(0)).collect()
}

pub(super) fn run(
    executable: &Path,
    resolved: &ResolvedCommand,
    command_line: &FinalCommandLine,
) -> Supervision {
    if command_line.verbatim().is_some() {
        log::warn!("the command line holds invalid UTF-16, it is passed on with replacements");
    }

    let application = to_wide(executable.as_os_str());
    // CreateProcessW may modify the command line buffer in place.
    let mut command = to_wide(OsStr::new(&command_line.to_string()));

    // SAFETY: STARTUPINFOW and PROCESS_INFORMATION are plain C structs for
    // which all-zero is a valid value.
    let startup = STARTUPINFOW {
        cb: mem::size_of::<STARTUPINFOW>() as u32,
        ..unsafe { mem::zeroed() }
    };
    let mut info: PROCESS_INFORMATION = unsafe { mem::zeroed() };

    // SAFETY: all strings are NUL terminated and outlive the call; the
    // standard handles and console are inherited.
    let created = unsafe {
        CreateProcessW(
            application.as_ptr(),
            command.as_mut_ptr(),
            ptr::null(),
            ptr::null(),
            FALSE,
            0,
            ptr::null(),
            ptr::null(),
            &startup,
            &mut info,
        )
    };
    if created == 0 {
        return Supervision::launch_failed(resolved.target(), io::Error::last_os_error());
    }

    // SAFETY: CreateProcessW succeeded, so both handles are open and owned by
    // us alone. Dropping them closes them on every path below.
    let (process, _thread) = unsafe {
        (
            OwnedHandle::from_raw_handle(info.hProcess as RawHandle),
            OwnedHandle::from_raw_handle(info.hThread as RawHandle),
        )
    };
    let handle = process.as_raw_handle() as HANDLE;
    log::debug!("child {} running", info.dwProcessId);

    // SAFETY: `handle` is a live process handle.
    if unsafe { WaitForSingleObject(handle, INFINITE) } != WAIT_OBJECT_0 {
        return Supervision::wait_failed(io::Error::last_os_error());
    }

    Supervision::completed(statistics(handle))
}

/// Read exit code, times and memory peaks of a terminated process.
fn statistics(handle: HANDLE) -> StatisticsRecord {
    let mut record = StatisticsRecord::default();

    let mut exit_code = 0u32;
    // SAFETY: `handle` is a live process handle for all calls below and every
    // out pointer refers to a local of the expected type.
    if unsafe { GetExitCodeProcess(handle, &mut exit_code) } != 0 {
        record.exit_code = exit_code;
    } else {
        let err = io::Error::last_os_error();
        record.exit_code = EXIT_FAILURE as u32;
        statistics_unavailable("exit code", err);
    }

    let mut creation: FILETIME = unsafe { mem::zeroed() };
    let mut exit: FILETIME = unsafe { mem::zeroed() };
    let mut kernel: FILETIME = unsafe { mem::zeroed() };
    let mut user: FILETIME = unsafe { mem::zeroed() };
    if unsafe { GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user) } != 0 {
        record.elapsed_seconds = seconds(ticks(&exit).saturating_sub(ticks(&creation)));
        record.kernel_seconds = seconds(ticks(&kernel));
        record.user_seconds = seconds(ticks(&user));
    } else {
        statistics_unavailable("process times", io::Error::last_os_error());
    }

    let mut counters: PROCESS_MEMORY_COUNTERS = unsafe { mem::zeroed() };
    counters.cb = mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
    if unsafe { GetProcessMemoryInfo(handle, &mut counters, counters.cb) } != 0 {
        record.page_fault_count = counters.PageFaultCount as u64;
        record.peak_working_set_kb = kilobytes(counters.PeakWorkingSetSize);
        record.peak_paged_pool_kb = kilobytes(counters.QuotaPeakPagedPoolUsage);
        record.peak_nonpaged_pool_kb = kilobytes(counters.QuotaPeakNonPagedPoolUsage);
        record.peak_pagefile_kb = kilobytes(counters.PeakPagefileUsage);
    } else {
        statistics_unavailable("memory counters", io::Error::last_os_error());
    }

    record
}

fn ticks(time: &FILETIME) -> u64 {
    (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime)
}

fn seconds(ticks: u64) -> f64 {
    ticks as f64 * TICK_SECONDS
}

fn kilobytes(bytes: usize) -> u64 {
    bytes as u64 / 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filetime_halves_form_one_counter() {
        let time = FILETIME {
            dwLowDateTime: 5,
            dwHighDateTime: 1,
        };
        assert_eq!(ticks(&time), (1u64 << 32) + 5);
    }

    #[test]
    fn ticks_are_100ns() {
        assert!((seconds(15_000_000) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn kilobytes_round_down() {
        assert_eq!(kilobytes(4096), 4);
        assert_eq!(kilobytes(1023), 0);
    }

    #[test]
    fn raw_line_is_available() {
        assert!(!raw_command_line().is_empty());
    }
}
