use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use cfg_if::cfg_if;

/// The command interpreter used when the target is not an executable file.
pub struct Shell {
    pub name: &'static str,
    /// Switch telling the shell to run the rest of its command line.
    pub switch: &'static str,
}

cfg_if! {
    if #[cfg(windows)] {
        pub const SHELL: Shell = Shell { name: "cmd.exe", switch: "/c" };
    } else {
        pub const SHELL: Shell = Shell { name: "sh", switch: "-c" };
    }
}

/// Finds executables on the search path.
pub trait Locate {
    /// Errors of kind [`ErrorKind::NotFound`] mean there is no such entry.
    fn locate(&self, name: &str) -> io::Result<PathBuf>;
}

/// Outcome of resolving the target command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    target: String,
    executable_path: Option<PathBuf>,
    argument_prefix: String,
}

impl ResolvedCommand {
    pub fn direct(target: &str, path: PathBuf) -> Self {
        Self {
            target: target.to_string(),
            executable_path: Some(path),
            argument_prefix: String::new(),
        }
    }

    pub fn shell(target: &str, shell_path: PathBuf) -> Self {
        Self {
            target: target.to_string(),
            executable_path: Some(shell_path),
            argument_prefix: format!("{} {} ", SHELL.switch, target),
        }
    }

    pub fn unresolved(target: &str) -> Self {
        Self {
            target: target.to_string(),
            executable_path: None,
            argument_prefix: String::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn executable_path(&self) -> Option<&Path> {
        self.executable_path.as_deref()
    }

    pub fn argument_prefix(&self) -> &str {
        &self.argument_prefix
    }

    pub fn is_shell(&self) -> bool {
        !self.argument_prefix.is_empty()
    }

    pub fn shell_name(&self) -> &'static str {
        SHELL.name
    }
}

/// Resolve `target` on the platform search path.
pub fn resolve(target: &str) -> ResolvedCommand {
    resolve_with(&SearchPath, target)
}

/// Resolve `target` directly, falling back to running it through the shell
/// when no such executable exists.
pub fn resolve_with<L: Locate>(locator: &L, target: &str) -> ResolvedCommand {
    match locator.locate(target) {
        Ok(path) => {
            log::debug!("resolved {} to {}", target, path.display());
            ResolvedCommand::direct(target, path)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => match locator.locate(SHELL.name) {
            Ok(shell) => {
                log::debug!(
                    "{} is not an executable, running it with {}",
                    target,
                    shell.display()
                );
                ResolvedCommand::shell(target, shell)
            }
            Err(err) => {
                log::info!("cannot locate {}: {}", SHELL.name, err);
                ResolvedCommand::unresolved(target)
            }
        },
        Err(err) => {
            log::info!("cannot resolve {}: {}", target, err);
            ResolvedCommand::unresolved(target)
        }
    }
}

/// The platform's own executable search.
pub struct SearchPath;

cfg_if! {
    if #[cfg(windows)] {
        use std::{ffi::{OsStr, OsString}, iter, os::windows::ffi::{OsStrExt, OsStringExt}, ptr};
        use windows_sys::Win32::{Foundation::MAX_PATH, Storage::FileSystem::SearchPathW};

        fn to_wide(value: &str) -> Vec<u16> {
            OsStr::new(value).encode_wide().chain(iter::once(0)).collect()
        }

        impl Locate for SearchPath {
            fn locate(&self, name: &str) -> io::Result<PathBuf> {
                let file_name = to_wide(name);
                let extension = to_wide(".exe");
                // Caller-owned scratch space; SearchPathW reports how much of it it filled.
                let mut buffer = vec![0u16; MAX_PATH as usize];

                // SAFETY: both strings are NUL terminated and `buffer` holds
                // exactly the capacity passed alongside it.
                let len = unsafe {
                    SearchPathW(
                        ptr::null(),
                        file_name.as_ptr(),
                        extension.as_ptr(),
                        buffer.len() as u32,
                        buffer.as_mut_ptr(),
                        ptr::null_mut(),
                    )
                } as usize;

                if len == 0 {
                    return Err(io::Error::last_os_error());
                }
                if len > buffer.len() {
                    // The return value is the required size, including the NUL.
                    return Err(io::Error::new(
                        ErrorKind::Other,
                        format!("path of {} exceeds {} characters", name, MAX_PATH),
                    ));
                }

                Ok(PathBuf::from(OsString::from_wide(&buffer[..len])))
            }
        }
    } else {
        impl Locate for SearchPath {
            fn locate(&self, name: &str) -> io::Result<PathBuf> {
                which::which(name).map_err(|err| match err {
                    which::Error::CannotFindBinaryPath => {
                        io::Error::new(ErrorKind::NotFound, err.to_string())
                    }
                    _ => io::Error::new(ErrorKind::Other, err.to_string()),
                })
            }
        }
    }
}
