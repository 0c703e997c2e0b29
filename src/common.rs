use std::io;

use thiserror::Error as ThisError;

/// Exit status for a usage error, matching `EPERM`.
pub const EXIT_USAGE: i32 = 1;
/// Exit status for internal launch or wait failures.
pub const EXIT_FAILURE: i32 = 1;
/// Exit status shells use when a command cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;

pub enum Error {
    Message(String),
    Code(i32),
}

pub trait IntoResult<T> {
    fn into_result(self) -> Result<T, Error>;
}

impl IntoResult<()> for anyhow::Result<i32> {
    fn into_result(self) -> Result<(), Error> {
        match self {
            Ok(0) => Ok(()),
            Ok(code) => Err(Error::Code(code)),
            Err(err) => Err(Error::Message(format!("{:#}", err))),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum TimeError {
    #[error("{0}")]
    Usage(String),

    #[error("cannot run {command}: command not found")]
    Resolution { command: String },

    #[error("cannot run {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot wait for process: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },

    #[error("{what} unavailable: {source}")]
    StatisticsUnavailable {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{token:?} does not occur in the command line")]
    NotFound { token: String },
}

impl TimeError {
    /// The status the tool exits with when this error ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            TimeError::Usage(_) => EXIT_USAGE,
            TimeError::Resolution { .. } => EXIT_NOT_FOUND,
            TimeError::Launch { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                EXIT_NOT_FOUND
            }
            _ => EXIT_FAILURE,
        }
    }

    /// The value recorded in the statistics record's exit code field.
    ///
    /// Prefers the captured OS error code, except that "not found" is always
    /// reported as 127.
    pub fn recorded_code(&self) -> u32 {
        match self {
            TimeError::Launch { source, .. } | TimeError::Wait { source }
                if source.kind() != io::ErrorKind::NotFound =>
            {
                source
                    .raw_os_error()
                    .map(|code| code as u32)
                    .unwrap_or(EXIT_FAILURE as u32)
            }
            _ => self.exit_code() as u32,
        }
    }
}
