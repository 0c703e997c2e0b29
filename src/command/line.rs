//! Recovering argument text from the raw command line.
//!
//! The platform hands us a flat command line plus a best-effort tokenization
//! of it. Re-joining tokens would have to re-invent quoting rules, so instead
//! we only ever take suffixes of the original text.

use std::{ffi::OsString, fmt};

use cfg_if::cfg_if;

use super::ResolvedCommand;
use crate::common::TimeError;

const QUOTES: [char; 2] = ['"', '\''];

/// Return the suffix of `full` that starts at `tokens[start_index]`.
///
/// Tokens before `start_index` are located in order, so each search begins
/// after the previous match. If the located token is directly preceded by a
/// quote, the quote is part of the result. An index past the end of `tokens`
/// yields an empty string.
pub fn trailing_text<'a, S: AsRef<str>>(
    full: &'a str,
    tokens: &[S],
    start_index: usize,
) -> Result<&'a str, TimeError> {
    let Some(target) = tokens.get(start_index) else {
        return Ok("");
    };

    let mut cursor = 0;
    for token in &tokens[..start_index] {
        let (_, end) = locate(full, token.as_ref(), cursor)?;
        cursor = end;
    }

    let (start, _) = locate(full, target.as_ref(), cursor)?;
    Ok(&full[start..])
}

/// The original text of the leading token of `command_text`, given the
/// trailing text that follows it.
pub fn target_text<'a>(command_text: &'a str, trailing: &str) -> &'a str {
    let end = command_text.len().saturating_sub(trailing.len());
    command_text[..end].trim_end()
}

/// Byte span of `token` in `full` at or after `cursor`, widened to include an
/// opening quote.
fn locate(full: &str, token: &str, cursor: usize) -> Result<(usize, usize), TimeError> {
    let rest = &full[cursor..];

    if token.is_empty() {
        // An empty argument only exists on the command line as a quote pair.
        return ["\"\"", "''"]
            .iter()
            .filter_map(|pair| rest.find(pair).map(|pos| (pos, pair.len())))
            .min()
            .map(|(pos, len)| (cursor + pos, cursor + pos + len))
            .ok_or_else(|| TimeError::NotFound {
                token: token.to_string(),
            });
    }

    let pos = cursor
        + rest.find(token).ok_or_else(|| TimeError::NotFound {
            token: token.to_string(),
        })?;
    let end = pos + token.len();

    if full[..pos].ends_with(QUOTES) {
        Ok((pos - 1, end))
    } else {
        Ok((pos, end))
    }
}

cfg_if! {
    if #[cfg(unix)] {
        /// Join tokens back into command line text with POSIX shell quoting.
        ///
        /// Only used when [`trailing_text`] cannot find a token in the raw text.
        pub fn requote<S: AsRef<str>>(tokens: &[S]) -> String {
            shell_words::join(tokens.iter().map(AsRef::as_ref))
        }
    } else {
        /// Join tokens back into command line text, quoting blank tokens and
        /// tokens with whitespace.
        ///
        /// Only used when [`trailing_text`] cannot find a token in the raw text.
        pub fn requote<S: AsRef<str>>(tokens: &[S]) -> String {
            tokens
                .iter()
                .map(|token| {
                    let token = token.as_ref();
                    if token.is_empty() || token.contains(char::is_whitespace) {
                        format!("\"{}\"", token)
                    } else {
                        token.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// The single command line handed to the process launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCommandLine {
    program: String,
    arguments: String,
    /// The target and its arguments as received, kept only when one of them
    /// is not valid Unicode and the text above is therefore lossy.
    verbatim: Option<Vec<OsString>>,
}

impl FinalCommandLine {
    /// Compose the launch line from the resolution result, the original text
    /// from the target onward, and the trailing argument text.
    ///
    /// A direct executable keeps the target exactly as typed in front of its
    /// arguments. A shell fallback starts with the shell name followed by the
    /// shell prefix, which already names the target.
    pub fn compose(resolved: &ResolvedCommand, command_text: &str, trailing: &str) -> Self {
        if resolved.is_shell() {
            Self {
                program: resolved.shell_name().to_string(),
                arguments: format!("{}{}", resolved.argument_prefix(), trailing),
                verbatim: None,
            }
        } else {
            Self {
                program: target_text(command_text, trailing).to_string(),
                arguments: trailing.to_string(),
                verbatim: None,
            }
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Attach the target and its arguments exactly as the OS passed them.
    pub fn with_verbatim(mut self, args: Vec<OsString>) -> Self {
        self.verbatim = Some(args);
        self
    }

    pub fn verbatim(&self) -> Option<&[OsString]> {
        self.verbatim.as_deref()
    }
}

impl fmt::Display for FinalCommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arguments.is_empty() {
            f.write_str(&self.program)
        } else {
            write!(f, "{} {}", self.program, self.arguments)
        }
    }
}
