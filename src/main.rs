//! `timemem`: run a command and report how long it took and how much memory
//! it used.

use std::process;

mod cli;
mod command;
mod common;
mod report;
mod run;
mod signal;

use common::{Error, IntoResult, EXIT_FAILURE};

fn main() {
    let code = match run::execute().into_result() {
        Ok(()) => 0,
        Err(Error::Code(code)) => code,
        Err(Error::Message(msg)) => {
            eprintln!("{}: {}", env!("CARGO_PKG_NAME"), msg);
            EXIT_FAILURE
        }
    };

    process::exit(code);
}
