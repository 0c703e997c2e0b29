//! Ctrl+C ownership.
//!
//! Before the child starts, an interrupt ends the tool with status 130.
//! Afterwards the console delivers the interrupt to the child too, so the tool
//! ignores it, waits for the child and still prints its report.

use std::{
    process,
    sync::atomic::{AtomicBool, Ordering},
};

const INTERRUPTED_EXIT_CODE: i32 = 130;

static CHILD_LAUNCHING: AtomicBool = AtomicBool::new(false);

pub fn setup_signal_handler() {
    if let Err(err) = ctrlc::set_handler(on_interrupt) {
        log::warn!("cannot install a Ctrl+C handler: {}", err);
    }
}

/// Called right before launch; interrupts are the child's business from here.
pub fn pass_control_to_child() {
    CHILD_LAUNCHING.store(true, Ordering::SeqCst);
}

fn on_interrupt() {
    if child_owns_interrupts() {
        log::debug!("interrupt left to the child");
    } else {
        process::exit(INTERRUPTED_EXIT_CODE);
    }
}

fn child_owns_interrupts() -> bool {
    CHILD_LAUNCHING.load(Ordering::SeqCst)
}
