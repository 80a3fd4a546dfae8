//! Runtime flags controlling the interpreter. Process-wide: a spawned task
//! observes the same flags as its parent.

use std::sync::atomic::{AtomicBool, Ordering};

static OPTIMIZE: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);
static DEBUG: AtomicBool = AtomicBool::new(false);
static TRACE: AtomicBool = AtomicBool::new(false);
static INTERACTIVE: AtomicBool = AtomicBool::new(false);

/// Set all flags at once, the way the CLI configures a run.
pub fn set_flags(optimize: bool, verbose: bool, debug: bool, trace: bool, interactive: bool) {
    OPTIMIZE.store(optimize, Ordering::SeqCst);
    VERBOSE.store(verbose, Ordering::SeqCst);
    DEBUG.store(debug, Ordering::SeqCst);
    TRACE.store(trace, Ordering::SeqCst);
    INTERACTIVE.store(interactive, Ordering::SeqCst);
}

pub fn optimize() -> bool {
    OPTIMIZE.load(Ordering::SeqCst)
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::SeqCst);
}

pub fn debug() -> bool {
    DEBUG.load(Ordering::SeqCst)
}

pub fn trace() -> bool {
    TRACE.load(Ordering::SeqCst)
}

pub fn interactive() -> bool {
    INTERACTIVE.load(Ordering::SeqCst)
}
