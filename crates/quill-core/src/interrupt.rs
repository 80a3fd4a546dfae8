use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::QuillError;

static INTERRUPTED: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));

/// Request interruption on Ctrl+C/SIGTERM, etc.
pub fn request_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Shared flag referenced by signal-hook's flag API.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    Arc::clone(&INTERRUPTED)
}

/// Whether an interrupt has been requested.
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Clear the flag when starting a new evaluation, etc.
pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Called at the VM's call and return checkpoints; the resulting error is
/// never catchable by `*top-handler*`.
pub fn check_for_interrupt() -> Result<(), QuillError> {
    if is_interrupted() {
        Err(QuillError::interrupt("execution interrupted"))
    } else {
        Ok(())
    }
}
