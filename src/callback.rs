//! Panic isolation for consumer callbacks.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a consumer callback, logging instead of unwinding if it panics.
///
/// Returns `false` when the callback panicked.
pub(crate) fn call_guarded(origin: &str, handler_name: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            log::error!("[{origin}] Handler '{handler_name}' panicked: {detail}");
            false
        }
    }
}
