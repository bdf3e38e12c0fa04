//! Small helpers shared across the crate.

/// Returns early with `Err($error)` when `$predicate` does not hold.
///
/// Like `assert!`, but for fallible paths: validation failures become
/// structured errors instead of panics.
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Best-effort text of a caught panic payload, for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "panic payload was not a string"
    }
}
