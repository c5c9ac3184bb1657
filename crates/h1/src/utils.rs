//! Internal helper macros.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// Like `assert!`, but for validation where the caller gets an error instead of a panic.
///
/// ```ignore
/// ensure!(headers.len() <= limits.max_number_of_headers, ParseError::invalid_message("too many headers"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
