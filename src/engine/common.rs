// src/engine/common.rs
//
// Common utilities shared across engine modules: the engine-local Result
// alias and panic containment for codec calls.

use crate::error::ListingImageError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ListingImageError>;

/// Run a codec closure with panic containment.
///
/// mozjpeg surfaces libjpeg errors as panics (its setjmp error handler
/// unwinds), and a panic from any codec must not cross the public API of a
/// library that batch workers call in a loop. Panics are caught here and
/// returned as `InternalPanic` carrying the stage label, so one poisoned
/// image degrades to a per-item error.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = if let Some(msg) = payload.downcast_ref::<&str>() {
                (*msg).to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "non-string panic payload".to_string()
            };
            tracing::error!(stage, detail = %detail, "codec panic contained");
            Err(ListingImageError::internal_panic(format!(
                "{stage} panicked: {detail}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_ok_and_err() {
        let ok: EngineResult<u32> = run_with_panic_policy("test:ok", || Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let err: EngineResult<u32> = run_with_panic_policy("test:err", || {
            Err(ListingImageError::decode_failed("bad stream"))
        });
        assert!(matches!(
            err,
            Err(ListingImageError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn test_contains_panic_as_internal_error() {
        let result: EngineResult<u32> =
            run_with_panic_policy("test:panic", || panic!("simulated codec abort"));
        match result {
            Err(ListingImageError::InternalPanic { message }) => {
                assert!(message.contains("test:panic"));
                assert!(message.contains("simulated codec abort"));
            }
            other => panic!("expected InternalPanic, got {other:?}"),
        }
    }
}
