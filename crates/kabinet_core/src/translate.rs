//! Engine result translation.

use crate::error::{CoreError, CoreResult};
use kabinet_engine::{EngineError, EngineResult, ErrorCode};
use tracing::trace;

/// Translates an engine result.
///
/// A failure whose code appears in `substitutes` becomes the paired value;
/// any other failure becomes [`CoreError::Cabinet`].
pub(crate) fn translate<T: Clone>(
    result: EngineResult<T>,
    substitutes: &[(ErrorCode, T)],
) -> CoreResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => match substitutes.iter().find(|(code, _)| *code == err.code) {
            Some((_, substitute)) => Ok(substitute.clone()),
            None => Err(failure(err)),
        },
    }
}

fn failure(err: EngineError) -> CoreError {
    trace!(code = err.code.as_i32(), error = %err, "engine call failed");
    CoreError::from(err)
}

/// Translates a result without substitutes.
pub(crate) fn check<T>(result: EngineResult<T>) -> CoreResult<T> {
    result.map_err(failure)
}

/// Translates a read: "no record" becomes `None`.
pub(crate) fn optional<T>(result: EngineResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.code == ErrorCode::NoRecord => Ok(None),
        Err(err) => Err(failure(err)),
    }
}

/// Translates a keep-mode write: "existing record" becomes `false`.
pub(crate) fn kept(result: EngineResult<()>) -> CoreResult<bool> {
    translate(result.map(|()| true), &[(ErrorCode::Keep, false)])
}

/// Translates a delete: "no record" becomes `false`.
pub(crate) fn removed(result: EngineResult<()>) -> CoreResult<bool> {
    translate(result.map(|()| true), &[(ErrorCode::NoRecord, false)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_replace_expected_failures() {
        assert!(!kept(Err(EngineError::keep())).unwrap());
        assert!(kept(Ok(())).unwrap());
        assert!(!removed(Err(EngineError::no_record())).unwrap());
        assert_eq!(optional::<u8>(Err(EngineError::no_record())).unwrap(), None);
    }

    #[test]
    fn other_failures_surface_as_cabinet_errors() {
        let err = kept(Err(EngineError::no_record())).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NoRecord));

        let err = optional::<u8>(Err(EngineError::invalid("closed"))).unwrap_err();
        assert!(matches!(err, CoreError::Cabinet { code: ErrorCode::Invalid, .. }));
    }
}
