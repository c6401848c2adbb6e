//! Binary counter encoding used by `add_int` and `add_double`.
//!
//! Integer counters occupy exactly four bytes and floating point counters
//! exactly eight, both little endian. A stored value of any other length is
//! not a counter of that type and the add fails with `Keep`.

use crate::error::{EngineError, EngineResult};

/// Adds `num` to an integer counter, returning the total and its encoding.
pub(crate) fn add_int(current: Option<&[u8]>, num: i32) -> EngineResult<(i32, Vec<u8>)> {
    let total = match current {
        None => num,
        Some(bytes) => {
            let raw: [u8; 4] = bytes.try_into().map_err(|_| EngineError::keep())?;
            i32::from_le_bytes(raw).wrapping_add(num)
        }
    };
    Ok((total, total.to_le_bytes().to_vec()))
}

/// Adds `num` to a floating point counter, returning the total and its
/// encoding.
pub(crate) fn add_double(current: Option<&[u8]>, num: f64) -> EngineResult<(f64, Vec<u8>)> {
    let total = match current {
        None => num,
        Some(bytes) => {
            let raw: [u8; 8] = bytes.try_into().map_err(|_| EngineError::keep())?;
            f64::from_le_bytes(raw) + num
        }
    };
    Ok((total, total.to_le_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn int_counter_accumulates() {
        let (total, bytes) = add_int(None, 5).unwrap();
        assert_eq!(total, 5);
        let (total, _) = add_int(Some(&bytes), -2).unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn mixed_counter_types_fail() {
        let (_, bytes) = add_int(None, 1).unwrap();
        assert_eq!(add_double(Some(&bytes), 1.0).unwrap_err().code, ErrorCode::Keep);
        assert_eq!(add_int(Some(b"abc"), 1).unwrap_err().code, ErrorCode::Keep);
    }
}
