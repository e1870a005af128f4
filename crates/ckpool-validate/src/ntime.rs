//! `ntime` drift validation: an 8-hex-char field interpreted as a 32-bit
//! Unix timestamp, accepted only within a bounded window of "now".

use crate::hex::parse_u32_be;

/// Maximum allowed drift, in seconds, between a submitted `ntime` and the
/// pool's clock.
pub const MAX_NTIME_DRIFT: i64 = 7200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NtimeError {
    #[error("ntime is not 8 hex characters")]
    BadShape,
    #[error("ntime drifts more than {MAX_NTIME_DRIFT}s from now")]
    TooFarFromNow,
}

pub fn validate_ntime(hex: &str, now: u64) -> Result<u32, NtimeError> {
    let ntime = parse_u32_be(hex).ok_or(NtimeError::BadShape)?;
    let drift = (ntime as i64) - (now as i64);
    if drift.abs() > MAX_NTIME_DRIFT {
        return Err(NtimeError::TooFarFromNow);
    }
    Ok(ntime)
}

/// Variant used by the post-parse share-field validator: additionally
/// requires `ntime` to fall within the job's own advertised window.
pub fn validate_ntime_in_job_window(
    hex: &str,
    now: u64,
    ntime_min: u32,
    ntime_max: u32,
) -> Result<u32, NtimeError> {
    let ntime = validate_ntime(hex, now)?;
    if ntime < ntime_min || ntime > ntime_max {
        return Err(NtimeError::TooFarFromNow);
    }
    Ok(ntime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_within_drift() {
        let now = 1_700_000_000u64;
        let ntime = format!("{:08x}", now as u32 + 100);
        assert!(validate_ntime(&ntime, now).is_ok());
    }

    #[test]
    fn rejects_beyond_drift() {
        let now = 1_700_000_000u64;
        let ntime = format!("{:08x}", now as u32 + MAX_NTIME_DRIFT as u32 + 1);
        assert_eq!(validate_ntime(&ntime, now), Err(NtimeError::TooFarFromNow));
    }

    #[test]
    fn rejects_bad_shape() {
        assert_eq!(validate_ntime("abc", 0), Err(NtimeError::BadShape));
    }
}
