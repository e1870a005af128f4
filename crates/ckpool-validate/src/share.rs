//! Post-parse share-field validation: everything a `mining.submit` needs
//! checked against the job it claims to be for, once the Stratum JSON-RPC
//! envelope itself has already been parsed.

use crate::hex::{is_hex_exact, is_hex_max_even};
use crate::ntime::{validate_ntime_in_job_window, NtimeError};
use crate::version_bits::{validate_version_bits, VersionBitsError};

/// The subset of a job's state a share is validated against. Difficulty
/// target comparison and the share hash itself are computed upstream
/// (SHA-256d is an explicit non-goal of this crate); this struct only
/// carries what the validator needs to check shape and freshness.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub active: bool,
    pub ntime_min: u32,
    pub ntime_max: u32,
    pub version: u32,
    pub version_mask: u32,
    /// Big-endian 256-bit target; a share's hash must be <= this value.
    pub target: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShareError {
    #[error("nonce is not 8 hex characters")]
    BadNonce,
    #[error("nonce2 is not 1-16 hex characters of even length")]
    BadNonce2,
    #[error("ntime failed validation: {0}")]
    BadNtime(NtimeError),
    #[error("job_id is unknown or inactive")]
    UnknownOrInactiveJob,
    #[error("version bits failed validation: {0}")]
    BadVersionBits(VersionBitsError),
    #[error("share hash does not meet the job's target")]
    AboveTarget,
}

pub struct ShareFields<'a> {
    pub job_id: &'a str,
    pub nonce: &'a str,
    pub nonce2: &'a str,
    pub ntime: &'a str,
    pub version_bits: Option<&'a str>,
}

/// Looks up the job a share claims, validates every field shape against the
/// rules in the specification, and (if a hash was supplied) checks it meets
/// the job's target. `now` is injected so tests don't depend on wall time.
pub fn validate_share(
    fields: &ShareFields<'_>,
    find_job: impl Fn(&str) -> Option<Job>,
    now: u64,
    share_hash: Option<&[u8; 32]>,
) -> Result<(), ShareError> {
    if !is_hex_exact(fields.nonce, 8) {
        return Err(ShareError::BadNonce);
    }
    if !is_hex_max_even(fields.nonce2, 16) {
        return Err(ShareError::BadNonce2);
    }

    let job = find_job(fields.job_id)
        .filter(|j| j.active)
        .ok_or(ShareError::UnknownOrInactiveJob)?;

    validate_ntime_in_job_window(fields.ntime, now, job.ntime_min, job.ntime_max)
        .map_err(ShareError::BadNtime)?;

    if let Some(vb) = fields.version_bits {
        validate_version_bits(vb, job.version, job.version_mask).map_err(ShareError::BadVersionBits)?;
    }

    if let Some(hash) = share_hash {
        // Target comparison is a big-endian unsigned 256-bit compare:
        // hash <= target passes.
        if hash.as_slice() > job.target.as_slice() {
            return Err(ShareError::AboveTarget);
        }
    }

    Ok(())
}
