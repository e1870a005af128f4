pub mod address;
pub mod bech32;
pub mod hex;
pub mod json_gate;
pub mod ntime;
pub mod share;
pub mod stratum;
pub mod user_agent;
pub mod version_bits;
pub mod worker_name;

pub use address::{validate_bitcoin_address, AddressError, AddressKind};
pub use share::{validate_share, Job, ShareError, ShareFields};
pub use stratum::{parse_stratum_request, IdValue, ParamValue, ParsedRequest};
pub use worker_name::validate_worker_name;

/// Sanitizes the first 64 bytes of miner-supplied input for a log line:
/// every non-printable byte becomes `.`, preventing log injection (ANSI
/// escapes, embedded newlines spoofing extra log lines, etc.) from
/// ever reaching a log sink verbatim.
pub fn sanitize_for_log(input: &[u8]) -> String {
    input
        .iter()
        .take(64)
        .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { '.' })
        .collect()
}

/// Logs a validation failure at WARNING with the fields the specification
/// requires: the source IP, the field that failed, the reason, and a
/// log-injection-safe rendering of the offending input.
#[tracing::instrument(skip(raw))]
pub fn log_validation_failure(ip: &str, field: &str, reason: &str, raw: &[u8]) {
    let sanitized = sanitize_for_log(raw);
    tracing::warn!(ip, field, reason, input = %sanitized, "validation failure");
}
