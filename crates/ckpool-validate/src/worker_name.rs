//! Stratum worker-name shape validation: 1..=128 chars of `[A-Za-z0-9_.-]`.

pub const MAX_WORKER_NAME_LEN: usize = 128;

pub fn validate_worker_name(name: &str) -> bool {
    let n = name.len();
    n >= 1
        && n <= MAX_WORKER_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}
