//! User-agent sanitization: miner-supplied `mining.subscribe` user-agent
//! strings are replaced byte-for-byte (non-printable -> `?`) and truncated
//! in place before they ever reach a log line or a stored record.

/// Replaces bytes outside the printable ASCII range (0x20-0x7E) with `?` and
/// truncates to `max_len`. Returns whether the original buffer was already
/// clean (no replacement, no truncation needed).
pub fn sanitize_user_agent_in_place(buf: &mut Vec<u8>, max_len: usize) -> bool {
    let mut clean = true;

    if buf.len() > max_len {
        buf.truncate(max_len);
        clean = false;
    }

    for b in buf.iter_mut() {
        if !(0x20..=0x7e).contains(b) {
            *b = b'?';
            clean = false;
        }
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_clean_input_untouched() {
        let mut buf = b"cgminer/4.11.1".to_vec();
        let clean = sanitize_user_agent_in_place(&mut buf, 64);
        assert!(clean);
        assert_eq!(buf, b"cgminer/4.11.1");
    }

    #[test]
    fn replaces_non_printables() {
        let mut buf = vec![b'a', 0x00, b'b', 0x7f, b'c'];
        let clean = sanitize_user_agent_in_place(&mut buf, 64);
        assert!(!clean);
        assert_eq!(buf, b"a?b?c");
    }

    #[test]
    fn truncates_oversize_input() {
        let mut buf = vec![b'x'; 100];
        let clean = sanitize_user_agent_in_place(&mut buf, 10);
        assert!(!clean);
        assert_eq!(buf.len(), 10);
    }
}
