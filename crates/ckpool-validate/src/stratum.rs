//! Hand-written, permissive Stratum JSON-RPC parser.
//!
//! This is deliberately not a general JSON parser (see the crate's
//! non-goals): it only knows how to *skip over* a JSON value to find field
//! boundaries, and how to decode strings. Callers are expected to run
//! [`crate::json_gate::json_gate`] first so the nesting depth and payload
//! size are already bounded; this parser defends itself regardless by never
//! looping past the end of the buffer.

pub const MAX_PARAMS: usize = 8;
pub const MAX_PARAM_STRING_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdValue {
    Int(i64),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Str(String),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub id: Option<IdValue>,
    pub method: String,
    pub params: Vec<ParamValue>,
    pub valid: bool,
}

/// Scans a byte buffer just far enough to locate top-level object members
/// and skip over arbitrary JSON values; never builds a full parse tree.
struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')) {
            self.pos += 1;
        }
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Consumes a JSON string starting at the current `"`, returning the
    /// decoded value. Leaves `pos` just past the closing quote.
    fn parse_string(&mut self) -> Option<String> {
        if self.bump()? != b'"' {
            return None;
        }
        let mut out = Vec::new();
        loop {
            let b = self.bump()?;
            match b {
                b'"' => return Some(String::from_utf8_lossy(&out).into_owned()),
                b'\\' => {
                    let esc = self.bump()?;
                    match esc {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x8),
                        b'f' => out.push(0xc),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let start = self.pos;
                            if self.pos + 4 > self.buf.len() {
                                return None;
                            }
                            let hex = std::str::from_utf8(&self.buf[start..start + 4]).ok()?;
                            let cp = u32::from_str_radix(hex, 16).ok()?;
                            self.pos += 4;
                            let ch = char::from_u32(cp).unwrap_or('\u{fffd}');
                            let mut enc = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut enc).as_bytes());
                        }
                        _ => return None,
                    }
                }
                // Bytes are reassembled raw: a multi-byte UTF-8 sequence
                // passes through byte-by-byte and is decoded as a whole at
                // the end, rather than being misinterpreted one byte at a
                // time.
                _ => out.push(b),
            }
        }
    }

    /// Skips over any JSON value (object, array, string, number, bool,
    /// null) at the current position, returning the `[start, end)` span.
    fn skip_value(&mut self) -> Option<(usize, usize)> {
        self.skip_ws();
        let start = self.pos;
        match self.peek()? {
            b'"' => {
                self.parse_string()?;
            }
            b'{' => self.skip_container(b'{', b'}')?,
            b'[' => self.skip_container(b'[', b']')?,
            b't' => self.expect_literal("true")?,
            b'f' => self.expect_literal("false")?,
            b'n' => self.expect_literal("null")?,
            b'-' | b'0'..=b'9' => self.skip_number()?,
            _ => return None,
        }
        Some((start, self.pos))
    }

    fn expect_literal(&mut self, lit: &str) -> Option<()> {
        let bytes = lit.as_bytes();
        if self.buf.len() < self.pos + bytes.len() {
            return None;
        }
        if &self.buf[self.pos..self.pos + bytes.len()] != bytes {
            return None;
        }
        self.pos += bytes.len();
        Some(())
    }

    fn skip_number(&mut self) -> Option<()> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut saw_digit = false;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
            saw_digit = true;
        }
        if !saw_digit {
            return None;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        Some(())
    }

    /// Skips a bracketed container, respecting nested strings so a `}`/`]`
    /// inside a quoted string never ends the container early.
    fn skip_container(&mut self, open: u8, close: u8) -> Option<()> {
        debug_assert_eq!(self.peek(), Some(open));
        self.pos += 1;
        let mut depth = 1usize;
        while depth > 0 {
            let b = self.peek()?;
            if b == b'"' {
                self.parse_string()?;
                continue;
            }
            if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
            }
            self.pos += 1;
        }
        Some(())
    }

    /// Parses a top-level object, returning `(key, value_span)` pairs.
    fn parse_object_members(&mut self) -> Option<Vec<(String, (usize, usize))>> {
        self.skip_ws();
        if self.bump()? != b'{' {
            return None;
        }
        let mut members = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Some(members);
        }
        loop {
            self.skip_ws();
            let key = self.parse_string()?;
            self.skip_ws();
            if self.bump()? != b':' {
                return None;
            }
            let span = self.skip_value()?;
            members.push((key, span));
            self.skip_ws();
            match self.bump()? {
                b',' => continue,
                b'}' => break,
                _ => return None,
            }
        }
        Some(members)
    }

    /// Parses a top-level array, splitting string elements (decoded, capped
    /// at `MAX_PARAM_STRING_LEN` bytes) from everything else (captured as
    /// the raw literal slice). Returns the total element count alongside
    /// the first `MAX_PARAMS` captured elements.
    fn parse_params_array(&mut self) -> Option<(usize, Vec<ParamValue>)> {
        self.skip_ws();
        if self.bump()? != b'[' {
            return None;
        }
        let mut elements = Vec::new();
        let mut count = 0usize;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Some((0, elements));
        }
        loop {
            self.skip_ws();
            if self.peek() == Some(b'"') {
                let s = self.parse_string()?;
                if count < MAX_PARAMS {
                    let truncated: String = s.chars().take(MAX_PARAM_STRING_LEN).collect();
                    elements.push(ParamValue::Str(truncated));
                }
            } else {
                let (start, end) = self.skip_value()?;
                if count < MAX_PARAMS {
                    let raw = std::str::from_utf8(&self.buf[start..end]).ok()?.to_string();
                    elements.push(ParamValue::Raw(raw));
                }
            }
            count += 1;
            self.skip_ws();
            match self.bump()? {
                b',' => continue,
                b']' => break,
                _ => return None,
            }
        }
        Some((count, elements))
    }
}

fn extract_id(buf: &[u8], span: (usize, usize)) -> Option<IdValue> {
    let text = std::str::from_utf8(&buf[span.0..span.1]).ok()?.trim();
    if text == "null" {
        return Some(IdValue::Null);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(IdValue::Int(n));
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        let inner = &text[1..text.len() - 1];
        if let Ok(n) = inner.parse::<i64>() {
            return Some(IdValue::Int(n));
        }
    }
    None
}

fn params_allowed(method: &str, count: usize) -> bool {
    match method {
        "mining.subscribe" => count <= 2,
        "mining.authorize" => count == 2,
        "mining.submit" => count == 5 || count == 6,
        "mining.configure" => count >= 1,
        "mining.suggest_difficulty" => count >= 1,
        _ => false,
    }
}

/// Parses a single Stratum JSON-RPC request. Never panics: any structural
/// problem (bad JSON, missing `method`) produces a request with
/// `valid = false` rather than an error, matching the original parser's
/// "permissive, never throws" contract — rejection is communicated through
/// the `valid` flag, not a `Result`.
pub fn parse_stratum_request(buf: &[u8]) -> ParsedRequest {
    let mut scanner = Scanner::new(buf);
    let members = match scanner.parse_object_members() {
        Some(m) => m,
        None => {
            return ParsedRequest {
                id: None,
                method: String::new(),
                params: Vec::new(),
                valid: false,
            }
        }
    };

    let mut id = None;
    let mut method = String::new();
    let mut have_method = false;
    let mut params = Vec::new();
    let mut param_count = 0usize;

    for (key, span) in &members {
        match key.as_str() {
            "id" => id = extract_id(buf, *span),
            "method" => {
                let mut s = Scanner::new(buf);
                s.pos = span.0;
                if let Some(decoded) = s.parse_string() {
                    method = decoded;
                    have_method = true;
                }
            }
            "params" => {
                let mut s = Scanner::new(buf);
                s.pos = span.0;
                if let Some((count, elems)) = s.parse_params_array() {
                    param_count = count;
                    params = elems;
                }
            }
            _ => {}
        }
    }

    let valid = have_method && params_allowed(&method, param_count);

    ParsedRequest {
        id,
        method,
        params,
        valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_submit_is_valid() {
        let buf = br#"{"id":4,"method":"mining.submit","params":["worker1","job1","deadbeef","5f5e1000","20000000"]}"#;
        let req = parse_stratum_request(buf);
        assert!(req.valid);
        assert_eq!(req.id, Some(IdValue::Int(4)));
        assert_eq!(req.method, "mining.submit");
        assert_eq!(req.params.len(), 5);
    }

    #[test]
    fn authorize_with_wrong_param_count_is_invalid() {
        let buf = br#"{"id":2,"method":"mining.authorize","params":["worker1"]}"#;
        let req = parse_stratum_request(buf);
        assert!(!req.valid);
        assert_eq!(req.method, "mining.authorize");
    }

    #[test]
    fn unknown_method_is_invalid() {
        let buf = br#"{"id":1,"method":"mining.frobnicate","params":[]}"#;
        let req = parse_stratum_request(buf);
        assert!(!req.valid);
    }

    #[test]
    fn integer_in_string_id_is_accepted() {
        let buf = br#"{"id":"7","method":"mining.subscribe","params":[]}"#;
        let req = parse_stratum_request(buf);
        assert_eq!(req.id, Some(IdValue::Int(7)));
        assert!(req.valid);
    }

    #[test]
    fn null_id_is_accepted() {
        let buf = br#"{"id":null,"method":"mining.subscribe","params":[]}"#;
        let req = parse_stratum_request(buf);
        assert_eq!(req.id, Some(IdValue::Null));
    }

    #[test]
    fn subscribe_allows_zero_to_two_params() {
        let buf = br#"{"id":1,"method":"mining.subscribe","params":["cgminer/4.11.1"]}"#;
        assert!(parse_stratum_request(buf).valid);
    }

    #[test]
    fn non_string_param_captured_as_raw_slice() {
        let buf = br#"{"id":1,"method":"mining.configure","params":[{"a":1},true,null,42]}"#;
        let req = parse_stratum_request(buf);
        assert!(req.valid);
        assert_eq!(req.params[0], ParamValue::Raw("{\"a\":1}".to_string()));
        assert_eq!(req.params[1], ParamValue::Raw("true".to_string()));
        assert_eq!(req.params[3], ParamValue::Raw("42".to_string()));
    }

    #[test]
    fn params_beyond_cap_are_not_all_captured() {
        let items: Vec<String> = (0..12).map(|i| format!("\"p{i}\"")).collect();
        let buf = format!(
            r#"{{"id":1,"method":"mining.configure","params":[{}]}}"#,
            items.join(",")
        );
        let req = parse_stratum_request(buf.as_bytes());
        assert_eq!(req.params.len(), MAX_PARAMS);
    }

    #[test]
    fn string_param_truncated_to_256_bytes() {
        let long = "x".repeat(400);
        let buf = format!(r#"{{"id":1,"method":"mining.subscribe","params":["{long}"]}}"#);
        let req = parse_stratum_request(buf.as_bytes());
        match &req.params[0] {
            ParamValue::Str(s) => assert_eq!(s.len(), MAX_PARAM_STRING_LEN),
            other => panic!("expected Str, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_invalid_not_a_panic() {
        let req = parse_stratum_request(b"{not json");
        assert!(!req.valid);
        assert_eq!(req.method, "");
    }
}
