//! BIP173 (bech32) / BIP350 (bech32m) checksum verification.
//!
//! This module owns the polymod computation and the encoding/segwit-version
//! rules; the coarse shape check (length, charset, 4th-character witness
//! version marker) lives in [`crate::address`] and is applied before this
//! module is consulted, matching the split the specification draws between
//! "shape" and "checksum" validation.

const CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GEN: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

/// The polymod constant a valid bech32 (BIP173) checksum reduces to.
pub const BECH32_CONST: u32 = 1;
/// The polymod constant a valid bech32m (BIP350) checksum reduces to.
pub const BECH32M_CONST: u32 = 0x2bc83_0a3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Bech32,
    Bech32m,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Bech32Error {
    #[error("mixed case in bech32 string")]
    MixedCase,
    #[error("character outside the bech32 charset")]
    InvalidCharacter,
    #[error("missing separator '1'")]
    MissingSeparator,
    #[error("checksum does not match bech32 or bech32m")]
    BadChecksum,
    #[error("string too short for a checksum")]
    TooShort,
}

fn char_value(c: char) -> Option<u8> {
    CHARSET.find(c.to_ascii_lowercase()).map(|i| i as u8)
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let b = (chk >> 25) as u8;
        chk = (chk & 0x1ff_ffff) << 5 ^ (v as u32);
        for i in 0..5 {
            if (b >> i) & 1 == 1 {
                chk ^= GEN[i];
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(hrp.len() * 2 + 1);
    v.extend(hrp.iter().map(|b| b >> 5));
    v.push(0);
    v.extend(hrp.iter().map(|b| b & 31));
    v
}

/// Verifies the checksum of a full bech32/bech32m string (`hrp1data`) and
/// returns which of the two encodings it satisfies. `hrp` is the caller's
/// already-validated human-readable part (lowercased); `data_part` is
/// everything after the last `'1'`, including the 6-character checksum.
pub fn verify_checksum(hrp: &str, data_part: &str) -> Result<Encoding, Bech32Error> {
    if data_part.len() < 6 {
        return Err(Bech32Error::TooShort);
    }
    let has_lower = data_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = data_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(Bech32Error::MixedCase);
    }

    let mut values = hrp_expand(hrp.as_bytes());
    for c in data_part.chars() {
        values.push(char_value(c).ok_or(Bech32Error::InvalidCharacter)?);
    }

    match polymod(&values) {
        BECH32_CONST => Ok(Encoding::Bech32),
        BECH32M_CONST => Ok(Encoding::Bech32m),
        _ => Err(Bech32Error::BadChecksum),
    }
}

/// Decodes the 5-bit data-part characters (minus the trailing 6-char
/// checksum) into the witness version + program bytes, per BIP173 §
/// "Witness address" packing (8-bit groups from 5-bit groups, no padding
/// bits beyond the final partial group, and that group must be all zero).
pub fn decode_witness_program(data_part: &str) -> Option<(u8, Vec<u8>)> {
    if data_part.len() < 7 {
        return None;
    }
    let payload = &data_part[..data_part.len() - 6];
    let mut values = Vec::with_capacity(payload.len());
    for c in payload.chars() {
        values.push(char_value(c)?);
    }
    let witver = *values.first()?;
    if witver > 16 {
        return None;
    }
    let program = convert_bits(&values[1..], 5, 8, false)?;
    Some((witver, program))
}

fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv = (1u32 << to_bits) - 1;
    let max_acc = (1u32 << (from_bits + to_bits - 1)) - 1;
    let mut ret = Vec::new();
    for &value in data {
        let value = value as u32;
        if (value >> from_bits) != 0 {
            return None;
        }
        acc = ((acc << from_bits) | value) & max_acc;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(addr: &str) -> (String, String) {
        let idx = addr.rfind('1').unwrap();
        (addr[..idx].to_ascii_lowercase(), addr[idx + 1..].to_string())
    }

    #[test]
    fn bip350_bech32m_test_vector() {
        let (hrp, data) = split("A1LQFN3A");
        assert_eq!(verify_checksum(&hrp, &data.to_ascii_lowercase()), Ok(Encoding::Bech32m));
    }

    #[test]
    fn bip173_segwit_v0_vector_is_bech32() {
        let addr = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let (hrp, data) = split(addr);
        assert_eq!(verify_checksum(&hrp, &data), Ok(Encoding::Bech32));
    }

    #[test]
    fn bip350_taproot_vector_is_bech32m() {
        let addr = "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0";
        let (hrp, data) = split(addr);
        assert_eq!(verify_checksum(&hrp, &data), Ok(Encoding::Bech32m));
    }

    #[test]
    fn flipping_last_character_breaks_checksum() {
        let addr = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let (hrp, mut data) = split(addr);
        let last = data.pop().unwrap();
        let replacement = if last == 'q' { 'p' } else { 'q' };
        data.push(replacement);
        assert!(verify_checksum(&hrp, &data).is_err());
    }

    #[test]
    fn mixed_case_rejected() {
        let addr = "bc1QW508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let (hrp, data) = split(addr);
        assert_eq!(verify_checksum(&hrp, &data), Err(Bech32Error::MixedCase));
    }

    #[test]
    fn segwit_v0_program_is_20_bytes() {
        let addr = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        let (_, data) = split(addr);
        let (witver, program) = decode_witness_program(&data).unwrap();
        assert_eq!(witver, 0);
        assert_eq!(program.len(), 20);
    }

    #[test]
    fn taproot_program_is_32_bytes() {
        let addr = "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0";
        let (_, data) = split(addr);
        let (witver, program) = decode_witness_program(&data).unwrap();
        assert_eq!(witver, 1);
        assert_eq!(program.len(), 32);
    }
}
