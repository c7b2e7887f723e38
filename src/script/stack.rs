//! Stack element codecs for script numbers and booleans.
//!
//! Numbers use CScriptNum encoding: little-endian magnitude with a sign bit
//! in the most significant byte. Zero is the empty string. Minimality is
//! checked here, at the boundary where a buffer becomes a number, not at
//! push time.

use crate::util::{Result, ScriptError};
use num_bigint::{BigInt, Sign};
use num_traits::Zero;

const MAX_NUM_LEN: usize = 4;

/// Decodes a stack item to bool: any non-zero payload bit is true.
///
/// A lone sign bit (negative zero) is false.
#[must_use]
#[inline]
pub fn decode_bool(s: &[u8]) -> bool {
    if s.is_empty() {
        return false;
    }
    for &byte in &s[..s.len() - 1] {
        if byte != 0 {
            return true;
        }
    }
    (s[s.len() - 1] & 0x7f) != 0
}

/// Returns whether a number encoding is the canonical minimal form.
#[must_use]
#[inline]
pub fn is_minimally_encoded(s: &[u8]) -> bool {
    if s.is_empty() {
        return true;
    }
    if s[s.len() - 1] & 0x7f == 0 {
        // Top byte carries only the sign; it is required only when the byte
        // below has its high bit set.
        if s.len() == 1 || s[s.len() - 2] & 0x80 == 0 {
            return false;
        }
    }
    true
}

/// Decodes a classic-range number (at most 4 bytes, sign-magnitude LE).
///
/// # Errors
/// `ScriptError::NumericOverflow` for items longer than 4 bytes.
#[inline]
pub fn decode_num(s: &[u8]) -> Result<i64> {
    if s.len() > MAX_NUM_LEN {
        return Err(ScriptError::NumericOverflow.into());
    }
    if s.is_empty() {
        return Ok(0);
    }
    let mut n: i64 = 0;
    for (i, &b) in s.iter().enumerate() {
        let byte = if i == s.len() - 1 { b & 0x7f } else { b };
        n |= (byte as i64) << (8 * i);
    }
    if s[s.len() - 1] & 0x80 != 0 {
        n = -n;
    }
    Ok(n)
}

/// Encodes a number into the minimal sign-magnitude form.
///
/// # Errors
/// `ScriptError::NumericOverflow` if the value does not fit the classic
/// 4-byte range.
#[inline]
pub fn encode_num(val: i64) -> Result<Vec<u8>> {
    if val.unsigned_abs() >= 1 << 31 {
        return Err(ScriptError::NumericOverflow.into());
    }
    if val == 0 {
        return Ok(vec![]);
    }
    let neg = val < 0;
    let mut abs = val.unsigned_abs();
    let mut v = Vec::with_capacity(5);
    while abs > 0 {
        v.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if v[v.len() - 1] & 0x80 != 0 {
        v.push(if neg { 0x80 } else { 0x00 });
    } else if neg {
        let last = v.len() - 1;
        v[last] |= 0x80;
    }
    Ok(v)
}

/// Decodes bytes to a BigInt (sign-magnitude LE, no range limit).
#[must_use]
#[inline]
pub fn decode_bigint(s: &[u8]) -> BigInt {
    if s.is_empty() {
        return BigInt::zero();
    }
    let mut mag = s.to_vec();
    let last = mag.len() - 1;
    let neg = mag[last] & 0x80 != 0;
    mag[last] &= 0x7f;
    let n = BigInt::from_bytes_le(Sign::Plus, &mag);
    if neg { -n } else { n }
}

/// Encodes a BigInt to the minimal sign-magnitude form.
#[must_use]
#[inline]
pub fn encode_bigint(bi: &BigInt) -> Vec<u8> {
    if bi.is_zero() {
        return vec![];
    }
    let (sign, mut bytes) = bi.to_bytes_le();
    // to_bytes_le never emits leading zero bytes for a non-zero magnitude
    if bytes[bytes.len() - 1] & 0x80 != 0 {
        bytes.push(if sign == Sign::Minus { 0x80 } else { 0x00 });
    } else if sign == Sign::Minus {
        let last = bytes.len() - 1;
        bytes[last] |= 0x80;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_bool_tests() {
        assert!(decode_bool(&[1]));
        assert!(decode_bool(&[255, 0, 0, 0]));
        assert!(decode_bool(&[0, 0, 0, 129]));
        assert!(!decode_bool(&[0]));
        assert!(!decode_bool(&[0, 0, 0, 0]));
        assert!(!decode_bool(&[0, 0, 0, 128]));
        assert!(!decode_bool(&[]));
    }

    #[test]
    fn encode_num_sign_magnitude() {
        assert_eq!(encode_num(0).unwrap(), Vec::<u8>::new());
        assert_eq!(encode_num(1).unwrap(), vec![0x01]);
        assert_eq!(encode_num(-1).unwrap(), vec![0x81]);
        assert_eq!(encode_num(127).unwrap(), vec![0x7f]);
        assert_eq!(encode_num(128).unwrap(), vec![0x80, 0x00]);
        assert_eq!(encode_num(-128).unwrap(), vec![0x80, 0x80]);
        assert_eq!(encode_num(256).unwrap(), vec![0x00, 0x01]);
        assert_eq!(encode_num(-256).unwrap(), vec![0x00, 0x81]);
        assert_eq!(encode_num(2_147_483_647).unwrap(), vec![0xff, 0xff, 0xff, 0x7f]);
        assert!(encode_num(2_147_483_648).is_err());
        assert!(encode_num(-2_147_483_648).is_err());
    }

    #[test]
    fn decode_num_round_trip() {
        for val in [0i64, 1, -1, 127, 128, -128, 255, 256, -256, 1_111, -1_111, 111_111,
            -111_111, 2_147_483_647, -2_147_483_647]
        {
            assert_eq!(decode_num(&encode_num(val).unwrap()).unwrap(), val);
        }
        // 5 bytes is past the classic range
        assert!(decode_num(&[0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn minimal_encoding() {
        assert!(is_minimally_encoded(&[]));
        assert!(is_minimally_encoded(&[1]));
        assert!(is_minimally_encoded(&[0x80, 0x00]));
        assert!(is_minimally_encoded(&[0x80, 0x80]));
        assert!(!is_minimally_encoded(&[0x00]));
        assert!(!is_minimally_encoded(&[0x80]));
        assert!(!is_minimally_encoded(&[0x01, 0x00]));
        assert!(!is_minimally_encoded(&[0x01, 0x80]));
    }

    #[test]
    fn bigint_round_trip() {
        let bi_zero = BigInt::zero();
        assert_eq!(encode_bigint(&bi_zero), Vec::<u8>::new());
        let bi_1234 = BigInt::from(1234u32);
        let bytes_1234 = encode_bigint(&bi_1234);
        assert_eq!(bytes_1234, vec![0xd2, 0x04]);
        assert_eq!(decode_bigint(&bytes_1234), bi_1234);
        let bi_neg = -bi_1234.clone();
        let bytes_neg = encode_bigint(&bi_neg);
        assert_eq!(bytes_neg, vec![0xd2, 0x84]);
        assert_eq!(decode_bigint(&bytes_neg), bi_neg);
        // Values larger than any fixed-width integer survive
        let huge = BigInt::from(1u8) << 200;
        assert_eq!(decode_bigint(&encode_bigint(&huge)), huge);
        assert_eq!(decode_bigint(&encode_bigint(&-&huge)), -&huge);
    }

    #[test]
    fn num_bigint_agree() {
        for val in [0i64, 1, -1, 127, 128, -128, 255, 256, -256, 2_147_483_647] {
            assert_eq!(encode_num(val).unwrap(), encode_bigint(&BigInt::from(val)));
        }
    }
}
