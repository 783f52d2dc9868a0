//! Eight-bit checksum methods used to rewrite the trailing byte of a
//! message after [`crate::rewrite::PatternRewriter`] applies a substitution.

use crate::Error;
use derive_more::Display;
use std::str::FromStr;

/// A checksum function over a message body, applied to the bytes preceding
/// the trailing checksum byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChecksumMethod {
    Xor8,
    Mod256,
    Mod256Plus1,
    TwosComplement8,
}

impl ChecksumMethod {
    /// Computes the checksum over `body`.
    pub fn checksum(self, body: &[u8]) -> u8 {
        match self {
            ChecksumMethod::Xor8 => body.iter().fold(0u8, |acc, b| acc ^ b),
            ChecksumMethod::Mod256 => {
                body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
            }
            // The original source computes `(sum mod 256) + 1` without
            // re-truncating, which can overflow to 256 on an all-0xff sum.
            // We pin this to 8-bit truncation after the `+1` for
            // determinism (see DESIGN.md).
            ChecksumMethod::Mod256Plus1 => {
                let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
                sum.wrapping_add(1)
            }
            ChecksumMethod::TwosComplement8 => {
                let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
                sum.wrapping_neg()
            }
        }
    }
}

impl FromStr for ChecksumMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "xor8" => Ok(ChecksumMethod::Xor8),
            "2" | "mod256" => Ok(ChecksumMethod::Mod256),
            "3" | "mod256plus1" => Ok(ChecksumMethod::Mod256Plus1),
            "4" | "twoscomplement8" => Ok(ChecksumMethod::TwosComplement8),
            other => Err(Error::Config(format!(
                "unknown checksum method {other:?}, expected one of: xor8, mod256, \
                 mod256plus1, twoscomplement8"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor8_folds_all_bytes() {
        assert_eq!(ChecksumMethod::Xor8.checksum(&[0x41, 0x42, 0x05]), 0x41 ^ 0x42 ^ 0x05);
    }

    #[test]
    fn mod256_wraps() {
        assert_eq!(ChecksumMethod::Mod256.checksum(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn mod256_plus1_truncates_after_increment() {
        assert_eq!(ChecksumMethod::Mod256Plus1.checksum(&[0xFF]), 0x00);
        assert_eq!(ChecksumMethod::Mod256Plus1.checksum(&[0x01]), 0x02);
    }

    #[test]
    fn mod256_and_twos_complement_sum_to_zero() {
        for body in [&[0x01u8, 0x02, 0x03][..], &[0xFF, 0xFF], &[0x00]] {
            let a = ChecksumMethod::Mod256.checksum(body);
            let b = ChecksumMethod::TwosComplement8.checksum(body);
            assert_eq!(a.wrapping_add(b), 0);
        }
    }

    #[test]
    fn from_str_accepts_names_and_numeric_ids() {
        assert_eq!(ChecksumMethod::from_str("xor8").unwrap(), ChecksumMethod::Xor8);
        assert_eq!(ChecksumMethod::from_str("3").unwrap(), ChecksumMethod::Mod256Plus1);
        assert!(ChecksumMethod::from_str("bogus").is_err());
    }
}
