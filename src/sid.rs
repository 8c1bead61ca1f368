//! Owned, validated security identifiers and their binary and `S-R-A-…`
//! string forms.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const SID_REVISION: u8 = 1;
pub const MIN_SUB_AUTHORITY_COUNT: usize = 1;
pub const MAX_SUB_AUTHORITY_COUNT: usize = 15;

/// Revision, count and authority precede the sub-authorities.
pub const SID_HEAD_SIZE: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid {
    identifier_authority: [u8; 6],
    sub_authority: Vec<u32>,
}

impl Sid {
    pub fn new(identifier_authority: [u8; 6], sub_authority: &[u32]) -> Result<Sid> {
        if sub_authority.len() < MIN_SUB_AUTHORITY_COUNT || sub_authority.len() > MAX_SUB_AUTHORITY_COUNT {
            return Err(Error::encoding(format!(
                "a SID carries 1 to 15 sub-authorities, got {}",
                sub_authority.len()
            )));
        }

        Ok(Sid {
            identifier_authority,
            sub_authority: sub_authority.to_vec(),
        })
    }

    /// Builds a SID whose authority fits in the low byte, e.g. `from_parts(5, &[18])`
    /// for `S-1-5-18`.
    pub fn from_parts(authority: u8, sub_authority: &[u32]) -> Result<Sid> {
        Sid::new([0, 0, 0, 0, 0, authority], sub_authority)
    }

    /// Reads a binary SID from the front of `buf`, ignoring any trailing bytes.
    pub fn parse(buf: &[u8]) -> Result<Sid> {
        if buf.len() < SID_HEAD_SIZE {
            return Err(Error::encoding(format!("{} bytes is too short for a SID", buf.len())));
        }

        if buf[0] != SID_REVISION {
            return Err(Error::encoding(format!("unsupported SID revision {}", buf[0])));
        }

        let count = buf[1] as usize;
        if count < MIN_SUB_AUTHORITY_COUNT || count > MAX_SUB_AUTHORITY_COUNT {
            return Err(Error::encoding(format!("invalid sub-authority count {}", count)));
        }

        let len = SID_HEAD_SIZE + 4 * count;
        if buf.len() < len {
            return Err(Error::encoding(format!(
                "SID declares {} bytes but only {} are available",
                len,
                buf.len()
            )));
        }

        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&buf[2..8]);

        let sub_authority = buf[SID_HEAD_SIZE..len]
            .chunks_exact(4)
            .map(|raw| u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect();

        Ok(Sid {
            identifier_authority,
            sub_authority,
        })
    }

    /// Length of the binary form: 8 + 4 per sub-authority.
    pub fn byte_len(&self) -> usize {
        SID_HEAD_SIZE + 4 * self.sub_authority.len()
    }

    pub fn identifier_authority(&self) -> u64 {
        self.identifier_authority
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// The relative identifier, i.e. the last sub-authority.
    pub fn rid(&self) -> u32 {
        self.sub_authority.last().copied().unwrap_or_default()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(SID_REVISION);
        out.push(self.sub_authority.len() as u8);
        out.extend_from_slice(&self.identifier_authority);
        for sub in &self.sub_authority {
            out.extend_from_slice(&sub.to_le_bytes());
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_to(&mut out);
        out
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let authority = self.identifier_authority();
        if authority >> 32 == 0 {
            write!(f, "S-{}-{}", SID_REVISION, authority)?;
        } else {
            write!(f, "S-{}-0x{:012X}", SID_REVISION, authority)?;
        }

        for sub in &self.sub_authority {
            write!(f, "-{}", sub)?;
        }

        Ok(())
    }
}

impl FromStr for Sid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Sid> {
        let invalid = || Error::encoding(format!("`{}` is not a SID string", s));
        let mut parts = s.split('-');

        if !parts.next().map_or(false, |head| head.eq_ignore_ascii_case("s")) {
            return Err(invalid());
        }

        let revision = parts
            .next()
            .and_then(|r| r.parse::<u8>().ok())
            .ok_or_else(invalid)?;
        if revision != SID_REVISION {
            return Err(invalid());
        }

        let authority = parts
            .next()
            .and_then(|a| match a.strip_prefix("0x").or_else(|| a.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => a.parse::<u64>().ok(),
            })
            .filter(|&a| a >> 48 == 0)
            .ok_or_else(invalid)?;

        let mut identifier_authority = [0u8; 6];
        identifier_authority.copy_from_slice(&authority.to_be_bytes()[2..]);

        let sub_authority = parts
            .map(|sub| sub.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<u32>>>()?;

        Sid::new(identifier_authority, &sub_authority)
    }
}
