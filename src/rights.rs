//! Access-right constants, the named-rights vocabulary and the mask-to-label
//! decomposition.

use crate::error::{Error, Result};

/// See [ACCESS_MASK](https://docs.microsoft.com/en-us/windows/desktop/secauthz/access-mask)
pub type AccessMask = u32;

pub const FILE_READ_DATA: AccessMask = 0x0000_0001;
pub const FILE_WRITE_DATA: AccessMask = 0x0000_0002;
pub const FILE_APPEND_DATA: AccessMask = 0x0000_0004;
pub const FILE_READ_EA: AccessMask = 0x0000_0008;
pub const FILE_WRITE_EA: AccessMask = 0x0000_0010;
pub const FILE_EXECUTE: AccessMask = 0x0000_0020;
pub const FILE_DELETE_CHILD: AccessMask = 0x0000_0040;
pub const FILE_READ_ATTRIBUTES: AccessMask = 0x0000_0080;
pub const FILE_WRITE_ATTRIBUTES: AccessMask = 0x0000_0100;

pub const DELETE: AccessMask = 0x0001_0000;
pub const READ_CONTROL: AccessMask = 0x0002_0000;
pub const WRITE_DAC: AccessMask = 0x0004_0000;
pub const WRITE_OWNER: AccessMask = 0x0008_0000;
pub const SYNCHRONIZE: AccessMask = 0x0010_0000;

pub const STANDARD_RIGHTS_REQUIRED: AccessMask = 0x000F_0000;
pub const STANDARD_RIGHTS_READ: AccessMask = READ_CONTROL;
pub const STANDARD_RIGHTS_WRITE: AccessMask = READ_CONTROL;
pub const STANDARD_RIGHTS_EXECUTE: AccessMask = READ_CONTROL;
pub const STANDARD_RIGHTS_ALL: AccessMask = 0x001F_0000;
pub const SPECIFIC_RIGHTS_ALL: AccessMask = 0x0000_FFFF;

pub const ACCESS_SYSTEM_SECURITY: AccessMask = 0x0100_0000;
pub const MAXIMUM_ALLOWED: AccessMask = 0x0200_0000;

pub const GENERIC_ALL: AccessMask = 0x1000_0000;
pub const GENERIC_EXECUTE: AccessMask = 0x2000_0000;
pub const GENERIC_WRITE: AccessMask = 0x4000_0000;
pub const GENERIC_READ: AccessMask = 0x8000_0000;

pub const FILE_GENERIC_READ: AccessMask =
    STANDARD_RIGHTS_READ | FILE_READ_DATA | FILE_READ_ATTRIBUTES | FILE_READ_EA | SYNCHRONIZE;
pub const FILE_GENERIC_WRITE: AccessMask = STANDARD_RIGHTS_WRITE
    | FILE_WRITE_DATA
    | FILE_WRITE_ATTRIBUTES
    | FILE_WRITE_EA
    | FILE_APPEND_DATA
    | SYNCHRONIZE;
pub const FILE_GENERIC_EXECUTE: AccessMask =
    STANDARD_RIGHTS_EXECUTE | FILE_READ_ATTRIBUTES | FILE_EXECUTE | SYNCHRONIZE;
pub const FILE_ALL_ACCESS: AccessMask = STANDARD_RIGHTS_REQUIRED | SYNCHRONIZE | 0x1FF;

/// Bits that select the broad ("generic") rights; everything else is specific.
pub const GENERIC_RIGHTS_MASK: AccessMask = GENERIC_READ | GENERIC_WRITE | GENERIC_EXECUTE | GENERIC_ALL;
pub const REST_RIGHTS_MASK: AccessMask = !GENERIC_RIGHTS_MASK;

/// Read, write, append, execute and delete.
pub const FULL: AccessMask = STANDARD_RIGHTS_ALL
    | FILE_READ_DATA
    | FILE_WRITE_DATA
    | FILE_APPEND_DATA
    | FILE_READ_EA
    | FILE_WRITE_EA
    | FILE_EXECUTE
    | FILE_DELETE_CHILD
    | FILE_READ_ATTRIBUTES
    | FILE_WRITE_ATTRIBUTES;

/// Generic write, generic read, execute and delete.
pub const CHANGE: AccessMask = FILE_GENERIC_WRITE | FILE_GENERIC_READ | FILE_EXECUTE | DELETE;

/// Read and execute.
pub const READ: AccessMask = FILE_GENERIC_READ | FILE_EXECUTE;

pub const ADD: AccessMask = 0x0012_01BF;

/// The named rights, in the order labels are reported.
pub const SECURITY_RIGHTS: [(&str, AccessMask); 5] = [
    ("FULL", FULL),
    ("DELETE", DELETE),
    ("READ", READ),
    ("CHANGE", CHANGE),
    ("ADD", ADD),
];

const RAW_RIGHTS: [(&str, AccessMask); 30] = [
    ("FILE_READ_DATA", FILE_READ_DATA),
    ("FILE_WRITE_DATA", FILE_WRITE_DATA),
    ("FILE_APPEND_DATA", FILE_APPEND_DATA),
    ("FILE_READ_EA", FILE_READ_EA),
    ("FILE_WRITE_EA", FILE_WRITE_EA),
    ("FILE_EXECUTE", FILE_EXECUTE),
    ("FILE_DELETE_CHILD", FILE_DELETE_CHILD),
    ("FILE_READ_ATTRIBUTES", FILE_READ_ATTRIBUTES),
    ("FILE_WRITE_ATTRIBUTES", FILE_WRITE_ATTRIBUTES),
    ("DELETE", DELETE),
    ("READ_CONTROL", READ_CONTROL),
    ("WRITE_DAC", WRITE_DAC),
    ("WRITE_OWNER", WRITE_OWNER),
    ("SYNCHRONIZE", SYNCHRONIZE),
    ("STANDARD_RIGHTS_REQUIRED", STANDARD_RIGHTS_REQUIRED),
    ("STANDARD_RIGHTS_READ", STANDARD_RIGHTS_READ),
    ("STANDARD_RIGHTS_WRITE", STANDARD_RIGHTS_WRITE),
    ("STANDARD_RIGHTS_EXECUTE", STANDARD_RIGHTS_EXECUTE),
    ("STANDARD_RIGHTS_ALL", STANDARD_RIGHTS_ALL),
    ("SPECIFIC_RIGHTS_ALL", SPECIFIC_RIGHTS_ALL),
    ("ACCESS_SYSTEM_SECURITY", ACCESS_SYSTEM_SECURITY),
    ("MAXIMUM_ALLOWED", MAXIMUM_ALLOWED),
    ("GENERIC_READ", GENERIC_READ),
    ("GENERIC_WRITE", GENERIC_WRITE),
    ("GENERIC_EXECUTE", GENERIC_EXECUTE),
    ("GENERIC_ALL", GENERIC_ALL),
    ("FILE_GENERIC_READ", FILE_GENERIC_READ),
    ("FILE_GENERIC_WRITE", FILE_GENERIC_WRITE),
    ("FILE_GENERIC_EXECUTE", FILE_GENERIC_EXECUTE),
    ("FILE_ALL_ACCESS", FILE_ALL_ACCESS),
];

/// Looks up a named right or raw constant, case-insensitively.
pub fn lookup(name: &str) -> Option<AccessMask> {
    SECURITY_RIGHTS
        .iter()
        .chain(RAW_RIGHTS.iter())
        .find(|&&(label, _)| label.eq_ignore_ascii_case(name))
        .map(|&(_, mask)| mask)
}

/// Parses `READ|FILE_WRITE_EA|0x100`-style expressions into a mask.
pub fn parse(expr: &str) -> Result<AccessMask> {
    let mut mask: AccessMask = 0;
    for token in expr.split('|').map(str::trim) {
        if token.is_empty() {
            return Err(Error::UnknownRight(expr.to_owned()));
        }

        let value = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            AccessMask::from_str_radix(hex, 16).ok()
        } else if token.bytes().all(|b| b.is_ascii_digit()) {
            token.parse::<AccessMask>().ok()
        } else {
            lookup(token)
        };

        match value {
            Some(bits) => mask |= bits,
            None => return Err(Error::UnknownRight(token.to_owned())),
        }
    }

    Ok(mask)
}

/// Splits `mask` into its generic and specific components.
///
/// `GENERIC_ALL` subsumes the other generic bits, so when it is present it is
/// the only generic bit kept.
pub fn split_generic(mask: AccessMask) -> (AccessMask, AccessMask) {
    let generic = if mask & GENERIC_ALL != 0 {
        mask & GENERIC_ALL
    } else {
        mask & GENERIC_RIGHTS_MASK
    };

    (generic, mask & REST_RIGHTS_MASK)
}

/// Human-readable labels for the rights present in `mask`.
///
/// `FULL` suppresses every finer label; otherwise every named right whose bits
/// are all set in `mask` is reported, in declaration order.
pub fn labels(mask: AccessMask) -> Vec<&'static str> {
    if mask == 0 {
        return vec!["NONE"];
    }

    if mask & FULL == FULL {
        return vec!["FULL"];
    }

    SECURITY_RIGHTS
        .iter()
        .filter(|&&(_, bits)| mask & bits == bits)
        .map(|&(label, _)| label)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn named_rights_match_platform_values() {
        assert_eq!(FULL, 0x001F_01FF);
        assert_eq!(FULL, FILE_ALL_ACCESS);
        assert_eq!(READ, 0x0012_00A9);
        assert_eq!(CHANGE, 0x0013_01BF);
        assert_eq!(FILE_GENERIC_READ, 0x0012_0089);
        assert_eq!(FILE_GENERIC_WRITE, 0x0012_0116);
        assert_eq!(FILE_GENERIC_EXECUTE, 0x0012_00A0);
    }

    #[test]
    fn full_covers_every_named_right() {
        for &(label, bits) in SECURITY_RIGHTS.iter() {
            assert_eq!(FULL & bits, bits, "{} is not within FULL", label);
        }
    }

    #[test]
    fn zero_mask_is_none() {
        assert_eq!(labels(0), vec!["NONE"]);
    }

    #[test]
    fn full_short_circuits() {
        assert_eq!(labels(FULL), vec!["FULL"]);
        assert_eq!(labels(FULL | GENERIC_READ), vec!["FULL"]);
    }

    #[test]
    fn read_alone() {
        let read = labels(READ);
        assert_eq!(read, vec!["READ"]);
        assert!(!read.contains(&"FULL"));
        assert!(!read.contains(&"DELETE"));
    }

    #[test]
    fn overlapping_labels_are_all_reported() {
        assert_eq!(labels(CHANGE), vec!["DELETE", "READ", "CHANGE", "ADD"]);
        assert_eq!(labels(ADD), vec!["READ", "ADD"]);
        assert_eq!(labels(DELETE), vec!["DELETE"]);
    }

    #[test]
    fn unnamed_bits_yield_no_labels() {
        assert!(labels(FILE_WRITE_EA).is_empty());
        assert!(labels(GENERIC_READ).is_empty());
    }

    #[test]
    fn split_generic_components() {
        assert_eq!(split_generic(GENERIC_READ | READ), (GENERIC_READ, READ));
        assert_eq!(split_generic(GENERIC_ALL | GENERIC_WRITE), (GENERIC_ALL, 0));
        assert_eq!(split_generic(CHANGE), (0, CHANGE));
        assert_eq!(split_generic(0), (0, 0));
    }

    #[test]
    fn parse_expressions() {
        assert_eq!(parse("READ").unwrap(), READ);
        assert_eq!(parse("read | file_write_ea").unwrap(), READ | FILE_WRITE_EA);
        assert_eq!(parse("0x10000").unwrap(), DELETE);
        assert_eq!(parse("65536").unwrap(), DELETE);
        assert_eq!(parse("GENERIC_ALL|FULL").unwrap(), GENERIC_ALL | FULL);
        assert!(matches!(parse("WRITE"), Err(Error::UnknownRight(ref t)) if t == "WRITE"));
        assert!(matches!(parse("READ|"), Err(Error::UnknownRight(_))));
    }

    proptest! {
        #[test]
        fn labels_are_subsets(mask in any::<u32>()) {
            let found = labels(mask);
            prop_assert!(!found.is_empty() || mask != 0);
            for label in found {
                if label == "NONE" {
                    prop_assert_eq!(mask, 0);
                    continue;
                }
                let bits = lookup(label).unwrap();
                prop_assert_eq!(mask & bits, bits);
            }
        }

        #[test]
        fn split_keeps_specific_bits(mask in any::<u32>()) {
            let (generic, specific) = split_generic(mask);
            prop_assert_eq!(generic & REST_RIGHTS_MASK, 0);
            prop_assert_eq!(specific | (mask & GENERIC_RIGHTS_MASK), mask);
        }
    }
}
