//! Access control lists: assembling entries into an ACL buffer, walking a
//! serialized ACL, and decoding its allow entries back into a permission map.

use crate::ace::{
    Ace, AceType, AceView, CONTAINER_INHERIT_ACE, FAILED_ACCESS_ACE_FLAG, INHERITED_ACE, INHERIT_ONLY_ACE,
    NO_PROPAGATE_INHERIT_ACE, OBJECT_INHERIT_ACE, SUCCESSFUL_ACCESS_ACE_FLAG,
};
use crate::error::{codes, Error, Result};
use crate::identity::{resolve_name, AccountLookup};
use crate::rights::{
    AccessMask, DELETE, FILE_ALL_ACCESS, FILE_APPEND_DATA, FILE_DELETE_CHILD, FILE_EXECUTE, FILE_READ_ATTRIBUTES,
    FILE_READ_DATA, FILE_READ_EA, FILE_WRITE_ATTRIBUTES, FILE_WRITE_DATA, FILE_WRITE_EA, GENERIC_ALL,
    GENERIC_EXECUTE, GENERIC_READ, GENERIC_WRITE, MAXIMUM_ALLOWED, READ_CONTROL, STANDARD_RIGHTS_ALL, SYNCHRONIZE,
    WRITE_DAC, WRITE_OWNER,
};
use crate::sid::Sid;
use crate::utils::{
    acl_count_offset, acl_size_offset, read_u16, read_u8, to_word, write_u16, ACL_HEADER_SIZE,
};
use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::fmt;

/// Account name to granted rights.
pub type PermissionMap = BTreeMap<String, AccessMask>;

pub const ACL_REVISION: u8 = 2;
pub const ACL_REVISION_DS: u8 = 4;
pub const DEFAULT_ACL_CAPACITY: usize = 1024;

const SYSTEM_MANDATORY_LABEL_NO_WRITE_UP: AccessMask = 0x1;
const SYSTEM_MANDATORY_LABEL_NO_READ_UP: AccessMask = 0x2;
const SYSTEM_MANDATORY_LABEL_NO_EXECUTE_UP: AccessMask = 0x4;

/// An ACL under construction, bounded by the capacity it was created with.
#[derive(Clone, Debug)]
pub struct Acl {
    capacity: usize,
    entries: Vec<u8>,
    count: u16,
}

impl Acl {
    pub fn new(capacity: usize) -> Result<Acl> {
        if capacity < ACL_HEADER_SIZE || capacity > u16::MAX as usize {
            return Err(Error::encoding(format!(
                "ACL capacity must be between {} and {} bytes, got {}",
                ACL_HEADER_SIZE,
                u16::MAX,
                capacity
            )));
        }

        Ok(Acl {
            capacity,
            entries: Vec::new(),
            count: 0,
        })
    }

    /// Appends `ace` after every existing entry.
    pub fn append(&mut self, ace: &Ace) -> Result<()> {
        let bytes = ace.to_bytes()?;
        if self.size() + bytes.len() > self.capacity {
            debug!(
                "ACL full: {} of {} bytes used, entry needs {}",
                self.size(),
                self.capacity,
                bytes.len()
            );
            return Err(Error::system("AddAce", codes::ERROR_ALLOTTED_SPACE_EXCEEDED));
        }

        self.entries.extend_from_slice(&bytes);
        self.count += 1;
        Ok(())
    }

    /// Header plus appended entries.
    pub fn size(&self) -> usize {
        ACL_HEADER_SIZE + self.entries.len()
    }

    pub fn ace_count(&self) -> u16 {
        self.count
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; ACL_HEADER_SIZE];
        out[0] = ACL_REVISION;
        write_u16(&mut out, acl_size_offset(), to_word(self.size(), "AclSize")?);
        write_u16(&mut out, acl_count_offset(), self.count);
        out.extend_from_slice(&self.entries);
        Ok(out)
    }
}

/// Read-only access to a serialized ACL.
#[derive(Clone, Debug)]
pub struct AclView<'a> {
    bytes: &'a [u8],
    count: usize,
    offsets: Vec<usize>,
}

impl<'a> AclView<'a> {
    /// Validates the header and locates the entries inside `AclSize`.
    ///
    /// The walk stops at the first entry that cannot be read; `AceCount` is
    /// kept as declared, so later indexes fail in `get_ace`.
    pub fn parse(bytes: &'a [u8]) -> Result<AclView<'a>> {
        let revision = read_u8(bytes, 0, "AclRevision")?;
        if revision != ACL_REVISION && revision != ACL_REVISION_DS {
            return Err(Error::encoding(format!("unsupported ACL revision {}", revision)));
        }

        let size = read_u16(bytes, acl_size_offset(), "AclSize")? as usize;
        let count = read_u16(bytes, acl_count_offset(), "AceCount")? as usize;
        if size < ACL_HEADER_SIZE || size > bytes.len() {
            return Err(Error::encoding(format!(
                "AclSize {} does not fit the {} bytes available",
                size,
                bytes.len()
            )));
        }

        let bytes = &bytes[..size];
        let mut offsets = Vec::with_capacity(count);
        let mut offset = ACL_HEADER_SIZE;
        for i in 0..count {
            match AceView::new(&bytes[offset..]) {
                Ok(view) => {
                    offsets.push(offset);
                    offset += view.size();
                }
                Err(e) => {
                    debug!("ACL walk stopped at ACE {} of {}: {}", i, count, e);
                    break;
                }
            }
        }

        Ok(AclView { bytes, count, offsets })
    }

    /// Entry count from the header, readable or not.
    pub fn ace_count(&self) -> usize {
        self.count
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn get_ace(&self, index: usize) -> Result<AceView<'a>> {
        match self.offsets.get(index) {
            Some(&offset) => AceView::new(&self.bytes[offset..]),
            None => Err(Error::encoding(format!(
                "ACE {} of {} is not readable",
                index,
                self.count
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = AceView<'a>> + '_ {
        self.offsets.iter().filter_map(move |&offset| AceView::new(&self.bytes[offset..]).ok())
    }
}

/// Maps every readable allow entry of `dacl` to its account name.
///
/// Entries that cannot be read are skipped. When two entries resolve to the
/// same account the later one wins.
pub fn decode<A: AccountLookup + ?Sized>(accounts: &A, dacl: &AclView, host: Option<&str>) -> Result<PermissionMap> {
    let mut perms = PermissionMap::new();

    for i in 0..dacl.ace_count() {
        let ace = match dacl.get_ace(i) {
            Ok(ace) => ace,
            Err(e) => {
                trace!("skipping ACE {}: {}", i, e);
                continue;
            }
        };

        if ace.ace_type() != AceType::AccessAllow {
            trace!("skipping ACE {}: {}", i, ace.ace_type());
            continue;
        }

        let (sid, mask) = match (ace.sid(), ace.mask()) {
            (Ok(sid), Ok(mask)) => (sid, mask),
            (Err(e), _) | (_, Err(e)) => {
                trace!("skipping ACE {}: {}", i, e);
                continue;
            }
        };

        let name = resolve_name(accounts, &sid, host)?;
        if let Some(previous) = perms.insert(name.clone(), mask) {
            warn!(
                "{} appears more than once in the DACL; {:#010X} replaces {:#010X}",
                name, mask, previous
            );
        }
    }

    Ok(perms)
}

/// One DACL entry as shown by listing tools.
#[derive(Clone, Debug)]
pub struct AceEntry {
    pub entry_type: AceType,
    pub size: usize,
    pub flags: u8,
    pub mask: AccessMask,
    pub sid: Option<Sid>,
    pub account: Option<String>,
}

/// Lists every entry of `dacl`, resolving account names where possible.
pub fn entries<A: AccountLookup + ?Sized>(accounts: &A, dacl: &AclView, host: Option<&str>) -> Vec<AceEntry> {
    dacl.iter()
        .map(|ace| {
            let sid = ace.sid().ok();
            let account = sid.as_ref().and_then(|sid| resolve_name(accounts, sid, host).ok());
            AceEntry {
                entry_type: ace.ace_type(),
                size: ace.size(),
                flags: ace.flags(),
                mask: ace.mask().unwrap_or_default(),
                sid,
                account,
            }
        })
        .collect()
}

fn push_names<T: Copy + Into<u32>>(out: &mut String, value: u32, names: &[(T, &str)]) {
    for &(bit, desc) in names {
        if value & bit.into() != 0 {
            if !out.is_empty() {
                out.push('|');
            }
            out.push_str(desc);
        }
    }
}

impl fmt::Display for AceEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sid_string = match self.sid {
            Some(ref sid) => sid.to_string(),
            None => "None".to_string(),
        };

        let mut flags = String::new();
        push_names(
            &mut flags,
            u32::from(self.flags),
            &[
                (CONTAINER_INHERIT_ACE, "ContainerInheritAce"),
                (FAILED_ACCESS_ACE_FLAG, "FailedAccessAce"),
                (INHERIT_ONLY_ACE, "InheritOnlyAce"),
                (INHERITED_ACE, "InheritedAce"),
                (NO_PROPAGATE_INHERIT_ACE, "NoPropagateInheritAce"),
                (OBJECT_INHERIT_ACE, "ObjectInheritAce"),
                (SUCCESSFUL_ACCESS_ACE_FLAG, "SuccessfulAccessAce"),
            ],
        );

        let mut masks = String::new();
        if self.entry_type == AceType::SystemMandatoryLabel {
            push_names(
                &mut masks,
                self.mask,
                &[
                    (SYSTEM_MANDATORY_LABEL_NO_EXECUTE_UP, "NoExecUp"),
                    (SYSTEM_MANDATORY_LABEL_NO_READ_UP, "NoReadUp"),
                    (SYSTEM_MANDATORY_LABEL_NO_WRITE_UP, "NoWriteUp"),
                ],
            );
        } else {
            if self.mask & STANDARD_RIGHTS_ALL == STANDARD_RIGHTS_ALL {
                masks += "StandardRightsAll";
            } else {
                push_names(
                    &mut masks,
                    self.mask,
                    &[
                        (DELETE, "Delete"),
                        (READ_CONTROL, "ReadControl"),
                        (WRITE_DAC, "WriteDac"),
                        (WRITE_OWNER, "WriteOwner"),
                        (SYNCHRONIZE, "Synchronize"),
                    ],
                );
            }

            push_names(
                &mut masks,
                self.mask,
                &[
                    (GENERIC_READ, "GenericRead"),
                    (GENERIC_WRITE, "GenericWrite"),
                    (GENERIC_ALL, "GenericAll"),
                    (GENERIC_EXECUTE, "GenericExec"),
                    (MAXIMUM_ALLOWED, "MaxAllowed"),
                ],
            );

            if self.mask & FILE_ALL_ACCESS == FILE_ALL_ACCESS {
                if !masks.is_empty() {
                    masks += "|";
                }
                masks += "FileAllAccess";
            } else {
                push_names(
                    &mut masks,
                    self.mask,
                    &[
                        (FILE_WRITE_ATTRIBUTES, "FileWriteAttr"),
                        (FILE_READ_ATTRIBUTES, "FileReadAttr"),
                        (FILE_DELETE_CHILD, "FileDeleteChild"),
                        (FILE_EXECUTE, "FileExecuteOrTraverse"),
                        (FILE_WRITE_EA, "FileWriteEa"),
                        (FILE_READ_EA, "FileReadEa"),
                        (FILE_APPEND_DATA, "FileAppendDataOrAddSubDir"),
                        (FILE_WRITE_DATA, "FileWriteDataOrAddFile"),
                        (FILE_READ_DATA, "FileReadDataOrListDir"),
                    ],
                );
            }
        }

        let account = self.account.as_ref().map_or("Unknown", String::as_str);

        write!(
            f,
            "Type={}\n  Flags={}\n  RawMask={:X}\n  Mask={}\n  Sid={}\n  Account={}\n",
            self.entry_type, flags, self.mask, masks, sid_string, account
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ace::encode;
    use crate::identity::AccountTable;
    use crate::rights::{CHANGE, FULL, READ};
    use proptest::prelude::*;

    fn sid(s: &str) -> Sid {
        s.parse().unwrap()
    }

    #[test]
    fn empty_acl_is_header_only() {
        let acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        assert_eq!(acl.to_bytes().unwrap(), vec![2, 0, 8, 0, 0, 0, 0, 0]);

        let bytes = acl.to_bytes().unwrap();
        let view = AclView::parse(&bytes).unwrap();
        assert_eq!(view.ace_count(), 0);
    }

    #[test]
    fn capacity_bounds() {
        assert!(Acl::new(4).is_err());
        assert!(Acl::new(70_000).is_err());
        assert!(Acl::new(8).is_ok());
    }

    #[test]
    fn append_updates_header() {
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        for ace in encode(&sid("S-1-5-32-545"), READ).unwrap() {
            acl.append(&ace).unwrap();
        }
        for ace in encode(&sid("S-1-5-18"), FULL | GENERIC_ALL).unwrap() {
            acl.append(&ace).unwrap();
        }

        let bytes = acl.to_bytes().unwrap();
        assert_eq!(acl.ace_count(), 3);
        assert_eq!(bytes.len(), 8 + 24 + 20 + 20);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]) as usize, bytes.len());
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 3);

        let view = AclView::parse(&bytes).unwrap();
        let masks: Vec<AccessMask> = view.iter().map(|ace| ace.mask().unwrap()).collect();
        assert_eq!(masks, vec![READ, GENERIC_ALL, FULL]);
    }

    #[test]
    fn full_acl_reports_allotted_space() {
        let users = sid("S-1-5-32-545");
        let ace = Ace::allow(users, CONTAINER_INHERIT_ACE, READ);
        let mut acl = Acl::new(8 + 2 * 24 + 10).unwrap();
        acl.append(&ace).unwrap();
        acl.append(&ace).unwrap();

        match acl.append(&ace) {
            Err(Error::System { operation, code }) => {
                assert_eq!(operation, "AddAce");
                assert_eq!(code, 1344);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(acl.ace_count(), 2);
        assert_eq!(acl.size(), 8 + 2 * 24);
    }

    #[test]
    fn parse_rejects_bad_headers() {
        assert!(AclView::parse(&[2, 0, 8, 0]).is_err());
        assert!(AclView::parse(&[3, 0, 8, 0, 0, 0, 0, 0]).is_err());
        assert!(AclView::parse(&[2, 0, 64, 0, 0, 0, 0, 0]).is_err());
        assert!(AclView::parse(&[4, 0, 8, 0, 0, 0, 0, 0]).is_ok());
    }

    #[test]
    fn parse_stops_at_unreadable_entry() {
        let view = AclView::parse(&[2, 0, 8, 0, 1, 0, 0, 0]).unwrap();
        assert_eq!(view.ace_count(), 1);
        assert!(matches!(view.get_ace(0), Err(Error::Encoding(_))));
        assert_eq!(view.iter().count(), 0);

        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        acl.append(&Ace::allow(sid("S-1-5-18"), 0, FULL)).unwrap();
        let mut bytes = acl.to_bytes().unwrap();
        bytes[4] = 2;
        let view = AclView::parse(&bytes).unwrap();
        assert_eq!(view.ace_count(), 2);
        assert_eq!(view.get_ace(0).unwrap().mask().unwrap(), FULL);
        assert!(view.get_ace(1).is_err());
        assert!(view.get_ace(2).is_err());
    }

    #[test]
    fn decode_keeps_allow_entries_only() {
        let table = AccountTable::new();
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        let mut deny = Ace::allow(sid("S-1-1-0"), 0, FULL);
        deny.ace_type = AceType::AccessDeny;
        acl.append(&deny).unwrap();
        acl.append(&Ace::allow(sid("S-1-5-32-545"), CONTAINER_INHERIT_ACE, READ)).unwrap();

        let bytes = acl.to_bytes().unwrap();
        let perms = decode(&table, &AclView::parse(&bytes).unwrap(), None).unwrap();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms["BUILTIN\\Users"], READ);
    }

    #[test]
    fn decode_last_entry_wins() {
        let table = AccountTable::new();
        let users = sid("S-1-5-32-545");
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        acl.append(&Ace::allow(users.clone(), 0, READ)).unwrap();
        acl.append(&Ace::allow(users, 0, CHANGE)).unwrap();

        let bytes = acl.to_bytes().unwrap();
        let perms = decode(&table, &AclView::parse(&bytes).unwrap(), None).unwrap();
        assert_eq!(perms["BUILTIN\\Users"], CHANGE);
    }

    #[test]
    fn decode_skips_unreadable_sid() {
        let table = AccountTable::new();
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        acl.append(&Ace::allow(sid("S-1-5-18"), 0, FULL)).unwrap();
        acl.append(&Ace::allow(sid("S-1-1-0"), 0, READ)).unwrap();

        let mut bytes = acl.to_bytes().unwrap();
        // corrupt the first SID's revision
        bytes[8 + 8] = 9;
        let perms = decode(&table, &AclView::parse(&bytes).unwrap(), None).unwrap();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms["Everyone"], READ);
    }

    #[test]
    fn decode_fails_on_unresolvable_sid() {
        let table = AccountTable::new();
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        acl.append(&Ace::allow(sid("S-1-5-21-9-9-9-1001"), 0, READ)).unwrap();

        let bytes = acl.to_bytes().unwrap();
        assert!(matches!(
            decode(&table, &AclView::parse(&bytes).unwrap(), None),
            Err(Error::System { operation: "LookupAccountSidW", code: 1332 })
        ));
    }

    #[test]
    fn entry_display() {
        let table = AccountTable::new();
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        acl.append(&Ace::allow(sid("S-1-5-18"), CONTAINER_INHERIT_ACE | OBJECT_INHERIT_ACE, FULL))
            .unwrap();
        acl.append(&Ace::allow(sid("S-1-5-21-9-9-9-1001"), 0, FILE_READ_DATA)).unwrap();

        let bytes = acl.to_bytes().unwrap();
        let listed = entries(&table, &AclView::parse(&bytes).unwrap(), None);
        assert_eq!(listed.len(), 2);

        let system = listed[0].to_string();
        assert!(system.contains("Type=AccessAllow"));
        assert!(system.contains("Flags=ContainerInheritAce|ObjectInheritAce"));
        assert!(system.contains("Mask=StandardRightsAll|FileAllAccess"));
        assert!(system.contains("Account=NT AUTHORITY\\SYSTEM"));

        let unknown = listed[1].to_string();
        assert!(unknown.contains("Mask=FileReadDataOrListDir"));
        assert!(unknown.contains("Sid=S-1-5-21-9-9-9-1001"));
        assert!(unknown.contains("Account=Unknown"));
    }

    proptest! {
        #[test]
        fn appended_entries_stay_within_capacity(
            capacity in 8usize..512,
            subs in prop::collection::vec(prop::collection::vec(any::<u32>(), 1..=10), 0..24),
        ) {
            let mut acl = Acl::new(capacity).unwrap();
            let mut appended = 0u16;
            for sub in subs {
                let ace = Ace::allow(Sid::from_parts(5, &sub).unwrap(), 0, READ);
                if acl.append(&ace).is_ok() {
                    appended += 1;
                }
                prop_assert!(acl.size() <= capacity);
            }

            let bytes = acl.to_bytes().unwrap();
            prop_assert_eq!(bytes.len(), acl.size());
            let view = AclView::parse(&bytes).unwrap();
            prop_assert_eq!(view.ace_count(), appended as usize);
        }
    }
}
