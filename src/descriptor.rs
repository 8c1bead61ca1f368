//! Self-relative security descriptors: building one around a DACL, reading
//! one back, and the per-part selection the storage services perform.

use crate::acl::{Acl, AclView};
use crate::error::{codes, Error, Result};
use crate::sid::Sid;
use crate::utils::{
    read_u16, read_u32, read_u8, sd_control_offset, sd_dacl_offset, sd_group_offset, sd_owner_offset,
    sd_sacl_offset, to_dword, write_u16, write_u32, SECURITY_DESCRIPTOR_RELATIVE_SIZE,
};

pub const SECURITY_DESCRIPTOR_REVISION: u8 = 1;

pub const SE_OWNER_DEFAULTED: u16 = 0x0001;
pub const SE_GROUP_DEFAULTED: u16 = 0x0002;
pub const SE_DACL_PRESENT: u16 = 0x0004;
pub const SE_DACL_DEFAULTED: u16 = 0x0008;
pub const SE_SACL_PRESENT: u16 = 0x0010;
pub const SE_SACL_DEFAULTED: u16 = 0x0020;
pub const SE_DACL_AUTO_INHERITED: u16 = 0x0400;
pub const SE_SACL_AUTO_INHERITED: u16 = 0x0800;
pub const SE_DACL_PROTECTED: u16 = 0x1000;
pub const SE_SACL_PROTECTED: u16 = 0x2000;
pub const SE_SELF_RELATIVE: u16 = 0x8000;

/// Which parts of a descriptor a read or write covers.
pub type SecurityInformation = u32;

pub const OWNER_SECURITY_INFORMATION: SecurityInformation = 0x1;
pub const GROUP_SECURITY_INFORMATION: SecurityInformation = 0x2;
pub const DACL_SECURITY_INFORMATION: SecurityInformation = 0x4;
pub const SACL_SECURITY_INFORMATION: SecurityInformation = 0x8;

const DACL_CONTROL_BITS: u16 = SE_DACL_PRESENT | SE_DACL_DEFAULTED | SE_DACL_AUTO_INHERITED | SE_DACL_PROTECTED;
const SACL_CONTROL_BITS: u16 = SE_SACL_PRESENT | SE_SACL_DEFAULTED | SE_SACL_AUTO_INHERITED | SE_SACL_PROTECTED;

/// An owned self-relative descriptor.
///
/// A present DACL of `None` is the null DACL; an absent one is signalled by
/// a clear `SE_DACL_PRESENT` bit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityDescriptor {
    control: u16,
    owner: Option<Sid>,
    group: Option<Sid>,
    sacl: Option<Vec<u8>>,
    dacl: Option<Vec<u8>>,
}

impl SecurityDescriptor {
    /// An empty descriptor: no owner, group, SACL or DACL.
    pub fn new() -> SecurityDescriptor {
        SecurityDescriptor {
            control: SE_SELF_RELATIVE,
            owner: None,
            group: None,
            sacl: None,
            dacl: None,
        }
    }

    /// The minimal descriptor that carries `acl` as its DACL.
    pub fn with_dacl(acl: &Acl) -> Result<SecurityDescriptor> {
        let dacl = acl
            .to_bytes()
            .map_err(|_| Error::system("SetSecurityDescriptorDacl", codes::ERROR_INVALID_ACL))?;

        let mut sd = SecurityDescriptor::new();
        sd.set_dacl(Some(dacl));
        Ok(sd)
    }

    /// Marks the DACL present; `None` makes it the null DACL.
    pub fn set_dacl(&mut self, dacl: Option<Vec<u8>>) {
        self.control |= SE_DACL_PRESENT;
        self.dacl = dacl;
    }

    pub fn set_owner(&mut self, owner: Option<Sid>) {
        self.owner = owner;
    }

    pub fn control(&self) -> u16 {
        self.control
    }

    pub fn owner(&self) -> Option<&Sid> {
        self.owner.as_ref()
    }

    /// The DACL, distinguishing an absent DACL from a null one.
    pub fn extract_dacl(&self) -> Result<AclView> {
        if self.control & SE_DACL_PRESENT == 0 {
            return Err(Error::NoDaclPresent);
        }

        match self.dacl {
            Some(ref dacl) => AclView::parse(dacl),
            None => Err(Error::NullDacl),
        }
    }

    /// Reads a self-relative descriptor. Absolute descriptors hold pointers
    /// into another address space and are rejected.
    pub fn parse(bytes: &[u8]) -> Result<SecurityDescriptor> {
        if bytes.len() < SECURITY_DESCRIPTOR_RELATIVE_SIZE {
            return Err(Error::encoding(format!(
                "{} bytes is too short for a security descriptor",
                bytes.len()
            )));
        }

        let revision = read_u8(bytes, 0, "Revision")?;
        if revision != SECURITY_DESCRIPTOR_REVISION {
            return Err(Error::encoding(format!("unsupported descriptor revision {}", revision)));
        }

        let control = read_u16(bytes, sd_control_offset(), "Control")?;
        if control & SE_SELF_RELATIVE == 0 {
            return Err(Error::encoding("absolute security descriptors cannot be read from a buffer"));
        }

        let owner = match read_u32(bytes, sd_owner_offset(), "OffsetOwner")? {
            0 => None,
            offset => Some(Sid::parse(tail(bytes, offset, "owner")?)?),
        };
        let group = match read_u32(bytes, sd_group_offset(), "OffsetGroup")? {
            0 => None,
            offset => Some(Sid::parse(tail(bytes, offset, "group")?)?),
        };

        let sacl = if control & SE_SACL_PRESENT != 0 {
            read_acl(bytes, read_u32(bytes, sd_sacl_offset(), "OffsetSacl")?, "SACL")?
        } else {
            None
        };
        let dacl = if control & SE_DACL_PRESENT != 0 {
            read_acl(bytes, read_u32(bytes, sd_dacl_offset(), "OffsetDacl")?, "DACL")?
        } else {
            None
        };

        Ok(SecurityDescriptor {
            control,
            owner,
            group,
            sacl,
            dacl,
        })
    }

    /// Serializes the header followed by owner, group, SACL and DACL.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; SECURITY_DESCRIPTOR_RELATIVE_SIZE];
        out[0] = SECURITY_DESCRIPTOR_REVISION;
        write_u16(&mut out, sd_control_offset(), self.control | SE_SELF_RELATIVE);

        let parts: [(usize, Option<Vec<u8>>); 4] = [
            (sd_owner_offset(), self.owner.as_ref().map(Sid::to_bytes)),
            (sd_group_offset(), self.group.as_ref().map(Sid::to_bytes)),
            (sd_sacl_offset(), self.sacl.clone()),
            (sd_dacl_offset(), self.dacl.clone()),
        ];

        for (field, part) in parts.iter() {
            if let Some(part) = part {
                let offset = to_dword(out.len(), "descriptor offset")
                    .map_err(|_| Error::system("InitializeSecurityDescriptor", codes::ERROR_INVALID_SECURITY_DESCR))?;
                write_u32(&mut out, *field, offset);
                out.extend_from_slice(part);
            }
        }

        Ok(out)
    }

    /// The parts named by `info`, as a read with that information returns them.
    pub fn select(&self, info: SecurityInformation) -> SecurityDescriptor {
        let mut sd = SecurityDescriptor::new();

        if info & OWNER_SECURITY_INFORMATION != 0 {
            sd.owner = self.owner.clone();
            sd.control |= self.control & SE_OWNER_DEFAULTED;
        }
        if info & GROUP_SECURITY_INFORMATION != 0 {
            sd.group = self.group.clone();
            sd.control |= self.control & SE_GROUP_DEFAULTED;
        }
        if info & SACL_SECURITY_INFORMATION != 0 {
            sd.sacl = self.sacl.clone();
            sd.control |= self.control & SACL_CONTROL_BITS;
        }
        if info & DACL_SECURITY_INFORMATION != 0 {
            sd.dacl = self.dacl.clone();
            sd.control |= self.control & DACL_CONTROL_BITS;
        }

        sd
    }

    /// Replaces the parts named by `info` with those of `update`.
    pub fn merge(&mut self, info: SecurityInformation, update: &SecurityDescriptor) {
        if info & OWNER_SECURITY_INFORMATION != 0 {
            self.owner = update.owner.clone();
            self.control = (self.control & !SE_OWNER_DEFAULTED) | (update.control & SE_OWNER_DEFAULTED);
        }
        if info & GROUP_SECURITY_INFORMATION != 0 {
            self.group = update.group.clone();
            self.control = (self.control & !SE_GROUP_DEFAULTED) | (update.control & SE_GROUP_DEFAULTED);
        }
        if info & SACL_SECURITY_INFORMATION != 0 {
            self.sacl = update.sacl.clone();
            self.control = (self.control & !SACL_CONTROL_BITS) | (update.control & SACL_CONTROL_BITS);
        }
        if info & DACL_SECURITY_INFORMATION != 0 {
            self.dacl = update.dacl.clone();
            self.control = (self.control & !DACL_CONTROL_BITS) | (update.control & DACL_CONTROL_BITS);
        }
    }
}

impl Default for SecurityDescriptor {
    fn default() -> Self {
        SecurityDescriptor::new()
    }
}

fn tail<'a>(bytes: &'a [u8], offset: u32, what: &str) -> Result<&'a [u8]> {
    bytes
        .get(offset as usize..)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| Error::encoding(format!("{} offset {} is outside the descriptor", what, offset)))
}

/// Copies out the ACL at `offset`; a zero offset is a null ACL.
fn read_acl(bytes: &[u8], offset: u32, what: &str) -> Result<Option<Vec<u8>>> {
    if offset == 0 {
        return Ok(None);
    }

    let view = AclView::parse(tail(bytes, offset, what)?)?;
    let start = offset as usize;
    Ok(Some(bytes[start..start + view.size()].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ace::{Ace, CONTAINER_INHERIT_ACE};
    use crate::acl::DEFAULT_ACL_CAPACITY;
    use crate::rights::READ;

    fn users_read_acl() -> Acl {
        let mut acl = Acl::new(DEFAULT_ACL_CAPACITY).unwrap();
        acl.append(&Ace::allow("S-1-5-32-545".parse().unwrap(), CONTAINER_INHERIT_ACE, READ))
            .unwrap();
        acl
    }

    #[test]
    fn minimal_descriptor_layout() {
        let acl = users_read_acl();
        let bytes = SecurityDescriptor::with_dacl(&acl).unwrap().to_bytes().unwrap();

        assert_eq!(bytes[0], 1);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), SE_DACL_PRESENT | SE_SELF_RELATIVE);
        assert_eq!(&bytes[4..16], &[0u8; 12]);
        assert_eq!(u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 20);
        assert_eq!(&bytes[20..], &acl.to_bytes().unwrap()[..]);
    }

    #[test]
    fn parse_reads_back_dacl() {
        let bytes = SecurityDescriptor::with_dacl(&users_read_acl()).unwrap().to_bytes().unwrap();
        let sd = SecurityDescriptor::parse(&bytes).unwrap();
        let dacl = sd.extract_dacl().unwrap();
        assert_eq!(dacl.ace_count(), 1);
        assert_eq!(dacl.get_ace(0).unwrap().mask().unwrap(), READ);
        assert!(sd.owner().is_none());
    }

    #[test]
    fn missing_and_null_dacl_are_distinct() {
        let absent = SecurityDescriptor::new();
        let parsed = SecurityDescriptor::parse(&absent.to_bytes().unwrap()).unwrap();
        assert!(matches!(parsed.extract_dacl(), Err(Error::NoDaclPresent)));

        let mut null = SecurityDescriptor::new();
        null.set_dacl(None);
        let parsed = SecurityDescriptor::parse(&null.to_bytes().unwrap()).unwrap();
        assert!(matches!(parsed.extract_dacl(), Err(Error::NullDacl)));
    }

    #[test]
    fn absolute_form_is_rejected() {
        let mut bytes = SecurityDescriptor::with_dacl(&users_read_acl()).unwrap().to_bytes().unwrap();
        write_u16(&mut bytes, 2, SE_DACL_PRESENT);
        assert!(matches!(SecurityDescriptor::parse(&bytes), Err(Error::Encoding(_))));
    }

    #[test]
    fn truncated_parts_are_rejected() {
        let bytes = SecurityDescriptor::with_dacl(&users_read_acl()).unwrap().to_bytes().unwrap();
        assert!(SecurityDescriptor::parse(&bytes[..19]).is_err());
        assert!(SecurityDescriptor::parse(&bytes[..30]).is_err());

        let mut bad_offset = bytes.clone();
        write_u32(&mut bad_offset, 16, 400);
        assert!(SecurityDescriptor::parse(&bad_offset).is_err());
    }

    #[test]
    fn owner_round_trips_and_selects() {
        let mut sd = SecurityDescriptor::with_dacl(&users_read_acl()).unwrap();
        sd.set_owner(Some("S-1-5-32-544".parse().unwrap()));
        let parsed = SecurityDescriptor::parse(&sd.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, sd);

        let owner_only = parsed.select(OWNER_SECURITY_INFORMATION);
        assert_eq!(owner_only.owner().unwrap().to_string(), "S-1-5-32-544");
        assert!(matches!(owner_only.extract_dacl(), Err(Error::NoDaclPresent)));

        let dacl_only = parsed.select(DACL_SECURITY_INFORMATION);
        assert!(dacl_only.owner().is_none());
        assert!(dacl_only.extract_dacl().is_ok());
    }

    #[test]
    fn merge_replaces_named_parts_only() {
        let mut stored = SecurityDescriptor::new();
        stored.set_owner(Some("S-1-5-18".parse().unwrap()));
        stored.set_dacl(None);

        let update = SecurityDescriptor::with_dacl(&users_read_acl()).unwrap();
        stored.merge(DACL_SECURITY_INFORMATION, &update);

        assert_eq!(stored.owner().unwrap().to_string(), "S-1-5-18");
        assert_eq!(stored.extract_dacl().unwrap().ace_count(), 1);
    }
}
