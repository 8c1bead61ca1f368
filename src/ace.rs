//! Access control entries: the binary record, a borrowed view over it, and
//! the encoder that turns one account's mask into allow entries.

use crate::error::{Error, Result};
use crate::rights::{split_generic, AccessMask};
use crate::sid::Sid;
use crate::utils::{
    ace_flags_offset, ace_mask_offset, ace_size_offset, read_u16, read_u32, sid_start_offset, to_word,
    write_u16, write_u32, ACCESS_ALLOWED_ACE_SIZE, ACE_HEADER_SIZE,
};
use log::debug;
use std::fmt;

/// Size of the fixed entry buffer allow entries are built in. Leaves room for
/// a SID of up to 50 bytes (10 sub-authorities).
pub const MAX_ACE_SIZE: usize = 62;

pub const OBJECT_INHERIT_ACE: u8 = 0x01;
pub const CONTAINER_INHERIT_ACE: u8 = 0x02;
pub const NO_PROPAGATE_INHERIT_ACE: u8 = 0x04;
pub const INHERIT_ONLY_ACE: u8 = 0x08;
pub const INHERITED_ACE: u8 = 0x10;
pub const SUCCESSFUL_ACCESS_ACE_FLAG: u8 = 0x40;
pub const FAILED_ACCESS_ACE_FLAG: u8 = 0x80;

const ACE_OBJECT_TYPE_PRESENT: u32 = 0x1;
const ACE_INHERITED_OBJECT_TYPE_PRESENT: u32 = 0x2;
const GUID_SIZE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AceType {
    Unknown(u8),
    AccessAllow,
    AccessAllowCallback,
    AccessAllowObject,
    AccessAllowCallbackObject,
    AccessDeny,
    AccessDenyCallback,
    AccessDenyObject,
    AccessDenyCallbackObject,
    SystemAudit,
    SystemAuditCallback,
    SystemAuditObject,
    SystemAuditCallbackObject,
    SystemMandatoryLabel,
    SystemResourceAttribute,
}

impl AceType {
    pub fn from_raw(raw: u8) -> AceType {
        match raw {
            0x00 => AceType::AccessAllow,
            0x01 => AceType::AccessDeny,
            0x02 => AceType::SystemAudit,
            0x05 => AceType::AccessAllowObject,
            0x06 => AceType::AccessDenyObject,
            0x07 => AceType::SystemAuditObject,
            0x09 => AceType::AccessAllowCallback,
            0x0A => AceType::AccessDenyCallback,
            0x0B => AceType::AccessAllowCallbackObject,
            0x0C => AceType::AccessDenyCallbackObject,
            0x0D => AceType::SystemAuditCallback,
            0x0F => AceType::SystemAuditCallbackObject,
            0x11 => AceType::SystemMandatoryLabel,
            0x12 => AceType::SystemResourceAttribute,
            other => AceType::Unknown(other),
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            AceType::AccessAllow => 0x00,
            AceType::AccessDeny => 0x01,
            AceType::SystemAudit => 0x02,
            AceType::AccessAllowObject => 0x05,
            AceType::AccessDenyObject => 0x06,
            AceType::SystemAuditObject => 0x07,
            AceType::AccessAllowCallback => 0x09,
            AceType::AccessDenyCallback => 0x0A,
            AceType::AccessAllowCallbackObject => 0x0B,
            AceType::AccessDenyCallbackObject => 0x0C,
            AceType::SystemAuditCallback => 0x0D,
            AceType::SystemAuditCallbackObject => 0x0F,
            AceType::SystemMandatoryLabel => 0x11,
            AceType::SystemResourceAttribute => 0x12,
            AceType::Unknown(raw) => raw,
        }
    }

    /// Object entries carry flags and up to two GUIDs between the mask and the SID.
    fn is_object(self) -> bool {
        match self {
            AceType::AccessAllowObject
            | AceType::AccessAllowCallbackObject
            | AceType::AccessDenyObject
            | AceType::AccessDenyCallbackObject
            | AceType::SystemAuditObject
            | AceType::SystemAuditCallbackObject => true,
            _ => false,
        }
    }
}

impl fmt::Display for AceType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entry_type = match *self {
            AceType::Unknown(_) => "Unknown",
            AceType::AccessAllow => "AccessAllow",
            AceType::AccessAllowCallback => "AccessAllowCallback",
            AceType::AccessAllowObject => "AccessAllowObject",
            AceType::AccessAllowCallbackObject => "AccessAllowCallbackObject",
            AceType::AccessDeny => "AccessDeny",
            AceType::AccessDenyCallback => "AccessDenyCallback",
            AceType::AccessDenyObject => "AccessDenyObject",
            AceType::AccessDenyCallbackObject => "AccessDenyCallbackObject",
            AceType::SystemAudit => "SystemAudit",
            AceType::SystemAuditCallback => "SystemAuditCallback",
            AceType::SystemAuditObject => "SystemAuditObject",
            AceType::SystemAuditCallbackObject => "SystemAuditCallbackObject",
            AceType::SystemMandatoryLabel => "SystemMandatoryLabel",
            AceType::SystemResourceAttribute => "SystemResourceAttribute",
        };
        write!(f, "{}", entry_type)
    }
}

/// Field accessors over one serialized entry.
#[derive(Clone, Copy, Debug)]
pub struct AceView<'a> {
    bytes: &'a [u8],
}

impl<'a> AceView<'a> {
    /// Wraps the entry at the front of `bytes`, trimmed to its declared size.
    pub fn new(bytes: &'a [u8]) -> Result<AceView<'a>> {
        if bytes.len() < ACE_HEADER_SIZE {
            return Err(Error::encoding("truncated ACE header"));
        }

        let size = read_u16(bytes, ace_size_offset(), "AceSize")? as usize;
        if size < ACE_HEADER_SIZE || size > bytes.len() {
            return Err(Error::encoding(format!(
                "AceSize {} does not fit the {} bytes available",
                size,
                bytes.len()
            )));
        }

        Ok(AceView { bytes: &bytes[..size] })
    }

    pub fn ace_type(&self) -> AceType {
        AceType::from_raw(self.bytes[0])
    }

    pub fn flags(&self) -> u8 {
        self.bytes[ace_flags_offset()]
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn mask(&self) -> Result<AccessMask> {
        read_u32(self.bytes, ace_mask_offset(), "ACE mask")
    }

    fn sid_offset(&self) -> Result<usize> {
        if !self.ace_type().is_object() {
            return Ok(sid_start_offset());
        }

        let object_flags = read_u32(self.bytes, sid_start_offset(), "ACE object flags")?;
        let mut offset = sid_start_offset() + 4;
        if object_flags & ACE_OBJECT_TYPE_PRESENT != 0 {
            offset += GUID_SIZE;
        }
        if object_flags & ACE_INHERITED_OBJECT_TYPE_PRESENT != 0 {
            offset += GUID_SIZE;
        }

        Ok(offset)
    }

    pub fn sid(&self) -> Result<Sid> {
        let offset = self.sid_offset()?;
        match self.bytes.get(offset..) {
            Some(tail) => Sid::parse(tail),
            None => Err(Error::encoding("ACE ends before its SID")),
        }
    }
}

/// A non-object entry: header, mask and trailing SID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ace {
    pub ace_type: AceType,
    pub flags: u8,
    pub mask: AccessMask,
    pub sid: Sid,
}

impl Ace {
    pub fn allow(sid: Sid, flags: u8, mask: AccessMask) -> Ace {
        Ace {
            ace_type: AceType::AccessAllow,
            flags,
            mask,
            sid,
        }
    }

    /// `AceSize`: the offset of `SidStart` plus the SID length.
    pub fn size(&self) -> usize {
        sid_start_offset() + self.sid.byte_len()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = self.size();
        let mut out = vec![0u8; sid_start_offset()];
        out[0] = self.ace_type.as_raw();
        out[ace_flags_offset()] = self.flags;
        write_u16(&mut out, ace_size_offset(), to_word(size, "AceSize")?);
        write_u32(&mut out, ace_mask_offset(), self.mask);
        self.sid.write_to(&mut out);
        debug_assert_eq!(out.len(), size);
        Ok(out)
    }

    pub fn parse(bytes: &[u8]) -> Result<Ace> {
        let view = AceView::new(bytes)?;
        if view.ace_type().is_object() {
            return Err(Error::encoding(format!("{} entries have no plain form", view.ace_type())));
        }

        // the SID must not spill past AceSize
        let sid = view.sid()?;
        if sid_start_offset() + sid.byte_len() > view.size() {
            return Err(Error::encoding("SID runs past AceSize"));
        }

        Ok(Ace {
            ace_type: view.ace_type(),
            flags: view.flags(),
            mask: view.mask()?,
            sid,
        })
    }
}

/// Builds the allow entries that grant `mask` to `sid`.
///
/// The generic part is granted to children only (`INHERIT_ONLY`), then a
/// container-inheritable entry carries the specific rights, or the generic
/// ones again when there are no specific rights. A zero mask grants nothing.
pub fn encode(sid: &Sid, mask: AccessMask) -> Result<Vec<Ace>> {
    if sid.byte_len() > MAX_ACE_SIZE - ACCESS_ALLOWED_ACE_SIZE {
        return Err(Error::encoding(format!(
            "a {}-byte SID does not fit a {}-byte entry",
            sid.byte_len(),
            MAX_ACE_SIZE
        )));
    }

    let (generic, specific) = split_generic(mask);
    let mut aces = Vec::with_capacity(2);

    if generic != 0 {
        aces.push(Ace::allow(
            sid.clone(),
            INHERIT_ONLY_ACE | OBJECT_INHERIT_ACE | CONTAINER_INHERIT_ACE,
            generic,
        ));
        let second = if specific != 0 { specific } else { generic };
        aces.push(Ace::allow(sid.clone(), CONTAINER_INHERIT_ACE, second));
    } else if specific != 0 {
        aces.push(Ace::allow(sid.clone(), CONTAINER_INHERIT_ACE, specific));
    }

    for ace in &aces {
        debug!("{} gets {:#010X} with flags {:#04X}", sid, ace.mask, ace.flags);
    }

    Ok(aces)
}
