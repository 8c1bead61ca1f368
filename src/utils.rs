#![allow(non_snake_case)]

//! Little-endian field access and `#[repr(C)]` mirrors of the platform
//! security structures, so layouts are computed the same way on every host.

use crate::error::{Error, Result};
use field_offset::*;
use std::convert::TryFrom;
use std::mem;

pub type BYTE = u8;
pub type WORD = u16;
pub type DWORD = u32;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AceHeader {
    pub AceType: BYTE,
    pub AceFlags: BYTE,
    pub AceSize: WORD,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessAllowedAce {
    pub Header: AceHeader,
    pub Mask: DWORD,
    pub SidStart: DWORD,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct AclHeader {
    pub AclRevision: BYTE,
    pub Sbz1: BYTE,
    pub AclSize: WORD,
    pub AceCount: WORD,
    pub Sbz2: WORD,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityDescriptorRelative {
    pub Revision: BYTE,
    pub Sbz1: BYTE,
    pub Control: WORD,
    pub Owner: DWORD,
    pub Group: DWORD,
    pub Sacl: DWORD,
    pub Dacl: DWORD,
}

/// Byte offset of the trailing SID inside an access-allowed entry.
pub fn sid_start_offset() -> usize {
    offset_of!(AccessAllowedAce => SidStart).get_byte_offset()
}

pub fn ace_mask_offset() -> usize {
    offset_of!(AccessAllowedAce => Mask).get_byte_offset()
}

pub fn ace_size_offset() -> usize {
    offset_of!(AceHeader => AceSize).get_byte_offset()
}

pub fn ace_flags_offset() -> usize {
    offset_of!(AceHeader => AceFlags).get_byte_offset()
}

pub fn acl_size_offset() -> usize {
    offset_of!(AclHeader => AclSize).get_byte_offset()
}

pub fn acl_count_offset() -> usize {
    offset_of!(AclHeader => AceCount).get_byte_offset()
}

pub fn sd_control_offset() -> usize {
    offset_of!(SecurityDescriptorRelative => Control).get_byte_offset()
}

pub fn sd_owner_offset() -> usize {
    offset_of!(SecurityDescriptorRelative => Owner).get_byte_offset()
}

pub fn sd_group_offset() -> usize {
    offset_of!(SecurityDescriptorRelative => Group).get_byte_offset()
}

pub fn sd_sacl_offset() -> usize {
    offset_of!(SecurityDescriptorRelative => Sacl).get_byte_offset()
}

pub fn sd_dacl_offset() -> usize {
    offset_of!(SecurityDescriptorRelative => Dacl).get_byte_offset()
}

pub const ACE_HEADER_SIZE: usize = mem::size_of::<AceHeader>();
pub const ACCESS_ALLOWED_ACE_SIZE: usize = mem::size_of::<AccessAllowedAce>();
pub const ACL_HEADER_SIZE: usize = mem::size_of::<AclHeader>();
pub const SECURITY_DESCRIPTOR_RELATIVE_SIZE: usize = mem::size_of::<SecurityDescriptorRelative>();

fn field<'a>(buf: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| buf.get(offset..end))
        .ok_or_else(|| {
            Error::encoding(format!(
                "{} at offset {} runs past the end of a {}-byte buffer",
                what,
                offset,
                buf.len()
            ))
        })
}

pub fn read_u8(buf: &[u8], offset: usize, what: &str) -> Result<u8> {
    Ok(field(buf, offset, 1, what)?[0])
}

pub fn read_u16(buf: &[u8], offset: usize, what: &str) -> Result<u16> {
    let raw = field(buf, offset, 2, what)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

pub fn read_u32(buf: &[u8], offset: usize, what: &str) -> Result<u32> {
    let raw = field(buf, offset, 4, what)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Narrows a length to a `WORD` field, naming the field on overflow.
pub fn to_word(len: usize, what: &str) -> Result<WORD> {
    WORD::try_from(len).map_err(|_| Error::encoding(format!("{} of {} does not fit in 16 bits", what, len)))
}

pub fn to_dword(len: usize, what: &str) -> Result<DWORD> {
    DWORD::try_from(len).map_err(|_| Error::encoding(format!("{} of {} does not fit in 32 bits", what, len)))
}
