#![allow(non_snake_case)]

//! Native backends over the Win32 account and file-security services.

use crate::descriptor::SecurityInformation;
use crate::error::codes;
use crate::identity::{AccountLookup, AccountName};
use crate::sid::Sid;
use crate::store::{Probe, SecurityStore};
use crate::utils::to_dword;
use std::path::Path;
use std::ptr::null;
use widestring::{U16CString, U16Str};
use winapi::shared::minwindef::DWORD;
use winapi::shared::ntdef::{LPCWSTR, NULL};
use winapi::shared::winerror::ERROR_INSUFFICIENT_BUFFER;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::securitybaseapi::{GetFileSecurityW, SetFileSecurityW};
use winapi::um::winbase::{LookupAccountNameW, LookupAccountSidW};
use winapi::um::winnt::{PSECURITY_DESCRIPTOR, PSID, SID_NAME_USE};

fn wide(s: &str) -> Result<U16CString, u32> {
    U16CString::from_str(s).map_err(|_| codes::ERROR_INVALID_PARAMETER)
}

fn wide_path(path: &Path) -> Result<U16CString, u32> {
    U16CString::from_os_str(path.as_os_str()).map_err(|_| codes::ERROR_INVALID_PARAMETER)
}

fn system_ptr(system: &Option<U16CString>) -> LPCWSTR {
    system.as_ref().map_or(null(), |s| s.as_ptr())
}

/// A zeroed buffer of at least `len` bytes with `DWORD` alignment.
fn aligned(len: usize) -> Vec<DWORD> {
    vec![0; (len + 3) / 4]
}

fn aligned_copy(bytes: &[u8]) -> Vec<DWORD> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            DWORD::from_ne_bytes(word)
        })
        .collect()
}

fn as_bytes(buf: &[DWORD]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, buf.len() * 4) }
}

/// `LookupAccountNameW` / `LookupAccountSidW`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeAccounts;

impl AccountLookup for NativeAccounts {
    fn lookup_account_name(&self, system: Option<&str>, account: &str) -> Result<Sid, u32> {
        let system = system.map(wide).transpose()?;
        let account = wide(account)?;

        let mut cb_sid: DWORD = 0;
        let mut cch_domain: DWORD = 0;
        let mut name_use: SID_NAME_USE = 0;

        // size probe
        if unsafe {
            LookupAccountNameW(
                system_ptr(&system),
                account.as_ptr(),
                NULL,
                &mut cb_sid,
                NULL as *mut u16,
                &mut cch_domain,
                &mut name_use,
            )
        } == 0
        {
            let code = unsafe { GetLastError() };
            if code != ERROR_INSUFFICIENT_BUFFER {
                return Err(code);
            }
        }

        let mut sid = aligned(cb_sid as usize);
        let mut domain: Vec<u16> = vec![0; cch_domain as usize + 1];

        if unsafe {
            LookupAccountNameW(
                system_ptr(&system),
                account.as_ptr(),
                sid.as_mut_ptr() as PSID,
                &mut cb_sid,
                domain.as_mut_ptr(),
                &mut cch_domain,
                &mut name_use,
            )
        } == 0
        {
            return Err(unsafe { GetLastError() });
        }

        Sid::parse(as_bytes(&sid)).map_err(|_| codes::ERROR_INVALID_SID)
    }

    fn lookup_account_sid(&self, system: Option<&str>, sid: &Sid) -> Result<AccountName, u32> {
        let system = system.map(wide).transpose()?;

        let mut sid_buf = aligned_copy(&sid.to_bytes());

        let mut cch_name: DWORD = 0;
        let mut cch_domain: DWORD = 0;
        let mut name_use: SID_NAME_USE = 0;

        if unsafe {
            LookupAccountSidW(
                system_ptr(&system),
                sid_buf.as_mut_ptr() as PSID,
                NULL as *mut u16,
                &mut cch_name,
                NULL as *mut u16,
                &mut cch_domain,
                &mut name_use,
            )
        } == 0
        {
            let code = unsafe { GetLastError() };
            if code != ERROR_INSUFFICIENT_BUFFER {
                return Err(code);
            }
        }

        let mut name: Vec<u16> = vec![0; cch_name as usize + 1];
        let mut domain: Vec<u16> = vec![0; cch_domain as usize + 1];

        if unsafe {
            LookupAccountSidW(
                system_ptr(&system),
                sid_buf.as_mut_ptr() as PSID,
                name.as_mut_ptr(),
                &mut cch_name,
                domain.as_mut_ptr(),
                &mut cch_domain,
                &mut name_use,
            )
        } == 0
        {
            return Err(unsafe { GetLastError() });
        }

        // on success the counts exclude the terminator
        let name = U16Str::from_slice(&name[..cch_name as usize]).to_string_lossy();
        let domain = U16Str::from_slice(&domain[..cch_domain as usize]).to_string_lossy();

        Ok(AccountName::new(domain, name))
    }
}

/// `GetFileSecurityW` / `SetFileSecurityW`. Every call is path-based, so no
/// handle outlives it.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeStore;

impl SecurityStore for NativeStore {
    fn get_file_security(&self, path: &Path, info: SecurityInformation, buf: &mut [u8]) -> Result<Probe, u32> {
        let path = wide_path(path)?;
        let mut sd = aligned(buf.len());
        let mut needed: DWORD = 0;
        let len = to_dword(buf.len(), "descriptor buffer").map_err(|_| codes::ERROR_INVALID_PARAMETER)?;

        let ok = unsafe {
            GetFileSecurityW(
                path.as_ptr(),
                info,
                if sd.is_empty() { NULL } else { sd.as_mut_ptr() as PSECURITY_DESCRIPTOR },
                len,
                &mut needed,
            )
        };

        if ok == 0 {
            let code = unsafe { GetLastError() };
            return if code == ERROR_INSUFFICIENT_BUFFER {
                Ok(Probe::Insufficient(needed as usize))
            } else {
                Err(code)
            };
        }

        let filled = buf.len();
        buf.copy_from_slice(&as_bytes(&sd)[..filled]);
        Ok(Probe::Complete(filled))
    }

    fn set_file_security(&self, path: &Path, info: SecurityInformation, descriptor: &[u8]) -> Result<(), u32> {
        let path = wide_path(path)?;
        let mut sd = aligned_copy(descriptor);

        if unsafe { SetFileSecurityW(path.as_ptr(), info, sd.as_mut_ptr() as PSECURITY_DESCRIPTOR) } == 0 {
            return Err(unsafe { GetLastError() });
        }

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }
}
