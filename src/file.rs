//! The file-level permissions API: grant a permission map to a file, read
//! it back, and describe masks.

use crate::ace::encode;
use crate::acl::{decode, entries, Acl, AceEntry, PermissionMap, DEFAULT_ACL_CAPACITY};
use crate::descriptor::{SecurityDescriptor, DACL_SECURITY_INFORMATION, OWNER_SECURITY_INFORMATION};
use crate::error::{codes, Error, Result};
use crate::identity::{resolve, resolve_name, AccountLookup};
use crate::rights::{labels, AccessMask};
use crate::store::{commit, fetch, SecurityStore, DEFAULT_DESCRIPTOR_LIMIT};
use log::debug;
use std::path::Path;

/// Tunables for building and fetching descriptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Bytes allocated for a new DACL, header included.
    pub acl_capacity: usize,
    /// Largest descriptor a read will grow its buffer to.
    pub descriptor_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            acl_capacity: DEFAULT_ACL_CAPACITY,
            descriptor_limit: DEFAULT_DESCRIPTOR_LIMIT,
        }
    }
}

impl Options {
    pub fn with_acl_capacity(mut self, acl_capacity: usize) -> Self {
        self.acl_capacity = acl_capacity;
        self
    }

    pub fn with_descriptor_limit(mut self, descriptor_limit: usize) -> Self {
        self.descriptor_limit = descriptor_limit;
        self
    }
}

/// Permissions of files reachable through `store`, with accounts resolved
/// through `accounts`.
pub struct FileSecurity<A, S> {
    accounts: A,
    store: S,
    options: Options,
}

#[cfg(windows)]
impl FileSecurity<crate::windows::NativeAccounts, crate::windows::NativeStore> {
    pub fn native() -> Self {
        FileSecurity::new(crate::windows::NativeAccounts, crate::windows::NativeStore)
    }
}

impl<A: AccountLookup, S: SecurityStore> FileSecurity<A, S> {
    pub fn new(accounts: A, store: S) -> Self {
        FileSecurity {
            accounts,
            store,
            options: Options::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn accounts(&self) -> &A {
        &self.accounts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ensure_exists(&self, path: &Path) -> Result<()> {
        if self.store.exists(path) {
            Ok(())
        } else {
            Err(Error::PathNotFound(path.to_path_buf()))
        }
    }

    /// Replaces the DACL of `path` with one granting each account its mask.
    ///
    /// Every account is resolved and the whole ACL built before anything is
    /// written, so a failure leaves the file untouched.
    pub fn set_permissions<P: AsRef<Path>>(&self, path: P, perms: &PermissionMap) -> Result<()> {
        let path = path.as_ref();
        self.ensure_exists(path)?;

        let mut acl = Acl::new(self.options.acl_capacity)?;
        for (account, &mask) in perms {
            let sid = resolve(&self.accounts, account)?;
            for ace in encode(&sid, mask)? {
                acl.append(&ace)?;
            }
        }

        debug!(
            "writing {} entries ({} bytes) for {} accounts to {}",
            acl.ace_count(),
            acl.size(),
            perms.len(),
            path.display()
        );

        let descriptor = SecurityDescriptor::with_dacl(&acl)?;
        commit(&self.store, path, DACL_SECURITY_INFORMATION, &descriptor)
    }

    /// The allow entries of `path`'s DACL keyed by account name. Names are
    /// looked up on `host`, or locally when `None`.
    pub fn get_permissions<P: AsRef<Path>>(&self, path: P, host: Option<&str>) -> Result<PermissionMap> {
        let path = path.as_ref();
        self.ensure_exists(path)?;

        let bytes = fetch(&self.store, path, DACL_SECURITY_INFORMATION, self.options.descriptor_limit)?;
        let descriptor = SecurityDescriptor::parse(&bytes)?;
        let dacl = descriptor.extract_dacl()?;
        decode(&self.accounts, &dacl, host)
    }

    /// Every DACL entry of `path`, for listing.
    pub fn entries<P: AsRef<Path>>(&self, path: P) -> Result<Vec<AceEntry>> {
        let path = path.as_ref();
        self.ensure_exists(path)?;

        let bytes = fetch(&self.store, path, DACL_SECURITY_INFORMATION, self.options.descriptor_limit)?;
        let descriptor = SecurityDescriptor::parse(&bytes)?;
        let dacl = descriptor.extract_dacl()?;
        Ok(entries(&self.accounts, &dacl, None))
    }

    /// The account that owns `path`.
    pub fn owner<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        self.ensure_exists(path)?;

        let bytes = fetch(&self.store, path, OWNER_SECURITY_INFORMATION, self.options.descriptor_limit)?;
        let descriptor = SecurityDescriptor::parse(&bytes)?;
        match descriptor.owner() {
            Some(sid) => resolve_name(&self.accounts, sid, None),
            None => Err(Error::system("GetSecurityInfo", codes::ERROR_INVALID_SID)),
        }
    }

    pub fn securities(&self, mask: AccessMask) -> Vec<&'static str> {
        labels(mask)
    }

    pub fn is_directory<P: AsRef<Path>>(&self, path: P) -> bool {
        self.store.is_directory(path.as_ref())
    }

    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.store.exists(path.as_ref())
    }
}
