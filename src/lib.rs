//! `file-acl` grants and inspects file permissions expressed as a map from
//! account name to access mask, and converts that map to and from Windows
//! security descriptors.
//!
//! The byte-level codec works on every host. Account resolution and
//! descriptor storage go through the [`AccountLookup`] and [`SecurityStore`]
//! traits; the native Win32 backends live in [`windows`], and
//! [`AccountTable`] and [`MemoryStore`] serve everywhere else.
//!
//! ```
//! use file_acl::{rights, AccountTable, FileSecurity, MemoryStore, PermissionMap, SecurityDescriptor};
//!
//! let store = MemoryStore::new();
//! store.create_file("report.txt", &SecurityDescriptor::new()).unwrap();
//!
//! let files = FileSecurity::new(AccountTable::new(), store);
//! let mut perms = PermissionMap::new();
//! perms.insert("BUILTIN\\Users".to_string(), rights::READ);
//! files.set_permissions("report.txt", &perms).unwrap();
//!
//! assert_eq!(files.get_permissions("report.txt", None).unwrap(), perms);
//! assert_eq!(files.securities(rights::READ), vec!["READ"]);
//! ```

pub mod ace;
pub mod acl;
pub mod descriptor;
pub mod error;
pub mod file;
pub mod identity;
pub mod rights;
pub mod sid;
pub mod store;
pub mod utils;

#[cfg(windows)]
pub mod windows;

pub use crate::acl::{AceEntry, PermissionMap};
pub use crate::descriptor::SecurityDescriptor;
pub use crate::error::{Error, Result};
pub use crate::file::{FileSecurity, Options};
pub use crate::identity::{AccountLookup, AccountName, AccountTable};
pub use crate::rights::AccessMask;
pub use crate::sid::Sid;
pub use crate::store::{MemoryStore, Probe, SecurityStore};
