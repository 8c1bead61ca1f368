//! Error kinds surfaced by every encode, decode and storage operation.

use std::path::PathBuf;
use thiserror::Error;

/// Platform error codes reported by the portable backends.
///
/// The values are the Win32 ones so that an error coming from
/// [`MemoryStore`](crate::store::MemoryStore) reads the same as one coming
/// from the native backend.
pub mod codes {
    pub const ERROR_FILE_NOT_FOUND: u32 = 2;
    pub const ERROR_ACCESS_DENIED: u32 = 5;
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
    pub const ERROR_NONE_MAPPED: u32 = 1332;
    pub const ERROR_INVALID_ACL: u32 = 1336;
    pub const ERROR_INVALID_SID: u32 = 1337;
    pub const ERROR_INVALID_SECURITY_DESCR: u32 = 1338;
    pub const ERROR_ALLOTTED_SPACE_EXCEEDED: u32 = 1344;
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The account name has no security identifier on the queried system.
    #[error("no security identifier found for account `{account}`")]
    IdentityNotFound { account: String },

    /// The descriptor carries no DACL at all (explicit deny-all).
    #[error("no DACL present: explicit deny all")]
    NoDaclPresent,

    /// The descriptor has the DACL-present bit set but a null DACL (implicit grant-all).
    #[error("DACL is NULL: implicit access grant")]
    NullDacl,

    /// A value does not fit its binary field, or a buffer is malformed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A native call failed.
    #[error("{operation} failed with error code {code}")]
    System { operation: &'static str, code: u32 },

    #[error("path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("unknown access right `{0}`")]
    UnknownRight(String),
}

impl Error {
    pub(crate) fn encoding<S: Into<String>>(msg: S) -> Self {
        Error::Encoding(msg.into())
    }

    pub(crate) fn system(operation: &'static str, code: u32) -> Self {
        Error::System { operation, code }
    }

    /// The platform error code, for `System` errors.
    pub fn code(&self) -> Option<u32> {
        match *self {
            Error::System { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
