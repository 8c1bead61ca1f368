//! The file-security service seam, the growable-buffer descriptor fetch, and
//! an in-memory store for hosts without a native one.

use crate::descriptor::{SecurityDescriptor, SecurityInformation};
use crate::error::{codes, Error, Result};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default upper bound on a fetched descriptor.
pub const DEFAULT_DESCRIPTOR_LIMIT: usize = 1 << 20;

/// Outcome of one descriptor read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    /// The descriptor was copied into the front of the buffer.
    Complete(usize),
    /// The buffer is too small; the descriptor needs this many bytes.
    Insufficient(usize),
}

/// Reads and writes file security descriptors by path.
///
/// Errors are platform error codes.
pub trait SecurityStore {
    fn get_file_security(
        &self,
        path: &Path,
        info: SecurityInformation,
        buf: &mut [u8],
    ) -> std::result::Result<Probe, u32>;

    fn set_file_security(
        &self,
        path: &Path,
        info: SecurityInformation,
        descriptor: &[u8],
    ) -> std::result::Result<(), u32>;

    fn exists(&self, path: &Path) -> bool;

    fn is_directory(&self, path: &Path) -> bool;
}

impl<'a, T: SecurityStore + ?Sized> SecurityStore for &'a T {
    fn get_file_security(
        &self,
        path: &Path,
        info: SecurityInformation,
        buf: &mut [u8],
    ) -> std::result::Result<Probe, u32> {
        (**self).get_file_security(path, info, buf)
    }

    fn set_file_security(
        &self,
        path: &Path,
        info: SecurityInformation,
        descriptor: &[u8],
    ) -> std::result::Result<(), u32> {
        (**self).set_file_security(path, info, descriptor)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        (**self).is_directory(path)
    }
}

/// Reads the descriptor parts named by `info`, growing the buffer to the
/// size the store asks for until the read succeeds.
pub fn fetch<S: SecurityStore + ?Sized>(
    store: &S,
    path: &Path,
    info: SecurityInformation,
    limit: usize,
) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();

    loop {
        match store.get_file_security(path, info, &mut buf) {
            Ok(Probe::Complete(len)) => {
                buf.truncate(len);
                return Ok(buf);
            }
            Ok(Probe::Insufficient(needed)) => {
                if needed > limit || needed <= buf.len() {
                    debug!(
                        "giving up on {}: store wants {} bytes, have {}, limit {}",
                        path.display(),
                        needed,
                        buf.len(),
                        limit
                    );
                    return Err(Error::system("GetFileSecurityW", codes::ERROR_INSUFFICIENT_BUFFER));
                }

                debug!("growing descriptor buffer for {} from {} to {} bytes", path.display(), buf.len(), needed);
                buf.resize(needed, 0);
            }
            Err(code) => return Err(Error::system("GetFileSecurityW", code)),
        }
    }
}

/// Writes `descriptor` with the parts named by `info`.
pub fn commit<S: SecurityStore + ?Sized>(
    store: &S,
    path: &Path,
    info: SecurityInformation,
    descriptor: &SecurityDescriptor,
) -> Result<()> {
    let bytes = descriptor.to_bytes()?;
    store
        .set_file_security(path, info, &bytes)
        .map_err(|code| Error::system("SetFileSecurityW", code))?;

    debug!("committed {}-byte descriptor to {}", bytes.len(), path.display());
    Ok(())
}

#[derive(Clone, Debug)]
struct StoredFile {
    descriptor: Vec<u8>,
    directory: bool,
}

/// A path-keyed map of descriptors standing in for a filesystem.
///
/// Reads return only the requested parts; writes replace only the
/// requested parts, as the native service does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, StoredFile>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn files(&self) -> MutexGuard<HashMap<PathBuf, StoredFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_file<P: Into<PathBuf>>(&self, path: P, descriptor: &SecurityDescriptor) -> Result<()> {
        self.insert_raw(path, descriptor.to_bytes()?, false);
        Ok(())
    }

    pub fn create_dir<P: Into<PathBuf>>(&self, path: P, descriptor: &SecurityDescriptor) -> Result<()> {
        self.insert_raw(path, descriptor.to_bytes()?, true);
        Ok(())
    }

    /// Stores `descriptor` verbatim, valid or not.
    pub fn insert_raw<P: Into<PathBuf>>(&self, path: P, descriptor: Vec<u8>, directory: bool) {
        self.files().insert(path.into(), StoredFile { descriptor, directory });
    }

    /// The stored bytes, exactly as last written.
    pub fn raw(&self, path: &Path) -> Option<Vec<u8>> {
        self.files().get(path).map(|f| f.descriptor.clone())
    }
}

impl SecurityStore for MemoryStore {
    fn get_file_security(
        &self,
        path: &Path,
        info: SecurityInformation,
        buf: &mut [u8],
    ) -> std::result::Result<Probe, u32> {
        let files = self.files();
        let stored = files.get(path).ok_or(codes::ERROR_FILE_NOT_FOUND)?;

        let bytes = match SecurityDescriptor::parse(&stored.descriptor) {
            Ok(sd) => sd
                .select(info)
                .to_bytes()
                .map_err(|_| codes::ERROR_INVALID_SECURITY_DESCR)?,
            // hand back what was stored so callers see the malformed buffer
            Err(_) => stored.descriptor.clone(),
        };

        if buf.len() < bytes.len() {
            return Ok(Probe::Insufficient(bytes.len()));
        }

        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(Probe::Complete(bytes.len()))
    }

    fn set_file_security(
        &self,
        path: &Path,
        info: SecurityInformation,
        descriptor: &[u8],
    ) -> std::result::Result<(), u32> {
        if info == 0 {
            return Err(codes::ERROR_INVALID_PARAMETER);
        }

        let update = SecurityDescriptor::parse(descriptor).map_err(|_| codes::ERROR_INVALID_SECURITY_DESCR)?;

        let mut files = self.files();
        let stored = files.get_mut(path).ok_or(codes::ERROR_FILE_NOT_FOUND)?;

        let mut current = SecurityDescriptor::parse(&stored.descriptor).unwrap_or_default();
        current.merge(info, &update);
        stored.descriptor = current
            .to_bytes()
            .map_err(|_| codes::ERROR_INVALID_SECURITY_DESCR)?;

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.files().get(path).map_or(false, |f| f.directory)
    }
}
