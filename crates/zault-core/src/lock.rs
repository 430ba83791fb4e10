//! Advisory exclusivity over a vault directory, held for the lifetime of a
//! `Vault` handle.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Result, ZaultError};

/// Holds `path/.lock` exclusively for as long as it is alive.
pub struct VaultLock {
    file: File,
}

impl VaultLock {
    /// Acquire the advisory lock at `path/.lock`, failing immediately if
    /// another handle already holds it rather than blocking.
    pub fn acquire(vault_path: &Path) -> Result<Self> {
        let lock_path = vault_path.join(".lock");
        let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
        file.try_lock_exclusive()
            .map_err(|_| ZaultError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, "vault is already locked by another process")))?;
        Ok(VaultLock { file })
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = VaultLock::acquire(dir.path()).unwrap();
        assert!(VaultLock::acquire(dir.path()).is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _first = VaultLock::acquire(dir.path()).unwrap();
        }
        let _second = VaultLock::acquire(dir.path()).unwrap();
    }
}
