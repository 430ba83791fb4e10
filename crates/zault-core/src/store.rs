//! Content-addressed block store: a flat directory of files named by the
//! lowercase hex of their block hash.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::block::Block;
use crate::error::{Result, ZaultError};
use crate::primitives::{self, lengths};

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// `fsync`, then rename over any existing file.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| ZaultError::InvalidArg("path has no parent directory".into()))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ZaultError::Io(e.error))?;
    Ok(())
}

/// Directory-backed content-addressed store of signed blocks.
pub struct BlockStore {
    root: PathBuf,
}

fn hash_hex(hash: &[u8; lengths::HASH]) -> String {
    hex::encode(hash)
}

fn parse_hash_hex(s: &str) -> Option<[u8; lengths::HASH]> {
    let bytes = hex::decode(s).ok()?;
    if bytes.len() != lengths::HASH {
        return None;
    }
    let mut out = [0u8; lengths::HASH];
    out.copy_from_slice(&bytes);
    Some(out)
}

impl BlockStore {
    /// Open (creating if absent) a block store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(BlockStore { root })
    }

    fn path_for(&self, hash: &[u8; lengths::HASH]) -> PathBuf {
        self.root.join(hash_hex(hash))
    }

    /// Encode, hash, and atomically persist `block`. Returns its address.
    /// Writing an identical block at the same address is idempotent; a
    /// differing block at the same address is a collision and fails with
    /// `InvalidData`.
    pub fn put(&self, block: &Block) -> Result<[u8; lengths::HASH]> {
        let encoded = block.canonical_encode();
        let hash = primitives::sha3_256(&encoded);
        let path = self.path_for(&hash);

        if path.exists() {
            let existing = fs::read(&path)?;
            if existing == encoded {
                return Ok(hash);
            }
            return Err(ZaultError::InvalidData("block collision: existing bytes differ".into()));
        }

        atomic_write(&path, &encoded)?;
        Ok(hash)
    }

    /// Fetch and verify the block stored at `hash`.
    pub fn get(&self, hash: &[u8; lengths::HASH]) -> Result<Block> {
        let path = self.path_for(hash);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ZaultError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let computed = primitives::sha3_256(&raw);
        if &computed != hash {
            return Err(ZaultError::InvalidData("stored bytes do not hash to their filename".into()));
        }
        Block::canonical_decode(&raw)
    }

    /// Whether a block with this address is present.
    pub fn has(&self, hash: &[u8; lengths::HASH]) -> bool {
        self.path_for(hash).exists()
    }

    /// Remove a block file. Not part of the public content-addressed store
    /// contract (§4.4 exposes no deletion) — used only by `file_protocol`'s
    /// best-effort cleanup of blocks it wrote earlier in a failed call.
    pub(crate) fn remove(&self, hash: &[u8; lengths::HASH]) -> Result<()> {
        let path = self.path_for(hash);
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lazily, unorderedly enumerate every stored hash.
    pub fn iter(&self) -> Result<impl Iterator<Item = [u8; lengths::HASH]>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Some(hash) = parse_hash_hex(name) {
                    out.push(hash);
                }
            }
        }
        Ok(out.into_iter())
    }
}
