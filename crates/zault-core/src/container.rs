//! Portable export/import container: a transitively-closed, deterministically
//! ordered bundle of blocks with a trailer hash committing to the whole file.

use std::fs;
use std::path::Path;

use crate::block::{Block, BlockKind, MetadataBody};
use crate::error::{Result, ZaultError};
use crate::primitives::{self, lengths};
use crate::store::BlockStore;

const MAGIC: &[u8; 8] = b"ZAULTBX1";

/// Compute the transitive closure of `hashes` (each metadata block pulls in
/// the content hashes it references), sorted lexicographically, and write
/// the container to `out_path`.
pub fn export(store: &BlockStore, hashes: &[[u8; lengths::HASH]], out_path: &Path) -> Result<()> {
    let mut closure: Vec<[u8; lengths::HASH]> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for hash in hashes {
        if seen.insert(*hash) {
            closure.push(*hash);
        }
        let block = store.get(hash)?;
        if block.kind == BlockKind::Metadata {
            let body = MetadataBody::decode(&block.body)?;
            for content_hash in body.content_hashes {
                if seen.insert(content_hash) {
                    closure.push(content_hash);
                }
            }
        }
    }

    closure.sort();

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(closure.len() as u32).to_le_bytes());
    for hash in &closure {
        let block = store.get(hash)?;
        let encoded = block.canonical_encode();
        out.extend_from_slice(hash);
        out.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        out.extend_from_slice(&encoded);
    }
    let trailer_hash = primitives::sha3_256(&out);
    out.extend_from_slice(&trailer_hash);

    crate::store::atomic_write(out_path, &out)?;
    Ok(())
}

/// Verify and atomically import every block of a container produced by
/// [`export`]. Fails closed: no block is persisted unless the trailer hash
/// checks out. Returns the number of blocks imported.
pub fn import(store: &BlockStore, in_path: &Path) -> Result<u32> {
    let raw = fs::read(in_path)?;
    if raw.len() < 8 + 4 + lengths::HASH {
        return Err(ZaultError::InvalidData("export container truncated".into()));
    }
    if &raw[..8] != MAGIC {
        return Err(ZaultError::InvalidData("bad export container magic".into()));
    }
    let (body, trailer) = raw.split_at(raw.len() - lengths::HASH);
    let expected_trailer = primitives::sha3_256(body);
    if trailer != expected_trailer {
        return Err(ZaultError::InvalidData("export container trailer hash mismatch".into()));
    }

    let block_count = u32::from_le_bytes(body[8..12].try_into().unwrap()) as usize;
    let mut pos = 12;
    let mut entries = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        if body.len() < pos + lengths::HASH + 4 {
            return Err(ZaultError::InvalidData("export container record truncated".into()));
        }
        let mut hash = [0u8; lengths::HASH];
        hash.copy_from_slice(&body[pos..pos + lengths::HASH]);
        pos += lengths::HASH;
        let encoded_len = u32::from_le_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if body.len() < pos + encoded_len {
            return Err(ZaultError::InvalidData("export container record body truncated".into()));
        }
        let encoded = &body[pos..pos + encoded_len];
        pos += encoded_len;

        let computed = primitives::sha3_256(encoded);
        if computed != hash {
            return Err(ZaultError::InvalidData("export container entry does not hash to its declared address".into()));
        }
        let block = Block::canonical_decode(encoded)?;
        entries.push((hash, block));
    }
    if pos != body.len() {
        return Err(ZaultError::InvalidData("export container has trailing bytes before trailer".into()));
    }

    let mut imported = 0u32;
    for (hash, block) in &entries {
        let stored_hash = store.put(block)?;
        debug_assert_eq!(&stored_hash, hash);
        imported += 1;
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::mldsa_keygen_from_seed;

    #[test]
    fn export_then_import_round_trip() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = BlockStore::open(src_dir.path()).unwrap();
        let kp = mldsa_keygen_from_seed(&[1u8; 32]);

        let content_block = Block::sign(BlockKind::Content, b"chunk".to_vec(), kp.pk, &kp.sk).unwrap();
        let content_hash = src.put(&content_block).unwrap();

        let body = MetadataBody {
            file_name: "x.bin".into(),
            plaintext_size: 5,
            wrapped_key: vec![0u8; 12 + 16 + 32],
            content_hashes: vec![content_hash],
            created_at: 1_700_000_000,
        };
        let metadata_block = Block::sign(BlockKind::Metadata, body.encode().unwrap(), kp.pk, &kp.sk).unwrap();
        let meta_hash = src.put(&metadata_block).unwrap();

        let export_path = src_dir.path().join("export.zaultbx");
        export(&src, &[meta_hash], &export_path).unwrap();

        let dst_dir = tempfile::tempdir().unwrap();
        let dst = BlockStore::open(dst_dir.path()).unwrap();
        let count = import(&dst, &export_path).unwrap();
        assert_eq!(count, 2);
        assert!(dst.has(&meta_hash));
        assert!(dst.has(&content_hash));
    }

    #[test]
    fn import_rejects_tampered_trailer() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = BlockStore::open(src_dir.path()).unwrap();
        let kp = mldsa_keygen_from_seed(&[2u8; 32]);
        let block = Block::sign(BlockKind::Content, b"data".to_vec(), kp.pk, &kp.sk).unwrap();
        let hash = src.put(&block).unwrap();

        let export_path = src_dir.path().join("export.zaultbx");
        export(&src, &[hash], &export_path).unwrap();

        let mut bytes = fs::read(&export_path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&export_path, &bytes).unwrap();

        let dst_dir = tempfile::tempdir().unwrap();
        let dst = BlockStore::open(dst_dir.path()).unwrap();
        assert!(import(&dst, &export_path).is_err());
    }
}
