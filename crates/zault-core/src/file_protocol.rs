//! Splits a file into encrypted content blocks plus one signed metadata
//! block, and reassembles a file from its metadata hash.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use zeroize::Zeroize;

use crate::block::{Block, BlockKind, MetadataBody};
use crate::error::{Result, ZaultError};
use crate::primitives::{self, lengths};
use crate::store::BlockStore;

const CHUNK_SIZE: usize = 1024 * 1024;

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn file_name_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ZaultError::InvalidArg("path has no valid file name".into()))?;
    if name.contains('/') || name.contains('\\') {
        return Err(ZaultError::InvalidArg("file name must not contain path separators".into()));
    }
    Ok(name.to_string())
}

/// Encrypt and store `path`'s contents, returning the new metadata block's
/// hash. On any failure after content blocks have been written, the blocks
/// written during *this* call are removed (best-effort); a block that
/// already existed before the call began is left untouched.
pub fn add_file(
    store: &BlockStore,
    signer_pk: &[u8; lengths::MLDSA65_PK],
    signer_sk: &[u8; lengths::MLDSA65_SK],
    master_key: &[u8; lengths::CHACHA_KEY],
    path: &Path,
) -> Result<[u8; lengths::HASH]> {
    let file_name = file_name_of(path)?;
    let plaintext = fs::read(path)?;

    let mut per_file_key = [0u8; lengths::CHACHA_KEY];
    primitives::csprng(&mut per_file_key);

    let mut content_hashes = Vec::new();
    let mut written_this_call = Vec::new();

    let result = (|| -> Result<()> {
        for chunk in plaintext.chunks(CHUNK_SIZE) {
            let mut nonce = [0u8; lengths::CHACHA_NONCE];
            primitives::csprng(&mut nonce);
            let ct = primitives::chacha_seal(&per_file_key, &nonce, chunk)?;
            let block = Block::sign(BlockKind::Content, ct, *signer_pk, signer_sk)?;
            let existed_before = store.has(&block.hash());
            let hash = store.put(&block)?;
            if !existed_before {
                written_this_call.push(hash);
            }
            content_hashes.push(hash);
        }
        Ok(())
    })();

    if let Err(e) = result {
        for hash in &written_this_call {
            let _ = store.remove(hash);
        }
        per_file_key.zeroize();
        return Err(e);
    }

    let mut wrap_nonce = [0u8; lengths::CHACHA_NONCE];
    primitives::csprng(&mut wrap_nonce);
    let wrapped_key_res = primitives::chacha_seal(master_key, &wrap_nonce, &per_file_key);
    let wrapped_key = match wrapped_key_res {
        Ok(w) => w,
        Err(e) => {
            for hash in &written_this_call {
                let _ = store.remove(hash);
            }
            per_file_key.zeroize();
            return Err(e);
        }
    };
    per_file_key.zeroize();

    let body = MetadataBody {
        file_name,
        plaintext_size: plaintext.len() as u64,
        wrapped_key,
        content_hashes,
        created_at: now_unix(),
    };
    let encoded_body = match body.encode() {
        Ok(b) => b,
        Err(e) => {
            for hash in &written_this_call {
                let _ = store.remove(hash);
            }
            return Err(e);
        }
    };

    let metadata_block = match Block::sign(BlockKind::Metadata, encoded_body, *signer_pk, signer_sk) {
        Ok(b) => b,
        Err(e) => {
            for hash in &written_this_call {
                let _ = store.remove(hash);
            }
            return Err(e);
        }
    };

    match store.put(&metadata_block) {
        Ok(hash) => Ok(hash),
        Err(e) => {
            for hash in &written_this_call {
                let _ = store.remove(hash);
            }
            Err(e)
        }
    }
}

/// Decrypt and reassemble the file referenced by the metadata block at
/// `hash`, writing it atomically to `out_path`. Never touches `out_path` on
/// failure.
pub fn get_file(store: &BlockStore, master_key: &[u8; lengths::CHACHA_KEY], hash: &[u8; lengths::HASH], out_path: &Path) -> Result<()> {
    let metadata_block = store.get(hash)?;
    if metadata_block.kind != BlockKind::Metadata {
        return Err(ZaultError::InvalidData("expected a metadata block".into()));
    }
    let body = MetadataBody::decode(&metadata_block.body)?;

    let mut per_file_key_vec = primitives::chacha_open(master_key, &body.wrapped_key)?;
    if per_file_key_vec.len() != lengths::CHACHA_KEY {
        per_file_key_vec.zeroize();
        return Err(ZaultError::InvalidData("unwrapped per-file key has wrong length".into()));
    }
    let mut per_file_key = [0u8; lengths::CHACHA_KEY];
    per_file_key.copy_from_slice(&per_file_key_vec);
    per_file_key_vec.zeroize();

    // Don't size the allocation from `plaintext_size`: it comes from the
    // metadata block's own signed body, which a peer can self-sign with any
    // value before export, so it must be treated as untrusted until the
    // reassembled length is checked below.
    let mut plaintext = Vec::new();
    for content_hash in &body.content_hashes {
        let content_block = store.get(content_hash)?;
        if content_block.kind != BlockKind::Content {
            per_file_key.zeroize();
            return Err(ZaultError::InvalidData("expected a content block".into()));
        }
        let chunk = primitives::chacha_open(&per_file_key, &content_block.body)?;
        plaintext.extend_from_slice(&chunk);
    }
    per_file_key.zeroize();

    if plaintext.len() as u64 != body.plaintext_size {
        return Err(ZaultError::InvalidData("reassembled length does not match plaintext_size".into()));
    }

    crate::store::atomic_write(out_path, &plaintext)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::mldsa_keygen_from_seed;

    fn setup() -> (tempfile::TempDir, BlockStore, crate::primitives::MldsaKeyPair, [u8; lengths::CHACHA_KEY]) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path().join("blocks")).unwrap();
        let kp = mldsa_keygen_from_seed(&[1u8; 32]);
        let mut master_key = [0u8; lengths::CHACHA_KEY];
        primitives::csprng(&mut master_key);
        (dir, store, kp, master_key)
    }

    #[test]
    fn round_trip_small_file() {
        let (dir, store, kp, master_key) = setup();
        let input_path = dir.path().join("hello.txt");
        fs::write(&input_path, b"hello world\n").unwrap();

        let hash = add_file(&store, &kp.pk, &kp.sk, &master_key, &input_path).unwrap();
        let out_path = dir.path().join("out.txt");
        get_file(&store, &master_key, &hash, &out_path).unwrap();

        assert_eq!(fs::read(&out_path).unwrap(), b"hello world\n");
    }

    #[test]
    fn round_trip_empty_file() {
        let (dir, store, kp, master_key) = setup();
        let input_path = dir.path().join("empty.bin");
        fs::write(&input_path, b"").unwrap();

        let hash = add_file(&store, &kp.pk, &kp.sk, &master_key, &input_path).unwrap();
        let out_path = dir.path().join("out.bin");
        get_file(&store, &master_key, &hash, &out_path).unwrap();

        assert_eq!(fs::read(&out_path).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn round_trip_multi_chunk_file() {
        let (dir, store, kp, master_key) = setup();
        let input_path = dir.path().join("big.bin");
        let data = vec![0xAAu8; 5 * CHUNK_SIZE];
        fs::write(&input_path, &data).unwrap();

        let hash = add_file(&store, &kp.pk, &kp.sk, &master_key, &input_path).unwrap();
        let metadata = store.get(&hash).unwrap();
        let body = MetadataBody::decode(&metadata.body).unwrap();
        assert_eq!(body.content_hashes.len(), 5);

        let out_path = dir.path().join("big_out.bin");
        get_file(&store, &master_key, &hash, &out_path).unwrap();
        assert_eq!(fs::read(&out_path).unwrap(), data);
    }

    #[test]
    fn stores_basename_not_full_path() {
        let (dir, store, kp, master_key) = setup();
        let nested = dir.path().join("a").join("b.txt");
        fs::create_dir_all(nested.parent().unwrap()).unwrap();
        fs::write(&nested, b"x").unwrap();
        let hash = add_file(&store, &kp.pk, &kp.sk, &master_key, &nested).unwrap();
        let metadata = store.get(&hash).unwrap();
        let body = MetadataBody::decode(&metadata.body).unwrap();
        assert_eq!(body.file_name, "b.txt");
    }
}
