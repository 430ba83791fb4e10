//! Composes identity, block store, and advisory lock into the public vault
//! handle; owns master-key derivation and exposes the file/share/export
//! operations.

use std::fs;
use std::path::{Path, PathBuf};

use zeroize::Zeroize;

use crate::error::Result;
use crate::lock::VaultLock;
use crate::primitives::{self, lengths};
use crate::{container, file_protocol, identity::Identity, share, store::BlockStore};

const MASTER_KEY_DOMAIN: &[u8] = b"zault-master";

/// A single vault directory: `path/.lock`, `path/identity`, `path/blocks/`,
/// `path/redeemed/` (see `share` module docs for the last one).
pub struct Vault {
    path: PathBuf,
    identity: Identity,
    master_key: [u8; lengths::CHACHA_KEY],
    store: BlockStore,
    _lock: VaultLock,
}

fn derive_master_key(mlkem_sk: &[u8; lengths::MLKEM768_SK]) -> [u8; lengths::CHACHA_KEY] {
    let mut input = Vec::with_capacity(MASTER_KEY_DOMAIN.len() + mlkem_sk.len());
    input.extend_from_slice(MASTER_KEY_DOMAIN);
    input.extend_from_slice(mlkem_sk);
    let digest = primitives::sha3_256(&input);
    input.zeroize();
    digest
}

impl Vault {
    /// Open `path` as a vault, creating it (generating a fresh identity) if
    /// it does not already contain one. Acquires the advisory lock for the
    /// lifetime of the returned handle.
    pub fn init(path: impl Into<PathBuf>, passphrase: &[u8]) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        let lock = VaultLock::acquire(&path)?;

        let identity_path = path.join("identity");
        let identity = if identity_path.exists() {
            Identity::load(&identity_path, passphrase)?
        } else {
            let identity = Identity::generate();
            identity.save(&identity_path, passphrase)?;
            let _ = crate::security::set_secure_permissions(&identity_path);
            identity
        };

        let master_key = derive_master_key(&identity.mlkem_sk);
        let store = BlockStore::open(path.join("blocks"))?;
        fs::create_dir_all(path.join("redeemed"))?;

        let _ = crate::security::disable_core_dumps();

        Ok(Vault { path, identity, master_key, store, _lock: lock })
    }

    /// The vault's serialized public identity (3136 bytes).
    pub fn public_identity(&self) -> [u8; lengths::PUBLIC_IDENTITY] {
        self.identity.serialize_public()
    }

    /// The vault's ML-KEM-768 public key, for recipients of shares.
    pub fn kem_public_key(&self) -> [u8; lengths::MLKEM768_PK] {
        self.identity.mlkem_pk
    }

    fn redeemed_key_path(&self, file_hash: &[u8; lengths::HASH]) -> PathBuf {
        self.path.join("redeemed").join(hex::encode(file_hash))
    }

    /// Encrypt, chunk, and store a file; returns its metadata hash.
    pub fn add_file(&self, path: &Path) -> Result<[u8; lengths::HASH]> {
        file_protocol::add_file(&self.store, &self.identity.mldsa_pk, &self.identity.mldsa_sk, &self.master_key, path)
    }

    /// Decrypt and reassemble a file to `out_path`. If `hash` was redeemed
    /// from a share rather than added locally, the per-file key comes from
    /// this vault's redeemed-key index instead of the metadata block's own
    /// `wrapped_key` (see `share` module docs).
    pub fn get_file(&self, hash: &[u8; lengths::HASH], out_path: &Path) -> Result<()> {
        let redeemed_path = self.redeemed_key_path(hash);
        if redeemed_path.exists() {
            return self.get_file_with_redeemed_key(hash, &redeemed_path, out_path);
        }
        file_protocol::get_file(&self.store, &self.master_key, hash, out_path)
    }

    fn get_file_with_redeemed_key(&self, hash: &[u8; lengths::HASH], redeemed_path: &Path, out_path: &Path) -> Result<()> {
        use crate::block::{BlockKind, MetadataBody};

        let rewrapped = fs::read(redeemed_path)?;
        let mut per_file_key_vec = primitives::chacha_open(&self.master_key, &rewrapped)?;

        let metadata_block = self.store.get(hash)?;
        let body = MetadataBody::decode(&metadata_block.body)?;

        let mut per_file_key = [0u8; lengths::CHACHA_KEY];
        per_file_key.copy_from_slice(&per_file_key_vec);
        per_file_key_vec.zeroize();

        // Don't size the allocation from `plaintext_size`: see file_protocol.rs.
        let mut plaintext = Vec::new();
        for content_hash in &body.content_hashes {
            let content_block = self.store.get(content_hash)?;
            if content_block.kind != BlockKind::Content {
                per_file_key.zeroize();
                return Err(crate::error::ZaultError::InvalidData("expected a content block".into()));
            }
            let chunk = primitives::chacha_open(&per_file_key, &content_block.body)?;
            plaintext.extend_from_slice(&chunk);
        }
        per_file_key.zeroize();

        if plaintext.len() as u64 != body.plaintext_size {
            return Err(crate::error::ZaultError::InvalidData("reassembled length does not match plaintext_size".into()));
        }

        crate::store::atomic_write(out_path, &plaintext)?;
        Ok(())
    }

    /// Build a signed share token wrapping `file_hash`'s key under
    /// `recipient_kem_pk`, expiring at `expires_at` (Unix seconds).
    pub fn create_share(&self, file_hash: &[u8; lengths::HASH], recipient_kem_pk: &[u8; lengths::MLKEM768_PK], expires_at: i64) -> Result<Vec<u8>> {
        share::create_share(&self.store, &self.identity.mldsa_pk, &self.identity.mldsa_sk, &self.master_key, file_hash, recipient_kem_pk, expires_at)
    }

    /// Redeem a share token addressed to this vault's identity. Persists
    /// the re-wrapped per-file key to the redeemed-key index unless an
    /// entry for this file hash already exists. Returns the file hash.
    pub fn redeem_share(&self, token: &[u8]) -> Result<[u8; lengths::HASH]> {
        let redemption = share::redeem_share(&self.identity.mlkem_sk, &self.master_key, token)?;
        let redeemed_path = self.redeemed_key_path(&redemption.file_hash);
        if !redeemed_path.exists() {
            crate::store::atomic_write(&redeemed_path, &redemption.rewrapped_key)?;
        }
        Ok(redemption.file_hash)
    }

    /// Export the transitive closure of `hashes` to `out_path`.
    pub fn export_blocks(&self, hashes: &[[u8; lengths::HASH]], out_path: &Path) -> Result<()> {
        container::export(&self.store, hashes, out_path)
    }

    /// Import every block from a container written by [`Vault::export_blocks`].
    pub fn import_blocks(&self, in_path: &Path) -> Result<u32> {
        container::import(&self.store, in_path)
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}
