//! Post-quantum share tokens: a self-contained, signed, expiry-bound bundle
//! carrying a KEM-wrapped per-file key for one recipient.
//!
//! Redemption resolution (spec.md §9 open question): a metadata block is
//! immutable and signed by its original author, so a redeeming vault cannot
//! rewrite its `wrapped_key` field in place without invalidating the
//! author's signature or creating a new address. Instead this vault keeps a
//! small side index, `<vault>/redeemed/<hex(file_hash)>`, holding the
//! per-file key re-wrapped under the *redeeming* vault's own master key.
//! `file_protocol::get_file`'s caller (`vault::Vault`) checks this index
//! before falling back to the metadata block's own `wrapped_key`.

use std::time::{SystemTime, UNIX_EPOCH};

use zeroize::Zeroize;

use crate::block::{Block, BlockKind, MetadataBody};
use crate::error::{Result, ZaultError};
use crate::primitives::{self, lengths};
use crate::store::BlockStore;

pub const MAGIC: &[u8; 4] = b"ZST1";
const AEAD_NONCE_LEN: usize = lengths::CHACHA_NONCE;
const AEAD_TAG_LEN: usize = lengths::CHACHA_TAG;
const AEAD_CT_LEN: usize = lengths::CHACHA_KEY;
pub const WIRE_LEN: usize = 4
    + 8
    + lengths::HASH
    + lengths::MLKEM768_CT
    + AEAD_NONCE_LEN
    + AEAD_TAG_LEN
    + AEAD_CT_LEN
    + lengths::MLDSA65_PK
    + lengths::MLDSA65_SIG;

/// A decoded share token.
#[derive(Debug, Clone)]
pub struct ShareToken {
    pub expires_at: i64,
    pub file_hash: [u8; lengths::HASH],
    pub kem_ciphertext: [u8; lengths::MLKEM768_CT],
    pub aead_nonce: [u8; AEAD_NONCE_LEN],
    pub aead_tag: [u8; AEAD_TAG_LEN],
    pub aead_ct: [u8; AEAD_CT_LEN],
    pub signer_pk: [u8; lengths::MLDSA65_PK],
    pub signature: [u8; lengths::MLDSA65_SIG],
}

impl ShareToken {
    fn signed_preamble(
        expires_at: i64,
        file_hash: &[u8; lengths::HASH],
        kem_ciphertext: &[u8; lengths::MLKEM768_CT],
        aead_nonce: &[u8; AEAD_NONCE_LEN],
        aead_tag: &[u8; AEAD_TAG_LEN],
        aead_ct: &[u8; AEAD_CT_LEN],
    ) -> Vec<u8> {
        let mut msg = Vec::with_capacity(WIRE_LEN - lengths::MLDSA65_PK - lengths::MLDSA65_SIG);
        msg.extend_from_slice(MAGIC);
        msg.extend_from_slice(&expires_at.to_le_bytes());
        msg.extend_from_slice(file_hash);
        msg.extend_from_slice(kem_ciphertext);
        msg.extend_from_slice(aead_nonce);
        msg.extend_from_slice(aead_tag);
        msg.extend_from_slice(aead_ct);
        msg
    }

    /// `magic ‖ expires_at ‖ file_hash ‖ kem_ciphertext ‖ aead_nonce ‖
    /// aead_tag ‖ aead_ct ‖ signer_pk ‖ signature`, 6453 bytes total.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Self::signed_preamble(
            self.expires_at,
            &self.file_hash,
            &self.kem_ciphertext,
            &self.aead_nonce,
            &self.aead_tag,
            &self.aead_ct,
        );
        out.extend_from_slice(&self.signer_pk);
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != WIRE_LEN {
            return Err(ZaultError::InvalidData(format!("share token must be {WIRE_LEN} bytes, got {}", bytes.len())));
        }
        if &bytes[0..4] != MAGIC {
            return Err(ZaultError::InvalidData("bad share token magic".into()));
        }
        let mut pos = 4;
        let expires_at = i64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let mut file_hash = [0u8; lengths::HASH];
        file_hash.copy_from_slice(&bytes[pos..pos + lengths::HASH]);
        pos += lengths::HASH;
        let mut kem_ciphertext = [0u8; lengths::MLKEM768_CT];
        kem_ciphertext.copy_from_slice(&bytes[pos..pos + lengths::MLKEM768_CT]);
        pos += lengths::MLKEM768_CT;
        let mut aead_nonce = [0u8; AEAD_NONCE_LEN];
        aead_nonce.copy_from_slice(&bytes[pos..pos + AEAD_NONCE_LEN]);
        pos += AEAD_NONCE_LEN;
        let mut aead_tag = [0u8; AEAD_TAG_LEN];
        aead_tag.copy_from_slice(&bytes[pos..pos + AEAD_TAG_LEN]);
        pos += AEAD_TAG_LEN;
        let mut aead_ct = [0u8; AEAD_CT_LEN];
        aead_ct.copy_from_slice(&bytes[pos..pos + AEAD_CT_LEN]);
        pos += AEAD_CT_LEN;
        let mut signer_pk = [0u8; lengths::MLDSA65_PK];
        signer_pk.copy_from_slice(&bytes[pos..pos + lengths::MLDSA65_PK]);
        pos += lengths::MLDSA65_PK;
        let mut signature = [0u8; lengths::MLDSA65_SIG];
        signature.copy_from_slice(&bytes[pos..pos + lengths::MLDSA65_SIG]);

        Ok(ShareToken { expires_at, file_hash, kem_ciphertext, aead_nonce, aead_tag, aead_ct, signer_pk, signature })
    }
}

/// Build and sign a share token wrapping `file_hash`'s per-file key under
/// `recipient_kem_pk`, expiring at `expires_at` (Unix seconds).
pub fn create_share(
    store: &BlockStore,
    signer_pk: &[u8; lengths::MLDSA65_PK],
    signer_sk: &[u8; lengths::MLDSA65_SK],
    master_key: &[u8; lengths::CHACHA_KEY],
    file_hash: &[u8; lengths::HASH],
    recipient_kem_pk: &[u8; lengths::MLKEM768_PK],
    expires_at: i64,
) -> Result<Vec<u8>> {
    let metadata_block = store.get(file_hash)?;
    if metadata_block.kind != BlockKind::Metadata {
        return Err(ZaultError::InvalidArg("file_hash does not reference a metadata block".into()));
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

    let (kem_ciphertext, mut ss) = primitives::mlkem_encapsulate(recipient_kem_pk)?;

    let mut nonce = [0u8; lengths::CHACHA_NONCE];
    primitives::csprng(&mut nonce);
    let sealed = primitives::chacha_seal(&ss, &nonce, &per_file_key);
    per_file_key.zeroize();
    ss.zeroize();
    let sealed = sealed?;

    // `chacha_seal` returns nonce ‖ ct ‖ tag; the wire format orders the
    // AEAD fields nonce, tag, ct, so split and reorder here.
    let aead_nonce: [u8; AEAD_NONCE_LEN] = sealed[..AEAD_NONCE_LEN].try_into().unwrap();
    let ct_and_tag = &sealed[AEAD_NONCE_LEN..];
    let (ct, tag) = ct_and_tag.split_at(AEAD_CT_LEN);
    let aead_ct: [u8; AEAD_CT_LEN] = ct.try_into().unwrap();
    let aead_tag: [u8; AEAD_TAG_LEN] = tag.try_into().unwrap();

    let preamble = ShareToken::signed_preamble(expires_at, file_hash, &kem_ciphertext, &aead_nonce, &aead_tag, &aead_ct);
    let signature = primitives::mldsa_sign(signer_sk, &preamble)?;

    let token = ShareToken {
        expires_at,
        file_hash: *file_hash,
        kem_ciphertext,
        aead_nonce,
        aead_tag,
        aead_ct,
        signer_pk: *signer_pk,
        signature,
    };
    Ok(token.to_bytes())
}

/// Outcome of redeeming a share token: the file hash, and the per-file key
/// re-wrapped under the redeeming vault's own master key (for the caller to
/// persist into its redeemed-key index).
pub struct Redemption {
    pub file_hash: [u8; lengths::HASH],
    pub rewrapped_key: Vec<u8>,
}

/// Verify, check expiry, decapsulate, and unwrap a share token's per-file
/// key. Does not touch any store; the caller decides whether/where to
/// persist `rewrapped_key`.
pub fn redeem_share(mlkem_sk: &[u8; lengths::MLKEM768_SK], master_key: &[u8; lengths::CHACHA_KEY], token_bytes: &[u8]) -> Result<Redemption> {
    let token = ShareToken::from_bytes(token_bytes)?;

    let preamble = ShareToken::signed_preamble(
        token.expires_at,
        &token.file_hash,
        &token.kem_ciphertext,
        &token.aead_nonce,
        &token.aead_tag,
        &token.aead_ct,
    );
    if !primitives::mldsa_verify(&token.signer_pk, &preamble, &token.signature) {
        return Err(ZaultError::AuthFailed);
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    if now > token.expires_at {
        return Err(ZaultError::AuthFailed);
    }

    let mut ss = primitives::mlkem_decapsulate(mlkem_sk, &token.kem_ciphertext)?;

    // Recompose `nonce ‖ ct ‖ tag` from the wire's `nonce ‖ tag ‖ ct`
    // ordering for `chacha_open`.
    let mut wire = Vec::with_capacity(AEAD_NONCE_LEN + AEAD_CT_LEN + AEAD_TAG_LEN);
    wire.extend_from_slice(&token.aead_nonce);
    wire.extend_from_slice(&token.aead_ct);
    wire.extend_from_slice(&token.aead_tag);

    let mut per_file_key_vec = primitives::chacha_open(&ss, &wire)?;
    ss.zeroize();
    if per_file_key_vec.len() != lengths::CHACHA_KEY {
        per_file_key_vec.zeroize();
        return Err(ZaultError::InvalidData("redeemed per-file key has wrong length".into()));
    }

    let mut rewrap_nonce = [0u8; lengths::CHACHA_NONCE];
    primitives::csprng(&mut rewrap_nonce);
    let rewrapped_key = primitives::chacha_seal(master_key, &rewrap_nonce, &per_file_key_vec);
    per_file_key_vec.zeroize();

    Ok(Redemption { file_hash: token.file_hash, rewrapped_key: rewrapped_key? })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MetadataBody;
    use crate::identity::Identity;

    fn master_key_for(mlkem_sk: &[u8; lengths::MLKEM768_SK]) -> [u8; lengths::CHACHA_KEY] {
        let mut v = b"zault-master".to_vec();
        v.extend_from_slice(mlkem_sk);
        primitives::sha3_256(&v)
    }

    fn make_vault_with_file(seed: u8) -> (tempfile::TempDir, BlockStore, Identity, [u8; lengths::CHACHA_KEY], [u8; lengths::HASH]) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlockStore::open(dir.path().join("blocks")).unwrap();
        let identity = Identity::from_seed(&[seed; 32]);
        let master_key = master_key_for(&identity.mlkem_sk);

        let per_file_key = [7u8; lengths::CHACHA_KEY];
        let nonce = [1u8; lengths::CHACHA_NONCE];
        let ct = primitives::chacha_seal(&per_file_key, &nonce, b"plaintext chunk").unwrap();
        let content_block = Block::sign(BlockKind::Content, ct, identity.mldsa_pk, &identity.mldsa_sk).unwrap();
        let content_hash = store.put(&content_block).unwrap();

        let mut wrap_nonce = [0u8; lengths::CHACHA_NONCE];
        primitives::csprng(&mut wrap_nonce);
        let wrapped_key = primitives::chacha_seal(&master_key, &wrap_nonce, &per_file_key).unwrap();

        let body = MetadataBody {
            file_name: "f.txt".into(),
            plaintext_size: 15,
            wrapped_key,
            content_hashes: vec![content_hash],
            created_at: 1_700_000_000,
        };
        let metadata_block = Block::sign(BlockKind::Metadata, body.encode().unwrap(), identity.mldsa_pk, &identity.mldsa_sk).unwrap();
        let file_hash = store.put(&metadata_block).unwrap();

        (dir, store, identity, master_key, file_hash)
    }

    #[test]
    fn create_and_redeem_round_trip() {
        let (_dir, store, identity, master_key, file_hash) = make_vault_with_file(1);
        let recipient = Identity::from_seed(&[2u8; 32]);

        let expires_at = 4_000_000_000i64;
        let token = create_share(&store, &identity.mldsa_pk, &identity.mldsa_sk, &master_key, &file_hash, &recipient.mlkem_pk, expires_at).unwrap();
        assert_eq!(token.len(), WIRE_LEN);

        let recipient_master_key = master_key_for(&recipient.mlkem_sk);
        let redemption = redeem_share(&recipient.mlkem_sk, &recipient_master_key, &token).unwrap();
        assert_eq!(redemption.file_hash, file_hash);

        let recovered = primitives::chacha_open(&recipient_master_key, &redemption.rewrapped_key).unwrap();
        assert_eq!(recovered, vec![7u8; lengths::CHACHA_KEY]);
    }

    #[test]
    fn expired_token_is_rejected() {
        let (_dir, store, identity, master_key, file_hash) = make_vault_with_file(3);
        let recipient = Identity::from_seed(&[4u8; 32]);
        let token = create_share(&store, &identity.mldsa_pk, &identity.mldsa_sk, &master_key, &file_hash, &recipient.mlkem_pk, 1).unwrap();
        let recipient_master_key = master_key_for(&recipient.mlkem_sk);
        assert!(matches!(redeem_share(&recipient.mlkem_sk, &recipient_master_key, &token), Err(ZaultError::AuthFailed)));
    }

    #[test]
    fn tampered_token_fails_verification() {
        let (_dir, store, identity, master_key, file_hash) = make_vault_with_file(5);
        let recipient = Identity::from_seed(&[6u8; 32]);
        let mut token = create_share(&store, &identity.mldsa_pk, &identity.mldsa_sk, &master_key, &file_hash, &recipient.mlkem_pk, 4_000_000_000).unwrap();
        let last = token.len() - 1;
        token[last] ^= 0x01;
        let recipient_master_key = master_key_for(&recipient.mlkem_sk);
        assert!(matches!(redeem_share(&recipient.mlkem_sk, &recipient_master_key, &token), Err(ZaultError::AuthFailed)));
    }
}
