//! Canonical block encoding: the deterministic byte layout every block hash
//! is computed over, plus the signature check every decode performs.

use crate::error::{Result, ZaultError};
use crate::primitives::{self, lengths};

/// The two kinds of persisted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    Content = 0,
    Metadata = 1,
}

impl BlockKind {
    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(BlockKind::Content),
            1 => Ok(BlockKind::Metadata),
            other => Err(ZaultError::InvalidData(format!("unknown block kind tag {other}"))),
        }
    }
}

/// A decoded, signature-verified block.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub body: Vec<u8>,
    pub signer_pk: [u8; lengths::MLDSA65_PK],
    pub signature: [u8; lengths::MLDSA65_SIG],
}

impl Block {
    /// Build and sign a new block over `kind ‖ body ‖ signer_pk`.
    pub fn sign(kind: BlockKind, body: Vec<u8>, signer_pk: [u8; lengths::MLDSA65_PK], signer_sk: &[u8; lengths::MLDSA65_SK]) -> Result<Self> {
        let msg = Self::signed_message(kind, &body, &signer_pk);
        let signature = primitives::mldsa_sign(signer_sk, &msg)?;
        Ok(Block { kind, body, signer_pk, signature })
    }

    fn signed_message(kind: BlockKind, body: &[u8], signer_pk: &[u8; lengths::MLDSA65_PK]) -> Vec<u8> {
        let mut msg = Vec::with_capacity(1 + body.len() + signer_pk.len());
        msg.push(kind as u8);
        msg.extend_from_slice(body);
        msg.extend_from_slice(signer_pk);
        msg
    }

    /// `kind(1) ‖ body_len(u32 LE) ‖ body ‖ signer_pk(1952) ‖ signature(3309)`.
    pub fn canonical_encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + self.body.len() + lengths::MLDSA65_PK + lengths::MLDSA65_SIG);
        out.push(self.kind as u8);
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&self.signer_pk);
        out.extend_from_slice(&self.signature);
        out
    }

    /// Decode and verify a signature over the canonical encoding. Does not
    /// recompute the address; callers compare against an expected hash
    /// separately (the store does this at `get` time).
    pub fn canonical_decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 1 + 4 {
            return Err(ZaultError::InvalidData("block truncated before header".into()));
        }
        let kind = BlockKind::from_tag(bytes[0])?;
        let body_len = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
        let rest = &bytes[5..];
        if rest.len() < body_len + lengths::MLDSA65_PK + lengths::MLDSA65_SIG {
            return Err(ZaultError::InvalidData("block truncated: body/pk/sig".into()));
        }
        if rest.len() != body_len + lengths::MLDSA65_PK + lengths::MLDSA65_SIG {
            return Err(ZaultError::InvalidData("block has trailing bytes".into()));
        }
        let body = rest[..body_len].to_vec();
        let mut signer_pk = [0u8; lengths::MLDSA65_PK];
        signer_pk.copy_from_slice(&rest[body_len..body_len + lengths::MLDSA65_PK]);
        let mut signature = [0u8; lengths::MLDSA65_SIG];
        signature.copy_from_slice(&rest[body_len + lengths::MLDSA65_PK..]);

        let msg = Self::signed_message(kind, &body, &signer_pk);
        if !primitives::mldsa_verify(&signer_pk, &msg, &signature) {
            return Err(ZaultError::AuthFailed);
        }

        Ok(Block { kind, body, signer_pk, signature })
    }

    /// The block's content address: SHA3-256 of its canonical encoding.
    pub fn hash(&self) -> [u8; lengths::HASH] {
        primitives::sha3_256(&self.canonical_encode())
    }
}

/// Decoded form of a `MetadataBlock.body`, per spec §3.
#[derive(Debug, Clone)]
pub struct MetadataBody {
    pub file_name: String,
    pub plaintext_size: u64,
    pub wrapped_key: Vec<u8>,
    pub content_hashes: Vec<[u8; lengths::HASH]>,
    pub created_at: i64,
}

const WRAPPED_KEY_LEN: usize = lengths::CHACHA_NONCE + lengths::CHACHA_TAG + lengths::CHACHA_KEY;

impl MetadataBody {
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.file_name.len() > 4096 {
            return Err(ZaultError::InvalidArg("file name exceeds 4096 bytes".into()));
        }
        if self.wrapped_key.len() != WRAPPED_KEY_LEN {
            return Err(ZaultError::InvalidArg("wrapped key has wrong length".into()));
        }
        let name_bytes = self.file_name.as_bytes();
        let mut out = Vec::new();
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&self.plaintext_size.to_le_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&(self.content_hashes.len() as u32).to_le_bytes());
        for h in &self.content_hashes {
            out.extend_from_slice(h);
        }
        out.extend_from_slice(&self.created_at.to_le_bytes());
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        macro_rules! take {
            ($n:expr) => {{
                if bytes.len() < pos + $n {
                    return Err(ZaultError::InvalidData("metadata body truncated".into()));
                }
                let slice = &bytes[pos..pos + $n];
                pos += $n;
                slice
            }};
        }
        let name_len = u32::from_le_bytes(take!(4).try_into().unwrap()) as usize;
        if name_len > 4096 {
            return Err(ZaultError::InvalidData("file name length exceeds 4096 bytes".into()));
        }
        let name_bytes = take!(name_len);
        let file_name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| ZaultError::InvalidData("file name is not valid utf-8".into()))?;
        let plaintext_size = u64::from_le_bytes(take!(8).try_into().unwrap());
        let wrapped_key = take!(WRAPPED_KEY_LEN).to_vec();
        let chunk_count = u32::from_le_bytes(take!(4).try_into().unwrap()) as usize;
        let mut content_hashes = Vec::with_capacity(chunk_count);
        for _ in 0..chunk_count {
            let mut h = [0u8; lengths::HASH];
            h.copy_from_slice(take!(lengths::HASH));
            content_hashes.push(h);
        }
        let created_at = i64::from_le_bytes(take!(8).try_into().unwrap());
        if pos != bytes.len() {
            return Err(ZaultError::InvalidData("metadata body has trailing bytes".into()));
        }
        Ok(MetadataBody { file_name, plaintext_size, wrapped_key, content_hashes, created_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::mldsa_keygen_from_seed;

    #[test]
    fn encode_decode_round_trip() {
        let kp = mldsa_keygen_from_seed(&[1u8; 32]);
        let body = b"some content ciphertext".to_vec();
        let block = Block::sign(BlockKind::Content, body.clone(), kp.pk, &kp.sk).unwrap();
        let encoded = block.canonical_encode();
        let decoded = Block::canonical_decode(&encoded).unwrap();
        assert_eq!(decoded.body, body);
        assert_eq!(decoded.kind, BlockKind::Content);
        assert_eq!(decoded.canonical_encode(), encoded);
    }

    #[test]
    fn tamper_byte_breaks_signature() {
        let kp = mldsa_keygen_from_seed(&[2u8; 32]);
        let block = Block::sign(BlockKind::Content, b"data".to_vec(), kp.pk, &kp.sk).unwrap();
        let mut encoded = block.canonical_encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;
        assert!(Block::canonical_decode(&encoded).is_err());
    }

    #[test]
    fn metadata_body_round_trip() {
        let body = MetadataBody {
            file_name: "report.pdf".into(),
            plaintext_size: 12345,
            wrapped_key: vec![0u8; WRAPPED_KEY_LEN],
            content_hashes: vec![[7u8; 32], [8u8; 32]],
            created_at: 1_700_000_000,
        };
        let encoded = body.encode().unwrap();
        let decoded = MetadataBody::decode(&encoded).unwrap();
        assert_eq!(decoded.file_name, body.file_name);
        assert_eq!(decoded.plaintext_size, body.plaintext_size);
        assert_eq!(decoded.content_hashes, body.content_hashes);
        assert_eq!(decoded.created_at, body.created_at);
    }

    #[test]
    fn hash_stable_across_decode_reencode() {
        let kp = mldsa_keygen_from_seed(&[3u8; 32]);
        let block = Block::sign(BlockKind::Metadata, b"body".to_vec(), kp.pk, &kp.sk).unwrap();
        let h1 = block.hash();
        let decoded = Block::canonical_decode(&block.canonical_encode()).unwrap();
        let h2 = primitives::sha3_256(&decoded.canonical_encode());
        assert_eq!(h1, h2);
    }
}
