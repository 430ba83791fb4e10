//! Vault identity: the ML-DSA-65 / ML-KEM-768 keypair that signs every block
//! this vault produces and receives shares encapsulated to it.

use std::fs;
use std::path::Path;

use argon2::{Argon2, Params};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, ZaultError};
use crate::primitives::{self, lengths};

const IDENTITY_MAGIC: &[u8; 8] = b"ZAULTID1";
const SALT_LEN: usize = 16;
const SECRET_BUNDLE_LEN: usize = lengths::MLDSA65_SK + lengths::MLKEM768_SK;

/// A vault's post-quantum keypair. Secret key material is zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    #[zeroize(skip)]
    pub mldsa_pk: [u8; lengths::MLDSA65_PK],
    pub mldsa_sk: [u8; lengths::MLDSA65_SK],
    #[zeroize(skip)]
    pub mlkem_pk: [u8; lengths::MLKEM768_PK],
    pub mlkem_sk: [u8; lengths::MLKEM768_SK],
}

impl Identity {
    /// Generate a fresh identity from the system CSPRNG.
    pub fn generate() -> Self {
        let dsa = primitives::mldsa_keygen();
        let kem = primitives::mlkem_keygen();
        Identity { mldsa_pk: dsa.pk, mldsa_sk: dsa.sk, mlkem_pk: kem.pk, mlkem_sk: kem.sk }
    }

    /// Deterministically derive both keypairs from a 32-byte seed via
    /// domain-separated SHA3-256 expansion.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let mut dsa_input = Vec::with_capacity(12 + 32);
        dsa_input.extend_from_slice(b"zault-id-dsa");
        dsa_input.extend_from_slice(seed);
        let seed_dsa = primitives::sha3_256(&dsa_input);
        dsa_input.zeroize();

        let mut kem_input = Vec::with_capacity(12 + 32);
        kem_input.extend_from_slice(b"zault-id-kem");
        kem_input.extend_from_slice(seed);
        let seed_kem = primitives::sha3_256(&kem_input);
        kem_input.zeroize();

        let dsa = primitives::mldsa_keygen_from_seed(&seed_dsa);
        let kem = primitives::mlkem_keygen_from_seed(&seed_kem);
        Identity { mldsa_pk: dsa.pk, mldsa_sk: dsa.sk, mlkem_pk: kem.pk, mlkem_sk: kem.sk }
    }

    /// `mldsa_pk ‖ mlkem_pk`, 3136 bytes.
    pub fn serialize_public(&self) -> [u8; lengths::PUBLIC_IDENTITY] {
        let mut out = [0u8; lengths::PUBLIC_IDENTITY];
        out[..lengths::MLDSA65_PK].copy_from_slice(&self.mldsa_pk);
        out[lengths::MLDSA65_PK..].copy_from_slice(&self.mlkem_pk);
        out
    }

    /// Slice out the ML-DSA-65 public key from a serialized public identity.
    pub fn parse_mldsa_pk(serialized: &[u8]) -> Result<[u8; lengths::MLDSA65_PK]> {
        if serialized.len() != lengths::PUBLIC_IDENTITY {
            return Err(ZaultError::InvalidArg(format!(
                "serialized public identity must be {} bytes",
                lengths::PUBLIC_IDENTITY
            )));
        }
        let mut out = [0u8; lengths::MLDSA65_PK];
        out.copy_from_slice(&serialized[..lengths::MLDSA65_PK]);
        Ok(out)
    }

    /// Slice out the ML-KEM-768 public key from a serialized public identity.
    pub fn parse_mlkem_pk(serialized: &[u8]) -> Result<[u8; lengths::MLKEM768_PK]> {
        if serialized.len() != lengths::PUBLIC_IDENTITY {
            return Err(ZaultError::InvalidArg(format!(
                "serialized public identity must be {} bytes",
                lengths::PUBLIC_IDENTITY
            )));
        }
        let mut out = [0u8; lengths::MLKEM768_PK];
        out.copy_from_slice(&serialized[lengths::MLDSA65_PK..]);
        Ok(out)
    }

    fn derive_file_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<[u8; lengths::CHACHA_KEY]> {
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            Params::new(19456, 2, 1, Some(lengths::CHACHA_KEY)).map_err(|e| ZaultError::Crypto(e.to_string()))?,
        );
        let mut key = [0u8; lengths::CHACHA_KEY];
        argon2
            .hash_password_into(passphrase, salt, &mut key)
            .map_err(|e| ZaultError::Crypto(e.to_string()))?;
        Ok(key)
    }

    /// Persist the identity at `path`, authenticated-encrypting the secret
    /// bundle under a key derived from `passphrase` (empty slice by default
    /// policy; see `SPEC_FULL.md` §3).
    pub fn save(&self, path: &Path, passphrase: &[u8]) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        primitives::csprng(&mut salt);
        let file_key = Self::derive_file_key(passphrase, &salt)?;

        let mut bundle = Vec::with_capacity(SECRET_BUNDLE_LEN);
        bundle.extend_from_slice(&self.mldsa_sk);
        bundle.extend_from_slice(&self.mlkem_sk);

        let mut nonce = [0u8; lengths::CHACHA_NONCE];
        primitives::csprng(&mut nonce);
        let wire = primitives::chacha_seal(&file_key, &nonce, &bundle)?;
        bundle.zeroize();

        let mut out = Vec::with_capacity(8 + SALT_LEN + wire.len());
        out.extend_from_slice(IDENTITY_MAGIC);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&wire);

        crate::store::atomic_write(path, &out)?;
        Ok(())
    }

    /// Load and decrypt an identity previously written by [`Identity::save`].
    pub fn load(path: &Path, passphrase: &[u8]) -> Result<Self> {
        let raw = fs::read(path)?;
        if raw.len() < 8 + SALT_LEN {
            return Err(ZaultError::InvalidData("identity file truncated".into()));
        }
        if &raw[..8] != IDENTITY_MAGIC {
            return Err(ZaultError::InvalidData("bad identity file magic".into()));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[8..8 + SALT_LEN]);
        let wire = &raw[8 + SALT_LEN..];

        let file_key = Self::derive_file_key(passphrase, &salt)?;
        let mut bundle = primitives::chacha_open(&file_key, wire)?;
        if bundle.len() != SECRET_BUNDLE_LEN {
            bundle.zeroize();
            return Err(ZaultError::InvalidData("identity secret bundle has wrong length".into()));
        }

        let mut mldsa_sk = [0u8; lengths::MLDSA65_SK];
        mldsa_sk.copy_from_slice(&bundle[..lengths::MLDSA65_SK]);
        let mut mlkem_sk = [0u8; lengths::MLKEM768_SK];
        mlkem_sk.copy_from_slice(&bundle[lengths::MLDSA65_SK..]);
        bundle.zeroize();

        let mldsa_pk = Self::derive_mldsa_pk(&mldsa_sk)?;
        let mlkem_pk = Self::derive_mlkem_pk(&mlkem_sk)?;

        Ok(Identity { mldsa_pk, mldsa_sk, mlkem_pk, mlkem_sk })
    }

    fn derive_mldsa_pk(sk: &[u8; lengths::MLDSA65_SK]) -> Result<[u8; lengths::MLDSA65_PK]> {
        use ml_dsa::{MlDsa65, SigningKey};
        let sk_encoded =
            hybrid_array::Array::try_from(&sk[..]).map_err(|_| ZaultError::InvalidData("mldsa sk length".into()))?;
        let signing_key = SigningKey::<MlDsa65>::decode(&sk_encoded);
        let vk_encoded = signing_key.verifying_key().encode();
        let mut out = [0u8; lengths::MLDSA65_PK];
        out.copy_from_slice(vk_encoded.as_slice());
        Ok(out)
    }

    fn derive_mlkem_pk(sk: &[u8; lengths::MLKEM768_SK]) -> Result<[u8; lengths::MLKEM768_PK]> {
        use ml_kem::{EncodedSizeUser, KemCore, MlKem768};
        let dk_encoded = ml_kem::Encoded::<<MlKem768 as KemCore>::DecapsulationKey>::try_from(&sk[..])
            .map_err(|_| ZaultError::InvalidData("mlkem sk length".into()))?;
        let dk = <MlKem768 as KemCore>::DecapsulationKey::from_bytes(&dk_encoded);
        let ek = dk.encapsulation_key();
        let mut out = [0u8; lengths::MLKEM768_PK];
        out.copy_from_slice(ek.as_bytes().as_slice());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_seed_is_deterministic() {
        let a = Identity::from_seed(&[0u8; 32]);
        let b = Identity::from_seed(&[0u8; 32]);
        assert_eq!(a.serialize_public(), b.serialize_public());
        assert_eq!(a.mldsa_sk, b.mldsa_sk);
        assert_eq!(a.mlkem_sk, b.mlkem_sk);
    }

    #[test]
    fn serialize_public_parses_back() {
        let id = Identity::from_seed(&[9u8; 32]);
        let serialized = id.serialize_public();
        assert_eq!(Identity::parse_mldsa_pk(&serialized).unwrap(), id.mldsa_pk);
        assert_eq!(Identity::parse_mlkem_pk(&serialized).unwrap(), id.mlkem_pk);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");
        let id = Identity::from_seed(&[42u8; 32]);
        id.save(&path, b"").unwrap();
        let loaded = Identity::load(&path, b"").unwrap();
        assert_eq!(loaded.mldsa_sk, id.mldsa_sk);
        assert_eq!(loaded.mlkem_sk, id.mlkem_sk);
        assert_eq!(loaded.serialize_public(), id.serialize_public());
    }

    #[test]
    fn load_with_wrong_passphrase_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity");
        let id = Identity::from_seed(&[5u8; 32]);
        id.save(&path, b"correct-horse").unwrap();
        assert!(Identity::load(&path, b"wrong").is_err());
    }
}
