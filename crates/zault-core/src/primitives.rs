//! Uniform adapters over the external cryptographic collaborators: SHA3-256,
//! ChaCha20-Poly1305, ML-DSA-65, ML-KEM-768, and the system CSPRNG.
//!
//! The vault engine never touches a primitive crate directly outside this
//! module; every caller goes through the wrappers here so the fixed-length
//! contracts of spec §4.1 are enforced in exactly one place.

use crate::error::{Result, ZaultError};
use aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce as ChaNonce};
use hybrid_array::Array;
use ml_dsa::{KeyGen as DsaKeyGen, MlDsa65, Signature as MlDsaSignature, SigningKey, VerifyingKey};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Encoded, EncodedSizeUser, KemCore, MlKem768};
use rand_chacha::ChaCha20Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use sha3::{Digest, Sha3_256};
use zeroize::Zeroize;

/// Fixed lengths for every fixed-size quantity this crate handles, lifted
/// from spec §4.1 and the original `zault.h` constants.
pub mod lengths {
    pub const HASH: usize = 32;
    pub const MLDSA65_PK: usize = 1952;
    pub const MLDSA65_SK: usize = 4032;
    pub const MLDSA65_SIG: usize = 3309;
    pub const MLKEM768_PK: usize = 1184;
    pub const MLKEM768_SK: usize = 2400;
    pub const MLKEM768_CT: usize = 1088;
    pub const MLKEM768_SS: usize = 32;
    pub const CHACHA_KEY: usize = 32;
    pub const CHACHA_NONCE: usize = 12;
    pub const CHACHA_TAG: usize = 16;
    pub const PUBLIC_IDENTITY: usize = MLDSA65_PK + MLKEM768_PK;
}

/// SHA3-256 over arbitrary bytes.
pub fn sha3_256(data: &[u8]) -> [u8; lengths::HASH] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; lengths::HASH];
    out.copy_from_slice(&digest);
    out
}

/// Fill `out` with CSPRNG bytes.
pub fn csprng(out: &mut [u8]) {
    rand_core::OsRng.fill_bytes(out);
}

/// Fill a fresh `n`-byte buffer with CSPRNG bytes.
pub fn csprng_vec(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    csprng(&mut buf);
    buf
}

/// Seal `pt` under `key`/`nonce` with ChaCha20-Poly1305, no associated data.
/// Returns `nonce ‖ ct_with_tag` (the `chacha20poly1305` crate appends the
/// 16-byte tag to the tail of the ciphertext it returns).
pub fn chacha_seal(key: &[u8; lengths::CHACHA_KEY], nonce: &[u8; lengths::CHACHA_NONCE], pt: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| ZaultError::Crypto(format!("chacha key: {e}")))?;
    let ct = cipher
        .encrypt(ChaNonce::from_slice(nonce), Payload { msg: pt, aad: &[] })
        .map_err(|_| ZaultError::Crypto("chacha seal failed".into()))?;
    let mut out = Vec::with_capacity(lengths::CHACHA_NONCE + ct.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Open a `nonce ‖ ct_with_tag` wire value produced by [`chacha_seal`].
pub fn chacha_open(key: &[u8; lengths::CHACHA_KEY], wire: &[u8]) -> Result<Vec<u8>> {
    if wire.len() < lengths::CHACHA_NONCE + lengths::CHACHA_TAG {
        return Err(ZaultError::InvalidData("chacha wire too short".into()));
    }
    let (nonce, ct) = wire.split_at(lengths::CHACHA_NONCE);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| ZaultError::Crypto(format!("chacha key: {e}")))?;
    cipher
        .decrypt(ChaNonce::from_slice(nonce), Payload { msg: ct, aad: &[] })
        .map_err(|_| ZaultError::AuthFailed)
}

/// ML-DSA-65 keypair, raw encoded bytes.
pub struct MldsaKeyPair {
    pub pk: [u8; lengths::MLDSA65_PK],
    pub sk: [u8; lengths::MLDSA65_SK],
}

fn mldsa_keygen_with_rng(rng: &mut (impl RngCore + CryptoRng)) -> MldsaKeyPair {
    let mut seed_bytes = [0u8; 32];
    rng.fill_bytes(&mut seed_bytes);
    let seed = Array::try_from(&seed_bytes[..]).expect("32-byte seed");
    let pair = <MlDsa65 as DsaKeyGen>::from_seed(&seed);
    let mut pk = [0u8; lengths::MLDSA65_PK];
    pk.copy_from_slice(pair.verifying_key().encode().as_slice());
    let mut sk = [0u8; lengths::MLDSA65_SK];
    sk.copy_from_slice(pair.signing_key().encode().as_slice());
    seed_bytes.zeroize();
    MldsaKeyPair { pk, sk }
}

/// Generate a fresh ML-DSA-65 keypair from the system CSPRNG.
pub fn mldsa_keygen() -> MldsaKeyPair {
    mldsa_keygen_with_rng(&mut rand_core::OsRng)
}

/// Generate an ML-DSA-65 keypair deterministically from a 32-byte seed
/// (internally expanded through [`ml_dsa`]'s own deterministic `from_seed`).
pub fn mldsa_keygen_from_seed(seed: &[u8; 32]) -> MldsaKeyPair {
    let seed_arr = Array::try_from(&seed[..]).expect("32-byte seed");
    let pair = <MlDsa65 as DsaKeyGen>::from_seed(&seed_arr);
    let mut pk = [0u8; lengths::MLDSA65_PK];
    pk.copy_from_slice(pair.verifying_key().encode().as_slice());
    let mut sk = [0u8; lengths::MLDSA65_SK];
    sk.copy_from_slice(pair.signing_key().encode().as_slice());
    MldsaKeyPair { pk, sk }
}

/// Sign `msg` under a raw-encoded ML-DSA-65 secret key.
pub fn mldsa_sign(sk: &[u8; lengths::MLDSA65_SK], msg: &[u8]) -> Result<[u8; lengths::MLDSA65_SIG]> {
    use ml_dsa::signature::Signer;
    let sk_encoded = Array::try_from(&sk[..]).map_err(|_| ZaultError::InvalidArg("mldsa sk length".into()))?;
    let signing_key = SigningKey::<MlDsa65>::decode(&sk_encoded);
    let sig = signing_key.sign(msg);
    let mut out = [0u8; lengths::MLDSA65_SIG];
    out.copy_from_slice(sig.encode().as_slice());
    Ok(out)
}

/// Verify an ML-DSA-65 signature; returns `false` on any mismatch rather
/// than erroring, matching spec §4.1's `bool`-returning contract.
pub fn mldsa_verify(pk: &[u8; lengths::MLDSA65_PK], msg: &[u8], sig: &[u8; lengths::MLDSA65_SIG]) -> bool {
    use ml_dsa::signature::Verifier;
    let Ok(pk_encoded) = Array::try_from(&pk[..]) else { return false };
    let verifying_key = VerifyingKey::<MlDsa65>::decode(&pk_encoded);
    let Ok(sig_encoded) = Array::try_from(&sig[..]) else { return false };
    let Some(signature) = MlDsaSignature::<MlDsa65>::decode(&sig_encoded) else { return false };
    verifying_key.verify(msg, &signature).is_ok()
}

/// ML-KEM-768 keypair, raw encoded bytes.
pub struct MlkemKeyPair {
    pub pk: [u8; lengths::MLKEM768_PK],
    pub sk: [u8; lengths::MLKEM768_SK],
}

fn mlkem_keygen_with_rng(rng: &mut (impl RngCore + CryptoRng)) -> MlkemKeyPair {
    let (dk, ek) = MlKem768::generate(rng);
    let mut pk = [0u8; lengths::MLKEM768_PK];
    pk.copy_from_slice(ek.as_bytes().as_slice());
    let mut sk = [0u8; lengths::MLKEM768_SK];
    sk.copy_from_slice(dk.as_bytes().as_slice());
    MlkemKeyPair { pk, sk }
}

/// Generate a fresh ML-KEM-768 keypair from the system CSPRNG.
pub fn mlkem_keygen() -> MlkemKeyPair {
    mlkem_keygen_with_rng(&mut rand_core::OsRng)
}

/// Generate an ML-KEM-768 keypair deterministically from a 32-byte seed, by
/// seeding a `ChaCha20Rng` and driving the crate's RNG-based keygen with it.
pub fn mlkem_keygen_from_seed(seed: &[u8; 32]) -> MlkemKeyPair {
    let mut rng = ChaCha20Rng::from_seed(*seed);
    mlkem_keygen_with_rng(&mut rng)
}

/// Encapsulate a fresh shared secret to `pk`, returning `(ciphertext, ss)`.
pub fn mlkem_encapsulate(
    pk: &[u8; lengths::MLKEM768_PK],
) -> Result<([u8; lengths::MLKEM768_CT], [u8; lengths::MLKEM768_SS])> {
    type EkEncoded = Encoded<<MlKem768 as KemCore>::EncapsulationKey>;
    let ek_encoded =
        EkEncoded::try_from(&pk[..]).map_err(|_| ZaultError::InvalidArg("mlkem pk length".into()))?;
    let ek = <MlKem768 as KemCore>::EncapsulationKey::from_bytes(&ek_encoded);
    let (ct, ss) = ek
        .encapsulate(&mut rand_core::OsRng)
        .map_err(|_| ZaultError::Crypto("mlkem encapsulate failed".into()))?;
    let mut ct_out = [0u8; lengths::MLKEM768_CT];
    ct_out.copy_from_slice(ct.as_slice());
    let mut ss_out = [0u8; lengths::MLKEM768_SS];
    ss_out.copy_from_slice(ss.as_slice());
    Ok((ct_out, ss_out))
}

/// Decapsulate `ct` under a raw-encoded ML-KEM-768 secret key.
pub fn mlkem_decapsulate(
    sk: &[u8; lengths::MLKEM768_SK],
    ct: &[u8; lengths::MLKEM768_CT],
) -> Result<[u8; lengths::MLKEM768_SS]> {
    type DkEncoded = Encoded<<MlKem768 as KemCore>::DecapsulationKey>;
    let dk_encoded =
        DkEncoded::try_from(&sk[..]).map_err(|_| ZaultError::InvalidArg("mlkem sk length".into()))?;
    let dk = <MlKem768 as KemCore>::DecapsulationKey::from_bytes(&dk_encoded);
    let ct_encoded = Encoded::<<MlKem768 as KemCore>::Ciphertext>::try_from(&ct[..])
        .map_err(|_| ZaultError::InvalidArg("mlkem ct length".into()))?;
    let ss = dk
        .decapsulate(&ct_encoded)
        .map_err(|_| ZaultError::Crypto("mlkem decapsulate failed".into()))?;
    let mut ss_out = [0u8; lengths::MLKEM768_SS];
    ss_out.copy_from_slice(ss.as_slice());
    Ok(ss_out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_256_empty_known_vector() {
        let h = sha3_256(b"");
        assert_eq!(
            hex::encode(h),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434c"
        );
    }

    #[test]
    fn chacha_round_trip() {
        let key = [7u8; lengths::CHACHA_KEY];
        let nonce = [1u8; lengths::CHACHA_NONCE];
        let wire = chacha_seal(&key, &nonce, b"hello world").unwrap();
        let pt = chacha_open(&key, &wire).unwrap();
        assert_eq!(pt, b"hello world");
    }

    #[test]
    fn chacha_tamper_fails() {
        let key = [9u8; lengths::CHACHA_KEY];
        let nonce = [2u8; lengths::CHACHA_NONCE];
        let mut wire = chacha_seal(&key, &nonce, b"payload").unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        assert!(chacha_open(&key, &wire).is_err());
    }

    #[test]
    fn mldsa_sign_verify_round_trip() {
        let kp = mldsa_keygen_from_seed(&[5u8; 32]);
        let sig = mldsa_sign(&kp.sk, b"msg").unwrap();
        assert!(mldsa_verify(&kp.pk, b"msg", &sig));
        assert!(!mldsa_verify(&kp.pk, b"other", &sig));
    }

    #[test]
    fn mldsa_from_seed_deterministic() {
        let a = mldsa_keygen_from_seed(&[11u8; 32]);
        let b = mldsa_keygen_from_seed(&[11u8; 32]);
        assert_eq!(a.pk, b.pk);
        assert_eq!(a.sk, b.sk);
    }

    #[test]
    fn mlkem_encapsulate_decapsulate_round_trip() {
        let kp = mlkem_keygen_from_seed(&[3u8; 32]);
        let (ct, ss1) = mlkem_encapsulate(&kp.pk).unwrap();
        let ss2 = mlkem_decapsulate(&kp.sk, &ct).unwrap();
        assert_eq!(ss1, ss2);
    }

    #[test]
    fn mlkem_from_seed_deterministic() {
        let a = mlkem_keygen_from_seed(&[13u8; 32]);
        let b = mlkem_keygen_from_seed(&[13u8; 32]);
        assert_eq!(a.pk, b.pk);
        assert_eq!(a.sk, b.sk);
    }
}
