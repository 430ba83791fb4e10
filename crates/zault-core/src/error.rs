//! Error taxonomy for the vault engine, mirroring the exit-code table the
//! embedding surface is expected to map onto (see spec §6/§7). This core
//! never constructs that ABI itself; it only keeps the codes ready for it.

use thiserror::Error;

/// Error codes matching the embedding surface's exit-code table.
pub mod code {
    pub const OK: i32 = 0;
    pub const INVALID_ARG: i32 = -1;
    pub const ALLOC: i32 = -2;
    pub const IO: i32 = -3;
    pub const CRYPTO: i32 = -4;
    pub const INVALID_DATA: i32 = -5;
    pub const NOT_FOUND: i32 = -6;
    pub const EXISTS: i32 = -7;
    pub const AUTH_FAILED: i32 = -8;
}

/// Unified error type for all vault operations.
#[derive(Debug, Error)]
pub enum ZaultError {
    /// Caller passed a malformed argument: wrong length, empty where
    /// required, path containing separators, etc.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A primitive reported an internal failure unrelated to verification
    /// (e.g. RNG exhaustion during keygen).
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// Corrupt, truncated, or otherwise structurally invalid data: bad
    /// magic, length mismatch, hash mismatch.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The requested hash or file was not present.
    #[error("not found")]
    NotFound,

    /// A non-idempotent write collided with existing, differing data.
    #[error("already exists")]
    Exists,

    /// Signature verification, AEAD tag check, or share expiry check
    /// failed.
    #[error("authentication failed")]
    AuthFailed,

    /// Reserved for embedding-surface allocation failures; never
    /// constructed directly by this core.
    #[error("allocation failed")]
    Alloc,
}

impl ZaultError {
    /// The exit code an embedding ABI would surface for this error.
    pub fn code(&self) -> i32 {
        match self {
            ZaultError::InvalidArg(_) => code::INVALID_ARG,
            ZaultError::Io(_) => code::IO,
            ZaultError::Crypto(_) => code::CRYPTO,
            ZaultError::InvalidData(_) => code::INVALID_DATA,
            ZaultError::NotFound => code::NOT_FOUND,
            ZaultError::Exists => code::EXISTS,
            ZaultError::AuthFailed => code::AUTH_FAILED,
            ZaultError::Alloc => code::ALLOC,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZaultError>;
