//! Keccak digest helpers.

use sha3::{Digest, Keccak256, Keccak512};
use vela_types::Hash;

/// Keccak-256 of a byte slice.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash::new(hasher.finalize().into())
}

/// Keccak-256 over the concatenation of several byte slices, without an
/// intermediate allocation.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash::new(hasher.finalize().into())
}

/// Keccak-512 of a byte slice.
pub fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Keccak512::new();
    hasher.update(data);
    hasher.finalize().into()
}
