//! Cryptographic primitives for the Vela protocol.
//!
//! Keccak-256/512 digests and recoverable secp256k1 signatures. Block seals
//! are 65-byte `r ‖ s ‖ v` signatures from which the producer address is
//! recovered during verification.

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use error::CryptoError;
pub use hash::{keccak256, keccak256_concat, keccak512};
pub use keys::{public_key_address, KeyPair};
pub use sign::{recover_signer, sign_hash, SIGNATURE_LEN};
