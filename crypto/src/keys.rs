//! secp256k1 key pairs and address derivation.

use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use vela_types::Address;

use crate::error::CryptoError;
use crate::hash::keccak256;

/// A secp256k1 key pair used by block producers.
pub struct KeyPair {
    secret: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuild a key pair from a 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { secret })
    }

    /// The account address controlled by this key pair.
    pub fn address(&self) -> Address {
        public_key_address(self.secret.verifying_key())
    }

    pub fn secret(&self) -> &SigningKey {
        &self.secret
    }
}

/// Derive the account address from a public key: the last 20 bytes of the
/// Keccak-256 digest of the uncompressed point, tag byte excluded.
pub fn public_key_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[12..]);
    Address::new(bytes)
}
