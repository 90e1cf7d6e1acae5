//! Recoverable message signing and signer recovery.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use vela_types::{Address, Hash};

use crate::error::CryptoError;
use crate::keys::public_key_address;

/// Length of a seal signature: 64 bytes of `r ‖ s` plus one recovery byte.
pub const SIGNATURE_LEN: usize = 65;

/// Sign a 32-byte digest, returning the 65-byte `r ‖ s ‖ v` signature.
pub fn sign_hash(secret: &SigningKey, hash: &Hash) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let (signature, recovery_id) = secret.sign_prehash_recoverable(hash.as_bytes())?;
    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// Recover the signer address from a digest and a 65-byte signature.
///
/// The recovery byte must be 0 or 1; reduced-x recovery ids are rejected to
/// keep seals canonical.
pub fn recover_signer(hash: &Hash, sig: &[u8; SIGNATURE_LEN]) -> Result<Address, CryptoError> {
    if sig[64] > 1 {
        return Err(CryptoError::InvalidRecoveryId(sig[64]));
    }
    let recovery_id =
        RecoveryId::from_byte(sig[64]).ok_or(CryptoError::InvalidRecoveryId(sig[64]))?;
    let signature = Signature::from_slice(&sig[..64])?;
    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &signature, recovery_id)?;
    Ok(public_key_address(&key))
}
