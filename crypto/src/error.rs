use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] k256::ecdsa::Error),

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),
}
