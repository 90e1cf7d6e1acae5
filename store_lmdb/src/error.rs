use thiserror::Error;
use vela_store::StoreError;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("lmdb error: {0}")]
    Heed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<heed::Error> for LmdbError {
    fn from(err: heed::Error) -> Self {
        LmdbError::Heed(err.to_string())
    }
}

impl From<LmdbError> for StoreError {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::Heed(msg) => StoreError::Backend(msg),
            LmdbError::Serialization(msg) => StoreError::Serialization(msg),
        }
    }
}
