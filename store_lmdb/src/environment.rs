//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::kv::LmdbKvStore;
use crate::LmdbError;

/// Wraps the LMDB environment and the consensus database handle.
pub struct LmdbEnvironment {
    env: Arc<Env>,

    /// Trie nodes and flat consensus keys, prefix-disambiguated by callers.
    pub(crate) consensus_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("failed to create directory: {e}")))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(4)
                .map_size(map_size)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let consensus_db = env.create_database(&mut wtxn, Some("consensus"))?;
        wtxn.commit()?;

        Ok(Self {
            env: Arc::new(env),
            consensus_db,
        })
    }

    /// Get a shared reference to the underlying heed environment.
    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    /// Create a key-value store backed by this environment.
    pub fn kv_store(&self) -> LmdbKvStore {
        LmdbKvStore {
            env: Arc::clone(&self.env),
            db: self.consensus_db,
        }
    }

    /// Force an `fsync` of the LMDB memory-mapped file to disk.
    ///
    /// LMDB ensures durability on every write-transaction commit. This is an
    /// extra safety measure for graceful shutdown, ensuring the OS has
    /// flushed all dirty pages before the process exits.
    pub fn force_sync(&self) -> Result<(), LmdbError> {
        let wtxn = self.env.write_txn()?;
        wtxn.commit()?;
        Ok(())
    }
}
