//! LMDB storage backend for the Vela protocol.
//!
//! Implements the `vela-store` traits using the `heed` LMDB bindings. Trie
//! nodes and flat consensus keys live in a single bytes-to-bytes database;
//! the callers' key prefixes keep the keyspaces apart.

pub mod environment;
pub mod error;
pub mod kv;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use kv::LmdbKvStore;
