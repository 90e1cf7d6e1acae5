//! Abstract storage traits for the Vela protocol.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits: trie nodes
//! and the flat consensus keys (such as the confirmed-block pointer) share
//! one keyspace, disambiguated by key prefixes chosen by the callers.

pub mod error;
pub mod kv;
pub mod memory;

pub use error::StoreError;
pub use kv::KvStore;
pub use memory::MemoryStore;
