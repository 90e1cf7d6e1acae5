//! Authenticated key-value trie for the Vela DPoS context.
//!
//! A persistent (copy-on-write) nibble-radix Merkle trie over any
//! [`vela_store::KvStore`]. Nodes are content-addressed by the Keccak-256
//! digest of their RLP encoding; cloning a trie is a cheap snapshot that
//! shares both the committed storage and the in-memory node graph.
//!
//! Unlike go-ethereum's Merkle-Patricia trie, children are always referenced
//! by hash in a node's encoding — sub-32-byte nodes are never inlined. Roots
//! are therefore not Ethereum-compatible, which the protocol does not
//! require: only determinism matters.
//!
//! ## Module overview
//!
//! - [`trie`] — The trie itself: get/insert/remove/commit/snapshot.
//! - [`iter`] — Ordered iteration over a key prefix.
//! - [`node`] — Node representation and codec.
//! - [`nibbles`] — Half-byte path utilities and hex-prefix encoding.

pub mod error;
pub mod iter;
pub mod nibbles;
pub mod node;
pub mod trie;

pub use error::TrieError;
pub use iter::PrefixIter;
pub use trie::{Trie, EMPTY_ROOT};
