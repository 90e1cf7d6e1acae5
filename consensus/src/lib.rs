//! Delegated proof-of-stake consensus for Vela.
//!
//! The engine keeps candidacy, delegation, the per-epoch validator set and
//! per-validator production counts in five authenticated tries bound into
//! every header by a single digest. Once per epoch the vote tallies elect a
//! new validator set; production is time-sliced into fixed slots; a block is
//! final once a supermajority of distinct validators has built on it.
//!
//! ## Module overview
//!
//! - [`context`] — The five-trie DPoS context with snapshot/commit.
//! - [`election`] — Deterministic validator-set election per epoch.
//! - [`slots`] — Slot arithmetic and turn assignment.
//! - [`engine`] — Header preparation, sealing and verification.
//! - [`confirmation`] — The supermajority finality rule.
//! - [`mint`] — Per-epoch per-validator production counting.
//! - [`traits`] — Seams to the chain database, account state and signer.
//! - [`error`] — Consensus error types.

pub mod confirmation;
pub mod context;
pub mod election;
pub mod engine;
pub mod error;
pub mod mint;
pub mod slots;
pub mod traits;

pub use confirmation::{ConfirmationTracker, CONFIRMED_BLOCK_HEAD};
pub use context::DposContext;
pub use election::EpochContext;
pub use engine::{sig_hash, Dpos, SignerFn, BLOCK_REWARD, EXTRA_SEAL, EXTRA_VANITY};
pub use error::DposError;
pub use traits::{AccountState, ChainReader};
