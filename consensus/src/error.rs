use thiserror::Error;

use vela_crypto::CryptoError;
use vela_store::StoreError;
use vela_trie::TrieError;

/// Consensus errors.
///
/// Temporal errors are recoverable at the driver layer (retry later or
/// discard); structural and consensus errors permanently reject a header;
/// lineage errors mean a predecessor is missing and may clear after a fetch;
/// storage errors abort and surface to the operator.
#[derive(Debug, Error)]
pub enum DposError {
    // ── Temporal ─────────────────────────────────────────────────────────
    #[error("block in the future")]
    FutureBlock,

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("mint the future block")]
    MintFutureBlock,

    #[error("wait for last block arrived")]
    WaitForPrevBlock,

    #[error("invalid time to mint the block")]
    InvalidMintBlockTime,

    // ── Structural ───────────────────────────────────────────────────────
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    #[error("extra-data 65 byte suffix signature missing")]
    MissingSignature,

    #[error("non-zero mix digest")]
    InvalidMixDigest,

    #[error("invalid difficulty")]
    InvalidDifficulty,

    #[error("non empty uncle hash")]
    InvalidUncleHash,

    // ── Lineage ──────────────────────────────────────────────────────────
    #[error("unknown ancestor")]
    UnknownAncestor,

    #[error("unknown block")]
    UnknownBlock,

    #[error("nil block header returned")]
    NilBlockHeader,

    // ── Consensus ────────────────────────────────────────────────────────
    #[error("invalid block validator")]
    InvalidBlockValidator,

    #[error("mismatch block signer and validator")]
    MismatchSignerAndValidator,

    #[error("invalid candidate to delegate")]
    InvalidCandidateToDelegate,

    #[error("invalid candidate to undelegate")]
    InvalidCandidateToUnDelegate,

    #[error("mismatch candidate to undelegate")]
    MismatchCandidateToUnDelegate,

    #[error("no validators elected for the epoch")]
    NoValidators,

    #[error("too few candidates to elect ({have} < {need})")]
    TooFewCandidates { have: usize, need: usize },

    #[error("invalid validator list: {0}")]
    InvalidValidatorList(String),

    #[error("corrupt context entry: {0}")]
    CorruptEntry(String),

    // ── Storage & crypto ─────────────────────────────────────────────────
    #[error(transparent)]
    Trie(#[from] TrieError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("signer recovery failed: {0}")]
    Signature(#[from] CryptoError),

    #[error("signer callback failed: {0}")]
    Signer(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),
}
