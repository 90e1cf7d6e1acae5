//! The DPoS context: five authenticated tries behind one digest.
//!
//! | Trie      | Key                      | Value            |
//! |-----------|--------------------------|------------------|
//! | candidate | `addr`                   | `addr`           |
//! | delegate  | `candidate ‖ voter`      | `voter`          |
//! | vote      | `voter`                  | `candidate`      |
//! | epoch     | `"validator"`            | RLP address list |
//! | mintCnt   | `epoch_be ‖ validator`   | `count_be`       |
//!
//! The delegate and vote tries are mutually consistent views of one voting
//! relation: every `delegate[c ‖ v]` row has a matching `vote[v] = c` row.

use std::sync::Arc;

use rlp::Rlp;
use tracing::debug;

use vela_store::KvStore;
use vela_trie::{Trie, TrieError};
use vela_types::{Address, ContextRoots, Hash};

use crate::error::DposError;

pub const EPOCH_PREFIX: &[u8] = b"epoch-";
pub const DELEGATE_PREFIX: &[u8] = b"delegate-";
pub const VOTE_PREFIX: &[u8] = b"vote-";
pub const CANDIDATE_PREFIX: &[u8] = b"candidate-";
pub const MINT_CNT_PREFIX: &[u8] = b"mintCnt-";

/// Fixed key the serialized validator list lives under in the epoch trie.
const VALIDATOR_KEY: &[u8] = b"validator";

/// Swallow missing-node failures on deletion paths, where absence is the
/// desired post-condition.
fn allow_missing(result: Result<(), TrieError>) -> Result<(), TrieError> {
    match result {
        Err(err) if err.is_missing_node() => Ok(()),
        other => other,
    }
}

fn read_allow_missing(
    result: Result<Option<Vec<u8>>, TrieError>,
) -> Result<Option<Vec<u8>>, TrieError> {
    match result {
        Err(err) if err.is_missing_node() => Ok(None),
        other => other,
    }
}

fn delegate_key(candidate: &Address, voter: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(candidate.as_bytes());
    key.extend_from_slice(voter.as_bytes());
    key
}

pub(crate) fn mint_key(epoch: u64, validator: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(28);
    key.extend_from_slice(&epoch.to_be_bytes());
    key.extend_from_slice(validator.as_bytes());
    key
}

fn decode_address(bytes: &[u8], what: &str) -> Result<Address, DposError> {
    Address::from_slice(bytes)
        .ok_or_else(|| DposError::CorruptEntry(format!("{what} is not a 20-byte address")))
}

/// The atomic bundle of five tries sharing one backing store.
///
/// `Clone` is the snapshot primitive: each trie handle duplicates its cursor
/// while sharing committed nodes, so a clone taken before a failing mutation
/// restores the exact pre-call state.
#[derive(Clone)]
pub struct DposContext {
    epoch: Trie,
    delegate: Trie,
    vote: Trie,
    candidate: Trie,
    mint_cnt: Trie,
    store: Arc<dyn KvStore>,
}

impl DposContext {
    /// Create a context with all five tries empty.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            epoch: Trie::new(EPOCH_PREFIX, Arc::clone(&store)),
            delegate: Trie::new(DELEGATE_PREFIX, Arc::clone(&store)),
            vote: Trie::new(VOTE_PREFIX, Arc::clone(&store)),
            candidate: Trie::new(CANDIDATE_PREFIX, Arc::clone(&store)),
            mint_cnt: Trie::new(MINT_CNT_PREFIX, Arc::clone(&store)),
            store,
        }
    }

    /// Rehydrate a context from a previously committed set of roots.
    pub fn from_roots(store: Arc<dyn KvStore>, roots: &ContextRoots) -> Result<Self, DposError> {
        Ok(Self {
            epoch: Trie::open(EPOCH_PREFIX, Arc::clone(&store), roots.epoch)?,
            delegate: Trie::open(DELEGATE_PREFIX, Arc::clone(&store), roots.delegate)?,
            vote: Trie::open(VOTE_PREFIX, Arc::clone(&store), roots.vote)?,
            candidate: Trie::open(CANDIDATE_PREFIX, Arc::clone(&store), roots.candidate)?,
            mint_cnt: Trie::open(MINT_CNT_PREFIX, Arc::clone(&store), roots.mint_cnt)?,
            store,
        })
    }

    /// Register `candidate` as eligible for election. Idempotent.
    pub fn become_candidate(&mut self, candidate: Address) -> Result<(), DposError> {
        self.candidate
            .insert(candidate.as_bytes(), candidate.as_bytes())?;
        Ok(())
    }

    /// Remove a candidate and cascade over its voters: every delegate row
    /// under the candidate is dropped, and each voter's `vote` entry is
    /// dropped if it still points at the candidate.
    ///
    /// Missing-node failures are swallowed throughout; the required
    /// post-condition is absence, not prior presence.
    pub fn kickout_candidate(&mut self, candidate: Address) -> Result<(), DposError> {
        allow_missing(self.candidate.remove(candidate.as_bytes()))?;

        let mut voters = Vec::new();
        for entry in self.delegate.iter_prefix(candidate.as_bytes()) {
            match entry {
                Ok((_, voter)) => voters.push(decode_address(&voter, "delegate voter")?),
                Err(err) if err.is_missing_node() => {
                    debug!(candidate = %candidate, "delegate rows already pruned during kick-out");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        for voter in voters {
            allow_missing(self.delegate.remove(&delegate_key(&candidate, &voter)))?;

            let backed = read_allow_missing(self.vote.get(voter.as_bytes()))?;
            if backed.as_deref() == Some(candidate.as_bytes().as_slice()) {
                allow_missing(self.vote.remove(voter.as_bytes()))?;
            }
        }
        Ok(())
    }

    /// Point `voter`'s single vote at `candidate`, clearing any previous
    /// vote. Fails unless the candidate is registered.
    pub fn delegate(&mut self, voter: Address, candidate: Address) -> Result<(), DposError> {
        if self.candidate.get(candidate.as_bytes())?.is_none() {
            return Err(DposError::InvalidCandidateToDelegate);
        }

        let old = read_allow_missing(self.vote.get(voter.as_bytes()))?;
        if let Some(old) = old {
            let old = decode_address(&old, "vote target")?;
            allow_missing(self.delegate.remove(&delegate_key(&old, &voter)))?;
        }

        self.delegate
            .insert(&delegate_key(&candidate, &voter), voter.as_bytes())?;
        self.vote
            .insert(voter.as_bytes(), candidate.as_bytes())?;
        Ok(())
    }

    /// Withdraw `voter`'s vote from `candidate`. Fails unless the candidate
    /// is registered and is the voter's current choice.
    pub fn undelegate(&mut self, voter: Address, candidate: Address) -> Result<(), DposError> {
        if self.candidate.get(candidate.as_bytes())?.is_none() {
            return Err(DposError::InvalidCandidateToUnDelegate);
        }

        let old = self.vote.get(voter.as_bytes())?;
        if old.as_deref() != Some(candidate.as_bytes().as_slice()) {
            return Err(DposError::MismatchCandidateToUnDelegate);
        }

        allow_missing(self.delegate.remove(&delegate_key(&candidate, &voter)))?;
        allow_missing(self.vote.remove(voter.as_bytes()))?;
        Ok(())
    }

    /// Read the ordered validator list for the current epoch.
    pub fn get_validators(&self) -> Result<Vec<Address>, DposError> {
        let bytes = self.epoch.get(VALIDATOR_KEY)?.ok_or_else(|| {
            DposError::InvalidValidatorList("no validator list in epoch trie".into())
        })?;
        Rlp::new(&bytes)
            .as_list::<Address>()
            .map_err(|err| DposError::InvalidValidatorList(err.to_string()))
    }

    /// Write the ordered validator list for the current epoch.
    pub fn set_validators(&mut self, validators: &[Address]) -> Result<(), DposError> {
        let encoded = rlp::encode_list::<Address, _>(validators);
        self.epoch.insert(VALIDATOR_KEY, &encoded)?;
        Ok(())
    }

    /// Blocks produced by `validator` during `epoch`; zero when absent.
    pub fn mint_count(&self, epoch: u64, validator: &Address) -> Result<u64, DposError> {
        Ok(self.mint_count_entry(epoch, validator)?.unwrap_or(0))
    }

    pub(crate) fn mint_count_entry(
        &self,
        epoch: u64,
        validator: &Address,
    ) -> Result<Option<u64>, DposError> {
        match self.mint_cnt.get(&mint_key(epoch, validator))? {
            None => Ok(None),
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    DposError::CorruptEntry("mint count is not 8 bytes".into())
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
        }
    }

    pub(crate) fn set_mint_count(
        &mut self,
        epoch: u64,
        validator: &Address,
        count: u64,
    ) -> Result<(), DposError> {
        self.mint_cnt
            .insert(&mint_key(epoch, validator), &count.to_be_bytes())?;
        Ok(())
    }

    /// Take a cheap snapshot of all five trie handles.
    pub fn snapshot(&self) -> DposContext {
        self.clone()
    }

    /// Restore all five trie handles from a snapshot.
    pub fn revert_to_snapshot(&mut self, snapshot: DposContext) {
        *self = snapshot;
    }

    /// Commit the five tries in the fixed order epoch, delegate, vote,
    /// candidate, mintCnt, flushing dirty nodes to the backing store.
    ///
    /// The returned roots — not live re-reads — feed the digest, so
    /// observers only ever see a fully-pre-commit or fully-post-commit set.
    pub fn commit(&mut self) -> Result<ContextRoots, DposError> {
        let epoch = self.epoch.commit()?;
        let delegate = self.delegate.commit()?;
        let vote = self.vote.commit()?;
        let candidate = self.candidate.commit()?;
        let mint_cnt = self.mint_cnt.commit()?;
        Ok(ContextRoots {
            epoch,
            delegate,
            candidate,
            vote,
            mint_cnt,
        })
    }

    /// The current in-memory roots of the five tries, without committing.
    pub fn roots(&self) -> Result<ContextRoots, DposError> {
        Ok(ContextRoots {
            epoch: self.epoch.root_hash()?,
            delegate: self.delegate.root_hash()?,
            candidate: self.candidate.root_hash()?,
            vote: self.vote.root_hash()?,
            mint_cnt: self.mint_cnt.root_hash()?,
        })
    }

    /// The digest binding the five current roots.
    pub fn root(&self) -> Result<Hash, DposError> {
        Ok(self.roots()?.digest())
    }

    pub fn candidate_trie(&self) -> &Trie {
        &self.candidate
    }

    pub fn delegate_trie(&self) -> &Trie {
        &self.delegate
    }

    pub fn vote_trie(&self) -> &Trie {
        &self.vote
    }

    pub fn epoch_trie(&self) -> &Trie {
        &self.epoch
    }

    pub fn mint_trie(&self) -> &Trie {
        &self.mint_cnt
    }

    pub(crate) fn mint_trie_mut(&mut self) -> &mut Trie {
        &mut self.mint_cnt
    }

    /// Replace the epoch trie with a fresh one; each election publishes its
    /// validator list into an otherwise empty epoch trie.
    pub(crate) fn reset_epoch_trie(&mut self) {
        self.epoch = Trie::new(EPOCH_PREFIX, Arc::clone(&self.store));
    }
}
