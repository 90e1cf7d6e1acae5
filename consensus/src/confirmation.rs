//! The supermajority confirmation rule.
//!
//! A block is confirmed once, walking the chain down from the head, a
//! supermajority (`max_validator_size * 2/3 + 1`) of distinct validators has
//! been seen strictly within one epoch. The confirmed pointer only ever
//! moves to a higher block number and is persisted so restarts resume where
//! they left off.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use vela_store::KvStore;
use vela_types::{Address, DposParams, Hash, Header};

use crate::error::DposError;
use crate::traits::ChainReader;

/// Flat storage key holding the confirmed header hash.
pub const CONFIRMED_BLOCK_HEAD: &[u8] = b"confirmed-block-head";

/// Tracks the highest confirmed header.
pub struct ConfirmationTracker {
    store: Arc<dyn KvStore>,
    confirmed: Option<Header>,
}

impl ConfirmationTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            confirmed: None,
        }
    }

    /// The currently confirmed header, if any walk has concluded yet.
    pub fn confirmed(&self) -> Option<&Header> {
        self.confirmed.as_ref()
    }

    /// Advance the confirmed pointer as far as the current head allows.
    pub fn update(&mut self, chain: &dyn ChainReader, params: &DposParams) -> Result<(), DposError> {
        let mut confirmed = match self.confirmed.take() {
            Some(header) => header,
            None => match self.load(chain)? {
                Some(header) => header,
                // First run on a fresh database: everything above genesis
                // is unconfirmed.
                None => chain.header_by_number(0).ok_or(DposError::UnknownBlock)?,
            },
        };

        let consensus_size = params.consensus_size() as usize;
        let mut cur = chain.current_header();
        let mut epoch: Option<u64> = None;
        let mut witnesses: HashSet<Address> = HashSet::new();

        while confirmed.hash() != cur.hash() && confirmed.number < cur.number {
            let cur_epoch = cur.time.epoch();
            if epoch != Some(cur_epoch) {
                epoch = Some(cur_epoch);
                witnesses.clear();
            }

            // Fast exit: fewer headers remain above the confirmed pointer
            // than fresh witnesses are still needed.
            if cur.number - confirmed.number < (consensus_size - witnesses.len()) as u64 {
                debug!(
                    current = cur.number,
                    confirmed = confirmed.number,
                    witnesses = witnesses.len(),
                    "confirmation fast return"
                );
                self.confirmed = Some(confirmed);
                return Ok(());
            }

            witnesses.insert(cur.validator);
            if witnesses.len() >= consensus_size {
                self.store
                    .put(CONFIRMED_BLOCK_HEAD, cur.hash().as_bytes())?;
                debug!(number = cur.number, "confirmed block head advanced");
                self.confirmed = Some(cur);
                return Ok(());
            }

            cur = chain
                .header_by_hash(&cur.parent_hash)
                .ok_or(DposError::NilBlockHeader)?;
        }

        self.confirmed = Some(confirmed);
        Ok(())
    }

    /// Load the persisted confirmed header, if present and still known to
    /// the chain.
    fn load(&self, chain: &dyn ChainReader) -> Result<Option<Header>, DposError> {
        let Some(bytes) = self.store.get(CONFIRMED_BLOCK_HEAD)? else {
            return Ok(None);
        };
        let hash = Hash::from_slice(&bytes)
            .ok_or_else(|| DposError::CorruptEntry("confirmed head is not a hash".into()))?;
        Ok(chain.header_by_hash(&hash))
    }
}
