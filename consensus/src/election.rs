//! The per-epoch validator election.
//!
//! Invoked during finalization of every block; it only does work when the
//! block crosses an epoch boundary. The pipeline per crossed boundary:
//! kick out under-producers, tally balance-weighted votes, rank, truncate,
//! shuffle deterministically, clear the spent mint counts and publish the
//! new list into a fresh epoch trie.

use tracing::{debug, info};

use vela_crypto::keccak256_concat;
use vela_types::{Address, DposParams, Hash, Header, Timestamp, EPOCH_INTERVAL};

use crate::context::DposContext;
use crate::error::DposError;
use crate::traits::AccountState;

/// Election-time view over the DPoS context.
pub struct EpochContext<'a> {
    /// Timestamp of the block being finalized.
    pub timestamp: Timestamp,
    pub context: &'a mut DposContext,
    pub state: &'a dyn AccountState,
}

impl EpochContext<'_> {
    /// Run the election for every epoch boundary crossed between `parent`
    /// and the block under construction. A no-op inside an epoch.
    ///
    /// `first_block_time` scales the under-production threshold down while
    /// the chain is younger than one full epoch.
    pub fn try_elect(
        &mut self,
        params: &DposParams,
        genesis: &Header,
        parent: &Header,
        first_block_time: Option<Timestamp>,
    ) -> Result<(), DposError> {
        let genesis_epoch = genesis.time.epoch();
        let mut prev_epoch = parent.time.epoch();
        let current_epoch = self.timestamp.epoch();
        if prev_epoch == current_epoch {
            return Ok(());
        }

        let prev_epoch_is_genesis = prev_epoch == genesis_epoch;
        if prev_epoch_is_genesis && prev_epoch < current_epoch {
            prev_epoch = current_epoch - 1;
        }

        let duration = observed_epoch_duration(parent, first_block_time);
        let parent_hash = parent.hash();

        // Each iteration closes out `epoch` and elects the set for
        // `epoch + 1`; a chain that stalled across several boundaries
        // settles every crossed epoch in turn.
        for epoch in prev_epoch..current_epoch {
            // No production record exists for the genesis epoch; skip the
            // kick-out scan until real counts have accumulated.
            if epoch != genesis_epoch && self.has_mint_records(epoch)? {
                self.kickout_underproducers(params, epoch, duration)?;
            }

            let mut tally = self.count_votes()?;
            if tally.len() < params.safe_size() {
                return Err(DposError::TooFewCandidates {
                    have: tally.len(),
                    need: params.safe_size(),
                });
            }
            tally.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
            tally.truncate(params.max_validator_size as usize);

            let mut validators: Vec<Address> = tally.into_iter().map(|(addr, _)| addr).collect();
            shuffle_validators(&mut validators, &parent_hash, epoch + 1);

            self.clear_mint_counts(epoch)?;
            self.context.reset_epoch_trie();
            self.context.set_validators(&validators)?;
            info!(
                epoch = epoch + 1,
                validators = validators.len(),
                "entering new epoch"
            );
        }
        Ok(())
    }

    /// Balance-weighted vote tally for every registered candidate.
    fn count_votes(&self) -> Result<Vec<(Address, u128)>, DposError> {
        let mut tally = Vec::new();
        for entry in self.context.candidate_trie().iter_prefix(&[]) {
            let (_, candidate) = entry?;
            let candidate = Address::from_slice(&candidate).ok_or_else(|| {
                DposError::CorruptEntry("candidate entry is not a 20-byte address".into())
            })?;

            let mut weight: u128 = 0;
            for row in self.context.delegate_trie().iter_prefix(candidate.as_bytes()) {
                let (_, voter) = row?;
                let voter = Address::from_slice(&voter).ok_or_else(|| {
                    DposError::CorruptEntry("delegate entry is not a 20-byte address".into())
                })?;
                weight = weight.saturating_add(self.state.balance(&voter));
            }
            tally.push((candidate, weight));
        }
        Ok(tally)
    }

    /// Kick out validators whose production in `epoch` fell short, worst
    /// producers first, stopping while fewer than `safe_size` candidates
    /// would remain.
    fn kickout_underproducers(
        &mut self,
        params: &DposParams,
        epoch: u64,
        epoch_duration: u64,
    ) -> Result<(), DposError> {
        let validators = self.context.get_validators()?;
        let expected = epoch_duration / params.block_interval / params.max_validator_size;

        let mut lagging = Vec::new();
        for validator in validators {
            let produced = self.context.mint_count(epoch, &validator)?;
            if produced < expected {
                lagging.push((validator, produced));
            }
        }
        lagging.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

        let mut candidate_count = 0usize;
        for entry in self.context.candidate_trie().iter_prefix(&[]) {
            entry?;
            candidate_count += 1;
        }

        for (validator, produced) in lagging {
            if candidate_count <= params.safe_size() {
                debug!(
                    remaining = candidate_count,
                    "kick-out stopped to preserve liveness"
                );
                break;
            }
            let was_candidate = self
                .context
                .candidate_trie()
                .contains(validator.as_bytes())?;
            self.context.kickout_candidate(validator)?;
            if was_candidate {
                candidate_count -= 1;
            }
            info!(validator = %validator, produced, expected, epoch, "kicked out under-producer");
        }
        Ok(())
    }

    fn has_mint_records(&self, epoch: u64) -> Result<bool, DposError> {
        match self
            .context
            .mint_trie()
            .iter_prefix(&epoch.to_be_bytes())
            .next()
        {
            Some(Ok(_)) => Ok(true),
            Some(Err(err)) => Err(err.into()),
            None => Ok(false),
        }
    }

    /// Delete every mint-count row of `epoch`.
    fn clear_mint_counts(&mut self, epoch: u64) -> Result<(), DposError> {
        let mut keys = Vec::new();
        for entry in self.context.mint_trie().iter_prefix(&epoch.to_be_bytes()) {
            match entry {
                Ok((key, _)) => keys.push(key),
                Err(err) if err.is_missing_node() => break,
                Err(err) => return Err(err.into()),
            }
        }
        for key in keys {
            match self.context.mint_trie_mut().remove(&key) {
                Err(err) if err.is_missing_node() => {}
                other => other?,
            }
        }
        Ok(())
    }
}

/// The wall-clock span the previous epoch actually covered. Shorter than
/// `EPOCH_INTERVAL` only while the chain is younger than one epoch.
fn observed_epoch_duration(parent: &Header, first_block_time: Option<Timestamp>) -> u64 {
    match first_block_time {
        Some(first) => parent.time.since(first).min(EPOCH_INTERVAL),
        None => EPOCH_INTERVAL,
    }
}

/// Deterministically permute the elected list.
///
/// A descending Fisher–Yates where each swap index is drawn from a Keccak
/// fold of the seed — itself Keccak over the parent hash and the new epoch
/// number — so every node computes the identical order.
pub(crate) fn shuffle_validators(validators: &mut [Address], parent_hash: &Hash, new_epoch: u64) {
    let seed = keccak256_concat(&[parent_hash.as_bytes(), &new_epoch.to_be_bytes()]);
    for i in (1..validators.len()).rev() {
        let digest = keccak256_concat(&[seed.as_bytes(), &(i as u64).to_be_bytes()]);
        let j = (fold_u64(&digest) % (i as u64 + 1)) as usize;
        validators.swap(i, j);
    }
}

fn fold_u64(hash: &Hash) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_be_bytes(buf)
}
