//! Slot arithmetic and turn assignment.
//!
//! Pure and stateless: wall-clock time maps to a slot index, and the slot
//! index picks the expected producer from the current validator list. The
//! list is read fresh from the epoch trie by every caller; there is no
//! caching at this layer.

use vela_types::{Address, DposParams, Timestamp, EPOCH_INTERVAL};

use crate::error::DposError;

/// The slot index containing `time`.
pub fn slot_of(time: u64, block_interval: u64) -> u64 {
    time / block_interval
}

/// Start of the latest slot strictly before `time`'s own boundary; for a
/// slot-aligned `time` this is the previous slot's start.
pub fn prev_slot(time: u64, block_interval: u64) -> u64 {
    time.saturating_sub(1) / block_interval * block_interval
}

/// The earliest slot boundary at or after `time`.
pub fn next_slot(time: u64, block_interval: u64) -> u64 {
    (time + block_interval - 1) / block_interval * block_interval
}

/// The validator whose turn covers `time`.
///
/// `time` must be slot-aligned — blocks are only ever minted on slot
/// boundaries — and the validator list must be non-empty.
pub fn expected_validator(
    validators: &[Address],
    time: Timestamp,
    params: &DposParams,
) -> Result<Address, DposError> {
    if validators.is_empty() {
        return Err(DposError::NoValidators);
    }
    let offset = time.as_secs() % EPOCH_INTERVAL;
    if offset % params.block_interval != 0 {
        return Err(DposError::InvalidMintBlockTime);
    }
    let slot = offset / params.block_interval;
    let index = (slot % validators.len() as u64) as usize;
    Ok(validators[index])
}
