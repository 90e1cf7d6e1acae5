//! Per-epoch per-validator production counting.

use vela_types::{Address, Timestamp};

use crate::context::DposContext;
use crate::error::DposError;

/// Record one produced block for `validator` at `current_time`.
///
/// The count continues from the previous entry only while the block stays in
/// its parent's epoch; the first block of a new epoch restarts at one.
/// Called exactly once per successfully finalized block, after the election.
pub fn update_mint_count(
    parent_time: Timestamp,
    current_time: Timestamp,
    validator: Address,
    context: &mut DposContext,
) -> Result<(), DposError> {
    let prev_epoch = parent_time.epoch();
    let current_epoch = current_time.epoch();

    let mut count = 1u64;
    if prev_epoch == current_epoch {
        if let Some(prior) = context.mint_count_entry(current_epoch, &validator)? {
            count = prior + 1;
        }
    }
    context.set_mint_count(current_epoch, &validator, count)
}
