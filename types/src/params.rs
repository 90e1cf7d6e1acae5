//! Protocol parameters fixed at genesis.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of one election epoch in seconds (24 hours). A single validator
/// set is active for the whole epoch.
pub const EPOCH_INTERVAL: u64 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("block interval must be positive")]
    ZeroBlockInterval,

    #[error("maximum validator count must be at least 1")]
    ZeroValidatorSize,

    #[error("epoch interval {EPOCH_INTERVAL} is not divisible by block interval {0}")]
    UnalignedBlockInterval(u64),
}

/// The two genesis-fixed consensus parameters.
///
/// Both are written into the genesis header and echoed in every subsequent
/// header; they are immutable for the lifetime of a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DposParams {
    /// Seconds per production slot; exactly one validator is expected to
    /// produce a block per slot.
    pub block_interval: u64,

    /// Maximum number of validators elected per epoch.
    pub max_validator_size: u64,
}

impl DposParams {
    pub fn new(block_interval: u64, max_validator_size: u64) -> Result<Self, ParamsError> {
        if block_interval == 0 {
            return Err(ParamsError::ZeroBlockInterval);
        }
        if max_validator_size == 0 {
            return Err(ParamsError::ZeroValidatorSize);
        }
        if EPOCH_INTERVAL % block_interval != 0 {
            return Err(ParamsError::UnalignedBlockInterval(block_interval));
        }
        Ok(Self {
            block_interval,
            max_validator_size,
        })
    }

    /// Minimum candidate count that must survive a kick-out round.
    pub fn safe_size(&self) -> usize {
        (self.max_validator_size * 2 / 3 + 1) as usize
    }

    /// Distinct-validator threshold for block confirmation.
    pub fn consensus_size(&self) -> u64 {
        self.max_validator_size * 2 / 3 + 1
    }

    /// Number of production slots in one epoch.
    pub fn epoch_slots(&self) -> u64 {
        EPOCH_INTERVAL / self.block_interval
    }
}

impl Default for DposParams {
    fn default() -> Self {
        Self {
            block_interval: 10,
            max_validator_size: 21,
        }
    }
}
