//! Seams to the engine's external collaborators.

use vela_types::{Address, Hash, Header};

/// Read access to the header chain.
pub trait ChainReader: Send + Sync {
    fn header_by_hash(&self, hash: &Hash) -> Option<Header>;

    fn header_by_number(&self, number: u64) -> Option<Header>;

    /// The current chain head.
    fn current_header(&self) -> Header;
}

/// Account balances, used to weight votes and credit block rewards.
///
/// Balances are raw units; the election aggregates them with saturating
/// arithmetic.
pub trait AccountState {
    fn balance(&self, address: &Address) -> u128;

    fn add_balance(&mut self, address: &Address, amount: u128);
}
