//! Block header and the five-root DPoS context digest.

use rlp::{Encodable, RlpStream};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{Address, Bloom, Hash, Timestamp};

/// The roots of the five DPoS context tries, embedded in every header.
///
/// The compact on-wire commitment is [`ContextRoots::digest`]; carrying all
/// five roots lets a peer rebuild the context of any parent header without
/// extra lookups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRoots {
    pub epoch: Hash,
    pub delegate: Hash,
    pub candidate: Hash,
    pub vote: Hash,
    pub mint_cnt: Hash,
}

impl ContextRoots {
    /// The digest binding all five roots.
    ///
    /// Keccak-256 over the concatenated RLP encodings, in the fixed order
    /// epoch, delegate, candidate, vote, mintCnt. Any deviation from this
    /// order forks the chain.
    pub fn digest(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(rlp::encode(&self.epoch));
        hasher.update(rlp::encode(&self.delegate));
        hasher.update(rlp::encode(&self.candidate));
        hasher.update(rlp::encode(&self.vote));
        hasher.update(rlp::encode(&self.mint_cnt));
        Hash::new(hasher.finalize().into())
    }
}

/// A block header.
///
/// The standard account-chain fields plus the DPoS additions: the producer
/// `validator` address, the five-root context commitment, and the two
/// genesis-fixed protocol parameters echoed for peers that only hold the
/// header chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Hash,
    pub uncle_hash: Hash,
    pub validator: Address,
    pub coinbase: Address,
    pub state_root: Hash,
    pub tx_root: Hash,
    pub receipt_root: Hash,
    pub bloom: Bloom,
    pub difficulty: u64,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: Timestamp,
    /// ≥ 32 bytes of vanity followed by a 65-byte seal signature.
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    pub nonce: u64,
    pub dpos_root: ContextRoots,
    pub max_validator_size: u64,
    pub block_interval: u64,
}

impl Header {
    /// The canonical header hash: Keccak-256 of the full RLP encoding,
    /// signature included.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(rlp::encode(self));
        Hash::new(hasher.finalize().into())
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(19);
        s.append(&self.parent_hash);
        s.append(&self.uncle_hash);
        s.append(&self.validator);
        s.append(&self.coinbase);
        s.append(&self.state_root);
        s.append(&self.tx_root);
        s.append(&self.receipt_root);
        s.append(&self.bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time.as_secs());
        s.append(&self.extra);
        s.append(&self.mix_digest);
        s.append(&self.nonce);
        s.append(&self.dpos_root.digest());
        s.append(&self.max_validator_size);
        s.append(&self.block_interval);
    }
}

/// Keccak-256 of the RLP empty list — the uncle hash of every valid header,
/// as uncles are meaningless under DPoS.
pub fn empty_uncle_hash() -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update([0xc0]);
    Hash::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            parent_hash: Hash::new([1; 32]),
            uncle_hash: empty_uncle_hash(),
            validator: Address::new([2; 20]),
            coinbase: Address::new([2; 20]),
            state_root: Hash::new([3; 32]),
            tx_root: Hash::new([4; 32]),
            receipt_root: Hash::new([5; 32]),
            bloom: Bloom::ZERO,
            difficulty: 1,
            number: 7,
            gas_limit: 8_000_000,
            gas_used: 21_000,
            time: Timestamp::new(1_700_000_000),
            extra: vec![0u8; 32 + 65],
            mix_digest: Hash::ZERO,
            nonce: 0,
            dpos_root: ContextRoots::default(),
            max_validator_size: 21,
            block_interval: 10,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let header = sample_header();
        assert_eq!(header.hash(), header.hash());
    }

    #[test]
    fn hash_changes_with_any_field() {
        let header = sample_header();
        let mut other = header.clone();
        other.validator = Address::new([9; 20]);
        assert_ne!(header.hash(), other.hash());

        let mut other = header.clone();
        other.nonce = 1;
        assert_ne!(header.hash(), other.hash());
    }

    #[test]
    fn digest_depends_on_every_root() {
        let base = ContextRoots::default();
        for i in 0..5 {
            let mut roots = base;
            let poked = Hash::new([0xee; 32]);
            match i {
                0 => roots.epoch = poked,
                1 => roots.delegate = poked,
                2 => roots.candidate = poked,
                3 => roots.vote = poked,
                _ => roots.mint_cnt = poked,
            }
            assert_ne!(roots.digest(), base.digest());
        }
    }

    #[test]
    fn digest_order_is_fixed() {
        // Swapping two distinct roots must change the digest: the fold is
        // order-sensitive, not a plain XOR of the five hashes.
        let mut roots = ContextRoots::default();
        roots.epoch = Hash::new([1; 32]);
        roots.delegate = Hash::new([2; 32]);
        let mut swapped = roots;
        std::mem::swap(&mut swapped.epoch, &mut swapped.delegate);
        assert_ne!(roots.digest(), swapped.digest());
    }

    #[test]
    fn empty_uncle_hash_matches_keccak_of_empty_list() {
        // Known Keccak-256 of the one-byte RLP empty list 0xc0.
        let expected = "1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347";
        assert_eq!(empty_uncle_hash().to_string(), expected);
    }
}
