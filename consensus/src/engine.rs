//! The DPoS engine: header preparation, sealing and verification.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use lru::LruCache;
use rlp::RlpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use vela_crypto::{keccak256, recover_signer};
use vela_store::KvStore;
use vela_types::{empty_uncle_hash, Address, DposParams, Hash, Header, Timestamp};

use crate::confirmation::ConfirmationTracker;
use crate::context::DposContext;
use crate::election::EpochContext;
use crate::error::DposError;
use crate::mint::update_mint_count;
use crate::slots;
use crate::traits::{AccountState, ChainReader};

/// Fixed number of extra-data prefix bytes reserved for producer vanity.
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the seal signature.
pub const EXTRA_SEAL: usize = 65;

/// Number of recent recovered signers kept in memory.
const INMEMORY_SIGNATURES: usize = 4096;

/// Block reward in raw units credited to the coinbase of every block.
pub const BLOCK_REWARD: u128 = 5_000_000_000_000_000_000;

/// Callback that signs a 32-byte digest on behalf of `address`, returning
/// the 65-byte recoverable signature.
pub type SignerFn = Arc<dyn Fn(Address, &Hash) -> Result<[u8; EXTRA_SEAL], DposError> + Send + Sync>;

struct SignerEntry {
    address: Address,
    sign: SignerFn,
}

/// The consensus engine handle.
///
/// One instance serves a chain; the signer identity is installed with
/// [`Dpos::authorize`] and protected against concurrent sealing.
pub struct Dpos {
    params: DposParams,
    store: Arc<dyn KvStore>,
    signer: RwLock<Option<SignerEntry>>,
    signatures: Mutex<LruCache<Hash, Address>>,
    confirmation: Mutex<ConfirmationTracker>,
    /// Timestamp of block #1, learned on first access; scales the kick-out
    /// threshold while the chain is younger than one epoch.
    first_block_time: OnceLock<Timestamp>,
}

/// Resolve when a signal arrives on `rx`. A closed channel means no signal
/// can ever arrive — pend forever rather than reporting a phantom abort.
async fn signalled(rx: &mut broadcast::Receiver<()>) {
    loop {
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// The digest a producer signs: the header minus the final 65 signature
/// bytes of `extra`, with the five-root digest standing in for the context.
/// Producer and verifier must agree on this tuple exactly.
pub fn sig_hash(header: &Header) -> Result<Hash, DposError> {
    if header.extra.len() < EXTRA_SEAL {
        return Err(DposError::MissingSignature);
    }
    let mut s = RlpStream::new_list(18);
    s.append(&header.parent_hash);
    s.append(&header.uncle_hash);
    s.append(&header.validator);
    s.append(&header.coinbase);
    s.append(&header.state_root);
    s.append(&header.tx_root);
    s.append(&header.receipt_root);
    s.append(&header.bloom);
    s.append(&header.difficulty);
    s.append(&header.number);
    s.append(&header.gas_limit);
    s.append(&header.gas_used);
    s.append(&header.time.as_secs());
    s.append(&header.extra[..header.extra.len() - EXTRA_SEAL].to_vec());
    s.append(&header.mix_digest);
    s.append(&header.nonce);
    s.append(&header.dpos_root.digest());
    s.append(&header.max_validator_size);
    Ok(keccak256(&s.out()))
}

impl Dpos {
    pub fn new(params: DposParams, store: Arc<dyn KvStore>) -> Self {
        let capacity =
            NonZeroUsize::new(INMEMORY_SIGNATURES).expect("signature cache size is non-zero");
        Self {
            params,
            store: Arc::clone(&store),
            signer: RwLock::new(None),
            signatures: Mutex::new(LruCache::new(capacity)),
            confirmation: Mutex::new(ConfirmationTracker::new(store)),
            first_block_time: OnceLock::new(),
        }
    }

    pub fn params(&self) -> &DposParams {
        &self.params
    }

    /// Install the local producer identity and signing callback.
    pub fn authorize(&self, address: Address, sign: SignerFn) -> Result<(), DposError> {
        let mut guard = self
            .signer
            .write()
            .map_err(|_| DposError::LockPoisoned("signer"))?;
        *guard = Some(SignerEntry { address, sign });
        Ok(())
    }

    /// The producer address named in a header.
    pub fn author(&self, header: &Header) -> Address {
        header.validator
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|entry| entry.address))
    }

    /// Shape a header for sealing: cleared nonce, vanity-padded extra with
    /// room for the seal, unit difficulty and the local validator identity.
    pub fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> Result<(), DposError> {
        header.nonce = 0;
        if header.extra.len() < EXTRA_VANITY {
            header.extra.resize(EXTRA_VANITY, 0);
        }
        header.extra.truncate(EXTRA_VANITY);
        header.extra.extend_from_slice(&[0u8; EXTRA_SEAL]);

        if chain.header_by_hash(&header.parent_hash).is_none() {
            return Err(DposError::UnknownAncestor);
        }
        header.difficulty = 1;
        header.validator = self.signer_address().unwrap_or(Address::ZERO);
        Ok(())
    }

    /// Wait for the next slot boundary, then timestamp and sign the header.
    ///
    /// Returns `Ok(None)` without side effects if `stop` fires during the
    /// wait.
    pub async fn seal(
        &self,
        mut header: Header,
        stop: &mut broadcast::Receiver<()>,
    ) -> Result<Option<Header>, DposError> {
        if header.number == 0 {
            return Err(DposError::UnknownBlock);
        }

        let now = Timestamp::now().as_secs();
        let delay = slots::next_slot(now, self.params.block_interval).saturating_sub(now);
        if delay > 0 {
            tokio::select! {
                _ = signalled(stop) => return Ok(None),
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
            }
        }
        header.time = Timestamp::now();

        let (address, sign) = {
            let guard = self
                .signer
                .read()
                .map_err(|_| DposError::LockPoisoned("signer"))?;
            match guard.as_ref() {
                Some(entry) => (entry.address, Arc::clone(&entry.sign)),
                None => return Err(DposError::Signer("no signer authorized".into())),
            }
        };

        let digest = sig_hash(&header)?;
        let signature = sign(address, &digest)?;
        let seal_start = header.extra.len() - EXTRA_SEAL;
        header.extra[seal_start..].copy_from_slice(&signature);
        Ok(Some(header))
    }

    /// Pre-flight for the mining driver: is it worth building on
    /// `last_header` at `now`, and is it the local signer's turn?
    pub fn check_validator(&self, last_header: &Header, now: Timestamp) -> Result<(), DposError> {
        self.check_deadline(last_header, now)?;
        let context = DposContext::from_roots(Arc::clone(&self.store), &last_header.dpos_root)?;
        let validators = context.get_validators()?;
        let expected = slots::expected_validator(&validators, now, &self.params)?;
        match self.signer_address() {
            Some(signer) if !expected.is_zero() && expected == signer => Ok(()),
            _ => Err(DposError::InvalidBlockValidator),
        }
    }

    fn check_deadline(&self, last_header: &Header, now: Timestamp) -> Result<(), DposError> {
        let interval = self.params.block_interval;
        let last = last_header.time.as_secs();
        let next = slots::next_slot(now.as_secs(), interval);
        if last >= next {
            return Err(DposError::MintFutureBlock);
        }
        if last == slots::prev_slot(now.as_secs(), interval) || next - now.as_secs() <= 1 {
            return Ok(());
        }
        Err(DposError::WaitForPrevBlock)
    }

    /// Structural and lineage checks, in a fixed order so peers reject
    /// identically.
    pub fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parent: Option<&Header>,
    ) -> Result<(), DposError> {
        if header.time > Timestamp::now() {
            return Err(DposError::FutureBlock);
        }
        if header.extra.len() < EXTRA_VANITY {
            return Err(DposError::MissingVanity);
        }
        if header.extra.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(DposError::MissingSignature);
        }
        if !header.mix_digest.is_zero() {
            return Err(DposError::InvalidMixDigest);
        }
        if header.difficulty != 1 {
            return Err(DposError::InvalidDifficulty);
        }
        if header.uncle_hash != empty_uncle_hash() {
            return Err(DposError::InvalidUncleHash);
        }

        let stored;
        let parent = match parent {
            Some(parent) => parent,
            None => {
                stored = chain
                    .header_by_hash(&header.parent_hash)
                    .ok_or(DposError::UnknownAncestor)?;
                &stored
            }
        };
        if parent.number + 1 != header.number || parent.hash() != header.parent_hash {
            return Err(DposError::UnknownAncestor);
        }
        if parent.time.as_secs() + self.params.block_interval > header.time.as_secs() {
            return Err(DposError::InvalidTimestamp);
        }
        Ok(())
    }

    /// Verify a batch of headers on a background task.
    ///
    /// One result is emitted per header in submission order; sending on the
    /// returned abort channel stops the worker. Headers after the first are
    /// checked against their in-batch predecessor.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
    ) -> (broadcast::Sender<()>, mpsc::Receiver<Result<(), DposError>>) {
        let (abort_tx, mut abort_rx) = broadcast::channel(1);
        let (results_tx, results_rx) = mpsc::channel(headers.len().max(1));
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            for i in 0..headers.len() {
                let parent = if i > 0 { Some(&headers[i - 1]) } else { None };
                let result = engine.verify_header(chain.as_ref(), &headers[i], parent);
                tokio::select! {
                    // An abort wins over a deliverable result.
                    biased;
                    _ = signalled(&mut abort_rx) => return,
                    sent = results_tx.send(result) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        (abort_tx, results_rx)
    }

    /// Verify a header's seal: the signature must recover to the validator
    /// whose slot covers the header time, and to the address the header
    /// itself names. The two failure modes are surfaced distinctly so peers
    /// can tell a wrong turn from a spoofed validator field.
    pub fn verify_seal(&self, chain: &dyn ChainReader, header: &Header) -> Result<(), DposError> {
        if header.number == 0 {
            return Err(DposError::UnknownBlock);
        }
        let parent = chain
            .header_by_hash(&header.parent_hash)
            .ok_or(DposError::UnknownAncestor)?;

        let context = DposContext::from_roots(Arc::clone(&self.store), &parent.dpos_root)?;
        let validators = context.get_validators()?;
        let expected = slots::expected_validator(&validators, header.time, &self.params)?;

        let signer = self.recover_header_signer(header)?;
        if signer != expected {
            return Err(DposError::InvalidBlockValidator);
        }
        if signer != header.validator {
            return Err(DposError::MismatchSignerAndValidator);
        }

        self.update_confirmed(chain)
    }

    /// Advance the confirmed-block pointer from the current head.
    pub fn update_confirmed(&self, chain: &dyn ChainReader) -> Result<(), DposError> {
        let mut tracker = self
            .confirmation
            .lock()
            .map_err(|_| DposError::LockPoisoned("confirmation"))?;
        tracker.update(chain, &self.params)
    }

    /// The number of the highest confirmed block, if any.
    pub fn confirmed_number(&self) -> Result<Option<u64>, DposError> {
        let tracker = self
            .confirmation
            .lock()
            .map_err(|_| DposError::LockPoisoned("confirmation"))?;
        Ok(tracker.confirmed().map(|header| header.number))
    }

    /// Recover a header's signer from its seal, through the LRU cache.
    fn recover_header_signer(&self, header: &Header) -> Result<Address, DposError> {
        let hash = header.hash();
        {
            let mut cache = self
                .signatures
                .lock()
                .map_err(|_| DposError::LockPoisoned("signatures"))?;
            if let Some(address) = cache.get(&hash) {
                return Ok(*address);
            }
        }

        if header.extra.len() < EXTRA_SEAL {
            return Err(DposError::MissingSignature);
        }
        let mut seal = [0u8; EXTRA_SEAL];
        seal.copy_from_slice(&header.extra[header.extra.len() - EXTRA_SEAL..]);
        let signer = recover_signer(&sig_hash(header)?, &seal)?;

        let mut cache = self
            .signatures
            .lock()
            .map_err(|_| DposError::LockPoisoned("signatures"))?;
        cache.put(hash, signer);
        Ok(signer)
    }

    /// Finalize a block under construction: credit the block reward, run
    /// the election, record the production count and bind the committed
    /// five-root digest into the header.
    pub fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut dyn AccountState,
        context: &mut DposContext,
    ) -> Result<(), DposError> {
        state.add_balance(&header.coinbase, BLOCK_REWARD);

        if self.first_block_time.get().is_none() {
            if let Some(first) = chain.header_by_number(1) {
                let _ = self.first_block_time.set(first.time);
            }
        }

        let genesis = chain.header_by_number(0).ok_or(DposError::UnknownBlock)?;
        let parent = chain
            .header_by_hash(&header.parent_hash)
            .ok_or(DposError::UnknownAncestor)?;

        let mut epoch_context = EpochContext {
            timestamp: header.time,
            context: &mut *context,
            state: &*state,
        };
        epoch_context.try_elect(
            &self.params,
            &genesis,
            &parent,
            self.first_block_time.get().copied(),
        )?;

        update_mint_count(parent.time, header.time, header.validator, context)?;

        header.dpos_root = context.commit()?;
        debug!(
            number = header.number,
            root = %header.dpos_root.digest(),
            "finalized dpos context"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vela_crypto::{sign_hash, KeyPair};
    use vela_store::MemoryStore;
    use vela_types::{Bloom, ContextRoots};

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn template(number: u64, time: u64) -> Header {
        Header {
            parent_hash: Hash::ZERO,
            uncle_hash: empty_uncle_hash(),
            validator: Address::ZERO,
            coinbase: Address::ZERO,
            state_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            receipt_root: Hash::ZERO,
            bloom: Bloom::ZERO,
            difficulty: 1,
            number,
            gas_limit: 0,
            gas_used: 0,
            time: Timestamp::new(time),
            extra: vec![0u8; EXTRA_VANITY + EXTRA_SEAL],
            mix_digest: Hash::ZERO,
            nonce: 0,
            dpos_root: ContextRoots::default(),
            max_validator_size: 3,
            block_interval: 10,
        }
    }

    #[derive(Default)]
    struct ChainMap {
        by_hash: HashMap<Hash, Header>,
        by_number: HashMap<u64, Hash>,
        head: Hash,
    }

    impl ChainMap {
        fn add(&mut self, header: Header) -> Hash {
            let hash = header.hash();
            self.by_number.insert(header.number, hash);
            self.by_hash.insert(hash, header);
            self.head = hash;
            hash
        }
    }

    impl ChainReader for ChainMap {
        fn header_by_hash(&self, hash: &Hash) -> Option<Header> {
            self.by_hash.get(hash).cloned()
        }

        fn header_by_number(&self, number: u64) -> Option<Header> {
            self.by_number
                .get(&number)
                .and_then(|h| self.by_hash.get(h))
                .cloned()
        }

        fn current_header(&self) -> Header {
            self.by_hash[&self.head].clone()
        }
    }

    fn signer_fn(keypair: Arc<KeyPair>) -> SignerFn {
        Arc::new(move |_, digest| {
            sign_hash(keypair.secret(), digest).map_err(DposError::from)
        })
    }

    fn engine(interval: u64) -> Dpos {
        let params = DposParams::new(interval, 3).unwrap();
        Dpos::new(params, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn prepare_shapes_the_header() {
        let engine = engine(10);
        let keypair = Arc::new(KeyPair::generate());
        engine
            .authorize(keypair.address(), signer_fn(Arc::clone(&keypair)))
            .unwrap();

        let mut chain = ChainMap::default();
        let genesis = template(0, 0);
        let genesis_hash = chain.add(genesis);

        let mut header = template(1, 1_000);
        header.parent_hash = genesis_hash;
        header.extra = b"short".to_vec();
        header.nonce = 99;
        header.difficulty = 7;
        engine.prepare(&chain, &mut header).unwrap();

        assert_eq!(header.nonce, 0);
        assert_eq!(header.difficulty, 1);
        assert_eq!(header.extra.len(), EXTRA_VANITY + EXTRA_SEAL);
        assert_eq!(header.validator, keypair.address());
    }

    #[test]
    fn prepare_without_parent_fails() {
        let engine = engine(10);
        let chain = ChainMap::default();
        let mut header = template(1, 1_000);
        header.parent_hash = Hash::new([9; 32]);
        assert!(matches!(
            engine.prepare(&chain, &mut header),
            Err(DposError::UnknownAncestor)
        ));
    }

    #[test]
    fn sig_hash_requires_seal_room() {
        let mut header = template(1, 1_000);
        header.extra = vec![0u8; EXTRA_SEAL - 1];
        assert!(matches!(sig_hash(&header), Err(DposError::MissingSignature)));
    }

    #[test]
    fn sig_hash_ignores_the_seal_bytes() {
        let header = template(1, 1_000);
        let mut sealed = header.clone();
        let len = sealed.extra.len();
        sealed.extra[len - 1] = 0xff;
        assert_eq!(sig_hash(&header).unwrap(), sig_hash(&sealed).unwrap());
    }

    #[test]
    fn verify_header_rejects_malformed_headers() {
        let engine = engine(10);
        let mut chain = ChainMap::default();
        let genesis_hash = chain.add(template(0, 0));

        let mut valid = template(1, 1_000);
        valid.parent_hash = genesis_hash;
        engine.verify_header(&chain, &valid, None).unwrap();

        let mut future = valid.clone();
        future.time = Timestamp::new(Timestamp::now().as_secs() + 3_600);
        assert!(matches!(
            engine.verify_header(&chain, &future, None),
            Err(DposError::FutureBlock)
        ));

        let mut no_vanity = valid.clone();
        no_vanity.extra = vec![0u8; EXTRA_VANITY - 1];
        assert!(matches!(
            engine.verify_header(&chain, &no_vanity, None),
            Err(DposError::MissingVanity)
        ));

        let mut no_seal = valid.clone();
        no_seal.extra = vec![0u8; EXTRA_VANITY + EXTRA_SEAL - 1];
        assert!(matches!(
            engine.verify_header(&chain, &no_seal, None),
            Err(DposError::MissingSignature)
        ));

        let mut bad_mix = valid.clone();
        bad_mix.mix_digest = Hash::new([1; 32]);
        assert!(matches!(
            engine.verify_header(&chain, &bad_mix, None),
            Err(DposError::InvalidMixDigest)
        ));

        let mut bad_difficulty = valid.clone();
        bad_difficulty.difficulty = 2;
        assert!(matches!(
            engine.verify_header(&chain, &bad_difficulty, None),
            Err(DposError::InvalidDifficulty)
        ));

        let mut bad_uncles = valid.clone();
        bad_uncles.uncle_hash = Hash::ZERO;
        assert!(matches!(
            engine.verify_header(&chain, &bad_uncles, None),
            Err(DposError::InvalidUncleHash)
        ));

        let mut orphan = valid.clone();
        orphan.parent_hash = Hash::new([7; 32]);
        assert!(matches!(
            engine.verify_header(&chain, &orphan, None),
            Err(DposError::UnknownAncestor)
        ));

        let mut too_soon = valid.clone();
        too_soon.time = Timestamp::new(5);
        assert!(matches!(
            engine.verify_header(&chain, &too_soon, None),
            Err(DposError::InvalidTimestamp)
        ));
    }

    #[test]
    fn check_deadline_classifies_timing() {
        let engine = engine(10);

        // Last block already at or past the next slot: a future mint.
        let last = template(1, 1_000);
        assert!(matches!(
            engine.check_deadline(&last, Timestamp::new(995)),
            Err(DposError::MintFutureBlock)
        ));

        // Last block sealed exactly at the previous slot: proceed.
        let last = template(1, 990);
        engine.check_deadline(&last, Timestamp::new(995)).unwrap();

        // Within one second of the next slot: proceed.
        let last = template(1, 970);
        engine.check_deadline(&last, Timestamp::new(999)).unwrap();

        // Otherwise the previous slot's block has not arrived yet.
        let last = template(1, 970);
        assert!(matches!(
            engine.check_deadline(&last, Timestamp::new(995)),
            Err(DposError::WaitForPrevBlock)
        ));
    }

    /// Build a store + chain where `validators` is the committed epoch list
    /// and genesis is the head.
    fn seeded_chain(validators: &[Address]) -> (Arc<MemoryStore>, ChainMap, ContextRoots) {
        let store = Arc::new(MemoryStore::new());
        let mut context = DposContext::new(Arc::clone(&store) as Arc<dyn KvStore>);
        context.set_validators(validators).unwrap();
        let roots = context.commit().unwrap();

        let mut chain = ChainMap::default();
        let mut genesis = template(0, 0);
        genesis.dpos_root = roots;
        chain.add(genesis);
        (store, chain, roots)
    }

    #[test]
    fn verify_seal_accepts_the_scheduled_signer() {
        let keypair = Arc::new(KeyPair::generate());
        let (store, chain, roots) = seeded_chain(&[keypair.address()]);
        let engine = Dpos::new(DposParams::new(10, 3).unwrap(), store);

        let genesis_hash = chain.by_number[&0];
        let mut header = template(1, 1_000);
        header.parent_hash = genesis_hash;
        header.validator = keypair.address();
        header.dpos_root = roots;
        let digest = sig_hash(&header).unwrap();
        let seal = sign_hash(keypair.secret(), &digest).unwrap();
        let start = header.extra.len() - EXTRA_SEAL;
        header.extra[start..].copy_from_slice(&seal);

        engine.verify_seal(&chain, &header).unwrap();
        // Second verification is served from the signature cache.
        engine.verify_seal(&chain, &header).unwrap();
    }

    #[test]
    fn verify_seal_rejects_spoofed_validator_field() {
        let keypair = Arc::new(KeyPair::generate());
        let (store, chain, roots) = seeded_chain(&[keypair.address()]);
        let engine = Dpos::new(DposParams::new(10, 3).unwrap(), store);

        let genesis_hash = chain.by_number[&0];
        let mut header = template(1, 1_000);
        header.parent_hash = genesis_hash;
        // The scheduled producer signs a header naming someone else.
        header.validator = addr(0x99);
        header.dpos_root = roots;
        let digest = sig_hash(&header).unwrap();
        let seal = sign_hash(keypair.secret(), &digest).unwrap();
        let start = header.extra.len() - EXTRA_SEAL;
        header.extra[start..].copy_from_slice(&seal);

        assert!(matches!(
            engine.verify_seal(&chain, &header),
            Err(DposError::MismatchSignerAndValidator)
        ));
    }

    #[test]
    fn verify_seal_rejects_out_of_turn_signer() {
        let keypair = Arc::new(KeyPair::generate());
        let scheduled = addr(0x55);
        let (store, chain, roots) = seeded_chain(&[scheduled]);
        let engine = Dpos::new(DposParams::new(10, 3).unwrap(), store);

        let genesis_hash = chain.by_number[&0];
        let mut header = template(1, 1_000);
        header.parent_hash = genesis_hash;
        header.validator = keypair.address();
        header.dpos_root = roots;
        let digest = sig_hash(&header).unwrap();
        let seal = sign_hash(keypair.secret(), &digest).unwrap();
        let start = header.extra.len() - EXTRA_SEAL;
        header.extra[start..].copy_from_slice(&seal);

        assert!(matches!(
            engine.verify_seal(&chain, &header),
            Err(DposError::InvalidBlockValidator)
        ));
    }

    #[test]
    fn verify_seal_rejects_genesis() {
        let engine = engine(10);
        let chain = ChainMap::default();
        assert!(matches!(
            engine.verify_seal(&chain, &template(0, 0)),
            Err(DposError::UnknownBlock)
        ));
    }

    #[tokio::test]
    async fn seal_signs_at_the_slot_boundary() {
        // A one-second interval makes every second a slot boundary, so the
        // seal never has to wait.
        let engine = engine(1);
        let keypair = Arc::new(KeyPair::generate());
        engine
            .authorize(keypair.address(), signer_fn(Arc::clone(&keypair)))
            .unwrap();

        let mut header = template(1, 0);
        header.validator = keypair.address();
        let (_stop_tx, mut stop_rx) = broadcast::channel(1);
        let sealed = engine.seal(header, &mut stop_rx).await.unwrap().unwrap();

        let digest = sig_hash(&sealed).unwrap();
        let mut seal = [0u8; EXTRA_SEAL];
        seal.copy_from_slice(&sealed.extra[sealed.extra.len() - EXTRA_SEAL..]);
        assert_eq!(recover_signer(&digest, &seal).unwrap(), keypair.address());
    }

    #[tokio::test]
    async fn seal_aborts_on_stop_signal() {
        // An hour-long interval guarantees a wait to interrupt, except in
        // the one second per hour where now sits exactly on the boundary.
        if Timestamp::now().as_secs() % 3_600 == 0 {
            return;
        }
        let engine = Arc::new(engine(3_600));
        let keypair = Arc::new(KeyPair::generate());
        engine
            .authorize(keypair.address(), signer_fn(Arc::clone(&keypair)))
            .unwrap();

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.seal(template(1, 0), &mut stop_rx).await })
        };
        stop_tx.send(()).unwrap();
        assert!(task.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn seal_rejects_genesis() {
        let engine = engine(1);
        let (_stop_tx, mut stop_rx) = broadcast::channel(1);
        assert!(matches!(
            engine.seal(template(0, 0), &mut stop_rx).await,
            Err(DposError::UnknownBlock)
        ));
    }

    #[tokio::test]
    async fn verify_headers_emits_results_in_order() {
        let engine = Arc::new(engine(10));
        let mut chain = ChainMap::default();
        let genesis_hash = chain.add(template(0, 0));

        let mut h1 = template(1, 1_000);
        h1.parent_hash = genesis_hash;
        let mut h2 = template(2, 1_010);
        h2.parent_hash = h1.hash();
        let mut h3 = template(3, 1_015); // violates the minimum spacing
        h3.parent_hash = h2.hash();

        let (abort_tx, mut results) =
            engine.verify_headers(Arc::new(chain), vec![h1, h2, h3]);
        // Dropping the abort handle must not cancel the batch.
        drop(abort_tx);

        assert!(results.recv().await.unwrap().is_ok());
        assert!(results.recv().await.unwrap().is_ok());
        assert!(matches!(
            results.recv().await.unwrap(),
            Err(DposError::InvalidTimestamp)
        ));
        assert!(results.recv().await.is_none());
    }

    #[tokio::test]
    async fn verify_headers_stops_on_abort() {
        let engine = Arc::new(engine(10));
        let mut chain = ChainMap::default();
        let genesis_hash = chain.add(template(0, 0));

        let mut headers = Vec::new();
        let mut parent_hash = genesis_hash;
        for i in 1..=64u64 {
            let mut header = template(i, 1_000 + i * 10);
            header.parent_hash = parent_hash;
            parent_hash = header.hash();
            headers.push(header);
        }

        let (abort_tx, mut results) = engine.verify_headers(Arc::new(chain), headers);
        // On the current-thread test runtime the worker has not run yet, so
        // an abort sent now is seen before any result is emitted.
        abort_tx.send(()).unwrap();
        assert!(results.recv().await.is_none());
    }
}
