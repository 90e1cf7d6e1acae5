use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use vela_store::MemoryStore;
use vela_trie::{Trie, EMPTY_ROOT};

fn fresh() -> Trie {
    Trie::new(b"prop-", Arc::new(MemoryStore::new()))
}

/// Small keyspace so sequences collide on keys often.
fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..8, 1..6)
}

#[derive(Debug, Clone)]
enum Op {
    Insert(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key_strategy(), prop::collection::vec(1u8..255, 1..8))
            .prop_map(|(k, v)| Op::Insert(k, v)),
        1 => key_strategy().prop_map(Op::Remove),
    ]
}

proptest! {
    /// The trie agrees with a BTreeMap model after any operation sequence,
    /// both through point reads and through full iteration.
    #[test]
    fn agrees_with_map_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut trie = fresh();
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for op in &ops {
            match op {
                Op::Insert(k, v) => {
                    trie.insert(k, v).unwrap();
                    model.insert(k.clone(), v.clone());
                }
                Op::Remove(k) => {
                    trie.remove(k).unwrap();
                    model.remove(k);
                }
            }
        }

        for (k, v) in &model {
            prop_assert_eq!(trie.get(k).unwrap(), Some(v.clone()));
        }
        let iterated: Vec<(Vec<u8>, Vec<u8>)> =
            trie.iter_prefix(&[]).map(|r| r.unwrap()).collect();
        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(iterated, expected);
    }

    /// The root hash is a pure function of the contents: applying the same
    /// insertions in a different order yields the same root.
    #[test]
    fn root_is_content_determined(
        entries in prop::collection::btree_map(key_strategy(), prop::collection::vec(1u8..255, 1..8), 1..20),
        seed in 0u64..u64::MAX,
    ) {
        let ordered: Vec<_> = entries.iter().collect();
        let mut shuffled = ordered.clone();
        // Cheap deterministic shuffle driven by the seed.
        let mut state = seed;
        for i in (1..shuffled.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let mut a = fresh();
        for (k, v) in &ordered {
            a.insert(k, v).unwrap();
        }
        let mut b = fresh();
        for (k, v) in &shuffled {
            b.insert(k, v).unwrap();
        }
        prop_assert_eq!(a.root_hash().unwrap(), b.root_hash().unwrap());
    }

    /// Inserting then removing a batch of keys returns to the prior root.
    #[test]
    fn insert_remove_roundtrip(
        base in prop::collection::btree_map(key_strategy(), prop::collection::vec(1u8..255, 1..8), 0..10),
        extra in prop::collection::btree_map(key_strategy(), prop::collection::vec(1u8..255, 1..8), 1..10),
    ) {
        let mut trie = fresh();
        for (k, v) in &base {
            trie.insert(k, v).unwrap();
        }
        let before = trie.root_hash().unwrap();

        for (k, v) in &extra {
            if !base.contains_key(k) {
                trie.insert(k, v).unwrap();
            }
        }
        for k in extra.keys() {
            if !base.contains_key(k) {
                trie.remove(k).unwrap();
            }
        }
        prop_assert_eq!(trie.root_hash().unwrap(), before);
    }

    /// Commit does not change visible contents or the root.
    #[test]
    fn commit_preserves_view(
        entries in prop::collection::btree_map(key_strategy(), prop::collection::vec(1u8..255, 1..8), 1..15),
    ) {
        let mut trie = fresh();
        for (k, v) in &entries {
            trie.insert(k, v).unwrap();
        }
        let before = trie.root_hash().unwrap();
        let committed = trie.commit().unwrap();
        prop_assert_eq!(before, committed);
        prop_assert_eq!(trie.root_hash().unwrap(), committed);
        for (k, v) in &entries {
            prop_assert_eq!(trie.get(k).unwrap(), Some(v.clone()));
        }
    }

    /// Removing everything returns to the empty root.
    #[test]
    fn full_drain_reaches_empty_root(
        entries in prop::collection::btree_map(key_strategy(), prop::collection::vec(1u8..255, 1..8), 1..15),
    ) {
        let mut trie = fresh();
        for (k, v) in &entries {
            trie.insert(k, v).unwrap();
        }
        for k in entries.keys() {
            trie.remove(k).unwrap();
        }
        prop_assert_eq!(trie.root_hash().unwrap(), EMPTY_ROOT);
    }
}
