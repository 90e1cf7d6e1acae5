//! Ordered iteration over a key prefix.

use crate::error::TrieError;
use crate::nibbles::nibbles_to_bytes;
use crate::node::{Node, NodeHandle};
use crate::trie::Trie;

/// Iterator over `(key, value)` pairs under a key prefix, in lexicographic
/// key order. Errors (a missing or corrupt node) are yielded once, after
/// which the iterator is exhausted.
pub struct PrefixIter<'a> {
    trie: &'a Trie,
    prefix: Vec<u8>,
    /// Work stack of `(handle, key nibbles accumulated above the handle)`,
    /// children pushed high-nibble-first so pops come out in order.
    stack: Vec<(NodeHandle, Vec<u8>)>,
    failed: bool,
}

impl<'a> PrefixIter<'a> {
    pub(crate) fn new(trie: &'a Trie, root: Option<NodeHandle>, prefix: Vec<u8>) -> Self {
        let stack = match root {
            Some(handle) => vec![(handle, Vec::new())],
            None => Vec::new(),
        };
        Self {
            trie,
            prefix,
            stack,
            failed: false,
        }
    }
}

/// Whether a node at `path` can still hold keys under `prefix` — i.e. the
/// shorter of the two is a prefix of the other.
fn viable(path: &[u8], prefix: &[u8]) -> bool {
    let n = path.len().min(prefix.len());
    path[..n] == prefix[..n]
}

/// Whether a complete key at `path` lies under `prefix`.
fn covered(path: &[u8], prefix: &[u8]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

impl Iterator for PrefixIter<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some((handle, path)) = self.stack.pop() {
            let node = match self.trie.resolve(&handle) {
                Ok(node) => node,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            };
            match &*node {
                Node::Leaf { path: rest, value } => {
                    let mut full = path;
                    full.extend_from_slice(rest);
                    if covered(&full, &self.prefix) {
                        debug_assert!(full.len() % 2 == 0);
                        return Some(Ok((nibbles_to_bytes(&full), value.clone())));
                    }
                }
                Node::Extension { path: rest, child } => {
                    let mut full = path;
                    full.extend_from_slice(rest);
                    if viable(&full, &self.prefix) {
                        self.stack.push((child.clone(), full));
                    }
                }
                Node::Branch { children, value } => {
                    for i in (0..children.len()).rev() {
                        if let Some(child) = &children[i] {
                            let mut sub = path.clone();
                            sub.push(i as u8);
                            if viable(&sub, &self.prefix) {
                                self.stack.push((child.clone(), sub));
                            }
                        }
                    }
                    if let Some(value) = value {
                        if covered(&path, &self.prefix) {
                            debug_assert!(path.len() % 2 == 0);
                            return Some(Ok((nibbles_to_bytes(&path), value.clone())));
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vela_store::MemoryStore;

    fn build() -> Trie {
        let mut trie = Trie::new(b"it-", Arc::new(MemoryStore::new()));
        trie.insert(b"aa/1", b"v1").unwrap();
        trie.insert(b"aa/2", b"v2").unwrap();
        trie.insert(b"aa/3", b"v3").unwrap();
        trie.insert(b"ab/1", b"w1").unwrap();
        trie.insert(b"b", b"x").unwrap();
        trie
    }

    fn collect(trie: &Trie, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        trie.iter_prefix(prefix).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn full_iteration_in_key_order() {
        let trie = build();
        let all = collect(&trie, b"");
        let keys: Vec<&[u8]> = all.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"aa/1"[..], b"aa/2", b"aa/3", b"ab/1", b"b"]);
    }

    #[test]
    fn prefix_restricts_results() {
        let trie = build();
        let under_aa = collect(&trie, b"aa/");
        assert_eq!(under_aa.len(), 3);
        assert!(under_aa.iter().all(|(k, _)| k.starts_with(b"aa/")));

        assert_eq!(collect(&trie, b"zz").len(), 0);
    }

    #[test]
    fn prefix_matching_exact_key_includes_it() {
        let trie = build();
        let exact = collect(&trie, b"b");
        assert_eq!(exact, vec![(b"b".to_vec(), b"x".to_vec())]);
    }

    #[test]
    fn iteration_reads_through_committed_nodes() {
        let mut trie = build();
        trie.commit().unwrap();
        let all = collect(&trie, b"aa/");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].1, b"v1".to_vec());
    }

    #[test]
    fn empty_trie_yields_nothing() {
        let trie = Trie::new(b"it-", Arc::new(MemoryStore::new()));
        assert_eq!(trie.iter_prefix(b"").count(), 0);
    }
}
