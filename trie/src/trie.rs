//! The authenticated trie.

use std::sync::Arc;

use rlp::RlpStream;
use vela_crypto::keccak256;
use vela_store::KvStore;
use vela_types::Hash;

use crate::error::TrieError;
use crate::iter::PrefixIter;
use crate::nibbles::{bytes_to_nibbles, common_prefix_len, hp_encode};
use crate::node::{decode_node, mem_node, Node, NodeHandle};

/// Root of the empty trie: Keccak-256 of the RLP empty string.
pub const EMPTY_ROOT: Hash = Hash::new([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
    0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
    0xb4, 0x21,
]);

/// Outcome of a recursive removal.
enum Removed {
    /// The key is not present; the subtree is unchanged.
    NotFound,
    /// The subtree became empty.
    Empty,
    /// The subtree was rebuilt.
    Replaced(NodeHandle),
}

/// An authenticated key-value trie over a shared backing store.
///
/// `Clone` is the snapshot primitive: the clone shares committed nodes
/// through the store and in-memory nodes through `Arc`, and every mutation
/// rebuilds only the touched path.
#[derive(Clone)]
pub struct Trie {
    prefix: &'static [u8],
    store: Arc<dyn KvStore>,
    root: Option<NodeHandle>,
}

impl Trie {
    /// Open an empty trie whose nodes persist under `prefix` in `store`.
    pub fn new(prefix: &'static [u8], store: Arc<dyn KvStore>) -> Self {
        Self {
            prefix,
            store,
            root: None,
        }
    }

    /// Rehydrate a trie from a previously committed root.
    ///
    /// The zero hash and [`EMPTY_ROOT`] both denote the empty trie; any
    /// other root must be resolvable in the store.
    pub fn open(
        prefix: &'static [u8],
        store: Arc<dyn KvStore>,
        root: Hash,
    ) -> Result<Self, TrieError> {
        if root == EMPTY_ROOT || root.is_zero() {
            return Ok(Self::new(prefix, store));
        }
        let trie = Self {
            prefix,
            store,
            root: Some(NodeHandle::Hash(root)),
        };
        if !trie.store.contains(&trie.node_key(&root))? {
            return Err(TrieError::MissingNode(root));
        }
        Ok(trie)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Read the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let nibbles = bytes_to_nibbles(key);
        let mut handle = match &self.root {
            Some(h) => h.clone(),
            None => return Ok(None),
        };
        let mut path: &[u8] = &nibbles;
        loop {
            let node = self.resolve(&handle)?;
            match &*node {
                Node::Leaf { path: lp, value } => {
                    return Ok((lp.as_slice() == path).then(|| value.clone()));
                }
                Node::Extension { path: ep, child } => {
                    if path.len() >= ep.len() && &path[..ep.len()] == ep.as_slice() {
                        path = &path[ep.len()..];
                        handle = child.clone();
                    } else {
                        return Ok(None);
                    }
                }
                Node::Branch { children, value } => {
                    if path.is_empty() {
                        return Ok(value.clone());
                    }
                    match &children[path[0] as usize] {
                        Some(child) => {
                            handle = child.clone();
                            path = &path[1..];
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &[u8]) -> Result<bool, TrieError> {
        Ok(self.get(key)?.is_some())
    }

    /// Store `value` under `key`. An empty value removes the key.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<(), TrieError> {
        if value.is_empty() {
            return self.remove(key);
        }
        let nibbles = bytes_to_nibbles(key);
        let new_root = self.insert_node(self.root.as_ref(), &nibbles, value.to_vec())?;
        self.root = Some(new_root);
        Ok(())
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let nibbles = bytes_to_nibbles(key);
        let root = match &self.root {
            Some(h) => h.clone(),
            None => return Ok(()),
        };
        match self.remove_node(&root, &nibbles)? {
            Removed::NotFound => {}
            Removed::Empty => self.root = None,
            Removed::Replaced(handle) => self.root = Some(handle),
        }
        Ok(())
    }

    /// The current root hash, computed over the in-memory state. Pure; does
    /// not touch the backing store for dirty nodes.
    pub fn root_hash(&self) -> Result<Hash, TrieError> {
        match &self.root {
            None => Ok(EMPTY_ROOT),
            Some(handle) => self.hash_node(handle, false),
        }
    }

    /// Flush every dirty node to the backing store and return the root.
    ///
    /// After a commit the trie reads back through the store; the visible
    /// contents are unchanged.
    pub fn commit(&mut self) -> Result<Hash, TrieError> {
        let hash = match &self.root {
            None => return Ok(EMPTY_ROOT),
            Some(handle) => self.hash_node(handle, true)?,
        };
        self.root = Some(NodeHandle::Hash(hash));
        Ok(hash)
    }

    /// Iterate `(key, value)` pairs whose keys start with `key_prefix`, in
    /// lexicographic key order.
    pub fn iter_prefix(&self, key_prefix: &[u8]) -> PrefixIter<'_> {
        PrefixIter::new(self, self.root.clone(), bytes_to_nibbles(key_prefix))
    }

    pub(crate) fn node_key(&self, hash: &Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + 32);
        key.extend_from_slice(self.prefix);
        key.extend_from_slice(hash.as_bytes());
        key
    }

    pub(crate) fn resolve(&self, handle: &NodeHandle) -> Result<Arc<Node>, TrieError> {
        match handle {
            NodeHandle::InMemory(node) => Ok(Arc::clone(node)),
            NodeHandle::Hash(hash) => {
                let bytes = self
                    .store
                    .get(&self.node_key(hash))?
                    .ok_or(TrieError::MissingNode(*hash))?;
                Ok(Arc::new(decode_node(&bytes)?))
            }
        }
    }

    fn insert_node(
        &self,
        handle: Option<&NodeHandle>,
        path: &[u8],
        value: Vec<u8>,
    ) -> Result<NodeHandle, TrieError> {
        let Some(handle) = handle else {
            return Ok(mem_node(Node::Leaf {
                path: path.to_vec(),
                value,
            }));
        };
        let node = self.resolve(handle)?;
        let new_node = match &*node {
            Node::Leaf {
                path: lp,
                value: lv,
            } => {
                let common = common_prefix_len(lp, path);
                if common == lp.len() && common == path.len() {
                    Node::Leaf {
                        path: path.to_vec(),
                        value,
                    }
                } else {
                    let mut children: [Option<NodeHandle>; 16] = Default::default();
                    let mut branch_value = None;
                    if common == lp.len() {
                        branch_value = Some(lv.clone());
                    } else {
                        children[lp[common] as usize] = Some(mem_node(Node::Leaf {
                            path: lp[common + 1..].to_vec(),
                            value: lv.clone(),
                        }));
                    }
                    if common == path.len() {
                        branch_value = Some(value);
                    } else {
                        children[path[common] as usize] = Some(mem_node(Node::Leaf {
                            path: path[common + 1..].to_vec(),
                            value,
                        }));
                    }
                    self.wrap_branch(children, branch_value, &path[..common])
                }
            }
            Node::Extension { path: ep, child } => {
                let common = common_prefix_len(ep, path);
                if common == ep.len() {
                    let new_child = self.insert_node(Some(child), &path[common..], value)?;
                    Node::Extension {
                        path: ep.clone(),
                        child: new_child,
                    }
                } else {
                    let mut children: [Option<NodeHandle>; 16] = Default::default();
                    let mut branch_value = None;
                    let ext_rest = &ep[common..];
                    let sub = if ext_rest.len() > 1 {
                        mem_node(Node::Extension {
                            path: ext_rest[1..].to_vec(),
                            child: child.clone(),
                        })
                    } else {
                        child.clone()
                    };
                    children[ext_rest[0] as usize] = Some(sub);
                    if common == path.len() {
                        branch_value = Some(value);
                    } else {
                        children[path[common] as usize] = Some(mem_node(Node::Leaf {
                            path: path[common + 1..].to_vec(),
                            value,
                        }));
                    }
                    self.wrap_branch(children, branch_value, &path[..common])
                }
            }
            Node::Branch { children, value: bv } => {
                if path.is_empty() {
                    Node::Branch {
                        children: children.clone(),
                        value: Some(value),
                    }
                } else {
                    let idx = path[0] as usize;
                    let new_child = self.insert_node(children[idx].as_ref(), &path[1..], value)?;
                    let mut children = children.clone();
                    children[idx] = Some(new_child);
                    Node::Branch {
                        children,
                        value: bv.clone(),
                    }
                }
            }
        };
        Ok(mem_node(new_node))
    }

    /// Wrap a freshly built branch in an extension when the split point sits
    /// below a shared path segment.
    fn wrap_branch(
        &self,
        children: [Option<NodeHandle>; 16],
        value: Option<Vec<u8>>,
        shared: &[u8],
    ) -> Node {
        let branch = Node::Branch { children, value };
        if shared.is_empty() {
            branch
        } else {
            Node::Extension {
                path: shared.to_vec(),
                child: mem_node(branch),
            }
        }
    }

    fn remove_node(&self, handle: &NodeHandle, path: &[u8]) -> Result<Removed, TrieError> {
        let node = self.resolve(handle)?;
        match &*node {
            Node::Leaf { path: lp, .. } => {
                if lp.as_slice() == path {
                    Ok(Removed::Empty)
                } else {
                    Ok(Removed::NotFound)
                }
            }
            Node::Extension { path: ep, child } => {
                if path.len() < ep.len() || &path[..ep.len()] != ep.as_slice() {
                    return Ok(Removed::NotFound);
                }
                match self.remove_node(child, &path[ep.len()..])? {
                    Removed::NotFound => Ok(Removed::NotFound),
                    Removed::Empty => Ok(Removed::Empty),
                    Removed::Replaced(new_child) => {
                        // Re-establish the invariant that extensions point
                        // at branches: merge path segments otherwise.
                        let merged = match &*self.resolve(&new_child)? {
                            Node::Leaf { path: sp, value } => Node::Leaf {
                                path: join_paths(ep, sp),
                                value: value.clone(),
                            },
                            Node::Extension {
                                path: sp,
                                child: sub,
                            } => Node::Extension {
                                path: join_paths(ep, sp),
                                child: sub.clone(),
                            },
                            Node::Branch { .. } => Node::Extension {
                                path: ep.clone(),
                                child: new_child,
                            },
                        };
                        Ok(Removed::Replaced(mem_node(merged)))
                    }
                }
            }
            Node::Branch { children, value } => {
                let mut children = children.clone();
                let mut value = value.clone();
                if path.is_empty() {
                    if value.is_none() {
                        return Ok(Removed::NotFound);
                    }
                    value = None;
                } else {
                    let idx = path[0] as usize;
                    let Some(child) = &children[idx] else {
                        return Ok(Removed::NotFound);
                    };
                    match self.remove_node(child, &path[1..])? {
                        Removed::NotFound => return Ok(Removed::NotFound),
                        Removed::Empty => children[idx] = None,
                        Removed::Replaced(handle) => {
                            children[idx] = Some(handle);
                            return Ok(Removed::Replaced(mem_node(Node::Branch {
                                children,
                                value,
                            })));
                        }
                    }
                }
                self.collapse_branch(children, value)
            }
        }
    }

    /// Collapse a branch that may have dropped below two occupants.
    fn collapse_branch(
        &self,
        children: [Option<NodeHandle>; 16],
        value: Option<Vec<u8>>,
    ) -> Result<Removed, TrieError> {
        let (first, multiple) = {
            let mut occupied = children
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.clone().map(|c| (i, c)));
            let first = occupied.next();
            (first, occupied.next().is_some())
        };

        match first {
            None => match value {
                None => Ok(Removed::Empty),
                Some(v) => Ok(Removed::Replaced(mem_node(Node::Leaf {
                    path: Vec::new(),
                    value: v,
                }))),
            },
            Some((idx, child)) if !multiple && value.is_none() => {
                // Single remaining child: absorb it. The child may still be
                // committed-only, so this resolve can surface MissingNode.
                let merged = match &*self.resolve(&child)? {
                    Node::Leaf { path, value } => Node::Leaf {
                        path: join_nibble(idx as u8, path),
                        value: value.clone(),
                    },
                    Node::Extension { path, child: sub } => Node::Extension {
                        path: join_nibble(idx as u8, path),
                        child: sub.clone(),
                    },
                    Node::Branch { .. } => Node::Extension {
                        path: vec![idx as u8],
                        child,
                    },
                };
                Ok(Removed::Replaced(mem_node(merged)))
            }
            Some(_) => Ok(Removed::Replaced(mem_node(Node::Branch {
                children,
                value,
            }))),
        }
    }

    fn hash_node(&self, handle: &NodeHandle, persist: bool) -> Result<Hash, TrieError> {
        match handle {
            NodeHandle::Hash(hash) => Ok(*hash),
            NodeHandle::InMemory(node) => {
                let encoded = self.encode_node(node, persist)?;
                let hash = keccak256(&encoded);
                if persist {
                    self.store.put(&self.node_key(&hash), &encoded)?;
                }
                Ok(hash)
            }
        }
    }

    fn encode_node(&self, node: &Node, persist: bool) -> Result<Vec<u8>, TrieError> {
        let mut s = RlpStream::new();
        match node {
            Node::Leaf { path, value } => {
                s.begin_list(2);
                s.append(&hp_encode(path, true));
                s.append(value);
            }
            Node::Extension { path, child } => {
                let child_hash = self.hash_node(child, persist)?;
                s.begin_list(2);
                s.append(&hp_encode(path, false));
                s.append(&child_hash);
            }
            Node::Branch { children, value } => {
                s.begin_list(17);
                for child in children {
                    match child {
                        Some(handle) => {
                            let hash = self.hash_node(handle, persist)?;
                            s.append(&hash);
                        }
                        None => {
                            s.append_empty_data();
                        }
                    }
                }
                match value {
                    Some(v) => {
                        s.append(v);
                    }
                    None => {
                        s.append_empty_data();
                    }
                }
            }
        }
        Ok(s.out().to_vec())
    }
}

fn join_paths(head: &[u8], tail: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(head.len() + tail.len());
    path.extend_from_slice(head);
    path.extend_from_slice(tail);
    path
}

fn join_nibble(head: u8, tail: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(1 + tail.len());
    path.push(head);
    path.extend_from_slice(tail);
    path
}
