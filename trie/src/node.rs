//! Trie node representation and codec.

use std::sync::Arc;

use rlp::Rlp;
use vela_types::Hash;

use crate::error::TrieError;
use crate::nibbles::hp_decode;

/// Reference to a child node: either committed (addressed by hash in the
/// backing store) or held in memory as part of the dirty working set.
#[derive(Clone, Debug)]
pub enum NodeHandle {
    Hash(Hash),
    InMemory(Arc<Node>),
}

/// A trie node. Paths are nibble sequences.
///
/// Invariant maintained by all mutations: an extension's child is always a
/// branch, and no branch has fewer than two occupants (children plus value).
#[derive(Clone, Debug)]
pub enum Node {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: NodeHandle,
    },
    Branch {
        children: [Option<NodeHandle>; 16],
        value: Option<Vec<u8>>,
    },
}

pub(crate) fn mem_node(node: Node) -> NodeHandle {
    NodeHandle::InMemory(Arc::new(node))
}

fn corrupt(err: rlp::DecoderError) -> TrieError {
    TrieError::Corrupt(err.to_string())
}

/// Decode a stored node. Two-item lists are leaves or extensions (the
/// hex-prefix flag disambiguates); seventeen-item lists are branches, where
/// an empty string marks a vacant slot.
pub(crate) fn decode_node(bytes: &[u8]) -> Result<Node, TrieError> {
    let rlp = Rlp::new(bytes);
    match rlp.item_count().map_err(corrupt)? {
        2 => {
            let path_bytes = rlp.at(0).map_err(corrupt)?.data().map_err(corrupt)?;
            let (path, is_leaf) = hp_decode(path_bytes)
                .ok_or_else(|| TrieError::Corrupt("bad hex-prefix path".into()))?;
            let payload = rlp.at(1).map_err(corrupt)?.data().map_err(corrupt)?;
            if is_leaf {
                Ok(Node::Leaf {
                    path,
                    value: payload.to_vec(),
                })
            } else {
                let child = Hash::from_slice(payload)
                    .ok_or_else(|| TrieError::Corrupt("extension child is not a hash".into()))?;
                Ok(Node::Extension {
                    path,
                    child: NodeHandle::Hash(child),
                })
            }
        }
        17 => {
            let mut children: [Option<NodeHandle>; 16] = Default::default();
            for (i, slot) in children.iter_mut().enumerate() {
                let data = rlp.at(i).map_err(corrupt)?.data().map_err(corrupt)?;
                if !data.is_empty() {
                    let hash = Hash::from_slice(data).ok_or_else(|| {
                        TrieError::Corrupt("branch child is not a hash".into())
                    })?;
                    *slot = Some(NodeHandle::Hash(hash));
                }
            }
            let data = rlp.at(16).map_err(corrupt)?.data().map_err(corrupt)?;
            let value = (!data.is_empty()).then(|| data.to_vec());
            Ok(Node::Branch { children, value })
        }
        n => Err(TrieError::Corrupt(format!("unexpected node arity {n}"))),
    }
}
