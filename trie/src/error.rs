use thiserror::Error;
use vela_store::StoreError;
use vela_types::Hash;

#[derive(Debug, Error)]
pub enum TrieError {
    /// A node referenced by hash is absent from the backing store. Fatal on
    /// read paths; deletion paths may treat it as the desired post-condition.
    #[error("missing trie node {0}")]
    MissingNode(Hash),

    #[error("corrupt trie node: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrieError {
    /// Whether this error is a missing-node condition that deletion paths
    /// are allowed to swallow.
    pub fn is_missing_node(&self) -> bool {
        matches!(self, TrieError::MissingNode(_))
    }
}
