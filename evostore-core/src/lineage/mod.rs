pub mod composition;
pub mod index;
pub mod trie;

pub use composition::{Composition, CompositionResolver};
pub use index::LineageIndex;
pub use trie::{PrefixTrie, TrieHit};
