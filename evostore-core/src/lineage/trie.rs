use crate::types::{LineageChain, ModelId};
use std::collections::{BTreeSet, HashMap};

/// Trie over lineage chains: the first level is keyed on the root vertex,
/// every level below it on one `(parent, child)` edge pair.
///
/// Every node remembers the `(seq, model_id)` of each record whose chain
/// passes through it, so the deepest node a query reaches names the most
/// recent record sharing that many leading layers.
#[derive(Debug, Default)]
pub struct PrefixTrie {
    roots: HashMap<u64, TrieNode>,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<(u64, u64), TrieNode>,
    members: BTreeSet<(u64, ModelId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieHit {
    pub model_id: ModelId,
    pub seq: u64,
    /// Layers shared with the query: the root plus one per equal pair.
    pub depth: usize,
}

impl PrefixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty chains have no root and are never indexed.
    pub fn insert(&mut self, chain: &LineageChain, seq: u64, model_id: ModelId) {
        let Some(root) = chain.root() else {
            return;
        };

        let mut node = self.roots.entry(root).or_default();
        node.members.insert((seq, model_id));
        for pair in chain.pairs() {
            node = node.children.entry(pair).or_default();
            node.members.insert((seq, model_id));
        }
    }

    pub fn remove(&mut self, chain: &LineageChain, seq: u64, model_id: ModelId) {
        let Some(root) = chain.root() else {
            return;
        };
        let member = (seq, model_id);
        let pairs: Vec<(u64, u64)> = chain.pairs().collect();

        let prune = match self.roots.get_mut(&root) {
            Some(node) => {
                node.members.remove(&member);
                Self::remove_from(node, &pairs, member);
                node.members.is_empty()
            }
            None => false,
        };

        if prune {
            self.roots.remove(&root);
        }
    }

    fn remove_from(node: &mut TrieNode, pairs: &[(u64, u64)], member: (u64, ModelId)) {
        let Some((first, rest)) = pairs.split_first() else {
            return;
        };

        let prune = match node.children.get_mut(first) {
            Some(child) => {
                child.members.remove(&member);
                Self::remove_from(child, rest, member);
                child.members.is_empty()
            }
            None => false,
        };

        if prune {
            node.children.remove(first);
        }
    }

    /// Deepest match for `query`, or `None` when no stored chain starts at
    /// the query's root.
    pub fn longest_match(&self, query: &LineageChain) -> Option<TrieHit> {
        let mut node = self.roots.get(&query.root()?)?;
        let mut depth = 1;
        let mut best = Self::hit(node, depth);

        for pair in query.pairs() {
            let Some(child) = node.children.get(&pair) else {
                break;
            };
            node = child;
            depth += 1;
            best = Self::hit(node, depth).or(best);
        }

        best
    }

    fn hit(node: &TrieNode, depth: usize) -> Option<TrieHit> {
        node.members.last().map(|&(seq, model_id)| TrieHit {
            model_id,
            seq,
            depth,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
