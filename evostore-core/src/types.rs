use crate::error::{EvoError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a registered model.
pub type ModelId = u64;
/// Identifier of a layer; also the vertex id used in lineage chains.
pub type LayerId = u64;
/// Identifier of the model under which a layer's bytes were saved.
pub type OwnerId = u64;

/// Address of a stored layer inside a blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey {
    pub owner: OwnerId,
    pub layer_id: LayerId,
}

impl LayerKey {
    pub fn new(owner: OwnerId, layer_id: LayerId) -> Self {
        Self { owner, layer_id }
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner={} layer={}", self.owner, self.layer_id)
    }
}

/// One layer of a model record: where it lives and how large it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub layer_id: LayerId,
    pub owner: OwnerId,
    pub size: u64,
}

/// Even-length edge sequence read as `(parent, child)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct LineageChain(Vec<u64>);

impl LineageChain {
    pub fn new(edges: Vec<u64>) -> Result<Self> {
        if edges.len() % 2 != 0 {
            return Err(EvoError::Validation(format!(
                "lineage chain must have even length, got {}",
                edges.len()
            )));
        }
        Ok(Self(edges))
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.0.len() / 2
    }

    pub fn root(&self) -> Option<u64> {
        self.0.first().copied()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.0.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }

    /// Layers both chains share from the start: 0 when the roots differ,
    /// otherwise the root plus one layer per leading equal pair.
    pub fn shared_layers(&self, other: &LineageChain) -> usize {
        match (self.root(), other.root()) {
            (Some(left), Some(right)) if left == right => {
                1 + self
                    .pairs()
                    .zip(other.pairs())
                    .take_while(|(left, right)| left == right)
                    .count()
            }
            _ => 0,
        }
    }
}

impl TryFrom<Vec<u64>> for LineageChain {
    type Error = EvoError;

    fn try_from(edges: Vec<u64>) -> Result<Self> {
        Self::new(edges)
    }
}

impl From<LineageChain> for Vec<u64> {
    fn from(chain: LineageChain) -> Self {
        chain.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: ModelId,
    pub edges: LineageChain,
    pub layers: Vec<LayerEntry>,
    /// Opaque quality metric, stored and returned but never interpreted.
    pub score: f64,
    pub stored_at: DateTime<Utc>,
    /// Node-local commit order; larger means more recently stored.
    #[serde(default)]
    pub seq: u64,
}

impl ModelRecord {
    /// Builds a record from the parallel-array form used on the wire.
    pub fn from_parts(
        model_id: ModelId,
        edges: Vec<u64>,
        layer_ids: &[LayerId],
        owners: &[OwnerId],
        sizes: &[u64],
        score: f64,
    ) -> Result<Self> {
        if layer_ids.len() != owners.len() || layer_ids.len() != sizes.len() {
            return Err(EvoError::Validation(format!(
                "layer_ids, owners and sizes differ in length: {}, {}, {}",
                layer_ids.len(),
                owners.len(),
                sizes.len()
            )));
        }

        let mut seen = std::collections::HashSet::with_capacity(layer_ids.len());
        if let Some(duplicate) = layer_ids.iter().find(|layer_id| !seen.insert(**layer_id)) {
            return Err(EvoError::Validation(format!(
                "layer {} is listed more than once",
                duplicate
            )));
        }

        if !score.is_finite() {
            return Err(EvoError::Validation(format!("score must be finite, got {}", score)));
        }

        let edges = LineageChain::new(edges)?;
        let layers = layer_ids
            .iter()
            .zip(owners)
            .zip(sizes)
            .map(|((&layer_id, &owner), &size)| LayerEntry {
                layer_id,
                owner,
                size,
            })
            .collect();

        Ok(Self {
            model_id,
            edges,
            layers,
            score,
            stored_at: Utc::now(),
            seq: 0,
        })
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|layer| layer.layer_id).collect()
    }
}

/// Best lineage match for a query chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixMatch {
    pub model_id: ModelId,
    pub layer_ids: Vec<LayerId>,
    /// Layers shared with the query; `layer_ids` may be shorter when the
    /// record lists fewer layers than its chain has vertices.
    pub matched_layers: usize,
    pub stored_at: DateTime<Utc>,
}

impl PrefixMatch {
    /// Longer matches win; equal lengths go to the more recently stored record.
    pub fn is_better_than(&self, other: &PrefixMatch) -> bool {
        self.matched_layers > other.matched_layers
            || (self.matched_layers == other.matched_layers && self.stored_at > other.stored_at)
    }
}

/// Index of the node serving a model id or owner id.
pub fn node_for_id(id: u64, node_count: usize) -> usize {
    (id % node_count.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_rejects_odd_length() {
        let err = LineageChain::new(vec![0, 1, 1]).unwrap_err();
        assert!(matches!(err, EvoError::Validation(_)));
    }

    #[test]
    fn test_shared_layers_counts_root_then_pairs() {
        let stored = LineageChain::new(vec![0, 1, 1, 2]).unwrap();
        let diverged = LineageChain::new(vec![0, 3, 3, 1]).unwrap();
        assert_eq!(stored.shared_layers(&diverged), 1);

        let sibling = LineageChain::new(vec![0, 1, 1, 3]).unwrap();
        assert_eq!(stored.shared_layers(&sibling), 2);

        let longer = LineageChain::new(vec![0, 1, 1, 2, 2, 5]).unwrap();
        assert_eq!(stored.shared_layers(&longer), 3);

        let other_root = LineageChain::new(vec![4, 1, 1, 2]).unwrap();
        assert_eq!(stored.shared_layers(&other_root), 0);
        assert_eq!(stored.shared_layers(&LineageChain::default()), 0);
    }

    #[test]
    fn test_record_rejects_mismatched_parallel_arrays() {
        let err = ModelRecord::from_parts(1, vec![0, 1], &[0, 1], &[1], &[80, 80], 0.0)
            .unwrap_err();
        assert!(matches!(err, EvoError::Validation(_)));
    }

    #[test]
    fn test_record_rejects_duplicate_layer_ids() {
        let err =
            ModelRecord::from_parts(1, vec![0, 1, 1, 0], &[0, 1, 0], &[1, 1, 2], &[8, 8, 8], 0.0)
                .unwrap_err();
        assert!(matches!(err, EvoError::Validation(_)));
    }

    #[test]
    fn test_record_zips_layers_in_order() {
        let record =
            ModelRecord::from_parts(2, vec![0, 3, 3, 2], &[0, 3, 2], &[1, 2, 1], &[80, 512, 80], 0.5)
                .unwrap();
        assert_eq!(record.layer_ids(), vec![0, 3, 2]);
        assert_eq!(
            record.layers[1],
            LayerEntry {
                layer_id: 3,
                owner: 2,
                size: 512
            }
        );
    }

    #[test]
    fn test_chain_deserialize_validates() {
        let parsed: std::result::Result<LineageChain, _> = serde_json::from_str("[1,2,3]");
        assert!(parsed.is_err());
        let parsed: LineageChain = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(parsed.pair_count(), 1);
    }

    #[test]
    fn test_node_for_id_wraps() {
        assert_eq!(node_for_id(5, 2), 1);
        assert_eq!(node_for_id(4, 2), 0);
        assert_eq!(node_for_id(7, 1), 0);
    }
}
