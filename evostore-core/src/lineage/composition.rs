use crate::error::{EvoError, Result};
use crate::lineage::LineageIndex;
use crate::types::{LayerEntry, LayerId, ModelId, OwnerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered layer layout of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub model_id: ModelId,
    pub entries: Vec<LayerEntry>,
}

impl Composition {
    pub fn pairs(&self) -> Vec<(LayerId, OwnerId)> {
        self.entries
            .iter()
            .map(|entry| (entry.layer_id, entry.owner))
            .collect()
    }

    pub fn get(&self, layer_id: LayerId) -> Option<&LayerEntry> {
        self.entries.iter().find(|entry| entry.layer_id == layer_id)
    }

    /// Checks a load request against this composition without touching any buffer.
    pub fn verify(&self, layer_ids: &[LayerId], owners: &[OwnerId], lengths: &[u64]) -> Result<()> {
        if layer_ids.len() != owners.len() || layer_ids.len() != lengths.len() {
            return Err(EvoError::Validation(format!(
                "layer_ids, owners and buffers differ in length: {}, {}, {}",
                layer_ids.len(),
                owners.len(),
                lengths.len()
            )));
        }

        for (index, (&layer_id, &owner)) in layer_ids.iter().zip(owners).enumerate() {
            let recorded = self.get(layer_id);
            match recorded {
                Some(entry) if entry.owner == owner => {
                    if entry.size != lengths[index] {
                        return Err(EvoError::SizeMismatch {
                            layer_id,
                            expected: entry.size,
                            actual: lengths[index],
                        });
                    }
                }
                _ => {
                    return Err(EvoError::OwnerMismatch {
                        layer_id,
                        recorded: recorded.map(|entry| entry.owner),
                        supplied: owner,
                    });
                }
            }
        }

        Ok(())
    }

    /// Layer ids grouped by the owner that holds their bytes.
    pub fn by_owner(&self) -> BTreeMap<OwnerId, Vec<LayerId>> {
        let mut grouped: BTreeMap<OwnerId, Vec<LayerId>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.owner).or_default().push(entry.layer_id);
        }
        grouped
    }
}

#[derive(Clone)]
pub struct CompositionResolver {
    index: Arc<LineageIndex>,
}

impl CompositionResolver {
    pub fn new(index: Arc<LineageIndex>) -> Self {
        Self { index }
    }

    pub async fn resolve(&self, model_id: ModelId) -> Result<Composition> {
        let record = self
            .index
            .get_model(model_id)
            .await
            .ok_or_else(|| EvoError::NotFound(format!("model {}", model_id)))?;

        Ok(Composition {
            model_id,
            entries: record.layers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelRecord;

    fn composition() -> Composition {
        Composition {
            model_id: 2,
            entries: vec![
                LayerEntry {
                    layer_id: 0,
                    owner: 1,
                    size: 80,
                },
                LayerEntry {
                    layer_id: 3,
                    owner: 2,
                    size: 512,
                },
                LayerEntry {
                    layer_id: 2,
                    owner: 1,
                    size: 80,
                },
            ],
        }
    }

    #[test]
    fn test_verify_accepts_matching_request() {
        composition()
            .verify(&[0, 3, 2], &[1, 2, 1], &[80, 512, 80])
            .unwrap();
    }

    #[test]
    fn test_verify_reports_owner_mismatch() {
        let err = composition()
            .verify(&[0, 3], &[1, 1], &[80, 512])
            .unwrap_err();
        assert!(matches!(
            err,
            EvoError::OwnerMismatch {
                layer_id: 3,
                recorded: Some(2),
                supplied: 1
            }
        ));

        let err = composition().verify(&[9], &[1], &[80]).unwrap_err();
        assert!(matches!(err, EvoError::OwnerMismatch { recorded: None, .. }));
    }

    #[test]
    fn test_verify_reports_size_mismatch() {
        let err = composition()
            .verify(&[0, 3], &[1, 2], &[80, 511])
            .unwrap_err();
        assert!(matches!(
            err,
            EvoError::SizeMismatch {
                layer_id: 3,
                expected: 512,
                actual: 511
            }
        ));
    }

    #[test]
    fn test_by_owner_groups_layers() {
        let grouped = composition().by_owner();
        assert_eq!(grouped.get(&1), Some(&vec![0, 2]));
        assert_eq!(grouped.get(&2), Some(&vec![3]));
    }

    #[tokio::test]
    async fn test_resolve_preserves_stored_order() {
        let index = Arc::new(LineageIndex::new());
        let resolver = CompositionResolver::new(index.clone());

        for model_id in 1..=16u64 {
            let count = model_id as usize % 5;
            let layer_ids: Vec<u64> = (0..count as u64).rev().map(|i| i * 7 + model_id).collect();
            let owners: Vec<u64> = (0..count as u64).map(|i| (i + model_id) % 3).collect();
            let sizes = vec![4; count];
            let edges: Vec<u64> = layer_ids.iter().flat_map(|&id| [model_id, id]).collect();

            let record =
                ModelRecord::from_parts(model_id, edges, &layer_ids, &owners, &sizes, 0.0)
                    .unwrap();
            index.store_meta(record).await.unwrap();

            let expected: Vec<(u64, u64)> =
                layer_ids.iter().copied().zip(owners.iter().copied()).collect();
            assert_eq!(resolver.resolve(model_id).await.unwrap().pairs(), expected);
        }
    }

    #[tokio::test]
    async fn test_resolve_unknown_model_is_not_found() {
        let index = Arc::new(LineageIndex::new());
        let resolver = CompositionResolver::new(index.clone());
        assert!(resolver.resolve(5).await.unwrap_err().is_not_found());

        let record =
            ModelRecord::from_parts(5, vec![0, 4], &[0, 4], &[1, 5], &[80, 80], 1.0).unwrap();
        index.store_meta(record).await.unwrap();
        let resolved = resolver.resolve(5).await.unwrap();
        assert_eq!(resolved.pairs(), vec![(0, 1), (4, 5)]);
    }
}
