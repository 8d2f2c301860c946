use std::collections::{BTreeMap, VecDeque};

use tracing::debug;

use crate::error::{TraceError, ValidationError};
use crate::lineage::{InputBatch, LineageEdge, LineageNode, Provenance};
use crate::model::{Batch, TraceabilityRecord};

use super::StvgdService;

impl StvgdService {
    // ── Lineage reconstruction ──

    /// Walk back from a batch through every production that fed into it.
    ///
    /// Batches whose live record was deleted are taken from their last
    /// stored snapshot and flagged `deleted`. Each batch is visited once.
    pub fn provenance(&self, id: &str) -> Result<Provenance, TraceError> {
        let mut batches: BTreeMap<String, LineageNode> = BTreeMap::new();
        let mut edges = Vec::new();
        let mut queue = VecDeque::new();

        let (root, deleted) = self.resolve_lineage_batch(id)?;
        batches.insert(
            id.to_string(),
            LineageNode {
                batch: root,
                depth: 0,
                deleted,
            },
        );
        queue.push_back(id.to_string());

        while let Some(current) = queue.pop_front() {
            let Some(node) = batches.get(&current) else {
                continue;
            };
            let depth = node.depth;

            let productions: Vec<_> = node
                .batch
                .traceability
                .iter()
                .filter_map(|record| match record {
                    TraceabilityRecord::Production(p) if p.output_batch_id == current => {
                        Some(p.clone())
                    }
                    _ => None,
                })
                .collect();

            for production in productions {
                for (input, &quantity) in &production.input_batches {
                    edges.push(LineageEdge {
                        production_id: production.id.clone(),
                        input: input.clone(),
                        output: current.clone(),
                        quantity,
                    });

                    if batches.contains_key(input) {
                        continue;
                    }
                    let (batch, deleted) = self.resolve_lineage_batch(input)?;
                    batches.insert(
                        input.clone(),
                        LineageNode {
                            batch,
                            depth: depth + 1,
                            deleted,
                        },
                    );
                    queue.push_back(input.clone());
                }
            }
        }

        debug!(
            "provenance of [{}]: {} batches, {} edges",
            id,
            batches.len(),
            edges.len()
        );
        Ok(Provenance {
            root: id.to_string(),
            batches,
            edges,
        })
    }

    /// Reject `output_id` if it already appears anywhere in the lineage of
    /// the inputs, deleted ancestors included.
    pub fn check_ancestry(&self, output_id: &str, edges: &[InputBatch]) -> Result<(), TraceError> {
        for edge in edges {
            let lineage = self.provenance(&edge.batch.id)?;
            let reached = lineage.batches.contains_key(output_id)
                || lineage
                    .batches
                    .values()
                    .any(|node| node.batch.batch_composition.contains_key(output_id));
            if reached {
                return Err(ValidationError::LineageCycle(output_id.to_string()).into());
            }
        }
        Ok(())
    }

    /// The live batch, or its last snapshot if it was deleted.
    fn resolve_lineage_batch(&self, id: &str) -> Result<(Batch, bool), TraceError> {
        match self.read_batch(id) {
            Ok(batch) => Ok((batch, false)),
            Err(TraceError::NotFound(_)) => self
                .last_snapshot(id)?
                .map(|batch| (batch, true))
                .ok_or_else(|| TraceError::NotFound(id.to_string())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stvgd_kv::MemoryStore;

    use super::*;
    use crate::testing::{batch_input, production_input, registration_input};

    /// b-1 (cotton) + b-2 (pes) → p-1 → b-3; b-3 + b-4 (wool) → p-2 → b-5.
    fn chain() -> StvgdService {
        let svc = StvgdService::new(Arc::new(MemoryStore::new()));
        let sources = [
            ("rg-1", "b-1", "cotton"),
            ("rg-2", "b-2", "pes"),
            ("rg-4", "b-4", "wool"),
        ];
        for (rg, id, material) in sources {
            svc.register(registration_input(rg, "pu-1", batch_input(id, 100.0, &[(material, 100.0)])))
                .unwrap();
        }
        svc.produce(production_input(
            "p-1",
            "pu-1",
            &[("b-1", 60.0), ("b-2", 20.0)],
            batch_input("b-3", 80.0, &[("cotton", 75.0), ("pes", 25.0)]),
        ))
        .unwrap();
        svc.produce(production_input(
            "p-2",
            "pu-1",
            &[("b-3", 40.0), ("b-4", 40.0)],
            batch_input("b-5", 80.0, &[("cotton", 37.5), ("pes", 12.5), ("wool", 50.0)]),
        ))
        .unwrap();
        svc
    }

    #[test]
    fn walks_every_level() {
        let svc = chain();
        let prov = svc.provenance("b-5").unwrap();

        assert_eq!(prov.root, "b-5");
        let depths: Vec<(&str, usize)> = prov
            .batches
            .iter()
            .map(|(id, node)| (id.as_str(), node.depth))
            .collect();
        assert_eq!(
            depths,
            vec![("b-1", 2), ("b-2", 2), ("b-3", 1), ("b-4", 1), ("b-5", 0)]
        );
        assert_eq!(prov.edges.len(), 4);

        let mut into_b3: Vec<&str> = prov.inputs_of("b-3").iter().map(|e| e.input.as_str()).collect();
        into_b3.sort();
        assert_eq!(into_b3, vec!["b-1", "b-2"]);
        assert!(prov.inputs_of("b-3").iter().all(|e| e.production_id == "p-1"));

        let mut sources: Vec<&str> = prov.sources().iter().map(|b| b.id.as_str()).collect();
        sources.sort();
        assert_eq!(sources, vec!["b-1", "b-2", "b-4"]);
    }

    #[test]
    fn source_batch_has_no_edges() {
        let svc = chain();
        let prov = svc.provenance("b-1").unwrap();
        assert_eq!(prov.batches.len(), 1);
        assert!(prov.edges.is_empty());
    }

    #[test]
    fn deleted_inputs_come_from_history() {
        let svc = chain();
        svc.delete_batch("b-1").unwrap();

        let prov = svc.provenance("b-5").unwrap();
        let node = &prov.batches["b-1"];
        assert!(node.deleted);
        // Snapshot taken after p-1 consumed 60 of it.
        assert_eq!(node.batch.quantity, 40.0);
        assert!(!prov.batches["b-2"].deleted);
    }

    #[test]
    fn deleted_ancestor_cannot_be_reproduced_downstream() {
        let svc = chain();
        svc.delete_batch("b-1").unwrap();

        let err = svc
            .produce(production_input(
                "p-3",
                "pu-1",
                &[("b-5", 10.0)],
                batch_input("b-1", 10.0, &[("cotton", 100.0)]),
            ))
            .unwrap_err();
        assert_eq!(err.validation().map(ValidationError::rule), Some("LINEAGE_CYCLE"));

        assert!(matches!(svc.read_activity("p-3"), Err(TraceError::NotFound(_))));
        assert_eq!(svc.read_batch("b-5").unwrap().quantity, 80.0);
        let prov = svc.provenance("b-1").unwrap();
        assert!(prov.edges.is_empty());
    }

    #[test]
    fn unrelated_inputs_pass_ancestry() {
        let svc = chain();
        svc.produce(production_input(
            "p-3",
            "pu-1",
            &[("b-5", 10.0)],
            batch_input("b-6", 10.0, &[("cotton", 100.0)]),
        ))
        .unwrap();
        assert_eq!(svc.provenance("b-6").unwrap().batches.len(), 6);
    }

    #[test]
    fn unknown_root() {
        let svc = chain();
        assert!(matches!(svc.provenance("b-404"), Err(TraceError::NotFound(_))));
    }
}
