//! The fixed-point driver (C6, §4.6): a worklist over a [`Cfg`] that applies
//! a caller-supplied transfer function to every pending heap in a block's
//! state container, propagates the results to successors, and switches a
//! block's container from union to join mode once it grows past the
//! configured threshold.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::cfg::graph::Cfg;
use crate::common::error::AnalysisError;
use crate::config::AnalyzerConfig;
use crate::heap::SymHeap;
use crate::state::{InsertOutcome, StateContainer, SymHeapUnion, SymStateMap, SymStateWithJoin};

/// A block's container, before or after the union-to-join switch. The FPD
/// is the only thing that ever performs that switch; transfer functions
/// only ever see plain `SymHeap`s.
enum BlockContainer {
    Union(SymHeapUnion),
    Join(SymStateWithJoin),
}

impl BlockContainer {
    fn heaps(&self) -> &[SymHeap] {
        match self {
            BlockContainer::Union(c) => c.heaps(),
            BlockContainer::Join(c) => c.heaps(),
        }
    }

    fn len(&self) -> usize {
        self.heaps().len()
    }

    fn pending_indices(&self) -> Vec<usize> {
        match self {
            BlockContainer::Union(c) => c.pending_indices(),
            BlockContainer::Join(c) => c.pending_indices(),
        }
    }

    fn clear_pending(&mut self, idx: usize) {
        match self {
            BlockContainer::Union(c) => c.clear_pending(idx),
            BlockContainer::Join(c) => c.clear_pending(idx),
        }
    }

    fn insert_detailed(&mut self, sh: SymHeap) -> InsertOutcome {
        match self {
            BlockContainer::Union(c) => c.insert_detailed(sh),
            BlockContainer::Join(c) => c.insert_detailed(sh),
        }
    }
}

/// Drives one function's CFG to a fixed point.
pub struct FixedPointDriver<'a> {
    cfg: &'a Cfg,
    config: AnalyzerConfig,
    rpo_rank: HashMap<String, usize>,
    containers: HashMap<String, BlockContainer>,
    worklist: BTreeSet<(usize, String)>,
    inbound: SymStateMap,
}

impl<'a> FixedPointDriver<'a> {
    pub fn new(cfg: &'a Cfg, config: AnalyzerConfig) -> Self {
        let rpo_rank =
            cfg.reverse_post_order().into_iter().enumerate().map(|(i, b)| (b, i)).collect();
        Self {
            cfg,
            config,
            rpo_rank,
            containers: HashMap::new(),
            worklist: BTreeSet::new(),
            inbound: SymStateMap::new(),
        }
    }

    fn rank(&self, block: &str) -> usize {
        *self.rpo_rank.get(block).unwrap_or(&usize::MAX)
    }

    fn enqueue(&mut self, block: &str) {
        self.worklist.insert((self.rank(block), block.to_string()));
    }

    /// Inserts `sh` into `block`'s container (creating it in union mode if
    /// this is the first heap it has ever seen) and enqueues the block if
    /// that changed anything. Used to seed entry blocks before [`Self::run`].
    pub fn seed(&mut self, block: &str, sh: SymHeap) {
        let _ = self.propagate(block, sh);
    }

    pub fn container_len(&self, block: &str) -> usize {
        self.containers.get(block).map(|c| c.len()).unwrap_or(0)
    }

    pub fn heaps_for(&self, block: &str) -> &[SymHeap] {
        self.containers.get(block).map(|c| c.heaps()).unwrap_or(&[])
    }

    pub fn inbound(&self) -> &SymStateMap {
        &self.inbound
    }

    pub fn is_join_mode(&self, block: &str) -> bool {
        matches!(self.containers.get(block), Some(BlockContainer::Join(_)))
    }

    /// Runs the worklist to a fixed point. `transfer(block, heap)` is called
    /// once per pending heap, reverse-post-order first, and returns the
    /// `(successor, heap)` pairs it routed that heap to — zero for an
    /// infeasible branch, several for a fork with path-sensitive operands.
    /// Each target must be an actual CFG successor of `block`.
    pub fn run<F>(&mut self, mut transfer: F) -> Result<(), AnalysisError>
    where
        F: FnMut(&str, &SymHeap) -> Result<Vec<(String, SymHeap)>, AnalysisError>,
    {
        let start = Instant::now();
        while let Some((_, block)) = pop_first(&mut self.worklist) {
            if let Some(budget) = self.config.timeout() {
                if start.elapsed() > budget {
                    return Err(AnalysisError::Timeout { function: block });
                }
            }
            let pending = self.containers.get(&block).map(|c| c.pending_indices()).unwrap_or_default();
            for idx in pending {
                let heap = self.containers[&block].heaps()[idx].clone();
                self.containers.get_mut(&block).unwrap().clear_pending(idx);
                tracing::trace!(block = %block, "applying transfer function");
                let outputs = transfer(&block, &heap)?;
                for (succ, out_sh) in outputs {
                    if !self.cfg.successors(&block).iter().any(|s| s == &succ) {
                        return Err(AnalysisError::contract(format!(
                            "transfer function routed a heap to `{succ}`, which is not a CFG successor of `{block}`"
                        )));
                    }
                    self.inbound.record(&block, &succ);
                    self.propagate(&succ, out_sh)?;
                }
            }
        }
        Ok(())
    }

    fn propagate(&mut self, block: &str, sh: SymHeap) -> Result<(), AnalysisError> {
        let (outcome, already_join, len) = {
            let container = self
                .containers
                .entry(block.to_string())
                .or_insert_with(|| BlockContainer::Union(SymHeapUnion::new()));
            let outcome = container.insert_detailed(sh);
            (outcome, matches!(container, BlockContainer::Join(_)), container.len())
        };
        if let InsertOutcome::NoChange = outcome {
            return Ok(());
        }
        tracing::debug!(block = %block, outcome = ?outcome, "state container changed");
        self.enqueue(block);
        if len > self.config.join_threshold {
            if already_join {
                return Err(AnalysisError::StateCountExceeded { block: block.to_string(), count: len });
            }
            self.upgrade_to_join_mode(block)?;
        }
        Ok(())
    }

    /// Switches `block`'s container from union to join mode (§4.6): its
    /// accumulated heaps are re-inserted one by one into a fresh
    /// [`SymStateWithJoin`], which may itself collapse some of them via
    /// widening.
    fn upgrade_to_join_mode(&mut self, block: &str) -> Result<(), AnalysisError> {
        let container = self.containers.get_mut(block).expect("propagate always creates the entry first");
        if let BlockContainer::Union(union) = container {
            let heaps = std::mem::take(union).into_heaps();
            tracing::debug!(block = %block, count = heaps.len(), "switching block to join mode");
            let mut joined = SymStateWithJoin::new();
            for h in heaps {
                joined.insert_detailed(h);
            }
            *container = BlockContainer::Join(joined);
        }
        let len = self.containers[block].len();
        if len > self.config.join_threshold {
            return Err(AnalysisError::StateCountExceeded { block: block.to_string(), count: len });
        }
        Ok(())
    }
}

fn pop_first(set: &mut BTreeSet<(usize, String)>) -> Option<(usize, String)> {
    let first = set.iter().next().cloned();
    if let Some(ref item) = first {
        set.remove(item);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ClType, TypeKind, TypeTable};
    use std::sync::Arc;

    fn int_heap() -> SymHeap {
        let mut table = TypeTable::new();
        table.intern(ClType::scalar(TypeKind::Int, 4));
        SymHeap::new(Arc::new(table))
    }

    #[test]
    fn seed_enqueues_entry_and_run_drains_it() {
        let cfg = Cfg::new("entry");
        let mut fpd = FixedPointDriver::new(&cfg, AnalyzerConfig::default());
        fpd.seed("entry", int_heap());
        assert_eq!(fpd.container_len("entry"), 1);

        let mut visited = Vec::new();
        fpd.run(|block, _heap| {
            visited.push(block.to_string());
            Ok(Vec::new())
        })
        .unwrap();
        assert_eq!(visited, vec!["entry".to_string()]);
    }

    #[test]
    fn fork_propagates_to_both_successors() {
        let mut cfg = Cfg::new("entry");
        cfg.add_edge("entry", "left");
        cfg.add_edge("entry", "right");
        let mut fpd = FixedPointDriver::new(&cfg, AnalyzerConfig::default());
        fpd.seed("entry", int_heap());

        fpd.run(|block, heap| {
            if block == "entry" {
                Ok(vec![("left".to_string(), heap.clone()), ("right".to_string(), heap.clone())])
            } else {
                Ok(Vec::new())
            }
        })
        .unwrap();

        assert_eq!(fpd.container_len("left"), 1);
        assert_eq!(fpd.container_len("right"), 1);
    }

    #[test]
    fn loop_reaches_a_fixed_point_instead_of_looping_forever() {
        let mut cfg = Cfg::new("entry");
        cfg.add_edge("entry", "head");
        cfg.add_edge("head", "head");
        let mut fpd = FixedPointDriver::new(&cfg, AnalyzerConfig::default());
        fpd.seed("entry", int_heap());

        let mut iterations = 0;
        fpd.run(|block, heap| {
            iterations += 1;
            if block == "entry" {
                Ok(vec![("head".to_string(), heap.clone())])
            } else {
                // Same heap every time: union mode dedups, so "head" stops
                // re-enqueueing itself once it has seen it once.
                Ok(vec![("head".to_string(), heap.clone())])
            }
        })
        .unwrap();

        assert!(iterations < 10, "fixed point should be reached quickly, got {iterations} iterations");
        assert_eq!(fpd.container_len("head"), 1);
    }

    #[test]
    fn exceeding_join_threshold_while_already_joined_is_an_error() {
        let mut cfg = Cfg::new("entry");
        cfg.add_edge("entry", "head");
        let config = AnalyzerConfig { join_threshold: 1, ..AnalyzerConfig::default() };
        let mut fpd = FixedPointDriver::new(&cfg, config);

        let mut table = TypeTable::new();
        let node_ty = table.intern(ClType::aggregate(TypeKind::Struct, vec![], 0));
        let types = Arc::new(table);
        let var = crate::heap::object::VarRef { c_var_uid: 1, inst: 0 };

        fpd.seed("entry", SymHeap::new(types.clone()));
        let result = fpd.run(|block, _heap| {
            if block == "entry" {
                let mut a = SymHeap::new(types.clone());
                a.root_create(node_ty, Some(var), crate::heap::object::Storage::Stack).unwrap();
                let mut b = SymHeap::new(types.clone());
                b.root_create(node_ty, Some(var), crate::heap::object::Storage::Stack).unwrap();
                b.root_create(node_ty, Some(var), crate::heap::object::Storage::Stack).unwrap();
                Ok(vec![("head".to_string(), a), ("head".to_string(), b)])
            } else {
                Ok(Vec::new())
            }
        });
        assert!(result.is_err());
    }
}
