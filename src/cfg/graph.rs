//! Per-function control-flow graph: a set of named basic blocks and the
//! directed edges between them, with a reverse post-order numbering used by
//! the fixed-point driver to pick a dequeue order that tends to converge
//! quickly (§4.6).

use std::collections::{HashMap, HashSet};

/// A function's CFG. Blocks are identified by their IR label.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    entry: String,
    blocks: Vec<String>,
    successors: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
}

impl Cfg {
    pub fn new(entry: impl Into<String>) -> Self {
        let entry = entry.into();
        let mut cfg = Self {
            entry: entry.clone(),
            blocks: Vec::new(),
            successors: HashMap::new(),
            predecessors: HashMap::new(),
        };
        cfg.add_block(entry);
        cfg
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    pub fn has_block(&self, label: &str) -> bool {
        self.successors.contains_key(label)
    }

    /// Registers `label` if it is not already present. Declaration order is
    /// preserved and used as the fallback dequeue order when a block is
    /// unreachable from the entry (so RPO has no rank for it).
    pub fn add_block(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.successors.contains_key(&label) {
            self.successors.insert(label.clone(), Vec::new());
            self.predecessors.insert(label.clone(), Vec::new());
            self.blocks.push(label);
        }
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        let to = to.into();
        self.add_block(from.clone());
        self.add_block(to.clone());
        let succs = self.successors.get_mut(&from).unwrap();
        if !succs.contains(&to) {
            succs.push(to.clone());
        }
        let preds = self.predecessors.get_mut(&to).unwrap();
        if !preds.contains(&from) {
            preds.push(from);
        }
    }

    pub fn successors(&self, block: &str) -> &[String] {
        self.successors.get(block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, block: &str) -> &[String] {
        self.predecessors.get(block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Reverse post-order of the blocks reachable from the entry: a DFS
    /// post-order, reversed. Blocks unreachable from the entry are appended
    /// afterward in declaration order so every block still gets a rank.
    pub fn reverse_post_order(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut post_order = Vec::new();
        self.dfs_post_order(&self.entry, &mut visited, &mut post_order);
        post_order.reverse();
        for block in &self.blocks {
            if !visited.contains(block) {
                post_order.push(block.clone());
            }
        }
        post_order
    }

    fn dfs_post_order(&self, block: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        if !visited.insert(block.to_string()) {
            return;
        }
        for succ in self.successors(block) {
            if !visited.contains(succ) {
                self.dfs_post_order(succ, visited, out);
            }
        }
        out.push(block.to_string());
    }
}
