//! Inbound-edge index (§4.5): per block, the set of predecessor blocks that
//! have contributed at least one heap to its container. Queried when the
//! fixed-point driver builds its worklist.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct SymStateMap {
    inbound: HashMap<String, HashSet<String>>,
}

impl SymStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, from: &str, to: &str) {
        self.inbound.entry(to.to_string()).or_default().insert(from.to_string());
    }

    pub fn predecessor_count(&self, block: &str) -> usize {
        self.inbound.get(block).map(|s| s.len()).unwrap_or(0)
    }

    pub fn has_contributed(&self, from: &str, to: &str) -> bool {
        self.inbound.get(to).map(|s| s.contains(from)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_queries_inbound_edges() {
        let mut m = SymStateMap::new();
        m.record("entry", "loop_head");
        m.record("loop_body", "loop_head");
        assert_eq!(m.predecessor_count("loop_head"), 2);
        assert!(m.has_contributed("entry", "loop_head"));
        assert!(!m.has_contributed("exit", "loop_head"));
    }
}
