//! Forwarding table of ranked candidates
//!
//! The [`ForwardingTable`] maps each destination to at most three ranked
//! candidates. It is replaced wholesale at every routing epoch; nothing is
//! merged with the previous generation.

use std::collections::BTreeMap;

use satnet_core::{Candidate, MAX_CANDIDATES, NextHop, NodeId};

/// Ranked candidates toward one destination, best first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    candidates: Vec<Candidate>,
}

impl CandidateList {
    /// Build a list, keeping at most [`MAX_CANDIDATES`] entries
    pub fn new(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        Self {
            candidates: candidates.into_iter().take(MAX_CANDIDATES).collect(),
        }
    }

    /// A list holding only the drop sentinel
    pub fn unreachable() -> Self {
        Self {
            candidates: vec![Candidate::Drop],
        }
    }

    pub fn primary(&self) -> Option<Candidate> {
        self.candidates.first().copied()
    }

    pub fn get(&self, rank: usize) -> Option<Candidate> {
        self.candidates.get(rank).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Usable hops with their rank, stopping at the first drop
    pub fn hops(&self) -> impl Iterator<Item = (usize, NextHop)> + '_ {
        self.candidates
            .iter()
            .map_while(|candidate| candidate.next_hop())
            .enumerate()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn is_unreachable(&self) -> bool {
        self.primary().is_none_or(|candidate| candidate.is_drop())
    }
}

/// Per-node forwarding state
#[derive(Debug, Clone, Default)]
pub struct ForwardingTable {
    entries: BTreeMap<NodeId, CandidateList>,
    generation: u64,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry at once
    pub fn reload(&mut self, entries: BTreeMap<NodeId, CandidateList>) {
        self.entries = entries;
        self.generation += 1;
    }

    pub fn insert(&mut self, destination: NodeId, candidates: CandidateList) {
        self.entries.insert(destination, candidates);
    }

    pub fn candidates(&self, destination: NodeId) -> Option<&CandidateList> {
        self.entries.get(&destination)
    }

    pub fn primary(&self, destination: NodeId) -> Option<Candidate> {
        self.candidates(destination).and_then(CandidateList::primary)
    }

    pub fn destinations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &CandidateList)> {
        self.entries.iter().map(|(dest, list)| (*dest, list))
    }

    /// Number of reloads applied so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Human-readable dump, one destination per line
    pub fn describe(&self, owner: NodeId) -> String {
        let mut out = format!("forwarding state of node {owner}\n");
        for (destination, list) in &self.entries {
            let ranked: Vec<String> = list.iter().map(ToString::to_string).collect();
            out.push_str(&format!("  -> {destination}: {}\n", ranked.join(" ")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(nodes: &[u32]) -> CandidateList {
        CandidateList::new(nodes.iter().map(|n| Candidate::hop(NodeId(*n), 1, 1)))
    }

    #[test]
    fn test_candidate_list_caps_at_three() {
        let candidates = list(&[1, 2, 3, 4]);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates.primary().and_then(|c| c.next_hop()).map(|h| h.node), Some(NodeId(1)));
    }

    #[test]
    fn test_hops_stop_at_drop() {
        let candidates = CandidateList::new([
            Candidate::hop(NodeId(1), 1, 1),
            Candidate::Drop,
            Candidate::hop(NodeId(3), 2, 1),
        ]);
        let hops: Vec<_> = candidates.hops().map(|(rank, hop)| (rank, hop.node)).collect();
        assert_eq!(hops, vec![(0, NodeId(1))]);
        assert!(!candidates.is_unreachable());
        assert!(CandidateList::unreachable().is_unreachable());
    }

    #[test]
    fn test_reload_replaces_wholesale() {
        let mut table = ForwardingTable::new();
        table.insert(NodeId(5), list(&[1]));
        table.insert(NodeId(6), list(&[2]));

        let mut next = BTreeMap::new();
        next.insert(NodeId(7), list(&[3]));
        table.reload(next.clone());
        assert_eq!(table.len(), 1);
        assert!(table.candidates(NodeId(5)).is_none());
        assert_eq!(table.generation(), 1);

        // reloading the same snapshot is idempotent apart from the generation
        table.reload(next);
        assert_eq!(table.len(), 1);
        assert_eq!(table.primary(NodeId(7)), Some(Candidate::hop(NodeId(3), 1, 1)));
    }

    #[test]
    fn test_describe_lists_destinations() {
        let mut table = ForwardingTable::new();
        table.insert(NodeId(2), CandidateList::new([Candidate::hop(NodeId(1), 1, 2), Candidate::Drop]));
        let text = table.describe(NodeId(0));
        assert!(text.contains("-> 2: (1, 1, 2) (-1, -1, -1)"));
    }
}
