//! Index-based identity graph.
//!
//! Nodes are [`NodeId`]s into the run's record arena; edges live in a flat
//! vector and nodes refer to them by position through adjacency lists.

use crate::NodeId;
use crate::score::PairScore;
use std::collections::HashMap;

/// A positive (merge) edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    pub score: f64,
    /// Identifier evidence; conflict splitting never removes a locked edge
    pub locked: bool,
}

impl Edge {
    fn pair(&self) -> (NodeId, NodeId) {
        (self.a, self.b)
    }
}

/// Positive edges above the merge threshold plus strong-negative pairs.
#[derive(Debug, Clone, Default)]
pub struct IdentityGraph {
    node_count: usize,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    negative: Vec<(NodeId, NodeId)>,
    negative_adjacency: Vec<Vec<usize>>,
}

impl IdentityGraph {
    /// Builds the graph from scored pairs.
    ///
    /// Strong-negative pairs never become positive edges. Pairs referring to
    /// nodes outside `0..node_count` are ignored.
    pub fn build(node_count: usize, scores: &[PairScore], threshold: f64) -> Self {
        let mut edges = Vec::new();
        let mut negative = Vec::new();

        for pair in scores {
            let (a, b) = if pair.a <= pair.b {
                (pair.a, pair.b)
            } else {
                (pair.b, pair.a)
            };
            if a == b || b.index() >= node_count {
                continue;
            }
            if pair.strong_negative {
                negative.push((a, b));
            } else if pair.score >= threshold {
                edges.push(Edge {
                    a,
                    b,
                    score: pair.score,
                    locked: pair.identifier_match,
                });
            }
        }

        edges.sort_by(|x, y| x.pair().cmp(&y.pair()));
        edges.dedup_by(|x, y| x.pair() == y.pair());
        negative.sort();
        negative.dedup();

        let mut adjacency = vec![Vec::new(); node_count];
        for (i, edge) in edges.iter().enumerate() {
            adjacency[edge.a.index()].push(i);
            adjacency[edge.b.index()].push(i);
        }
        let mut negative_adjacency = vec![Vec::new(); node_count];
        for (i, (a, b)) in negative.iter().enumerate() {
            negative_adjacency[a.index()].push(i);
            negative_adjacency[b.index()].push(i);
        }

        Self {
            node_count,
            edges,
            adjacency,
            negative,
            negative_adjacency,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Positive edges, sorted by node pair.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Strong-negative pairs, sorted.
    pub fn negative_edges(&self) -> &[(NodeId, NodeId)] {
        &self.negative
    }

    pub fn edge(&self, index: usize) -> &Edge {
        &self.edges[index]
    }

    /// Positions in [`Self::edges`] of the edges touching `node`.
    pub fn edges_of(&self, node: NodeId) -> &[usize] {
        &self.adjacency[node.index()]
    }

    /// Strong-negative pairs touching `node`.
    pub fn negative_edges_of(&self, node: NodeId) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.negative_adjacency[node.index()]
            .iter()
            .map(|&i| self.negative[i])
    }

    /// Connected components over all positive edges.
    ///
    /// Every node appears in exactly one component; members are ascending and
    /// components are ordered by their smallest member.
    pub fn components(&self) -> Vec<Vec<NodeId>> {
        let mut sets = UnionFind::new(self.node_count);
        for edge in &self.edges {
            sets.union(edge.a.index(), edge.b.index());
        }
        sets.groups().into_iter().map(|group| group.into_iter().map(NodeId::new).collect()).collect()
    }
}

/// Disjoint-set forest with path halving and union by rank.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merges the sets of `x` and `y`; returns false if they were already joined.
    pub(crate) fn union(&mut self, x: usize, y: usize) -> bool {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return false;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
        true
    }

    pub(crate) fn connected(&mut self, x: usize, y: usize) -> bool {
        self.find(x) == self.find(y)
    }

    /// All sets, each ascending, ordered by smallest element.
    pub(crate) fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for x in 0..self.parent.len() {
            let root = self.find(x);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(x);
        }
        groups
    }
}
