//! Identity-graph clustering.
//!
//! Pairs scoring at or above the merge threshold become positive edges;
//! strong-negative pairs become constraints. Connected components over the
//! positive edges are provisional clusters. A component that contains a
//! strong-negative pair is split by repeatedly cutting the weakest edge on
//! the strongest path joining the pair, until the pair is separated.
//!
//! Edges backed by a shared ORCID iD are never cut. When every edge on the
//! path is such an edge the component is kept whole, marked ambiguous and
//! reported as a [`ClusteringConflict`].

pub mod graph;

use crate::score::PairScore;
use crate::{DisambiguationError, NodeId};
use graph::{IdentityGraph, UnionFind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

/// A set of records judged to be the same author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Members in ascending order
    pub members: Vec<NodeId>,
    /// Strong-negative pairs with at least one endpoint in this cluster
    pub negative_edges: Vec<(NodeId, NodeId)>,
    /// Holds a strong-negative pair that could not be separated
    pub ambiguous: bool,
}

/// A strong-negative pair left inside one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConflict {
    pub a: NodeId,
    pub b: NodeId,
    /// Members of the cluster holding both records
    pub members: Vec<NodeId>,
}

/// Result of clustering: a partition of all nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSet {
    /// Ordered by smallest member
    pub clusters: Vec<Cluster>,
    /// Ordered by pair
    pub conflicts: Vec<ClusteringConflict>,
}

impl ClusterSet {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster index of every node, indexed by [`NodeId`].
    pub fn assignment(&self) -> Vec<usize> {
        let node_count = self.clusters.iter().map(|c| c.members.len()).sum();
        let mut assignment = vec![0; node_count];
        for (index, cluster) in self.clusters.iter().enumerate() {
            for member in &cluster.members {
                if let Some(slot) = assignment.get_mut(member.index()) {
                    *slot = index;
                }
            }
        }
        assignment
    }
}

#[derive(Debug, Default)]
struct Resolution {
    clusters: Vec<Cluster>,
    conflicts: Vec<ClusteringConflict>,
}

/// Clusters `node_count` nodes from their scored pairs.
///
/// # Examples
///
/// ```
/// use bibident::cluster::cluster;
/// use bibident::{NodeId, PairScore, SignalScores};
///
/// let pair = |a, b, score| PairScore {
///     a: NodeId::new(a),
///     b: NodeId::new(b),
///     score,
///     signals: SignalScores::default(),
///     strong_negative: false,
///     identifier_match: false,
///     shared_publication: false,
/// };
///
/// let set = cluster(3, &[pair(0, 1, 0.9), pair(1, 2, 0.9), pair(0, 2, 0.3)], 0.72);
/// assert_eq!(set.clusters.len(), 1);
/// ```
pub fn cluster(node_count: usize, scores: &[PairScore], threshold: f64) -> ClusterSet {
    let graph = IdentityGraph::build(node_count, scores, threshold);
    let resolutions = graph
        .components()
        .iter()
        .map(|members| resolve_component(&graph, members))
        .collect();
    assemble(resolutions)
}

/// Resolves every component of `graph`, checking `is_cancelled` before each.
pub(crate) fn cluster_graph<F>(
    graph: &IdentityGraph,
    parallel: bool,
    is_cancelled: F,
) -> crate::Result<ClusterSet>
where
    F: Fn() -> bool + Sync,
{
    let components = graph.components();
    let resolve = |members: &Vec<NodeId>| -> crate::Result<Resolution> {
        if is_cancelled() {
            return Err(DisambiguationError::Cancelled);
        }
        Ok(resolve_component(graph, members))
    };

    #[cfg(feature = "parallel")]
    {
        if parallel {
            use rayon::prelude::*;

            let resolutions = components
                .par_iter()
                .map(resolve)
                .collect::<crate::Result<Vec<_>>>()?;
            return Ok(assemble(resolutions));
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    let resolutions = components
        .iter()
        .map(resolve)
        .collect::<crate::Result<Vec<_>>>()?;
    Ok(assemble(resolutions))
}

fn assemble(resolutions: Vec<Resolution>) -> ClusterSet {
    let mut set = ClusterSet::default();
    for resolution in resolutions {
        set.clusters.extend(resolution.clusters);
        set.conflicts.extend(resolution.conflicts);
    }
    set.clusters.sort_by(|x, y| x.members.first().cmp(&y.members.first()));
    set.conflicts.sort_by(|x, y| (x.a, x.b).cmp(&(y.a, y.b)));

    for conflict in &set.conflicts {
        tracing::warn!(
            a = conflict.a.index(),
            b = conflict.b.index(),
            cluster_size = conflict.members.len(),
            "strong-negative pair could not be separated"
        );
    }
    set
}

/// One provisional component with node ids mapped to local positions.
struct ComponentView<'g> {
    graph: &'g IdentityGraph,
    members: &'g [NodeId],
    position: HashMap<NodeId, usize>,
    /// Positions in the graph's edge list
    edges: Vec<usize>,
    /// Strong-negative pairs with both endpoints in the component
    negatives: Vec<(NodeId, NodeId)>,
}

impl<'g> ComponentView<'g> {
    fn new(graph: &'g IdentityGraph, members: &'g [NodeId]) -> Self {
        let position: HashMap<NodeId, usize> = members
            .iter()
            .enumerate()
            .map(|(i, &node)| (node, i))
            .collect();

        let mut edges: Vec<usize> = members
            .iter()
            .flat_map(|&node| graph.edges_of(node).iter().copied())
            .collect();
        edges.sort_unstable();
        edges.dedup();

        let mut negatives: Vec<(NodeId, NodeId)> = members
            .iter()
            .flat_map(|&node| graph.negative_edges_of(node))
            .filter(|(a, b)| position.contains_key(a) && position.contains_key(b))
            .collect();
        negatives.sort();
        negatives.dedup();

        Self {
            graph,
            members,
            position,
            edges,
            negatives,
        }
    }

    /// Endpoints of the `slot`-th component edge as local positions.
    fn endpoints(&self, slot: usize) -> Option<(usize, usize)> {
        let edge = self.graph.edge(self.edges[slot]);
        Some((*self.position.get(&edge.a)?, *self.position.get(&edge.b)?))
    }

    fn union_active(&self, active: &[bool]) -> UnionFind {
        let mut sets = UnionFind::new(self.members.len());
        for slot in (0..self.edges.len()).filter(|&s| active[s]) {
            if let Some((x, y)) = self.endpoints(slot) {
                sets.union(x, y);
            }
        }
        sets
    }

    /// Edge slots on the path between `from` and `to` in the maximum
    /// spanning forest of the active edges.
    ///
    /// Locked edges enter the forest first, then by descending score, then by
    /// ascending node pair.
    fn spanning_path(&self, active: &[bool], from: usize, to: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.edges.len()).filter(|&s| active[s]).collect();
        order.sort_by(|&x, &y| {
            let (ex, ey) = (self.graph.edge(self.edges[x]), self.graph.edge(self.edges[y]));
            ey.locked
                .cmp(&ex.locked)
                .then_with(|| ey.score.total_cmp(&ex.score))
                .then_with(|| (ex.a, ex.b).cmp(&(ey.a, ey.b)))
        });

        let mut forest = UnionFind::new(self.members.len());
        let mut tree: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.members.len()];
        for slot in order {
            let Some((x, y)) = self.endpoints(slot) else {
                continue;
            };
            if forest.union(x, y) {
                tree[x].push((y, slot));
                tree[y].push((x, slot));
            }
        }

        let mut via: Vec<Option<(usize, usize)>> = vec![None; self.members.len()];
        let mut visited = vec![false; self.members.len()];
        let mut queue = VecDeque::from([from]);
        visited[from] = true;
        while let Some(node) = queue.pop_front() {
            if node == to {
                break;
            }
            for &(next, slot) in &tree[node] {
                if !visited[next] {
                    visited[next] = true;
                    via[next] = Some((node, slot));
                    queue.push_back(next);
                }
            }
        }

        let mut path = Vec::new();
        let mut node = to;
        while let Some((previous, slot)) = via[node] {
            path.push(slot);
            node = previous;
        }
        path
    }

    fn weakest_removable(&self, path: &[usize]) -> Option<usize> {
        path.iter()
            .copied()
            .filter(|&slot| !self.graph.edge(self.edges[slot]).locked)
            .min_by(|&x, &y| self.weaker(x, y))
    }

    fn weaker(&self, x: usize, y: usize) -> Ordering {
        let (ex, ey) = (self.graph.edge(self.edges[x]), self.graph.edge(self.edges[y]));
        ex.score
            .total_cmp(&ey.score)
            .then_with(|| (ex.a, ex.b).cmp(&(ey.a, ey.b)))
    }
}

/// Splits one provisional component until no strong-negative pair shares a
/// cluster, or until the only joining edges left are locked.
fn resolve_component(graph: &IdentityGraph, members: &[NodeId]) -> Resolution {
    let view = ComponentView::new(graph, members);
    let mut active = vec![true; view.edges.len()];
    let mut unresolved: Vec<(NodeId, NodeId)> = Vec::new();

    let mut sets = view.union_active(&active);
    loop {
        let violated = view.negatives.iter().copied().find(|pair| {
            !unresolved.contains(pair) && sets.connected(view.position[&pair.0], view.position[&pair.1])
        });
        let Some((a, b)) = violated else {
            break;
        };

        let path = view.spanning_path(&active, view.position[&a], view.position[&b]);
        match view.weakest_removable(&path) {
            Some(slot) => {
                let edge = graph.edge(view.edges[slot]);
                tracing::debug!(
                    a = edge.a.index(),
                    b = edge.b.index(),
                    score = edge.score,
                    "cutting edge to separate strong-negative pair"
                );
                active[slot] = false;
                sets = view.union_active(&active);
            }
            None => unresolved.push((a, b)),
        }
    }

    let mut resolution = Resolution::default();
    for group in sets.groups() {
        let group_members: Vec<NodeId> = group.iter().map(|&i| members[i]).collect();

        let mut negative_edges: Vec<(NodeId, NodeId)> = group_members
            .iter()
            .flat_map(|&node| graph.negative_edges_of(node))
            .collect();
        negative_edges.sort();
        negative_edges.dedup();

        let conflicts: Vec<ClusteringConflict> = unresolved
            .iter()
            .filter(|(a, _)| group_members.binary_search(a).is_ok())
            .map(|&(a, b)| ClusteringConflict {
                a,
                b,
                members: group_members.clone(),
            })
            .collect();

        resolution.clusters.push(Cluster {
            members: group_members,
            negative_edges,
            ambiguous: !conflicts.is_empty(),
        });
        resolution.conflicts.extend(conflicts);
    }
    resolution
}
