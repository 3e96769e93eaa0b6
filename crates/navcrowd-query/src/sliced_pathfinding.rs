//! Incremental A* search over a [`PolyMesh`]
//!
//! A search is started once, advanced a bounded number of node expansions at
//! a time, and finalized into a polygon path. Node positions are the midpoints
//! of the portal edges through which polygons are first reached.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use navcrowd_common::vdist;

use crate::poly_mesh::PolyMesh;
use crate::{PathResult, PolyRef, QueryFilter, QueryResult, Status};

/// Heuristic scale, slightly below one to keep the search admissible
const H_SCALE: f32 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    New,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct SearchNode {
    poly: PolyRef,
    parent: Option<usize>,
    pos: [f32; 3],
    cost: f32,
    total: f32,
    state: NodeState,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    total: f32,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the binary heap pops the cheapest node first
        other
            .total
            .total_cmp(&self.total)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// State of an incremental path search
#[derive(Debug, Clone)]
pub struct SlicedSearch {
    start_ref: PolyRef,
    end_ref: PolyRef,
    end_pos: [f32; 3],
    filter: QueryFilter,
    nodes: Vec<SearchNode>,
    lookup: HashMap<PolyRef, usize>,
    open: BinaryHeap<OpenEntry>,
    last_best: usize,
    last_best_cost: f32,
    max_nodes: usize,
    out_of_nodes: bool,
    status: Status,
}

impl SlicedSearch {
    pub(crate) fn new(
        mesh: &PolyMesh,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: &[f32; 3],
        end_pos: &[f32; 3],
        filter: &QueryFilter,
    ) -> QueryResult<Self> {
        mesh.poly(start_ref)?;
        mesh.poly(end_ref)?;

        let h = vdist(start_pos, end_pos) * H_SCALE;
        let start = SearchNode {
            poly: start_ref,
            parent: None,
            pos: *start_pos,
            cost: 0.0,
            total: h,
            state: NodeState::Open,
        };

        let mut search = Self {
            start_ref,
            end_ref,
            end_pos: *end_pos,
            filter: filter.clone(),
            nodes: vec![start],
            lookup: HashMap::from([(start_ref, 0)]),
            open: BinaryHeap::new(),
            last_best: 0,
            last_best_cost: h,
            max_nodes: mesh.max_search_nodes,
            out_of_nodes: false,
            status: Status::InProgress,
        };

        if start_ref == end_ref {
            search.status = Status::Success;
        } else {
            search.open.push(OpenEntry { total: h, node: 0 });
        }
        Ok(search)
    }

    /// Current status of the search
    pub fn status(&self) -> Status {
        self.status
    }

    /// Number of nodes touched so far
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn update(&mut self, mesh: &PolyMesh, max_iter: usize) -> (usize, Status) {
        if !self.status.is_in_progress() {
            return (0, self.status);
        }

        // The mesh may have changed since the search started
        if mesh.poly(self.start_ref).is_err() || mesh.poly(self.end_ref).is_err() {
            self.status = Status::Failure;
            return (0, self.status);
        }

        let mut iter = 0;
        while iter < max_iter {
            let Some(entry) = self.open.pop() else {
                // Exhausted all reachable nodes
                self.status = Status::Success;
                return (iter, self.status);
            };
            let best_idx = entry.node;
            {
                let best = &self.nodes[best_idx];
                if best.state != NodeState::Open || best.total != entry.total {
                    // Stale heap entry
                    continue;
                }
            }
            iter += 1;
            self.nodes[best_idx].state = NodeState::Closed;

            let best_ref = self.nodes[best_idx].poly;
            if best_ref == self.end_ref {
                self.last_best = best_idx;
                self.status = Status::Success;
                return (iter, self.status);
            }

            let Ok(best_poly) = mesh.poly(best_ref) else {
                self.status = Status::Failure;
                return (iter, self.status);
            };
            let best_pos = self.nodes[best_idx].pos;
            let best_cost = self.nodes[best_idx].cost;
            let parent_ref = self.nodes[best_idx].parent.map(|p| self.nodes[p].poly);

            for link in &best_poly.links {
                let nei_ref = PolyRef::from_index(link.poly);
                // Do not expand back to where we came from
                if Some(nei_ref) == parent_ref {
                    continue;
                }
                let Some(nei_poly) = mesh.polys.get(link.poly) else {
                    continue;
                };
                if !self.filter.pass_filter(nei_poly.flags) {
                    continue;
                }

                let nei_idx = match self.lookup.get(&nei_ref) {
                    Some(&i) => i,
                    None => {
                        if self.nodes.len() >= self.max_nodes {
                            self.out_of_nodes = true;
                            continue;
                        }
                        let Ok(pos) = mesh.edge_mid_point(best_ref, nei_ref) else {
                            continue;
                        };
                        self.nodes.push(SearchNode {
                            poly: nei_ref,
                            parent: None,
                            pos,
                            cost: 0.0,
                            total: 0.0,
                            state: NodeState::New,
                        });
                        self.lookup.insert(nei_ref, self.nodes.len() - 1);
                        self.nodes.len() - 1
                    }
                };

                let nei_pos = self.nodes[nei_idx].pos;
                let cur_cost = self.filter.get_cost(&best_pos, &nei_pos, best_poly.area);
                let (cost, heuristic) = if nei_ref == self.end_ref {
                    let end_cost = self.filter.get_cost(&nei_pos, &self.end_pos, nei_poly.area);
                    (best_cost + cur_cost + end_cost, 0.0)
                } else {
                    (best_cost + cur_cost, vdist(&nei_pos, &self.end_pos) * H_SCALE)
                };
                let total = cost + heuristic;

                let nei = &mut self.nodes[nei_idx];
                if nei.state != NodeState::New && total >= nei.total {
                    continue;
                }

                nei.parent = Some(best_idx);
                nei.cost = cost;
                nei.total = total;
                nei.state = NodeState::Open;
                self.open.push(OpenEntry {
                    total,
                    node: nei_idx,
                });

                if heuristic < self.last_best_cost {
                    self.last_best_cost = heuristic;
                    self.last_best = nei_idx;
                }
            }
        }

        (iter, self.status)
    }

    pub(crate) fn finalize(&mut self, max_path: usize) -> QueryResult<PathResult> {
        if self.status.is_failure() {
            return Err(self.status);
        }
        if self.start_ref == self.end_ref {
            return Ok(PathResult {
                path: vec![self.start_ref],
                partial: false,
            });
        }
        Ok(self.reconstruct(self.last_best, max_path))
    }

    pub(crate) fn finalize_partial(&mut self, existing: &[PolyRef], max_path: usize) -> QueryResult<PathResult> {
        if existing.is_empty() {
            return Err(Status::InvalidParam);
        }
        if self.status.is_failure() {
            return Err(self.status);
        }
        if self.start_ref == self.end_ref {
            return Ok(PathResult {
                path: vec![self.start_ref],
                partial: false,
            });
        }

        // Find the furthest existing polygon the search has touched
        let node = existing
            .iter()
            .rev()
            .find_map(|r| self.lookup.get(r).copied())
            .unwrap_or(self.last_best);
        Ok(self.reconstruct(node, max_path))
    }

    fn reconstruct(&self, node: usize, max_path: usize) -> PathResult {
        let mut path = Vec::new();
        let mut cur = Some(node);
        while let Some(i) = cur {
            path.push(self.nodes[i].poly);
            cur = self.nodes[i].parent;
        }
        path.reverse();
        path.truncate(max_path.max(1));

        let partial = self.nodes[node].poly != self.end_ref || path.last() != Some(&self.end_ref);
        PathResult { path, partial }
    }

    /// Whether the search ran out of nodes before exhausting the mesh
    pub fn is_out_of_nodes(&self) -> bool {
        self.out_of_nodes
    }
}
