use crate::schema::Cost;
use std::collections::VecDeque;
use tracing::trace;

pub type NodeId = u32;

const NO_ARC: u32 = u32::MAX;
// parent_arc sentinels; everything below is a real arc index
const PARENT_NONE: u32 = u32::MAX;
const PARENT_TERMINAL: u32 = u32::MAX - 1;
const PARENT_ORPHAN: u32 = u32::MAX - 2;

#[derive(Debug, Clone)]
struct Node {
    first_arc: u32,
    parent_arc: u32,
    timestamp: u64,
    dist: u32,
    in_sink_tree: bool,
    is_active: bool,
    /// Residual terminal capacity: positive means source->node, negative
    /// means node->sink.
    tr_cap: Cost,
}

impl Node {
    fn fresh() -> Self {
        Self {
            first_arc: NO_ARC,
            parent_arc: PARENT_NONE,
            timestamp: 0,
            dist: 0,
            in_sink_tree: false,
            is_active: false,
            tr_cap: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Arc {
    head: u32,
    next: u32,
    r_cap: Cost,
}

/// Min-cut/max-flow over the per-move auxiliary graph, using the
/// dual-search-tree augmenting-path scheme: grow source and sink trees
/// from terminal-attached nodes, augment along each connecting path, then
/// re-adopt the orphans the augmentation saturated. Node and arc arenas
/// are reset in place between calls so a whole sweep of moves reuses one
/// allocation.
///
/// Arcs are stored in sister pairs: the reverse of arc `a` is `a ^ 1`.
pub struct MaxflowSolver {
    nodes: Vec<Node>,
    arcs: Vec<Arc>,
    active: VecDeque<u32>,
    orphans: VecDeque<u32>,
    time: u64,
    flow: Cost,
}

impl Default for MaxflowSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MaxflowSolver {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            arcs: Vec::new(),
            active: VecDeque::new(),
            orphans: VecDeque::new(),
            time: 0,
            flow: 0,
        }
    }

    /// Clears the arenas in place and lays out `num_nodes` fresh nodes.
    /// Capacity from previous calls is kept.
    pub fn reset(&mut self, num_nodes: usize, arcs_hint: usize) {
        self.nodes.clear();
        self.arcs.clear();
        self.active.clear();
        self.orphans.clear();
        self.time = 0;
        self.flow = 0;
        self.nodes.resize(num_nodes, Node::fresh());
        self.arcs.reserve(arcs_hint.saturating_mul(2));
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Attaches residual capacities toward source and sink. Negative
    /// inputs are allowed; they arise from the pairwise-term reduction and
    /// cancel against earlier contributions on the same node.
    pub fn add_tweights(&mut self, node: NodeId, cap_source: Cost, cap_sink: Cost) {
        self.flow += cap_source.min(cap_sink);
        self.nodes[node as usize].tr_cap += cap_source - cap_sink;
    }

    /// Adds the sister pair of directed arcs between `u` and `v`. Negative
    /// capacities mean the move construction broke its own reduction
    /// invariant, which is fatal.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId, cap: Cost, rev_cap: Cost) -> anyhow::Result<()> {
        anyhow::ensure!(
            cap >= 0 && rev_cap >= 0,
            "negative capacity ({cap}, {rev_cap}) on arc {u} -> {v}"
        );
        anyhow::ensure!(u != v, "arc {u} -> {v} is a self-loop");
        let forward = self.arcs.len() as u32;
        self.arcs.push(Arc {
            head: v,
            next: self.nodes[u as usize].first_arc,
            r_cap: cap,
        });
        self.nodes[u as usize].first_arc = forward;
        let backward = self.arcs.len() as u32;
        self.arcs.push(Arc {
            head: u,
            next: self.nodes[v as usize].first_arc,
            r_cap: rev_cap,
        });
        self.nodes[v as usize].first_arc = backward;
        Ok(())
    }

    /// Runs the solver to completion and returns the max-flow value, which
    /// equals the minimum cut of the constructed graph (including the
    /// constant part folded in by `add_tweights`).
    pub fn maxflow(&mut self) -> Cost {
        self.init_trees();
        let mut augmentations = 0u64;
        while let Some(p) = self.pop_active() {
            if self.nodes[p as usize].parent_arc == PARENT_NONE {
                continue;
            }
            if let Some(middle) = self.grow_from(p) {
                self.time += 1;
                self.augment(middle);
                self.adopt_orphans();
                augmentations += 1;
                // the interrupted scan restarts later
                self.set_active(p);
            }
        }
        trace!(
            target: "labelcut::maxflow",
            nodes = self.nodes.len(),
            augmentations,
            flow = self.flow,
            "maxflow finished"
        );
        self.flow
    }

    /// After `maxflow`: true when the node ended on the sink side of the
    /// cut. Nodes in neither search tree read as source side.
    pub fn is_sink_side(&self, node: NodeId) -> bool {
        let n = &self.nodes[node as usize];
        n.parent_arc != PARENT_NONE && n.in_sink_tree
    }

    fn init_trees(&mut self) {
        self.active.clear();
        self.orphans.clear();
        self.time = 1;
        for id in 0..self.nodes.len() as u32 {
            let node = &mut self.nodes[id as usize];
            node.is_active = false;
            node.timestamp = 1;
            node.dist = 1;
            if node.tr_cap > 0 {
                node.parent_arc = PARENT_TERMINAL;
                node.in_sink_tree = false;
            } else if node.tr_cap < 0 {
                node.parent_arc = PARENT_TERMINAL;
                node.in_sink_tree = true;
            } else {
                node.parent_arc = PARENT_NONE;
                continue;
            }
            self.set_active(id);
        }
    }

    fn set_active(&mut self, node: NodeId) {
        if !self.nodes[node as usize].is_active {
            self.nodes[node as usize].is_active = true;
            self.active.push_back(node);
        }
    }

    fn pop_active(&mut self) -> Option<NodeId> {
        let node = self.active.pop_front()?;
        self.nodes[node as usize].is_active = false;
        Some(node)
    }

    /// Scans the arcs of tree node `p`. Free neighbors are adopted into
    /// `p`'s tree; a neighbor in the opposite tree yields the connecting
    /// arc, oriented from the source side to the sink side.
    fn grow_from(&mut self, p: NodeId) -> Option<u32> {
        let p_sink = self.nodes[p as usize].in_sink_tree;
        let mut a = self.nodes[p as usize].first_arc;
        while a != NO_ARC {
            let residual = if p_sink {
                self.arcs[(a ^ 1) as usize].r_cap
            } else {
                self.arcs[a as usize].r_cap
            };
            if residual > 0 {
                let q = self.arcs[a as usize].head;
                let (p_ts, p_dist) = {
                    let pn = &self.nodes[p as usize];
                    (pn.timestamp, pn.dist)
                };
                let qn = &mut self.nodes[q as usize];
                if qn.parent_arc == PARENT_NONE {
                    qn.in_sink_tree = p_sink;
                    qn.parent_arc = a ^ 1;
                    qn.timestamp = p_ts;
                    qn.dist = p_dist + 1;
                    self.set_active(q);
                } else if qn.in_sink_tree != p_sink {
                    return Some(if p_sink { a ^ 1 } else { a });
                } else if qn.timestamp <= p_ts && qn.dist > p_dist + 1 {
                    // same tree, strictly closer through p
                    qn.parent_arc = a ^ 1;
                    qn.timestamp = p_ts;
                    qn.dist = p_dist + 1;
                }
            }
            a = self.arcs[a as usize].next;
        }
        None
    }

    fn augment(&mut self, middle: u32) {
        // bottleneck over middle arc, both tree paths, and both terminals
        let mut bottleneck = self.arcs[middle as usize].r_cap;
        let mut i = self.arcs[(middle ^ 1) as usize].head;
        loop {
            let pa = self.nodes[i as usize].parent_arc;
            if pa == PARENT_TERMINAL {
                bottleneck = bottleneck.min(self.nodes[i as usize].tr_cap);
                break;
            }
            bottleneck = bottleneck.min(self.arcs[(pa ^ 1) as usize].r_cap);
            i = self.arcs[pa as usize].head;
        }
        let mut i = self.arcs[middle as usize].head;
        loop {
            let pa = self.nodes[i as usize].parent_arc;
            if pa == PARENT_TERMINAL {
                bottleneck = bottleneck.min(-self.nodes[i as usize].tr_cap);
                break;
            }
            bottleneck = bottleneck.min(self.arcs[pa as usize].r_cap);
            i = self.arcs[pa as usize].head;
        }

        self.arcs[middle as usize].r_cap -= bottleneck;
        self.arcs[(middle ^ 1) as usize].r_cap += bottleneck;

        // source-side path: saturated parent arcs orphan their child
        let mut i = self.arcs[(middle ^ 1) as usize].head;
        loop {
            let pa = self.nodes[i as usize].parent_arc;
            if pa == PARENT_TERMINAL {
                self.nodes[i as usize].tr_cap -= bottleneck;
                if self.nodes[i as usize].tr_cap == 0 {
                    self.make_orphan(i);
                }
                break;
            }
            self.arcs[pa as usize].r_cap += bottleneck;
            self.arcs[(pa ^ 1) as usize].r_cap -= bottleneck;
            if self.arcs[(pa ^ 1) as usize].r_cap == 0 {
                self.make_orphan(i);
            }
            i = self.arcs[pa as usize].head;
        }
        // sink-side path
        let mut i = self.arcs[middle as usize].head;
        loop {
            let pa = self.nodes[i as usize].parent_arc;
            if pa == PARENT_TERMINAL {
                self.nodes[i as usize].tr_cap += bottleneck;
                if self.nodes[i as usize].tr_cap == 0 {
                    self.make_orphan(i);
                }
                break;
            }
            self.arcs[pa as usize].r_cap -= bottleneck;
            self.arcs[(pa ^ 1) as usize].r_cap += bottleneck;
            if self.arcs[pa as usize].r_cap == 0 {
                self.make_orphan(i);
            }
            i = self.arcs[pa as usize].head;
        }

        self.flow += bottleneck;
    }

    fn make_orphan(&mut self, node: NodeId) {
        self.nodes[node as usize].parent_arc = PARENT_ORPHAN;
        self.orphans.push_back(node);
    }

    fn adopt_orphans(&mut self) {
        while let Some(node) = self.orphans.pop_front() {
            self.process_orphan(node);
        }
    }

    /// Distance from `start` to its terminal through valid parents, or
    /// None when the walk dead-ends at an orphan or free node. Distances
    /// found along the way are cached under the current timestamp.
    fn origin_distance(&mut self, start: u32) -> Option<u32> {
        let mut hops = 0u32;
        let mut j = start;
        let total;
        loop {
            if self.nodes[j as usize].timestamp == self.time {
                total = hops + self.nodes[j as usize].dist;
                break;
            }
            let pa = self.nodes[j as usize].parent_arc;
            if pa == PARENT_TERMINAL {
                self.nodes[j as usize].timestamp = self.time;
                self.nodes[j as usize].dist = 1;
                total = hops + 1;
                break;
            }
            if pa == PARENT_ORPHAN || pa == PARENT_NONE {
                return None;
            }
            hops += 1;
            j = self.arcs[pa as usize].head;
        }
        let mut dist = total;
        let mut j = start;
        while self.nodes[j as usize].timestamp != self.time {
            self.nodes[j as usize].timestamp = self.time;
            self.nodes[j as usize].dist = dist;
            dist -= 1;
            let pa = self.nodes[j as usize].parent_arc;
            if pa == PARENT_TERMINAL {
                break;
            }
            j = self.arcs[pa as usize].head;
        }
        Some(total)
    }

    fn process_orphan(&mut self, orphan: u32) {
        let in_sink = self.nodes[orphan as usize].in_sink_tree;
        let mut best_arc = NO_ARC;
        let mut best_dist = u32::MAX;

        let mut a = self.nodes[orphan as usize].first_arc;
        while a != NO_ARC {
            // a parent must reach the orphan with residual capacity in the
            // tree's flow direction
            let residual = if in_sink {
                self.arcs[a as usize].r_cap
            } else {
                self.arcs[(a ^ 1) as usize].r_cap
            };
            if residual > 0 {
                let q = self.arcs[a as usize].head;
                let q_ok = {
                    let qn = &self.nodes[q as usize];
                    qn.in_sink_tree == in_sink && qn.parent_arc != PARENT_NONE
                };
                if q_ok {
                    if let Some(d) = self.origin_distance(q) {
                        if d + 1 < best_dist {
                            best_dist = d + 1;
                            best_arc = a;
                        }
                    }
                }
            }
            a = self.arcs[a as usize].next;
        }

        if best_arc != NO_ARC {
            let node = &mut self.nodes[orphan as usize];
            node.parent_arc = best_arc;
            node.timestamp = self.time;
            node.dist = best_dist;
            return;
        }

        // no parent found: the orphan leaves its tree, children become
        // orphans, neighbors that may regrow toward it become active
        self.nodes[orphan as usize].parent_arc = PARENT_NONE;
        let mut a = self.nodes[orphan as usize].first_arc;
        while a != NO_ARC {
            let q = self.arcs[a as usize].head;
            let (q_same_tree, q_parent) = {
                let qn = &self.nodes[q as usize];
                (
                    qn.in_sink_tree == in_sink && qn.parent_arc != PARENT_NONE,
                    qn.parent_arc,
                )
            };
            if q_same_tree {
                let regrow_residual = if in_sink {
                    self.arcs[a as usize].r_cap
                } else {
                    self.arcs[(a ^ 1) as usize].r_cap
                };
                if regrow_residual > 0 {
                    self.set_active(q);
                }
                if q_parent != PARENT_TERMINAL
                    && q_parent != PARENT_ORPHAN
                    && self.arcs[q_parent as usize].head == orphan
                {
                    self.make_orphan(q);
                }
            }
            a = self.arcs[a as usize].next;
        }
    }
}
