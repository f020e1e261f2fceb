use crate::schema::{Cost, SiteId, MAX_ENERGY_TERM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connectivity {
    Four,
    Eight,
}

impl Default for Connectivity {
    fn default() -> Self {
        Connectivity::Four
    }
}

fn default_weight() -> Cost {
    1
}

/// Implicit topology for sites arranged as a `rows x cols` grid, site id
/// `row * cols + col`. Axis and diagonal edges carry separate weight
/// multipliers so anisotropic smoothness (e.g. scaled diagonal distance)
/// can be expressed with integer costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTopology {
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default = "default_weight")]
    pub axis_weight: Cost,
    #[serde(default = "default_weight")]
    pub diagonal_weight: Cost,
}

impl GridTopology {
    pub fn four(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            connectivity: Connectivity::Four,
            axis_weight: 1,
            diagonal_weight: 1,
        }
    }

    pub fn eight(rows: usize, cols: usize) -> Self {
        Self {
            connectivity: Connectivity::Eight,
            ..Self::four(rows, cols)
        }
    }

    pub fn num_sites(&self) -> usize {
        self.rows * self.cols
    }
}

/// One undirected weighted edge of an explicit neighbor list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub a: SiteId,
    pub b: SiteId,
    #[serde(default = "default_weight")]
    pub weight: Cost,
}

/// Symmetric site adjacency with per-edge weights, the form both the
/// energy evaluation and the move construction consume. Built once per
/// configuration from either topology variant.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    neighbors: Vec<Vec<(SiteId, Cost)>>,
    num_edges: usize,
}

impl Neighborhood {
    pub fn empty(num_sites: usize) -> Self {
        Self {
            neighbors: vec![Vec::new(); num_sites],
            num_edges: 0,
        }
    }

    pub fn from_grid(grid: &GridTopology) -> anyhow::Result<Self> {
        anyhow::ensure!(
            grid.rows > 0 && grid.cols > 0,
            "grid topology must have positive dimensions ({}x{})",
            grid.rows,
            grid.cols
        );
        anyhow::ensure!(
            grid.axis_weight >= 0 && grid.diagonal_weight >= 0,
            "grid edge weights must be non-negative"
        );
        let mut edges = Vec::new();
        let site = |r: usize, c: usize| r * grid.cols + c;
        for r in 0..grid.rows {
            for c in 0..grid.cols {
                if c + 1 < grid.cols {
                    edges.push(EdgeSpec {
                        a: site(r, c),
                        b: site(r, c + 1),
                        weight: grid.axis_weight,
                    });
                }
                if r + 1 < grid.rows {
                    edges.push(EdgeSpec {
                        a: site(r, c),
                        b: site(r + 1, c),
                        weight: grid.axis_weight,
                    });
                }
                if grid.connectivity == Connectivity::Eight && r + 1 < grid.rows {
                    if c + 1 < grid.cols {
                        edges.push(EdgeSpec {
                            a: site(r, c),
                            b: site(r + 1, c + 1),
                            weight: grid.diagonal_weight,
                        });
                    }
                    if c > 0 {
                        edges.push(EdgeSpec {
                            a: site(r, c),
                            b: site(r + 1, c - 1),
                            weight: grid.diagonal_weight,
                        });
                    }
                }
            }
        }
        Self::from_edges(grid.num_sites(), &edges)
    }

    /// Builds adjacency from an explicit edge list. Self-loops are
    /// rejected; duplicate pairs merge by summing their weights.
    pub fn from_edges(num_sites: usize, edges: &[EdgeSpec]) -> anyhow::Result<Self> {
        let mut merged: HashMap<(SiteId, SiteId), Cost> = HashMap::new();
        for edge in edges {
            anyhow::ensure!(
                edge.a != edge.b,
                "self-loop on site {} is not a valid neighbor relation",
                edge.a
            );
            anyhow::ensure!(
                edge.a < num_sites && edge.b < num_sites,
                "edge ({}, {}) references a site outside [0, {num_sites})",
                edge.a,
                edge.b
            );
            anyhow::ensure!(
                edge.weight >= 0,
                "edge ({}, {}) has negative weight {}",
                edge.a,
                edge.b,
                edge.weight
            );
            let key = (edge.a.min(edge.b), edge.a.max(edge.b));
            let entry = merged.entry(key).or_insert(0);
            *entry = entry.saturating_add(edge.weight);
        }
        let mut neighbors = vec![Vec::new(); num_sites];
        for (&(a, b), &weight) in merged.iter() {
            let weight = if weight > MAX_ENERGY_TERM {
                warn!(
                    target: "labelcut::topology",
                    a, b, weight, cap = MAX_ENERGY_TERM,
                    "edge weight clamped to the energy term cap"
                );
                MAX_ENERGY_TERM
            } else {
                weight
            };
            neighbors[a].push((b, weight));
            neighbors[b].push((a, weight));
        }
        for list in neighbors.iter_mut() {
            list.sort_unstable_by_key(|&(site, _)| site);
        }
        Ok(Self {
            num_edges: merged.len(),
            neighbors,
        })
    }

    pub fn num_sites(&self) -> usize {
        self.neighbors.len()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn neighbors_of(&self, site: SiteId) -> &[(SiteId, Cost)] {
        &self.neighbors[site]
    }

    /// Visits every undirected edge exactly once, as (a, b, weight) with
    /// a < b.
    pub fn for_each_edge<F: FnMut(SiteId, SiteId, Cost)>(&self, mut f: F) {
        for (a, list) in self.neighbors.iter().enumerate() {
            for &(b, weight) in list {
                if a < b {
                    f(a, b, weight);
                }
            }
        }
    }
}
