use serde::{Deserialize, Serialize};

use crate::labelcost::LabelCostGroup;
use crate::topology::{EdgeSpec, GridTopology};

pub type SiteId = usize;
pub type LabelId = usize;

/// Cost/capacity scalar used throughout the engine. Signed so that the
/// solver can keep residual terminal capacities in one field, but every
/// configured cost must be non-negative.
pub type Cost = i64;

/// Reserved label value meaning "no label assigned".
pub const UNLABELED: LabelId = LabelId::MAX;

/// Upper bound for a single cost term. Anything larger is clamped and a
/// warning recorded, so that sums over sites and edges stay far away from
/// `Cost` overflow.
pub const MAX_ENERGY_TERM: Cost = 10_000_000;

/// The site -> label assignment. Single owner: the move scheduler; cost
/// sources only ever see it behind a shared reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labeling {
    labels: Vec<LabelId>,
}

impl Labeling {
    pub fn uniform(num_sites: usize, label: LabelId) -> Self {
        Self {
            labels: vec![label; num_sites],
        }
    }

    pub fn from_labels(labels: Vec<LabelId>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, site: SiteId) -> LabelId {
        self.labels[site]
    }

    pub fn set(&mut self, site: SiteId, label: LabelId) {
        self.labels[site] = label;
    }

    pub fn as_slice(&self) -> &[LabelId] {
        &self.labels
    }

    /// Number of sites whose label differs from `other`. Both labelings
    /// must cover the same site range.
    pub fn diff_count(&self, other: &Labeling) -> usize {
        self.labels
            .iter()
            .zip(other.labels.iter())
            .filter(|(a, b)| a != b)
            .count()
    }

    pub fn uses_label(&self, label: LabelId) -> bool {
        self.labels.iter().any(|&l| l == label)
    }
}

/// Topology half of a problem description, either an implicit grid or an
/// explicit weighted edge list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologySpec {
    Grid(GridTopology),
    Edges(Vec<EdgeSpec>),
}

/// Smoothness half of a problem description. Callback sources have no
/// serialized form; hosts that need one supply tables or Potts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmoothSpec {
    Potts { penalty: Cost },
    Dense { table: Vec<Cost> },
}

/// A complete, serializable problem instance as handed over by a host
/// pipeline. Dense data costs are site-major: `data_costs[site * K + label]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemInstance {
    pub num_sites: usize,
    pub num_labels: usize,
    pub topology: TopologySpec,
    pub data_costs: Vec<Cost>,
    pub smooth: SmoothSpec,
    #[serde(default)]
    pub label_costs: Vec<LabelCostGroup>,
    #[serde(default)]
    pub initial_labeling: Option<Vec<LabelId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeling_diff_count() {
        let a = Labeling::from_labels(vec![0, 1, 2, 0]);
        let mut b = a.clone();
        assert_eq!(a.diff_count(&b), 0);
        b.set(1, 0);
        b.set(3, 2);
        assert_eq!(a.diff_count(&b), 2);
    }

    #[test]
    fn labeling_uses_label() {
        let labeling = Labeling::uniform(4, 0);
        assert!(labeling.uses_label(0));
        assert!(!labeling.uses_label(1));
        assert!(!labeling.uses_label(UNLABELED));
    }
}
