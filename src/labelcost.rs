use crate::schema::{Cost, LabelId, Labeling};
use serde::{Deserialize, Serialize};

/// A one-time usage cost shared by a set of labels: the cost is charged
/// once if any member label appears anywhere in the final labeling. A
/// single-label cost is a singleton group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelCostGroup {
    pub cost: Cost,
    pub labels: Vec<LabelId>,
}

impl LabelCostGroup {
    pub fn single(label: LabelId, cost: Cost) -> Self {
        Self {
            cost,
            labels: vec![label],
        }
    }
}

/// Validated collection of label-cost groups. Groups must be disjoint;
/// membership is resolved to a per-label index at construction.
#[derive(Debug, Clone, Default)]
pub struct LabelCostSet {
    groups: Vec<LabelCostGroup>,
    group_of_label: Vec<Option<usize>>,
}

impl LabelCostSet {
    pub fn empty(num_labels: usize) -> Self {
        Self {
            groups: Vec::new(),
            group_of_label: vec![None; num_labels],
        }
    }

    pub fn new(num_labels: usize, groups: Vec<LabelCostGroup>) -> anyhow::Result<Self> {
        let mut group_of_label: Vec<Option<usize>> = vec![None; num_labels];
        for (idx, group) in groups.iter().enumerate() {
            anyhow::ensure!(
                group.cost >= 0,
                "label cost group {idx} has negative cost {}",
                group.cost
            );
            anyhow::ensure!(
                !group.labels.is_empty(),
                "label cost group {idx} names no labels"
            );
            for &label in &group.labels {
                anyhow::ensure!(
                    label < num_labels,
                    "label cost group {idx} names label {label}, have {num_labels} labels"
                );
                anyhow::ensure!(
                    group_of_label[label].is_none(),
                    "label {label} appears in more than one label cost group"
                );
                group_of_label[label] = Some(idx);
            }
        }
        Ok(Self {
            groups,
            group_of_label,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[LabelCostGroup] {
        &self.groups
    }

    pub fn group_of(&self, label: LabelId) -> Option<usize> {
        self.group_of_label.get(label).copied().flatten()
    }

    /// Sum of the costs of all groups with at least one label in use.
    pub fn active_cost(&self, labeling: &Labeling) -> Cost {
        let mut active = vec![false; self.groups.len()];
        for &label in labeling.as_slice() {
            if let Some(idx) = self.group_of(label) {
                active[idx] = true;
            }
        }
        self.groups
            .iter()
            .zip(active)
            .filter(|(_, used)| *used)
            .map(|(group, _)| group.cost)
            .sum()
    }

    /// How many sites currently carry a label belonging to `group`.
    pub fn usage_count(&self, labeling: &Labeling, group: usize) -> usize {
        labeling
            .as_slice()
            .iter()
            .filter(|&&label| self.group_of(label) == Some(group))
            .count()
    }
}
