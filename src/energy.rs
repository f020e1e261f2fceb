use crate::cost::{clamp_cost, DataCostSource, SmoothCostSource};
use crate::labelcost::LabelCostSet;
use crate::schema::{Cost, Labeling};
use crate::topology::Neighborhood;
use serde::{Deserialize, Serialize};

/// Per-term decomposition of a labeling's energy. `clamped_terms` counts
/// individual lookups that hit the energy-term cap during evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergyBreakdown {
    pub data: Cost,
    pub smooth: Cost,
    pub label: Cost,
    pub total: Cost,
    #[serde(default)]
    pub clamped_terms: u64,
}

/// Exact energy evaluation over the configured cost sources. Borrows the
/// optimizer's configuration; never mutates the labeling it reads.
pub struct EnergyModel<'a> {
    data: &'a DataCostSource,
    smooth: &'a SmoothCostSource,
    neighborhood: &'a Neighborhood,
    label_costs: &'a LabelCostSet,
}

impl<'a> EnergyModel<'a> {
    pub fn new(
        data: &'a DataCostSource,
        smooth: &'a SmoothCostSource,
        neighborhood: &'a Neighborhood,
        label_costs: &'a LabelCostSet,
    ) -> Self {
        Self {
            data,
            smooth,
            neighborhood,
            label_costs,
        }
    }

    pub fn total(&self, labeling: &Labeling) -> Cost {
        self.breakdown(labeling).total
    }

    pub fn breakdown(&self, labeling: &Labeling) -> EnergyBreakdown {
        let mut clamped_terms = 0u64;
        let mut clamp = |value: Cost| {
            let (value, clamped) = clamp_cost(value);
            if clamped {
                clamped_terms += 1;
            }
            value
        };

        let mut data = 0;
        for (site, &label) in labeling.as_slice().iter().enumerate() {
            data += clamp(self.data.cost(site, label));
        }

        let mut smooth = 0;
        self.neighborhood.for_each_edge(|a, b, weight| {
            let term = self
                .smooth
                .cost(a, b, labeling.get(a), labeling.get(b))
                .saturating_mul(weight);
            smooth += clamp(term);
        });

        let label = self.label_costs.active_cost(labeling);

        EnergyBreakdown {
            data,
            smooth,
            label,
            total: data + smooth + label,
            clamped_terms,
        }
    }

    pub fn data_energy(&self, labeling: &Labeling) -> Cost {
        self.breakdown(labeling).data
    }

    pub fn smooth_energy(&self, labeling: &Labeling) -> Cost {
        self.breakdown(labeling).smooth
    }

    pub fn label_energy(&self, labeling: &Labeling) -> Cost {
        self.label_costs.active_cost(labeling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::SparseDataCost;
    use crate::labelcost::LabelCostGroup;
    use crate::schema::MAX_ENERGY_TERM;
    use crate::topology::{EdgeSpec, GridTopology};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    #[test]
    fn breakdown_sums_all_three_terms() {
        let data = DataCostSource::dense(2, 2, vec![1, 9, 9, 2]).unwrap();
        let smooth = SmoothCostSource::potts(5).unwrap();
        let hood = Neighborhood::from_grid(&GridTopology::four(1, 2)).unwrap();
        let costs = LabelCostSet::new(2, vec![LabelCostGroup::single(1, 4)]).unwrap();
        let model = EnergyModel::new(&data, &smooth, &hood, &costs);
        let labeling = Labeling::from_labels(vec![0, 1]);
        let breakdown = model.breakdown(&labeling);
        assert_eq!(breakdown.data, 1 + 2);
        assert_eq!(breakdown.smooth, 5);
        assert_eq!(breakdown.label, 4);
        assert_eq!(breakdown.total, 12);
        assert_eq!(breakdown.clamped_terms, 0);
    }

    #[test]
    fn dense_and_sparse_sources_agree() {
        let num_sites = 6;
        let num_labels = 4;
        let mut rng = StdRng::seed_from_u64(11);
        let mut table = vec![0; num_sites * num_labels];
        let mut sparse_rows = Vec::new();
        for site in 0..num_sites {
            let mut row = Vec::new();
            for label in 0..num_labels {
                // leave some entries at zero so the sparse form stays short
                if rng.gen_bool(0.6) {
                    let cost = rng.gen_range(1..50);
                    table[site * num_labels + label] = cost;
                    row.push((label, cost));
                }
            }
            sparse_rows.push(row);
        }
        let dense = DataCostSource::dense(num_sites, num_labels, table).unwrap();
        let sparse = DataCostSource::Sparse(SparseDataCost::new(num_labels, sparse_rows).unwrap());
        let smooth = SmoothCostSource::potts(3).unwrap();
        let hood = Neighborhood::from_grid(&GridTopology::four(2, 3)).unwrap();
        let costs = LabelCostSet::empty(num_labels);
        let dense_model = EnergyModel::new(&dense, &smooth, &hood, &costs);
        let sparse_model = EnergyModel::new(&sparse, &smooth, &hood, &costs);
        for _ in 0..20 {
            let labels: Vec<_> = (0..num_sites)
                .map(|_| rng.gen_range(0..num_labels))
                .collect();
            let labeling = Labeling::from_labels(labels);
            assert_eq!(dense_model.total(&labeling), sparse_model.total(&labeling));
        }
    }

    #[test]
    fn oversized_terms_clamp_and_count() {
        let data = DataCostSource::callback(Arc::new(|_, _| MAX_ENERGY_TERM + 100));
        let smooth = SmoothCostSource::potts(0).unwrap();
        let hood = Neighborhood::empty(3);
        let costs = LabelCostSet::empty(2);
        let model = EnergyModel::new(&data, &smooth, &hood, &costs);
        let breakdown = model.breakdown(&Labeling::uniform(3, 0));
        assert_eq!(breakdown.data, 3 * MAX_ENERGY_TERM);
        assert_eq!(breakdown.clamped_terms, 3);
    }

    #[test]
    fn edge_weight_scales_smooth_term() {
        let data = DataCostSource::dense(2, 2, vec![0; 4]).unwrap();
        let smooth = SmoothCostSource::potts(2).unwrap();
        let hood = Neighborhood::from_edges(2, &[EdgeSpec { a: 0, b: 1, weight: 6 }]).unwrap();
        let costs = LabelCostSet::empty(2);
        let model = EnergyModel::new(&data, &smooth, &hood, &costs);
        assert_eq!(model.total(&Labeling::from_labels(vec![0, 1])), 12);
        assert_eq!(model.total(&Labeling::from_labels(vec![1, 1])), 0);
    }
}
