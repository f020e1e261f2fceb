use crate::schema::{Cost, LabelId, SiteId, MAX_ENERGY_TERM};
use std::sync::Arc;

pub type DataCostFn = Arc<dyn Fn(SiteId, LabelId) -> Cost + Send + Sync>;
pub type SmoothCostFn = Arc<dyn Fn(SiteId, SiteId, LabelId, LabelId) -> Cost + Send + Sync>;

/// Clamp a raw cost term into `[0, MAX_ENERGY_TERM]`. Returns the clamped
/// value and whether clamping happened; callers count the second half into
/// their diagnostics.
pub fn clamp_cost(value: Cost) -> (Cost, bool) {
    if value > MAX_ENERGY_TERM {
        (MAX_ENERGY_TERM, true)
    } else if value < 0 {
        (0, true)
    } else {
        (value, false)
    }
}

/// Per-site data cost lookup. The variant is resolved once at configuration
/// time; lookups dispatch on the enum, not through a per-call registry.
#[derive(Clone)]
pub enum DataCostSource {
    Dense {
        num_labels: usize,
        table: Arc<Vec<Cost>>,
    },
    Callback(DataCostFn),
    Sparse(SparseDataCost),
}

impl DataCostSource {
    /// Site-major dense table: `table[site * num_labels + label]`.
    pub fn dense(num_sites: usize, num_labels: usize, table: Vec<Cost>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            table.len() == num_sites * num_labels,
            "dense data cost table has {} entries, expected {} ({} sites x {} labels)",
            table.len(),
            num_sites * num_labels,
            num_sites,
            num_labels
        );
        anyhow::ensure!(
            table.iter().all(|&c| c >= 0),
            "dense data cost table contains a negative entry"
        );
        Ok(Self::Dense {
            num_labels,
            table: Arc::new(table),
        })
    }

    pub fn callback(f: DataCostFn) -> Self {
        Self::Callback(f)
    }

    pub fn sparse(num_labels: usize, sites: Vec<Vec<(LabelId, Cost)>>) -> anyhow::Result<Self> {
        Ok(Self::Sparse(SparseDataCost::new(num_labels, sites)?))
    }

    /// Raw lookup without clamping. Dense and sparse variants are validated
    /// at construction; callback results are clamped by the caller.
    pub fn cost(&self, site: SiteId, label: LabelId) -> Cost {
        match self {
            Self::Dense { num_labels, table } => table[site * num_labels + label],
            Self::Callback(f) => f(site, label),
            Self::Sparse(sparse) => sparse.cost(site, label),
        }
    }
}

/// Per-site sparse data costs: each site holds a short list of
/// `(label, cost)` entries ordered by label; every unlisted label costs 0.
#[derive(Debug, Clone)]
pub struct SparseDataCost {
    sites: Arc<Vec<Vec<SparseEntry>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseEntry {
    pub label: LabelId,
    pub cost: Cost,
}

impl SparseDataCost {
    pub fn new(num_labels: usize, sites: Vec<Vec<(LabelId, Cost)>>) -> anyhow::Result<Self> {
        let mut converted = Vec::with_capacity(sites.len());
        for (site, entries) in sites.into_iter().enumerate() {
            let mut last: Option<LabelId> = None;
            let mut row = Vec::with_capacity(entries.len());
            for (label, cost) in entries {
                anyhow::ensure!(
                    label < num_labels,
                    "sparse data cost for site {site} names label {label}, have {num_labels} labels"
                );
                anyhow::ensure!(
                    cost >= 0,
                    "sparse data cost for site {site}, label {label} is negative"
                );
                if let Some(prev) = last {
                    anyhow::ensure!(
                        label > prev,
                        "sparse data costs for site {site} must be strictly ordered by label ({prev} then {label})"
                    );
                }
                last = Some(label);
                row.push(SparseEntry { label, cost });
            }
            converted.push(row);
        }
        Ok(Self {
            sites: Arc::new(converted),
        })
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn cost(&self, site: SiteId, label: LabelId) -> Cost {
        let row = &self.sites[site];
        match row.binary_search_by_key(&label, |entry| entry.label) {
            Ok(idx) => row[idx].cost,
            Err(_) => 0,
        }
    }

    /// Restartable forward cursor over one site's entries.
    pub fn cursor(&self, site: SiteId) -> SparseSiteCursor<'_> {
        SparseSiteCursor {
            entries: &self.sites[site],
            pos: 0,
        }
    }
}

/// Ordered cursor over the `(label, cost)` entries of one site. Consumers
/// query labels in non-decreasing order; `restart` rewinds for the next
/// merge pass. No state outside the cursor itself.
#[derive(Debug, Clone)]
pub struct SparseSiteCursor<'a> {
    entries: &'a [SparseEntry],
    pos: usize,
}

impl<'a> SparseSiteCursor<'a> {
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    pub fn peek(&self) -> Option<SparseEntry> {
        self.entries.get(self.pos).copied()
    }

    pub fn next(&mut self) -> Option<SparseEntry> {
        let entry = self.entries.get(self.pos).copied();
        if entry.is_some() {
            self.pos += 1;
        }
        entry
    }

    /// Advance to `label` and return its cost (0 when unlisted). Labels
    /// already passed are not revisited; query in order or `restart` first.
    pub fn advance_to(&mut self, label: LabelId) -> Cost {
        while let Some(entry) = self.entries.get(self.pos) {
            if entry.label >= label {
                break;
            }
            self.pos += 1;
        }
        match self.entries.get(self.pos) {
            Some(entry) if entry.label == label => entry.cost,
            _ => 0,
        }
    }
}

/// Pairwise smoothness cost lookup. `Potts` charges `penalty` iff the two
/// labels differ; edge weights scale the result at the call sites.
#[derive(Clone)]
pub enum SmoothCostSource {
    Dense {
        num_labels: usize,
        table: Arc<Vec<Cost>>,
    },
    Callback(SmoothCostFn),
    Potts {
        penalty: Cost,
    },
}

impl SmoothCostSource {
    /// Label-pair table: `table[l1 * num_labels + l2]`.
    pub fn dense(num_labels: usize, table: Vec<Cost>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            table.len() == num_labels * num_labels,
            "dense smooth cost table has {} entries, expected {}",
            table.len(),
            num_labels * num_labels
        );
        anyhow::ensure!(
            table.iter().all(|&c| c >= 0),
            "dense smooth cost table contains a negative entry"
        );
        Ok(Self::Dense {
            num_labels,
            table: Arc::new(table),
        })
    }

    pub fn callback(f: SmoothCostFn) -> Self {
        Self::Callback(f)
    }

    pub fn potts(penalty: Cost) -> anyhow::Result<Self> {
        anyhow::ensure!(penalty >= 0, "Potts penalty must be non-negative");
        Ok(Self::Potts { penalty })
    }

    pub fn cost(&self, site_a: SiteId, site_b: SiteId, label_a: LabelId, label_b: LabelId) -> Cost {
        match self {
            Self::Dense { num_labels, table } => table[label_a * num_labels + label_b],
            Self::Callback(f) => f(site_a, site_b, label_a, label_b),
            Self::Potts { penalty } => {
                if label_a == label_b {
                    0
                } else {
                    *penalty
                }
            }
        }
    }
}
