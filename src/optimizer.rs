use crate::config::{RunConfig, ScheduleMode, SweepConfig};
use crate::cost::{DataCostSource, SmoothCostSource};
use crate::energy::EnergyBreakdown;
use crate::labelcost::{LabelCostGroup, LabelCostSet};
use crate::maxflow::MaxflowSolver;
use crate::moves::MoveContext;
use crate::random::create_random_provider;
use crate::results::{RunDiagnostics, RunReport};
use crate::schema::{Cost, LabelId, Labeling, ProblemInstance, SiteId, SmoothSpec, TopologySpec};
use crate::scheduler;
use crate::topology::{EdgeSpec, GridTopology, Neighborhood};
use anyhow::Context;
use std::time::{Duration, Instant};
use tracing::info;

/// The engine facade: owns the labeling state and the solver arenas,
/// borrows everything out per run. Configure sites/labels, topology and
/// cost sources, then run expansion, swap, or both.
pub struct Optimizer {
    num_sites: usize,
    num_labels: usize,
    neighborhood: Neighborhood,
    data: Option<DataCostSource>,
    smooth: Option<SmoothCostSource>,
    label_costs: LabelCostSet,
    labeling: Labeling,
    solver: MaxflowSolver,
}

impl Optimizer {
    pub fn new(num_sites: usize, num_labels: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(num_sites > 0, "num_sites must be > 0");
        anyhow::ensure!(num_labels > 0, "num_labels must be > 0");
        Ok(Self {
            num_sites,
            num_labels,
            neighborhood: Neighborhood::empty(num_sites),
            data: None,
            smooth: None,
            label_costs: LabelCostSet::empty(num_labels),
            labeling: Labeling::uniform(num_sites, 0),
            solver: MaxflowSolver::new(),
        })
    }

    pub fn from_problem(problem: &ProblemInstance) -> anyhow::Result<Self> {
        let mut optimizer = Self::new(problem.num_sites, problem.num_labels)?;
        match &problem.topology {
            TopologySpec::Grid(grid) => optimizer.set_grid(grid.clone())?,
            TopologySpec::Edges(edges) => optimizer.set_neighbors(edges)?,
        }
        optimizer.set_data_cost(DataCostSource::dense(
            problem.num_sites,
            problem.num_labels,
            problem.data_costs.clone(),
        )?)?;
        let smooth = match &problem.smooth {
            SmoothSpec::Potts { penalty } => SmoothCostSource::potts(*penalty)?,
            SmoothSpec::Dense { table } => {
                SmoothCostSource::dense(problem.num_labels, table.clone())?
            }
        };
        optimizer.set_smooth_cost(smooth)?;
        optimizer.set_label_costs(problem.label_costs.clone())?;
        if let Some(initial) = &problem.initial_labeling {
            optimizer.set_labeling(initial)?;
        }
        Ok(optimizer)
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn set_grid(&mut self, grid: GridTopology) -> anyhow::Result<()> {
        anyhow::ensure!(
            grid.num_sites() == self.num_sites,
            "grid covers {} sites, optimizer was configured for {}",
            grid.num_sites(),
            self.num_sites
        );
        self.neighborhood = Neighborhood::from_grid(&grid)?;
        Ok(())
    }

    pub fn set_neighbors(&mut self, edges: &[EdgeSpec]) -> anyhow::Result<()> {
        self.neighborhood = Neighborhood::from_edges(self.num_sites, edges)?;
        Ok(())
    }

    pub fn set_data_cost(&mut self, source: DataCostSource) -> anyhow::Result<()> {
        match &source {
            DataCostSource::Dense { num_labels, table } => {
                anyhow::ensure!(
                    *num_labels == self.num_labels
                        && table.len() == self.num_sites * self.num_labels,
                    "dense data cost dimensions do not match {} sites x {} labels",
                    self.num_sites,
                    self.num_labels
                );
            }
            DataCostSource::Sparse(sparse) => {
                anyhow::ensure!(
                    sparse.num_sites() == self.num_sites,
                    "sparse data cost covers {} sites, optimizer has {}",
                    sparse.num_sites(),
                    self.num_sites
                );
            }
            DataCostSource::Callback(_) => {}
        }
        self.data = Some(source);
        Ok(())
    }

    pub fn set_smooth_cost(&mut self, source: SmoothCostSource) -> anyhow::Result<()> {
        if let SmoothCostSource::Dense { num_labels, .. } = &source {
            anyhow::ensure!(
                *num_labels == self.num_labels,
                "dense smooth cost is over {} labels, optimizer has {}",
                num_labels,
                self.num_labels
            );
        }
        self.smooth = Some(source);
        Ok(())
    }

    pub fn set_label_costs(&mut self, groups: Vec<LabelCostGroup>) -> anyhow::Result<()> {
        self.label_costs = LabelCostSet::new(self.num_labels, groups)?;
        Ok(())
    }

    pub fn set_label(&mut self, site: SiteId, label: LabelId) -> anyhow::Result<()> {
        anyhow::ensure!(site < self.num_sites, "site {site} out of range");
        anyhow::ensure!(label < self.num_labels, "label {label} out of range");
        self.labeling.set(site, label);
        Ok(())
    }

    pub fn set_labeling(&mut self, labels: &[LabelId]) -> anyhow::Result<()> {
        anyhow::ensure!(
            labels.len() == self.num_sites,
            "labeling covers {} sites, optimizer has {}",
            labels.len(),
            self.num_sites
        );
        anyhow::ensure!(
            labels.iter().all(|&l| l < self.num_labels),
            "labeling references a label outside [0, {})",
            self.num_labels
        );
        self.labeling = Labeling::from_labels(labels.to_vec());
        Ok(())
    }

    pub fn label_of(&self, site: SiteId) -> LabelId {
        self.labeling.get(site)
    }

    pub fn labeling(&self) -> &[LabelId] {
        self.labeling.as_slice()
    }

    pub fn total_energy(&self) -> anyhow::Result<Cost> {
        Ok(self.energy_breakdown()?.total)
    }

    pub fn energy_breakdown(&self) -> anyhow::Result<EnergyBreakdown> {
        let data = self.data.as_ref().context("no data cost source configured")?;
        let smooth = self
            .smooth
            .as_ref()
            .context("no smooth cost source configured")?;
        let ctx = MoveContext {
            data,
            smooth,
            neighborhood: &self.neighborhood,
            label_costs: &self.label_costs,
        };
        Ok(ctx.energy_model().breakdown(&self.labeling))
    }

    pub fn run_expansion(&mut self, sweep: &SweepConfig) -> anyhow::Result<RunReport> {
        self.run(ScheduleMode::Expansion, sweep)
    }

    pub fn run_swap(&mut self, sweep: &SweepConfig) -> anyhow::Result<RunReport> {
        self.run(ScheduleMode::Swap, sweep)
    }

    pub fn run_hybrid(&mut self, sweep: &SweepConfig) -> anyhow::Result<RunReport> {
        self.run(ScheduleMode::Hybrid, sweep)
    }

    fn run(&mut self, mode: ScheduleMode, sweep: &SweepConfig) -> anyhow::Result<RunReport> {
        sweep.validate()?;
        let data = self.data.as_ref().context("no data cost source configured")?;
        let smooth = self
            .smooth
            .as_ref()
            .context("no smooth cost source configured")?;
        let ctx = MoveContext {
            data,
            smooth,
            neighborhood: &self.neighborhood,
            label_costs: &self.label_costs,
        };
        let provider = create_random_provider(&sweep.random);
        let deadline = sweep
            .time_budget_secs
            .map(|secs| Instant::now() + Duration::from_secs_f64(secs));
        let mut diagnostics = RunDiagnostics::default();
        let (status, passes) = match mode {
            ScheduleMode::Expansion => scheduler::run_expansion(
                &ctx,
                &mut self.solver,
                &mut self.labeling,
                self.num_labels,
                sweep,
                &provider,
                deadline,
                &mut diagnostics,
            )?,
            ScheduleMode::Swap => scheduler::run_swap(
                &ctx,
                &mut self.solver,
                &mut self.labeling,
                self.num_labels,
                sweep,
                &provider,
                deadline,
                &mut diagnostics,
            )?,
            ScheduleMode::Hybrid => scheduler::run_hybrid(
                &ctx,
                &mut self.solver,
                &mut self.labeling,
                self.num_labels,
                sweep,
                &provider,
                deadline,
                &mut diagnostics,
            )?,
        };
        let breakdown = ctx.energy_model().breakdown(&self.labeling);
        diagnostics.clamp_warnings += breakdown.clamped_terms;
        let report = RunReport {
            final_energy: breakdown.total,
            status,
            passes,
            breakdown,
            diagnostics,
        };
        info!(
            target: "labelcut::optimizer",
            ?mode,
            ?status,
            passes,
            final_energy = report.final_energy,
            moves_applied = report.diagnostics.moves_applied,
            moves_skipped = report.diagnostics.moves_skipped,
            "run finished"
        );
        Ok(report)
    }
}

/// Runs a deserialized problem under a CLI run configuration. File I/O
/// stays with the caller.
pub fn run_problem(
    problem: &ProblemInstance,
    config: &RunConfig,
) -> anyhow::Result<(Optimizer, RunReport)> {
    config.validate()?;
    let mut optimizer = Optimizer::from_problem(problem)?;
    let report = match config.mode {
        ScheduleMode::Expansion => optimizer.run_expansion(&config.sweep)?,
        ScheduleMode::Swap => optimizer.run_swap(&config.sweep)?,
        ScheduleMode::Hybrid => optimizer.run_hybrid(&config.sweep)?,
    };
    Ok((optimizer, report))
}
