use crate::cost::{clamp_cost, DataCostSource, SmoothCostSource};
use crate::energy::EnergyModel;
use crate::labelcost::LabelCostSet;
use crate::maxflow::{MaxflowSolver, NodeId};
use crate::results::{RunDiagnostics, SubmodularityViolation};
use crate::schema::{Cost, LabelId, Labeling, SiteId};
use crate::topology::Neighborhood;
use tracing::debug;

const NO_NODE: u32 = u32::MAX;
/// Capacity of the structural arcs tying label-cost indicator nodes to
/// their sites; must never saturate.
const INDICATOR_CAP: Cost = Cost::MAX / 8;

/// Read-only view of one configured problem, shared by every move of a
/// run. The labeling is deliberately not part of it: moves borrow the
/// labeling mutably and exclusively.
pub struct MoveContext<'a> {
    pub data: &'a DataCostSource,
    pub smooth: &'a SmoothCostSource,
    pub neighborhood: &'a Neighborhood,
    pub label_costs: &'a LabelCostSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Cut applied; `relabeled` sites changed, energy afterwards given.
    Applied { relabeled: usize, energy: Cost },
    /// Cut computed but nothing changed (or the move had no active sites).
    NoChange,
    /// Move skipped over a submodularity violation, labeling untouched.
    Skipped,
}

#[derive(Clone, Copy)]
struct PairTerm {
    node_a: NodeId,
    node_b: NodeId,
    a: Cost,
    b: Cost,
    c: Cost,
    d: Cost,
}

impl<'a> MoveContext<'a> {
    pub fn energy_model(&self) -> EnergyModel<'_> {
        EnergyModel::new(self.data, self.smooth, self.neighborhood, self.label_costs)
    }

    fn clamped(&self, raw: Cost, diag: &mut RunDiagnostics) -> Cost {
        let (value, clamped) = clamp_cost(raw);
        if clamped {
            diag.clamp_warnings += 1;
        }
        value
    }

    fn smooth_term(
        &self,
        site_a: SiteId,
        site_b: SiteId,
        label_a: LabelId,
        label_b: LabelId,
        weight: Cost,
        diag: &mut RunDiagnostics,
    ) -> Cost {
        let raw = self
            .smooth
            .cost(site_a, site_b, label_a, label_b)
            .saturating_mul(weight);
        self.clamped(raw, diag)
    }

    /// Data costs of keeping vs moving, in one ordered sparse-cursor walk
    /// when the source is sparse.
    fn data_pair(
        &self,
        site: SiteId,
        keep: LabelId,
        switch: LabelId,
        diag: &mut RunDiagnostics,
    ) -> (Cost, Cost) {
        let (raw_keep, raw_switch) = match self.data {
            DataCostSource::Sparse(sparse) => {
                let mut cursor = sparse.cursor(site);
                if keep <= switch {
                    let k = cursor.advance_to(keep);
                    let s = cursor.advance_to(switch);
                    (k, s)
                } else {
                    let s = cursor.advance_to(switch);
                    let k = cursor.advance_to(keep);
                    (k, s)
                }
            }
            _ => (self.data.cost(site, keep), self.data.cost(site, switch)),
        };
        (self.clamped(raw_keep, diag), self.clamped(raw_switch, diag))
    }
}

/// Adds the pairwise term E(x_a, x_b) with E(0,0)=a, E(0,1)=b, E(1,0)=c,
/// E(1,1)=d to the flow network. Requires a + d <= b + c; callers verify
/// before constructing.
fn add_pairwise_term(solver: &mut MaxflowSolver, term: &PairTerm) -> anyhow::Result<()> {
    let PairTerm { node_a, node_b, a, b, c, d } = *term;
    solver.add_tweights(node_a, d, a);
    let b = b - a;
    let c = c - d;
    if b < 0 {
        solver.add_tweights(node_a, 0, b);
        solver.add_tweights(node_b, 0, -b);
        solver.add_edge(node_a, node_b, 0, b + c)?;
    } else if c < 0 {
        solver.add_tweights(node_a, 0, -c);
        solver.add_tweights(node_b, 0, c);
        solver.add_edge(node_a, node_b, b + c, 0)?;
    } else if b > 0 || c > 0 {
        solver.add_edge(node_a, node_b, b, c)?;
    }
    Ok(())
}

/// One α-expansion step: every site not labeled α chooses between keeping
/// its label (source side) and switching to α (sink side).
pub fn expansion_move(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    alpha: LabelId,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<MoveOutcome> {
    let num_sites = labeling.len();
    let mut site_node = vec![NO_NODE; num_sites];
    let mut active_sites = Vec::new();
    for site in 0..num_sites {
        if labeling.get(site) != alpha {
            site_node[site] = active_sites.len() as u32;
            active_sites.push(site);
        }
    }
    if active_sites.is_empty() {
        return Ok(MoveOutcome::NoChange);
    }

    // validate every two-sided pair before touching the solver
    let mut pair_terms = Vec::new();
    for &site in &active_sites {
        let la = labeling.get(site);
        for &(nb, weight) in ctx.neighborhood.neighbors_of(site) {
            if site_node[nb] == NO_NODE || nb < site {
                continue;
            }
            let lb = labeling.get(nb);
            let a = ctx.smooth_term(site, nb, la, lb, weight, diag);
            let b = ctx.smooth_term(site, nb, la, alpha, weight, diag);
            let c = ctx.smooth_term(site, nb, alpha, lb, weight, diag);
            let d = ctx.smooth_term(site, nb, alpha, alpha, weight, diag);
            if a + d > b + c {
                diag.record_violation(SubmodularityViolation {
                    alpha,
                    beta: None,
                    site_a: site,
                    site_b: nb,
                    label_a: la,
                    label_b: lb,
                });
                debug!(
                    target: "labelcut::moves",
                    alpha, site, nb, la, lb,
                    "expansion move skipped on non-submodular pair"
                );
                return Ok(MoveOutcome::Skipped);
            }
            pair_terms.push(PairTerm {
                node_a: site_node[site],
                node_b: site_node[nb],
                a,
                b,
                c,
                d,
            });
        }
    }

    // groups containing alpha with no current member label are charged
    // once if any site adopts alpha; groups already in use stay constant
    let mut indicators = Vec::new();
    for (group_idx, group) in ctx.label_costs.groups().iter().enumerate() {
        if group.cost > 0
            && group.labels.contains(&alpha)
            && ctx.label_costs.usage_count(labeling, group_idx) == 0
        {
            indicators.push(group.cost);
        }
    }

    let num_active = active_sites.len();
    solver.reset(
        num_active + indicators.len(),
        pair_terms.len() + num_active * indicators.len(),
    );

    for (idx, &site) in active_sites.iter().enumerate() {
        let la = labeling.get(site);
        let (mut keep, mut switch) = ctx.data_pair(site, la, alpha, diag);
        for &(nb, weight) in ctx.neighborhood.neighbors_of(site) {
            if site_node[nb] != NO_NODE {
                continue;
            }
            // neighbor already holds alpha: only this side still chooses
            keep += ctx.smooth_term(site, nb, la, alpha, weight, diag);
            switch += ctx.smooth_term(site, nb, alpha, alpha, weight, diag);
        }
        let keep = ctx.clamped(keep, diag);
        let switch = ctx.clamped(switch, diag);
        solver.add_tweights(idx as NodeId, switch, keep);
    }

    for term in &pair_terms {
        add_pairwise_term(solver, term)?;
    }

    for (offset, &cost) in indicators.iter().enumerate() {
        let indicator = (num_active + offset) as NodeId;
        solver.add_tweights(indicator, cost, 0);
        for idx in 0..num_active {
            solver.add_edge(indicator, idx as NodeId, INDICATOR_CAP, 0)?;
        }
    }

    solver.maxflow();

    let mut candidate = labeling.clone();
    let mut relabeled = 0;
    for (idx, &site) in active_sites.iter().enumerate() {
        if solver.is_sink_side(idx as NodeId) {
            candidate.set(site, alpha);
            relabeled += 1;
        }
    }
    finish_move(ctx, labeling, candidate, relabeled, diag)
}

/// One αβ-swap step: every site labeled α or β is redistributed between
/// the two (α on the source side, β on the sink side).
pub fn swap_move(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    alpha: LabelId,
    beta: LabelId,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<MoveOutcome> {
    let num_sites = labeling.len();
    let mut site_node = vec![NO_NODE; num_sites];
    let mut active_sites = Vec::new();
    for site in 0..num_sites {
        let label = labeling.get(site);
        if label == alpha || label == beta {
            site_node[site] = active_sites.len() as u32;
            active_sites.push(site);
        }
    }
    if active_sites.is_empty() {
        return Ok(MoveOutcome::NoChange);
    }

    let mut pair_terms = Vec::new();
    for &site in &active_sites {
        for &(nb, weight) in ctx.neighborhood.neighbors_of(site) {
            if site_node[nb] == NO_NODE || nb < site {
                continue;
            }
            let a = ctx.smooth_term(site, nb, alpha, alpha, weight, diag);
            let b = ctx.smooth_term(site, nb, alpha, beta, weight, diag);
            let c = ctx.smooth_term(site, nb, beta, alpha, weight, diag);
            let d = ctx.smooth_term(site, nb, beta, beta, weight, diag);
            if a + d > b + c {
                diag.record_violation(SubmodularityViolation {
                    alpha,
                    beta: Some(beta),
                    site_a: site,
                    site_b: nb,
                    label_a: labeling.get(site),
                    label_b: labeling.get(nb),
                });
                debug!(
                    target: "labelcut::moves",
                    alpha, beta, site, nb,
                    "swap move skipped on non-submodular pair"
                );
                return Ok(MoveOutcome::Skipped);
            }
            pair_terms.push(PairTerm {
                node_a: site_node[site],
                node_b: site_node[nb],
                a,
                b,
                c,
                d,
            });
        }
    }

    // indicator per group reachable through exactly one of the two labels
    // and not pinned by sites outside the move
    let mut indicators = Vec::new();
    for (group_idx, group) in ctx.label_costs.groups().iter().enumerate() {
        if group.cost == 0 {
            continue;
        }
        let has_alpha = group.labels.contains(&alpha);
        let has_beta = group.labels.contains(&beta);
        if has_alpha == has_beta {
            continue;
        }
        let pinned_outside = labeling.as_slice().iter().any(|&label| {
            label != alpha && label != beta && ctx.label_costs.group_of(label) == Some(group_idx)
        });
        if pinned_outside {
            continue;
        }
        indicators.push((group.cost, has_alpha));
    }

    let num_active = active_sites.len();
    solver.reset(
        num_active + indicators.len(),
        pair_terms.len() + num_active * indicators.len(),
    );

    for (idx, &site) in active_sites.iter().enumerate() {
        let (mut to_alpha, mut to_beta) = ctx.data_pair(site, alpha, beta, diag);
        for &(nb, weight) in ctx.neighborhood.neighbors_of(site) {
            if site_node[nb] != NO_NODE {
                continue;
            }
            let lb = labeling.get(nb);
            to_alpha += ctx.smooth_term(site, nb, alpha, lb, weight, diag);
            to_beta += ctx.smooth_term(site, nb, beta, lb, weight, diag);
        }
        let to_alpha = ctx.clamped(to_alpha, diag);
        let to_beta = ctx.clamped(to_beta, diag);
        solver.add_tweights(idx as NodeId, to_beta, to_alpha);
    }

    for term in &pair_terms {
        add_pairwise_term(solver, term)?;
    }

    for (offset, &(cost, alpha_side)) in indicators.iter().enumerate() {
        let indicator = (num_active + offset) as NodeId;
        if alpha_side {
            // charged when any site lands on alpha (source side)
            solver.add_tweights(indicator, 0, cost);
            for idx in 0..num_active {
                solver.add_edge(idx as NodeId, indicator, INDICATOR_CAP, 0)?;
            }
        } else {
            solver.add_tweights(indicator, cost, 0);
            for idx in 0..num_active {
                solver.add_edge(indicator, idx as NodeId, INDICATOR_CAP, 0)?;
            }
        }
    }

    solver.maxflow();

    let mut candidate = labeling.clone();
    let mut relabeled = 0;
    for (idx, &site) in active_sites.iter().enumerate() {
        let new_label = if solver.is_sink_side(idx as NodeId) {
            beta
        } else {
            alpha
        };
        if candidate.get(site) != new_label {
            candidate.set(site, new_label);
            relabeled += 1;
        }
    }
    finish_move(ctx, labeling, candidate, relabeled, diag)
}

/// Accepts the candidate only when the exactly recomputed energy does not
/// increase; anything else rolls back and is recorded.
fn finish_move(
    ctx: &MoveContext<'_>,
    labeling: &mut Labeling,
    candidate: Labeling,
    relabeled: usize,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<MoveOutcome> {
    if relabeled == 0 {
        return Ok(MoveOutcome::NoChange);
    }
    let model = ctx.energy_model();
    let before = model.total(labeling);
    let after = model.total(&candidate);
    if after > before {
        diag.moves_rejected += 1;
        debug!(
            target: "labelcut::moves",
            before, after, relabeled,
            "cut rejected: energy would increase"
        );
        return Ok(MoveOutcome::NoChange);
    }
    *labeling = candidate;
    Ok(MoveOutcome::Applied {
        relabeled,
        energy: after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labelcost::{LabelCostGroup, LabelCostSet};
    use crate::topology::{EdgeSpec, GridTopology};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn context<'a>(
        data: &'a DataCostSource,
        smooth: &'a SmoothCostSource,
        hood: &'a Neighborhood,
        costs: &'a LabelCostSet,
    ) -> MoveContext<'a> {
        MoveContext {
            data,
            smooth,
            neighborhood: hood,
            label_costs: costs,
        }
    }

    /// Exhaustive reference: best labeling over all K^N assignments.
    fn brute_force_best(model: &EnergyModel<'_>, num_sites: usize, num_labels: usize) -> Cost {
        let mut best = Cost::MAX;
        let mut assignment = vec![0usize; num_sites];
        loop {
            let labeling = Labeling::from_labels(assignment.clone());
            best = best.min(model.total(&labeling));
            let mut carry = 0;
            loop {
                if carry == num_sites {
                    return best;
                }
                assignment[carry] += 1;
                if assignment[carry] < num_labels {
                    break;
                }
                assignment[carry] = 0;
                carry += 1;
            }
        }
    }

    #[test]
    fn expansion_matches_brute_force_on_binary_pairs() {
        // two sites, two labels: one expansion from all-1 toward label 0
        // must find the exact optimum for every submodular table
        let mut rng = StdRng::seed_from_u64(23);
        let hood = Neighborhood::from_edges(2, &[EdgeSpec { a: 0, b: 1, weight: 1 }]).unwrap();
        let costs = LabelCostSet::empty(2);
        for _ in 0..200 {
            let data_table: Vec<Cost> = (0..4).map(|_| rng.gen_range(0..20)).collect();
            let v00 = rng.gen_range(0..10);
            let v11 = rng.gen_range(0..10);
            let spread = rng.gen_range(0..10);
            // force V(0,0) + V(1,1) <= V(0,1) + V(1,0)
            let v01 = v00.max(v11) + spread;
            let v10 = v00.max(v11);
            let smooth_table = vec![v00, v01, v10, v11];
            let data = DataCostSource::dense(2, 2, data_table).unwrap();
            let smooth = SmoothCostSource::dense(2, smooth_table).unwrap();
            let ctx = context(&data, &smooth, &hood, &costs);
            let mut labeling = Labeling::uniform(2, 1);
            let mut solver = MaxflowSolver::new();
            let mut diag = RunDiagnostics::default();
            expansion_move(&ctx, &mut solver, &mut labeling, 0, &mut diag).unwrap();
            let model = ctx.energy_model();
            // the binary subproblem (each site: keep 1 or take 0) is exact
            let best = brute_force_best(&model, 2, 2);
            assert_eq!(model.total(&labeling), best);
            assert!(diag.submodularity_violations.is_empty());
        }
    }

    #[test]
    fn swap_matches_brute_force_on_binary_pairs() {
        let mut rng = StdRng::seed_from_u64(31);
        let hood = Neighborhood::from_edges(2, &[EdgeSpec { a: 0, b: 1, weight: 1 }]).unwrap();
        let costs = LabelCostSet::empty(2);
        for _ in 0..200 {
            let data_table: Vec<Cost> = (0..4).map(|_| rng.gen_range(0..20)).collect();
            let v00 = rng.gen_range(0..6);
            let v11 = rng.gen_range(0..6);
            let v01 = v00.max(v11) + rng.gen_range(0..8);
            let v10 = v00.max(v11) + rng.gen_range(0..8);
            let data = DataCostSource::dense(2, 2, data_table).unwrap();
            let smooth = SmoothCostSource::dense(2, vec![v00, v01, v10, v11]).unwrap();
            let ctx = context(&data, &smooth, &hood, &costs);
            let mut labeling = Labeling::from_labels(vec![0, 1]);
            let mut solver = MaxflowSolver::new();
            let mut diag = RunDiagnostics::default();
            swap_move(&ctx, &mut solver, &mut labeling, 0, 1, &mut diag).unwrap();
            let model = ctx.energy_model();
            let best = brute_force_best(&model, 2, 2);
            assert_eq!(model.total(&labeling), best);
        }
    }

    #[test]
    fn expansion_skips_non_submodular_pair() {
        // V(1,2) alone is large: expanding 0 over labels (1,2) violates
        // V(1,2) + V(0,0) <= V(1,0) + V(0,2)
        let mut table = vec![0; 9];
        table[1 * 3 + 2] = 10;
        let data = DataCostSource::dense(2, 3, vec![0; 6]).unwrap();
        let smooth = SmoothCostSource::dense(3, table).unwrap();
        let hood = Neighborhood::from_edges(2, &[EdgeSpec { a: 0, b: 1, weight: 1 }]).unwrap();
        let costs = LabelCostSet::empty(3);
        let ctx = context(&data, &smooth, &hood, &costs);
        let mut labeling = Labeling::from_labels(vec![1, 2]);
        let before = labeling.clone();
        let mut solver = MaxflowSolver::new();
        let mut diag = RunDiagnostics::default();
        let outcome = expansion_move(&ctx, &mut solver, &mut labeling, 0, &mut diag).unwrap();
        assert_eq!(outcome, MoveOutcome::Skipped);
        assert_eq!(labeling, before);
        assert_eq!(diag.submodularity_violations.len(), 1);
        let violation = &diag.submodularity_violations[0];
        assert_eq!(violation.alpha, 0);
        assert_eq!((violation.label_a, violation.label_b), (1, 2));
    }

    #[test]
    fn label_cost_blocks_unprofitable_adoption() {
        // switching saves 3 per site in data cost but wakes a group
        // costing 7: one site should not switch, three sites should
        let smooth = SmoothCostSource::potts(0).unwrap();
        let group = vec![LabelCostGroup::single(1, 7)];

        let data = DataCostSource::dense(1, 2, vec![3, 0]).unwrap();
        let hood = Neighborhood::empty(1);
        let costs = LabelCostSet::new(2, group.clone()).unwrap();
        let ctx = context(&data, &smooth, &hood, &costs);
        let mut labeling = Labeling::uniform(1, 0);
        let mut solver = MaxflowSolver::new();
        let mut diag = RunDiagnostics::default();
        expansion_move(&ctx, &mut solver, &mut labeling, 1, &mut diag).unwrap();
        assert_eq!(labeling.as_slice(), &[0]);

        let data = DataCostSource::dense(3, 2, vec![3, 0, 3, 0, 3, 0]).unwrap();
        let hood = Neighborhood::empty(3);
        let costs = LabelCostSet::new(2, group).unwrap();
        let ctx = context(&data, &smooth, &hood, &costs);
        let mut labeling = Labeling::uniform(3, 0);
        let mut diag = RunDiagnostics::default();
        let outcome = expansion_move(&ctx, &mut solver, &mut labeling, 1, &mut diag).unwrap();
        assert_eq!(labeling.as_slice(), &[1, 1, 1]);
        assert_eq!(
            outcome,
            MoveOutcome::Applied { relabeled: 3, energy: 7 }
        );
    }

    #[test]
    fn swap_respects_one_sided_label_cost() {
        // two sites on 0, each preferring 1 by 2; label 1 costs 5
        let data = DataCostSource::dense(2, 2, vec![2, 0, 2, 0]).unwrap();
        let smooth = SmoothCostSource::potts(0).unwrap();
        let hood = Neighborhood::empty(2);
        let costs = LabelCostSet::new(2, vec![LabelCostGroup::single(1, 5)]).unwrap();
        let ctx = context(&data, &smooth, &hood, &costs);
        let mut labeling = Labeling::uniform(2, 0);
        let mut solver = MaxflowSolver::new();
        let mut diag = RunDiagnostics::default();
        swap_move(&ctx, &mut solver, &mut labeling, 0, 1, &mut diag).unwrap();
        // 4 saved < 5 charged: stay put
        assert_eq!(labeling.as_slice(), &[0, 0]);

        let costs = LabelCostSet::new(2, vec![LabelCostGroup::single(1, 3)]).unwrap();
        let ctx = context(&data, &smooth, &hood, &costs);
        let mut diag = RunDiagnostics::default();
        swap_move(&ctx, &mut solver, &mut labeling, 0, 1, &mut diag).unwrap();
        assert_eq!(labeling.as_slice(), &[1, 1]);
    }

    #[test]
    fn expansion_on_grid_prefers_smooth_regions() {
        // strong Potts coupling pulls the lone dissenting site over
        let data = DataCostSource::dense(
            4,
            2,
            vec![0, 2, 0, 2, 0, 2, 2, 0],
        )
        .unwrap();
        let smooth = SmoothCostSource::potts(3).unwrap();
        let hood = Neighborhood::from_grid(&GridTopology::four(2, 2)).unwrap();
        let costs = LabelCostSet::empty(2);
        let ctx = context(&data, &smooth, &hood, &costs);
        let mut labeling = Labeling::from_labels(vec![0, 0, 0, 1]);
        let mut solver = MaxflowSolver::new();
        let mut diag = RunDiagnostics::default();
        let outcome = expansion_move(&ctx, &mut solver, &mut labeling, 0, &mut diag).unwrap();
        assert!(matches!(outcome, MoveOutcome::Applied { relabeled: 1, .. }));
        assert_eq!(labeling.as_slice(), &[0, 0, 0, 0]);
    }
}
