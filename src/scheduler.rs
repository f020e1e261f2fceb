use crate::config::{LabelOrder, SweepConfig};
use crate::maxflow::MaxflowSolver;
use crate::moves::{expansion_move, swap_move, MoveContext, MoveOutcome};
use crate::random::RandomProviderHandle;
use crate::results::{RunDiagnostics, RunStatus};
use crate::schema::{LabelId, Labeling};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Instant;
use tracing::info;

// Moves are strictly sequential: each one reads and rewrites the shared
// labeling and reuses the solver arenas, so a run owns both exclusively
// for its whole duration.

fn past_deadline(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn sweep_order<T: Clone>(
    items: &[T],
    sweep: &SweepConfig,
    provider: &RandomProviderHandle,
    tag: &str,
) -> Vec<T> {
    let mut order: Vec<T> = items.to_vec();
    if sweep.label_order == LabelOrder::Shuffled {
        let mut rng = StdRng::seed_from_u64(provider.next_seed(tag));
        order.shuffle(&mut rng);
    }
    order
}

fn tally(outcome: MoveOutcome, diag: &mut RunDiagnostics) -> usize {
    match outcome {
        MoveOutcome::Applied { relabeled, .. } => {
            diag.moves_applied += 1;
            diag.relabeled_sites += relabeled;
            relabeled
        }
        MoveOutcome::NoChange => {
            diag.moves_no_change += 1;
            0
        }
        // the skip itself is counted by record_violation
        MoveOutcome::Skipped => 0,
    }
}

/// One pass of expansion moves over every label. Returns the number of
/// relabeled sites, or None when the deadline fired between moves.
fn expansion_pass(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    num_labels: usize,
    sweep: &SweepConfig,
    provider: &RandomProviderHandle,
    deadline: Option<Instant>,
    pass: usize,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<Option<usize>> {
    let labels: Vec<LabelId> = (0..num_labels).collect();
    let order = sweep_order(&labels, sweep, provider, &format!("expansion-pass-{pass}"));
    let mut changes = 0;
    for alpha in order {
        if past_deadline(deadline) {
            return Ok(None);
        }
        let outcome = expansion_move(ctx, solver, labeling, alpha, diag)?;
        changes += tally(outcome, diag);
    }
    Ok(Some(changes))
}

/// One pass of swap moves over every unordered label pair.
fn swap_pass(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    num_labels: usize,
    sweep: &SweepConfig,
    provider: &RandomProviderHandle,
    deadline: Option<Instant>,
    pass: usize,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<Option<usize>> {
    let mut pairs = Vec::new();
    for a in 0..num_labels {
        for b in (a + 1)..num_labels {
            pairs.push((a, b));
        }
    }
    let order = sweep_order(&pairs, sweep, provider, &format!("swap-pass-{pass}"));
    let mut changes = 0;
    for (alpha, beta) in order {
        if past_deadline(deadline) {
            return Ok(None);
        }
        let outcome = swap_move(ctx, solver, labeling, alpha, beta, diag)?;
        changes += tally(outcome, diag);
    }
    Ok(Some(changes))
}

pub fn run_expansion(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    num_labels: usize,
    sweep: &SweepConfig,
    provider: &RandomProviderHandle,
    deadline: Option<Instant>,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<(RunStatus, usize)> {
    for pass in 0..sweep.max_passes {
        let Some(changes) = expansion_pass(
            ctx, solver, labeling, num_labels, sweep, provider, deadline, pass, diag,
        )?
        else {
            return Ok((RunStatus::TimeBudgetExhausted, pass));
        };
        let energy = ctx.energy_model().total(labeling);
        diag.energy_trace.push(energy);
        info!(
            target: "labelcut::scheduler",
            pass, changes, energy,
            "expansion pass finished"
        );
        if changes == 0 {
            return Ok((RunStatus::Converged, pass + 1));
        }
    }
    Ok((RunStatus::PassLimitReached, sweep.max_passes))
}

pub fn run_swap(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    num_labels: usize,
    sweep: &SweepConfig,
    provider: &RandomProviderHandle,
    deadline: Option<Instant>,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<(RunStatus, usize)> {
    for pass in 0..sweep.max_passes {
        let Some(changes) = swap_pass(
            ctx, solver, labeling, num_labels, sweep, provider, deadline, pass, diag,
        )?
        else {
            return Ok((RunStatus::TimeBudgetExhausted, pass));
        };
        let energy = ctx.energy_model().total(labeling);
        diag.energy_trace.push(energy);
        info!(
            target: "labelcut::scheduler",
            pass, changes, energy,
            "swap pass finished"
        );
        if changes == 0 {
            return Ok((RunStatus::Converged, pass + 1));
        }
    }
    Ok((RunStatus::PassLimitReached, sweep.max_passes))
}

/// Alternates expansion and swap passes until one round leaves the
/// labeling untouched by both.
pub fn run_hybrid(
    ctx: &MoveContext<'_>,
    solver: &mut MaxflowSolver,
    labeling: &mut Labeling,
    num_labels: usize,
    sweep: &SweepConfig,
    provider: &RandomProviderHandle,
    deadline: Option<Instant>,
    diag: &mut RunDiagnostics,
) -> anyhow::Result<(RunStatus, usize)> {
    let mut passes = 0;
    for round in 0..sweep.max_passes {
        let Some(expansion_changes) = expansion_pass(
            ctx, solver, labeling, num_labels, sweep, provider, deadline, round, diag,
        )?
        else {
            return Ok((RunStatus::TimeBudgetExhausted, passes));
        };
        passes += 1;
        diag.energy_trace.push(ctx.energy_model().total(labeling));

        let Some(swap_changes) = swap_pass(
            ctx, solver, labeling, num_labels, sweep, provider, deadline, round, diag,
        )?
        else {
            return Ok((RunStatus::TimeBudgetExhausted, passes));
        };
        passes += 1;
        let energy = ctx.energy_model().total(labeling);
        diag.energy_trace.push(energy);
        info!(
            target: "labelcut::scheduler",
            round, expansion_changes, swap_changes, energy,
            "hybrid round finished"
        );
        if expansion_changes == 0 && swap_changes == 0 {
            return Ok((RunStatus::Converged, passes));
        }
    }
    Ok((RunStatus::PassLimitReached, passes))
}
