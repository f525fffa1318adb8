//! The main per-trajectory loop (snapshot, advance, reconcile, commit-or-retry, emit), plus the
//! public [`tau_hybrid_solve`] entry point that runs it across all trajectories.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::config::SimulationConfig;
use crate::error::{HybridError, HybridResult};
use crate::integrator::{Integrator, IntegratorStatus};
use crate::model::{Model, PartitionMode};
use crate::propensity::PropensityEvaluator;
use crate::rhs::RhsFunction;
use crate::state::{draw_log_offset, PackedState};
use crate::writer::{TrajectoryBuffers, TrajectoryWriter};

/// A splitmix64-style constant used only to decorrelate per-trajectory seeds derived from one
/// `random_seed`; not a cryptographic concern, just avoids SmallRng streams that are too close
/// together for adjacent trajectory indices.
const SEED_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// Everything one call to [`tau_hybrid_solve`] needs: the shared model, the propensity evaluator,
/// caller-owned output buffers, the reporting timeline, and run parameters.
pub struct Simulation<'a, E> {
    pub model: &'a Model,
    pub evaluator: &'a E,
    pub buffers: &'a mut TrajectoryBuffers,
    /// Monotonic, uniformly spaced report times; `end_time = timeline[timeline.len() - 1]`.
    pub timeline: &'a [f64],
    pub number_trajectories: usize,
    /// `0` means "seed nondeterministically" (§6).
    pub random_seed: u64,
    /// Observed, never installed, by the driver (§4.7, §9): the caller owns signal handling.
    pub interrupt: Arc<AtomicBool>,
}

/// Summary of one [`tau_hybrid_solve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub trajectories_completed: usize,
    pub interrupted: bool,
}

/// `tau_hybrid_solve`: the crate's one public entry point (§6). Runs `sim.number_trajectories`
/// independent trajectories sequentially, each writing into `sim.buffers`.
pub fn tau_hybrid_solve<E: PropensityEvaluator>(
    sim: &mut Simulation<'_, E>,
    config: SimulationConfig,
) -> HybridResult<SimulationOutcome> {
    validate_inputs(&*sim)?;

    let base_seed = if sim.random_seed == 0 {
        rand::random::<u64>()
    } else {
        sim.random_seed
    };

    let mut completed = 0;
    for traj in 0..sim.number_trajectories {
        if sim.interrupt.load(Ordering::SeqCst) {
            return Ok(SimulationOutcome {
                trajectories_completed: completed,
                interrupted: true,
            });
        }

        let seed = base_seed ^ (traj as u64).wrapping_mul(SEED_SPREAD);
        let mut rng = SmallRng::seed_from_u64(seed);
        info!("trajectory {traj}/{} starting (seed {seed:#x})", sim.number_trajectories);

        let outcome = run_trajectory(sim.model, sim.evaluator, &mut *sim.buffers, sim.timeline, traj, &config, &mut rng, &sim.interrupt)?;
        info!("trajectory {traj} finished: {outcome:?}");

        match outcome {
            TrajectoryOutcome::Completed => completed += 1,
            TrajectoryOutcome::Interrupted => {
                return Ok(SimulationOutcome {
                    trajectories_completed: completed,
                    interrupted: true,
                })
            }
        }
    }

    Ok(SimulationOutcome {
        trajectories_completed: completed,
        interrupted: false,
    })
}

fn validate_inputs<E>(sim: &Simulation<'_, E>) -> HybridResult<()> {
    if sim.timeline.len() < 2 {
        return Err(HybridError::InvalidInput("timeline must have at least 2 points".into()));
    }
    if sim.timeline.windows(2).any(|w| w[1] <= w[0]) {
        return Err(HybridError::InvalidInput("timeline must be strictly monotone increasing".into()));
    }
    let dt0 = sim.timeline[1] - sim.timeline[0];
    let uniform = sim
        .timeline
        .windows(2)
        .all(|w| ((w[1] - w[0]) - dt0).abs() <= 1e-9 * dt0.max(1.0));
    if !uniform {
        return Err(HybridError::InvalidInput("timeline must be uniformly spaced".into()));
    }
    if sim.buffers.num_species() != sim.model.num_species() {
        return Err(HybridError::InvalidInput("buffer species count does not match model".into()));
    }
    if sim.buffers.num_timesteps() != sim.timeline.len() {
        return Err(HybridError::InvalidInput("buffer timestep count does not match timeline".into()));
    }
    if sim.buffers.num_trajectories() < sim.number_trajectories {
        return Err(HybridError::InvalidInput("buffers too small for number_trajectories".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrajectoryOutcome {
    Completed,
    Interrupted,
}

/// Per-species ring buffer of recent continuous-mode values, used to classify `Dynamic` species
/// (§4.6). Only populated for species with `user_mode == Dynamic`.
struct DynamicHistory {
    windows: Vec<VecDeque<f64>>,
    capacity: usize,
}

impl DynamicHistory {
    fn new(num_species: usize, capacity: usize) -> Self {
        DynamicHistory {
            windows: (0..num_species).map(|_| VecDeque::with_capacity(capacity)).collect(),
            capacity,
        }
    }

    fn push(&mut self, species: usize, value: f64) {
        let w = &mut self.windows[species];
        if w.len() == self.capacity {
            w.pop_front();
        }
        w.push_back(value);
    }
}

/// Classifies a `Dynamic` species' partition mode from its recent history plus the current
/// sample, by coefficient of variation (σ/μ) against `switch_tol`, or against `switch_min` on
/// the raw mean when a population threshold is configured. Non-`Dynamic` species have a fixed
/// partition and never reach this function.
fn classify_dynamic_species(species: &crate::model::Species, history: &VecDeque<f64>, current_value: f64) -> PartitionMode {
    let mean = if history.is_empty() {
        current_value
    } else {
        (history.iter().sum::<f64>() + current_value) / (history.len() + 1) as f64
    };
    if mean <= 0.0 {
        return PartitionMode::Discrete;
    }
    let is_continuous = match species.switch_min {
        Some(min) => mean >= min as f64,
        None => {
            let variance = if history.is_empty() {
                0.0
            } else {
                let n = (history.len() + 1) as f64;
                (history.iter().chain(std::iter::once(&current_value)).map(|v| (v - mean).powi(2)).sum::<f64>()) / n
            };
            (variance.sqrt() / mean) <= species.switch_tol
        }
    };
    if is_continuous {
        PartitionMode::Continuous
    } else {
        PartitionMode::Discrete
    }
}

#[allow(clippy::too_many_arguments)]
fn run_trajectory<E: PropensityEvaluator>(
    model: &Model,
    evaluator: &E,
    buffers: &mut TrajectoryBuffers,
    timeline: &[f64],
    traj: usize,
    config: &SimulationConfig,
    rng: &mut SmallRng,
    interrupt: &Arc<AtomicBool>,
) -> HybridResult<TrajectoryOutcome> {
    let num_species = model.num_species();
    let delta_t_report = timeline[1] - timeline[0];
    let end_time = timeline[timeline.len() - 1];
    let tau_floor = config.tau_step_floor_factor * delta_t_report;

    let mut state = PackedState::new(&model.initial_populations(), model.num_reactions(), rng);
    let rhs = RhsFunction::new(model, evaluator).with_magnitude(config.use_magnitude);
    let mut integrator = Integrator::create(&rhs, state.as_slice(), 0.0, config.rtol, config.atol);

    let mut history = DynamicHistory::new(num_species, config.dynamic_window);
    let mut writer = TrajectoryWriter::new(buffers, traj);

    // Initial sample at t=0: the raw initial populations, labelled by each species' fixed
    // partition (dynamic species default to their first-sample classification on zero history).
    for s in 0..num_species {
        let mode = species_mode(&model.species()[s], &history.windows[s], model.initial_populations()[s] as f64);
        writer.emit(0, s, model.initial_populations()[s] as f64, mode);
        if model.species()[s].user_mode == crate::model::UserMode::Dynamic {
            history.push(s, model.initial_populations()[s] as f64);
        }
    }

    let mut current_time = 0.0_f64;
    let mut tau_step = config.tau_tol * delta_t_report;
    let mut save_index = 1usize;
    let mut rejection_count = 0u64;

    while current_time < end_time {
        if interrupt.load(Ordering::SeqCst) {
            return Ok(TrajectoryOutcome::Interrupted);
        }

        let next_time = current_time + tau_step;
        let snapshot = state.clone();
        let snapshot_time = current_time;

        let (_t_reached, status) = integrator.advance(next_time);
        match status {
            IntegratorStatus::Fatal => {
                warn!("trajectory {traj}: integrator fatal at t={current_time}");
                return Err(HybridError::IntegratorFatal {
                    t: current_time,
                    reason: "stiff solver failed to converge".into(),
                });
            }
            IntegratorStatus::Recoverable => {
                // Treat exactly like a firing rejection: retry with a smaller tau_step.
                tau_step /= 2.0;
                integrator.reset(snapshot_time, snapshot.as_slice());
                rejection_count += 1;
                debug!("trajectory {traj}: integrator recoverable failure, tau_step -> {tau_step:e}");
                if tau_step < 10.0 * tau_floor {
                    warn!("trajectory {traj}: tau_step {tau_step:e} approaching underflow floor {tau_floor:e}");
                }
                if tau_step < tau_floor {
                    return Err(HybridError::TauUnderflow { t: current_time, floor: tau_floor });
                }
                continue;
            }
            IntegratorStatus::Ok => {}
        }
        state.as_mut_slice().copy_from_slice(integrator.current_state());

        match reconcile_step(model, &mut state, rng) {
            Some(()) => {
                current_time = next_time;
                // Reconciliation commits firings and drains offsets below zero in `state`; the
                // integrator must continue from that reconciled state, not its pre-reconcile one,
                // or accumulated offsets never actually decrease across accepted steps.
                integrator.reset(current_time, state.as_slice());
            }
            None => {
                state.restore_from(&snapshot);
                integrator.reset(snapshot_time, snapshot.as_slice());
                tau_step /= 2.0;
                rejection_count += 1;
                debug!("trajectory {traj}: firing reconciliation rejected, tau_step -> {tau_step:e}");
                if tau_step < 10.0 * tau_floor {
                    warn!("trajectory {traj}: tau_step {tau_step:e} approaching underflow floor {tau_floor:e}");
                }
                if tau_step < tau_floor {
                    return Err(HybridError::TauUnderflow { t: current_time, floor: tau_floor });
                }
                continue;
            }
        }

        if interrupt.load(Ordering::SeqCst) {
            return Ok(TrajectoryOutcome::Interrupted);
        }

        while save_index < timeline.len() && timeline[save_index] <= current_time + 1e-9 * delta_t_report {
            for s in 0..num_species {
                let value = state.concentrations()[s];
                let mode = species_mode(&model.species()[s], &history.windows[s], value);
                writer.emit(save_index, s, value, mode);
                if model.species()[s].user_mode == crate::model::UserMode::Dynamic {
                    history.push(s, value);
                }
            }
            save_index += 1;
        }
    }

    if rejection_count > 0 {
        debug!("trajectory {traj}: {rejection_count} step rejections total");
    }
    trace!("trajectory {traj}: {} RHS evaluations", rhs.eval_count());
    Ok(TrajectoryOutcome::Completed)
}

fn species_mode(species: &crate::model::Species, history: &VecDeque<f64>, current_value: f64) -> PartitionMode {
    match species.fixed_partition() {
        Some(mode) => mode,
        None => classify_dynamic_species(species, history, current_value),
    }
}

/// Attempts to reconcile every reaction's accumulated offset against a scratch copy of the
/// current populations; commits the scratch back into `state` only if every reaction's firing
/// loop accepted (§4.5). Returns `None`, leaving `state` untouched, on any rejection.
fn reconcile_step(model: &Model, state: &mut PackedState, rng: &mut impl rand::Rng) -> Option<()> {
    let mut populations = state.concentrations().to_vec();
    let mut offsets = state.offsets().to_vec();

    for reaction in model.reactions() {
        let new_offset = reconcile_reaction(&reaction.stoichiometry, &mut populations, offsets[reaction.id], rng)?;
        offsets[reaction.id] = new_offset;
    }

    state.concentrations_mut().copy_from_slice(&populations);
    state.offsets_mut().copy_from_slice(&offsets);
    Some(())
}

/// One reaction's firing-count reconciliation loop (§4.5): drains `rho` below zero, one firing
/// per iteration, mutating `populations` in place; returns `None` (rejected) the moment a firing
/// would drive any touched species negative, without applying that last tentative firing.
fn reconcile_reaction(stoichiometry: &[i64], populations: &mut [f64], mut rho: f64, rng: &mut impl rand::Rng) -> Option<f64> {
    while rho >= 0.0 {
        for (s, &nu) in stoichiometry.iter().enumerate() {
            if nu != 0 && populations[s] + nu as f64 < 0.0 {
                return None;
            }
        }
        for (s, &nu) in stoichiometry.iter().enumerate() {
            if nu != 0 {
                populations[s] += nu as f64;
            }
        }
        rho += draw_log_offset(rng);
    }
    Some(rho)
}
