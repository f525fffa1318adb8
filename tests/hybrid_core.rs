//! Black-box scenario tests against the public `tau_hybrid_solve` entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use rebop_hybrid::config::SimulationConfig;
use rebop_hybrid::driver::{tau_hybrid_solve, Simulation};
use rebop_hybrid::model::{Model, Reaction, Species, UserMode};
use rebop_hybrid::propensity::MassAction;
use rebop_hybrid::writer::TrajectoryBuffers;

fn uniform_timeline(end_time: f64, steps: usize) -> Vec<f64> {
    (0..steps).map(|k| end_time * k as f64 / (steps - 1) as f64).collect()
}

/// Scenario 1: no reactions at all. Every cell must equal the initial population, at every
/// timestep, for every trajectory; labels must reflect each species' fixed user mode.
#[test]
fn empty_reaction_network_holds_populations_steady() {
    let species = vec![
        Species::new(0, "A", 5, UserMode::Discrete),
        Species::new(1, "B", 7, UserMode::Continuous),
    ];
    let model = Model::new(species, vec![]);
    let evaluator = MassAction::new(&model, vec![]);

    let timeline = uniform_timeline(1.0, 11);
    let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: 1,
        random_seed: 1,
        interrupt: Arc::new(AtomicBool::new(false)),
    };

    let outcome = tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
    assert_eq!(outcome.trajectories_completed, 1);
    assert!(!outcome.interrupted);

    for k in 0..timeline.len() {
        assert_eq!(buffers.continuous(0, k, 0), 5.0);
        assert_eq!(buffers.continuous(0, k, 1), 7.0);
        assert_eq!(buffers.label(0, k, 0), 1); // Discrete
        assert_eq!(buffers.label(0, k, 1), 0); // Continuous
    }
}

/// Scenario 2: pure first-order decay A -> (nothing), k=1, A(0)=1000, purely continuous.
/// A(t) = 1000 * exp(-t); A(5) should land in [6.5, 7.0].
#[test]
fn pure_decay_matches_exponential_at_t5() {
    let species = vec![Species::new(0, "A", 1000, UserMode::Continuous)];
    let reactions = vec![Reaction::new(0, "decay", vec![-1])];
    let model = Model::new(species, reactions);
    let evaluator = MassAction::new(&model, vec![1.0]);

    let timeline = uniform_timeline(5.0, 51);
    let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: 1,
        random_seed: 7,
        interrupt: Arc::new(AtomicBool::new(false)),
    };

    tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
    let a5 = buffers.continuous(0, timeline.len() - 1, 0);
    assert!((6.5..=7.0).contains(&a5), "A(5) = {a5}, expected in [6.5, 7.0]");
}

/// Scenario 4: reversible dimerization 2A <-> B, conserved quantity A + 2B == 100 at every step.
#[test]
fn reversible_dimerization_conserves_mass() {
    let species = vec![
        Species::new(0, "A", 100, UserMode::Continuous),
        Species::new(1, "B", 0, UserMode::Continuous),
    ];
    let reactions = vec![
        Reaction::new(0, "dimerize", vec![-2, 1]),
        Reaction::new(1, "split", vec![2, -1]),
    ];
    let model = Model::new(species, reactions);
    let evaluator = MassAction::new(&model, vec![0.01, 1.0]);

    let timeline = uniform_timeline(2.0, 21);
    let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: 1,
        random_seed: 3,
        interrupt: Arc::new(AtomicBool::new(false)),
    };

    tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
    for k in 0..timeline.len() {
        let a = buffers.continuous(0, k, 0);
        let b = buffers.continuous(0, k, 1);
        let conserved = a + 2.0 * b;
        assert_relative_eq!(conserved, 100.0, epsilon = 1.0);
    }
}

/// Scenario 5: a single fast reaction relative to a coarse reporting grid should force at least
/// one tau_step halving, and the surviving population should be the discrete {0, 1}.
#[test]
fn fast_reaction_with_coarse_grid_halves_tau_step() {
    let species = vec![Species::new(0, "A", 1, UserMode::Discrete)];
    let reactions = vec![Reaction::new(0, "decay", vec![-1])];
    let model = Model::new(species, reactions);
    let evaluator = MassAction::new(&model, vec![100.0]);

    let timeline = vec![0.0, 1.0];
    let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: 1,
        random_seed: 11,
        interrupt: Arc::new(AtomicBool::new(false)),
    };

    let outcome = tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
    assert_eq!(outcome.trajectories_completed, 1);
    let final_a = buffers.discrete(0, 1, 0);
    assert!(final_a == 0 || final_a == 1, "A(1) = {final_a}, expected 0 or 1");
}

/// Scenario 6 (simplified): an interrupt flag already set before the call returns immediately
/// with zero completed trajectories and `interrupted = true`, demonstrating the cooperative
/// cancellation contract without needing a real signal handler in a test process.
#[test]
fn preset_interrupt_flag_stops_before_any_trajectory() {
    let species = vec![Species::new(0, "A", 5, UserMode::Discrete)];
    let model = Model::new(species, vec![]);
    let evaluator = MassAction::new(&model, vec![]);

    let timeline = uniform_timeline(1.0, 3);
    let mut buffers = TrajectoryBuffers::new(10, timeline.len(), model.num_species());
    let interrupt = Arc::new(AtomicBool::new(true));
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: 10,
        random_seed: 1,
        interrupt: interrupt.clone(),
    };

    let outcome = tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
    assert_eq!(outcome.trajectories_completed, 0);
    assert!(outcome.interrupted);
    interrupt.store(false, Ordering::SeqCst);
}

/// Invalid timeline input is rejected before any allocation-heavy work runs.
#[test]
fn non_monotone_timeline_is_rejected() {
    let species = vec![Species::new(0, "A", 5, UserMode::Discrete)];
    let model = Model::new(species, vec![]);
    let evaluator = MassAction::new(&model, vec![]);

    let timeline = vec![0.0, 0.5, 0.2, 1.0];
    let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: 1,
        random_seed: 1,
        interrupt: Arc::new(AtomicBool::new(false)),
    };

    let result = tau_hybrid_solve(&mut sim, SimulationConfig::default());
    assert!(result.is_err());
}

/// Scenario 3 (reduced scale): birth-death equilibrium (empty) -> A rate lambda=10, A -> empty
/// rate mu*A (mu=1), A(0)=0, Dynamic partitioning. Stationary mean is lambda/mu = 10; run a
/// reduced ensemble (loose bounds) rather than the spec's >=500 trajectories, to keep the test
/// fast while still exercising dynamic-species classification end to end.
#[test]
fn birth_death_equilibrium_mean_is_near_lambda_over_mu() {
    struct BirthDeath {
        lambda: f64,
        mu: f64,
    }
    impl rebop_hybrid::propensity::PropensityEvaluator for BirthDeath {
        fn evaluate(&self, r: usize, x_int: &[i64]) -> f64 {
            self.ode_evaluate(r, &[x_int[0] as f64])
        }
        fn ode_evaluate(&self, r: usize, x_real: &[f64]) -> f64 {
            match r {
                0 => self.lambda,
                1 => self.mu * x_real[0].max(0.0),
                _ => unreachable!(),
            }
        }
    }

    let species = vec![Species::new(0, "A", 0, UserMode::Dynamic)];
    let reactions = vec![Reaction::new(0, "birth", vec![1]), Reaction::new(1, "death", vec![-1])];
    let model = Model::new(species, reactions);
    let evaluator = BirthDeath { lambda: 10.0, mu: 1.0 };

    let timeline = uniform_timeline(20.0, 41);
    let n_traj = 64;
    let mut buffers = TrajectoryBuffers::new(n_traj, timeline.len(), model.num_species());
    let mut sim = Simulation {
        model: &model,
        evaluator: &evaluator,
        buffers: &mut buffers,
        timeline: &timeline,
        number_trajectories: n_traj,
        random_seed: 99,
        interrupt: Arc::new(AtomicBool::new(false)),
    };

    tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
    let last = timeline.len() - 1;
    let mean: f64 = (0..n_traj).map(|t| buffers.continuous(t, last, 0)).sum::<f64>() / n_traj as f64;
    assert!((mean - 10.0).abs() < 4.0, "ensemble mean A(20) = {mean}, expected near 10");
}

/// P4: fixed seed gives bit-reproducible output across independent runs.
#[test]
fn fixed_seed_is_bit_reproducible() {
    let species = vec![Species::new(0, "A", 50, UserMode::Discrete)];
    let reactions = vec![Reaction::new(0, "decay", vec![-1])];
    let model = Model::new(species, reactions);
    let evaluator = MassAction::new(&model, vec![0.3]);
    let timeline = uniform_timeline(3.0, 16);

    let run = || {
        let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
        let mut sim = Simulation {
            model: &model,
            evaluator: &evaluator,
            buffers: &mut buffers,
            timeline: &timeline,
            number_trajectories: 1,
            random_seed: 2024,
            interrupt: Arc::new(AtomicBool::new(false)),
        };
        tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
        buffers
    };

    let first = run();
    let second = run();
    for k in 0..timeline.len() {
        assert_eq!(first.continuous(0, k, 0), second.continuous(0, k, 0));
        assert_eq!(first.discrete(0, k, 0), second.discrete(0, k, 0));
    }
}
