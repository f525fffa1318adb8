//! rebop-hybrid is the hybrid stochastic/deterministic tau-leaping integrator core for
//! well-mixed chemical reaction networks: the single-trajectory advancement engine that couples a
//! stiff ODE integrator to a discrete firing counter through one packed state vector.
//!
//! This crate is the *core* only. It deliberately does not parse models, compile propensity
//! functions, format output, or expose a CLI; those are external collaborators. What it does own:
//!
//! * [`model`], the immutable [`model::Model`] (species, reactions, stoichiometry).
//! * [`propensity`], the [`propensity::PropensityEvaluator`] trait a caller's rate law implements.
//! * [`state`], [`state::PackedState`], the unified concentrations-then-offsets vector.
//! * [`rhs`], [`rhs::RhsFunction`], the ODE right-hand side coupling both halves of that vector.
//! * [`integrator`], [`integrator::Integrator`], a stiff BDF + Newton-Krylov stepper.
//! * [`driver`], the step/reconcile/emit loop and the [`driver::tau_hybrid_solve`] entry point.
//! * [`writer`], [`writer::TrajectoryBuffers`] / [`writer::TrajectoryWriter`], the output side.
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! use rebop_hybrid::config::SimulationConfig;
//! use rebop_hybrid::driver::{tau_hybrid_solve, Simulation};
//! use rebop_hybrid::model::{Model, Reaction, Species, UserMode};
//! use rebop_hybrid::propensity::MassAction;
//! use rebop_hybrid::writer::TrajectoryBuffers;
//!
//! // A -> (empty), rate k=1, A(0)=1000, sampled every 0.1 time units up to t=5.
//! let species = vec![Species::new(0, "A", 1000, UserMode::Continuous)];
//! let reactions = vec![Reaction::new(0, "decay", vec![-1])];
//! let model = Model::new(species, reactions);
//! let evaluator = MassAction::new(&model, vec![1.0]);
//!
//! let timeline: Vec<f64> = (0..=50).map(|k| k as f64 * 0.1).collect();
//! let mut buffers = TrajectoryBuffers::new(1, timeline.len(), model.num_species());
//!
//! let mut sim = Simulation {
//!     model: &model,
//!     evaluator: &evaluator,
//!     buffers: &mut buffers,
//!     timeline: &timeline,
//!     number_trajectories: 1,
//!     random_seed: 42,
//!     interrupt: Arc::new(AtomicBool::new(false)),
//! };
//!
//! let outcome = tau_hybrid_solve(&mut sim, SimulationConfig::default()).unwrap();
//! assert_eq!(outcome.trajectories_completed, 1);
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod integrator;
pub mod model;
pub mod propensity;
pub mod rhs;
pub mod state;
pub mod writer;

pub use config::SimulationConfig;
pub use driver::{tau_hybrid_solve, Simulation, SimulationOutcome};
pub use error::{HybridError, HybridResult};
pub use model::{Model, PartitionMode, Reaction, Species, UserMode};
pub use propensity::{MassAction, PropensityEvaluator};
pub use writer::{TrajectoryBuffers, TrajectoryWriter};

/// Solver-type enum from §6, kept for callers that dispatch between this crate's hybrid solver
/// and the sibling pure-SSA / pure-ODE solvers this crate does not itself implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    Ssa = 1,
    Ode = 2,
    Tau = 3,
    Hybrid = 4,
}
