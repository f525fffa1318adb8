//! Tunables the spec marks "order-of-magnitude only" / "implementers may tune".

/// Simulation-wide tunables. Plain data, no environment or file parsing: the core consults no
/// environment variables for simulation inputs (§6).
#[derive(Debug, Clone, Copy)]
pub struct SimulationConfig {
    /// Relative tolerance passed to the integrator.
    pub rtol: f64,
    /// Absolute tolerance passed to the integrator.
    pub atol: f64,
    /// Controls the initial `tau_step` selection; also the fraction of `Δt_report` used as the
    /// first trial step a fresh trajectory takes.
    pub tau_tol: f64,
    /// History window length (in reporting steps) used to classify `Dynamic` species.
    pub dynamic_window: usize,
    /// `tau_step` is considered to have underflowed once it drops below
    /// `tau_step_floor_factor * delta_t_report`.
    pub tau_step_floor_factor: f64,
    /// Whether the RHS scales concentration derivatives by stoichiometric magnitude (`nu_{r,s}`)
    /// rather than sign alone. Sign-only is what the reference literally does, but it only
    /// conserves a linear quantity `c . x` across a reaction with `c . nu_r = 0` when every
    /// `|nu_{r,s}|` touched by that reaction is 1; models with higher-order stoichiometry (e.g.
    /// `2A <-> B`) need magnitude scaling for that conservation law to hold, so this defaults to
    /// `true`.
    pub use_magnitude: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            rtol: 1e-5,
            atol: 1e-12,
            tau_tol: 0.03,
            dynamic_window: 5,
            tau_step_floor_factor: 1e-12,
            use_magnitude: true,
        }
    }
}
