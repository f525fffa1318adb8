//! Error and result types for the hybrid tau-leaping integrator.

use thiserror::Error;

/// Errors that can surface out of [`crate::driver::tau_hybrid_solve`].
///
/// Step rejection (halving `tau_step` and retrying from a snapshot) is deliberately *not* a
/// variant here: it is always handled internally by the per-trajectory loop in
/// [`crate::driver`] and only surfaces as a `log::debug!` event plus a rejection counter.
#[derive(Debug, Error)]
pub enum HybridError {
    #[error("integrator could not advance past t={t}: {reason}")]
    IntegratorFatal { t: f64, reason: String },

    #[error("tau_step underflowed below the floor ({floor:e}) at t={t}")]
    TauUnderflow { t: f64, floor: f64 },

    #[error("simulation interrupted at trajectory {trajectory} of {total}")]
    Interrupted { trajectory: usize, total: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result alias used throughout this crate.
pub type HybridResult<T> = std::result::Result<T, HybridError>;
