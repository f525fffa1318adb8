//! `PackedState`: the single real vector the integrator actually sees.

use rand::Rng;
use rand_distr::Open01;

/// Concentrations (one per species) followed by per-reaction firing offsets, packed into one
/// contiguous `Vec<f64>` so a stiff ODE solver can treat the whole thing as one state vector.
///
/// Offsets start at `ln(U)` for `U` drawn from the open interval `(0, 1)` (never exactly `0` or
/// `1`; see the module doc on [`crate::driver`] for why the open interval matters) and grow at
/// rate `a_r(x)` under integration; a non-negative offset signals accumulated firings.
#[derive(Debug, Clone)]
pub struct PackedState {
    y: Vec<f64>,
    num_species: usize,
    num_reactions: usize,
}

impl PackedState {
    /// Builds a packed state from initial populations, drawing a fresh `ln(U)` offset per
    /// reaction from `rng`.
    pub fn new(initial_populations: &[u64], num_reactions: usize, rng: &mut impl Rng) -> Self {
        let num_species = initial_populations.len();
        let mut y = Vec::with_capacity(num_species + num_reactions);
        y.extend(initial_populations.iter().map(|&p| p as f64));
        for _ in 0..num_reactions {
            y.push(draw_log_offset(rng));
        }
        PackedState {
            y,
            num_species,
            num_reactions,
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn num_species(&self) -> usize {
        self.num_species
    }

    pub fn num_reactions(&self) -> usize {
        self.num_reactions
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.y
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.y
    }

    pub fn concentrations(&self) -> &[f64] {
        &self.y[..self.num_species]
    }

    pub fn concentrations_mut(&mut self) -> &mut [f64] {
        &mut self.y[..self.num_species]
    }

    pub fn offsets(&self) -> &[f64] {
        &self.y[self.num_species..]
    }

    pub fn offsets_mut(&mut self) -> &mut [f64] {
        &mut self.y[self.num_species..]
    }

    pub fn offset(&self, r: usize) -> f64 {
        self.y[self.num_species + r]
    }

    pub fn set_offset(&mut self, r: usize, value: f64) {
        self.y[self.num_species + r] = value;
    }

    /// Replaces the whole vector in place from a prior snapshot (used on step rejection).
    pub fn restore_from(&mut self, snapshot: &PackedState) {
        self.y.copy_from_slice(&snapshot.y);
    }
}

/// Draws `ln(U)` with `U` strictly inside `(0, 1)`.
///
/// Using `rand::distributions::Uniform::new(0.0, 1.0)` risks returning exactly `0.0`, which would
/// make `ln(U) = -inf`, and some RNG/distribution combinations can also return the closed upper
/// endpoint; [`Open01`] excludes both endpoints so the reconciliation loop in
/// [`crate::driver::reconcile_reaction`] always terminates.
pub fn draw_log_offset(rng: &mut impl Rng) -> f64 {
    let u: f64 = rng.sample(Open01);
    u.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn packs_concentrations_then_offsets() {
        let mut rng = SmallRng::seed_from_u64(1);
        let state = PackedState::new(&[5, 7], 2, &mut rng);
        assert_eq!(state.len(), 4);
        assert_eq!(state.concentrations(), &[5.0, 7.0]);
        assert_eq!(state.offsets().len(), 2);
        assert!(state.offsets().iter().all(|&o| o < 0.0));
    }

    #[test]
    fn restore_from_copies_values() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut state = PackedState::new(&[1, 2], 1, &mut rng);
        let snapshot = state.clone();
        state.concentrations_mut()[0] = 999.0;
        state.restore_from(&snapshot);
        assert_eq!(state.concentrations()[0], 1.0);
    }

    #[test]
    fn log_offset_is_always_negative() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..10_000 {
            assert!(draw_log_offset(&mut rng) < 0.0);
        }
    }
}
