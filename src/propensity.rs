//! Propensity evaluation: the one seam the core leaves open for callers.
//!
//! The reference implementation is an abstract base class with virtual dispatch; here it is a
//! trait implemented per-model, usually by a generated struct closing over rate constants. The
//! driver only ever calls [`PropensityEvaluator::ode_evaluate`]; `evaluate` and `tau_evaluate`
//! are part of the trait because the same evaluator type is shared with the out-of-scope pure-SSA
//! and pure-tau solvers this crate does not implement, and a caller wiring this crate in alongside
//! those needs one evaluator type that satisfies all three call sites.

use crate::model::Model;

/// Scalar propensity evaluation for one reaction, in three regimes.
///
/// # Contract
/// `a_r(x) >= 0` for every state `x` actually reached by integration. If `a_r(x) == 0`, reaction
/// `r` must contribute nothing to either the concentration derivatives or the offset growth rate
/// at `x` (the RHS relies on this to avoid spurious firings).
pub trait PropensityEvaluator {
    /// Propensity of reaction `r` given integer populations (SSA regime).
    fn evaluate(&self, r: usize, x_int: &[i64]) -> f64;

    /// Propensity of reaction `r` given integer populations (tau-leaping regime). Distinct from
    /// `evaluate` because some evaluators clamp or round differently for leaping than for exact
    /// SSA; the default forwards to `evaluate`.
    fn tau_evaluate(&self, r: usize, x_int_vec: &[i64]) -> f64 {
        self.evaluate(r, x_int_vec)
    }

    /// Propensity of reaction `r` given real-valued concentrations (continuous/ODE regime). This
    /// is the only method [`crate::rhs::RhsFunction`] calls.
    fn ode_evaluate(&self, r: usize, x_real: &[f64]) -> f64;
}

/// The law-of-mass-action propensity used throughout this corpus' reaction-network examples:
/// `a_r(x) = k_r * prod_{s : nu_{r,s} < 0} x_s^{|nu_{r,s}|}`, i.e. rate constant times the product
/// of reactant populations raised to their consumption stoichiometry.
///
/// Provided so the crate is directly usable without an external code-generated evaluator; callers
/// with more elaborate rate laws (Michaelis-Menten, Hill, etc.) implement [`PropensityEvaluator`]
/// themselves.
#[derive(Debug, Clone)]
pub struct MassAction {
    rate_constants: Vec<f64>,
    /// Precomputed (species, exponent) pairs per reaction, exponent = consumption stoichiometry.
    reactant_terms: Vec<Vec<(usize, u32)>>,
}

impl MassAction {
    pub fn new(model: &Model, rate_constants: Vec<f64>) -> Self {
        assert_eq!(
            rate_constants.len(),
            model.num_reactions(),
            "one rate constant per reaction required"
        );
        let reactant_terms = model
            .reactions()
            .iter()
            .map(|r| {
                r.stoichiometry
                    .iter()
                    .enumerate()
                    .filter(|(_, &nu)| nu < 0)
                    .map(|(s, &nu)| (s, (-nu) as u32))
                    .collect()
            })
            .collect();
        MassAction {
            rate_constants,
            reactant_terms,
        }
    }

}

impl PropensityEvaluator for MassAction {
    fn evaluate(&self, r: usize, x_int: &[i64]) -> f64 {
        let mut a = self.rate_constants[r];
        for &(s, exponent) in &self.reactant_terms[r] {
            a *= (x_int[s] as f64).powi(exponent as i32);
        }
        a
    }

    fn ode_evaluate(&self, r: usize, x_real: &[f64]) -> f64 {
        let mut a = self.rate_constants[r];
        for &(s, exponent) in &self.reactant_terms[r] {
            a *= x_real[s].powi(exponent as i32);
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reaction, Species, UserMode};

    fn dimerization_model() -> Model {
        // 2A -> B
        let species = vec![
            Species::new(0, "A", 100, UserMode::Continuous),
            Species::new(1, "B", 0, UserMode::Continuous),
        ];
        let reactions = vec![Reaction::new(0, "dimerize", vec![-2, 1])];
        Model::new(species, reactions)
    }

    #[test]
    fn mass_action_uses_consumption_exponent() {
        let model = dimerization_model();
        let ev = MassAction::new(&model, vec![0.01]);
        // a = k * A^2
        assert!((ev.ode_evaluate(0, &[10.0, 0.0]) - 0.01 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn zero_reactant_population_gives_zero_propensity() {
        let model = dimerization_model();
        let ev = MassAction::new(&model, vec![0.01]);
        assert_eq!(ev.ode_evaluate(0, &[0.0, 0.0]), 0.0);
    }
}
