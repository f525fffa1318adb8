//! The ODE right-hand side shared by concentrations and per-reaction firing offsets.

use std::cell::Cell;

use crate::model::Model;
use crate::propensity::PropensityEvaluator;

/// Fills `dy/dt` for a [`crate::state::PackedState`]-shaped vector.
///
/// Borrows the model and evaluator for its whole lifetime; constructed once per trajectory and
/// handed to [`crate::integrator::Integrator::create`].
pub struct RhsFunction<'a, E> {
    model: &'a Model,
    evaluator: &'a E,
    /// When `true`, concentration derivatives use `nu_{r,s}` magnitude, not just its sign. The
    /// reference uses sign only (§4.2's resolved open question), but sign-only only conserves a
    /// linear quantity across a reaction when every stoichiometric coefficient it touches has
    /// magnitude 1; `tau_hybrid_solve` enables this by default via `SimulationConfig::use_magnitude`
    /// so conservation laws hold for models with higher-order stoichiometry. `false` here is the
    /// constructor's own bare default for direct callers that want the literal reference behavior.
    use_magnitude: bool,
    /// Tally of `eval` calls for one trajectory, logged once at trajectory end rather than per
    /// call (the Newton-Krylov solver can call this thousands of times per report step).
    eval_count: Cell<u64>,
}

impl<'a, E: PropensityEvaluator> RhsFunction<'a, E> {
    pub fn new(model: &'a Model, evaluator: &'a E) -> Self {
        RhsFunction {
            model,
            evaluator,
            use_magnitude: false,
            eval_count: Cell::new(0),
        }
    }

    /// Number of `eval` calls made so far through this instance.
    pub fn eval_count(&self) -> u64 {
        self.eval_count.get()
    }

    /// Opts into stoichiometric-magnitude-scaled concentration derivatives, for evaluators whose
    /// `ode_evaluate` does not already bake multiplicity into the rate law.
    pub fn with_magnitude(mut self, use_magnitude: bool) -> Self {
        self.use_magnitude = use_magnitude;
        self
    }

    /// Evaluates `dy/dt` into `dydt`, given `y` (ignoring `t`: this crate has no explicitly
    /// time-dependent propensities, matching the reference).
    pub fn eval(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        self.eval_count.set(self.eval_count.get() + 1);
        let num_species = self.model.num_species();
        let num_reactions = self.model.num_reactions();
        debug_assert_eq!(y.len(), num_species + num_reactions);
        debug_assert_eq!(dydt.len(), y.len());

        let concentrations = &y[..num_species];
        let (d_conc, d_offsets) = dydt.split_at_mut(num_species);
        d_conc.iter_mut().for_each(|d| *d = 0.0);

        for reaction in self.model.reactions() {
            let p = self.evaluator.ode_evaluate(reaction.id, concentrations);
            d_offsets[reaction.id] = p;
            for (s, &nu) in reaction.stoichiometry.iter().enumerate() {
                if nu != 0 {
                    let scale = if self.use_magnitude { nu as f64 } else { branchless_sign(nu) };
                    d_conc[s] += p * scale;
                }
            }
        }
    }
}

/// `-1 + 2*[nu > 0]`: `+1.0` for positive stoichiometry, `-1.0` for negative. Branchless per §4.2.
#[inline]
fn branchless_sign(nu: i64) -> f64 {
    -1.0 + 2.0 * f64::from(nu > 0)
}
