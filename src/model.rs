//! The immutable description of species and reactions that a trajectory is run against.

use std::collections::HashSet;

/// User-selected partitioning mode for a species, as set by the model author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserMode {
    Continuous,
    Discrete,
    Dynamic,
}

impl UserMode {
    /// Numeric encoding matching §6's `CONTINUOUS=0`, `DISCRETE=1`, `DYNAMIC=2`.
    pub fn as_code(self) -> u8 {
        match self {
            UserMode::Continuous => 0,
            UserMode::Discrete => 1,
            UserMode::Dynamic => 2,
        }
    }
}

/// Runtime partition of a species for one reporting step: whichever regime it is actually
/// tracked in right now. Fixed for `Continuous`/`Discrete` species, re-decided every step for
/// `Dynamic` ones (see [`crate::driver::classify_dynamic_species`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    Continuous,
    Discrete,
}

impl PartitionMode {
    /// Numeric encoding matching the `trajectoriesHYBRID` label buffer (0/1).
    pub fn as_label(self) -> u8 {
        match self {
            PartitionMode::Continuous => 0,
            PartitionMode::Discrete => 1,
        }
    }
}

/// Default relative tolerance for the dynamic-species CV (σ/μ) switch, used when no explicit
/// population threshold is given.
pub const DEFAULT_SWITCH_TOL: f64 = 0.03;

/// A chemical species tracked by the model.
#[derive(Debug, Clone)]
pub struct Species {
    /// Dense, 0-based id. `Model::species[id].id == id` is an invariant maintained by
    /// [`Model::new`].
    pub id: usize,
    pub name: String,
    pub initial_population: u64,
    pub user_mode: UserMode,
    /// σ/μ threshold below which a `Dynamic` species is classified `Continuous`.
    pub switch_tol: f64,
    /// If present, overrides `switch_tol`: classify `Continuous` when μ ≥ this value.
    pub switch_min: Option<u64>,
}

impl Species {
    pub fn new(id: usize, name: impl Into<String>, initial_population: u64, user_mode: UserMode) -> Self {
        Species {
            id,
            name: name.into(),
            initial_population,
            user_mode,
            switch_tol: DEFAULT_SWITCH_TOL,
            switch_min: None,
        }
    }

    pub fn with_switch_tol(mut self, tol: f64) -> Self {
        self.switch_tol = tol;
        self
    }

    pub fn with_switch_min(mut self, min: u64) -> Self {
        self.switch_min = Some(min);
        self
    }

    /// Fixed partition for non-`Dynamic` species; `None` for `Dynamic` (caller must classify).
    pub fn fixed_partition(&self) -> Option<PartitionMode> {
        match self.user_mode {
            UserMode::Continuous => Some(PartitionMode::Continuous),
            UserMode::Discrete => Some(PartitionMode::Discrete),
            UserMode::Dynamic => None,
        }
    }
}

/// A reaction: a stoichiometry vector fired atomically, plus the set of reactions whose
/// propensity depends on species this reaction changes.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub id: usize,
    pub name: String,
    /// ν_r: signed population change per firing, one entry per species.
    pub stoichiometry: Vec<i64>,
    /// { r' : ν_r · (∂a_{r'}/∂x) ≢ 0 }, populated by [`Model::update_affected_reactions`].
    pub affected_reactions: HashSet<usize>,
}

impl Reaction {
    pub fn new(id: usize, name: impl Into<String>, stoichiometry: Vec<i64>) -> Self {
        Reaction {
            id,
            name: name.into(),
            stoichiometry,
            affected_reactions: HashSet::new(),
        }
    }

    /// Species ids this reaction changes (ν_{r,s} ≠ 0).
    fn touched_species(&self) -> impl Iterator<Item = usize> + '_ {
        self.stoichiometry
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(s, _)| s)
    }
}

/// An immutable, shared description of a reaction network: species, reactions, and the
/// stoichiometric-coupling graph between them.
#[derive(Debug, Clone)]
pub struct Model {
    species: Vec<Species>,
    reactions: Vec<Reaction>,
}

impl Model {
    /// Builds a model and immediately derives each reaction's `affected_reactions` set.
    ///
    /// # Panics
    /// Panics if species or reaction ids are not a contiguous `0..n` permutation, or if any
    /// reaction's stoichiometry vector length does not equal `species.len()`.
    pub fn new(species: Vec<Species>, reactions: Vec<Reaction>) -> Self {
        for (i, s) in species.iter().enumerate() {
            assert_eq!(s.id, i, "species ids must be a contiguous 0-based permutation");
        }
        for (i, r) in reactions.iter().enumerate() {
            assert_eq!(r.id, i, "reaction ids must be a contiguous 0-based permutation");
            assert_eq!(
                r.stoichiometry.len(),
                species.len(),
                "reaction {} stoichiometry length mismatch",
                r.name
            );
        }
        let mut model = Model { species, reactions };
        model.update_affected_reactions();
        model
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn num_species(&self) -> usize {
        self.species.len()
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Recomputes, for every reaction `r`, the set of reactions `r'` whose propensity changes
    /// when `r` fires. Conservatively: any reaction `r'` that reads a species `r` writes is
    /// marked affected (a superset of the exact ∂a_{r'}/∂x ≢ 0 definition, which requires
    /// evaluator-specific sensitivity information this crate does not assume).
    pub fn update_affected_reactions(&mut self) {
        // species -> reactions that read it (i.e. have nonzero stoichiometry on it)
        let mut readers: Vec<Vec<usize>> = vec![Vec::new(); self.species.len()];
        for r in &self.reactions {
            for s in r.touched_species() {
                readers[s].push(r.id);
            }
        }
        for r in 0..self.reactions.len() {
            let mut affected = HashSet::new();
            for s in self.reactions[r].touched_species() {
                affected.extend(readers[s].iter().copied());
            }
            affected.remove(&r);
            self.reactions[r].affected_reactions = affected;
        }
    }

    pub fn initial_populations(&self) -> Vec<u64> {
        self.species.iter().map(|s| s.initial_population).collect()
    }
}
