use crate::energy_grid::EnergyGrid;
use crate::error::{Result, TransportError};
use crate::interpolation::{interpolate_into, InterpolationMode, InterpolationReport};
use crate::utilities::interpolate_linear;
use std::sync::Arc;

/// ZAI of Xe-135
pub const XE135_ZAI: u32 = 541350;
/// ZAI of Sm-149
pub const SM149_ZAI: u32 = 621490;

/// A one-dimensional tabulated cross section.
///
/// `values[k]` belongs to `grid[first_index + k]`; the reaction is zero
/// outside the tabulated slice (below a threshold or above the data range).
#[derive(Debug, Clone)]
pub struct Reaction {
    pub grid: EnergyGrid,
    /// Index into `grid` of the first tabulated value.
    pub first_index: usize,
    /// Cross section values (microscopic in barns, or macroscopic in 1/cm for totals).
    pub values: Vec<f64>,
    /// Nuclide identifier (Z*10000 + A*10 + isomeric state) when the reaction
    /// belongs to a single nuclide.
    pub zai: Option<u32>,
}

impl Reaction {
    pub fn new(grid: EnergyGrid, first_index: usize, values: Vec<f64>) -> Result<Self> {
        if values.is_empty() || first_index + values.len() > grid.len() {
            return Err(TransportError::MalformedGrid(format!(
                "{} values from index {} do not fit a grid of {} points",
                values.len(),
                first_index,
                grid.len()
            )));
        }
        Ok(Reaction {
            grid,
            first_index,
            values,
            zai: None,
        })
    }

    /// Tabulate over the whole grid.
    pub fn on_grid(grid: EnergyGrid, values: Vec<f64>) -> Result<Self> {
        Reaction::new(grid, 0, values)
    }

    pub fn with_zai(mut self, zai: u32) -> Self {
        self.zai = Some(zai);
        self
    }

    /// Energies matching `values`.
    pub fn energies(&self) -> &[f64] {
        &self.grid[self.first_index..self.first_index + self.values.len()]
    }

    /// Cross section at `energy`, zero outside the tabulated range.
    #[inline]
    pub fn value_at(&self, energy: f64) -> f64 {
        let energies = self.energies();
        if energy < energies[0] || energy > energies[energies.len() - 1] {
            return 0.0;
        }
        interpolate_linear(energies, &self.values, energy)
    }

    /// Resample onto `target` (linear-linear) into the caller's buffer.
    pub fn resample_into(&self, target: &EnergyGrid, out: &mut [f64]) -> Result<InterpolationReport> {
        interpolate_into(
            out,
            target,
            self.energies(),
            &self.values,
            InterpolationMode::Linear,
        )
    }
}

/// One entry of a partial-reaction list: a reaction weighted by an atomic
/// density (1/barn-cm).
#[derive(Debug, Clone)]
pub struct PartialReaction {
    pub reaction: Arc<Reaction>,
    /// Current atomic density, may change between majorant passes.
    pub density: f64,
    /// Declared upper bound on `density`; the majorant is built with this.
    pub max_density: f64,
}

impl PartialReaction {
    /// Entry whose maximum equals its current density.
    pub fn new(reaction: Arc<Reaction>, density: f64) -> Self {
        PartialReaction {
            reaction,
            density,
            max_density: density,
        }
    }

    pub fn with_max_density(mut self, max_density: f64) -> Self {
        self.max_density = max_density;
        self
    }
}

/// A total cross section: tabulated directly, built from partials, or both.
#[derive(Debug, Clone, Default)]
pub struct TotalXs {
    pub tabulated: Option<Arc<Reaction>>,
    pub partials: Vec<PartialReaction>,
}

impl TotalXs {
    pub fn tabulated(reaction: Arc<Reaction>) -> Self {
        TotalXs {
            tabulated: Some(reaction),
            partials: Vec::new(),
        }
    }

    pub fn from_partials(partials: Vec<PartialReaction>) -> Self {
        TotalXs {
            tabulated: None,
            partials,
        }
    }

    /// Total at `energy` with current densities.
    pub fn value_at(&self, energy: f64) -> f64 {
        match &self.tabulated {
            Some(reaction) => reaction.value_at(energy),
            None => self
                .partials
                .iter()
                .map(|p| p.density * p.reaction.value_at(energy))
                .sum(),
        }
    }

    /// Tabulated values when they live on exactly `grid`.
    pub fn tabulated_on(&self, grid: &EnergyGrid) -> Option<&Reaction> {
        self.tabulated
            .as_deref()
            .filter(|reaction| reaction.grid.same_as(grid))
    }
}

/// Unresolved-resonance probability-table correction for one nuclide.
///
/// Both arrays live on `grid[first_index..first_index + len]`. The majorant
/// swaps the infinite-dilution contribution for the tabulated upper bound.
#[derive(Debug, Clone)]
pub struct UresCorrection {
    pub infinite_dilution: Arc<Reaction>,
    /// Upper bound of the cross section over the probability tables, on the
    /// same energies as `infinite_dilution`.
    pub maximum: Vec<f64>,
    pub density: f64,
    pub max_density: f64,
}

impl UresCorrection {
    pub fn new(infinite_dilution: Arc<Reaction>, maximum: Vec<f64>, density: f64) -> Result<Self> {
        if maximum.len() != infinite_dilution.values.len() {
            return Err(TransportError::MalformedGrid(format!(
                "unresolved-resonance maximum has {} points, infinite dilution {}",
                maximum.len(),
                infinite_dilution.values.len()
            )));
        }
        Ok(UresCorrection {
            infinite_dilution,
            maximum,
            density,
            max_density: density,
        })
    }

    pub fn with_max_density(mut self, max_density: f64) -> Self {
        self.max_density = max_density;
        self
    }
}
