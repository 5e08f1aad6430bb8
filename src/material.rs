use crate::particle::ParticleType;
use crate::reaction::{TotalXs, UresCorrection};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const UNCLAIMED: usize = usize::MAX;

/// Spatial/temporal density multiplier `g(r, t)` in `[0, 1]`.
///
/// Collisions are demoted to virtual with probability `1 - g`, which models a
/// varying density without rebuilding cross sections.
pub trait DensityField: Send + Sync + fmt::Debug {
    fn factor(&self, position: [f64; 3], time: f64) -> f64;
}

/// Same factor everywhere.
#[derive(Debug, Clone, Copy)]
pub struct ConstantDensity(pub f64);

impl DensityField for ConstantDensity {
    fn factor(&self, _position: [f64; 3], _time: f64) -> f64 {
        self.0
    }
}

/// Role of a material in spatial subdivision (e.g. burnable zones).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Division {
    #[default]
    None,
    /// Parent of divided zones; never tracked directly.
    Parent,
    /// Zone index, starting from 1.
    Zone(u32),
}

/// A material as the transport kernel sees it: macroscopic totals for each
/// particle type plus the flags the majorant builder and tracker consult.
///
/// Cross-section blocks are built by an external data provider. Partial
/// reactions carry both the current atomic density and a declared maximum;
/// the majorant is always assembled with the maximum so density updates up to
/// that bound never invalidate it.
pub struct Material {
    pub name: String,
    pub include_in_majorant: bool,
    pub division: Division,
    /// Target-motion sampling: partials contribute their histogram (left-bin)
    /// value to the majorant instead of an interpolated one.
    pub tms_histogram: bool,
    pub xenon_equilibrium: bool,
    pub samarium_equilibrium: bool,
    pub force_surface_tracking: bool,
    /// Neutron total.
    pub neutron: TotalXs,
    /// Precomputed temperature majorant, preferred over `neutron` when building
    /// the neutron majorant.
    pub temperature_majorant: Option<TotalXs>,
    pub ures: Vec<UresCorrection>,
    pub photon: Option<TotalXs>,
    /// Multigroup total on the multigroup grid.
    pub multigroup_total: Option<Vec<f64>>,
    pub density_field: Option<Arc<dyn DensityField>>,
    owner: AtomicUsize,
}

impl Material {
    pub fn new(name: &str) -> Self {
        Material {
            name: name.to_string(),
            include_in_majorant: true,
            division: Division::None,
            tms_histogram: false,
            xenon_equilibrium: false,
            samarium_equilibrium: false,
            force_surface_tracking: false,
            neutron: TotalXs::default(),
            temperature_majorant: None,
            ures: Vec::new(),
            photon: None,
            multigroup_total: None,
            density_field: None,
            owner: AtomicUsize::new(UNCLAIMED),
        }
    }

    pub fn with_neutron_total(mut self, total: TotalXs) -> Self {
        self.neutron = total;
        self
    }

    pub fn with_photon_total(mut self, total: TotalXs) -> Self {
        self.photon = Some(total);
        self
    }

    pub fn with_multigroup_total(mut self, values: Vec<f64>) -> Self {
        self.multigroup_total = Some(values);
        self
    }

    pub fn with_density_field(mut self, field: Arc<dyn DensityField>) -> Self {
        self.density_field = Some(field);
        self
    }

    /// Total macroscopic cross section (1/cm) at the current densities.
    pub fn total_xs(&self, particle_type: ParticleType, energy: f64) -> f64 {
        match particle_type {
            ParticleType::Neutron => self.neutron.value_at(energy),
            ParticleType::Photon => self
                .photon
                .as_ref()
                .map_or(0.0, |total| total.value_at(energy)),
        }
    }

    /// Multigroup total at `energy`, interpolated on the multigroup grid the
    /// values are tabulated on.
    pub fn multigroup_xs(&self, grid: &[f64], energy: f64) -> f64 {
        match &self.multigroup_total {
            Some(values) if values.len() == grid.len() && !grid.is_empty() => {
                crate::utilities::interpolate_linear(grid, values, energy)
            }
            _ => 0.0,
        }
    }

    /// Density factor at a point, 1 when the material has no density field.
    pub fn density_factor(&self, position: [f64; 3], time: f64) -> f64 {
        self.density_field
            .as_ref()
            .map_or(1.0, |field| field.factor(position, time))
    }

    /// Update the current density of a neutron partial reaction.
    ///
    /// Densities above the declared maximum are accepted here and rejected by
    /// the next majorant pass.
    pub fn set_partial_density(&mut self, index: usize, density: f64) -> bool {
        match self.neutron.partials.get_mut(index) {
            Some(partial) => {
                partial.density = density;
                true
            }
            None => false,
        }
    }

    /// Try to take ownership for `worker`. Returns true if `worker` owns the
    /// material afterwards, whether it claimed it now or earlier.
    pub fn claim(&self, worker: usize) -> bool {
        match self
            .owner
            .compare_exchange(UNCLAIMED, worker, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == worker,
        }
    }

    pub fn owner(&self) -> Option<usize> {
        match self.owner.load(Ordering::Acquire) {
            UNCLAIMED => None,
            worker => Some(worker),
        }
    }

    pub fn reset_claim(&self) {
        self.owner.store(UNCLAIMED, Ordering::Release);
    }
}

impl Clone for Material {
    fn clone(&self) -> Self {
        Material {
            name: self.name.clone(),
            include_in_majorant: self.include_in_majorant,
            division: self.division,
            tms_histogram: self.tms_histogram,
            xenon_equilibrium: self.xenon_equilibrium,
            samarium_equilibrium: self.samarium_equilibrium,
            force_surface_tracking: self.force_surface_tracking,
            neutron: self.neutron.clone(),
            temperature_majorant: self.temperature_majorant.clone(),
            ures: self.ures.clone(),
            photon: self.photon.clone(),
            multigroup_total: self.multigroup_total.clone(),
            density_field: self.density_field.clone(),
            owner: AtomicUsize::new(UNCLAIMED),
        }
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.name)
            .field("include_in_majorant", &self.include_in_majorant)
            .field("division", &self.division)
            .field("partials", &self.neutron.partials.len())
            .field("photon", &self.photon.is_some())
            .field("owner", &self.owner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy_grid::EnergyGrid;
    use crate::reaction::{PartialReaction, Reaction};

    fn material() -> Material {
        let grid = EnergyGrid::new(vec![1e-5, 1.0, 20.0]).unwrap();
        let reaction = Arc::new(Reaction::on_grid(grid, vec![4.0, 2.0, 1.0]).unwrap());
        Material::new("fuel").with_neutron_total(TotalXs::from_partials(vec![
            PartialReaction::new(reaction, 0.5),
        ]))
    }

    #[test]
    fn test_total_xs_per_particle_type() {
        let mat = material();
        assert!((mat.total_xs(ParticleType::Neutron, 1.0) - 1.0).abs() < 1e-12);
        assert_eq!(mat.total_xs(ParticleType::Photon, 1.0), 0.0);
    }

    #[test]
    fn test_claim_is_first_come() {
        let mat = material();
        assert_eq!(mat.owner(), None);
        assert!(mat.claim(3));
        assert!(mat.claim(3));
        assert!(!mat.claim(1));
        assert_eq!(mat.owner(), Some(3));
        mat.reset_claim();
        assert!(mat.claim(1));
    }

    #[test]
    fn test_clone_drops_claim() {
        let mat = material();
        mat.claim(0);
        assert_eq!(mat.clone().owner(), None);
    }

    #[test]
    fn test_density_factor_default_and_field() {
        let mat = material();
        assert_eq!(mat.density_factor([0.0; 3], 0.0), 1.0);
        let mat = mat.with_density_field(Arc::new(ConstantDensity(0.25)));
        assert_eq!(mat.density_factor([1.0, 2.0, 3.0], 5.0), 0.25);
    }

    #[test]
    fn test_set_partial_density() {
        let mut mat = material();
        assert!(mat.set_partial_density(0, 0.75));
        assert!(!mat.set_partial_density(4, 0.75));
        assert_eq!(mat.neutron.partials[0].density, 0.75);
    }
}
