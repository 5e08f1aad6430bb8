// Majorant cross sections for delta-tracking
//
// The neutron pass runs one private curve per worker; each material is
// claimed by exactly one worker and the curves are merged with a point-wise
// max afterwards. Photon and multigroup passes are serial.

use crate::config::{FloorPolicy, TrackingConfig};
use crate::energy_grid::EnergyGrid;
use crate::error::{Result, TransportError};
use crate::interpolation::{interpolate_into, InterpolationMode};
use crate::material::{Division, Material};
use crate::materials::Materials;
use crate::particle::ParticleType;
use crate::reaction::{Reaction, TotalXs, SM149_ZAI, XE135_ZAI};
use crate::utilities::interpolate_linear;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use tracing::{debug, info};

/// Upper bound of the total cross section of every included material, on a
/// unionized grid.
#[derive(Debug, Clone)]
pub struct Majorant {
    pub particle_type: ParticleType,
    pub grid: EnergyGrid,
    pub values: Vec<f64>,
    /// Smallest strictly positive value of `values`, +inf if none.
    pub computed_minimum: f64,
    /// Scalar bound used as the minimum cross section during tracking,
    /// chosen by the floor policy of the particle type.
    pub floor: f64,
}

impl Majorant {
    fn assemble(
        particle_type: ParticleType,
        grid: &EnergyGrid,
        values: Vec<f64>,
        policy: FloorPolicy,
    ) -> Self {
        let computed_minimum = values
            .iter()
            .copied()
            .filter(|v| *v > 0.0)
            .fold(f64::INFINITY, f64::min);
        let floor = match policy {
            FloorPolicy::ComputedMinimum => computed_minimum,
            FloorPolicy::Constant(value) => value,
        };
        Majorant {
            particle_type,
            grid: grid.clone(),
            values,
            computed_minimum,
            floor,
        }
    }

    /// Majorant at `energy`; the edge values apply outside the grid.
    #[inline]
    pub fn value_at(&self, energy: f64) -> f64 {
        interpolate_linear(&self.grid, &self.values, energy)
    }
}

/// Thread-private work arrays for reconstruction.
struct Scratch {
    total: Vec<f64>,
    xs: Vec<f64>,
}

impl Scratch {
    fn new(len: usize) -> Self {
        Scratch {
            total: vec![0.0; len],
            xs: vec![0.0; len],
        }
    }
}

/// Recomputes majorant curves from a set of materials.
pub struct MajorantBuilder<'a> {
    materials: &'a Materials,
    workers: usize,
    claim_shuffle: Option<u64>,
}

impl<'a> MajorantBuilder<'a> {
    pub fn new(materials: &'a Materials) -> Self {
        MajorantBuilder {
            materials,
            workers: rayon::current_num_threads(),
            claim_shuffle: None,
        }
    }

    /// Builder configured from a tracking configuration.
    pub fn from_config(materials: &'a Materials, config: &TrackingConfig) -> Self {
        MajorantBuilder::new(materials)
            .workers(config.worker_count())
            .claim_shuffle(config.majorant_claim_shuffle)
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Each worker visits the materials in its own seeded random order.
    pub fn claim_shuffle(mut self, seed: Option<u64>) -> Self {
        self.claim_shuffle = seed;
        self
    }

    /// Dispatch to the continuous-energy pass of the particle type.
    pub fn build(
        &self,
        particle_type: ParticleType,
        grid: &EnergyGrid,
        policy: FloorPolicy,
    ) -> Result<Majorant> {
        match particle_type {
            ParticleType::Neutron => self.build_neutron(grid, policy),
            ParticleType::Photon => self.build_photon(grid, policy),
        }
    }

    /// Parallel first-claim neutron pass.
    pub fn build_neutron(&self, grid: &EnergyGrid, policy: FloorPolicy) -> Result<Majorant> {
        info!(
            materials = self.materials.len(),
            points = grid.len(),
            workers = self.workers,
            "Calculating DT neutron majorant cross section"
        );
        self.materials.reset_claims();
        let ne = grid.len();
        let materials = self.materials.as_slice();

        let curves = (0..self.workers)
            .into_par_iter()
            .map(|worker| -> Result<Vec<f64>> {
                let mut curve = vec![0.0; ne];
                let mut scratch = Scratch::new(ne);
                let mut processed = 0usize;
                for index in self.visit_order(worker) {
                    let material = &materials[index];
                    if !material.include_in_majorant {
                        continue;
                    }
                    if material.claim(worker) {
                        accumulate_neutron(material, grid, &mut curve, &mut scratch)?;
                        processed += 1;
                    }
                }
                debug!(worker, processed, "majorant worker done");
                Ok(curve)
            })
            .collect::<Result<Vec<_>>>()?;

        let values = merge_max(curves, ne);
        let majorant = Majorant::assemble(ParticleType::Neutron, grid, values, policy);
        info!(
            floor = majorant.floor,
            computed_minimum = majorant.computed_minimum,
            "neutron majorant ready"
        );
        Ok(majorant)
    }

    /// Serial photon pass: same copy/reconstruct rule, without unresolved
    /// resonance corrections.
    pub fn build_photon(&self, grid: &EnergyGrid, policy: FloorPolicy) -> Result<Majorant> {
        info!("Calculating DT photon majorant cross section");
        let ne = grid.len();
        let mut values = vec![0.0; ne];
        let mut scratch = Scratch::new(ne);

        for material in self.materials.iter() {
            let total = match &material.photon {
                Some(total) if material.include_in_majorant => total,
                _ => continue,
            };
            reconstruct(material, total, grid, &mut scratch, false)?;
            fold_max(&mut values, &scratch.total);
        }

        let majorant = Majorant::assemble(ParticleType::Photon, grid, values, policy);
        if majorant.floor != majorant.computed_minimum {
            debug!(
                floor = majorant.floor,
                computed_minimum = majorant.computed_minimum,
                "photon majorant floor differs from the curve minimum"
            );
        }
        Ok(majorant)
    }

    /// Multigroup pass: point-wise max of the materials' multigroup totals.
    pub fn build_multigroup(
        &self,
        particle_type: ParticleType,
        grid: &EnergyGrid,
        policy: FloorPolicy,
    ) -> Result<Majorant> {
        info!("Calculating DT majorant cross sections (multigroup)");
        let mut values = vec![0.0; grid.len()];
        for material in self.materials.iter().filter(|m| m.include_in_majorant) {
            let mg = material
                .multigroup_total
                .as_ref()
                .ok_or_else(|| TransportError::MissingCrossSection(material.name.clone()))?;
            if mg.len() != grid.len() {
                return Err(TransportError::MalformedGrid(format!(
                    "multigroup total of {} has {} values for {} groups",
                    material.name,
                    mg.len(),
                    grid.len()
                )));
            }
            fold_max(&mut values, mg);
        }
        Ok(Majorant::assemble(particle_type, grid, values, policy))
    }

    fn visit_order(&self, worker: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.materials.len()).collect();
        if let Some(seed) = self.claim_shuffle {
            let mut rng = Pcg64::seed_from_u64(seed.wrapping_add(worker as u64));
            order.shuffle(&mut rng);
        }
        order
    }
}

/// Majorant curves for both particle types, as consumed by the tracker.
#[derive(Debug, Clone, Default)]
pub struct Majorants {
    pub neutron: Option<Majorant>,
    pub photon: Option<Majorant>,
}

impl Majorants {
    /// Build every majorant whose grid is given. Nothing is built when delta
    /// tracking is disabled.
    pub fn build(
        materials: &Materials,
        neutron_grid: Option<&EnergyGrid>,
        photon_grid: Option<&EnergyGrid>,
        config: &TrackingConfig,
    ) -> Result<Self> {
        if !config.delta_tracking {
            return Ok(Majorants::default());
        }
        let builder = MajorantBuilder::from_config(materials, config);
        let neutron_policy = config.floor_policy(ParticleType::Neutron);
        let photon_policy = config.floor_policy(ParticleType::Photon);

        if config.multigroup {
            let neutron = neutron_grid
                .map(|grid| builder.build_multigroup(ParticleType::Neutron, grid, neutron_policy))
                .transpose()?;
            return Ok(Majorants {
                neutron,
                photon: None,
            });
        }

        Ok(Majorants {
            neutron: neutron_grid
                .map(|grid| builder.build_neutron(grid, neutron_policy))
                .transpose()?,
            photon: photon_grid
                .map(|grid| builder.build_photon(grid, photon_policy))
                .transpose()?,
        })
    }

    pub fn get(&self, particle_type: ParticleType) -> Option<&Majorant> {
        match particle_type {
            ParticleType::Neutron => self.neutron.as_ref(),
            ParticleType::Photon => self.photon.as_ref(),
        }
    }

    /// Minimum cross-section bound of a particle type, zero without a majorant.
    pub fn floor(&self, particle_type: ParticleType) -> f64 {
        self.get(particle_type)
            .map_or(0.0, |m| if m.floor.is_finite() { m.floor } else { 0.0 })
    }
}

/// One material's contribution to a worker's private neutron curve.
fn accumulate_neutron(
    material: &Material,
    grid: &EnergyGrid,
    curve: &mut [f64],
    scratch: &mut Scratch,
) -> Result<()> {
    let total = material
        .temperature_majorant
        .as_ref()
        .unwrap_or(&material.neutron);

    // Divided materials without data on this grid contribute through zone 1 only
    if total.tabulated_on(grid).is_none() {
        if let Division::Zone(idx) = material.division {
            if idx > 1 {
                return Ok(());
            }
        }
    }
    if material.division == Division::Parent {
        return Err(TransportError::DividedParentMaterial(material.name.clone()));
    }

    reconstruct(material, total, grid, scratch, true)?;
    apply_ures(material, grid, scratch)?;
    fold_max(curve, &scratch.total);
    Ok(())
}

/// Fill `scratch.total` with the total on `grid`, copying tabulated data on
/// the same grid or summing partials at their maximum densities.
fn reconstruct(
    material: &Material,
    total: &TotalXs,
    grid: &EnergyGrid,
    scratch: &mut Scratch,
    neutron: bool,
) -> Result<()> {
    let tot = &mut scratch.total;
    tot.fill(0.0);

    if let Some(reaction) = total.tabulated_on(grid) {
        let start = reaction.first_index;
        tot[start..start + reaction.values.len()].copy_from_slice(&reaction.values);
        return Ok(());
    }

    if total.partials.is_empty() {
        return Err(TransportError::MissingCrossSection(material.name.clone()));
    }

    for (k, partial) in total.partials.iter().enumerate() {
        let adens = checked_density(material, k, partial.density, partial.max_density)?;
        if neutron {
            check_poisons(material, &partial.reaction, adens)?;
        }
        if neutron && material.tms_histogram {
            add_histogram(tot, grid, &partial.reaction, adens);
        } else {
            partial.reaction.resample_into(grid, &mut scratch.xs)?;
            for (t, xs) in tot.iter_mut().zip(&scratch.xs) {
                *t += adens * xs;
            }
        }
    }
    Ok(())
}

/// Swap infinite-dilution contributions for the probability-table maxima.
fn apply_ures(material: &Material, grid: &EnergyGrid, scratch: &mut Scratch) -> Result<()> {
    for (k, ures) in material.ures.iter().enumerate() {
        let adens = checked_density(material, k, ures.density, ures.max_density)?;
        let reaction = &ures.infinite_dilution;

        for (values, sign) in [(&reaction.values, -1.0), (&ures.maximum, 1.0)] {
            let report = interpolate_into(
                &mut scratch.xs,
                grid,
                reaction.energies(),
                values,
                InterpolationMode::Linear,
            )?;
            if let Some(n0) = report.first_positive {
                for n in n0..grid.len() {
                    if scratch.xs[n] > 0.0 {
                        scratch.total[n] += sign * adens * scratch.xs[n];
                    }
                }
            }
        }
    }
    Ok(())
}

/// Left-bin value of the reaction for each target point.
fn add_histogram(tot: &mut [f64], grid: &EnergyGrid, reaction: &Reaction, adens: f64) {
    let energies = reaction.energies();
    let ne = grid.len();
    let mut idx = 0usize;
    for n in 0..ne {
        let upper = grid[(n + 1).min(ne - 1)];
        while idx + 1 < energies.len() && energies[idx + 1] < upper {
            idx += 1;
        }
        tot[n] += adens * reaction.values[idx];
    }
}

fn checked_density(material: &Material, index: usize, density: f64, max_density: f64) -> Result<f64> {
    if density > max_density {
        return Err(TransportError::DensityExceedsMaximum {
            material: material.name.clone(),
            reaction: index,
            density,
            max_density,
        });
    }
    Ok(max_density)
}

fn check_poisons(material: &Material, reaction: &Reaction, adens: f64) -> Result<()> {
    let nuclide = match reaction.zai {
        Some(XE135_ZAI) if material.xenon_equilibrium => "Xe-135",
        Some(SM149_ZAI) if material.samarium_equilibrium => "Sm-149",
        _ => return Ok(()),
    };
    if adens > 0.0 {
        return Err(TransportError::PoisonDensity {
            material: material.name.clone(),
            nuclide,
        });
    }
    Ok(())
}

fn fold_max(target: &mut [f64], source: &[f64]) {
    for (t, s) in target.iter_mut().zip(source) {
        if *s > *t {
            *t = *s;
        }
    }
}

fn merge_max(curves: Vec<Vec<f64>>, len: usize) -> Vec<f64> {
    let mut merged = vec![0.0; len];
    for curve in &curves {
        fold_max(&mut merged, curve);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::{PartialReaction, UresCorrection};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn grid() -> EnergyGrid {
        EnergyGrid::new(vec![1e-5, 1e-2, 1.0, 5.0, 20.0]).unwrap()
    }

    fn constant_material(name: &str, grid: &EnergyGrid, value: f64) -> Material {
        let reaction = Reaction::on_grid(grid.clone(), vec![value; grid.len()]).unwrap();
        Material::new(name).with_neutron_total(TotalXs::tabulated(Arc::new(reaction)))
    }

    #[test]
    fn test_two_constant_materials() {
        let g = grid();
        let mut materials = Materials::new();
        materials.append(constant_material("a", &g, 2.0));
        materials.append(constant_material("b", &g, 3.0));
        let majorant = MajorantBuilder::new(&materials)
            .workers(2)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert!(majorant.values.iter().all(|v| *v == 3.0));
        assert_eq!(majorant.floor, 3.0);
    }

    #[test]
    fn test_excluded_material_is_ignored() {
        let g = grid();
        let mut materials = Materials::new();
        materials.append(constant_material("a", &g, 2.0));
        let mut big = constant_material("b", &g, 30.0);
        big.include_in_majorant = false;
        materials.append(big);
        let majorant = MajorantBuilder::new(&materials)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert!(majorant.values.iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_reconstruction_uses_max_density() {
        let g = grid();
        let native = EnergyGrid::new(vec![1e-5, 20.0]).unwrap();
        let reaction = Arc::new(Reaction::on_grid(native, vec![1.0, 1.0]).unwrap());
        let mut materials = Materials::new();
        materials.append(Material::new("fuel").with_neutron_total(TotalXs::from_partials(
            vec![PartialReaction::new(reaction, 0.1).with_max_density(0.4)],
        )));
        let majorant = MajorantBuilder::new(&materials)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        for v in &majorant.values {
            assert_relative_eq!(*v, 0.4);
        }
    }

    #[test]
    fn test_density_above_maximum_is_fatal() {
        let g = grid();
        let reaction = Arc::new(Reaction::on_grid(g.clone(), vec![1.0; 5]).unwrap());
        let other = EnergyGrid::new(vec![1e-5, 20.0]).unwrap();
        let mut materials = Materials::new();
        let handle = materials.append(Material::new("fuel").with_neutron_total(
            TotalXs::from_partials(vec![
                PartialReaction::new(reaction, 0.1).with_max_density(0.2),
            ]),
        ));
        materials.get_mut(handle).unwrap().set_partial_density(0, 0.3);
        let err = MajorantBuilder::new(&materials).build_neutron(&other, FloorPolicy::ComputedMinimum);
        assert!(matches!(
            err,
            Err(TransportError::DensityExceedsMaximum { .. })
        ));
    }

    #[test]
    fn test_divided_zones_and_parent() {
        let g = grid();
        let native = EnergyGrid::new(vec![1e-5, 20.0]).unwrap();
        let reaction = Arc::new(Reaction::on_grid(native, vec![5.0, 5.0]).unwrap());
        let total = TotalXs::from_partials(vec![PartialReaction::new(reaction, 1.0)]);

        let mut zone2 = Material::new("fuel.z2").with_neutron_total(total.clone());
        zone2.division = Division::Zone(2);
        let mut materials = Materials::new();
        materials.append(constant_material("water", &g, 1.0));
        materials.append(zone2);
        let majorant = MajorantBuilder::new(&materials)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert!(majorant.values.iter().all(|v| *v == 1.0));

        let mut parent = Material::new("fuel").with_neutron_total(total);
        parent.division = Division::Parent;
        materials.append(parent);
        let err = MajorantBuilder::new(&materials).build_neutron(&g, FloorPolicy::ComputedMinimum);
        assert!(matches!(err, Err(TransportError::DividedParentMaterial(_))));
    }

    #[test]
    fn test_xenon_under_equilibrium_is_fatal() {
        let g = grid();
        let native = EnergyGrid::new(vec![1e-5, 20.0]).unwrap();
        let xe = Arc::new(
            Reaction::on_grid(native, vec![1e6, 1.0])
                .unwrap()
                .with_zai(XE135_ZAI),
        );
        let mut fuel = Material::new("fuel")
            .with_neutron_total(TotalXs::from_partials(vec![PartialReaction::new(xe, 1e-9)]));
        fuel.xenon_equilibrium = true;
        let mut materials = Materials::new();
        materials.append(fuel);
        let err = MajorantBuilder::new(&materials).build_neutron(&g, FloorPolicy::ComputedMinimum);
        assert!(matches!(err, Err(TransportError::PoisonDensity { nuclide: "Xe-135", .. })));
    }

    #[test]
    fn test_ures_swaps_infinite_dilution_for_maximum() {
        let g = grid();
        let native = EnergyGrid::new(vec![1e-2, 1.0, 5.0]).unwrap();
        let base = Arc::new(Reaction::on_grid(native.clone(), vec![2.0, 2.0, 2.0]).unwrap());
        let inf_dil = Arc::new(Reaction::on_grid(native, vec![2.0, 2.0, 2.0]).unwrap());
        let mut fuel = Material::new("fuel")
            .with_neutron_total(TotalXs::from_partials(vec![PartialReaction::new(base, 1.0)]));
        fuel.ures
            .push(UresCorrection::new(inf_dil, vec![3.0, 3.5, 3.0], 1.0).unwrap());
        let mut materials = Materials::new();
        materials.append(fuel);
        let majorant = MajorantBuilder::new(&materials)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        // 1e-5 and 20 are outside the native grid
        assert_eq!(majorant.values[0], 0.0);
        assert_relative_eq!(majorant.values[1], 3.0);
        assert_relative_eq!(majorant.values[2], 3.5);
        assert_relative_eq!(majorant.values[3], 3.0);
        assert_eq!(majorant.values[4], 0.0);
        assert_eq!(majorant.computed_minimum, 3.0);
    }

    #[test]
    fn test_tms_histogram_takes_left_bin() {
        let g = EnergyGrid::new(vec![1.0, 1.5, 2.0, 3.0]).unwrap();
        let native = EnergyGrid::new(vec![1.0, 2.0, 3.0]).unwrap();
        let reaction = Arc::new(Reaction::on_grid(native, vec![4.0, 2.0, 1.0]).unwrap());
        let mut fuel = Material::new("fuel")
            .with_neutron_total(TotalXs::from_partials(vec![PartialReaction::new(reaction, 1.0)]));
        fuel.tms_histogram = true;
        let mut materials = Materials::new();
        materials.append(fuel);
        let majorant = MajorantBuilder::new(&materials)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert_eq!(majorant.values, vec![4.0, 4.0, 2.0, 2.0]);
    }

    #[test]
    fn test_photon_floor_policies() {
        let g = grid();
        let reaction = Arc::new(Reaction::on_grid(g.clone(), vec![0.5; 5]).unwrap());
        let mut materials = Materials::new();
        materials.append(Material::new("lead").with_photon_total(TotalXs::tabulated(reaction)));
        let builder = MajorantBuilder::new(&materials);

        let literal = builder.build_photon(&g, FloorPolicy::Constant(1e-2)).unwrap();
        assert_eq!(literal.computed_minimum, 0.5);
        assert_eq!(literal.floor, 1e-2);

        let computed = builder.build_photon(&g, FloorPolicy::ComputedMinimum).unwrap();
        assert_eq!(computed.floor, 0.5);
    }

    #[test]
    fn test_empty_curve_floor_is_infinite() {
        let g = grid();
        let materials = Materials::new();
        let majorant = MajorantBuilder::new(&materials)
            .build_neutron(&g, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert!(majorant.floor.is_infinite());
        let majorants = Majorants {
            neutron: Some(majorant),
            photon: None,
        };
        assert_eq!(majorants.floor(ParticleType::Neutron), 0.0);
    }

    #[test]
    fn test_multigroup_pointwise_max() {
        let g = EnergyGrid::new(vec![1e-6, 1e-3, 1.0]).unwrap();
        let mut materials = Materials::new();
        materials.append(Material::new("a").with_multigroup_total(vec![1.0, 5.0, 2.0]));
        materials.append(Material::new("b").with_multigroup_total(vec![3.0, 0.5, 2.5]));
        let majorant = MajorantBuilder::new(&materials)
            .build_multigroup(ParticleType::Neutron, &g, FloorPolicy::ComputedMinimum)
            .unwrap();
        assert_eq!(majorant.values, vec![3.0, 5.0, 2.5]);
        assert_eq!(majorant.floor, 2.5);

        materials.append(Material::new("c").with_multigroup_total(vec![1.0]));
        assert!(MajorantBuilder::new(&materials)
            .build_multigroup(ParticleType::Neutron, &g, FloorPolicy::ComputedMinimum)
            .is_err());
    }

    #[test]
    fn test_value_at_interpolates() {
        let g = EnergyGrid::new(vec![1.0, 3.0]).unwrap();
        let majorant = Majorant::assemble(
            ParticleType::Neutron,
            &g,
            vec![2.0, 4.0],
            FloorPolicy::ComputedMinimum,
        );
        assert_relative_eq!(majorant.value_at(2.0), 3.0);
        assert_eq!(majorant.value_at(0.1), 2.0);
        assert_eq!(majorant.value_at(10.0), 4.0);
    }

    #[test]
    fn test_disabled_delta_tracking_builds_nothing() {
        let g = grid();
        let mut materials = Materials::new();
        materials.append(constant_material("a", &g, 2.0));
        let config = TrackingConfig {
            delta_tracking: false,
            ..TrackingConfig::default()
        };
        let majorants = Majorants::build(&materials, Some(&g), None, &config).unwrap();
        assert!(majorants.neutron.is_none());
    }
}
