// Collision outcome sampling
//
// The tracking loop treats collision physics as a black box behind
// `CollisionSampler`. `SimpleCollisionSampler` is a small analog model
// (isotropic elastic scattering, capture, fission with a Maxwellian spectrum)
// that makes the kernel runnable on its own.

use crate::error::{Result, TransportError};
use crate::fast_rng::FastRng;
use crate::material::Material;
use crate::particle::{Particle, ParticleType};
use nalgebra::Vector3;
use rand_distr::{Distribution, Gamma};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Electron rest mass energy in MeV.
const ELECTRON_MASS_MEV: f64 = 0.510_998_95;

/// What a real collision did to the incident particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionOutcome {
    /// Particle survives with new energy and direction.
    Scatter,
    Capture,
    /// Incident particle is consumed; secondaries are fission neutrons.
    Fission,
}

/// External collision physics.
///
/// Implementations update the particle in place on scattering and push any
/// secondaries produced. Secondaries of a `Fission` outcome are treated as
/// fission neutrons of the next generation, others as same-generation
/// particles.
pub trait CollisionSampler: Send + Sync {
    fn collide(
        &self,
        particle: &mut Particle,
        material: &Material,
        rng: &mut FastRng,
        secondaries: &mut Vec<Particle>,
    ) -> CollisionOutcome;
}

/// Rotate a direction vector by angle theta (cos(theta)=mu) around arbitrary axis
/// This rotates u_old to a new direction with cosine mu relative to original
pub fn rotate_direction_3d(u_old: &Vector3<f64>, mu: f64, phi: f64) -> Vector3<f64> {
    let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();

    // Find a perpendicular vector to u_old
    let perp = if u_old.x.abs() < 0.99 {
        Vector3::new(1.0, 0.0, 0.0).cross(u_old).normalize()
    } else {
        Vector3::new(0.0, 1.0, 0.0).cross(u_old).normalize()
    };
    let ortho = u_old.cross(&perp);

    mu * u_old + sin_theta * phi.cos() * perp + sin_theta * phi.sin() * ortho
}

/// Scatter `direction` by the cosine `mu` with a uniformly sampled azimuth.
pub fn rotate_direction(direction: [f64; 3], mu: f64, rng: &mut FastRng) -> [f64; 3] {
    let phi = 2.0 * PI * rng.random();
    let rotated = rotate_direction_3d(&Vector3::from(direction), mu, phi).normalize();
    [rotated.x, rotated.y, rotated.z]
}

pub fn isotropic_direction(rng: &mut FastRng) -> [f64; 3] {
    let mu = 2.0 * rng.random() - 1.0;
    let phi = 2.0 * PI * rng.random();
    let s = (1.0 - mu * mu).sqrt();
    [s * phi.cos(), s * phi.sin(), mu]
}

/// Reaction probabilities and kinematics of one material.
#[derive(Debug, Clone)]
pub struct CollisionModel {
    pub capture_probability: f64,
    pub fission_probability: f64,
    /// Mean neutrons per fission.
    pub nu: f64,
    /// Target mass in neutron masses.
    pub target_mass: f64,
    /// Maxwellian temperature of the fission spectrum (MeV).
    pub fission_temperature: f64,
    pub delayed_fraction: f64,
    /// Precursor decay constants (1/s), one per delayed group.
    pub decay_constants: Vec<f64>,
    spectrum: Gamma<f64>,
}

impl CollisionModel {
    pub fn new(capture_probability: f64, fission_probability: f64, target_mass: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&(capture_probability + fission_probability))
            || capture_probability < 0.0
            || fission_probability < 0.0
        {
            return Err(TransportError::OutOfRange {
                name: "capture + fission probability",
                value: capture_probability + fission_probability,
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        if target_mass <= 0.0 {
            return Err(TransportError::OutOfRange {
                name: "target mass",
                value: target_mass,
                reason: "must be positive".to_string(),
            });
        }
        Ok(CollisionModel {
            capture_probability,
            fission_probability,
            nu: 2.43,
            target_mass,
            fission_temperature: 1.2895,
            delayed_fraction: 0.0,
            decay_constants: Vec::new(),
            spectrum: maxwellian(1.2895)?,
        })
    }

    /// Pure scatterer.
    pub fn scatterer(target_mass: f64) -> Result<Self> {
        Self::new(0.0, 0.0, target_mass)
    }

    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu;
        self
    }

    pub fn with_fission_temperature(mut self, temperature: f64) -> Result<Self> {
        self.spectrum = maxwellian(temperature)?;
        self.fission_temperature = temperature;
        Ok(self)
    }

    pub fn with_delayed(mut self, fraction: f64, decay_constants: Vec<f64>) -> Self {
        self.delayed_fraction = fraction;
        self.decay_constants = decay_constants;
        self
    }

    fn scatter(&self, particle: &mut Particle, rng: &mut FastRng) {
        match particle.particle_type {
            ParticleType::Neutron => {
                // Isotropic in the centre-of-mass frame
                let a = self.target_mass;
                let mu_cm = 2.0 * rng.random() - 1.0;
                let denom = a * a + 2.0 * a * mu_cm + 1.0;
                particle.energy *= denom / ((a + 1.0) * (a + 1.0));
                let mu_lab = if denom > 0.0 { (1.0 + a * mu_cm) / denom.sqrt() } else { 1.0 };
                particle.direction = rotate_direction(particle.direction, mu_lab, rng);
            }
            ParticleType::Photon => {
                // Compton kinematics, isotropic scattering angle
                let mu = 2.0 * rng.random() - 1.0;
                particle.energy /= 1.0 + particle.energy / ELECTRON_MASS_MEV * (1.0 - mu);
                particle.direction = rotate_direction(particle.direction, mu, rng);
            }
        }
    }

    fn fission(&self, particle: &Particle, rng: &mut FastRng, secondaries: &mut Vec<Particle>) {
        let n = (self.nu + rng.random()).floor() as usize;
        for _ in 0..n {
            let energy = self.spectrum.sample(rng);
            let mut neutron = particle.secondary(isotropic_direction(rng), energy);
            if !self.decay_constants.is_empty() && rng.random() < self.delayed_fraction {
                let group = ((rng.random() * self.decay_constants.len() as f64) as usize)
                    .min(self.decay_constants.len() - 1);
                neutron.delayed_group = Some(group);
                neutron.lambda = self.decay_constants[group];
            }
            secondaries.push(neutron);
        }
    }
}

fn maxwellian(temperature: f64) -> Result<Gamma<f64>> {
    Gamma::new(1.5, temperature).map_err(|e| TransportError::OutOfRange {
        name: "fission spectrum temperature",
        value: temperature,
        reason: e.to_string(),
    })
}

/// Analog collision physics with one model per material name.
#[derive(Debug, Clone)]
pub struct SimpleCollisionSampler {
    pub default: CollisionModel,
    pub per_material: HashMap<String, CollisionModel>,
}

impl SimpleCollisionSampler {
    pub fn new(default: CollisionModel) -> Self {
        SimpleCollisionSampler {
            default,
            per_material: HashMap::new(),
        }
    }

    pub fn with_material(mut self, name: &str, model: CollisionModel) -> Self {
        self.per_material.insert(name.to_string(), model);
        self
    }

    fn model(&self, material: &Material) -> &CollisionModel {
        self.per_material.get(&material.name).unwrap_or(&self.default)
    }
}

impl CollisionSampler for SimpleCollisionSampler {
    fn collide(
        &self,
        particle: &mut Particle,
        material: &Material,
        rng: &mut FastRng,
        secondaries: &mut Vec<Particle>,
    ) -> CollisionOutcome {
        let model = self.model(material);
        let r = rng.random();
        if r < model.capture_probability {
            return CollisionOutcome::Capture;
        }
        if particle.particle_type == ParticleType::Neutron
            && r < model.capture_probability + model.fission_probability
        {
            model.fission(particle, rng, secondaries);
            return CollisionOutcome::Fission;
        }
        model.scatter(particle, rng);
        CollisionOutcome::Scatter
    }
}
