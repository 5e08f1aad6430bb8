use crate::particle::{Particle, ParticleType};
use crate::stats::{AngularDistribution, EnergyDistribution, SpatialDistribution};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct IndependentSource {
    pub space: SpatialDistribution,
    pub angle: AngularDistribution,
    pub energy: EnergyDistribution,
    pub particle_type: ParticleType,
    /// Emission time in seconds.
    pub time: f64,
}

impl IndependentSource {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Particle {
        let position = self.space.sample(rng);
        let direction = self.angle.sample(rng);
        let energy = self.energy.sample(rng);
        let mut particle = match self.particle_type {
            ParticleType::Neutron => Particle::new(position, direction, energy),
            ParticleType::Photon => Particle::photon(position, direction, energy),
        };
        particle.time = self.time;
        particle
    }

    /// Isotropic 14.06 MeV point neutron source at the origin.
    pub fn new() -> Self {
        Self {
            space: SpatialDistribution::Point([0.0, 0.0, 0.0]),
            angle: AngularDistribution::Isotropic,
            energy: EnergyDistribution::Monoenergetic(14.06),
            particle_type: ParticleType::Neutron,
            time: 0.0,
        }
    }
}

impl Default for IndependentSource {
    fn default() -> Self {
        Self::new()
    }
}
