use serde::{Deserialize, Serialize};

/// Speed of light in cm/s.
pub const SPEED_OF_LIGHT: f64 = 2.997_924_58e10;
/// Neutron rest mass energy in MeV.
pub const NEUTRON_MASS_MEV: f64 = 939.565_420_52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleType {
    Neutron,
    Photon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: [f64; 3],
    /// Unit direction cosines.
    pub direction: [f64; 3],
    /// Kinetic energy in MeV.
    pub energy: f64,
    pub weight: f64,
    /// Seconds.
    pub time: f64,
    pub particle_type: ParticleType,
    /// Fission generation, 0 for source particles.
    pub generation: u32,
    /// Collisions since the particle was born.
    pub collision_index: u32,
    /// Precursor group of a delayed neutron.
    pub delayed_group: Option<usize>,
    /// Decay constant of the precursor group (1/s).
    pub lambda: f64,
    /// Source history this particle belongs to.
    pub history: u64,
    /// Identical copies still waiting behind this one in a queue slot.
    pub multiplicity: u32,
}

impl Particle {
    pub fn new(position: [f64; 3], direction: [f64; 3], energy: f64) -> Self {
        Self {
            position,
            direction,
            energy,
            weight: 1.0,
            time: 0.0,
            particle_type: ParticleType::Neutron,
            generation: 0,
            collision_index: 0,
            delayed_group: None,
            lambda: 0.0,
            history: 0,
            multiplicity: 0,
        }
    }

    pub fn photon(position: [f64; 3], direction: [f64; 3], energy: f64) -> Self {
        Self {
            particle_type: ParticleType::Photon,
            ..Self::new(position, direction, energy)
        }
    }

    /// Speed in cm/s. Neutrons use the relativistic relation; photons move at `c`.
    pub fn speed(&self) -> f64 {
        match self.particle_type {
            ParticleType::Photon => SPEED_OF_LIGHT,
            ParticleType::Neutron => {
                let gamma = 1.0 + self.energy / NEUTRON_MASS_MEV;
                SPEED_OF_LIGHT * (1.0 - 1.0 / (gamma * gamma)).sqrt()
            }
        }
    }

    /// Advance the position along the current direction.
    #[inline]
    pub fn move_by(&mut self, distance: f64) {
        for i in 0..3 {
            self.position[i] += distance * self.direction[i];
        }
    }

    /// Copy used for a secondary produced at the current collision site.
    pub fn secondary(&self, direction: [f64; 3], energy: f64) -> Self {
        Self {
            direction,
            energy,
            collision_index: 0,
            multiplicity: 0,
            delayed_group: None,
            lambda: 0.0,
            ..self.clone()
        }
    }
}
