use crate::error::{Result, TransportError};
use crate::utilities::normalize;
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Gamma};

/// Angular distribution types - simplified enum approach
#[derive(Debug, Clone, PartialEq)]
pub enum AngularDistribution {
    Isotropic,
    Monodirectional { reference_uvw: [f64; 3] },
}

impl AngularDistribution {
    /// Create a new monodirectional distribution, normalizing the direction
    pub fn new_monodirectional(u: f64, v: f64, w: f64) -> Result<Self> {
        let reference_uvw = normalize([u, v, w]).ok_or(TransportError::OutOfRange {
            name: "source direction",
            value: 0.0,
            reason: "direction vector cannot be zero".to_string(),
        })?;
        Ok(Self::Monodirectional { reference_uvw })
    }

    pub fn new_isotropic() -> Self {
        Self::Isotropic
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; 3] {
        match self {
            AngularDistribution::Isotropic => {
                let mu: f64 = 2.0 * rng.gen::<f64>() - 1.0;
                let phi = 2.0 * std::f64::consts::PI * rng.gen::<f64>();
                let sqrt_one_minus_mu2 = (1.0 - mu * mu).max(0.0).sqrt();
                [sqrt_one_minus_mu2 * phi.cos(), sqrt_one_minus_mu2 * phi.sin(), mu]
            }
            AngularDistribution::Monodirectional { reference_uvw } => *reference_uvw,
        }
    }
}

/// Source energy distributions, energies in MeV.
#[derive(Debug, Clone)]
pub enum EnergyDistribution {
    Monoenergetic(f64),
    /// Maxwellian `sqrt(E) exp(-E/T)`.
    Maxwell { temperature: f64, gamma: Gamma<f64> },
    /// Watt fission spectrum `exp(-E/a) sinh(sqrt(b E))`.
    Watt { a: f64, b: f64, gamma: Gamma<f64> },
    Discrete {
        energies: Vec<f64>,
        index: WeightedIndex<f64>,
    },
}

fn maxwell_gamma(temperature: f64) -> Result<Gamma<f64>> {
    if !(temperature > 0.0) {
        return Err(TransportError::OutOfRange {
            name: "spectrum temperature",
            value: temperature,
            reason: "must be positive".to_string(),
        });
    }
    Gamma::new(1.5, temperature).map_err(|e| TransportError::OutOfRange {
        name: "spectrum temperature",
        value: temperature,
        reason: e.to_string(),
    })
}

impl EnergyDistribution {
    pub fn monoenergetic(energy: f64) -> Result<Self> {
        if !(energy > 0.0) || !energy.is_finite() {
            return Err(TransportError::OutOfRange {
                name: "source energy",
                value: energy,
                reason: "must be positive and finite".to_string(),
            });
        }
        Ok(Self::Monoenergetic(energy))
    }

    pub fn maxwell(temperature: f64) -> Result<Self> {
        Ok(Self::Maxwell {
            temperature,
            gamma: maxwell_gamma(temperature)?,
        })
    }

    pub fn watt(a: f64, b: f64) -> Result<Self> {
        if !(b >= 0.0) {
            return Err(TransportError::OutOfRange {
                name: "Watt parameter b",
                value: b,
                reason: "must not be negative".to_string(),
            });
        }
        Ok(Self::Watt {
            a,
            b,
            gamma: maxwell_gamma(a)?,
        })
    }

    pub fn discrete(energies: Vec<f64>, probabilities: &[f64]) -> Result<Self> {
        if energies.len() != probabilities.len() || energies.iter().any(|e| !(*e > 0.0)) {
            return Err(TransportError::OutOfRange {
                name: "discrete energies",
                value: energies.len() as f64,
                reason: "need one positive energy per probability".to_string(),
            });
        }
        let index = WeightedIndex::new(probabilities).map_err(|e| TransportError::OutOfRange {
            name: "discrete probabilities",
            value: probabilities.len() as f64,
            reason: e.to_string(),
        })?;
        Ok(Self::Discrete { energies, index })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            EnergyDistribution::Monoenergetic(energy) => *energy,
            EnergyDistribution::Maxwell { gamma, .. } => gamma.sample(rng),
            EnergyDistribution::Watt { a, b, gamma } => {
                let w = gamma.sample(rng);
                let shift = a * a * b / 4.0;
                w + shift + (2.0 * rng.gen::<f64>() - 1.0) * (a * a * b * w).sqrt()
            }
            EnergyDistribution::Discrete { energies, index } => energies[index.sample(rng)],
        }
    }
}

/// Where source particles are born.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialDistribution {
    Point([f64; 3]),
    /// Uniform in an axis-aligned box.
    Box {
        lower_left: [f64; 3],
        upper_right: [f64; 3],
    },
}

impl SpatialDistribution {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; 3] {
        match self {
            SpatialDistribution::Point(point) => *point,
            SpatialDistribution::Box {
                lower_left,
                upper_right,
            } => {
                let mut p = [0.0; 3];
                for i in 0..3 {
                    p[i] = lower_left[i] + rng.gen::<f64>() * (upper_right[i] - lower_left[i]);
                }
                p
            }
        }
    }
}
