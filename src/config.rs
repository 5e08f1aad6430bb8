// Global configuration for the transport kernel
use crate::error::Result;
use crate::particle::ParticleType;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// Process-wide default tracking configuration
pub static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(Config::new()));

/// How the scalar floor of a majorant curve is chosen after assembly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FloorPolicy {
    /// Smallest strictly positive point of the assembled curve (+inf if none).
    ComputedMinimum,
    /// A fixed value, regardless of the assembled curve.
    Constant(f64),
}

/// Which transport mode the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationMode {
    /// Fission sites are banked for the next generation.
    Criticality,
    /// Fixed source, secondaries tracked within the same history batch.
    ExternalSource,
    /// Time-dependent source, secondaries redistributed across worker queues.
    TimeDependent,
}

/// Tunables consumed by the majorant builder and the tracking loop.
///
/// Every field has a default, so a JSON document only needs the entries it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub mode: SimulationMode,
    /// Build majorants and allow delta-tracking at all.
    pub delta_tracking: bool,
    /// Surface-tracking is used when the rejection probability
    /// `1 - totxs/majorant` exceeds this threshold.
    pub delta_tracking_threshold: f64,
    pub neutron_max_loops: usize,
    pub photon_max_loops: usize,
    /// Exceeding the loop limit aborts the run instead of discarding the history.
    pub neutron_loop_limit_fatal: bool,
    pub photon_loop_limit_fatal: bool,
    pub time_min: f64,
    pub time_max: f64,
    /// Histories with generation index at or above this are cut.
    pub generation_cutoff: u32,
    /// MeV
    pub photon_energy_min: f64,
    /// Neutrons scattered below this energy (MeV) are cut.
    pub neutron_energy_min: f64,
    pub neutron_majorant_floor: FloorPolicy,
    pub photon_majorant_floor: FloorPolicy,
    /// Worker count; `None` uses the rayon pool size.
    pub threads: Option<usize>,
    pub multigroup: bool,
    pub fission_warning_threshold: usize,
    pub min_collision_efficiency: f64,
    /// Probability that a criticality-mode fission neutron is tracked in the
    /// current generation instead of banked (Wielandt shift).
    pub wielandt_probability: f64,
    /// Seed for randomizing the material claim order of the majorant pass.
    pub majorant_claim_shuffle: Option<u64>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            mode: SimulationMode::ExternalSource,
            delta_tracking: true,
            delta_tracking_threshold: 0.9,
            neutron_max_loops: 1_000_000,
            photon_max_loops: 1_000_000,
            neutron_loop_limit_fatal: false,
            photon_loop_limit_fatal: false,
            time_min: 0.0,
            time_max: f64::INFINITY,
            generation_cutoff: u32::MAX,
            photon_energy_min: 1e-3,
            neutron_energy_min: 1e-11,
            neutron_majorant_floor: FloorPolicy::ComputedMinimum,
            photon_majorant_floor: FloorPolicy::Constant(1e-2),
            threads: None,
            multigroup: false,
            fission_warning_threshold: 1000,
            min_collision_efficiency: 0.01,
            wielandt_probability: 0.0,
            majorant_claim_shuffle: None,
        }
    }
}

impl TrackingConfig {
    /// Parse a configuration from JSON, missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn max_loops(&self, particle_type: ParticleType) -> usize {
        match particle_type {
            ParticleType::Neutron => self.neutron_max_loops,
            ParticleType::Photon => self.photon_max_loops,
        }
    }

    pub fn loop_limit_fatal(&self, particle_type: ParticleType) -> bool {
        match particle_type {
            ParticleType::Neutron => self.neutron_loop_limit_fatal,
            ParticleType::Photon => self.photon_loop_limit_fatal,
        }
    }

    pub fn energy_min(&self, particle_type: ParticleType) -> f64 {
        match particle_type {
            ParticleType::Neutron => self.neutron_energy_min,
            ParticleType::Photon => self.photon_energy_min,
        }
    }

    pub fn floor_policy(&self, particle_type: ParticleType) -> FloorPolicy {
        match particle_type {
            ParticleType::Neutron => self.neutron_majorant_floor,
            ParticleType::Photon => self.photon_majorant_floor,
        }
    }

    /// Number of workers the transport and majorant passes split into.
    pub fn worker_count(&self) -> usize {
        self.threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }
}

/// Global configuration container.
///
/// A single instance is exposed via the `CONFIG` static. Code should obtain a
/// guard with [`Config::global`] rather than locking the mutex directly.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tracking: TrackingConfig,
}

impl Config {
    pub fn new() -> Self {
        Config {
            tracking: TrackingConfig::default(),
        }
    }

    /// Replace the tracking defaults from a JSON document.
    pub fn load_tracking_json(&mut self, json: &str) -> Result<()> {
        self.tracking = TrackingConfig::from_json_str(json)?;
        Ok(())
    }

    /// Restore defaults
    pub fn clear(&mut self) {
        self.tracking = TrackingConfig::default();
    }

    /// Get the global configuration instance
    pub fn global() -> std::sync::MutexGuard<'static, Self> {
        CONFIG
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
