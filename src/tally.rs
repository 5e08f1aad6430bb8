use crate::materials::MaterialHandle;
use crate::particle::{Particle, ParticleType};
use std::fmt;
use std::sync::Mutex;

/// Batch statistics of a single scalar result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub name: String,
    pub units: String,
    /// Per-batch values, already normalized per source particle.
    pub batch_data: Vec<f64>,
    pub mean: f64,
    pub std_dev: f64,
    /// Relative error (std_dev / mean), zero when the mean vanishes.
    pub rel_error: f64,
    pub n_batches: u32,
}

impl Tally {
    pub fn with_name_and_units(name: &str, units: &str) -> Self {
        Self {
            name: name.to_string(),
            units: units.to_string(),
            ..Self::default()
        }
    }

    /// Add a batch total, divided by `normalization` (source particles in the batch).
    pub fn add_batch(&mut self, total: f64, normalization: f64) {
        let value = if normalization > 0.0 { total / normalization } else { 0.0 };
        self.batch_data.push(value);
        self.update_statistics();
    }

    fn update_statistics(&mut self) {
        let n = self.batch_data.len() as f64;
        self.n_batches = self.batch_data.len() as u32;
        if self.batch_data.is_empty() {
            self.mean = 0.0;
            self.std_dev = 0.0;
            self.rel_error = 0.0;
            return;
        }
        self.mean = self.batch_data.iter().sum::<f64>() / n;
        // Standard deviation of the mean
        let variance = if n > 1.0 {
            self.batch_data
                .iter()
                .map(|x| (x - self.mean).powi(2))
                .sum::<f64>()
                / (n - 1.0)
                / n
        } else {
            0.0
        };
        self.std_dev = variance.sqrt();
        self.rel_error = if self.mean != 0.0 {
            self.std_dev / self.mean.abs()
        } else {
            0.0
        };
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.6e} +/- {:.6e} {} ({:.2}%, {} batches)",
            self.name,
            self.mean,
            self.std_dev,
            self.units,
            self.rel_error * 100.0,
            self.n_batches
        )
    }
}

/// Event counts of one worker, merged after the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingCounters {
    pub histories: u64,
    pub virtual_collisions: u64,
    pub real_collisions: u64,
    /// Real collisions demoted by the density factor.
    pub density_rejections: u64,
    pub surface_crossings: u64,
    pub delta_tracks: u64,
    pub surface_tracks: u64,
    pub tracking_loops: u64,
    pub loop_anomalies: u64,
    pub neutron_leak_weight: f64,
    pub photon_leak_weight: f64,
    pub captures: u64,
    pub fissions: u64,
    pub energy_cutoffs: u64,
    pub time_cutoffs: u64,
    pub weight_cutoffs: u64,
    pub generation_cutoffs: u64,
    pub fission_neutrons: u64,
}

impl TrackingCounters {
    pub fn merge(&mut self, other: &TrackingCounters) {
        self.histories += other.histories;
        self.virtual_collisions += other.virtual_collisions;
        self.real_collisions += other.real_collisions;
        self.density_rejections += other.density_rejections;
        self.surface_crossings += other.surface_crossings;
        self.delta_tracks += other.delta_tracks;
        self.surface_tracks += other.surface_tracks;
        self.tracking_loops += other.tracking_loops;
        self.loop_anomalies += other.loop_anomalies;
        self.neutron_leak_weight += other.neutron_leak_weight;
        self.photon_leak_weight += other.photon_leak_weight;
        self.captures += other.captures;
        self.fissions += other.fissions;
        self.energy_cutoffs += other.energy_cutoffs;
        self.time_cutoffs += other.time_cutoffs;
        self.weight_cutoffs += other.weight_cutoffs;
        self.generation_cutoffs += other.generation_cutoffs;
        self.fission_neutrons += other.fission_neutrons;
    }

    pub fn add_leak(&mut self, particle_type: ParticleType, weight: f64) {
        match particle_type {
            ParticleType::Neutron => self.neutron_leak_weight += weight,
            ParticleType::Photon => self.photon_leak_weight += weight,
        }
    }

    /// Fraction of sampled collision points that were real.
    pub fn collision_efficiency(&self) -> f64 {
        let total = self.real_collisions + self.virtual_collisions + self.density_rejections;
        if total == 0 {
            1.0
        } else {
            self.real_collisions as f64 / total as f64
        }
    }
}

/// Receiver of scores produced while tracking. Methods default to no-ops;
/// `worker` lets implementations keep per-thread accumulators.
pub trait ScoreSink: Send + Sync {
    /// Every sampled collision point, real or virtual, with the majorant used
    /// to sample it.
    fn score_collision_point(
        &self,
        _worker: usize,
        _particle: &Particle,
        _material: Option<MaterialHandle>,
        _majorant: f64,
    ) {
    }

    /// Analog real collision, before density-factor rejection.
    fn score_real_collision(&self, _worker: usize, _particle: &Particle, _material: MaterialHandle) {}

    /// Straight surface-tracking segment inside a material.
    fn score_track(
        &self,
        _worker: usize,
        _particle: &Particle,
        _material: Option<MaterialHandle>,
        _length: f64,
    ) {
    }

    fn score_leak(&self, _worker: usize, _particle: &Particle) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ScoreSink for NullSink {}

/// Scalar flux per material from a combined collision / track-length estimator,
/// plus the analog real-collision rate.
#[derive(Debug)]
pub struct MaterialFluxSink {
    flux: Vec<Mutex<Vec<f64>>>,
    collisions: Vec<Mutex<Vec<f64>>>,
    n_materials: usize,
}

impl MaterialFluxSink {
    pub fn new(n_materials: usize, workers: usize) -> Self {
        let bins = |_| Mutex::new(vec![0.0; n_materials]);
        MaterialFluxSink {
            flux: (0..workers.max(1)).map(bins).collect(),
            collisions: (0..workers.max(1)).map(bins).collect(),
            n_materials,
        }
    }

    fn add(bins: &[Mutex<Vec<f64>>], worker: usize, material: MaterialHandle, value: f64) {
        let mut guard = bins[worker % bins.len()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(slot) = guard.get_mut(material.0) {
            *slot += value;
        }
    }

    fn sum(&self, bins: &[Mutex<Vec<f64>>]) -> Vec<f64> {
        let mut total = vec![0.0; self.n_materials];
        for worker in bins {
            let guard = worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for (t, v) in total.iter_mut().zip(guard.iter()) {
                *t += v;
            }
        }
        total
    }

    /// Flux integrated over each material's volume (cm per source weight).
    pub fn flux(&self) -> Vec<f64> {
        self.sum(&self.flux)
    }

    pub fn real_collisions(&self) -> Vec<f64> {
        self.sum(&self.collisions)
    }
}

impl ScoreSink for MaterialFluxSink {
    fn score_collision_point(
        &self,
        worker: usize,
        particle: &Particle,
        material: Option<MaterialHandle>,
        majorant: f64,
    ) {
        if let Some(handle) = material {
            if majorant > 0.0 {
                Self::add(&self.flux, worker, handle, particle.weight / majorant);
            }
        }
    }

    fn score_real_collision(&self, worker: usize, particle: &Particle, material: MaterialHandle) {
        Self::add(&self.collisions, worker, material, particle.weight);
    }

    fn score_track(
        &self,
        worker: usize,
        particle: &Particle,
        material: Option<MaterialHandle>,
        length: f64,
    ) {
        if let Some(handle) = material {
            Self::add(&self.flux, worker, handle, particle.weight * length);
        }
    }
}
