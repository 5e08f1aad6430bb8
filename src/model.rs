// Batch driver
//
// Builds the majorants once, then runs every batch with one rayon task per
// worker. Histories are seeded from their global index, so fixed-source and
// criticality results do not depend on scheduling.

use crate::bank::SharedQueues;
use crate::config::{Config, SimulationMode, TrackingConfig};
use crate::energy_grid::EnergyGrid;
use crate::error::{Result, TransportError};
use crate::fast_rng::{FastRng, DEFAULT_STRIDE};
use crate::geometry::Geometry;
use crate::majorant::Majorants;
use crate::materials::Materials;
use crate::particle::Particle;
use crate::physics::CollisionSampler;
use crate::settings::Settings;
use crate::tally::{NullSink, ScoreSink, Tally, TrackingCounters};
use crate::tracking::{Tracker, WorkerState};
use crate::weight_window::{NoWeightWindow, WeightWindow};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stream offset separating the per-cycle streams of time-dependent batches.
const CYCLE_STREAMS_PER_BATCH: u64 = 1 << 32;

pub struct Model {
    pub geometry: Geometry,
    pub materials: Materials,
    pub settings: Settings,
    pub config: TrackingConfig,
    pub collision: Arc<dyn CollisionSampler>,
    pub weight_window: Option<Arc<dyn WeightWindow>>,
    pub neutron_grid: Option<EnergyGrid>,
    pub photon_grid: Option<EnergyGrid>,
}

/// Batch statistics and merged counters of a run.
#[derive(Debug, Clone)]
pub struct RunResults {
    /// Leaked weight per source particle.
    pub leakage: Tally,
    /// Real collisions per source particle.
    pub collisions: Tally,
    /// Analog multiplication factor over the active batches (criticality only).
    pub k_eff: Option<Tally>,
    pub counters: TrackingCounters,
    pub majorants: Majorants,
}

impl Model {
    /// Model using a snapshot of the global tracking configuration.
    pub fn new(
        geometry: Geometry,
        materials: Materials,
        settings: Settings,
        collision: Arc<dyn CollisionSampler>,
    ) -> Self {
        let config = Config::global().tracking.clone();
        Model {
            geometry,
            materials,
            settings,
            config,
            collision,
            weight_window: None,
            neutron_grid: None,
            photon_grid: None,
        }
    }

    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_weight_window(mut self, weight_window: Arc<dyn WeightWindow>) -> Self {
        self.weight_window = Some(weight_window);
        self
    }

    /// Unionized grids the majorants are built on.
    pub fn with_energy_grids(mut self, neutron: Option<EnergyGrid>, photon: Option<EnergyGrid>) -> Self {
        self.neutron_grid = neutron;
        self.photon_grid = photon;
        self
    }

    pub fn run(&self) -> Result<RunResults> {
        self.run_with_sink(&NullSink)
    }

    pub fn run_with_sink(&self, sink: &dyn ScoreSink) -> Result<RunResults> {
        self.settings.validate()?;
        let majorants = Majorants::build(
            &self.materials,
            self.neutron_grid.as_ref(),
            self.photon_grid.as_ref(),
            &self.config,
        )?;
        let workers = self.config.worker_count();
        info!(
            mode = ?self.config.mode,
            workers,
            particles = self.settings.particles,
            batches = self.settings.batches,
            "starting transport"
        );

        let mut results = RunResults {
            leakage: Tally::with_name_and_units("leakage", "per source particle"),
            collisions: Tally::with_name_and_units("real collisions", "per source particle"),
            k_eff: None,
            counters: TrackingCounters::default(),
            majorants: Majorants::default(),
        };
        match self.config.mode {
            SimulationMode::ExternalSource => {
                let tracker = self.tracker(&majorants, &self.config, sink);
                for batch in 0..self.settings.batches {
                    let sources = self.sample_sources(batch);
                    let (counters, _) = self.run_batch(&tracker, &sources, batch, workers)?;
                    self.record_batch(&mut results, batch, &counters);
                }
            }
            SimulationMode::Criticality => self.run_criticality(&majorants, sink, workers, &mut results)?,
            SimulationMode::TimeDependent => {
                for batch in 0..self.settings.batches {
                    let counters = self.run_time_dependent(&majorants, sink, batch, workers)?;
                    self.record_batch(&mut results, batch, &counters);
                }
            }
        }

        let efficiency = results.counters.collision_efficiency();
        if efficiency < self.config.min_collision_efficiency {
            warn!(
                efficiency,
                threshold = self.config.min_collision_efficiency,
                "low delta-tracking collision efficiency"
            );
        }
        info!(
            histories = results.counters.histories,
            loops = results.counters.tracking_loops,
            anomalies = results.counters.loop_anomalies,
            "transport finished"
        );
        results.majorants = majorants;
        Ok(results)
    }

    fn tracker<'a>(
        &'a self,
        majorants: &'a Majorants,
        config: &'a TrackingConfig,
        sink: &'a dyn ScoreSink,
    ) -> Tracker<'a> {
        let weight_window: &'a dyn WeightWindow = match &self.weight_window {
            Some(weight_window) => weight_window.as_ref(),
            None => &NoWeightWindow,
        };
        Tracker::new(
            &self.geometry,
            &self.materials,
            majorants,
            config,
            self.collision.as_ref(),
        )
        .with_weight_window(weight_window)
        .with_sink(sink)
    }

    fn history_index(&self, batch: usize, index: usize) -> u64 {
        (batch * self.settings.particles + index) as u64
    }

    /// Source particles of a batch, each sampled from its own history stream.
    fn sample_sources(&self, batch: usize) -> Vec<Particle> {
        let seed = self.settings.seed_or_default();
        (0..self.settings.particles)
            .map(|i| {
                let history = self.history_index(batch, i);
                let mut rng = FastRng::for_history(seed, history, DEFAULT_STRIDE);
                let mut particle = self.settings.source.sample(&mut rng);
                particle.history = history;
                particle
            })
            .collect()
    }

    /// Track `sources` split in contiguous chunks over the workers. Each
    /// history restarts the worker's generator from its own stream; the
    /// banks are concatenated in history order.
    fn run_batch(
        &self,
        tracker: &Tracker,
        sources: &[Particle],
        batch: usize,
        workers: usize,
    ) -> Result<(TrackingCounters, Vec<Particle>)> {
        let seed = self.settings.seed_or_default();
        let chunk = sources.len().div_ceil(workers).max(1);
        let per_worker = sources
            .par_chunks(chunk)
            .enumerate()
            .map(|(worker, chunk)| -> Result<(TrackingCounters, Vec<Particle>)> {
                let mut state = WorkerState::new(worker, FastRng::new(seed));
                let mut bank = Vec::new();
                for source in chunk {
                    // The source draw already used the head of the stream
                    let mut rng = FastRng::for_history(seed, source.history, DEFAULT_STRIDE);
                    rng.skip(DEFAULT_STRIDE / 2);
                    state.rng = rng;
                    tracker.run_source_history(source.clone(), &mut state, &mut bank)?;
                }
                Ok((state.counters, bank))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut counters = TrackingCounters::default();
        let mut bank = Vec::new();
        for (worker_counters, worker_bank) in per_worker {
            counters.merge(&worker_counters);
            bank.extend(worker_bank);
        }
        debug!(batch, histories = counters.histories, banked = bank.len(), "batch done");
        Ok((counters, bank))
    }

    fn record_batch(&self, results: &mut RunResults, batch: usize, counters: &TrackingCounters) {
        let n = self.settings.particles as f64;
        let leaked = counters.neutron_leak_weight + counters.photon_leak_weight;
        results.leakage.add_batch(leaked, n);
        results.collisions.add_batch(counters.real_collisions as f64, n);
        results.counters.merge(counters);
        info!(batch = batch + 1, leakage = leaked / n, "batch complete");
    }

    fn run_criticality(
        &self,
        majorants: &Majorants,
        sink: &dyn ScoreSink,
        workers: usize,
        results: &mut RunResults,
    ) -> Result<()> {
        let tracker = self.tracker(majorants, &self.config, sink);
        let seed = self.settings.seed_or_default();
        let mut k_eff = Tally::with_name_and_units("k-eff", "");
        let mut sources = self.sample_sources(0);

        for batch in 0..self.settings.batches {
            let n = sources.len() as f64;
            let (counters, bank) = self.run_batch(&tracker, &sources, batch, workers)?;
            let k = counters.fission_neutrons as f64 / n;
            self.record_batch(results, batch, &counters);
            if batch >= self.settings.inactive_batches {
                k_eff.add_batch(k, 1.0);
            }
            info!(batch = batch + 1, k, "criticality batch");

            if bank.is_empty() {
                warn!(batch = batch + 1, "fission bank is empty, stopping");
                break;
            }
            sources = self.resample_bank(bank, batch + 1, seed);
        }
        results.k_eff = Some(k_eff);
        Ok(())
    }

    /// Next generation's sources: `particles` sites drawn uniformly from the
    /// bank, with unit weight.
    fn resample_bank(&self, bank: Vec<Particle>, batch: usize, seed: u64) -> Vec<Particle> {
        let mut rng = FastRng::for_history(seed ^ 0x9e37_79b9_7f4a_7c15, batch as u64, DEFAULT_STRIDE);
        let n = self.settings.particles;
        (0..n)
            .map(|i| {
                let pick = ((rng.random() * bank.len() as f64) as usize).min(bank.len() - 1);
                let mut site = bank[pick].clone();
                site.weight = 1.0;
                site.time = 0.0;
                site.collision_index = 0;
                site.delayed_group = None;
                site.lambda = 0.0;
                site.history = self.history_index(batch, i);
                site
            })
            .collect()
    }

    /// One time-dependent batch: queues are processed in cycles until empty,
    /// then particles banked at the interval end seed the next interval.
    fn run_time_dependent(
        &self,
        majorants: &Majorants,
        sink: &dyn ScoreSink,
        batch: usize,
        workers: usize,
    ) -> Result<TrackingCounters> {
        let seed = self.settings.seed_or_default();
        let queues = SharedQueues::new(workers);
        let mut waiting = self.sample_sources(batch);
        let mut counters = TrackingCounters::default();
        let mut cycle = 0u64;

        for (start, end) in self.settings.intervals(self.config.time_min, self.config.time_max) {
            let mut config = self.config.clone();
            config.time_min = start;
            config.time_max = end;
            let tracker = self.tracker(majorants, &config, sink);

            let (now, later): (Vec<_>, Vec<_>) = waiting.into_iter().partition(|p| p.time < end);
            waiting = later;
            for (i, particle) in now.into_iter().enumerate() {
                if particle.time < start {
                    return Err(TransportError::OutOfRange {
                        name: "particle time",
                        value: particle.time,
                        reason: format!("precedes the time interval starting at {start:e}"),
                    });
                }
                queues.push(i % workers, particle);
            }

            while queues.total_pending() > 0 {
                let per_worker = (0..queues.workers())
                    .into_par_iter()
                    .map(|worker| -> Result<TrackingCounters> {
                        let stream = batch as u64 * CYCLE_STREAMS_PER_BATCH + cycle * workers as u64 + worker as u64;
                        let mut state = WorkerState::new(worker, FastRng::for_history(seed, stream, DEFAULT_STRIDE));
                        tracker.run_shared_cycle(&queues, &mut state)?;
                        Ok(state.counters)
                    })
                    .collect::<Result<Vec<_>>>()?;
                for worker_counters in &per_worker {
                    counters.merge(worker_counters);
                }
                cycle += 1;
            }
            let banked = queues.drain_banks();
            debug!(start, end, banked = banked.len(), "time interval done");
            waiting.extend(banked);
        }
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, CellFill};
    use crate::material::Material;
    use crate::materials::MaterialHandle;
    use crate::physics::{CollisionModel, SimpleCollisionSampler};
    use crate::reaction::{Reaction, TotalXs};
    use crate::region::Region;
    use crate::source::IndependentSource;
    use crate::surface::Surface;

    fn model(mode: SimulationMode, xs: f64, physics: CollisionModel) -> Model {
        let grid = EnergyGrid::new(vec![1e-11, 1.0, 20.0]).unwrap();
        let reaction = Reaction::on_grid(grid.clone(), vec![xs; 3]).unwrap();
        let mut materials = Materials::new();
        materials.append(Material::new("m").with_neutron_total(TotalXs::tabulated(Arc::new(reaction))));
        let sphere = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 3.0, 1));
        let geometry = Geometry::new(vec![
            Cell::new(1, Region::inside(&sphere), CellFill::Material(MaterialHandle(0))),
            Cell::new(2, Region::outside(&sphere), CellFill::Outside),
        ])
        .unwrap();
        let mut settings = Settings::new(200, 3, IndependentSource::new());
        settings.seed = Some(11);
        let config = TrackingConfig {
            mode,
            threads: Some(2),
            ..TrackingConfig::default()
        };
        Model::new(geometry, materials, settings, Arc::new(SimpleCollisionSampler::new(physics)))
            .with_config(config)
            .with_energy_grids(Some(grid), None)
    }

    #[test]
    fn test_external_source_pure_absorber_balance() {
        let m = model(SimulationMode::ExternalSource, 0.5, CollisionModel::new(1.0, 0.0, 1.0).unwrap());
        let results = m.run().unwrap();
        let c = &results.counters;
        assert_eq!(c.histories, 600);
        assert_eq!(c.captures as f64 + c.neutron_leak_weight, 600.0);
        // Uncollided escape from the centre: exp(-1.5)
        assert!((results.leakage.mean - (-1.5f64).exp()).abs() < 0.08);
        assert!(results.k_eff.is_none());
    }

    #[test]
    fn test_criticality_produces_k() {
        let mut m = model(SimulationMode::Criticality, 1.0, CollisionModel::new(0.0, 1.0, 235.0).unwrap().with_nu(2.0));
        m.settings.inactive_batches = 1;
        let results = m.run().unwrap();
        let k = results.k_eff.unwrap();
        assert_eq!(k.n_batches, 2);
        assert!(k.mean > 0.0 && k.mean < 2.0);
    }

    #[test]
    fn test_time_dependent_conserves_histories() {
        let mut m = model(SimulationMode::TimeDependent, 0.2, CollisionModel::scatterer(12.0).unwrap());
        m.settings.time_intervals = vec![0.0, 1e-10, 1e-9, 1e-3];
        m.settings.batches = 1;
        let results = m.run().unwrap();
        // Every source neutron eventually leaks from the non-absorbing sphere
        assert!((results.counters.neutron_leak_weight - 200.0).abs() < 1e-9);
        assert!(results.counters.time_cutoffs > 0);
    }

    #[test]
    fn test_source_before_time_window_is_an_error() {
        let mut m = model(SimulationMode::TimeDependent, 0.2, CollisionModel::scatterer(12.0).unwrap());
        m.config.time_min = 1e-9;
        assert!(matches!(
            m.run(),
            Err(TransportError::OutOfRange { name: "particle time", .. })
        ));
    }
}
