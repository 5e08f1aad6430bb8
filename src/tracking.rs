// Particle tracking state machine
//
// A history alternates between delta-tracking steps (sampled against the
// majorant, tentative collisions reclassified as real or virtual) and
// surface-tracking steps (sampled against the local total, stopped at cell
// boundaries). Steps are shortened by weight-window boundaries and the time
// cutoff before they are committed.

use crate::bank::{SharedQueues, WorkerQueue};
use crate::config::{SimulationMode, TrackingConfig};
use crate::error::{Result, TransportError};
use crate::fast_rng::FastRng;
use crate::geometry::{BoundaryOutcome, Geometry, SURFACE_TOLERANCE};
use crate::majorant::Majorants;
use crate::material::Material;
use crate::materials::{MaterialHandle, Materials};
use crate::particle::{Particle, ParticleType};
use crate::physics::{CollisionOutcome, CollisionSampler};
use crate::tally::{NullSink, ScoreSink, TrackingCounters};
use crate::weight_window::{NoWeightWindow, WeightWindow};
use tracing::{debug, trace, warn};

static NO_WEIGHT_WINDOW: NoWeightWindow = NoWeightWindow;
static NULL_SINK: NullSink = NullSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Delta,
    Surface,
}

/// Chooses the tracking method for the next step.
pub trait TrackingModeSelector: Send + Sync {
    fn select(
        &self,
        particle: &Particle,
        material: Option<&Material>,
        totxs: f64,
        majorant: f64,
    ) -> TrackingMode;
}

/// Delta-tracking unless the rejection probability `1 - totxs/majorant`
/// exceeds the threshold, the material forces surface-tracking or there is
/// no usable majorant.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdSelector {
    pub delta_tracking: bool,
    pub threshold: f64,
}

impl ThresholdSelector {
    pub fn from_config(config: &TrackingConfig) -> Self {
        ThresholdSelector {
            delta_tracking: config.delta_tracking,
            threshold: config.delta_tracking_threshold,
        }
    }
}

impl TrackingModeSelector for ThresholdSelector {
    fn select(
        &self,
        _particle: &Particle,
        material: Option<&Material>,
        totxs: f64,
        majorant: f64,
    ) -> TrackingMode {
        if !self.delta_tracking || !majorant.is_finite() || majorant <= 0.0 {
            return TrackingMode::Surface;
        }
        if material.is_some_and(|m| m.force_surface_tracking) {
            return TrackingMode::Surface;
        }
        if 1.0 - totxs / majorant > self.threshold {
            TrackingMode::Surface
        } else {
            TrackingMode::Delta
        }
    }
}

/// Where a step stopped, before reclassification.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StepEvent {
    /// Tentative collision sampled with cross section `xs`.
    Collision { xs: f64 },
    Surface,
    TimeCutoff,
    WeightWindowBoundary,
}

/// Why a history stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEnd {
    Capture,
    Fission,
    EnergyCutoff,
    WeightCutoff,
    Leak,
    TimeCutoff,
    GenerationCutoff,
    /// Discarded after exceeding the loop limit.
    LoopLimit,
}

/// Result of tracking one particle.
#[derive(Debug, Clone)]
pub struct HistoryOutcome {
    pub end: TrackEnd,
    /// Final state of the tracked particle.
    pub particle: Particle,
    /// Fission neutrons, already in the next generation.
    pub fission: Vec<Particle>,
    /// Other secondaries and weight-window splits.
    pub secondaries: Vec<Particle>,
    /// Tracking loops run, including those before the last scattering.
    pub loops: usize,
}

/// Mutable per-worker state threaded through the tracker.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub worker: usize,
    pub rng: FastRng,
    pub counters: TrackingCounters,
}

impl WorkerState {
    pub fn new(worker: usize, rng: FastRng) -> Self {
        WorkerState {
            worker,
            rng,
            counters: TrackingCounters::default(),
        }
    }
}

/// Read-only view of everything a worker needs to track particles.
pub struct Tracker<'a> {
    pub geometry: &'a Geometry,
    pub materials: &'a Materials,
    pub majorants: &'a Majorants,
    pub config: &'a TrackingConfig,
    collision: &'a dyn CollisionSampler,
    selector: Option<&'a dyn TrackingModeSelector>,
    default_selector: ThresholdSelector,
    weight_window: &'a dyn WeightWindow,
    sink: &'a dyn ScoreSink,
}

impl<'a> Tracker<'a> {
    pub fn new(
        geometry: &'a Geometry,
        materials: &'a Materials,
        majorants: &'a Majorants,
        config: &'a TrackingConfig,
        collision: &'a dyn CollisionSampler,
    ) -> Self {
        Tracker {
            geometry,
            materials,
            majorants,
            config,
            collision,
            selector: None,
            default_selector: ThresholdSelector::from_config(config),
            weight_window: &NO_WEIGHT_WINDOW,
            sink: &NULL_SINK,
        }
    }

    pub fn with_selector(mut self, selector: &'a dyn TrackingModeSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_weight_window(mut self, weight_window: &'a dyn WeightWindow) -> Self {
        self.weight_window = weight_window;
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn ScoreSink) -> Self {
        self.sink = sink;
        self
    }

    fn material_in(&self, cell: usize) -> Option<(MaterialHandle, &'a Material)> {
        let handle = self.geometry.cell(cell).material()?;
        self.materials.get(handle).map(|material| (handle, material))
    }

    fn total_xs(&self, material: &Material, particle: &Particle) -> f64 {
        if self.config.multigroup && particle.particle_type == ParticleType::Neutron {
            return self
                .majorants
                .get(ParticleType::Neutron)
                .map_or(0.0, |m| material.multigroup_xs(m.grid.as_slice(), particle.energy));
        }
        material.total_xs(particle.particle_type, particle.energy)
    }

    fn majorant_at(&self, particle: &Particle) -> f64 {
        self.majorants
            .get(particle.particle_type)
            .map_or(0.0, |m| m.value_at(particle.energy))
    }

    /// Delta-tracking step. A sampled point beyond the outer boundary is
    /// replaced by the crossing of that boundary.
    fn move_delta(&self, particle: &Particle, majorant: f64, rng: &mut FastRng) -> Result<(f64, StepEvent)> {
        let length = -rng.random_open().ln() / majorant;
        let mut end = particle.position;
        for i in 0..3 {
            end[i] += length * particle.direction[i];
        }
        match self.geometry.find_cell(end) {
            Some(cell) if !self.geometry.cell(cell).is_outside() => {
                Ok((length, StepEvent::Collision { xs: majorant }))
            }
            _ => {
                let d = self
                    .geometry
                    .distance_to_outside(particle.position, particle.direction)?;
                Ok((d.min(length), StepEvent::Surface))
            }
        }
    }

    /// Surface-tracking step inside `cell`. The path is sampled with the
    /// local total, or with the minimum cross section if that is larger.
    fn move_surface(
        &self,
        particle: &Particle,
        cell: usize,
        totxs: f64,
        minxs: f64,
        rng: &mut FastRng,
    ) -> (f64, StepEvent) {
        let d = self
            .geometry
            .nearest_boundary(cell, particle.position, particle.direction);
        let xs = totxs.max(minxs);
        let length = if xs > 0.0 {
            -rng.random_open().ln() / xs
        } else {
            f64::INFINITY
        };
        if length < d {
            (length, StepEvent::Collision { xs })
        } else {
            (d + SURFACE_TOLERANCE, StepEvent::Surface)
        }
    }

    /// Track one particle until it stops.
    ///
    /// Errors are reserved for conditions that invalidate the run: a particle
    /// starting with pending copies, a start time outside the time window,
    /// a photon below the energy cutoff, a lost particle, or a loop-limit
    /// overrun when that is configured fatal.
    pub fn run_history(&self, mut particle: Particle, state: &mut WorkerState) -> Result<HistoryOutcome> {
        if particle.multiplicity > 0 {
            return Err(TransportError::MultiplicityAtStart(particle.multiplicity));
        }
        let WorkerState {
            worker,
            rng,
            counters,
        } = state;
        let worker = *worker;
        let particle_type = particle.particle_type;
        let mut fission = Vec::new();
        let mut secondaries = Vec::new();
        counters.histories += 1;

        if particle.generation >= self.config.generation_cutoff {
            counters.generation_cutoffs += 1;
            return Ok(HistoryOutcome {
                end: TrackEnd::GenerationCutoff,
                particle,
                fission,
                secondaries,
                loops: 0,
            });
        }
        if particle.time < self.config.time_min || particle.time >= self.config.time_max {
            return Err(TransportError::OutOfRange {
                name: "particle time",
                value: particle.time,
                reason: format!(
                    "outside the time window [{}, {})",
                    self.config.time_min, self.config.time_max
                ),
            });
        }
        if !self.weight_window.apply(&mut particle, rng, &mut secondaries) {
            counters.weight_cutoffs += 1;
            return Ok(HistoryOutcome {
                end: TrackEnd::WeightCutoff,
                particle,
                fission,
                secondaries,
                loops: 0,
            });
        }

        let mut cell = self.geometry.locate(particle.position)?;
        let max_loops = self.config.max_loops(particle_type);
        let energy_min = self.config.energy_min(particle_type);
        let selector: &dyn TrackingModeSelector = match self.selector {
            Some(selector) => selector,
            None => &self.default_selector,
        };
        let mut loops = 0usize;
        let mut total_loops = 0usize;

        let end = loop {
            if loops >= max_loops {
                break None;
            }
            loops += 1;
            total_loops += 1;

            if particle_type == ParticleType::Photon && particle.energy < energy_min {
                return Err(TransportError::OutOfRange {
                    name: "photon energy",
                    value: particle.energy,
                    reason: format!("below the photon cutoff {energy_min}"),
                });
            }

            let speed = particle.speed();
            let minxs = self.majorants.floor(particle_type);
            let material = self.material_in(cell);
            let totxs = material.map_or(0.0, |(_, m)| self.total_xs(m, &particle));
            let majorant = self.majorant_at(&particle).max(minxs);
            let mode = selector.select(&particle, material.map(|(_, m)| m), totxs, majorant);

            let (mut length, mut event) = match mode {
                TrackingMode::Delta => {
                    counters.delta_tracks += 1;
                    self.move_delta(&particle, majorant, rng)?
                }
                TrackingMode::Surface => {
                    counters.surface_tracks += 1;
                    self.move_surface(&particle, cell, totxs, minxs, rng)
                }
            };

            let to_window = self.weight_window.distance_to_boundary(&particle);
            if to_window + SURFACE_TOLERANCE < length {
                length = to_window + SURFACE_TOLERANCE;
                event = StepEvent::WeightWindowBoundary;
            }
            let mut dt = length / speed;
            if particle.time + dt >= self.config.time_max {
                dt = self.config.time_max - particle.time;
                length = dt * speed;
                event = StepEvent::TimeCutoff;
            }
            if !length.is_finite() {
                return Err(TransportError::ParticleLost {
                    position: particle.position,
                });
            }

            particle.move_by(length);
            particle.time = if event == StepEvent::TimeCutoff {
                self.config.time_max
            } else {
                particle.time + dt
            };
            if mode == TrackingMode::Surface {
                self.sink
                    .score_track(worker, &particle, material.map(|(h, _)| h), length);
            }

            cell = self.geometry.locate(particle.position)?;
            if self.geometry.cell(cell).is_outside() {
                event = StepEvent::Surface;
            }
            trace!(?mode, ?event, length, cell, "tracking step");

            match event {
                StepEvent::Collision { xs } => {
                    let here = self.material_in(cell);
                    if mode == TrackingMode::Delta {
                        self.sink
                            .score_collision_point(worker, &particle, here.map(|(h, _)| h), xs);
                    }
                    let local = here.map_or(0.0, |(_, m)| self.total_xs(m, &particle));
                    let Some((handle, material)) = here else {
                        counters.virtual_collisions += 1;
                        continue;
                    };
                    if rng.random() * xs >= local {
                        counters.virtual_collisions += 1;
                        continue;
                    }
                    self.sink.score_real_collision(worker, &particle, handle);
                    let g = material.density_factor(particle.position, particle.time);
                    if rng.random() >= g {
                        counters.density_rejections += 1;
                        continue;
                    }
                    counters.real_collisions += 1;
                    particle.collision_index += 1;

                    let mut produced = Vec::new();
                    match self.collision.collide(&mut particle, material, rng, &mut produced) {
                        CollisionOutcome::Scatter => {
                            secondaries.append(&mut produced);
                            if particle.energy < energy_min {
                                counters.energy_cutoffs += 1;
                                break Some(TrackEnd::EnergyCutoff);
                            }
                            loops = 0;
                        }
                        CollisionOutcome::Capture => {
                            secondaries.append(&mut produced);
                            counters.captures += 1;
                            break Some(TrackEnd::Capture);
                        }
                        CollisionOutcome::Fission => {
                            counters.fissions += 1;
                            counters.fission_neutrons += produced.len() as u64;
                            if produced.len() > self.config.fission_warning_threshold {
                                warn!(
                                    count = produced.len(),
                                    material = %material.name,
                                    "unusually many neutrons from a single fission"
                                );
                            }
                            for neutron in &mut produced {
                                neutron.generation = particle.generation + 1;
                                neutron.collision_index = 0;
                            }
                            fission.append(&mut produced);
                            break Some(TrackEnd::Fission);
                        }
                    }
                }
                StepEvent::Surface => {
                    counters.surface_crossings += 1;
                    if !self.geometry.cell(cell).is_outside() {
                        continue;
                    }
                    match self.geometry.apply_boundary(&mut particle) {
                        BoundaryOutcome::Leaked => {
                            counters.add_leak(particle_type, particle.weight);
                            self.sink.score_leak(worker, &particle);
                            break Some(TrackEnd::Leak);
                        }
                        BoundaryOutcome::Reflected | BoundaryOutcome::Translated => {
                            match self.geometry.find_cell(particle.position) {
                                Some(c) if !self.geometry.cell(c).is_outside() => cell = c,
                                _ => {
                                    return Err(TransportError::ParticleLost {
                                        position: particle.position,
                                    })
                                }
                            }
                        }
                    }
                }
                StepEvent::TimeCutoff => {
                    counters.time_cutoffs += 1;
                    break Some(TrackEnd::TimeCutoff);
                }
                StepEvent::WeightWindowBoundary => {
                    if !self.weight_window.apply(&mut particle, rng, &mut secondaries) {
                        counters.weight_cutoffs += 1;
                        break Some(TrackEnd::WeightCutoff);
                    }
                }
            }
        };
        counters.tracking_loops += total_loops as u64;

        let end = match end {
            Some(end) => end,
            None if self.config.loop_limit_fatal(particle_type) => {
                return Err(TransportError::LoopLimit {
                    particle_type,
                    limit: max_loops,
                    energy: particle.energy,
                });
            }
            None => {
                warn!(
                    ?particle_type,
                    energy = particle.energy,
                    limit = max_loops,
                    "loop limit exceeded, history discarded"
                );
                counters.loop_anomalies += 1;
                TrackEnd::LoopLimit
            }
        };
        Ok(HistoryOutcome {
            end,
            particle,
            fission,
            secondaries,
            loops: total_loops,
        })
    }

    /// Emission time of a delayed neutron released at `time`.
    fn delayed_emission(&self, neutron: &mut Particle, rng: &mut FastRng) {
        if neutron.delayed_group.is_some() && neutron.lambda > 0.0 {
            neutron.time -= rng.random_open().ln() / neutron.lambda;
        }
    }

    /// Track a source particle and every secondary it produces, in a local
    /// queue. In criticality mode fission neutrons go to `bank` (or, with the
    /// Wielandt probability, stay in this generation); otherwise they are
    /// tracked now. Particles reaching the time cutoff go to `bank` in
    /// time-dependent mode.
    pub fn run_source_history(
        &self,
        primary: Particle,
        state: &mut WorkerState,
        bank: &mut Vec<Particle>,
    ) -> Result<Vec<HistoryOutcome>> {
        let mut queue = WorkerQueue::new();
        let mut outcomes = Vec::new();
        queue.push(primary);
        while let Some(particle) = queue.pop() {
            let mut outcome = self.run_history(particle, state)?;
            for secondary in outcome.secondaries.drain(..) {
                queue.push(secondary);
            }
            for neutron in outcome.fission.drain(..) {
                match self.config.mode {
                    SimulationMode::Criticality => {
                        if state.rng.random() < self.config.wielandt_probability {
                            queue.push(neutron);
                        } else {
                            bank.push(neutron);
                        }
                    }
                    SimulationMode::ExternalSource | SimulationMode::TimeDependent => {
                        let mut neutron = neutron;
                        self.delayed_emission(&mut neutron, &mut state.rng);
                        if neutron.time >= self.config.time_max {
                            state.counters.time_cutoffs += 1;
                            if self.config.mode == SimulationMode::TimeDependent {
                                bank.push(neutron);
                            }
                        } else {
                            queue.push(neutron);
                        }
                    }
                }
            }
            if outcome.end == TrackEnd::TimeCutoff && self.config.mode == SimulationMode::TimeDependent {
                bank.push(outcome.particle.clone());
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// One time-dependent cycle on the shared queues: process the histories
    /// queued for this worker when the cycle starts, hand secondaries to the
    /// least loaded queue and bank particles cut at the interval end.
    /// Returns the number of histories processed.
    pub fn run_shared_cycle(&self, queues: &SharedQueues, state: &mut WorkerState) -> Result<usize> {
        let worker = state.worker;
        let pending = queues.lock(worker).pending();
        let mut processed = 0;
        for _ in 0..pending {
            let Some(particle) = queues.pop(worker) else {
                break;
            };
            let mut outcome = self.run_history(particle, state)?;
            processed += 1;
            for secondary in outcome.secondaries.drain(..) {
                queues.push_least_loaded(secondary);
            }
            for mut neutron in outcome.fission.drain(..) {
                self.delayed_emission(&mut neutron, &mut state.rng);
                if neutron.time >= self.config.time_max {
                    queues.lock(worker).bank(neutron);
                } else {
                    queues.push_least_loaded(neutron);
                }
            }
            if outcome.end == TrackEnd::TimeCutoff {
                queues.lock(worker).bank(outcome.particle);
            }
        }
        debug!(worker, processed, "shared cycle done");
        Ok(processed)
    }
}
