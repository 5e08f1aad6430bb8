// Monte Carlo neutral-particle transport kernel

pub mod bank;
pub mod bounding_box;
pub mod cell;
pub mod config;
pub mod energy_grid;
pub mod error;
pub mod fast_rng;
pub mod geometry;
pub mod interpolation;
pub mod majorant;
pub mod material;
pub mod materials;
pub mod model;
pub mod particle;
pub mod physics;
pub mod reaction;
pub mod region;
pub mod settings;
pub mod source;
pub mod stats;
pub mod surface;
pub mod tally;
pub mod tracking;
pub mod transform;
pub mod utilities;
pub mod weight_window;

pub use config::{Config, FloorPolicy, SimulationMode, TrackingConfig};
pub use energy_grid::EnergyGrid;
pub use error::{Result, TransportError};
pub use fast_rng::FastRng;
pub use geometry::{BoundaryCondition, Geometry, SURFACE_TOLERANCE};
pub use majorant::{Majorant, MajorantBuilder, Majorants};
pub use material::Material;
pub use materials::{MaterialHandle, Materials};
pub use model::{Model, RunResults};
pub use particle::{Particle, ParticleType};
pub use reaction::{Reaction, TotalXs};
pub use surface::{Surface, SurfaceType};
pub use tracking::{TrackEnd, Tracker, WorkerState};
pub use utilities::interpolate_linear;
