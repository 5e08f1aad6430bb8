use crate::particle::ParticleType;
use thiserror::Error;

/// Fatal conditions raised by the transport kernel.
///
/// Numerical edge cases (rays parallel to a boundary, zero discriminants,
/// out-of-range interpolation points) are never reported here; the distance
/// and interpolation routines answer those with `f64::INFINITY` or zero.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("malformed energy grid: {0}")]
    MalformedGrid(String),

    #[error("surface type '{kind}' expects {expected} parameters, got {found}")]
    ParameterCount {
        kind: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("unknown surface type '{0}'")]
    UnknownSurfaceType(String),

    #[error("surface {surface_id}: {reason}")]
    InvalidSurface { surface_id: usize, reason: String },

    #[error(
        "density {density:e} of reaction {reaction} in material {material} exceeds maximum {max_density:e}"
    )]
    DensityExceedsMaximum {
        material: String,
        reaction: usize,
        density: f64,
        max_density: f64,
    },

    #[error("divided parent material {0} cannot be included in the majorant")]
    DividedParentMaterial(String),

    #[error("poison {nuclide} has non-zero density in material {material} under equilibrium calculation")]
    PoisonDensity { material: String, nuclide: &'static str },

    #[error("material {0} has no cross-section data for the requested particle type")]
    MissingCrossSection(String),

    #[error("{particle_type:?} history exceeded {limit} tracking loops at E = {energy:e} MeV")]
    LoopLimit {
        particle_type: ParticleType,
        limit: usize,
        energy: f64,
    },

    #[error("particle lost at ({:.6}, {:.6}, {:.6})", .position[0], .position[1], .position[2])]
    ParticleLost { position: [f64; 3] },

    #[error("{name} = {value:e} outside allowed range: {reason}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        reason: String,
    },

    #[error("particle with multiplicity {0} cannot start a history")]
    MultiplicityAtStart(u32),

    #[error("boundary condition cannot be applied: {0}")]
    InvalidBoundary(String),

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
