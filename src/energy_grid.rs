use crate::error::{Result, TransportError};
use std::ops::Deref;
use std::sync::Arc;

/// Strictly ascending, positive energy grid (MeV) shared between reactions.
///
/// Clones share storage. Two grids are the *same* grid only when they share
/// storage ([`EnergyGrid::same_as`]); equal values on separate allocations are
/// treated as different grids and go through interpolation.
#[derive(Debug, Clone)]
pub struct EnergyGrid {
    points: Arc<[f64]>,
}

impl EnergyGrid {
    /// Validate and wrap a grid.
    pub fn new(points: Vec<f64>) -> Result<Self> {
        if points.is_empty() {
            return Err(TransportError::MalformedGrid("grid has no points".into()));
        }
        if let Some(bad) = points.iter().position(|e| !(*e > 0.0) || !e.is_finite()) {
            return Err(TransportError::MalformedGrid(format!(
                "point {} = {:e} is not a positive finite energy",
                bad, points[bad]
            )));
        }
        if let Some(i) = points.windows(2).position(|w| w[1] <= w[0]) {
            return Err(TransportError::MalformedGrid(format!(
                "points {} and {} are not strictly ascending ({:e} >= {:e})",
                i,
                i + 1,
                points[i],
                points[i + 1]
            )));
        }
        Ok(EnergyGrid {
            points: points.into(),
        })
    }

    /// Merge several grids into one ascending grid without duplicates.
    pub fn unionize(grids: &[&EnergyGrid]) -> Result<Self> {
        let mut merged: Vec<f64> = grids.iter().flat_map(|g| g.iter().copied()).collect();
        merged.sort_by(f64::total_cmp);
        merged.dedup();
        EnergyGrid::new(merged)
    }

    /// Pointer identity
    pub fn same_as(&self, other: &EnergyGrid) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.points
    }

    pub fn min(&self) -> f64 {
        self.points[0]
    }

    pub fn max(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    /// Natural logarithm of every point, for the log-log interpolation modes.
    pub fn ln_points(&self) -> Vec<f64> {
        self.points.iter().map(|e| e.ln()).collect()
    }
}

impl Deref for EnergyGrid {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.points
    }
}
