use crate::cell::Cell;
use crate::error::{Result, TransportError};
use crate::particle::Particle;
use crate::surface::{Surface, SurfaceKind};
use crate::utilities::dot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Distance a particle is pushed past a surface so it is located on the far side.
pub const SURFACE_TOLERANCE: f64 = 1e-8;

/// Upper bound on boundary crossings when walking a ray out of the domain.
const MAX_CROSSINGS: usize = 10_000;

/// Treatment of particles reaching the outer boundary of the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryCondition {
    /// Particles leak out.
    #[default]
    Black,
    /// Specular reflection off the outer surface.
    Reflective,
    /// Re-entry through the opposite face of an axis-aligned box.
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryOutcome {
    Leaked,
    Reflected,
    Translated,
}

/// Geometry is a collection of cells plus the boundary condition of the domain
#[derive(Debug, Clone)]
pub struct Geometry {
    pub cells: Vec<Cell>,
    pub boundary: BoundaryCondition,
    /// Surface bounding the domain; required by reflective and periodic boundaries.
    pub outer_surface: Option<Arc<Surface>>,
}

impl Geometry {
    /// Create a geometry with black boundaries, rejecting duplicated cell or
    /// surface ids.
    pub fn new(cells: Vec<Cell>) -> Result<Self> {
        let mut used_cell_ids = HashSet::new();
        for cell in &cells {
            if !used_cell_ids.insert(cell.cell_id) {
                return Err(TransportError::DuplicateId {
                    kind: "cell",
                    id: cell.cell_id,
                });
            }
        }

        // Surfaces shared between cells are the same Arc; only distinct
        // surfaces with the same id are rejected.
        let mut unique_surface_ptrs = HashSet::new();
        let mut used_surface_ids = HashSet::new();
        for cell in &cells {
            for (surface, _sense) in cell.region.surfaces_with_sense() {
                if unique_surface_ptrs.insert(Arc::as_ptr(&surface))
                    && !used_surface_ids.insert(surface.surface_id)
                {
                    return Err(TransportError::DuplicateId {
                        kind: "surface",
                        id: surface.surface_id,
                    });
                }
            }
        }

        Ok(Geometry {
            cells,
            boundary: BoundaryCondition::Black,
            outer_surface: None,
        })
    }

    /// Set the boundary condition applied on `outer`.
    pub fn with_boundary(
        mut self,
        boundary: BoundaryCondition,
        outer: Option<Arc<Surface>>,
    ) -> Result<Self> {
        match (boundary, &outer) {
            (BoundaryCondition::Black, _) => {}
            (_, None) => {
                return Err(TransportError::InvalidBoundary(format!(
                    "{:?} boundary needs an outer surface",
                    boundary
                )))
            }
            (BoundaryCondition::Periodic, Some(surface)) => {
                let box_like = match &surface.kind {
                    SurfaceKind::Cube { .. }
                    | SurfaceKind::Cuboid { .. }
                    | SurfaceKind::Rectangle { .. } => true,
                    SurfaceKind::Square { corner_radius, .. } => corner_radius.is_none(),
                    _ => false,
                };
                if !box_like || surface.bounding_box().is_none() {
                    return Err(TransportError::InvalidBoundary(format!(
                        "periodic boundary needs an axis-aligned box, surface {} is not one",
                        surface.surface_id
                    )));
                }
            }
            (BoundaryCondition::Reflective, Some(_)) => {}
        }
        self.boundary = boundary;
        self.outer_surface = outer;
        Ok(self)
    }

    /// Index of the first cell containing the point.
    pub fn find_cell(&self, point: [f64; 3]) -> Option<usize> {
        self.cells.iter().position(|cell| cell.contains(point))
    }

    /// Like [`Geometry::find_cell`], but a point in no cell is an error.
    pub fn locate(&self, point: [f64; 3]) -> Result<usize> {
        self.find_cell(point)
            .ok_or(TransportError::ParticleLost { position: point })
    }

    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    /// Distance to the nearest boundary of cell `index`.
    pub fn nearest_boundary(&self, index: usize, point: [f64; 3], direction: [f64; 3]) -> f64 {
        self.cells[index].distance_to_boundary(point, direction)
    }

    /// Distance along the ray from an inside point to just past the outer
    /// boundary of the domain, `f64::INFINITY` if the ray never leaves.
    pub fn distance_to_outside(&self, point: [f64; 3], direction: [f64; 3]) -> Result<f64> {
        if let Some(outer) = &self.outer_surface {
            if outer.evaluate(point) < 0.0 {
                return Ok(outer.distance(point, direction) + SURFACE_TOLERANCE);
            }
        }
        let mut travelled = 0.0;
        let mut p = point;
        for _ in 0..MAX_CROSSINGS {
            let index = self.locate(p)?;
            if self.cells[index].is_outside() {
                return Ok(travelled);
            }
            let d = self.nearest_boundary(index, p, direction);
            if !d.is_finite() {
                return Ok(f64::INFINITY);
            }
            let step = d + SURFACE_TOLERANCE;
            travelled += step;
            for i in 0..3 {
                p[i] += step * direction[i];
            }
        }
        Err(TransportError::ParticleLost { position: p })
    }

    /// Apply the boundary condition to a particle that has just crossed into
    /// an outside cell.
    pub fn apply_boundary(&self, particle: &mut Particle) -> BoundaryOutcome {
        let outer = match (&self.boundary, &self.outer_surface) {
            (BoundaryCondition::Black, _) | (_, None) => return BoundaryOutcome::Leaked,
            (_, Some(outer)) => outer,
        };
        match self.boundary {
            BoundaryCondition::Reflective => {
                let Some(n) = outer.normal(particle.position) else {
                    return BoundaryOutcome::Leaked;
                };
                let d = particle.direction;
                let dn = dot(d, n);
                particle.direction = [d[0] - 2.0 * dn * n[0], d[1] - 2.0 * dn * n[1], d[2] - 2.0 * dn * n[2]];
                // Step back across the surface
                particle.move_by(2.0 * SURFACE_TOLERANCE);
                BoundaryOutcome::Reflected
            }
            BoundaryCondition::Periodic => {
                let Some(bb) = outer.bounding_box() else {
                    return BoundaryOutcome::Leaked;
                };
                for i in 0..3 {
                    if !bb.is_bounded(i) {
                        continue;
                    }
                    if particle.position[i] > bb.upper_right[i] {
                        particle.position[i] -= bb.width[i];
                    } else if particle.position[i] < bb.lower_left[i] {
                        particle.position[i] += bb.width[i];
                    }
                }
                debug!(position = ?particle.position, "periodic re-entry");
                BoundaryOutcome::Translated
            }
            BoundaryCondition::Black => BoundaryOutcome::Leaked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellFill;
    use crate::materials::MaterialHandle;
    use crate::region::Region;
    use approx::assert_relative_eq;

    fn sphere_in_box(boundary: BoundaryCondition) -> Geometry {
        let sphere = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0, 1));
        let cube = Arc::new(Surface::cuboid([-2.0; 3], [2.0; 3], 2));
        let cells = vec![
            Cell::new(1, Region::inside(&sphere), CellFill::Material(MaterialHandle(0))),
            Cell::new(2, Region::outside(&sphere).intersection(&Region::inside(&cube)), CellFill::Void),
            Cell::new(3, Region::outside(&cube), CellFill::Outside),
        ];
        Geometry::new(cells)
            .unwrap()
            .with_boundary(boundary, Some(cube))
            .unwrap()
    }

    #[test]
    fn test_find_cell() {
        let geometry = sphere_in_box(BoundaryCondition::Black);
        assert_eq!(geometry.find_cell([0.0, 0.0, 0.0]), Some(0));
        assert_eq!(geometry.find_cell([1.5, 0.0, 0.0]), Some(1));
        assert_eq!(geometry.find_cell([5.0, 0.0, 0.0]), Some(2));
    }

    #[test]
    fn test_lost_particle() {
        let sphere = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0, 1));
        let geometry = Geometry::new(vec![Cell::new(1, Region::inside(&sphere), CellFill::Void)]).unwrap();
        assert!(matches!(
            geometry.locate([3.0, 0.0, 0.0]),
            Err(TransportError::ParticleLost { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids() {
        let s1 = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0, 1));
        let s2 = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 2.0, 1));
        let result = Geometry::new(vec![
            Cell::new(1, Region::inside(&s1), CellFill::Void),
            Cell::new(1, Region::outside(&s1), CellFill::Outside),
        ]);
        assert!(matches!(result, Err(TransportError::DuplicateId { kind: "cell", id: 1 })));
        let result = Geometry::new(vec![
            Cell::new(1, Region::inside(&s1), CellFill::Void),
            Cell::new(2, Region::outside(&s2), CellFill::Outside),
        ]);
        assert!(matches!(result, Err(TransportError::DuplicateId { kind: "surface", id: 1 })));
    }

    #[test]
    fn test_distance_to_outside() {
        let geometry = sphere_in_box(BoundaryCondition::Black);
        let d = geometry.distance_to_outside([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(d, 2.0, epsilon = 1e-6);
        // Without an outer surface the ray is walked cell by cell
        let mut walked = geometry.clone();
        walked.outer_surface = None;
        let d = walked.distance_to_outside([0.0, 0.0, 0.0], [0.0, -1.0, 0.0]).unwrap();
        assert_relative_eq!(d, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_reflective_boundary() {
        let geometry = sphere_in_box(BoundaryCondition::Reflective);
        let mut p = Particle::new([2.0 + SURFACE_TOLERANCE, 0.5, 0.0], [0.6, 0.8, 0.0], 1.0);
        assert_eq!(geometry.apply_boundary(&mut p), BoundaryOutcome::Reflected);
        assert_relative_eq!(p.direction[0], -0.6, epsilon = 1e-6);
        assert_relative_eq!(p.direction[1], 0.8, epsilon = 1e-6);
        assert_eq!(geometry.find_cell(p.position), Some(1));
    }

    #[test]
    fn test_periodic_boundary() {
        let geometry = sphere_in_box(BoundaryCondition::Periodic);
        let mut p = Particle::new([0.5, 2.0 + SURFACE_TOLERANCE, 0.0], [0.0, 1.0, 0.0], 1.0);
        assert_eq!(geometry.apply_boundary(&mut p), BoundaryOutcome::Translated);
        assert_relative_eq!(p.position[1], -2.0 + SURFACE_TOLERANCE, epsilon = 1e-12);
        assert_eq!(p.direction, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_black_boundary_leaks() {
        let geometry = sphere_in_box(BoundaryCondition::Black);
        let mut p = Particle::new([3.0, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0);
        assert_eq!(geometry.apply_boundary(&mut p), BoundaryOutcome::Leaked);
    }

    #[test]
    fn test_periodic_needs_a_box() {
        let sphere = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0, 1));
        let geometry = Geometry::new(vec![Cell::new(1, Region::inside(&sphere), CellFill::Void)]).unwrap();
        assert!(geometry
            .clone()
            .with_boundary(BoundaryCondition::Periodic, Some(sphere))
            .is_err());
        assert!(geometry.with_boundary(BoundaryCondition::Reflective, None).is_err());
    }
}
