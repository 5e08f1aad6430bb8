use crate::materials::MaterialHandle;
use crate::region::Region;
use crate::surface::Surface;
use std::sync::Arc;

/// What occupies a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFill {
    Material(MaterialHandle),
    Void,
    /// Outside the problem domain; entering it triggers the boundary condition.
    Outside,
}

/// A Cell is a region of space filled with a material, vacuum, or nothing at all
#[derive(Clone, Debug)]
pub struct Cell {
    pub cell_id: usize,
    pub name: Option<String>,
    pub region: Region,
    pub fill: CellFill,
}

impl Cell {
    pub fn new(cell_id: usize, region: Region, fill: CellFill) -> Self {
        Cell {
            cell_id,
            name: None,
            region,
            fill,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        self.region.contains(point)
    }

    pub fn material(&self) -> Option<MaterialHandle> {
        match self.fill {
            CellFill::Material(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_outside(&self) -> bool {
        self.fill == CellFill::Outside
    }

    /// Closest surface of this cell along a ray, and its distance.
    ///
    /// Every surface of the region is a candidate. Crossing an inner surface of
    /// a union may leave the particle in the same cell, which the caller
    /// resolves by locating it again.
    pub fn closest_surface(&self, point: [f64; 3], direction: [f64; 3]) -> Option<(Arc<Surface>, f64)> {
        let mut closest: Option<(Arc<Surface>, f64)> = None;
        for (surface, _sense) in self.region.surfaces_with_sense() {
            let dist = surface.distance(point, direction);
            if dist.is_finite() && closest.as_ref().map_or(true, |(_, d)| dist < *d) {
                closest = Some((surface, dist));
            }
        }
        closest
    }

    /// Distance to the nearest boundary of the cell, `f64::INFINITY` if none lies ahead.
    pub fn distance_to_boundary(&self, point: [f64; 3], direction: [f64; 3]) -> f64 {
        self.region
            .surfaces_with_sense()
            .iter()
            .map(|(surface, _)| surface.distance(point, direction))
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn shell() -> Cell {
        let inner = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0, 1));
        let outer = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 3.0, 2));
        let region = Region::outside(&inner).intersection(&Region::inside(&outer));
        Cell::new(7, region, CellFill::Material(MaterialHandle(0))).with_name("shell")
    }

    #[test]
    fn test_cell_contains_and_fill() {
        let cell = shell();
        assert!(cell.contains([2.0, 0.0, 0.0]));
        assert!(!cell.contains([0.0, 0.0, 0.0]));
        assert_eq!(cell.material(), Some(MaterialHandle(0)));
        assert!(!cell.is_outside());
        assert_eq!(cell.name.as_deref(), Some("shell"));
    }

    #[test]
    fn test_closest_surface() {
        let cell = shell();
        // Moving inwards from r = 2 hits the inner sphere first
        let (surface, dist) = cell.closest_surface([2.0, 0.0, 0.0], [-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(surface.surface_id, 1);
        assert_relative_eq!(dist, 1.0);
        let (surface, dist) = cell.closest_surface([2.0, 0.0, 0.0], [1.0, 0.0, 0.0]).unwrap();
        assert_eq!(surface.surface_id, 2);
        assert_relative_eq!(dist, 1.0);
    }

    #[test]
    fn test_distance_to_boundary() {
        let cell = shell();
        assert_relative_eq!(cell.distance_to_boundary([0.0, 2.0, 0.0], [0.0, 1.0, 0.0]), 1.0);
        let void = Cell::new(1, Region::inside(&Arc::new(Surface::x_plane(0.0, 3))), CellFill::Void);
        assert!(void.distance_to_boundary([-1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]).is_infinite());
        assert_eq!(void.material(), None);
    }
}
