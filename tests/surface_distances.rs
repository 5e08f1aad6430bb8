// Integration tests for the geometry distance oracle through the public API

use approx::assert_relative_eq;
use std::sync::Arc;
use transport_for_mc::cell::{Cell, CellFill};
use transport_for_mc::geometry::Geometry;
use transport_for_mc::region::Region;
use transport_for_mc::surface::{Surface, SurfaceType};
use transport_for_mc::transform::Transform;
use transport_for_mc::{MaterialHandle, TransportError};

fn march_to_surface(surface: &Surface, point: [f64; 3], direction: [f64; 3]) -> [f64; 3] {
    let d = surface.distance(point, direction);
    assert!(d.is_finite() && d > 0.0);
    [
        point[0] + d * direction[0],
        point[1] + d * direction[1],
        point[2] + d * direction[2],
    ]
}

#[test]
fn test_keywords_build_the_same_surfaces() {
    let by_type = Surface::new(1, SurfaceType::Sphere, &[0.0, 0.0, 0.0, 2.0]).unwrap();
    let by_keyword = Surface::from_keyword(1, "SPH", &[0.0, 0.0, 0.0, 2.0]).unwrap();
    let origin = [0.0; 3];
    let up = [0.0, 0.0, 1.0];
    assert_eq!(by_type.distance(origin, up), by_keyword.distance(origin, up));
    assert!(matches!(
        Surface::from_keyword(2, "torus", &[1.0]),
        Err(TransportError::UnknownSurfaceType(_))
    ));
    assert!(matches!(
        Surface::from_keyword(3, "sph", &[1.0, 2.0]),
        Err(TransportError::ParameterCount { found: 2, .. })
    ));
}

#[test]
fn test_hit_points_lie_on_the_surface() {
    let surfaces = [
        Surface::from_keyword(1, "sph", &[0.5, -0.2, 0.1, 3.0]).unwrap(),
        Surface::from_keyword(2, "cylz", &[0.0, 0.0, 2.0]).unwrap(),
        Surface::from_keyword(3, "cuboid", &[-1.0, 2.0, -3.0, 1.0, -2.0, 2.5]).unwrap(),
        Surface::from_keyword(4, "hexyc", &[0.0, 0.0, 1.5]).unwrap(),
        Surface::from_keyword(5, "octa", &[0.0, 0.0, 2.0, 2.5]).unwrap(),
        Surface::from_keyword(6, "cone", &[0.0, 0.0, 0.0, 2.0, 4.0]).unwrap(),
    ];
    let start = [0.05, 0.1, 0.2];
    let n = 3f64.sqrt();
    let directions = [
        [1.0, 0.0, 0.0],
        [0.0, -1.0, 0.0],
        [1.0 / n, 1.0 / n, 1.0 / n],
        [-0.6, 0.0, 0.8],
    ];
    for surface in &surfaces {
        assert!(surface.evaluate(start) < 0.0, "start must be inside {}", surface.surface_id);
        for direction in directions {
            let d = surface.distance(start, direction);
            if !d.is_finite() {
                continue;
            }
            let hit = march_to_surface(surface, start, direction);
            let before = [
                hit[0] - 1e-6 * direction[0],
                hit[1] - 1e-6 * direction[1],
                hit[2] - 1e-6 * direction[2],
            ];
            let after = [
                hit[0] + 1e-6 * direction[0],
                hit[1] + 1e-6 * direction[1],
                hit[2] + 1e-6 * direction[2],
            ];
            assert!(surface.evaluate(before) < 0.0, "surface {}", surface.surface_id);
            assert!(surface.evaluate(after) >= 0.0, "surface {}", surface.surface_id);
        }
    }
}

#[test]
fn test_transformed_cylinder() {
    // Cylinder along z moved to x = 5 and tipped onto the x axis
    let cylinder = Surface::from_keyword(1, "cylz", &[0.0, 0.0, 1.0])
        .unwrap()
        .with_transform(Transform::translation(5.0, 0.0, 0.0));
    assert_relative_eq!(cylinder.distance([0.0; 3], [1.0, 0.0, 0.0]), 4.0, epsilon = 1e-12);
    assert!(cylinder.evaluate([5.0, 0.0, 100.0]) < 0.0);

    let lying = Surface::from_keyword(2, "cylz", &[0.0, 0.0, 1.0])
        .unwrap()
        .with_transform(Transform::default().with_axis_rotation(1, 90.0));
    // Axis now along x: moving in z from the axis hits the wall at 1
    assert_relative_eq!(lying.distance([3.0, 0.0, 0.0], [0.0, 0.0, 1.0]), 1.0, epsilon = 1e-9);
    assert!(lying.distance([3.0, 0.0, 0.0], [1.0, 0.0, 0.0]).is_infinite());
}

#[test]
fn test_no_hit_and_nan_give_infinity() {
    let plane = Surface::from_keyword(1, "px", &[1.0]).unwrap();
    assert!(plane.distance([0.0; 3], [-1.0, 0.0, 0.0]).is_infinite());
    assert!(plane.distance([0.0; 3], [0.0, 1.0, 0.0]).is_infinite());
    assert!(plane.distance([f64::NAN, 0.0, 0.0], [1.0, 0.0, 0.0]).is_infinite());
    let inf = Surface::from_keyword(2, "inf", &[]).unwrap();
    assert!(inf.distance([0.0; 3], [1.0, 0.0, 0.0]).is_infinite());
    assert!(inf.evaluate([1e30, 0.0, 0.0]) < 0.0);
}

#[test]
fn test_nested_cells_nearest_boundary() {
    let inner = Arc::new(Surface::sphere(0.0, 0.0, 0.0, 1.0, 1));
    let outer = Arc::new(Surface::cuboid([-4.0; 3], [4.0; 3], 2));
    let geometry = Geometry::new(vec![
        Cell::new(1, Region::inside(&inner), CellFill::Material(MaterialHandle(0))),
        Cell::new(
            2,
            Region::outside(&inner).intersection(&Region::inside(&outer)),
            CellFill::Void,
        ),
        Cell::new(3, Region::outside(&outer), CellFill::Outside),
    ])
    .unwrap();
    let p = [0.0, 0.0, 0.0];
    let u = [1.0, 0.0, 0.0];
    let c = geometry.locate(p).unwrap();
    assert_relative_eq!(geometry.nearest_boundary(c, p, u), 1.0, epsilon = 1e-12);
    let q = [2.0, 0.0, 0.0];
    let c = geometry.locate(q).unwrap();
    assert_eq!(geometry.cell(c).cell_id, 2);
    assert_relative_eq!(geometry.nearest_boundary(c, q, u), 2.0, epsilon = 1e-12);
    assert_relative_eq!(geometry.distance_to_outside(p, u).unwrap(), 4.0, epsilon = 1e-6);
}
