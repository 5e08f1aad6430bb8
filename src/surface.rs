use crate::bounding_box::BoundingBox;
use crate::error::{Result, TransportError};
use crate::transform::Transform;
use crate::utilities::{dot, normalize};
use nalgebra::Vector3;
use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const SQRT3: f64 = 1.732_050_807_568_877_2;
const COS30: f64 = 0.5 * SQRT3;
const INF: f64 = f64::INFINITY;

/// Tolerance for three-point plane coefficients.
const PLANE_CHECK_TOLERANCE: f64 = 1e-4;

/// Callback for primitives defined outside the crate.
///
/// Implementations follow the same contract as built-in surfaces: the
/// distance is the nearest strictly positive forward intersection or
/// `f64::INFINITY`, and `evaluate` is negative inside.
pub trait UserSurface: Send + Sync + fmt::Debug {
    fn distance(&self, params: &[f64], point: [f64; 3], direction: [f64; 3]) -> f64;
    fn evaluate(&self, params: &[f64], point: [f64; 3]) -> f64;
}

/// Surface keyword as it appears in a geometry description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    Infinite,
    PlaneX,
    PlaneY,
    PlaneZ,
    Plane,
    Quadratic,
    Sphere,
    Cylinder,
    CylinderZ,
    CylinderX,
    CylinderY,
    Cone,
    Cube,
    Cuboid,
    Rectangle,
    Square,
    HexagonY,
    HexagonX,
    HexPrismY,
    HexPrismX,
    Cross,
    GeneralCross,
    Dodecagon,
    Octagon,
    Pad,
    Parallelepiped,
    User,
}

impl SurfaceType {
    pub fn keyword(&self) -> &'static str {
        match self {
            SurfaceType::Infinite => "inf",
            SurfaceType::PlaneX => "px",
            SurfaceType::PlaneY => "py",
            SurfaceType::PlaneZ => "pz",
            SurfaceType::Plane => "plane",
            SurfaceType::Quadratic => "quadratic",
            SurfaceType::Sphere => "sph",
            SurfaceType::Cylinder => "cyl",
            SurfaceType::CylinderZ => "cylz",
            SurfaceType::CylinderX => "cylx",
            SurfaceType::CylinderY => "cyly",
            SurfaceType::Cone => "cone",
            SurfaceType::Cube => "cube",
            SurfaceType::Cuboid => "cuboid",
            SurfaceType::Rectangle => "rect",
            SurfaceType::Square => "sqc",
            SurfaceType::HexagonY => "hexyc",
            SurfaceType::HexagonX => "hexxc",
            SurfaceType::HexPrismY => "hexyprism",
            SurfaceType::HexPrismX => "hexxprism",
            SurfaceType::Cross => "cross",
            SurfaceType::GeneralCross => "gcross",
            SurfaceType::Dodecagon => "dode",
            SurfaceType::Octagon => "octa",
            SurfaceType::Pad => "pad",
            SurfaceType::Parallelepiped => "ppd",
            SurfaceType::User => "usr",
        }
    }

    /// Accepted parameter counts, as shown in error messages.
    fn expected_params(&self) -> &'static str {
        match self {
            SurfaceType::Infinite | SurfaceType::User => "any number of",
            SurfaceType::PlaneX | SurfaceType::PlaneY | SurfaceType::PlaneZ => "1",
            SurfaceType::Plane => "1-4 or 9",
            SurfaceType::Quadratic => "1-10",
            SurfaceType::Sphere | SurfaceType::Cube | SurfaceType::Rectangle => "4",
            SurfaceType::Cylinder
            | SurfaceType::CylinderZ
            | SurfaceType::CylinderX
            | SurfaceType::CylinderY => "3 or 5",
            SurfaceType::Cone | SurfaceType::HexPrismY | SurfaceType::HexPrismX => "5",
            SurfaceType::Cuboid | SurfaceType::Pad => "6",
            SurfaceType::Square
            | SurfaceType::HexagonY
            | SurfaceType::HexagonX
            | SurfaceType::Dodecagon
            | SurfaceType::Octagon => "3 or 4",
            SurfaceType::Cross => "4 or 5",
            SurfaceType::GeneralCross => "at least 3",
            SurfaceType::Parallelepiped => "9",
        }
    }

    fn accepts(&self, n: usize) -> bool {
        match self {
            SurfaceType::Infinite | SurfaceType::User => true,
            SurfaceType::PlaneX | SurfaceType::PlaneY | SurfaceType::PlaneZ => n == 1,
            SurfaceType::Plane => (1..=4).contains(&n) || n == 9,
            SurfaceType::Quadratic => (1..=10).contains(&n),
            SurfaceType::Sphere | SurfaceType::Cube | SurfaceType::Rectangle => n == 4,
            SurfaceType::Cylinder
            | SurfaceType::CylinderZ
            | SurfaceType::CylinderX
            | SurfaceType::CylinderY => n == 3 || n == 5,
            SurfaceType::Cone | SurfaceType::HexPrismY | SurfaceType::HexPrismX => n == 5,
            SurfaceType::Cuboid | SurfaceType::Pad => n == 6,
            SurfaceType::Square
            | SurfaceType::HexagonY
            | SurfaceType::HexagonX
            | SurfaceType::Dodecagon
            | SurfaceType::Octagon => n == 3 || n == 4,
            SurfaceType::Cross => n == 4 || n == 5,
            SurfaceType::GeneralCross => n >= 3,
            SurfaceType::Parallelepiped => n == 9,
        }
    }
}

impl FromStr for SurfaceType {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_lowercase().as_str() {
            "inf" => SurfaceType::Infinite,
            "px" => SurfaceType::PlaneX,
            "py" => SurfaceType::PlaneY,
            "pz" => SurfaceType::PlaneZ,
            "plane" => SurfaceType::Plane,
            "quadratic" => SurfaceType::Quadratic,
            "sph" => SurfaceType::Sphere,
            "cyl" => SurfaceType::Cylinder,
            "cylz" => SurfaceType::CylinderZ,
            "cylx" => SurfaceType::CylinderX,
            "cyly" => SurfaceType::CylinderY,
            "cone" => SurfaceType::Cone,
            "cube" => SurfaceType::Cube,
            "cuboid" => SurfaceType::Cuboid,
            "rect" => SurfaceType::Rectangle,
            "sqc" => SurfaceType::Square,
            "hexyc" => SurfaceType::HexagonY,
            "hexxc" => SurfaceType::HexagonX,
            "hexyprism" => SurfaceType::HexPrismY,
            "hexxprism" => SurfaceType::HexPrismX,
            "cross" => SurfaceType::Cross,
            "gcross" => SurfaceType::GeneralCross,
            "dode" => SurfaceType::Dodecagon,
            "octa" => SurfaceType::Octagon,
            "pad" => SurfaceType::Pad,
            "ppd" => SurfaceType::Parallelepiped,
            "usr" => SurfaceType::User,
            _ => return Err(TransportError::UnknownSurfaceType(s.to_string())),
        };
        Ok(kind)
    }
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Coordinate axis of an axis-aligned primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Transverse coordinates and the axial coordinate of `v`.
    #[inline]
    fn split(&self, v: [f64; 3]) -> ([f64; 2], f64) {
        match self {
            Axis::X => ([v[1], v[2]], v[0]),
            Axis::Y => ([v[0], v[2]], v[1]),
            Axis::Z => ([v[0], v[1]], v[2]),
        }
    }

    /// Inverse of `split`.
    fn join(&self, transverse: [f64; 2], axial: f64) -> [f64; 3] {
        match self {
            Axis::X => [axial, transverse[0], transverse[1]],
            Axis::Y => [transverse[0], axial, transverse[1]],
            Axis::Z => [transverse[0], transverse[1], axial],
        }
    }
}

/// Which pair of hexagon sides is perpendicular to a coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexOrientation {
    /// Flat sides at `y = ±r` (`hexyc`, `hexyprism`).
    FlatY,
    /// Flat sides at `x = ±r` (`hexxc`, `hexxprism`).
    FlatX,
}

#[derive(Clone, Debug)]
pub enum SurfaceKind {
    /// Everything is inside.
    Infinite,
    AxisPlane {
        axis: Axis,
        offset: f64,
    },
    /// `a x + b y + c z - d = 0`
    Plane {
        a: f64,
        b: f64,
        c: f64,
        d: f64,
    },
    /// `A x² + B y² + C z² + D xy + E yz + F xz + G x + H y + J z + K = 0`
    Quadratic {
        coefficients: [f64; 10],
    },
    Sphere {
        x0: f64,
        y0: f64,
        z0: f64,
        radius: f64,
    },
    Cylinder {
        axis: Axis,
        center: [f64; 2],
        radius: f64,
        /// Optional axial truncation planes.
        cut: Option<[f64; 2]>,
    },
    /// Base of `radius` at `z0`, apex at `z0 + height`.
    Cone {
        x0: f64,
        y0: f64,
        z0: f64,
        radius: f64,
        height: f64,
    },
    Cube {
        center: [f64; 3],
        half_width: f64,
    },
    Cuboid {
        lower: [f64; 3],
        upper: [f64; 3],
    },
    /// Infinite in z.
    Rectangle {
        lower: [f64; 2],
        upper: [f64; 2],
    },
    Square {
        center: [f64; 2],
        half_width: f64,
        corner_radius: Option<f64>,
    },
    Hexagon {
        orientation: HexOrientation,
        center: [f64; 2],
        /// Distance from the center to a flat side.
        half_width: f64,
        corner_radius: Option<f64>,
        /// z range of a finite prism.
        axial: Option<[f64; 2]>,
    },
    Cross {
        center: [f64; 2],
        half_length: f64,
        half_width: f64,
        /// Arm ends are rounded with the arm half-width.
        rounded: bool,
    },
    /// Union of rectangles `|x| <= w[i]`, `|y| <= w[n - 1 - i]`.
    GeneralCross {
        center: [f64; 2],
        half_widths: Vec<f64>,
    },
    Dodecagon {
        center: [f64; 2],
        half_width_x: f64,
        half_width_y: f64,
    },
    Octagon {
        center: [f64; 2],
        half_width: f64,
        /// Distance from the center to the diagonal sides.
        diagonal_half_width: f64,
    },
    /// Annular sector; angles in radians, measured clockwise from +x.
    Pad {
        center: [f64; 2],
        inner_radius: f64,
        outer_radius: f64,
        theta1: f64,
        theta2: f64,
    },
    /// Three pairs of parallel planes `extents[i][0] <= n_i . (p - origin) <= extents[i][1]`.
    Parallelepiped {
        origin: [f64; 3],
        normals: [[f64; 3]; 3],
        extents: [[f64; 2]; 3],
    },
    User {
        callback: Arc<dyn UserSurface>,
        params: Vec<f64>,
    },
}

#[derive(Clone, Debug)]
pub struct Surface {
    pub surface_id: usize,
    pub kind: SurfaceKind,
    pub transform: Option<Transform>,
}

impl Surface {
    /// Build a surface from its type and ordered parameter list.
    ///
    /// Fails on a parameter count the type does not accept or on parameters
    /// that describe no valid shape (collinear plane points, zero cone height).
    pub fn new(surface_id: usize, surface_type: SurfaceType, params: &[f64]) -> Result<Self> {
        if !surface_type.accepts(params.len()) {
            return Err(TransportError::ParameterCount {
                kind: surface_type.keyword(),
                expected: surface_type.expected_params(),
                found: params.len(),
            });
        }
        let invalid = |reason: &str| TransportError::InvalidSurface {
            surface_id,
            reason: reason.to_string(),
        };
        let p = params;
        let optional = |i: usize| p.get(i).copied();

        let kind = match surface_type {
            SurfaceType::Infinite => SurfaceKind::Infinite,
            SurfaceType::PlaneX => SurfaceKind::AxisPlane {
                axis: Axis::X,
                offset: p[0],
            },
            SurfaceType::PlaneY => SurfaceKind::AxisPlane {
                axis: Axis::Y,
                offset: p[0],
            },
            SurfaceType::PlaneZ => SurfaceKind::AxisPlane {
                axis: Axis::Z,
                offset: p[0],
            },
            SurfaceType::Plane if p.len() == 9 => {
                let [a, b, c, d] = plane_through_points(
                    [p[0], p[1], p[2]],
                    [p[3], p[4], p[5]],
                    [p[6], p[7], p[8]],
                )
                .ok_or_else(|| invalid("plane points are collinear or inconsistent"))?;
                SurfaceKind::Plane { a, b, c, d }
            }
            SurfaceType::Plane => SurfaceKind::Plane {
                a: p[0],
                b: optional(1).unwrap_or(0.0),
                c: optional(2).unwrap_or(0.0),
                d: optional(3).unwrap_or(0.0),
            },
            SurfaceType::Quadratic => {
                let mut coefficients = [0.0; 10];
                coefficients[..p.len()].copy_from_slice(p);
                SurfaceKind::Quadratic { coefficients }
            }
            SurfaceType::Sphere => SurfaceKind::Sphere {
                x0: p[0],
                y0: p[1],
                z0: p[2],
                radius: p[3],
            },
            SurfaceType::Cylinder | SurfaceType::CylinderZ => {
                cylinder(Axis::Z, p)
            }
            SurfaceType::CylinderX => cylinder(Axis::X, p),
            SurfaceType::CylinderY => cylinder(Axis::Y, p),
            SurfaceType::Cone => {
                if p[4] == 0.0 {
                    return Err(invalid("cone height is zero"));
                }
                SurfaceKind::Cone {
                    x0: p[0],
                    y0: p[1],
                    z0: p[2],
                    radius: p[3],
                    height: p[4],
                }
            }
            SurfaceType::Cube => SurfaceKind::Cube {
                center: [p[0], p[1], p[2]],
                half_width: p[3],
            },
            SurfaceType::Cuboid => SurfaceKind::Cuboid {
                lower: [p[0].min(p[1]), p[2].min(p[3]), p[4].min(p[5])],
                upper: [p[0].max(p[1]), p[2].max(p[3]), p[4].max(p[5])],
            },
            SurfaceType::Rectangle => SurfaceKind::Rectangle {
                lower: [p[0].min(p[1]), p[2].min(p[3])],
                upper: [p[0].max(p[1]), p[2].max(p[3])],
            },
            SurfaceType::Square => {
                let corner_radius = optional(3);
                check_corner(corner_radius, p[2]).map_err(|r| invalid(&r))?;
                SurfaceKind::Square {
                    center: [p[0], p[1]],
                    half_width: p[2],
                    corner_radius,
                }
            }
            SurfaceType::HexagonY | SurfaceType::HexagonX => {
                let corner_radius = optional(3);
                check_corner(corner_radius, p[2]).map_err(|r| invalid(&r))?;
                SurfaceKind::Hexagon {
                    orientation: if surface_type == SurfaceType::HexagonY {
                        HexOrientation::FlatY
                    } else {
                        HexOrientation::FlatX
                    },
                    center: [p[0], p[1]],
                    half_width: p[2],
                    corner_radius,
                    axial: None,
                }
            }
            SurfaceType::HexPrismY | SurfaceType::HexPrismX => SurfaceKind::Hexagon {
                orientation: if surface_type == SurfaceType::HexPrismY {
                    HexOrientation::FlatY
                } else {
                    HexOrientation::FlatX
                },
                center: [p[0], p[1]],
                half_width: p[2],
                corner_radius: None,
                axial: Some([p[3].min(p[4]), p[3].max(p[4])]),
            },
            SurfaceType::Cross => {
                if p[3] > p[2] {
                    return Err(invalid("cross arm is wider than it is long"));
                }
                SurfaceKind::Cross {
                    center: [p[0], p[1]],
                    half_length: p[2],
                    half_width: p[3],
                    rounded: p.len() == 5,
                }
            }
            SurfaceType::GeneralCross => SurfaceKind::GeneralCross {
                center: [p[0], p[1]],
                half_widths: p[2..].to_vec(),
            },
            SurfaceType::Dodecagon => SurfaceKind::Dodecagon {
                center: [p[0], p[1]],
                half_width_x: p[2],
                half_width_y: optional(3).unwrap_or(p[2]),
            },
            SurfaceType::Octagon => SurfaceKind::Octagon {
                center: [p[0], p[1]],
                half_width: p[2],
                diagonal_half_width: optional(3).unwrap_or(p[2]),
            },
            SurfaceType::Pad => SurfaceKind::Pad {
                center: [p[0], p[1]],
                inner_radius: p[2],
                outer_radius: p[3],
                theta1: p[4].to_radians(),
                theta2: p[5].to_radians(),
            },
            SurfaceType::Parallelepiped => parallelepiped(p).ok_or_else(|| {
                invalid("parallelepiped edges are degenerate or its angles are singular")
            })?,
            SurfaceType::User => {
                return Err(invalid(
                    "user surfaces need a callback, build them with Surface::user",
                ))
            }
        };

        Ok(Surface {
            surface_id,
            kind,
            transform: None,
        })
    }

    /// Parse the type keyword and build the surface.
    pub fn from_keyword(surface_id: usize, keyword: &str, params: &[f64]) -> Result<Self> {
        Surface::new(surface_id, keyword.parse()?, params)
    }

    /// Surface delegated to an external primitive.
    pub fn user(surface_id: usize, callback: Arc<dyn UserSurface>, params: Vec<f64>) -> Self {
        Surface {
            surface_id,
            kind: SurfaceKind::User { callback, params },
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn x_plane(x0: f64, surface_id: usize) -> Self {
        Self::axis_plane(Axis::X, x0, surface_id)
    }

    pub fn y_plane(y0: f64, surface_id: usize) -> Self {
        Self::axis_plane(Axis::Y, y0, surface_id)
    }

    pub fn z_plane(z0: f64, surface_id: usize) -> Self {
        Self::axis_plane(Axis::Z, z0, surface_id)
    }

    fn axis_plane(axis: Axis, offset: f64, surface_id: usize) -> Self {
        Surface {
            surface_id,
            kind: SurfaceKind::AxisPlane { axis, offset },
            transform: None,
        }
    }

    pub fn sphere(x0: f64, y0: f64, z0: f64, radius: f64, surface_id: usize) -> Self {
        Surface {
            surface_id,
            kind: SurfaceKind::Sphere {
                x0,
                y0,
                z0,
                radius,
            },
            transform: None,
        }
    }

    /// Create an infinite cylinder along the Z axis, centered at (x0, y0)
    pub fn z_cylinder(x0: f64, y0: f64, radius: f64, surface_id: usize) -> Self {
        Surface {
            surface_id,
            kind: SurfaceKind::Cylinder {
                axis: Axis::Z,
                center: [x0, y0],
                radius,
                cut: None,
            },
            transform: None,
        }
    }

    pub fn cuboid(lower: [f64; 3], upper: [f64; 3], surface_id: usize) -> Self {
        Surface {
            surface_id,
            kind: SurfaceKind::Cuboid { lower, upper },
            transform: None,
        }
    }

    #[inline]
    fn to_local(&self, point: [f64; 3], direction: [f64; 3]) -> ([f64; 3], [f64; 3]) {
        match &self.transform {
            Some(t) => (t.apply_point(point), t.apply_direction(direction)),
            None => (point, direction),
        }
    }

    /// Distance along unit `direction` from `point` to the nearest forward
    /// intersection with this surface. Always strictly positive; returns
    /// `f64::INFINITY` when nothing lies ahead.
    pub fn distance(&self, point: [f64; 3], direction: [f64; 3]) -> f64 {
        let (p, d) = self.to_local(point, direction);
        let dist = self.kind.distance(p, d);
        if dist > 0.0 {
            dist
        } else {
            INF
        }
    }

    /// Continuous signed value, negative inside and positive outside.
    pub fn evaluate(&self, point: [f64; 3]) -> f64 {
        let (p, _) = self.to_local(point, [0.0; 3]);
        self.kind.evaluate(p)
    }

    /// Outward unit normal at (or near) `point`, from the gradient of
    /// [`Surface::evaluate`].
    pub fn normal(&self, point: [f64; 3]) -> Option<[f64; 3]> {
        let scale = point.iter().fold(1.0_f64, |m, x| m.max(x.abs()));
        let h = 1e-7 * scale;
        let mut gradient = [0.0; 3];
        for i in 0..3 {
            let mut forward = point;
            let mut backward = point;
            forward[i] += h;
            backward[i] -= h;
            gradient[i] = (self.evaluate(forward) - self.evaluate(backward)) / (2.0 * h);
        }
        normalize(gradient)
    }

    /// Box enclosing the inside of the surface, or `None` when the inside is
    /// unbounded in every direction or the surface is rotated.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let local = self.kind.bounding_box()?;
        match &self.transform {
            None => Some(local),
            Some(t) if t.rotation.is_identity(0.0) => {
                let shift = [t.translation.x, t.translation.y, t.translation.z];
                let mut lower = local.lower_left;
                let mut upper = local.upper_right;
                for i in 0..3 {
                    lower[i] += shift[i];
                    upper[i] += shift[i];
                }
                Some(BoundingBox::new(lower, upper))
            }
            Some(_) => None,
        }
    }

    /// Constraint imposed by an axis-aligned plane on one coordinate:
    /// `(axis, is_upper_bound, value)` for the given side.
    pub fn axis_constraint(&self, halfspace_above: bool) -> Option<(usize, bool, f64)> {
        if self.transform.is_some() {
            return None;
        }
        match &self.kind {
            SurfaceKind::AxisPlane { axis, offset } => {
                Some((axis.index(), !halfspace_above, *offset))
            }
            _ => None,
        }
    }
}

fn cylinder(axis: Axis, p: &[f64]) -> SurfaceKind {
    SurfaceKind::Cylinder {
        axis,
        center: [p[0], p[1]],
        radius: p[2],
        cut: if p.len() == 5 {
            Some([p[3].min(p[4]), p[3].max(p[4])])
        } else {
            None
        },
    }
}

fn check_corner(corner_radius: Option<f64>, half_width: f64) -> std::result::Result<(), String> {
    match corner_radius {
        Some(r0) if r0 < 0.0 || r0 > half_width => Err(format!(
            "corner radius {} outside [0, {}]",
            r0, half_width
        )),
        _ => Ok(()),
    }
}

/// Coefficients `[a, b, c, d]` of the plane `a x + b y + c z = d` through
/// three points.
fn plane_through_points(p1: [f64; 3], p2: [f64; 3], p3: [f64; 3]) -> Option<[f64; 4]> {
    let [x1, y1, z1] = p1;
    let [x2, y2, z2] = p2;
    let [x3, y3, z3] = p3;
    let a = y2 * z3 - y3 * z2 - y1 * (z3 - z2) + z1 * (y3 - y2);
    let b = z2 * x3 - z3 * x2 - z1 * (x3 - x2) + x1 * (z3 - z2);
    let c = x2 * y3 - x3 * y2 - x1 * (y3 - y2) + y1 * (x3 - x2);
    let d = x1 * (y2 * z3 - y3 * z2) - y1 * (x2 * z3 - x3 * z2) + z1 * (x2 * y3 - x3 * y2);
    if a == 0.0 && b == 0.0 && c == 0.0 {
        return None;
    }
    let consistent = [p1, p2, p3]
        .iter()
        .all(|p| (a * p[0] + b * p[1] + c * p[2] - d).abs() <= PLANE_CHECK_TOLERANCE);
    consistent.then_some([a, b, c, d])
}

/// Parallelepiped from origin, edge lengths and angles (degrees).
fn parallelepiped(p: &[f64]) -> Option<SurfaceKind> {
    let origin = [p[0], p[1], p[2]];
    let (la, lb, lc) = (p[3], p[4], p[5]);
    let (th, ps, ph) = (p[6].to_radians(), p[7].to_radians(), p[8].to_radians());

    let a = [la, 0.0, 0.0];
    let b = [lb * ps.sin(), lb * ps.cos(), 0.0];
    let c = [
        lc * (th.sin() * ph.sin() / ps.cos()) * ps.sin() + lc * th.sin() * ph.cos(),
        lc * th.sin() * ph.sin(),
        lc * th.cos(),
    ];
    let edges = [a, b, c];
    let (va, vb, vc) = (Vector3::from(a), Vector3::from(b), Vector3::from(c));
    let normals: [[f64; 3]; 3] = [vb.cross(&vc).into(), vc.cross(&va).into(), va.cross(&vb).into()];

    let mut extents = [[0.0; 2]; 3];
    for i in 0..3 {
        let n = normals[i];
        if !n.iter().all(|v| v.is_finite()) || dot(n, n) == 0.0 {
            return None;
        }
        let far = dot(n, edges[i]);
        if far == 0.0 || !far.is_finite() {
            return None;
        }
        extents[i] = [far.min(0.0), far.max(0.0)];
    }
    Some(SurfaceKind::Parallelepiped {
        origin,
        normals,
        extents,
    })
}

#[inline]
fn keep_min(min: &mut f64, d: f64) {
    if d > 0.0 && d < *min {
        *min = d;
    }
}

/// Both lines `value = ±offset` moving at `rate` per unit length.
#[inline]
fn plane_pair(min: &mut f64, value: f64, rate: f64, offset: f64) {
    if rate != 0.0 {
        keep_min(min, (offset - value) / rate);
        keep_min(min, (-offset - value) / rate);
    }
}

/// Lines `value = lo` and `value = hi`.
#[inline]
fn slab(min: &mut f64, value: f64, rate: f64, lo: f64, hi: f64) {
    if rate != 0.0 {
        keep_min(min, (lo - value) / rate);
        keep_min(min, (hi - value) / rate);
    }
}

/// Distance to an infinite cylinder of `radius` around the transverse
/// origin. `None` when the ray runs parallel to the axis.
///
/// Inside the cylinder only the forward root is meaningful; outside, the near
/// root is taken and a negative near root means the ray points away.
fn circle_distance(t: [f64; 2], dir: [f64; 2], radius: f64) -> Option<f64> {
    let a = dir[0] * dir[0] + dir[1] * dir[1];
    if a == 0.0 {
        return None;
    }
    let b = dir[0] * t[0] + dir[1] * t[1];
    let c = t[0] * t[0] + t[1] * t[1] - radius * radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return Some(INF);
    }
    if c < 0.0 {
        return Some((-b + disc.sqrt()) / a);
    }
    let d = -(b + disc.sqrt()) / a;
    Some(if d < 0.0 { INF } else { d })
}

/// Rounded corner: a synthetic cylinder of `radius` centred at `corner`.
#[inline]
fn corner(min: &mut f64, t: [f64; 2], dir: [f64; 2], corner: [f64; 2], radius: f64) {
    if let Some(d) = circle_distance([t[0] - corner[0], t[1] - corner[1]], dir, radius) {
        keep_min(min, d);
    }
}

/// Smaller positive of two roots, +inf if neither is positive.
fn smallest_positive(d0: f64, d1: f64) -> f64 {
    match (d0 > 0.0, d1 > 0.0) {
        (true, true) => d0.min(d1),
        (true, false) => d0,
        (false, true) => d1,
        (false, false) => INF,
    }
}

/// Roots of `a t² + 2 b t + c = 0`; the linear case when `a` vanishes.
fn quadric_distance(a: f64, b: f64, c: f64) -> f64 {
    if a == 0.0 {
        return if b == 0.0 { INF } else { -c / (2.0 * b) };
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return INF;
    }
    let s = disc.sqrt();
    smallest_positive(-(b + s) / a, -(b - s) / a)
}

/// Corner centres of a hexagon whose sides lie at `apothem` from the centre.
fn hexagon_vertices(orientation: HexOrientation, apothem: f64) -> [[f64; 2]; 6] {
    let half = apothem / (2.0 * COS30);
    let full = apothem / COS30;
    let flat_y = [
        [half, apothem],
        [full, 0.0],
        [half, -apothem],
        [-half, -apothem],
        [-full, 0.0],
        [-half, apothem],
    ];
    match orientation {
        HexOrientation::FlatY => flat_y,
        HexOrientation::FlatX => flat_y.map(|[x, y]| [y, x]),
    }
}

/// Signed Euclidean distance to a closed polygon, negative inside.
fn polygon_sdf(vertices: &[[f64; 2]], p: [f64; 2]) -> f64 {
    let dot2 = |a: [f64; 2], b: [f64; 2]| a[0] * b[0] + a[1] * b[1];
    let w0 = [p[0] - vertices[0][0], p[1] - vertices[0][1]];
    let mut d = dot2(w0, w0);
    let mut sign = 1.0;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        let e = [vj[0] - vi[0], vj[1] - vi[1]];
        let w = [p[0] - vi[0], p[1] - vi[1]];
        let ee = dot2(e, e);
        let t = if ee > 0.0 {
            (dot2(w, e) / ee).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let b = [w[0] - e[0] * t, w[1] - e[1] * t];
        d = d.min(dot2(b, b));
        let crossings = [p[1] >= vi[1], p[1] < vj[1], e[0] * w[1] > e[1] * w[0]];
        if crossings.iter().all(|c| *c) || crossings.iter().all(|c| !*c) {
            sign = -sign;
        }
        j = i;
    }
    sign * d.sqrt()
}

/// Signed distance to an axis-aligned rectangle centred at the origin.
fn box_sdf(x: f64, y: f64, hx: f64, hy: f64) -> f64 {
    let qx = x.abs() - hx;
    let qy = y.abs() - hy;
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0)
}

/// Signed distance outside the `[lo, hi]` interval.
#[inline]
fn interval(value: f64, lo: f64, hi: f64) -> f64 {
    (lo - value).max(value - hi)
}

fn wrap_angle(a: f64) -> f64 {
    (a + PI).rem_euclid(2.0 * PI) - PI
}

impl SurfaceKind {
    fn distance(&self, p: [f64; 3], dir: [f64; 3]) -> f64 {
        let [x, y, z] = p;
        let [u, v, w] = dir;
        let mut min = INF;

        match self {
            SurfaceKind::Infinite => INF,
            SurfaceKind::AxisPlane { axis, offset } => {
                let i = axis.index();
                if dir[i] == 0.0 {
                    INF
                } else {
                    (offset - p[i]) / dir[i]
                }
            }
            SurfaceKind::Plane { a, b, c, d } => {
                let m = a * u + b * v + c * w;
                if m == 0.0 {
                    return INF;
                }
                -(a * x + b * y + c * z - d) / m
            }
            SurfaceKind::Quadratic { coefficients: q } => {
                let [ca, cb, cc, cd, ce, cf, cg, ch, cj, ck] = *q;
                let n = ca * u * u + cb * v * v + cc * w * w + cd * u * v + ce * v * w + cf * u * w;
                let m = 2.0 * ca * u * x
                    + 2.0 * cb * v * y
                    + 2.0 * cc * w * z
                    + cd * (v * x + u * y)
                    + ce * (w * y + v * z)
                    + cf * (w * x + u * z)
                    + cg * u
                    + ch * v
                    + cj * w;
                let l = ca * x * x
                    + cb * y * y
                    + cc * z * z
                    + cd * x * y
                    + ce * y * z
                    + cf * x * z
                    + cg * x
                    + ch * y
                    + cj * z
                    + ck;
                quadric_distance(n, 0.5 * m, l)
            }
            SurfaceKind::Sphere {
                x0,
                y0,
                z0,
                radius,
            } => {
                let (x, y, z) = (x - x0, y - y0, z - z0);
                let b = u * x + v * y + w * z;
                let c = x * x + y * y + z * z - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    INF
                } else if c < 0.0 {
                    -b + disc.sqrt()
                } else {
                    let d = -(b + disc.sqrt());
                    if d < 0.0 {
                        INF
                    } else {
                        d
                    }
                }
            }
            SurfaceKind::Cylinder {
                axis,
                center,
                radius,
                cut,
            } => {
                let (t, along) = axis.split(p);
                let (tdir, adir) = axis.split(dir);
                if let Some([lo, hi]) = cut {
                    slab(&mut min, along, adir, *lo, *hi);
                }
                let t = [t[0] - center[0], t[1] - center[1]];
                match circle_distance(t, tdir, *radius) {
                    None => min,
                    Some(d) if d.is_infinite() => INF,
                    Some(d) => d.min(min),
                }
            }
            SurfaceKind::Cone {
                x0,
                y0,
                z0,
                radius,
                height,
            } => {
                let (x, y) = (x - x0, y - y0);
                let zs = radius * (1.0 - (z - z0) / height);
                let ws = -radius * w / height;
                let a = u * u + v * v - ws * ws;
                let b = x * u + y * v - ws * zs;
                let c = x * x + y * y - zs * zs;
                quadric_distance(a, b, c)
            }
            SurfaceKind::Cube { center, half_width } => {
                for i in 0..3 {
                    plane_pair(&mut min, p[i] - center[i], dir[i], *half_width);
                }
                min
            }
            SurfaceKind::Cuboid { lower, upper } => {
                for i in 0..3 {
                    slab(&mut min, p[i], dir[i], lower[i], upper[i]);
                }
                min
            }
            SurfaceKind::Rectangle { lower, upper } => {
                for i in 0..2 {
                    slab(&mut min, p[i], dir[i], lower[i], upper[i]);
                }
                min
            }
            SurfaceKind::Square {
                center,
                half_width: r,
                corner_radius,
            } => {
                let t = [x - center[0], y - center[1]];
                plane_pair(&mut min, t[0], u, *r);
                plane_pair(&mut min, t[1], v, *r);
                if let Some(r0) = corner_radius {
                    let c = r - r0;
                    for corner_at in [[-c, -c], [c, -c], [c, c], [-c, c]] {
                        corner(&mut min, t, [u, v], corner_at, *r0);
                    }
                }
                min
            }
            SurfaceKind::Hexagon {
                orientation,
                center,
                half_width: r,
                corner_radius,
                axial,
            } => {
                let (tx, ty) = (x - center[0], y - center[1]);
                // Swap to the flat-y frame; the formulas are symmetric in it
                let (a, b, da, db) = match orientation {
                    HexOrientation::FlatY => (tx, ty, u, v),
                    HexOrientation::FlatX => (ty, tx, v, u),
                };
                plane_pair(&mut min, b, db, *r);
                plane_pair(&mut min, b - SQRT3 * a, db - SQRT3 * da, 2.0 * r);
                plane_pair(&mut min, b + SQRT3 * a, db + SQRT3 * da, 2.0 * r);
                if let Some(r0) = corner_radius {
                    for corner_at in hexagon_vertices(HexOrientation::FlatY, r - r0) {
                        corner(&mut min, [a, b], [da, db], corner_at, *r0);
                    }
                }
                if let Some([lo, hi]) = axial {
                    slab(&mut min, z, w, *lo, *hi);
                }
                min
            }
            SurfaceKind::Cross {
                center,
                half_length: l,
                half_width: r,
                rounded,
            } => {
                let t = [x - center[0], y - center[1]];
                for (value, rate) in [(t[0], u), (t[1], v)] {
                    plane_pair(&mut min, value, rate, *l);
                    plane_pair(&mut min, value, rate, *r);
                }
                if *rounded {
                    let c = l - r;
                    for corner_at in [[0.0, -c], [0.0, c], [c, 0.0], [-c, 0.0]] {
                        corner(&mut min, t, [u, v], corner_at, *r);
                    }
                }
                min
            }
            SurfaceKind::GeneralCross {
                center,
                half_widths,
            } => {
                let t = [x - center[0], y - center[1]];
                for h in half_widths {
                    plane_pair(&mut min, t[0], u, *h);
                    plane_pair(&mut min, t[1], v, *h);
                }
                min
            }
            SurfaceKind::Dodecagon {
                center,
                half_width_x: r,
                half_width_y: l,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                plane_pair(&mut min, y, v, *l);
                plane_pair(&mut min, x, u, *r);
                plane_pair(&mut min, y - SQRT3 * x, v - SQRT3 * u, 2.0 * l);
                plane_pair(&mut min, y + SQRT3 * x, v + SQRT3 * u, 2.0 * l);
                plane_pair(&mut min, x - SQRT3 * y, u - SQRT3 * v, 2.0 * r);
                plane_pair(&mut min, x + SQRT3 * y, u + SQRT3 * v, 2.0 * r);
                min
            }
            SurfaceKind::Octagon {
                center,
                half_width: r,
                diagonal_half_width: l,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                plane_pair(&mut min, y, v, *r);
                plane_pair(&mut min, x, u, *r);
                plane_pair(&mut min, y - x, v - u, SQRT_2 * l);
                plane_pair(&mut min, y + x, v + u, SQRT_2 * l);
                min
            }
            SurfaceKind::Pad {
                center,
                inner_radius,
                outer_radius,
                theta1,
                theta2,
            } => {
                let t = [x - center[0], y - center[1]];
                corner(&mut min, t, [u, v], [0.0, 0.0], *inner_radius);
                corner(&mut min, t, [u, v], [0.0, 0.0], *outer_radius);
                // Sector lines count unless theta1 lies a full turn past theta2
                if theta1 - theta2 < 2.0 * PI {
                    for th in [theta1, theta2] {
                        let (s, c) = th.sin_cos();
                        let rate = s * u + c * v;
                        if rate != 0.0 {
                            keep_min(&mut min, -(s * t[0] + c * t[1]) / rate);
                        }
                    }
                }
                min
            }
            SurfaceKind::Parallelepiped {
                origin,
                normals,
                extents,
            } => {
                let rel = [x - origin[0], y - origin[1], z - origin[2]];
                for (n, [lo, hi]) in normals.iter().zip(extents) {
                    slab(&mut min, dot(*n, rel), dot(*n, dir), *lo, *hi);
                }
                min
            }
            SurfaceKind::User { callback, params } => callback.distance(params, p, dir),
        }
    }

    fn evaluate(&self, p: [f64; 3]) -> f64 {
        let [x, y, z] = p;
        match self {
            SurfaceKind::Infinite => -1.0,
            SurfaceKind::AxisPlane { axis, offset } => p[axis.index()] - offset,
            SurfaceKind::Plane { a, b, c, d } => a * x + b * y + c * z - d,
            SurfaceKind::Quadratic { coefficients: q } => {
                q[0] * x * x
                    + q[1] * y * y
                    + q[2] * z * z
                    + q[3] * x * y
                    + q[4] * y * z
                    + q[5] * x * z
                    + q[6] * x
                    + q[7] * y
                    + q[8] * z
                    + q[9]
            }
            SurfaceKind::Sphere {
                x0,
                y0,
                z0,
                radius,
            } => {
                let (dx, dy, dz) = (x - x0, y - y0, z - z0);
                (dx * dx + dy * dy + dz * dz).sqrt() - radius
            }
            SurfaceKind::Cylinder {
                axis,
                center,
                radius,
                cut,
            } => {
                let (t, along) = axis.split(p);
                let rho = (t[0] - center[0]).hypot(t[1] - center[1]);
                let radial = rho - radius;
                match cut {
                    Some([lo, hi]) => radial.max(interval(along, *lo, *hi)),
                    None => radial,
                }
            }
            SurfaceKind::Cone {
                x0,
                y0,
                z0,
                radius,
                height,
            } => (x - x0).hypot(y - y0) - radius * (1.0 - (z - z0) / height),
            SurfaceKind::Cube { center, half_width } => (0..3)
                .map(|i| (p[i] - center[i]).abs() - half_width)
                .fold(f64::NEG_INFINITY, f64::max),
            SurfaceKind::Cuboid { lower, upper } => (0..3)
                .map(|i| interval(p[i], lower[i], upper[i]))
                .fold(f64::NEG_INFINITY, f64::max),
            SurfaceKind::Rectangle { lower, upper } => {
                interval(x, lower[0], upper[0]).max(interval(y, lower[1], upper[1]))
            }
            SurfaceKind::Square {
                center,
                half_width,
                corner_radius,
            } => {
                let r0 = corner_radius.unwrap_or(0.0);
                let inner = half_width - r0;
                box_sdf(x - center[0], y - center[1], inner, inner) - r0
            }
            SurfaceKind::Hexagon {
                orientation,
                center,
                half_width,
                corner_radius,
                axial,
            } => {
                let r0 = corner_radius.unwrap_or(0.0);
                let vertices = hexagon_vertices(*orientation, half_width - r0);
                let radial = polygon_sdf(&vertices, [x - center[0], y - center[1]]) - r0;
                match axial {
                    Some([lo, hi]) => radial.max(interval(z, *lo, *hi)),
                    None => radial,
                }
            }
            SurfaceKind::Cross {
                center,
                half_length: l,
                half_width: r,
                rounded,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                if *rounded {
                    let capsule = |a: f64, b: f64| {
                        let da = (a.abs() - (l - r)).max(0.0);
                        da.hypot(b) - r
                    };
                    capsule(x, y).min(capsule(y, x))
                } else {
                    box_sdf(x, y, *l, *r).min(box_sdf(x, y, *r, *l))
                }
            }
            SurfaceKind::GeneralCross {
                center,
                half_widths,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                let n = half_widths.len();
                (0..n)
                    .map(|i| box_sdf(x, y, half_widths[i], half_widths[n - 1 - i]))
                    .fold(INF, f64::min)
            }
            SurfaceKind::Dodecagon {
                center,
                half_width_x: r,
                half_width_y: l,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                [
                    x.abs() - r,
                    y.abs() - l,
                    0.5 * ((y - SQRT3 * x).abs() - 2.0 * l),
                    0.5 * ((y + SQRT3 * x).abs() - 2.0 * l),
                    0.5 * ((x - SQRT3 * y).abs() - 2.0 * r),
                    0.5 * ((x + SQRT3 * y).abs() - 2.0 * r),
                ]
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max)
            }
            SurfaceKind::Octagon {
                center,
                half_width: r,
                diagonal_half_width: l,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                [
                    x.abs() - r,
                    y.abs() - r,
                    ((y - x).abs() - SQRT_2 * l) / SQRT_2,
                    ((y + x).abs() - SQRT_2 * l) / SQRT_2,
                ]
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max)
            }
            SurfaceKind::Pad {
                center,
                inner_radius,
                outer_radius,
                theta1,
                theta2,
            } => {
                let (x, y) = (x - center[0], y - center[1]);
                let rho = x.hypot(y);
                let radial = interval(rho, *inner_radius, *outer_radius);
                let half = 0.5 * (theta2 - theta1).abs();
                if half >= PI {
                    return radial;
                }
                let mid = 0.5 * (theta1 + theta2);
                let phi = (-y).atan2(x);
                let sector = (wrap_angle(phi - mid).abs() - half) * rho;
                radial.max(sector)
            }
            SurfaceKind::Parallelepiped {
                origin,
                normals,
                extents,
            } => {
                let rel = [x - origin[0], y - origin[1], z - origin[2]];
                normals
                    .iter()
                    .zip(extents)
                    .map(|(n, [lo, hi])| interval(dot(*n, rel), *lo, *hi) / dot(*n, *n).sqrt())
                    .fold(f64::NEG_INFINITY, f64::max)
            }
            SurfaceKind::User { callback, params } => callback.evaluate(params, p),
        }
    }

    fn bounding_box(&self) -> Option<BoundingBox> {
        let planar = |center: [f64; 2], hx: f64, hy: f64, z: Option<[f64; 2]>| {
            let [zlo, zhi] = z.unwrap_or([f64::NEG_INFINITY, INF]);
            Some(BoundingBox::new(
                [center[0] - hx, center[1] - hy, zlo],
                [center[0] + hx, center[1] + hy, zhi],
            ))
        };
        match self {
            SurfaceKind::Sphere {
                x0,
                y0,
                z0,
                radius,
            } => Some(BoundingBox::new(
                [x0 - radius, y0 - radius, z0 - radius],
                [x0 + radius, y0 + radius, z0 + radius],
            )),
            SurfaceKind::Cylinder {
                axis,
                center,
                radius,
                cut,
            } => {
                let [lo, hi] = cut.unwrap_or([f64::NEG_INFINITY, INF]);
                Some(BoundingBox::new(
                    axis.join([center[0] - radius, center[1] - radius], lo),
                    axis.join([center[0] + radius, center[1] + radius], hi),
                ))
            }
            SurfaceKind::Cube { center, half_width } => Some(BoundingBox::new(
                center.map(|c| c - half_width),
                center.map(|c| c + half_width),
            )),
            SurfaceKind::Cuboid { lower, upper } => Some(BoundingBox::new(*lower, *upper)),
            SurfaceKind::Rectangle { lower, upper } => Some(BoundingBox::new(
                [lower[0], lower[1], f64::NEG_INFINITY],
                [upper[0], upper[1], INF],
            )),
            SurfaceKind::Square {
                center, half_width, ..
            } => planar(*center, *half_width, *half_width, None),
            SurfaceKind::Hexagon {
                orientation,
                center,
                half_width,
                axial,
                ..
            } => {
                let long = half_width / COS30;
                match orientation {
                    HexOrientation::FlatY => planar(*center, long, *half_width, *axial),
                    HexOrientation::FlatX => planar(*center, *half_width, long, *axial),
                }
            }
            SurfaceKind::Cross {
                center,
                half_length,
                ..
            } => planar(*center, *half_length, *half_length, None),
            SurfaceKind::GeneralCross {
                center,
                half_widths,
            } => {
                let h = half_widths.iter().fold(0.0_f64, |m, w| m.max(*w));
                planar(*center, h, h, None)
            }
            SurfaceKind::Dodecagon {
                center,
                half_width_x,
                half_width_y,
            } => planar(*center, *half_width_x, *half_width_y, None),
            SurfaceKind::Octagon {
                center, half_width, ..
            } => planar(*center, *half_width, *half_width, None),
            SurfaceKind::Pad {
                center,
                outer_radius,
                ..
            } => planar(*center, *outer_radius, *outer_radius, None),
            SurfaceKind::Parallelepiped { .. } => {
                // Corners are the intersections of the three plane pairs
                let corners = self.parallelepiped_corners()?;
                Some(BoundingBox::around(&corners))
            }
            _ => None,
        }
    }

    fn parallelepiped_corners(&self) -> Option<Vec<[f64; 3]>> {
        let SurfaceKind::Parallelepiped {
            origin,
            normals,
            extents,
        } = self
        else {
            return None;
        };
        let m = nalgebra::Matrix3::from_rows(&[
            nalgebra::RowVector3::from(normals[0]),
            nalgebra::RowVector3::from(normals[1]),
            nalgebra::RowVector3::from(normals[2]),
        ]);
        let inverse = m.try_inverse()?;
        let mut corners = Vec::with_capacity(8);
        for i in 0..8 {
            let rhs = nalgebra::Vector3::new(
                extents[0][i & 1],
                extents[1][(i >> 1) & 1],
                extents[2][(i >> 2) & 1],
            );
            let c = inverse * rhs;
            corners.push([c.x + origin[0], c.y + origin[1], c.z + origin[2]]);
        }
        Some(corners)
    }
}
