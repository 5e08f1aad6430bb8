use crate::bounding_box::BoundingBox;
use crate::surface::Surface;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Region {
    pub expr: RegionExpr,
}

/// Side of a surface: `Above` is where `evaluate > 0`, `Below` where it is negative.
#[derive(Clone, Debug)]
pub enum HalfspaceType {
    Above(Arc<Surface>),
    Below(Arc<Surface>),
}

#[derive(Clone, Debug)]
pub enum RegionExpr {
    Halfspace(HalfspaceType),
    Union(Box<RegionExpr>, Box<RegionExpr>),
    Intersection(Box<RegionExpr>, Box<RegionExpr>),
    Complement(Box<RegionExpr>),
}

impl Region {
    pub fn new_from_halfspace(halfspace_type: HalfspaceType) -> Self {
        Region {
            expr: RegionExpr::Halfspace(halfspace_type),
        }
    }

    /// Inside of `surface`.
    pub fn inside(surface: &Arc<Surface>) -> Self {
        Self::new_from_halfspace(HalfspaceType::Below(surface.clone()))
    }

    /// Outside of `surface`.
    pub fn outside(surface: &Arc<Surface>) -> Self {
        Self::new_from_halfspace(HalfspaceType::Above(surface.clone()))
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Region {
            expr: RegionExpr::Intersection(
                Box::new(self.expr.clone()),
                Box::new(other.expr.clone()),
            ),
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        Region {
            expr: RegionExpr::Union(Box::new(self.expr.clone()), Box::new(other.expr.clone())),
        }
    }

    pub fn complement(&self) -> Self {
        Region {
            expr: RegionExpr::Complement(Box::new(self.expr.clone())),
        }
    }

    /// Recursively collect all surfaces and their sense (true=Above, false=Below) in the region
    pub fn surfaces_with_sense(&self) -> Vec<(Arc<Surface>, bool)> {
        fn collect(expr: &RegionExpr, surfaces: &mut Vec<(Arc<Surface>, bool)>, sense: bool) {
            match expr {
                RegionExpr::Halfspace(hs) => match hs {
                    HalfspaceType::Above(surf) => surfaces.push((surf.clone(), sense)),
                    HalfspaceType::Below(surf) => surfaces.push((surf.clone(), !sense)),
                },
                RegionExpr::Union(a, b) | RegionExpr::Intersection(a, b) => {
                    collect(a, surfaces, sense);
                    collect(b, surfaces, sense);
                }
                RegionExpr::Complement(inner) => collect(inner, surfaces, !sense),
            }
        }
        let mut result = Vec::new();
        collect(&self.expr, &mut result, true);
        result
    }

    pub fn contains(&self, point: [f64; 3]) -> bool {
        self.expr.evaluate_contains(point)
    }

    /// Axis-aligned box enclosing the region. Axes the region does not bound
    /// stay infinite; an empty intersection gives an inverted box.
    pub fn bounding_box(&self) -> BoundingBox {
        let (lower, upper) = self.expr.bounds();
        if (0..3).any(|i| lower[i] > upper[i]) {
            return BoundingBox::new([f64::INFINITY; 3], [f64::NEG_INFINITY; 3]);
        }
        BoundingBox::new(lower, upper)
    }
}

impl RegionExpr {
    /// Points exactly on a surface belong to neither side.
    pub fn evaluate_contains(&self, point: [f64; 3]) -> bool {
        match self {
            RegionExpr::Halfspace(hs) => match hs {
                HalfspaceType::Above(surf) => surf.evaluate(point) > 0.0,
                HalfspaceType::Below(surf) => surf.evaluate(point) < 0.0,
            },
            RegionExpr::Union(a, b) => a.evaluate_contains(point) || b.evaluate_contains(point),
            RegionExpr::Intersection(a, b) => {
                a.evaluate_contains(point) && b.evaluate_contains(point)
            }
            RegionExpr::Complement(inner) => !inner.evaluate_contains(point),
        }
    }

    fn bounds(&self) -> ([f64; 3], [f64; 3]) {
        let unbounded = ([f64::NEG_INFINITY; 3], [f64::INFINITY; 3]);
        match self {
            RegionExpr::Halfspace(hs) => {
                let (surf, above) = match hs {
                    HalfspaceType::Above(surf) => (surf, true),
                    HalfspaceType::Below(surf) => (surf, false),
                };
                let (mut lower, mut upper) = unbounded;
                if let Some((axis, is_upper, value)) = surf.axis_constraint(above) {
                    if is_upper {
                        upper[axis] = value;
                    } else {
                        lower[axis] = value;
                    }
                }
                if !above {
                    if let Some(bb) = surf.bounding_box() {
                        lower = bb.lower_left;
                        upper = bb.upper_right;
                    }
                }
                (lower, upper)
            }
            RegionExpr::Intersection(a, b) => {
                let (mut lower, mut upper) = a.bounds();
                let (lb, ub) = b.bounds();
                for i in 0..3 {
                    lower[i] = lower[i].max(lb[i]);
                    upper[i] = upper[i].min(ub[i]);
                }
                (lower, upper)
            }
            RegionExpr::Union(a, b) => {
                let (mut lower, mut upper) = a.bounds();
                let (lb, ub) = b.bounds();
                for i in 0..3 {
                    lower[i] = lower[i].min(lb[i]);
                    upper[i] = upper[i].max(ub[i]);
                }
                (lower, upper)
            }
            // Outside of anything bounded is unbounded
            RegionExpr::Complement(_) => unbounded,
        }
    }
}
