use nalgebra::{Matrix3, Rotation3, Vector3};

/// Affine coordinate transform applied to a surface before its distance
/// formula runs: the point is translated then rotated, the direction only
/// rotated.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f64>,
    pub rotation: Matrix3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            translation: Vector3::zeros(),
            rotation: Matrix3::identity(),
        }
    }
}

impl Transform {
    /// Move the surface origin to `(x, y, z)`.
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Transform {
            translation: Vector3::new(x, y, z),
            rotation: Matrix3::identity(),
        }
    }

    /// Rotate the surface by `degrees` about a coordinate axis (0 = x, 1 = y, 2 = z).
    pub fn with_axis_rotation(mut self, axis: usize, degrees: f64) -> Self {
        let unit = match axis {
            0 => Vector3::x_axis(),
            1 => Vector3::y_axis(),
            _ => Vector3::z_axis(),
        };
        // Surfaces are evaluated in the local frame, so points are rotated backwards
        let rotation = Rotation3::from_axis_angle(&unit, -degrees.to_radians());
        self.rotation = rotation.matrix() * self.rotation;
        self
    }

    /// Use an explicit rotation matrix mapping global to local coordinates.
    pub fn with_rotation(mut self, rotation: Matrix3<f64>) -> Self {
        self.rotation = rotation;
        self
    }

    #[inline]
    pub fn apply_point(&self, point: [f64; 3]) -> [f64; 3] {
        let local = self.rotation * (Vector3::from(point) - self.translation);
        [local.x, local.y, local.z]
    }

    #[inline]
    pub fn apply_direction(&self, direction: [f64; 3]) -> [f64; 3] {
        let local = self.rotation * Vector3::from(direction);
        [local.x, local.y, local.z]
    }
}
