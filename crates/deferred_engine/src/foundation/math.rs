//! Math utilities and types
//!
//! Thin aliases over `nalgebra` used by the camera and the GPU data layouts.
//! Matrices follow `nalgebra` conventions: `m[(row, col)]` indexing and
//! column-major storage, which is what the shaders expect.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Common math helpers
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Linear interpolation between `a` and `b`
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

/// Extension methods on [`Mat4`]
pub trait Mat4Ext {
    /// Row `i` as a vector
    fn row_vec(&self, i: usize) -> Vec4;

    /// Inverse, or identity when the matrix is singular
    fn inverse_or_identity(&self) -> Mat4;

    /// Column-major flat array, as consumed by GLSL `mat4`
    fn to_cols_array(&self) -> [f32; 16];
}

impl Mat4Ext for Mat4 {
    fn row_vec(&self, i: usize) -> Vec4 {
        Vec4::new(self[(i, 0)], self[(i, 1)], self[(i, 2)], self[(i, 3)])
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or_else(|| {
            log::warn!("Singular matrix inverted; falling back to identity");
            Mat4::identity()
        })
    }

    fn to_cols_array(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        out.copy_from_slice(self.as_slice());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lerp_endpoints() {
        assert_relative_eq!(utils::lerp(0.1, 1.0, 0.0), 0.1);
        assert_relative_eq!(utils::lerp(0.1, 1.0, 1.0), 1.0);
        assert_relative_eq!(utils::lerp(0.0, 2.0, 0.25), 0.5);
    }

    #[test]
    fn test_cols_array_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let cols = m.to_cols_array();
        assert_relative_eq!(cols[12], 1.0);
        assert_relative_eq!(cols[13], 2.0);
        assert_relative_eq!(cols[14], 3.0);
    }

    #[test]
    fn test_singular_inverse_falls_back() {
        let m = Mat4::zeros();
        assert_eq!(m.inverse_or_identity(), Mat4::identity());
    }
}
