//! Camera system for 3D rendering
//!
//! The camera produces everything the passes need from the viewer each frame:
//! view and projection matrices (plus their previous-frame values for
//! reprojection), their inverses, the sub-pixel jitter offset used by temporal
//! anti-aliasing, and six frustum planes for culling.
//!
//! # Conventions
//!
//! - **Reversed-Z**: `near_plane` is larger than `far_plane`, so the far plane
//!   maps to depth 0 and the near plane to depth 1. Depth tests use `GREATER`.
//! - **World orientation**: a per-axis sign vector flips the world basis. The
//!   default `(-1, -1, 1)` makes right-handed assets left-handed and matches
//!   Vulkan's downward Y.
//! - **Matrices**: `nalgebra` column-major, indexed `m[(row, col)]`.
//!
//! # Temporal Jitter
//!
//! When TAA is enabled the projection receives a sub-pixel offset in column 2
//! (rows 0 and 1). Offsets come from a [`JitterPolicy`]: either a fixed
//! Halton(2,3) sequence that repeats with a known period, or a seeded random
//! stream.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{CameraConfig, RenderSettings};
use crate::foundation::math::{utils, Mat4, Mat4Ext, Quat, Vec2, Vec3, Vec4};

/// Movement direction relative to the camera basis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDirection {
    /// Along the front vector
    Forward,
    /// Against the front vector
    Backward,
    /// Against the right vector
    Left,
    /// Along the right vector
    Right,
}

/// Viewport rectangle and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels
    pub x: f32,
    /// Top edge in pixels
    pub y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
    /// Minimum depth
    pub min_depth: f32,
    /// Maximum depth
    pub max_depth: f32,
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scissor {
    /// Left edge in pixels
    pub x: i32,
    /// Top edge in pixels
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Viewport and scissor that are always updated together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderArea {
    /// Viewport
    pub viewport: Viewport,
    /// Scissor
    pub scissor: Scissor,
}

impl RenderArea {
    /// Full-depth area at the origin with the given size
    pub fn new(width: f32, height: f32) -> Self {
        let mut area = Self {
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: Scissor {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            },
        };
        area.update(Vec2::zeros(), Vec2::new(width, height), 0.0, 1.0);
        area
    }

    /// Move and resize both the viewport and the scissor
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn update(&mut self, position: Vec2, size: Vec2, min_depth: f32, max_depth: f32) {
        self.viewport = Viewport {
            x: position.x,
            y: position.y,
            width: size.x,
            height: size.y,
            min_depth,
            max_depth,
        };
        self.scissor = Scissor {
            x: position.x as i32,
            y: position.y as i32,
            width: size.x.max(0.0) as u32,
            height: size.y.max(0.0) as u32,
        };
    }

    /// Width over height of the viewport
    pub fn aspect(&self) -> f32 {
        self.viewport.width / self.viewport.height
    }
}

impl From<Viewport> for ash::vk::Viewport {
    fn from(v: Viewport) -> Self {
        Self {
            x: v.x,
            y: v.y,
            width: v.width,
            height: v.height,
            min_depth: v.min_depth,
            max_depth: v.max_depth,
        }
    }
}

impl From<Scissor> for ash::vk::Rect2D {
    fn from(s: Scissor) -> Self {
        Self {
            offset: ash::vk::Offset2D { x: s.x, y: s.y },
            extent: ash::vk::Extent2D {
                width: s.width,
                height: s.height,
            },
        }
    }
}

/// A frustum plane: unit normal and signed distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumPlane {
    /// Unit normal pointing into the frustum
    pub normal: Vec3,
    /// Signed distance term
    pub distance: f32,
}

impl FrustumPlane {
    fn from_row(row: Vec4) -> Self {
        let length = row.xyz().norm();
        let row = row / length;
        Self {
            normal: row.xyz(),
            distance: row.w,
        }
    }

    /// Signed distance from `point` to the plane
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

impl Default for FrustumPlane {
    fn default() -> Self {
        Self {
            normal: Vec3::zeros(),
            distance: 0.0,
        }
    }
}

/// Which Halton(2,3) point set the deterministic jitter cycles through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltonSet {
    /// Indices 1..=16 of the sequence
    Halton16,
    /// Indices 17..=48 of the sequence
    Halton32,
}

impl HaltonSet {
    /// Number of points before the sequence repeats
    pub fn period(self) -> usize {
        match self {
            Self::Halton16 => 16,
            Self::Halton32 => 32,
        }
    }

    fn first_index(self) -> u32 {
        match self {
            Self::Halton16 => 1,
            Self::Halton32 => 17,
        }
    }

    /// The points of this set in sequence order, each in `[0, 1)^2`
    #[allow(clippy::cast_possible_truncation)]
    pub fn points(self) -> Vec<Vec2> {
        let first = self.first_index();
        (first..first + self.period() as u32)
            .map(|i| Vec2::new(radical_inverse(i, 2), radical_inverse(i, 3)))
            .collect()
    }
}

/// Van der Corput radical inverse of `index` in `base`
#[allow(clippy::cast_precision_loss)]
fn radical_inverse(mut index: u32, base: u32) -> f32 {
    let inv_base = 1.0 / f64::from(base);
    let mut fraction = inv_base;
    let mut result = 0.0_f64;
    while index > 0 {
        result += f64::from(index % base) * fraction;
        index /= base;
        fraction *= inv_base;
    }
    result as f32
}

/// Source of per-frame jitter samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JitterPolicy {
    /// Cycle through a Halton point set; repeats every `set.period()` frames
    Sequence {
        /// Point set to cycle
        set: HaltonSet,
    },
    /// Uniform random samples from a seeded generator
    Random {
        /// Generator seed
        seed: u64,
    },
}

impl Default for JitterPolicy {
    fn default() -> Self {
        Self::Sequence {
            set: HaltonSet::Halton16,
        }
    }
}

#[derive(Debug, Clone)]
enum JitterSource {
    Sequence { points: Vec<Vec2>, next: usize },
    Random(StdRng),
}

impl JitterSource {
    fn new(policy: JitterPolicy) -> Self {
        match policy {
            JitterPolicy::Sequence { set } => Self::Sequence {
                points: set.points(),
                next: 0,
            },
            JitterPolicy::Random { seed } => Self::Random(StdRng::seed_from_u64(seed)),
        }
    }

    fn next_sample(&mut self) -> Vec2 {
        match self {
            Self::Sequence { points, next } => {
                let sample = points[*next];
                *next = (*next + 1) % points.len();
                sample
            }
            Self::Random(rng) => Vec2::new(rng.gen::<f32>(), rng.gen::<f32>()),
        }
    }
}

/// Per-frame temporal anti-aliasing inputs to [`Camera::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalJitter {
    /// Whether to jitter this frame
    pub enabled: bool,
    /// Multiplier on the pixel-sized offset
    pub scale: f32,
    /// Render target size relative to the viewport
    pub render_scale: f32,
}

impl TemporalJitter {
    /// No jitter
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            scale: 1.0,
            render_scale: 1.0,
        }
    }

    /// Read TAA toggles from the render settings
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            enabled: settings.taa,
            scale: settings.jitter_scale,
            render_scale: settings.render_targets_scale,
        }
    }
}

/// Perspective camera with reversed-Z projection, temporal jitter and frustum culling
///
/// Call [`Camera::update`] once per frame before reading any matrix. Values
/// named `previous_*` always hold what the prior `update` produced.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    euler: Vec3,
    orientation: Quat,
    world_orientation: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,

    near_plane: f32,
    far_plane: f32,
    fov: f32,
    speed: f32,
    rotation_speed: f32,

    render_area: RenderArea,

    view: Mat4,
    previous_view: Mat4,
    projection: Mat4,
    previous_projection: Mat4,
    inv_view: Mat4,
    inv_projection: Mat4,
    inv_view_projection: Mat4,

    jitter: Vec2,
    previous_jitter: Vec2,
    jitter_source: JitterSource,

    frustum: [FrustumPlane; 6],
}

impl Camera {
    /// Create a camera from configuration covering `render_area`
    pub fn new(config: &CameraConfig, render_area: RenderArea) -> Self {
        let euler = Vec3::new(
            utils::deg_to_rad(config.euler_degrees[0]),
            utils::deg_to_rad(config.euler_degrees[1]),
            utils::deg_to_rad(config.euler_degrees[2]),
        );
        let mut camera = Self {
            position: Vec3::from(config.position),
            euler,
            orientation: orientation_from_euler(&euler),
            world_orientation: Vec3::from(config.world_orientation),
            front: Vec3::zeros(),
            right: Vec3::zeros(),
            up: Vec3::zeros(),
            near_plane: config.near_plane,
            far_plane: config.far_plane,
            fov: config.fov,
            speed: config.speed,
            rotation_speed: config.rotation_speed,
            render_area,
            view: Mat4::identity(),
            previous_view: Mat4::identity(),
            projection: Mat4::identity(),
            previous_projection: Mat4::identity(),
            inv_view: Mat4::identity(),
            inv_projection: Mat4::identity(),
            inv_view_projection: Mat4::identity(),
            jitter: Vec2::zeros(),
            previous_jitter: Vec2::zeros(),
            jitter_source: JitterSource::new(config.jitter),
            frustum: [FrustumPlane::default(); 6],
        };
        camera.update_basis();
        log::debug!(
            "Camera created: fov {}°, near {}, far {}, jitter {:?}",
            camera.fov,
            camera.near_plane,
            camera.far_plane,
            config.jitter
        );
        camera
    }

    /// Advance one frame
    ///
    /// Saves the previous view, projection and jitter, samples a new jitter
    /// offset when `temporal.enabled`, rebuilds both matrices and their
    /// inverses, then extracts the frustum planes.
    ///
    /// The viewport must have positive width and height.
    pub fn update(&mut self, temporal: TemporalJitter) {
        self.update_basis();

        self.previous_view = self.view;
        self.previous_projection = self.projection;
        self.previous_jitter = self.jitter;

        self.jitter = if temporal.enabled {
            let sample = self.jitter_source.next_sample();
            let width = self.render_area.viewport.width * temporal.render_scale;
            let height = self.render_area.viewport.height * temporal.render_scale;
            Vec2::new(
                (sample.x * 2.0 - 1.0) / width * temporal.scale,
                (sample.y * 2.0 - 1.0) / height * temporal.scale,
            )
        } else {
            Vec2::zeros()
        };

        self.update_projection();
        self.update_view();

        self.inv_view = self.view.inverse_or_identity();
        self.inv_projection = self.projection.inverse_or_identity();
        self.inv_view_projection = self.inv_view * self.inv_projection;

        self.extract_frustum();
    }

    fn update_basis(&mut self) {
        let w = self.world_orientation;
        self.front = self.orientation * Vec3::new(0.0, 0.0, w.z);
        self.right = self.orientation * Vec3::new(w.x, 0.0, 0.0);
        self.up = self.orientation * Vec3::new(0.0, w.y, 0.0);
    }

    fn update_projection(&mut self) {
        let aspect = self.render_area.aspect();
        let tan_half_fov = (utils::deg_to_rad(self.fov) * 0.5).tan();
        let (near, far) = (self.near_plane, self.far_plane);
        let wz = self.world_orientation.z;

        let mut p = Mat4::zeros();
        p[(0, 0)] = 1.0 / (aspect * tan_half_fov);
        p[(1, 1)] = 1.0 / tan_half_fov;
        p[(0, 2)] = self.jitter.x;
        p[(1, 2)] = self.jitter.y;
        p[(2, 2)] = far / (far - near) * wz;
        p[(3, 2)] = wz;
        p[(2, 3)] = -(far * near) / (far - near);
        self.projection = p;
    }

    fn update_view(&mut self) {
        let (r, u, f) = (self.right, self.up, self.front);
        let p = self.position;
        #[rustfmt::skip]
        let view = Mat4::new(
            r.x, r.y, r.z, -r.dot(&p),
            u.x, u.y, u.z, -u.dot(&p),
            f.x, f.y, f.z, -f.dot(&p),
            0.0, 0.0, 0.0, 1.0,
        );
        self.view = view;
    }

    /// Recompute the six frustum planes from `projection * view`
    ///
    /// Order: right, left, bottom, top, far, near.
    pub fn extract_frustum(&mut self) {
        let m = self.projection * self.view;
        let (r0, r1, r2, r3) = (m.row_vec(0), m.row_vec(1), m.row_vec(2), m.row_vec(3));
        self.frustum = [
            FrustumPlane::from_row(r3 - r0),
            FrustumPlane::from_row(r3 + r0),
            FrustumPlane::from_row(r3 + r1),
            FrustumPlane::from_row(r3 - r1),
            FrustumPlane::from_row(r3 - r2),
            FrustumPlane::from_row(r3 + r2),
        ];
    }

    /// Conservative sphere-frustum test
    ///
    /// Returns `false` only when the sphere is entirely behind some plane.
    /// A sphere straddling any plane is accepted immediately.
    pub fn sphere_in_frustum(&self, center: &Vec3, radius: f32) -> bool {
        for plane in &self.frustum {
            let distance = plane.signed_distance(center);
            if distance < -radius {
                return false;
            }
            if distance.abs() < radius {
                return true;
            }
        }
        true
    }

    /// Translate along the camera basis
    pub fn move_towards(&mut self, direction: RelativeDirection, velocity: f32) {
        match direction {
            RelativeDirection::Forward => {
                self.position += self.front * (velocity * self.world_orientation.z);
            }
            RelativeDirection::Backward => {
                self.position -= self.front * (velocity * self.world_orientation.z);
            }
            RelativeDirection::Right => self.position += self.right * velocity,
            RelativeDirection::Left => self.position -= self.right * velocity,
        }
        log::trace!("Camera moved {:?} to {:?}", direction, self.position);
    }

    /// Apply pointer deltas as pitch (from `y`) and yaw (from `x`)
    pub fn rotate(&mut self, x: f32, y: f32) {
        let x = x * self.rotation_speed;
        let y = y * self.rotation_speed;
        self.euler.x += utils::deg_to_rad(-y) * self.world_orientation.y;
        self.euler.y += utils::deg_to_rad(x) * self.world_orientation.x;
        self.orientation = orientation_from_euler(&self.euler);
        self.update_basis();
    }

    /// Move and resize the render area
    pub fn set_render_area(&mut self, position: Vec2, size: Vec2) {
        self.render_area.update(position, size, 0.0, 1.0);
        log::trace!("Camera render area set to {:?}", self.render_area.viewport);
    }

    /// Set the world-space position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// World-space position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Orientation quaternion
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Euler angles in radians (pitch, yaw, roll)
    pub fn euler(&self) -> Vec3 {
        self.euler
    }

    /// Front vector
    pub fn front(&self) -> Vec3 {
        self.front
    }

    /// Right vector
    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// Up vector
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Translation speed
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Current view matrix
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// View matrix from the previous update
    pub fn previous_view(&self) -> &Mat4 {
        &self.previous_view
    }

    /// Current projection matrix, jitter included
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Projection matrix from the previous update
    pub fn previous_projection(&self) -> &Mat4 {
        &self.previous_projection
    }

    /// Inverse view
    pub fn inv_view(&self) -> &Mat4 {
        &self.inv_view
    }

    /// Inverse projection
    pub fn inv_projection(&self) -> &Mat4 {
        &self.inv_projection
    }

    /// `inv_view * inv_projection`
    pub fn inv_view_projection(&self) -> &Mat4 {
        &self.inv_view_projection
    }

    /// Jitter applied this frame
    pub fn jitter(&self) -> Vec2 {
        self.jitter
    }

    /// Jitter applied in the previous frame
    pub fn previous_jitter(&self) -> Vec2 {
        self.previous_jitter
    }

    /// Frustum planes: right, left, bottom, top, far, near
    pub fn frustum(&self) -> &[FrustumPlane; 6] {
        &self.frustum
    }

    /// Render area
    pub fn render_area(&self) -> &RenderArea {
        &self.render_area
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(&CameraConfig::default(), RenderArea::new(1280.0, 720.0))
    }
}

/// Orientation from Euler angles, applied about X, then Y, then Z
fn orientation_from_euler(euler: &Vec3) -> Quat {
    Quat::from_euler_angles(euler.x, euler.y, euler.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    fn taa(scale: f32) -> TemporalJitter {
        TemporalJitter {
            enabled: true,
            scale,
            render_scale: 1.0,
        }
    }

    #[test]
    fn test_halton_first_points() {
        let h16 = HaltonSet::Halton16.points();
        assert_eq!(h16.len(), 16);
        assert_relative_eq!(h16[0].x, 0.5, epsilon = EPSILON);
        assert_relative_eq!(h16[0].y, 1.0 / 3.0, epsilon = EPSILON);
        assert_relative_eq!(h16[15].x, 0.03125, epsilon = EPSILON);
        assert_relative_eq!(h16[15].y, 0.592_592_6, epsilon = EPSILON);

        let h32 = HaltonSet::Halton32.points();
        assert_eq!(h32.len(), 32);
        assert_relative_eq!(h32[0].x, 0.53125, epsilon = EPSILON);
        assert_relative_eq!(h32[0].y, 0.925_925_9, epsilon = EPSILON);
    }

    #[test]
    fn test_default_projection_terms() {
        let mut camera = Camera::default();
        camera.update(TemporalJitter::disabled());
        let p = camera.projection();
        let (near, far) = (500.0_f32, 0.005_f32);

        assert_relative_eq!(p[(3, 2)], 1.0, epsilon = EPSILON);
        assert_relative_eq!(p[(2, 2)], far / (far - near), epsilon = EPSILON);
        assert_relative_eq!(p[(2, 3)], -(far * near) / (far - near), epsilon = EPSILON);
        let tan_half = (45.0_f32.to_radians() * 0.5).tan();
        assert_relative_eq!(p[(1, 1)], 1.0 / tan_half, epsilon = EPSILON);
        assert_relative_eq!(p[(0, 0)], 1.0 / (1280.0 / 720.0 * tan_half), epsilon = EPSILON);
    }

    #[test]
    fn test_camera_never_culls_itself() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(3.0, -2.0, 7.5));
        camera.rotate(120.0, -40.0);
        camera.update(taa(1.0));
        assert!(camera.sphere_in_frustum(&camera.position(), 0.01));
        assert!(camera.sphere_in_frustum(&camera.position(), 10.0));
    }

    #[test]
    fn test_sphere_behind_camera_is_culled() {
        let mut camera = Camera::default();
        camera.update(TemporalJitter::disabled());
        let behind = camera.position() - camera.front() * 50.0;
        let ahead = camera.position() + camera.front() * 50.0;
        assert!(!camera.sphere_in_frustum(&behind, 1.0));
        assert!(camera.sphere_in_frustum(&ahead, 1.0));
    }

    #[test]
    fn test_orientation_stays_normalized() {
        let mut camera = Camera::default();
        for i in 0..500 {
            let f = i as f32;
            camera.rotate((f * 0.37).sin() * 40.0, (f * 0.11).cos() * 25.0);
        }
        assert_relative_eq!(camera.orientation().quaternion().norm(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_sequence_jitter_is_periodic_and_bounded() {
        let mut camera = Camera::default();
        let scale = 0.8;
        let bound_x = scale / 1280.0;
        let bound_y = scale / 720.0;

        let mut first_cycle = Vec::new();
        for _ in 0..16 {
            camera.update(taa(scale));
            let j = camera.jitter();
            assert!(j.x.abs() <= bound_x + f32::EPSILON);
            assert!(j.y.abs() <= bound_y + f32::EPSILON);
            first_cycle.push(j);
        }
        for expected in &first_cycle {
            camera.update(taa(scale));
            assert_relative_eq!(camera.jitter().x, expected.x, epsilon = EPSILON);
            assert_relative_eq!(camera.jitter().y, expected.y, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_halton32_jitter_repeats_every_32_frames() {
        let config = CameraConfig::default().with_jitter(JitterPolicy::Sequence {
            set: HaltonSet::Halton32,
        });
        let mut camera = Camera::new(&config, RenderArea::new(1280.0, 720.0));

        let mut first_cycle = Vec::new();
        for _ in 0..HaltonSet::Halton32.period() {
            camera.update(taa(1.0));
            first_cycle.push(camera.jitter());
        }
        // the 16-point prefix must not already be the cycle
        assert_ne!(first_cycle[0], first_cycle[16]);
        for expected in &first_cycle {
            camera.update(taa(1.0));
            assert_relative_eq!(camera.jitter().x, expected.x, epsilon = EPSILON);
            assert_relative_eq!(camera.jitter().y, expected.y, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_first_jitter_uses_first_halton_point() {
        let mut camera = Camera::default();
        camera.update(taa(1.0));
        assert_relative_eq!(camera.jitter().x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(camera.jitter().y, (2.0 / 3.0 - 1.0) / 720.0, epsilon = EPSILON);
        assert_relative_eq!(camera.projection()[(1, 2)], camera.jitter().y, epsilon = EPSILON);
    }

    #[test]
    fn test_random_jitter_is_seeded_and_bounded() {
        let config = CameraConfig::default().with_jitter(JitterPolicy::Random { seed: 42 });
        let area = RenderArea::new(640.0, 480.0);
        let mut a = Camera::new(&config, area);
        let mut b = Camera::new(&config, area);
        for _ in 0..32 {
            a.update(taa(1.0));
            b.update(taa(1.0));
            assert_eq!(a.jitter(), b.jitter());
            assert!(a.jitter().x.abs() <= 1.0 / 640.0);
            assert!(a.jitter().y.abs() <= 1.0 / 480.0);
        }
    }

    #[test]
    fn test_disabled_jitter_is_zero() {
        let mut camera = Camera::default();
        camera.update(taa(1.0));
        camera.update(TemporalJitter::disabled());
        assert_eq!(camera.jitter(), Vec2::zeros());
        assert_ne!(camera.previous_jitter(), Vec2::zeros());
    }

    #[test]
    fn test_previous_matrices_lag_one_frame() {
        let mut camera = Camera::default();
        camera.update(taa(1.0));
        let view_n = *camera.view();
        let projection_n = *camera.projection();
        let jitter_n = camera.jitter();

        camera.move_towards(RelativeDirection::Forward, 2.0);
        camera.update(taa(1.0));

        assert_eq!(*camera.previous_view(), view_n);
        assert_eq!(*camera.previous_projection(), projection_n);
        assert_eq!(camera.previous_jitter(), jitter_n);
        assert_ne!(*camera.view(), view_n);
    }

    #[test]
    fn test_move_forward_follows_world_z_sign() {
        for wz in [1.0_f32, -1.0] {
            let config = CameraConfig {
                world_orientation: [-1.0, -1.0, wz],
                ..CameraConfig::default()
            };
            let mut camera = Camera::new(&config, RenderArea::new(800.0, 600.0));
            camera.update(TemporalJitter::disabled());
            let start = camera.position();
            camera.move_towards(RelativeDirection::Forward, 1.5);
            let delta = camera.position() - start;
            let expected = camera.front() * (1.5 * wz);
            assert_relative_eq!(delta, expected, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_inverse_view_projection_composes() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(1.0, 2.0, 3.0));
        camera.update(TemporalJitter::disabled());
        let identity = camera.projection() * camera.view() * camera.inv_view_projection();
        assert_relative_eq!(identity, Mat4::identity(), epsilon = 1e-3);
    }

    #[test]
    fn test_frustum_planes_are_normalized() {
        let mut camera = Camera::default();
        camera.update(TemporalJitter::disabled());
        for plane in camera.frustum() {
            assert_relative_eq!(plane.normal.norm(), 1.0, epsilon = EPSILON);
        }
    }

    #[test]
    fn test_render_area_updates_scissor() {
        let mut area = RenderArea::new(100.0, 50.0);
        area.update(Vec2::new(10.0, 20.0), Vec2::new(300.0, 200.0), 0.0, 1.0);
        assert_eq!(area.scissor.x, 10);
        assert_eq!(area.scissor.width, 300);
        assert_relative_eq!(area.aspect(), 1.5);
    }
}
