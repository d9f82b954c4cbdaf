//! # Engine Settings
//!
//! Serializable settings for every subsystem of the deferred renderer.
//!
//! ## Configuration Categories
//!
//! - **Device**: Vulkan instance/device creation parameters
//! - **Render**: Post-process toggles and tuning values read every frame
//! - **Camera**: Initial camera placement, projection and jitter policy
//! - **Compute**: Compute task pool sizing and exhaustion behaviour
//! - **Shaders**: Where precompiled SPIR-V is looked up

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::Config;
use crate::compute::ExhaustionPolicy;
use crate::render::camera::{HaltonSet, JitterPolicy};

/// Vulkan device creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Enable the Khronos validation layer and debug messenger
    pub enable_validation: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            application_name: "Deferred Engine".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Per-frame rendering toggles and tuning values
///
/// Passes read these while recording; changing a toggle takes effect on the
/// next recorded frame without rebuilding anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Screen-space ambient occlusion
    pub ssao: bool,
    /// Screen-space reflections
    pub ssr: bool,
    /// Tone mapping in the composition shader
    pub tonemapping: bool,
    /// Post-resolve anti-aliasing flag forwarded to composition
    pub anti_aliasing: bool,
    /// Temporal anti-aliasing: enables projection jitter
    pub taa: bool,
    /// Depth of field
    pub dof: bool,
    /// Exposure used by tone mapping
    pub exposure: f32,
    /// Global light intensity multiplier
    pub lights_intensity: f32,
    /// Global light range multiplier
    pub lights_range: f32,
    /// Scale applied to the sub-pixel jitter offsets
    pub jitter_scale: f32,
    /// Render target resolution relative to the swapchain
    pub render_targets_scale: f32,
    /// Depth of field focus scale
    pub dof_focus_scale: f32,
    /// Depth of field blur range
    pub dof_blur_range: f32,
    /// Clear color for every color attachment
    pub clear_color: [f32; 4],
    /// Maximum light count baked into the composition shader
    pub max_lights: u32,
    /// Seed for the ambient occlusion kernel and noise texture
    pub ssao_seed: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ssao: true,
            ssr: true,
            tonemapping: true,
            anti_aliasing: true,
            taa: false,
            dof: false,
            exposure: 4.5,
            lights_intensity: 7.0,
            lights_range: 7.0,
            jitter_scale: 1.0,
            render_targets_scale: 1.0,
            dof_focus_scale: 15.0,
            dof_blur_range: 5.0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_lights: 20,
            ssao_seed: 0x55A0,
        }
    }
}

impl RenderSettings {
    /// Enable or disable temporal anti-aliasing
    pub fn with_taa(mut self, enabled: bool) -> Self {
        self.taa = enabled;
        self
    }

    /// Enable or disable depth of field
    pub fn with_dof(mut self, enabled: bool) -> Self {
        self.dof = enabled;
        self
    }

    /// Set the render target scale
    pub fn with_render_targets_scale(mut self, scale: f32) -> Self {
        self.render_targets_scale = scale;
        self
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), String> {
        if !(self.render_targets_scale > 0.0 && self.render_targets_scale <= 4.0) {
            return Err(format!(
                "render_targets_scale must be in (0, 4], got {}",
                self.render_targets_scale
            ));
        }
        if self.exposure <= 0.0 {
            return Err(format!("exposure must be positive, got {}", self.exposure));
        }
        if self.max_lights == 0 {
            return Err("max_lights must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Initial camera state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// World-space position
    pub position: [f32; 3],
    /// Euler angles in degrees (pitch, yaw, roll)
    pub euler_degrees: [f32; 3],
    /// Per-axis handedness of the world
    pub world_orientation: [f32; 3],
    /// Near plane distance; larger than `far_plane` for reversed-Z
    pub near_plane: f32,
    /// Far plane distance
    pub far_plane: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Translation speed
    pub speed: f32,
    /// Rotation speed in degrees per input unit
    pub rotation_speed: f32,
    /// Where jitter offsets come from when TAA is on
    pub jitter: JitterPolicy,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            euler_degrees: [0.0, 180.0, 0.0],
            world_orientation: [-1.0, -1.0, 1.0],
            near_plane: 500.0,
            far_plane: 0.005,
            fov: 45.0,
            speed: 0.35,
            rotation_speed: 0.05,
            jitter: JitterPolicy::Sequence {
                set: HaltonSet::Halton16,
            },
        }
    }
}

impl CameraConfig {
    /// Set the jitter policy
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validate projection parameters
    pub fn validate(&self) -> Result<(), String> {
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return Err(format!("fov must be in (0, 180), got {}", self.fov));
        }
        if self.near_plane <= 0.0 || self.far_plane <= 0.0 {
            return Err("near_plane and far_plane must be positive".to_string());
        }
        if (self.near_plane - self.far_plane).abs() < f32::EPSILON {
            return Err("near_plane and far_plane must differ".to_string());
        }
        Ok(())
    }
}

/// Compute task pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputePoolConfig {
    /// Tasks created up front
    pub initial_tasks: usize,
    /// Size in bytes of each task's input storage buffer
    pub input_buffer_size: u64,
    /// Size in bytes of each task's output storage buffer
    pub output_buffer_size: u64,
    /// What `get_next` does when every task is in flight
    pub policy: ExhaustionPolicy,
    /// Upper bound on tasks under [`ExhaustionPolicy::Grow`]; `None` is unbounded
    pub max_tasks: Option<usize>,
    /// Compute shader name, resolved through [`ShaderPaths`]
    pub shader: String,
}

impl Default for ComputePoolConfig {
    fn default() -> Self {
        Self {
            initial_tasks: 1,
            input_buffer_size: 8000,
            output_buffer_size: 8000,
            policy: ExhaustionPolicy::Grow,
            max_tasks: None,
            shader: "compute.comp".to_string(),
        }
    }
}

impl ComputePoolConfig {
    /// Set the exhaustion policy
    pub fn with_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the upper task bound
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    /// Validate sizes
    pub fn validate(&self) -> Result<(), String> {
        if self.input_buffer_size == 0 || self.output_buffer_size == 0 {
            return Err("compute buffer sizes must be non-zero".to_string());
        }
        if let Some(max) = self.max_tasks {
            if max == 0 || max < self.initial_tasks {
                return Err(format!(
                    "max_tasks ({max}) must be non-zero and at least initial_tasks ({})",
                    self.initial_tasks
                ));
            }
        }
        Ok(())
    }
}

/// Location of precompiled SPIR-V shaders
///
/// A shader named `gbuffer.vert` resolves to `<directory>/gbuffer.vert.spv`,
/// matching what the build script emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderPaths {
    /// Directory holding `.spv` files
    pub directory: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("target/shaders"),
        }
    }
}

impl ShaderPaths {
    /// Use a specific shader directory
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Path of the compiled SPIR-V for `name` (e.g. `"quad.vert"`)
    pub fn spirv(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.spv"))
    }
}

/// Top-level engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Device creation
    pub device: DeviceConfig,
    /// Per-frame render settings
    pub renderer: RenderSettings,
    /// Initial camera
    pub camera: CameraConfig,
    /// Compute pool
    pub compute: ComputePoolConfig,
    /// Shader lookup
    pub shaders: ShaderPaths,
}

impl EngineSettings {
    /// Validate every section
    pub fn validate(&self) -> Result<(), super::ConfigError> {
        self.renderer
            .validate()
            .and_then(|()| self.camera.validate())
            .and_then(|()| self.compute.validate())
            .map_err(super::ConfigError::Invalid)
    }
}

impl Config for EngineSettings {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineSettings::default().validate().is_ok());
    }

    #[test]
    fn test_camera_defaults_are_reversed_z() {
        let camera = CameraConfig::default();
        assert!(camera.near_plane > camera.far_plane);
        assert_eq!(camera.world_orientation, [-1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_invalid_render_scale_rejected() {
        let settings = RenderSettings::default().with_render_targets_scale(0.0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_max_tasks_below_initial_rejected() {
        let mut compute = ComputePoolConfig::default().with_max_tasks(1);
        compute.initial_tasks = 2;
        assert!(compute.validate().is_err());
    }

    #[test]
    fn test_shader_path_resolution() {
        let paths = ShaderPaths::new("shaders");
        assert_eq!(paths.spirv("quad.vert"), Path::new("shaders").join("quad.vert.spv"));
    }

    #[test]
    fn test_toml_round_trip() {
        let settings = EngineSettings {
            camera: CameraConfig::default().with_jitter(JitterPolicy::Random { seed: 7 }),
            compute: ComputePoolConfig::default()
                .with_policy(ExhaustionPolicy::Reject)
                .with_max_tasks(4),
            ..EngineSettings::default()
        };
        let text = settings.to_string_with_format("engine.toml").unwrap();
        let parsed = EngineSettings::from_str_with_format(&text, "engine.toml").unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_ron_round_trip() {
        let settings = EngineSettings {
            renderer: RenderSettings::default().with_taa(true).with_dof(true),
            ..EngineSettings::default()
        };
        let text = settings.to_string_with_format("engine.ron").unwrap();
        let parsed = EngineSettings::from_str_with_format(&text, "engine.ron").unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_ron_round_trip_each_jitter_policy() {
        let policies = [
            JitterPolicy::Sequence { set: HaltonSet::Halton16 },
            JitterPolicy::Sequence { set: HaltonSet::Halton32 },
            JitterPolicy::Random { seed: 99 },
        ];
        for policy in policies {
            let settings = EngineSettings {
                camera: CameraConfig::default().with_jitter(policy),
                ..EngineSettings::default()
            };
            let text = settings.to_string_with_format("engine.ron").unwrap();
            let parsed = EngineSettings::from_str_with_format(&text, "engine.ron").unwrap();
            assert_eq!(parsed.camera.jitter, policy);
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = EngineSettings::from_str_with_format(
            "[renderer]\ntaa = true\n",
            "engine.toml",
        )
        .unwrap();
        assert!(parsed.renderer.taa);
        assert_eq!(parsed.camera, CameraConfig::default());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = EngineSettings::default().to_string_with_format("engine.json");
        assert!(matches!(err, Err(super::super::ConfigError::UnsupportedFormat(_))));
    }
}
