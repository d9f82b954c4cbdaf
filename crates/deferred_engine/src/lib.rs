//! # Deferred Engine
//!
//! Vulkan deferred rendering core built on `ash`.
//!
//! ## Features
//!
//! - **G-buffer**: depth, normal, albedo, specular/roughness/metallic, velocity and emissive targets
//! - **Screen-space effects**: SSAO with blur, SSR, depth of field
//! - **Composition**: point lights, shadows and skybox resolved into the swapchain image
//! - **Frame graph**: pass ordering validated from declared target reads and writes
//! - **Compute pool**: reusable dispatch tasks with a configurable exhaustion policy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deferred_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = EngineSettings::default();
//!     let context = VulkanContext::new(&settings.device)?;
//!     let layouts = DescriptorLayouts::new(context.device())?;
//!     let mut pool = ComputePool::new(&context, &layouts, &settings.shaders, settings.compute.clone())?;
//!
//!     let task = pool.get_next(&context)?;
//!     task.write_input(&[1u32, 2, 3, 4])?;
//!     task.dispatch(1, 1, 1)?;
//!     task.wait_fence()?;
//!     let output: Vec<u32> = task.read_output(4)?;
//!     assert_eq!(output, vec![1, 2, 3, 4]);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod compute;
pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        compute::{ComputePool, ComputeTask, ExhaustionPolicy},
        config::{CameraConfig, ComputePoolConfig, Config, DeviceConfig, EngineSettings, RenderSettings, ShaderPaths},
        foundation::math::{Mat4, Mat4Ext, Quat, Vec2, Vec3, Vec4},
        render::{
            Camera, DeferredRenderer, DescriptorLayouts, EffectFlags, ExternalSets, FrameGraph, GeometrySource,
            JitterPolicy, PassNode, PointLight, PresentTarget, RenderArea, RenderTargetId, TemporalJitter,
            VulkanContext, VulkanError, VulkanResult,
        },
    };
}
