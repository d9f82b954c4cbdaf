//! Deferred render passes
//!
//! Every pass implements [`PassNode`]. The renderer drives the build steps in
//! the order they are declared on the trait, then calls [`PassNode::prepare`]
//! and [`PassNode::draw`] once per frame in frame-graph order. On resize only
//! the size-dependent objects are destroyed and rebuilt; uniforms and
//! descriptor sets survive and are rewritten with the new target views.

pub mod composition;
pub mod dof;
pub mod gbuffer;
pub mod ssao;
pub mod ssr;

pub use composition::{CompositionPass, CompositionPushConstants, PointLight};
pub use dof::DofPass;
pub use gbuffer::{GBufferPass, GBufferVertex};
pub use ssao::SsaoPass;
pub use ssr::SsrPass;

use ash::vk;
use bitflags::bitflags;

use super::camera::Camera;
use super::frame_graph::PassDesc;
use super::layouts::DescriptorLayouts;
use super::targets::RenderTargets;
use super::vulkan::{ActiveRenderPass, CommandPool, CommandRecorder, DescriptorPool, VulkanContext, VulkanResult};
use crate::config::{RenderSettings, ShaderPaths};

bitflags! {
    /// Effects switched on for the current frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EffectFlags: u32 {
        /// Ambient occlusion
        const SSAO = 1 << 0;
        /// Screen-space reflections
        const SSR = 1 << 1;
        /// Tone mapping
        const TONEMAP = 1 << 2;
        /// Anti-aliasing flag forwarded to composition
        const ANTI_ALIASING = 1 << 3;
        /// Temporal jitter
        const TAA = 1 << 4;
        /// Depth of field
        const DOF = 1 << 5;
    }
}

impl EffectFlags {
    /// Flags enabled by `settings`
    pub fn from_settings(settings: &RenderSettings) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::SSAO, settings.ssao);
        flags.set(Self::SSR, settings.ssr);
        flags.set(Self::TONEMAP, settings.tonemapping);
        flags.set(Self::ANTI_ALIASING, settings.anti_aliasing);
        flags.set(Self::TAA, settings.taa);
        flags.set(Self::DOF, settings.dof);
        flags
    }

    /// `1.0` when every flag in `other` is set, otherwise `0.0`
    pub fn as_float(self, other: Self) -> f32 {
        if self.contains(other) {
            1.0
        } else {
            0.0
        }
    }
}

/// Swapchain images supplied by the windowing layer
#[derive(Debug, Clone, Default)]
pub struct PresentTarget {
    /// Swapchain image format
    pub format: vk::Format,
    /// Swapchain extent
    pub extent: vk::Extent2D,
    /// One view per swapchain image
    pub image_views: Vec<vk::ImageView>,
}

impl PresentTarget {
    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.image_views.len()
    }
}

/// Records scene geometry into the G-buffer
///
/// Called inside the geometry render pass with its pipeline bound. The
/// implementation binds vertex and index buffers plus sets 0 (mesh),
/// 1 (primitive) and 2 (model) on `layout`, then issues draws.
pub trait GeometrySource {
    /// Record draws for every visible object
    fn draw_geometry(&self, pass: &mut ActiveRenderPass<'_>, layout: vk::PipelineLayout, camera: &Camera);
}

/// Draws nothing; the G-buffer is only cleared
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScene;

impl GeometrySource for EmptyScene {
    fn draw_geometry(&self, _pass: &mut ActiveRenderPass<'_>, _layout: vk::PipelineLayout, _camera: &Camera) {}
}

/// Descriptor sets owned by the shadow and sky renderers
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalSets {
    /// One set per shadow cascade
    pub shadows: [vk::DescriptorSet; 3],
    /// Sky cube map
    pub skybox: vk::DescriptorSet,
}

impl ExternalSets {
    /// Whether every set has been provided
    pub fn is_complete(&self) -> bool {
        self.shadows.iter().all(|&s| s != vk::DescriptorSet::null()) && self.skybox != vk::DescriptorSet::null()
    }
}

/// Shared objects available while passes build
pub struct BuildContext<'a> {
    /// Device and queues
    pub vulkan: &'a VulkanContext,
    /// Layout registry
    pub layouts: &'a DescriptorLayouts,
    /// Render target table
    pub targets: &'a RenderTargets,
    /// Pool every pass allocates its sets from
    pub descriptor_pool: &'a DescriptorPool,
    /// Graphics pool for one-off uploads
    pub command_pool: &'a CommandPool,
    /// Swapchain description
    pub present: &'a PresentTarget,
    /// SPIR-V lookup
    pub shaders: &'a ShaderPaths,
    /// Render settings at build time
    pub settings: &'a RenderSettings,
}

/// Per-frame inputs shared by every pass
pub struct FrameContext<'a> {
    /// Swapchain image being rendered
    pub image_index: usize,
    /// Camera after `update`
    pub camera: &'a Camera,
    /// Current render settings
    pub settings: &'a RenderSettings,
    /// Effects derived from `settings`
    pub effects: EffectFlags,
    /// Render target table
    pub targets: &'a RenderTargets,
    /// Scene geometry
    pub geometry: &'a dyn GeometrySource,
    /// Shadow and sky sets
    pub external_sets: &'a ExternalSets,
    /// Lights for composition
    pub lights: &'a [PointLight],
}

/// Build, record and teardown protocol shared by all passes
pub trait PassNode {
    /// Name plus the targets this pass samples and renders to
    fn desc(&self) -> PassDesc;

    /// Create render passes
    fn create_render_pass(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()>;

    /// Create one framebuffer per swapchain image
    fn create_framebuffers(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()>;

    /// Create pipelines
    fn create_pipeline(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()>;

    /// Create uniform buffers and textures, allocate descriptor sets
    fn create_uniforms(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()>;

    /// Point descriptor sets at the current targets and buffers
    fn update_descriptor_sets(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()>;

    /// Write per-frame uniforms
    fn prepare(&mut self, _frame: &FrameContext<'_>) -> VulkanResult<()> {
        Ok(())
    }

    /// Record the pass
    fn draw(&self, recorder: &mut CommandRecorder, frame: &FrameContext<'_>) -> VulkanResult<()>;

    /// Drop render passes, framebuffers, pipelines and sized images
    fn destroy_size_dependent(&mut self);

    /// Drop everything the pass owns
    fn destroy(&mut self);
}

/// Clear value for a color attachment
pub(crate) fn clear_color(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

/// Viewport covering `extent`
#[allow(clippy::cast_precision_loss)]
pub(crate) fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Record a full-screen triangle with one descriptor set and optional push constants
pub(crate) fn draw_fullscreen(
    pass: &mut ActiveRenderPass<'_>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    sets: &[vk::DescriptorSet],
    extent: vk::Extent2D,
) {
    pass.set_viewport(full_viewport(extent));
    pass.set_scissor(vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    });
    pass.bind_pipeline(pipeline);
    pass.bind_descriptor_sets(layout, 0, sets);
    pass.draw(3, 1);
}

/// Fetch a built object or report which build step was skipped
pub(crate) fn built<'a, T>(object: &'a Option<T>, what: &str) -> VulkanResult<&'a T> {
    object.as_ref().ok_or_else(|| super::vulkan::VulkanError::InvalidOperation {
        reason: format!("{what} used before it was created"),
    })
}

/// Per-image lookup that reports a bad swapchain index
pub(crate) fn per_image<'a, T>(items: &'a [T], index: usize, what: &str) -> VulkanResult<&'a T> {
    items.get(index).ok_or_else(|| super::vulkan::VulkanError::InvalidOperation {
        reason: format!("no {what} for swapchain image {index} ({} created)", items.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_flags_follow_settings() {
        let settings = RenderSettings {
            ssao: false,
            ssr: true,
            ..RenderSettings::default()
        }
        .with_dof(true);
        let flags = EffectFlags::from_settings(&settings);
        assert!(!flags.contains(EffectFlags::SSAO));
        assert!(flags.contains(EffectFlags::SSR | EffectFlags::DOF));
        assert_eq!(flags.as_float(EffectFlags::SSAO), 0.0);
        assert_eq!(flags.as_float(EffectFlags::SSR), 1.0);
    }

    #[test]
    fn test_flipping_a_flag_changes_its_shader_value() {
        let mut flags = EffectFlags::from_settings(&RenderSettings::default());
        let before = flags.as_float(EffectFlags::TONEMAP);
        flags.toggle(EffectFlags::TONEMAP);
        assert_eq!(flags.as_float(EffectFlags::TONEMAP), 1.0 - before);
        assert_eq!(
            flags.as_float(EffectFlags::SSAO | EffectFlags::TONEMAP),
            flags.as_float(EffectFlags::SSAO) * flags.as_float(EffectFlags::TONEMAP)
        );
    }

    #[test]
    fn test_external_sets_default_incomplete() {
        assert!(!ExternalSets::default().is_complete());
    }

    #[test]
    fn test_per_image_reports_missing_index() {
        let items = [1, 2];
        assert_eq!(*per_image(&items, 1, "framebuffer").unwrap(), 2);
        assert!(per_image(&items, 2, "framebuffer").is_err());
    }
}
