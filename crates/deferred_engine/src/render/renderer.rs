//! Deferred renderer
//!
//! Owns the render target table, the layout registry, the descriptor pool and
//! every pass. Passes are ordered once by the frame graph; `record_frame`
//! replays them in that order into a caller-supplied command buffer.
//!
//! The renderer borrows the [`VulkanContext`] for each call and does not own
//! it; the context must outlive the renderer.

use ash::vk;

use super::camera::Camera;
use super::frame_graph::FrameGraph;
use super::layouts::DescriptorLayouts;
use super::passes::{
    BuildContext, CompositionPass, DofPass, EffectFlags, ExternalSets, FrameContext, GBufferPass, GeometrySource,
    PassNode, PointLight, PresentTarget, SsaoPass, SsrPass,
};
use super::targets::{scaled_extent, RenderTargets};
use super::vulkan::{CommandPool, CommandRecorder, DescriptorPool, VulkanContext, VulkanResult};
use crate::config::{RenderSettings, ShaderPaths};

/// Descriptor sets allocated per swapchain image by all passes together
const SETS_PER_IMAGE: u32 = 4;

/// Sets the shared pool must hold: per-image sets plus one per pass
#[allow(clippy::cast_possible_truncation)]
fn descriptor_pool_size(image_count: usize, pass_count: usize) -> u32 {
    (image_count as u32).max(1) * SETS_PER_IMAGE + pass_count as u32
}

/// How much a resize has to rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebuild {
    /// Render passes, framebuffers, pipelines and descriptor writes
    SizeDependent,
    /// Every pass object, the per-image uniforms and the descriptor pool
    Full,
}

impl Rebuild {
    fn for_image_counts(old: usize, new: usize) -> Self {
        if old == new {
            Self::SizeDependent
        } else {
            Self::Full
        }
    }
}

/// Run the build protocol over `passes` in `order`
fn build_passes(
    ctx: &BuildContext<'_>,
    order: &[usize],
    passes: &mut [Box<dyn PassNode>],
    rebuild: Rebuild,
) -> VulkanResult<()> {
    for &index in order {
        let pass = &mut passes[index];
        pass.create_render_pass(ctx)?;
        pass.create_framebuffers(ctx)?;
        pass.create_pipeline(ctx)?;
        if rebuild == Rebuild::Full {
            pass.create_uniforms(ctx)?;
        }
        pass.update_descriptor_sets(ctx)?;
        log::debug!("Built pass '{}'", pass.desc().name);
    }
    Ok(())
}

/// Deferred pipeline orchestrator
pub struct DeferredRenderer {
    // drop order: passes before the objects they were built from
    passes: Vec<Box<dyn PassNode>>,
    order: Vec<usize>,
    targets: RenderTargets,
    descriptor_pool: DescriptorPool,
    command_pool: CommandPool,
    layouts: DescriptorLayouts,
    present: PresentTarget,
    settings: RenderSettings,
    shaders: ShaderPaths,
    lights: Vec<PointLight>,
}

impl DeferredRenderer {
    /// The passes in declaration order
    fn default_passes(settings: &RenderSettings) -> Vec<Box<dyn PassNode>> {
        vec![
            Box::new(GBufferPass::new()),
            Box::new(SsaoPass::new(settings.ssao_seed)),
            Box::new(SsrPass::new()),
            Box::new(CompositionPass::new()),
            Box::new(DofPass::new()),
        ]
    }

    /// Build targets, layouts and every pass
    pub fn build(
        context: &VulkanContext,
        settings: RenderSettings,
        shaders: ShaderPaths,
        present: PresentTarget,
    ) -> VulkanResult<Self> {
        let passes = Self::default_passes(&settings);
        Self::with_passes(context, settings, shaders, present, passes)
    }

    /// Build with a custom pass list
    pub fn with_passes(
        context: &VulkanContext,
        settings: RenderSettings,
        shaders: ShaderPaths,
        present: PresentTarget,
        mut passes: Vec<Box<dyn PassNode>>,
    ) -> VulkanResult<Self> {
        let mut graph = FrameGraph::new();
        for pass in &passes {
            graph.add_pass(pass.desc());
        }
        let order = graph.compile()?;

        let device = context.device();
        let layouts = DescriptorLayouts::new(device)?;
        let targets = RenderTargets::new(context, scaled_extent(present.extent, settings.render_targets_scale))?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            descriptor_pool_size(present.image_count(), passes.len()),
        )?;
        let command_pool = CommandPool::new(
            device.clone(),
            context.graphics_queue().family,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;

        let ctx = BuildContext {
            vulkan: context,
            layouts: &layouts,
            targets: &targets,
            descriptor_pool: &descriptor_pool,
            command_pool: &command_pool,
            present: &present,
            shaders: &shaders,
            settings: &settings,
        };
        build_passes(&ctx, &order, &mut passes, Rebuild::Full)?;

        log::info!(
            "Deferred renderer built: {} passes, {} swapchain images, targets {}x{}",
            passes.len(),
            present.image_count(),
            targets.extent().width,
            targets.extent().height
        );

        Ok(Self {
            passes,
            order,
            targets,
            descriptor_pool,
            command_pool,
            layouts,
            present,
            settings,
            shaders,
            lights: Vec::new(),
        })
    }

    /// Rebuild everything that depends on the swapchain or target size
    ///
    /// A change in swapchain image count rebuilds every pass from scratch,
    /// with a descriptor pool sized for the new count. The caller must make
    /// sure no submitted frame still uses the old objects.
    pub fn resize(&mut self, context: &VulkanContext, present: PresentTarget) -> VulkanResult<()> {
        let rebuild = Rebuild::for_image_counts(self.present.image_count(), present.image_count());
        match rebuild {
            Rebuild::SizeDependent => {
                for pass in &mut self.passes {
                    pass.destroy_size_dependent();
                }
            }
            Rebuild::Full => {
                log::info!(
                    "Swapchain image count changed from {} to {}; rebuilding all passes",
                    self.present.image_count(),
                    present.image_count()
                );
                for pass in &mut self.passes {
                    pass.destroy();
                }
                // sets from the old pool are freed with it
                self.descriptor_pool = DescriptorPool::new(
                    context.device().clone(),
                    descriptor_pool_size(present.image_count(), self.passes.len()),
                )?;
            }
        }

        self.present = present;
        self.targets.recreate(
            context,
            scaled_extent(self.present.extent, self.settings.render_targets_scale),
        )?;

        let ctx = BuildContext {
            vulkan: context,
            layouts: &self.layouts,
            targets: &self.targets,
            descriptor_pool: &self.descriptor_pool,
            command_pool: &self.command_pool,
            present: &self.present,
            shaders: &self.shaders,
            settings: &self.settings,
        };
        build_passes(&ctx, &self.order, &mut self.passes, rebuild)?;

        log::info!(
            "Resized to {}x{} (targets {}x{})",
            self.present.extent.width,
            self.present.extent.height,
            self.targets.extent().width,
            self.targets.extent().height
        );
        Ok(())
    }

    /// Write per-frame uniforms and record every pass into `recorder`
    ///
    /// `recorder` must already be recording. `camera` should have been
    /// updated for this frame.
    pub fn record_frame(
        &mut self,
        recorder: &mut CommandRecorder,
        image_index: usize,
        camera: &Camera,
        geometry: &dyn GeometrySource,
        external_sets: &ExternalSets,
    ) -> VulkanResult<()> {
        let frame = FrameContext {
            image_index,
            camera,
            settings: &self.settings,
            effects: EffectFlags::from_settings(&self.settings),
            targets: &self.targets,
            geometry,
            external_sets,
            lights: &self.lights,
        };

        for &index in &self.order {
            self.passes[index].prepare(&frame)?;
        }
        for &index in &self.order {
            self.passes[index].draw(recorder, &frame)?;
        }

        log::trace!("Recorded frame for swapchain image {image_index}");
        Ok(())
    }

    /// Replace the per-frame settings
    ///
    /// Toggles and tuning values apply to the next recorded frame. The target
    /// scale and light count only change on the next resize or rebuild.
    pub fn set_settings(&mut self, settings: RenderSettings) {
        if settings.render_targets_scale != self.settings.render_targets_scale
            || settings.max_lights != self.settings.max_lights
        {
            log::info!("Render target scale or light count changed; takes effect on next resize");
        }
        self.settings = settings;
    }

    /// Current settings
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Lights uploaded by composition each frame
    pub fn set_lights(&mut self, lights: Vec<PointLight>) {
        self.lights = lights;
    }

    /// Render target table
    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// Layout registry, for collaborators that allocate geometry, shadow or sky sets
    pub fn layouts(&self) -> &DescriptorLayouts {
        &self.layouts
    }

    /// Pass names in execution order
    pub fn pass_order(&self) -> Vec<&'static str> {
        self.order.iter().map(|&i| self.passes[i].desc().name).collect()
    }

    /// Destroy every pass, then the shared objects
    pub fn teardown(mut self, context: &VulkanContext) -> VulkanResult<()> {
        context.wait_idle()?;
        for pass in &mut self.passes {
            pass.destroy();
        }
        log::info!("Deferred renderer destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_image_count_keeps_uniforms() {
        assert_eq!(Rebuild::for_image_counts(3, 3), Rebuild::SizeDependent);
    }

    #[test]
    fn test_image_count_change_rebuilds_everything() {
        assert_eq!(Rebuild::for_image_counts(2, 3), Rebuild::Full);
        assert_eq!(Rebuild::for_image_counts(3, 2), Rebuild::Full);
        assert_eq!(Rebuild::for_image_counts(0, 2), Rebuild::Full);
    }

    #[test]
    fn test_pool_grows_with_image_count() {
        assert_eq!(descriptor_pool_size(2, 5), 2 * SETS_PER_IMAGE + 5);
        assert_eq!(descriptor_pool_size(3, 5), 3 * SETS_PER_IMAGE + 5);
        assert!(descriptor_pool_size(3, 5) > descriptor_pool_size(2, 5));
    }

    #[test]
    fn test_pool_never_empty_without_images() {
        assert_eq!(descriptor_pool_size(0, 0), SETS_PER_IMAGE);
    }
}
