//! Screen-space reflections

use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::{built, clear_color, draw_fullscreen, per_image, BuildContext, EffectFlags, FrameContext, PassNode};
use crate::foundation::math::Mat4Ext;
use crate::render::frame_graph::PassDesc;
use crate::render::targets::RenderTargetId;
use crate::render::vulkan::{
    CommandRecorder, DescriptorWriter, Framebuffer, GraphicsPipeline, GraphicsPipelineDesc, RenderPass,
    RenderPassBuilder, UniformBuffer, VulkanResult,
};

/// Camera data the reflection march needs
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SsrUniform {
    /// World-space camera position, w unused
    pub camera_position: [f32; 4],
    /// Projection
    pub projection: [f32; 16],
    /// View
    pub view: [f32; 16],
    /// Inverse projection
    pub inv_projection: [f32; 16],
}

/// Reflection pass reading the G-buffer
#[derive(Default)]
pub struct SsrPass {
    render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    uniforms: Vec<UniformBuffer<SsrUniform>>,
    sets: Vec<vk::DescriptorSet>,
}

impl SsrPass {
    /// Unbuilt pass
    pub fn new() -> Self {
        Self::default()
    }
}

impl PassNode for SsrPass {
    fn desc(&self) -> PassDesc {
        PassDesc::new("ssr")
            .reads(&[
                RenderTargetId::Albedo,
                RenderTargetId::Depth,
                RenderTargetId::Normal,
                RenderTargetId::Srm,
            ])
            .writes(&[RenderTargetId::Ssr])
    }

    fn create_render_pass(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        self.render_pass = Some(
            RenderPassBuilder::new()
                .add_color(RenderTargetId::Ssr.format(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .build(ctx.vulkan.device())?,
        );
        Ok(())
    }

    fn create_framebuffers(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "SSR render pass")?;
        let view = [ctx.targets[RenderTargetId::Ssr].view()];
        self.framebuffers = (0..ctx.present.image_count())
            .map(|_| Framebuffer::new(ctx.vulkan.device(), render_pass, &view, ctx.targets.extent()))
            .collect::<VulkanResult<_>>()?;
        Ok(())
    }

    fn create_pipeline(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "SSR render pass")?;
        self.pipeline = Some(
            GraphicsPipelineDesc::fullscreen(
                ctx.shaders.spirv("quad.vert"),
                ctx.shaders.spirv("ssr.frag"),
                render_pass.handle(),
            )
            .with_set_layouts(vec![ctx.layouts.ssr.handle()])
            .build(ctx.vulkan.device())?,
        );
        Ok(())
    }

    fn create_uniforms(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        self.uniforms = (0..ctx.present.image_count())
            .map(|_| UniformBuffer::new(ctx.vulkan))
            .collect::<VulkanResult<_>>()?;
        let layouts = vec![ctx.layouts.ssr.handle(); ctx.present.image_count()];
        self.sets = ctx.descriptor_pool.allocate_descriptor_sets(&layouts)?;
        Ok(())
    }

    fn update_descriptor_sets(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let targets = ctx.targets;
        self.sets
            .iter()
            .zip(&self.uniforms)
            .fold(DescriptorWriter::new(), |writer, (&set, uniform)| {
                writer
                    .image(set, 0, targets[RenderTargetId::Albedo].descriptor_info())
                    .image(set, 1, targets[RenderTargetId::Depth].descriptor_info())
                    .image(set, 2, targets[RenderTargetId::Normal].descriptor_info())
                    .image(set, 3, targets[RenderTargetId::Srm].descriptor_info())
                    .uniform_buffer(set, 4, uniform.descriptor_info())
            })
            .update(ctx.vulkan.device());
        Ok(())
    }

    fn prepare(&mut self, frame: &FrameContext<'_>) -> VulkanResult<()> {
        if !frame.effects.contains(EffectFlags::SSR) {
            return Ok(());
        }
        let camera = frame.camera;
        let p = camera.position();
        per_image(&self.uniforms, frame.image_index, "SSR uniform")?.update(&SsrUniform {
            camera_position: [p.x, p.y, p.z, 1.0],
            projection: camera.projection().to_cols_array(),
            view: camera.view().to_cols_array(),
            inv_projection: camera.inv_projection().to_cols_array(),
        })
    }

    fn draw(&self, recorder: &mut CommandRecorder, frame: &FrameContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "SSR render pass")?;
        let pipeline = built(&self.pipeline, "SSR pipeline")?;
        let framebuffer = per_image(&self.framebuffers, frame.image_index, "SSR framebuffer")?;
        let set = *per_image(&self.sets, frame.image_index, "SSR descriptor set")?;

        let clear_values = [clear_color(frame.settings.clear_color)];
        let mut pass = recorder.begin_render_pass(
            render_pass.handle(),
            framebuffer.handle(),
            framebuffer.render_area(),
            &clear_values,
        )?;
        // disabled: the pass still clears so composition samples defined data
        if frame.effects.contains(EffectFlags::SSR) {
            draw_fullscreen(&mut pass, pipeline.handle(), pipeline.layout(), &[set], framebuffer.extent());
        }
        Ok(())
    }

    fn destroy_size_dependent(&mut self) {
        self.pipeline = None;
        self.framebuffers.clear();
        self.render_pass = None;
    }

    fn destroy(&mut self) {
        self.destroy_size_dependent();
        self.uniforms.clear();
        self.sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_is_std140_sized() {
        assert_eq!(std::mem::size_of::<SsrUniform>(), 16 + 3 * 64);
    }

    #[test]
    fn test_reads_gbuffer_writes_ssr() {
        let desc = SsrPass::new().desc();
        assert_eq!(desc.writes, vec![RenderTargetId::Ssr]);
        assert!(desc.reads.contains(&RenderTargetId::Srm));
        assert!(!desc.reads.contains(&RenderTargetId::Ssr));
    }
}
