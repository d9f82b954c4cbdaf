//! Depth of field
//!
//! Copies the composed frame into a sampled snapshot, then blurs it by depth
//! into the viewport target. With the effect off the composed frame is copied
//! straight into the viewport target instead.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::{built, clear_color, full_viewport, per_image, BuildContext, EffectFlags, FrameContext, PassNode};
use crate::render::frame_graph::PassDesc;
use crate::render::targets::RenderTargetId;
use crate::render::vulkan::sync::image_barrier;
use crate::render::vulkan::{
    CommandRecorder, DescriptorWriter, Framebuffer, GraphicsPipeline, GraphicsPipelineDesc, Image, ImageDesc,
    RenderPass, RenderPassBuilder, VulkanResult,
};

/// Focus scale, blur range, two unused
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DofPushConstants {
    /// Values as read by `dof.frag`
    pub values: [f32; 4],
}

impl DofPushConstants {
    /// Pack focus scale and blur range
    pub fn new(focus_scale: f32, blur_range: f32) -> Self {
        Self {
            values: [focus_scale, blur_range, 0.0, 0.0],
        }
    }
}

/// Depth of field pass
#[derive(Default)]
pub struct DofPass {
    render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    snapshot: Option<Image>,
    set: vk::DescriptorSet,
}

impl DofPass {
    /// Unbuilt pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `source` into `destination`, leaving both shader-readable
    fn copy_into(recorder: &mut CommandRecorder, source: &Image, destination: &Image) {
        let color = vk::ImageAspectFlags::COLOR;
        recorder.pipeline_barrier(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
            &[
                image_barrier(
                    source.handle(),
                    color,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::AccessFlags::TRANSFER_READ,
                ),
                image_barrier(
                    destination.handle(),
                    color,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::SHADER_READ,
                    vk::AccessFlags::TRANSFER_WRITE,
                ),
            ],
        );
        recorder.copy_image(source.handle(), destination.handle(), source.extent());
        recorder.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[
                image_barrier(
                    source.handle(),
                    color,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_READ,
                    vk::AccessFlags::SHADER_READ,
                ),
                image_barrier(
                    destination.handle(),
                    color,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::SHADER_READ,
                ),
            ],
        );
    }
}

impl PassNode for DofPass {
    fn desc(&self) -> PassDesc {
        PassDesc::new("dof")
            .reads(&[RenderTargetId::Composition, RenderTargetId::Depth])
            .writes(&[RenderTargetId::Viewport])
    }

    fn create_render_pass(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        self.render_pass = Some(
            RenderPassBuilder::new()
                .add_color(RenderTargetId::Viewport.format(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .build(ctx.vulkan.device())?,
        );
        Ok(())
    }

    fn create_framebuffers(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "DOF render pass")?;
        let view = [ctx.targets[RenderTargetId::Viewport].view()];
        self.framebuffers = (0..ctx.present.image_count())
            .map(|_| Framebuffer::new(ctx.vulkan.device(), render_pass, &view, ctx.targets.extent()))
            .collect::<VulkanResult<_>>()?;

        // sized like the composition target, so it lives with the framebuffers
        self.snapshot = Some(Image::new(
            ctx.vulkan,
            ImageDesc::color(
                RenderTargetId::Composition.format(),
                ctx.targets.extent(),
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            ),
        )?);
        Ok(())
    }

    fn create_pipeline(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "DOF render pass")?;
        self.pipeline = Some(
            GraphicsPipelineDesc::fullscreen(
                ctx.shaders.spirv("quad.vert"),
                ctx.shaders.spirv("dof.frag"),
                render_pass.handle(),
            )
            .with_set_layouts(vec![ctx.layouts.dof.handle()])
            .with_push_constants(vk::ShaderStageFlags::FRAGMENT, std::mem::size_of::<DofPushConstants>())
            .build(ctx.vulkan.device())?,
        );
        Ok(())
    }

    fn create_uniforms(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        self.set = ctx.descriptor_pool.allocate(ctx.layouts.dof.handle())?;
        Ok(())
    }

    fn update_descriptor_sets(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let snapshot = built(&self.snapshot, "DOF snapshot")?;
        DescriptorWriter::new()
            .image(self.set, 0, snapshot.descriptor_info())
            .image(self.set, 1, ctx.targets[RenderTargetId::Depth].descriptor_info())
            .update(ctx.vulkan.device());
        Ok(())
    }

    fn draw(&self, recorder: &mut CommandRecorder, frame: &FrameContext<'_>) -> VulkanResult<()> {
        let composition = &frame.targets[RenderTargetId::Composition];
        if !frame.effects.contains(EffectFlags::DOF) {
            Self::copy_into(recorder, composition, &frame.targets[RenderTargetId::Viewport]);
            return Ok(());
        }

        let snapshot = built(&self.snapshot, "DOF snapshot")?;
        Self::copy_into(recorder, composition, snapshot);

        let render_pass = built(&self.render_pass, "DOF render pass")?;
        let pipeline = built(&self.pipeline, "DOF pipeline")?;
        let framebuffer = per_image(&self.framebuffers, frame.image_index, "DOF framebuffer")?;
        let constants = DofPushConstants::new(frame.settings.dof_focus_scale, frame.settings.dof_blur_range);

        let mut pass = recorder.begin_render_pass(
            render_pass.handle(),
            framebuffer.handle(),
            framebuffer.render_area(),
            &[clear_color(frame.settings.clear_color)],
        )?;
        pass.set_viewport(full_viewport(framebuffer.extent()));
        pass.set_scissor(framebuffer.render_area());
        pass.bind_pipeline(pipeline.handle());
        pass.bind_descriptor_sets(pipeline.layout(), 0, &[self.set]);
        pass.push_constants(pipeline.layout(), vk::ShaderStageFlags::FRAGMENT, bytemuck::bytes_of(&constants));
        pass.draw(3, 1);
        Ok(())
    }

    fn destroy_size_dependent(&mut self) {
        self.pipeline = None;
        self.framebuffers.clear();
        self.render_pass = None;
        self.snapshot = None;
    }

    fn destroy(&mut self) {
        self.destroy_size_dependent();
        self.set = vk::DescriptorSet::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_pack_focus_then_blur() {
        let constants = DofPushConstants::new(15.0, 5.0);
        assert_eq!(constants.values, [15.0, 5.0, 0.0, 0.0]);
        assert_eq!(bytemuck::bytes_of(&constants).len(), 16);
    }

    #[test]
    fn test_writes_viewport_from_composition() {
        let desc = DofPass::new().desc();
        assert_eq!(desc.writes, vec![RenderTargetId::Viewport]);
        assert!(desc.reads.contains(&RenderTargetId::Composition));
    }
}
