//! Geometry pass
//!
//! Renders scene geometry into six color targets and the hardware depth
//! buffer. Depth is reversed: cleared to 0 and tested with `GREATER`.
//! Draws come from a [`GeometrySource`](super::GeometrySource).

use ash::vk;
use bytemuck::{Pod, Zeroable};

use super::{built, clear_color, full_viewport, per_image, BuildContext, FrameContext, PassNode};
use crate::render::frame_graph::PassDesc;
use crate::render::targets::{RenderTargetId, DEPTH_BUFFER_FORMAT};
use crate::render::vulkan::{CommandRecorder, Framebuffer, GraphicsPipeline, GraphicsPipelineDesc, RenderPass, RenderPassBuilder, VulkanResult};

/// Targets written by the geometry pass, in attachment order
pub const GBUFFER_TARGETS: [RenderTargetId; 6] = [
    RenderTargetId::Depth,
    RenderTargetId::Normal,
    RenderTargetId::Albedo,
    RenderTargetId::Srm,
    RenderTargetId::Velocity,
    RenderTargetId::Emissive,
];

/// Vertex layout consumed by `gbuffer.vert`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GBufferVertex {
    /// Object-space position (location 0)
    pub position: [f32; 3],
    /// Object-space normal (location 1)
    pub normal: [f32; 3],
    /// Texture coordinates (location 2)
    pub uv: [f32; 2],
    /// Tangent with handedness in w (location 3)
    pub tangent: [f32; 4],
}

impl GBufferVertex {
    /// Binding 0, per-vertex
    #[allow(clippy::cast_possible_truncation)]
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position, normal, uv, tangent
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset,
        };
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
            attribute(1, vk::Format::R32G32B32_SFLOAT, 12),
            attribute(2, vk::Format::R32G32_SFLOAT, 24),
            attribute(3, vk::Format::R32G32B32A32_SFLOAT, 32),
        ]
    }
}

/// G-buffer generation
#[derive(Default)]
pub struct GBufferPass {
    render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
}

impl GBufferPass {
    /// Unbuilt pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline layout geometry sources bind their sets on
    pub fn pipeline_layout(&self) -> Option<vk::PipelineLayout> {
        self.pipeline.as_ref().map(GraphicsPipeline::layout)
    }
}

impl PassNode for GBufferPass {
    fn desc(&self) -> PassDesc {
        PassDesc::new("gbuffer").writes(&GBUFFER_TARGETS)
    }

    fn create_render_pass(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let builder = GBUFFER_TARGETS
            .iter()
            .fold(RenderPassBuilder::new(), |builder, id| {
                builder.add_color(id.format(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            })
            .with_depth(DEPTH_BUFFER_FORMAT);
        self.render_pass = Some(builder.build(ctx.vulkan.device())?);
        Ok(())
    }

    fn create_framebuffers(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "G-buffer render pass")?;
        let mut views: Vec<vk::ImageView> = GBUFFER_TARGETS.iter().map(|&id| ctx.targets[id].view()).collect();
        views.push(ctx.targets.depth_buffer().view());

        self.framebuffers = (0..ctx.present.image_count())
            .map(|_| Framebuffer::new(ctx.vulkan.device(), render_pass, &views, ctx.targets.extent()))
            .collect::<VulkanResult<_>>()?;
        Ok(())
    }

    fn create_pipeline(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "G-buffer render pass")?;
        let desc = GraphicsPipelineDesc::fullscreen(
            ctx.shaders.spirv("gbuffer.vert"),
            ctx.shaders.spirv("gbuffer.frag"),
            render_pass.handle(),
        )
        .with_vertex_input(
            vec![GBufferVertex::binding_description()],
            GBufferVertex::attribute_descriptions().to_vec(),
        )
        .with_cull(vk::CullModeFlags::FRONT, vk::FrontFace::CLOCKWISE)
        .with_depth(true, vk::CompareOp::GREATER)
        .with_blend_attachments(GBUFFER_TARGETS.iter().map(|id| id.blend_attachment()).collect())
        .with_set_layouts(ctx.layouts.geometry_sets().to_vec());

        self.pipeline = Some(desc.build(ctx.vulkan.device())?);
        Ok(())
    }

    fn create_uniforms(&mut self, _ctx: &BuildContext<'_>) -> VulkanResult<()> {
        Ok(())
    }

    fn update_descriptor_sets(&mut self, _ctx: &BuildContext<'_>) -> VulkanResult<()> {
        Ok(())
    }

    fn draw(&self, recorder: &mut CommandRecorder, frame: &FrameContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "G-buffer render pass")?;
        let pipeline = built(&self.pipeline, "G-buffer pipeline")?;
        let framebuffer = per_image(&self.framebuffers, frame.image_index, "G-buffer framebuffer")?;

        let mut clear_values = vec![clear_color(frame.settings.clear_color); GBUFFER_TARGETS.len()];
        clear_values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 },
        });

        let mut pass = recorder.begin_render_pass(
            render_pass.handle(),
            framebuffer.handle(),
            framebuffer.render_area(),
            &clear_values,
        )?;
        pass.set_viewport(full_viewport(framebuffer.extent()));
        pass.set_scissor(framebuffer.render_area());
        pass.bind_pipeline(pipeline.handle());
        frame.geometry.draw_geometry(&mut pass, pipeline.layout(), frame.camera);
        Ok(())
    }

    fn destroy_size_dependent(&mut self) {
        self.pipeline = None;
        self.framebuffers.clear();
        self.render_pass = None;
    }

    fn destroy(&mut self) {
        self.destroy_size_dependent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_offsets_match_struct() {
        let attributes = GBufferVertex::attribute_descriptions();
        assert_eq!(attributes[1].offset as usize, std::mem::offset_of!(GBufferVertex, normal));
        assert_eq!(attributes[2].offset as usize, std::mem::offset_of!(GBufferVertex, uv));
        assert_eq!(attributes[3].offset as usize, std::mem::offset_of!(GBufferVertex, tangent));
        assert_eq!(GBufferVertex::binding_description().stride, 48);
    }

    #[test]
    fn test_writes_every_gbuffer_target() {
        let desc = GBufferPass::new().desc();
        assert!(desc.reads.is_empty());
        assert_eq!(desc.writes, GBUFFER_TARGETS.to_vec());
    }
}
