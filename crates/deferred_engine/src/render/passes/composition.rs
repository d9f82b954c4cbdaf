//! Lighting composition
//!
//! One full-screen triangle resolves the G-buffer, ambient occlusion,
//! reflections, shadows and sky into lit color. The result is written to the
//! swapchain image and to the composition target at the same time.
//!
//! Set 0 bindings: depth, normal, albedo, srm, lights UBO, ssaoBlur, ssr,
//! emissive. Sets 1 to 3 are the shadow cascades, set 4 the sky.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem;

use super::{built, clear_color, full_viewport, per_image, BuildContext, EffectFlags, FrameContext, PassNode};
use crate::config::RenderSettings;
use crate::foundation::math::Mat4Ext;
use crate::render::camera::Camera;
use crate::render::frame_graph::PassDesc;
use crate::render::targets::RenderTargetId;
use crate::render::vulkan::pipeline::SpecializationConstants;
use crate::render::vulkan::{
    Buffer, CommandRecorder, DescriptorWriter, Framebuffer, GraphicsPipeline, GraphicsPipelineDesc, RenderPass,
    RenderPassBuilder, VulkanError, VulkanResult,
};

/// Specialization constant id of the light count in `composition.frag`
pub const MAX_LIGHTS_CONSTANT_ID: u32 = 0;

/// Point light as laid out in the lights uniform
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointLight {
    /// RGB color, w is intensity
    pub color: [f32; 4],
    /// World-space position, w is radius
    pub position: [f32; 4],
    /// Constant, linear, quadratic falloff; w unused
    pub attenuation: [f32; 4],
}

/// Header preceding the light array
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
struct LightsHeader {
    camera_position: [f32; 4],
}

/// Size in bytes of the lights uniform for `max_lights` lights
pub fn lights_buffer_size(max_lights: u32) -> vk::DeviceSize {
    (mem::size_of::<LightsHeader>() + mem::size_of::<PointLight>() * max_lights as usize) as vk::DeviceSize
}

/// Fragment push constants, seven `vec4`s
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositionPushConstants {
    /// ssao, ssr, tonemapping, anti-aliasing as 0 or 1
    pub effects: [f32; 4],
    /// Current jitter xy, previous jitter zw
    pub jitter: [f32; 4],
    /// Inverse view-projection, one column per entry
    pub inv_view_projection: [[f32; 4]; 4],
    /// Exposure, lights intensity, lights range, unused
    pub params: [f32; 4],
}

impl CompositionPushConstants {
    /// Gather per-frame values
    pub fn new(camera: &Camera, settings: &RenderSettings, effects: EffectFlags) -> Self {
        let cols = camera.inv_view_projection().to_cols_array();
        let mut inv_view_projection = [[0.0; 4]; 4];
        for (column, chunk) in inv_view_projection.iter_mut().zip(cols.chunks_exact(4)) {
            column.copy_from_slice(chunk);
        }
        let jitter = camera.jitter();
        let previous = camera.previous_jitter();

        Self {
            effects: [
                effects.as_float(EffectFlags::SSAO),
                effects.as_float(EffectFlags::SSR),
                effects.as_float(EffectFlags::TONEMAP),
                effects.as_float(EffectFlags::ANTI_ALIASING),
            ],
            jitter: [jitter.x, jitter.y, previous.x, previous.y],
            inv_view_projection,
            params: [settings.exposure, settings.lights_intensity, settings.lights_range, 0.0],
        }
    }
}

/// Composition pass
#[derive(Default)]
pub struct CompositionPass {
    render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    lights: Vec<Buffer>,
    sets: Vec<vk::DescriptorSet>,
    max_lights: u32,
}

impl CompositionPass {
    /// Unbuilt pass
    pub fn new() -> Self {
        Self::default()
    }
}

impl PassNode for CompositionPass {
    fn desc(&self) -> PassDesc {
        PassDesc::new("composition")
            .reads(&[
                RenderTargetId::Depth,
                RenderTargetId::Normal,
                RenderTargetId::Albedo,
                RenderTargetId::Srm,
                RenderTargetId::SsaoBlur,
                RenderTargetId::Ssr,
                RenderTargetId::Emissive,
            ])
            .writes(&[RenderTargetId::Composition])
    }

    fn create_render_pass(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        self.render_pass = Some(
            RenderPassBuilder::new()
                .add_color(ctx.present.format, vk::ImageLayout::PRESENT_SRC_KHR)
                .add_color(RenderTargetId::Composition.format(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .build(ctx.vulkan.device())?,
        );
        Ok(())
    }

    fn create_framebuffers(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "composition render pass")?;
        let target_extent = ctx.targets.extent();
        let extent = vk::Extent2D {
            width: target_extent.width.min(ctx.present.extent.width),
            height: target_extent.height.min(ctx.present.extent.height),
        };
        let composition = ctx.targets[RenderTargetId::Composition].view();

        self.framebuffers = ctx
            .present
            .image_views
            .iter()
            .map(|&swapchain_view| {
                Framebuffer::new(ctx.vulkan.device(), render_pass, &[swapchain_view, composition], extent)
            })
            .collect::<VulkanResult<_>>()?;
        Ok(())
    }

    fn create_pipeline(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let render_pass = built(&self.render_pass, "composition render pass")?;
        let blend = RenderTargetId::Composition.blend_attachment();
        self.pipeline = Some(
            GraphicsPipelineDesc::fullscreen(
                ctx.shaders.spirv("quad.vert"),
                ctx.shaders.spirv("composition.frag"),
                render_pass.handle(),
            )
            .with_blend_attachments(vec![blend, blend])
            .with_set_layouts(ctx.layouts.composition_sets().to_vec())
            .with_push_constants(vk::ShaderStageFlags::FRAGMENT, mem::size_of::<CompositionPushConstants>())
            .with_fragment_specialization(SpecializationConstants::from_u32s(&[(
                MAX_LIGHTS_CONSTANT_ID,
                ctx.settings.max_lights,
            )]))
            .build(ctx.vulkan.device())?,
        );
        Ok(())
    }

    fn create_uniforms(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        self.max_lights = ctx.settings.max_lights;
        self.lights = (0..ctx.present.image_count())
            .map(|_| {
                let buffer = Buffer::new(
                    ctx.vulkan,
                    lights_buffer_size(self.max_lights),
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )?;
                buffer.zero()?;
                Ok(buffer)
            })
            .collect::<VulkanResult<_>>()?;
        let layouts = vec![ctx.layouts.composition.handle(); ctx.present.image_count()];
        self.sets = ctx.descriptor_pool.allocate_descriptor_sets(&layouts)?;
        Ok(())
    }

    fn update_descriptor_sets(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let targets = ctx.targets;
        self.sets
            .iter()
            .zip(&self.lights)
            .fold(DescriptorWriter::new(), |writer, (&set, lights)| {
                writer
                    .image(set, 0, targets[RenderTargetId::Depth].descriptor_info())
                    .image(set, 1, targets[RenderTargetId::Normal].descriptor_info())
                    .image(set, 2, targets[RenderTargetId::Albedo].descriptor_info())
                    .image(set, 3, targets[RenderTargetId::Srm].descriptor_info())
                    .uniform_buffer(set, 4, lights.descriptor_info())
                    .image(set, 5, targets[RenderTargetId::SsaoBlur].descriptor_info())
                    .image(set, 6, targets[RenderTargetId::Ssr].descriptor_info())
                    .image(set, 7, targets[RenderTargetId::Emissive].descriptor_info())
            })
            .update(ctx.vulkan.device());
        Ok(())
    }

    fn prepare(&mut self, frame: &FrameContext<'_>) -> VulkanResult<()> {
        let buffer = per_image(&self.lights, frame.image_index, "lights uniform")?;
        let max = self.max_lights as usize;
        if frame.lights.len() > max {
            log::warn!("{} lights supplied, only the first {max} are used", frame.lights.len());
        }
        let lights = &frame.lights[..frame.lights.len().min(max)];
        let p = frame.camera.position();

        buffer.write_data(
            0,
            &[LightsHeader {
                camera_position: [p.x, p.y, p.z, 1.0],
            }],
        )?;
        if !lights.is_empty() {
            buffer.write_data(mem::size_of::<LightsHeader>() as vk::DeviceSize, lights)?;
        }
        Ok(())
    }

    fn draw(&self, recorder: &mut CommandRecorder, frame: &FrameContext<'_>) -> VulkanResult<()> {
        let external = frame.external_sets;
        if !external.is_complete() {
            return Err(VulkanError::InvalidOperation {
                reason: "composition needs shadow and sky descriptor sets".to_string(),
            });
        }

        let render_pass = built(&self.render_pass, "composition render pass")?;
        let pipeline = built(&self.pipeline, "composition pipeline")?;
        let framebuffer = per_image(&self.framebuffers, frame.image_index, "composition framebuffer")?;
        let set = *per_image(&self.sets, frame.image_index, "composition descriptor set")?;

        let sets = [
            set,
            external.shadows[0],
            external.shadows[1],
            external.shadows[2],
            external.skybox,
        ];
        let constants = CompositionPushConstants::new(frame.camera, frame.settings, frame.effects);
        let clear = clear_color(frame.settings.clear_color);

        let mut pass = recorder.begin_render_pass(
            render_pass.handle(),
            framebuffer.handle(),
            framebuffer.render_area(),
            &[clear, clear],
        )?;
        pass.set_viewport(full_viewport(framebuffer.extent()));
        pass.set_scissor(framebuffer.render_area());
        pass.bind_pipeline(pipeline.handle());
        pass.bind_descriptor_sets(pipeline.layout(), 0, &sets);
        pass.push_constants(pipeline.layout(), vk::ShaderStageFlags::FRAGMENT, bytemuck::bytes_of(&constants));
        pass.draw(3, 1);
        Ok(())
    }

    fn destroy_size_dependent(&mut self) {
        self.pipeline = None;
        self.framebuffers.clear();
        self.render_pass = None;
    }

    fn destroy(&mut self) {
        self.destroy_size_dependent();
        self.lights.clear();
        self.sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::render::camera::{RenderArea, TemporalJitter};
    use approx::assert_relative_eq;

    #[test]
    fn test_push_constants_are_seven_vec4() {
        assert_eq!(mem::size_of::<CompositionPushConstants>(), 112);
        assert_eq!(mem::offset_of!(CompositionPushConstants, jitter), 16);
        assert_eq!(mem::offset_of!(CompositionPushConstants, inv_view_projection), 32);
        assert_eq!(mem::offset_of!(CompositionPushConstants, params), 96);
    }

    #[test]
    fn test_push_constants_layout() {
        let mut camera = Camera::new(&CameraConfig::default(), RenderArea::new(800.0, 600.0));
        camera.update(TemporalJitter::disabled());
        let settings = RenderSettings {
            ssao: true,
            ssr: false,
            ..RenderSettings::default()
        };
        let constants = CompositionPushConstants::new(&camera, &settings, EffectFlags::from_settings(&settings));

        assert_eq!(constants.effects[0], 1.0);
        assert_eq!(constants.effects[1], 0.0);
        assert_eq!(constants.jitter, [0.0; 4]);
        assert_relative_eq!(constants.params[0], settings.exposure);
        assert_relative_eq!(constants.params[1], settings.lights_intensity);
        assert_relative_eq!(constants.params[2], settings.lights_range);
        let m = camera.inv_view_projection();
        for c in 0..4 {
            for r in 0..4 {
                assert_relative_eq!(constants.inv_view_projection[c][r], m[(r, c)]);
            }
        }
    }

    #[test]
    fn test_lights_buffer_size() {
        assert_eq!(lights_buffer_size(20), 16 + 20 * 48);
    }

    #[test]
    fn test_reads_blurred_ao_not_raw() {
        let desc = CompositionPass::new().desc();
        assert!(desc.reads.contains(&RenderTargetId::SsaoBlur));
        assert!(!desc.reads.contains(&RenderTargetId::Ssao));
        assert_eq!(desc.writes, vec![RenderTargetId::Composition]);
    }
}
