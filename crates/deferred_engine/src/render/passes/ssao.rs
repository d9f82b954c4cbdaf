//! Screen-space ambient occlusion
//!
//! Two full-screen passes: the first samples a 16-point hemisphere kernel
//! around each pixel, rotated by a tiled 4x4 noise texture, and writes raw
//! occlusion; the second blurs it. The kernel and noise come from a seeded
//! RNG so the same seed always produces the same image.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{built, clear_color, draw_fullscreen, per_image, BuildContext, EffectFlags, FrameContext, PassNode};
use crate::foundation::math::utils::lerp;
use crate::foundation::math::{Mat4Ext, Vec3};
use crate::render::frame_graph::PassDesc;
use crate::render::targets::RenderTargetId;
use crate::render::vulkan::{
    CommandRecorder, DescriptorWriter, Framebuffer, GraphicsPipeline, GraphicsPipelineDesc, Image, ImageDesc,
    RenderPass, RenderPassBuilder, UniformBuffer, VulkanResult,
};

/// Kernel sample count
pub const KERNEL_SIZE: usize = 16;

/// Noise texture edge length
pub const NOISE_DIM: u32 = 4;

/// Hemisphere sample offsets, xyz used
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SsaoKernel {
    /// Samples in tangent space
    pub samples: [[f32; 4]; KERNEL_SIZE],
}

/// Matrices the AO shader reconstructs positions with
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PvmUniform {
    /// Projection
    pub projection: [f32; 16],
    /// View
    pub view: [f32; 16],
    /// Inverse projection
    pub inv_projection: [f32; 16],
}

/// Build the hemisphere kernel; samples cluster towards the origin
#[allow(clippy::cast_precision_loss)]
pub fn generate_kernel(rng: &mut impl Rng) -> SsaoKernel {
    let mut samples = [[0.0; 4]; KERNEL_SIZE];
    for (i, sample) in samples.iter_mut().enumerate() {
        let direction = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(0.0..1.0));
        let direction = direction.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);
        let t = i as f32 / KERNEL_SIZE as f32;
        let v = direction * rng.gen_range(0.0..1.0) * lerp(0.1, 1.0, t * t);
        *sample = [v.x, v.y, v.z, 0.0];
    }
    SsaoKernel { samples }
}

/// Random rotations around the z axis
pub fn generate_noise(rng: &mut impl Rng) -> [[f32; 4]; (NOISE_DIM * NOISE_DIM) as usize] {
    let mut noise = [[0.0; 4]; (NOISE_DIM * NOISE_DIM) as usize];
    for texel in &mut noise {
        *texel = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0, 1.0];
    }
    noise
}

/// Pack texels as RGBA16F
fn noise_texels(noise: &[[f32; 4]]) -> Vec<f16> {
    noise.iter().flatten().map(|&v| f16::from_f32(v)).collect()
}

/// Ambient occlusion and its blur
pub struct SsaoPass {
    seed: u64,
    render_pass: Option<RenderPass>,
    blur_render_pass: Option<RenderPass>,
    framebuffers: Vec<Framebuffer>,
    blur_framebuffers: Vec<Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    blur_pipeline: Option<GraphicsPipeline>,
    kernel: Option<UniformBuffer<SsaoKernel>>,
    noise: Option<Image>,
    pvm: Vec<UniformBuffer<PvmUniform>>,
    sets: Vec<vk::DescriptorSet>,
    blur_set: vk::DescriptorSet,
}

impl SsaoPass {
    /// Unbuilt pass whose kernel and noise derive from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            render_pass: None,
            blur_render_pass: None,
            framebuffers: Vec::new(),
            blur_framebuffers: Vec::new(),
            pipeline: None,
            blur_pipeline: None,
            kernel: None,
            noise: None,
            pvm: Vec::new(),
            sets: Vec::new(),
            blur_set: vk::DescriptorSet::null(),
        }
    }
}

impl PassNode for SsaoPass {
    fn desc(&self) -> PassDesc {
        PassDesc::new("ssao")
            .reads(&[RenderTargetId::Depth, RenderTargetId::Normal])
            .writes(&[RenderTargetId::Ssao, RenderTargetId::SsaoBlur])
    }

    fn create_render_pass(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let device = ctx.vulkan.device();
        self.render_pass = Some(
            RenderPassBuilder::new()
                .add_color(RenderTargetId::Ssao.format(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .build(device)?,
        );
        self.blur_render_pass = Some(
            RenderPassBuilder::new()
                .add_color(RenderTargetId::SsaoBlur.format(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .build(device)?,
        );
        Ok(())
    }

    fn create_framebuffers(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let device = ctx.vulkan.device();
        let extent = ctx.targets.extent();
        let render_pass = built(&self.render_pass, "SSAO render pass")?;
        let blur_render_pass = built(&self.blur_render_pass, "SSAO blur render pass")?;

        let ssao_view = [ctx.targets[RenderTargetId::Ssao].view()];
        let blur_view = [ctx.targets[RenderTargetId::SsaoBlur].view()];
        let mut framebuffers = Vec::with_capacity(ctx.present.image_count());
        let mut blur_framebuffers = Vec::with_capacity(ctx.present.image_count());
        for _ in 0..ctx.present.image_count() {
            framebuffers.push(Framebuffer::new(device, render_pass, &ssao_view, extent)?);
            blur_framebuffers.push(Framebuffer::new(device, blur_render_pass, &blur_view, extent)?);
        }
        self.framebuffers = framebuffers;
        self.blur_framebuffers = blur_framebuffers;
        Ok(())
    }

    fn create_pipeline(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let device = ctx.vulkan.device();
        let quad = ctx.shaders.spirv("quad.vert");

        let render_pass = built(&self.render_pass, "SSAO render pass")?;
        self.pipeline = Some(
            GraphicsPipelineDesc::fullscreen(&quad, ctx.shaders.spirv("ssao.frag"), render_pass.handle())
                .with_set_layouts(vec![ctx.layouts.ssao.handle()])
                .build(device)?,
        );

        let blur_render_pass = built(&self.blur_render_pass, "SSAO blur render pass")?;
        self.blur_pipeline = Some(
            GraphicsPipelineDesc::fullscreen(&quad, ctx.shaders.spirv("ssao_blur.frag"), blur_render_pass.handle())
                .with_set_layouts(vec![ctx.layouts.ssao_blur.handle()])
                .build(device)?,
        );
        Ok(())
    }

    fn create_uniforms(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let kernel = UniformBuffer::new(ctx.vulkan)?;
        kernel.update(&generate_kernel(&mut rng))?;
        self.kernel = Some(kernel);

        let noise = Image::new(
            ctx.vulkan,
            ImageDesc::color(
                vk::Format::R16G16B16A16_SFLOAT,
                vk::Extent2D {
                    width: NOISE_DIM,
                    height: NOISE_DIM,
                },
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            )
            .with_sampler(vk::Filter::NEAREST, vk::SamplerAddressMode::REPEAT),
        )?;
        let texels = noise_texels(&generate_noise(&mut rng));
        noise.upload(
            ctx.vulkan,
            ctx.command_pool,
            ctx.vulkan.graphics_queue().queue,
            bytemuck::cast_slice(&texels),
        )?;
        self.noise = Some(noise);

        self.pvm = (0..ctx.present.image_count())
            .map(|_| UniformBuffer::new(ctx.vulkan))
            .collect::<VulkanResult<_>>()?;

        let layouts = vec![ctx.layouts.ssao.handle(); ctx.present.image_count()];
        self.sets = ctx.descriptor_pool.allocate_descriptor_sets(&layouts)?;
        self.blur_set = ctx.descriptor_pool.allocate(ctx.layouts.ssao_blur.handle())?;

        log::debug!("SSAO kernel and noise generated from seed {:#x}", self.seed);
        Ok(())
    }

    fn update_descriptor_sets(&mut self, ctx: &BuildContext<'_>) -> VulkanResult<()> {
        let kernel = built(&self.kernel, "SSAO kernel")?;
        let noise = built(&self.noise, "SSAO noise texture")?;

        let mut writer = DescriptorWriter::new();
        for (&set, pvm) in self.sets.iter().zip(&self.pvm) {
            writer = writer
                .image(set, 0, ctx.targets[RenderTargetId::Depth].descriptor_info())
                .image(set, 1, ctx.targets[RenderTargetId::Normal].descriptor_info())
                .image(set, 2, noise.descriptor_info())
                .uniform_buffer(set, 3, kernel.descriptor_info())
                .uniform_buffer(set, 4, pvm.descriptor_info());
        }
        writer
            .image(self.blur_set, 0, ctx.targets[RenderTargetId::Ssao].descriptor_info())
            .update(ctx.vulkan.device());
        Ok(())
    }

    fn prepare(&mut self, frame: &FrameContext<'_>) -> VulkanResult<()> {
        if !frame.effects.contains(EffectFlags::SSAO) {
            return Ok(());
        }
        let pvm = per_image(&self.pvm, frame.image_index, "SSAO uniform")?;
        pvm.update(&PvmUniform {
            projection: frame.camera.projection().to_cols_array(),
            view: frame.camera.view().to_cols_array(),
            inv_projection: frame.camera.inv_projection().to_cols_array(),
        })
    }

    fn draw(&self, recorder: &mut CommandRecorder, frame: &FrameContext<'_>) -> VulkanResult<()> {
        let enabled = frame.effects.contains(EffectFlags::SSAO);
        let clear_values = [clear_color(frame.settings.clear_color)];

        let render_pass = built(&self.render_pass, "SSAO render pass")?;
        let pipeline = built(&self.pipeline, "SSAO pipeline")?;
        let framebuffer = per_image(&self.framebuffers, frame.image_index, "SSAO framebuffer")?;
        let set = *per_image(&self.sets, frame.image_index, "SSAO descriptor set")?;
        {
            let mut pass = recorder.begin_render_pass(
                render_pass.handle(),
                framebuffer.handle(),
                framebuffer.render_area(),
                &clear_values,
            )?;
            if enabled {
                draw_fullscreen(&mut pass, pipeline.handle(), pipeline.layout(), &[set], framebuffer.extent());
            }
        }

        let blur_render_pass = built(&self.blur_render_pass, "SSAO blur render pass")?;
        let blur_pipeline = built(&self.blur_pipeline, "SSAO blur pipeline")?;
        let blur_framebuffer = per_image(&self.blur_framebuffers, frame.image_index, "SSAO blur framebuffer")?;
        let mut pass = recorder.begin_render_pass(
            blur_render_pass.handle(),
            blur_framebuffer.handle(),
            blur_framebuffer.render_area(),
            &clear_values,
        )?;
        if enabled {
            draw_fullscreen(
                &mut pass,
                blur_pipeline.handle(),
                blur_pipeline.layout(),
                &[self.blur_set],
                blur_framebuffer.extent(),
            );
        }
        Ok(())
    }

    fn destroy_size_dependent(&mut self) {
        self.pipeline = None;
        self.blur_pipeline = None;
        self.framebuffers.clear();
        self.blur_framebuffers.clear();
        self.render_pass = None;
        self.blur_render_pass = None;
    }

    fn destroy(&mut self) {
        self.destroy_size_dependent();
        self.pvm.clear();
        self.noise = None;
        self.kernel = None;
        self.sets.clear();
        self.blur_set = vk::DescriptorSet::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_in_upper_hemisphere_and_bounded() {
        let kernel = generate_kernel(&mut StdRng::seed_from_u64(1));
        for sample in kernel.samples {
            let v = Vec3::new(sample[0], sample[1], sample[2]);
            assert!(v.z >= 0.0);
            assert!(v.norm() <= 1.0);
            assert_eq!(sample[3], 0.0);
        }
    }

    #[test]
    fn test_kernel_scale_grows_with_index() {
        // average length over many seeds follows lerp(0.1, 1, t^2)
        let mut first = 0.0;
        let mut last = 0.0;
        for seed in 0..64 {
            let kernel = generate_kernel(&mut StdRng::seed_from_u64(seed));
            let len = |s: [f32; 4]| Vec3::new(s[0], s[1], s[2]).norm();
            first += len(kernel.samples[0]);
            last += len(kernel.samples[KERNEL_SIZE - 1]);
        }
        assert!(last > first * 4.0);
        assert!(first / 64.0 <= 0.1);
    }

    #[test]
    fn test_same_seed_same_kernel() {
        let a = generate_kernel(&mut StdRng::seed_from_u64(42));
        let b = generate_kernel(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_rotates_around_z() {
        let noise = generate_noise(&mut StdRng::seed_from_u64(3));
        assert_eq!(noise.len(), 16);
        for texel in noise {
            assert!((-1.0..1.0).contains(&texel[0]));
            assert!((-1.0..1.0).contains(&texel[1]));
            assert_eq!(texel[2], 0.0);
            assert_eq!(texel[3], 1.0);
        }
    }

    #[test]
    fn test_noise_packs_to_rgba16f() {
        let noise = generate_noise(&mut StdRng::seed_from_u64(3));
        let texels = noise_texels(&noise);
        let bytes: &[u8] = bytemuck::cast_slice(&texels);
        assert_eq!(bytes.len(), 16 * 4 * 2);
        assert_eq!(texels[3].to_f32(), 1.0);
    }
}
