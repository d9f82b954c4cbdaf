//! Descriptor set layout registry
//!
//! All layouts used by the deferred passes and the compute pool are created
//! here once and destroyed once, when the registry drops. Passes borrow
//! handles; they never own or destroy layouts.

use ash::{vk, Device};

use super::vulkan::{DescriptorSetLayout, DescriptorSetLayoutBuilder, VulkanResult};

const FRAGMENT: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;

fn samplers(builder: DescriptorSetLayoutBuilder, bindings: std::ops::Range<u32>) -> DescriptorSetLayoutBuilder {
    bindings.fold(builder, |b, binding| b.add_combined_image_sampler(binding, FRAGMENT))
}

/// Every descriptor set layout, owned in one place
pub struct DescriptorLayouts {
    /// Composition: depth, normal, albedo, srm, lights UBO, ssaoBlur, ssr, emissive
    pub composition: DescriptorSetLayout,
    /// SSAO: depth, normal, noise, kernel UBO, PVM UBO
    pub ssao: DescriptorSetLayout,
    /// SSAO blur: raw AO
    pub ssao_blur: DescriptorSetLayout,
    /// SSR: albedo, depth, normal, srm, camera UBO
    pub ssr: DescriptorSetLayout,
    /// Depth of field: frame snapshot, depth
    pub dof: DescriptorSetLayout,
    /// Compute: input and output storage buffers
    pub compute: DescriptorSetLayout,
    /// Geometry set 0: per-mesh transform
    pub mesh: DescriptorSetLayout,
    /// Geometry set 1: material textures and factors
    pub primitive: DescriptorSetLayout,
    /// Geometry set 2: per-model matrices
    pub model: DescriptorSetLayout,
    /// One shadow cascade: light matrices and shadow map
    pub shadows: DescriptorSetLayout,
    /// Sky cube map
    pub skybox: DescriptorSetLayout,
}

impl DescriptorLayouts {
    /// Create every layout
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let composition = DescriptorSetLayoutBuilder::new();
        let composition = samplers(composition, 0..4).add_uniform_buffer(4, FRAGMENT);
        let composition = samplers(composition, 5..8).build(device)?;

        let ssao = samplers(DescriptorSetLayoutBuilder::new(), 0..3)
            .add_uniform_buffer(3, FRAGMENT)
            .add_uniform_buffer(4, FRAGMENT)
            .build(device)?;

        let ssao_blur = samplers(DescriptorSetLayoutBuilder::new(), 0..1).build(device)?;

        let ssr = samplers(DescriptorSetLayoutBuilder::new(), 0..4)
            .add_uniform_buffer(4, FRAGMENT)
            .build(device)?;

        let dof = samplers(DescriptorSetLayoutBuilder::new(), 0..2).build(device)?;

        let compute = DescriptorSetLayoutBuilder::new()
            .add_storage_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .add_storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .build(device)?;

        let mesh = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(device)?;

        // base color, metallic-roughness, normal, occlusion, emissive, then factors
        let primitive = samplers(DescriptorSetLayoutBuilder::new(), 0..5)
            .add_uniform_buffer(5, FRAGMENT)
            .build(device)?;

        let model = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(device)?;

        let shadows = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX | FRAGMENT)
            .add_combined_image_sampler(1, FRAGMENT)
            .build(device)?;

        let skybox = samplers(DescriptorSetLayoutBuilder::new(), 0..1).build(device)?;

        log::debug!("Descriptor set layouts created");

        Ok(Self {
            composition,
            ssao,
            ssao_blur,
            ssr,
            dof,
            compute,
            mesh,
            primitive,
            model,
            shadows,
            skybox,
        })
    }

    /// Geometry pass layouts in set order
    pub fn geometry_sets(&self) -> [vk::DescriptorSetLayout; 3] {
        [self.mesh.handle(), self.primitive.handle(), self.model.handle()]
    }

    /// Composition pass layouts in set order
    pub fn composition_sets(&self) -> [vk::DescriptorSetLayout; 5] {
        [
            self.composition.handle(),
            self.shadows.handle(),
            self.shadows.handle(),
            self.shadows.handle(),
            self.skybox.handle(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_helper_assigns_consecutive_bindings() {
        let builder = samplers(DescriptorSetLayoutBuilder::new(), 5..8);
        let bindings: Vec<u32> = builder.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(bindings, vec![5, 6, 7]);
        assert!(builder
            .bindings()
            .iter()
            .all(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }
}
