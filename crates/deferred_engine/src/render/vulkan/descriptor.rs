//! Descriptor set layouts, pools and writes

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Builder for descriptor set layouts
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Add a storage buffer binding
    pub fn add_storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with RAII cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Bindings the layout was built from
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool wrapper with RAII cleanup
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool sized for `max_sets` sets of mixed samplers and buffers
    pub fn new(device: Device, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(max_sets * 2)
                .build(),
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_sets * 8)
                .build(),
            vk::DescriptorPoolSize::builder()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(max_sets * 2)
                .build(),
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { pool, device })
    }

    /// Allocate one set per layout
    pub fn allocate_descriptor_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Allocate a single set
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        self.allocate_descriptor_sets(&[layout])?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Descriptor set allocation returned nothing".to_string(),
            })
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingWrite {
    Image {
        set: vk::DescriptorSet,
        binding: u32,
        info: vk::DescriptorImageInfo,
    },
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
}

/// Batches descriptor writes and submits them in one update call
///
/// Infos are stored by value; the `vk::WriteDescriptorSet` array pointing into
/// them is only assembled inside [`DescriptorWriter::update`].
#[derive(Debug, Clone, Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a combined image sampler
    pub fn image(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.writes.push(PendingWrite::Image { set, binding, info });
        self
    }

    /// Write a uniform buffer
    pub fn uniform_buffer(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.writes.push(PendingWrite::Buffer {
            set,
            binding,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            info,
        });
        self
    }

    /// Write a storage buffer
    pub fn storage_buffer(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.writes.push(PendingWrite::Buffer {
            set,
            binding,
            ty: vk::DescriptorType::STORAGE_BUFFER,
            info,
        });
        self
    }

    /// Number of pending writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply all pending writes
    pub fn update(self, device: &Device) {
        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = self
            .writes
            .iter()
            .map(|w| match w {
                PendingWrite::Image { info, .. } => [*info],
                PendingWrite::Buffer { .. } => [vk::DescriptorImageInfo::default()],
            })
            .collect();
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = self
            .writes
            .iter()
            .map(|w| match w {
                PendingWrite::Buffer { info, .. } => [*info],
                PendingWrite::Image { .. } => [vk::DescriptorBufferInfo::default()],
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .enumerate()
            .map(|(i, w)| match *w {
                PendingWrite::Image { set, binding, .. } => vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos[i])
                    .build(),
                PendingWrite::Buffer { set, binding, ty, .. } => vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .descriptor_type(ty)
                    .buffer_info(&buffer_infos[i])
                    .build(),
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder_collects_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_storage_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .add_storage_buffer(1, vk::ShaderStageFlags::COMPUTE);
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
    }

    #[test]
    fn test_writer_counts_pending_writes() {
        let set = vk::DescriptorSet::null();
        let writer = DescriptorWriter::new()
            .image(set, 0, vk::DescriptorImageInfo::default())
            .uniform_buffer(set, 4, vk::DescriptorBufferInfo::default());
        assert_eq!(writer.len(), 2);
        assert!(!writer.is_empty());
    }
}
