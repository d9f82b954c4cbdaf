//! Device-local 2D images with a view and optional sampler

use ash::{vk, Device};

use super::buffer::Buffer;
use super::commands::CommandPool;
use super::sync::{image_barrier, Fence};
use super::{VulkanContext, VulkanError, VulkanResult};

/// Parameters for a single-mip 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Texel format
    pub format: vk::Format,
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// View aspect
    pub aspect: vk::ImageAspectFlags,
    /// Create a sampler with this filter and address mode
    pub sampler: Option<(vk::Filter, vk::SamplerAddressMode)>,
}

impl ImageDesc {
    /// Color image sampled with linear filtering and clamped edges
    pub fn color(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            extent,
            usage,
            aspect: vk::ImageAspectFlags::COLOR,
            sampler: Some((vk::Filter::LINEAR, vk::SamplerAddressMode::CLAMP_TO_EDGE)),
        }
    }

    /// Depth attachment without a sampler
    pub fn depth(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            sampler: None,
        }
    }

    /// Override the sampler
    pub fn with_sampler(mut self, filter: vk::Filter, address_mode: vk::SamplerAddressMode) -> Self {
        self.sampler = Some((filter, address_mode));
        self
    }
}

/// Image, memory, view and sampler owned together
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
    desc: ImageDesc,
}

impl Image {
    /// Create a device-local image
    pub fn new(context: &VulkanContext, desc: ImageDesc) -> VulkanResult<Self> {
        let device = context.device().clone();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create image: {e:?}")))?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index =
            context.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to allocate image memory: {e:?}")))?
        };
        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to bind image memory: {e:?}")))?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create image view: {e:?}")))?
        };

        let sampler = match desc.sampler {
            Some((filter, address_mode)) => {
                let sampler_info = vk::SamplerCreateInfo::builder()
                    .mag_filter(filter)
                    .min_filter(filter)
                    .address_mode_u(address_mode)
                    .address_mode_v(address_mode)
                    .address_mode_w(address_mode)
                    .anisotropy_enable(false)
                    .max_anisotropy(1.0)
                    .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
                    .unnormalized_coordinates(false)
                    .compare_enable(false)
                    .compare_op(vk::CompareOp::ALWAYS)
                    .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
                    .min_lod(0.0)
                    .max_lod(0.0);
                unsafe {
                    device
                        .create_sampler(&sampler_info, None)
                        .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create sampler: {e:?}")))?
                }
            }
            None => vk::Sampler::null(),
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            sampler,
            desc,
        })
    }

    /// Upload tightly packed texel data and leave the image shader-readable
    pub fn upload(
        &self,
        context: &VulkanContext,
        pool: &CommandPool,
        queue: vk::Queue,
        bytes: &[u8],
    ) -> VulkanResult<()> {
        let staging = Buffer::new(
            context,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(0, bytes)?;

        let mut recorder = pool.begin_single_time()?;
        recorder.pipeline_barrier(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            &[image_barrier(
                self.image,
                self.desc.aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            )],
        );
        let region = vk::BufferImageCopy::builder()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: self.desc.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: self.desc.extent.width,
                height: self.desc.extent.height,
                depth: 1,
            })
            .build();
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                recorder.handle(),
                staging.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        recorder.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[image_barrier(
                self.image,
                self.desc.aspect,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            )],
        );
        let command_buffer = recorder.end()?;

        let fence = Fence::new(self.device.clone(), false)?;
        let command_buffers = [command_buffer];
        let submit = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe {
            self.device
                .queue_submit(queue, &[submit], fence.handle())
                .map_err(VulkanError::Api)?;
        }
        fence.wait(u64::MAX)?;
        unsafe {
            self.device.free_command_buffers(pool.handle(), &command_buffers);
        }
        log::debug!(
            "Uploaded {} bytes to {}x{} {:?} image",
            bytes.len(),
            self.desc.extent.width,
            self.desc.extent.height,
            self.desc.format
        );
        Ok(())
    }

    /// Descriptor info for sampling in `SHADER_READ_ONLY_OPTIMAL`
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Sampler handle; null when created without one
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
