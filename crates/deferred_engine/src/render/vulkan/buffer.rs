//! Buffer management for storage and uniform data
//!
//! Each [`Buffer`] owns one `VkBuffer` and its own memory allocation. Host
//! access maps for the duration of a single read or write.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;
use std::mem;

use super::{VulkanContext, VulkanError, VulkanResult};

/// GPU buffer wrapper with automatic memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = match context.find_memory_type(requirements.memory_type_bits, properties) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        log::trace!("Created buffer of {} bytes ({:?})", size, usage);
        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Host-visible, coherent storage buffer
    pub fn new_storage(context: &VulkanContext, size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            context,
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<()> {
        if offset + len as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Access of {len} bytes at offset {offset} exceeds buffer size {}",
                    self.size
                ),
            });
        }
        Ok(())
    }

    /// Copy `data` into the buffer at byte `offset`
    pub fn write_data<T: Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.check_range(offset, bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Read `count` elements starting at byte `offset`
    pub fn read_data<T: Pod>(&self, offset: vk::DeviceSize, count: usize) -> VulkanResult<Vec<T>> {
        let mut out = vec![T::zeroed(); count];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut out);
        self.check_range(offset, bytes.len())?;
        if bytes.is_empty() {
            return Ok(out);
        }
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    /// Fill the whole buffer with zeros
    #[allow(clippy::cast_possible_truncation)]
    pub fn zero(&self) -> VulkanResult<()> {
        self.write_data(0, &vec![0_u8; self.size as usize])
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Host-visible uniform buffer holding exactly one `T`
pub struct UniformBuffer<T: Pod> {
    buffer: Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod + Zeroable> UniformBuffer<T> {
    /// Create a zero-initialized uniform buffer
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_data(0, &[T::zeroed()])?;
        Ok(Self {
            buffer,
            _marker: PhantomData,
        })
    }

    /// Overwrite the contents
    pub fn update(&self, value: &T) -> VulkanResult<()> {
        self.buffer.write_data(0, std::slice::from_ref(value))
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.buffer.descriptor_info()
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}
