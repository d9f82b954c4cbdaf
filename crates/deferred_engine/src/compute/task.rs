//! Single reusable compute dispatch

use ash::{vk, Device};
use bytemuck::Pod;

use crate::config::ComputePoolConfig;
use crate::render::vulkan::{Buffer, CommandRecorder, DescriptorPool, DescriptorWriter, Fence, VulkanContext, VulkanError, VulkanResult};

/// Command buffer, fence and storage buffers for one dispatch at a time
pub struct ComputeTask {
    // buffers and the set's pool drop before the device is gone
    input: Buffer,
    output: Buffer,
    fence: Fence,
    _descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    command_buffer: vk::CommandBuffer,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    queue: vk::Queue,
    device: Device,
    id: usize,
    ready: bool,
}

impl ComputeTask {
    /// Create a task with zeroed buffers; it starts idle with a signaled fence
    pub(crate) fn new(
        context: &VulkanContext,
        id: usize,
        config: &ComputePoolConfig,
        command_buffer: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        set_layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();

        let input = Buffer::new_storage(context, config.input_buffer_size)?;
        input.zero()?;
        let output = Buffer::new_storage(context, config.output_buffer_size)?;
        output.zero()?;

        let descriptor_pool = DescriptorPool::new(device.clone(), 1)?;
        let descriptor_set = descriptor_pool.allocate(set_layout)?;
        DescriptorWriter::new()
            .storage_buffer(descriptor_set, 0, input.descriptor_info())
            .storage_buffer(descriptor_set, 1, output.descriptor_info())
            .update(&device);

        let fence = Fence::new(device.clone(), true)?;

        log::debug!(
            "Compute task {id} created ({} B in, {} B out)",
            config.input_buffer_size,
            config.output_buffer_size
        );

        Ok(Self {
            input,
            output,
            fence,
            _descriptor_pool: descriptor_pool,
            descriptor_set,
            command_buffer,
            pipeline,
            pipeline_layout,
            queue: context.compute_queue().queue,
            device,
            id,
            ready: true,
        })
    }

    /// Record and submit a dispatch of `x * y * z` workgroups
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> VulkanResult<()> {
        self.fence.reset()?;

        let mut recorder = CommandRecorder::new(self.command_buffer, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        recorder.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline);
        recorder.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, self.pipeline_layout, &[self.descriptor_set]);
        recorder.dispatch(x, y, z);
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], self.fence.handle())
                .map_err(VulkanError::Api)?;
        }

        self.ready = false;
        log::trace!("Compute task {} dispatched {x}x{y}x{z}", self.id);
        Ok(())
    }

    /// Block until the last dispatch finished, then mark the task idle
    pub fn wait_fence(&mut self) -> VulkanResult<()> {
        self.fence.wait(u64::MAX)?;
        self.ready = true;
        Ok(())
    }

    /// Copy `data` to the start of the input buffer
    pub fn write_input<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.input.write_data(0, data)
    }

    /// Read `count` values from the start of the output buffer
    pub fn read_output<T: Pod>(&self, count: usize) -> VulkanResult<Vec<T>> {
        self.output.read_data(0, count)
    }

    /// Input storage buffer (binding 0)
    pub fn input(&self) -> &Buffer {
        &self.input
    }

    /// Output storage buffer (binding 1)
    pub fn output(&self) -> &Buffer {
        &self.output
    }

    /// Index of the task within its pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the task is idle
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub(crate) fn fence_handle(&self) -> vk::Fence {
        self.fence.handle()
    }
}
