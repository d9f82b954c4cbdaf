//! Vulkan backend
//!
//! RAII wrappers over the raw `ash` objects used by the deferred passes and
//! the compute pool. Every wrapper holds a clone of the logical device and
//! destroys its handle in `Drop`, so the [`VulkanContext`] must outlive them.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod sync;

pub use buffer::{Buffer, UniformBuffer};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::VulkanContext;
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use image::{Image, ImageDesc};
pub use pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineDesc};
pub use render_pass::{Framebuffer, RenderPass, RenderPassBuilder};
pub use shader::ShaderModule;
pub use sync::Fence;

use ash::vk;
use thiserror::Error;

use crate::render::frame_graph::FrameGraphError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// SPIR-V could not be read or was malformed
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Shader file path
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Every compute task is busy and the pool may not grow
    #[error("Compute pool exhausted: all {capacity} tasks in flight")]
    PoolExhausted {
        /// Number of tasks in the pool
        capacity: usize,
    },

    /// Pass declarations are inconsistent
    #[error("Frame graph error: {0}")]
    FrameGraph(#[from] FrameGraphError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
