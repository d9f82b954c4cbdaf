//! Compute dispatch pool
//!
//! A [`ComputePool`] hands out [`ComputeTask`]s: a command buffer, a fence,
//! an input and an output storage buffer bound to the compute shader at
//! bindings 0 and 1. Tasks are reused once their fence has been waited on.
//! What happens when every task is in flight is set by [`ExhaustionPolicy`].

pub mod pool;
pub mod task;

pub use pool::ComputePool;
pub use task::ComputeTask;

use serde::{Deserialize, Serialize};

/// Behaviour of [`ComputePool::get_next`] when no task is idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExhaustionPolicy {
    /// Create a new task, up to the configured maximum
    #[default]
    Grow,
    /// Wait for every in-flight task, then reuse one
    Block,
    /// Fail with [`VulkanError::PoolExhausted`](crate::render::vulkan::VulkanError::PoolExhausted)
    Reject,
}
