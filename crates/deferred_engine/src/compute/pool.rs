//! Pool of reusable compute tasks

use ash::{vk, Device};

use super::task::ComputeTask;
use super::ExhaustionPolicy;
use crate::config::{ComputePoolConfig, ShaderPaths};
use crate::render::layouts::DescriptorLayouts;
use crate::render::vulkan::sync::wait_all;
use crate::render::vulkan::{CommandPool, ComputePipeline, VulkanContext, VulkanError, VulkanResult};

/// What `get_next` should do given the current task states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// Hand out the idle task at this index
    Reuse(usize),
    /// Create a task
    Grow,
    /// Wait for all in-flight tasks, then reuse the first
    WaitAll,
    /// Fail
    Exhausted,
}

/// Pick the first idle task, otherwise apply `policy`
pub(crate) fn next_action(
    ready: impl IntoIterator<Item = bool>,
    len: usize,
    policy: ExhaustionPolicy,
    max_tasks: Option<usize>,
) -> Acquire {
    if let Some(index) = ready.into_iter().position(|r| r) {
        return Acquire::Reuse(index);
    }
    match policy {
        ExhaustionPolicy::Grow if max_tasks.map_or(true, |max| len < max) => Acquire::Grow,
        ExhaustionPolicy::Grow | ExhaustionPolicy::Reject => Acquire::Exhausted,
        ExhaustionPolicy::Block if len > 0 => Acquire::WaitAll,
        ExhaustionPolicy::Block => Acquire::Grow,
    }
}

/// Compute task pool
pub struct ComputePool {
    tasks: Vec<ComputeTask>,
    pipeline: ComputePipeline,
    command_pool: CommandPool,
    set_layout: vk::DescriptorSetLayout,
    device: Device,
    config: ComputePoolConfig,
}

impl ComputePool {
    /// Create the pipeline, command pool and `config.initial_tasks` tasks
    pub fn new(
        context: &VulkanContext,
        layouts: &DescriptorLayouts,
        shaders: &ShaderPaths,
        config: ComputePoolConfig,
    ) -> VulkanResult<Self> {
        let device = context.device();
        let set_layout = layouts.compute.handle();
        let pipeline = ComputePipeline::new(device, shaders.spirv(&config.shader), &[set_layout])?;
        let command_pool = CommandPool::new(
            device.clone(),
            context.compute_queue().family,
            vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let mut pool = Self {
            tasks: Vec::with_capacity(config.initial_tasks),
            pipeline,
            command_pool,
            set_layout,
            device: device.clone(),
            config,
        };
        for _ in 0..pool.config.initial_tasks {
            pool.add_task(context)?;
        }

        log::info!(
            "Compute pool ready: {} task(s), policy {:?}",
            pool.tasks.len(),
            pool.config.policy
        );
        Ok(pool)
    }

    fn add_task(&mut self, context: &VulkanContext) -> VulkanResult<usize> {
        let command_buffer = self
            .command_pool
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Command buffer allocation returned nothing".to_string(),
            })?;
        let id = self.tasks.len();
        self.tasks.push(ComputeTask::new(
            context,
            id,
            &self.config,
            command_buffer,
            self.pipeline.handle(),
            self.pipeline.layout(),
            self.set_layout,
        )?);
        Ok(id)
    }

    /// Take an idle task and mark it busy
    pub fn get_next(&mut self, context: &VulkanContext) -> VulkanResult<&mut ComputeTask> {
        let action = next_action(
            self.tasks.iter().map(ComputeTask::is_ready),
            self.tasks.len(),
            self.config.policy,
            self.config.max_tasks,
        );
        let index = match action {
            Acquire::Reuse(index) => index,
            Acquire::Grow => {
                let index = self.add_task(context)?;
                log::debug!("Compute pool grew to {} task(s)", self.tasks.len());
                index
            }
            Acquire::WaitAll => {
                log::debug!("Compute pool exhausted; waiting for {} task(s)", self.tasks.len());
                self.wait_fences()?;
                0
            }
            Acquire::Exhausted => {
                log::warn!("Compute pool exhausted with {} task(s) in flight", self.tasks.len());
                return Err(VulkanError::PoolExhausted {
                    capacity: self.tasks.len(),
                });
            }
        };

        let task = &mut self.tasks[index];
        task.set_ready(false);
        Ok(task)
    }

    /// Wait on every busy task with one fence wait, then mark all idle
    pub fn wait_fences(&mut self) -> VulkanResult<()> {
        let fences: Vec<vk::Fence> = self
            .tasks
            .iter()
            .filter(|task| !task.is_ready())
            .map(ComputeTask::fence_handle)
            .collect();
        wait_all(&self.device, &fences)?;
        for task in &mut self.tasks {
            task.set_ready(true);
        }
        Ok(())
    }

    /// Task by id
    pub fn task(&self, id: usize) -> Option<&ComputeTask> {
        self.tasks.get(id)
    }

    /// Mutable task by id
    pub fn task_mut(&mut self, id: usize) -> Option<&mut ComputeTask> {
        self.tasks.get_mut(id)
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the pool has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of idle tasks
    pub fn idle_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.is_ready()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mirrors `get_next` over plain ready flags
    fn acquire(ready: &mut Vec<bool>, policy: ExhaustionPolicy, max: Option<usize>) -> Option<usize> {
        let index = match next_action(ready.iter().copied(), ready.len(), policy, max) {
            Acquire::Reuse(i) => i,
            Acquire::Grow => {
                ready.push(true);
                ready.len() - 1
            }
            Acquire::WaitAll => {
                ready.iter_mut().for_each(|r| *r = true);
                0
            }
            Acquire::Exhausted => return None,
        };
        assert!(ready[index], "handed out a busy task");
        ready[index] = false;
        Some(index)
    }

    #[test]
    fn test_first_idle_task_is_reused() {
        assert_eq!(
            next_action([false, true, true], 3, ExhaustionPolicy::Reject, None),
            Acquire::Reuse(1)
        );
    }

    #[test]
    fn test_grow_never_blocks_and_strictly_grows() {
        let mut ready = vec![true];
        let mut last_len = ready.len();
        for _ in 0..32 {
            let index = acquire(&mut ready, ExhaustionPolicy::Grow, None).unwrap();
            assert!(ready.len() >= last_len);
            last_len = ready.len();
            assert_eq!(index, ready.len() - 1);
        }
        assert_eq!(ready.len(), 32);
    }

    #[test]
    fn test_grow_respects_bound() {
        let mut ready = vec![true];
        assert!(acquire(&mut ready, ExhaustionPolicy::Grow, Some(2)).is_some());
        assert!(acquire(&mut ready, ExhaustionPolicy::Grow, Some(2)).is_some());
        assert_eq!(acquire(&mut ready, ExhaustionPolicy::Grow, Some(2)), None);
        assert_eq!(ready.len(), 2);
    }

    #[test]
    fn test_block_waits_then_reuses() {
        let mut ready = vec![false, false];
        assert_eq!(
            next_action(ready.iter().copied(), 2, ExhaustionPolicy::Block, None),
            Acquire::WaitAll
        );
        assert_eq!(acquire(&mut ready, ExhaustionPolicy::Block, None), Some(0));
        assert_eq!(ready, vec![false, true]);
    }

    #[test]
    fn test_block_on_empty_pool_creates_a_task() {
        assert_eq!(next_action([], 0, ExhaustionPolicy::Block, None), Acquire::Grow);
    }

    #[test]
    fn test_reject_fails_when_all_busy() {
        assert_eq!(
            next_action([false, false], 2, ExhaustionPolicy::Reject, None),
            Acquire::Exhausted
        );
    }
}
