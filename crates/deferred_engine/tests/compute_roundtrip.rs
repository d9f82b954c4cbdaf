//! Compute pool tests against a real device
//!
//! Need a Vulkan driver and compiled shaders in `target/shaders`:
//! `cargo test -- --ignored`

use deferred_engine::prelude::*;

fn setup(config: ComputePoolConfig) -> (VulkanContext, DescriptorLayouts, ShaderPaths, ComputePoolConfig) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = DeviceConfig {
        enable_validation: false,
        ..DeviceConfig::default()
    };
    let context = VulkanContext::new(&device).expect("Vulkan context");
    let layouts = DescriptorLayouts::new(context.device()).expect("layouts");
    let shaders = ShaderPaths::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../../target/shaders"));
    (context, layouts, shaders, config)
}

#[test]
#[ignore = "requires a Vulkan device"]
fn test_dispatch_copies_input_and_marks_task_ready() {
    let (context, layouts, shaders, config) = setup(ComputePoolConfig::default());
    let mut pool = ComputePool::new(&context, &layouts, &shaders, config).unwrap();

    let input: Vec<u32> = (0..256).collect();
    let task = pool.get_next(&context).unwrap();
    assert!(!task.is_ready());
    task.write_input(&input).unwrap();
    task.dispatch(4, 1, 1).unwrap();
    task.wait_fence().unwrap();

    assert!(task.is_ready());
    let output: Vec<u32> = task.read_output(input.len()).unwrap();
    assert_eq!(output, input);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn test_pool_grows_under_load() {
    let (context, layouts, shaders, config) = setup(ComputePoolConfig::default());
    let mut pool = ComputePool::new(&context, &layouts, &shaders, config).unwrap();
    assert_eq!(pool.len(), 1);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let task = pool.get_next(&context).unwrap();
        task.dispatch(1, 1, 1).unwrap();
        ids.push(task.id());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(pool.len(), 4);

    pool.wait_fences().unwrap();
    assert_eq!(pool.idle_count(), 4);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn test_reject_policy_reports_exhaustion() {
    let config = ComputePoolConfig::default().with_policy(ExhaustionPolicy::Reject);
    let (context, layouts, shaders, config) = setup(config);
    let mut pool = ComputePool::new(&context, &layouts, &shaders, config).unwrap();

    pool.get_next(&context).unwrap().dispatch(1, 1, 1).unwrap();
    assert!(matches!(
        pool.get_next(&context),
        Err(VulkanError::PoolExhausted { capacity: 1 })
    ));

    pool.wait_fences().unwrap();
    assert!(pool.get_next(&context).is_ok());
}

#[test]
#[ignore = "requires a Vulkan device"]
fn test_block_policy_reuses_after_wait() {
    let config = ComputePoolConfig::default().with_policy(ExhaustionPolicy::Block);
    let (context, layouts, shaders, config) = setup(config);
    let mut pool = ComputePool::new(&context, &layouts, &shaders, config).unwrap();

    pool.get_next(&context).unwrap().dispatch(1, 1, 1).unwrap();
    let task = pool.get_next(&context).unwrap();
    assert_eq!(task.id(), 0);
    assert_eq!(pool.len(), 1);
}

#[test]
#[ignore = "requires a Vulkan device"]
fn test_waiting_on_undispatched_tasks_returns() {
    let (context, layouts, shaders, config) = setup(ComputePoolConfig::default());
    let mut pool = ComputePool::new(&context, &layouts, &shaders, config).unwrap();

    let task = pool.get_next(&context).unwrap();
    assert!(!task.is_ready());
    task.wait_fence().unwrap();
    assert!(task.is_ready());

    pool.get_next(&context).unwrap();
    pool.get_next(&context).unwrap();
    pool.wait_fences().unwrap();
    assert_eq!(pool.idle_count(), pool.len());
}

#[test]
#[ignore = "requires a Vulkan device"]
fn test_block_policy_with_undispatched_task_returns() {
    let config = ComputePoolConfig::default().with_policy(ExhaustionPolicy::Block);
    let (context, layouts, shaders, config) = setup(config);
    let mut pool = ComputePool::new(&context, &layouts, &shaders, config).unwrap();

    let first = pool.get_next(&context).unwrap().id();
    let second = pool.get_next(&context).unwrap().id();
    assert_eq!(first, second);
    assert_eq!(pool.len(), 1);

    // a task that waited without dispatching can still dispatch
    let task = pool.get_next(&context).unwrap();
    task.write_input(&[5_u32; 64]).unwrap();
    task.dispatch(1, 1, 1).unwrap();
    task.wait_fence().unwrap();
    assert_eq!(task.read_output::<u32>(64).unwrap(), vec![5_u32; 64]);
}
