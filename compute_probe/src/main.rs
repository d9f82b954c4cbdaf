//! Compute probe
//!
//! Creates a headless Vulkan context, pushes a buffer of integers through the
//! identity compute shader on every task of a pool and checks they come back
//! unchanged.
//!
//! Usage: `compute_probe [settings.toml|settings.ron]`

use deferred_engine::prelude::*;
use thiserror::Error;

/// Workgroup size of `compute.comp`
const LOCAL_SIZE: u32 = 64;

#[derive(Error, Debug)]
enum ProbeError {
    #[error(transparent)]
    Config(#[from] deferred_engine::config::ConfigError),

    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error("task {task}: value {index} came back as {actual}, expected {expected}")]
    Mismatch {
        task: usize,
        index: usize,
        expected: u32,
        actual: u32,
    },
}

fn load_settings() -> Result<EngineSettings, ProbeError> {
    let settings = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading settings from {path}");
            EngineSettings::load_from_file(&path)?
        }
        None => EngineSettings::default(),
    };
    settings.validate()?;
    Ok(settings)
}

fn run() -> Result<(), ProbeError> {
    let settings = load_settings()?;
    let context = VulkanContext::new(&settings.device)?;
    let layouts = DescriptorLayouts::new(context.device())?;
    let mut pool = ComputePool::new(&context, &layouts, &settings.shaders, settings.compute.clone())?;

    let count = settings.compute.input_buffer_size.min(settings.compute.output_buffer_size) as usize
        / std::mem::size_of::<u32>();
    #[allow(clippy::cast_possible_truncation)]
    let groups = (count as u32).div_ceil(LOCAL_SIZE);

    let rounds = settings.compute.initial_tasks + 2;
    let mut dispatched = Vec::with_capacity(rounds);
    for round in 0..rounds {
        let task = match pool.get_next(&context) {
            Ok(task) => task,
            Err(VulkanError::PoolExhausted { capacity }) => {
                log::warn!("Pool exhausted at {capacity} task(s); stopping after {round} dispatches");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        #[allow(clippy::cast_possible_truncation)]
        let input: Vec<u32> = (0..count as u32).map(|i| i.wrapping_mul(round as u32 + 1)).collect();
        task.write_input(&input)?;
        task.dispatch(groups, 1, 1)?;
        dispatched.push((task.id(), input));
    }

    pool.wait_fences()?;

    for (id, expected) in &dispatched {
        let Some(task) = pool.task(*id) else { continue };
        let output: Vec<u32> = task.read_output(expected.len())?;
        if let Some(index) = expected.iter().zip(&output).position(|(e, a)| e != a) {
            return Err(ProbeError::Mismatch {
                task: *id,
                index,
                expected: expected[index],
                actual: output[index],
            });
        }
    }

    log::info!(
        "{} dispatch(es) verified across {} task(s), {} values each",
        dispatched.len(),
        pool.len(),
        count
    );
    context.wait_idle()?;
    Ok(())
}

fn main() {
    deferred_engine::foundation::logging::init_with_level(log::LevelFilter::Info);

    if let Err(e) = run() {
        log::error!("Compute probe failed: {e}");
        std::process::exit(1);
    }
}
