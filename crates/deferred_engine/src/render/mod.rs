//! Deferred rendering
//!
//! - [`camera`]: view/projection, temporal jitter, frustum culling
//! - [`targets`]: the shared render target table
//! - [`layouts`]: descriptor set layout registry
//! - [`frame_graph`]: pass ordering and validation
//! - [`passes`]: G-buffer, SSAO, SSR, composition, depth of field
//! - [`renderer`]: builds the passes and records them every frame
//! - [`vulkan`]: RAII wrappers over `ash`

pub mod camera;
pub mod frame_graph;
pub mod layouts;
pub mod passes;
pub mod renderer;
pub mod targets;
pub mod vulkan;

pub use camera::{Camera, HaltonSet, JitterPolicy, RelativeDirection, RenderArea, TemporalJitter};
pub use frame_graph::{FrameGraph, FrameGraphError, PassDesc};
pub use layouts::DescriptorLayouts;
pub use passes::{EffectFlags, ExternalSets, GeometrySource, PassNode, PointLight, PresentTarget};
pub use renderer::DeferredRenderer;
pub use targets::{RenderTargetId, RenderTargets};
pub use vulkan::{VulkanContext, VulkanError, VulkanResult};
