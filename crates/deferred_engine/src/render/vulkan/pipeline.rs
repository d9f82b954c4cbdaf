//! Graphics and compute pipeline creation
//!
//! [`GraphicsPipelineDesc`] collects the fixed-function state that differs
//! between passes. Everything else is shared: triangle lists, single-sample
//! rasterization, dynamic viewport and scissor, entry point `main`.

use ash::{vk, Device};
use std::path::{Path, PathBuf};

use super::shader::{ShaderModule, ENTRY_POINT};
use super::{VulkanError, VulkanResult};

/// Specialization constants as map entries plus packed data
#[derive(Debug, Clone, Default)]
pub struct SpecializationConstants {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

impl SpecializationConstants {
    /// Pack `(constant_id, value)` pairs as consecutive 4-byte values
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_u32s(values: &[(u32, u32)]) -> Self {
        let mut constants = Self::default();
        for &(constant_id, value) in values {
            constants.entries.push(vk::SpecializationMapEntry {
                constant_id,
                offset: constants.data.len() as u32,
                size: std::mem::size_of::<u32>(),
            });
            constants.data.extend_from_slice(&value.to_ne_bytes());
        }
        constants
    }

    /// Map entries
    pub fn entries(&self) -> &[vk::SpecializationMapEntry] {
        &self.entries
    }

    /// Packed constant data
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Depth test configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Write depth
    pub write: bool,
    /// Comparison operator
    pub compare_op: vk::CompareOp,
}

/// Description of a graphics pipeline
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    /// Vertex shader SPIR-V path
    pub vertex_shader: PathBuf,
    /// Fragment shader SPIR-V path
    pub fragment_shader: PathBuf,
    /// Fragment stage specialization
    pub fragment_specialization: Option<SpecializationConstants>,
    /// Vertex input bindings; empty for generated full-screen geometry
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Face culling
    pub cull_mode: vk::CullModeFlags,
    /// Front face winding
    pub front_face: vk::FrontFace,
    /// Depth testing; `None` disables it
    pub depth: Option<DepthState>,
    /// One blend state per color attachment
    pub color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    /// Descriptor set layouts in set order
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Push constant ranges
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    /// Render pass the pipeline is used in
    pub render_pass: vk::RenderPass,
    /// Subpass index
    pub subpass: u32,
}

impl GraphicsPipelineDesc {
    /// Full-screen triangle pipeline with no vertex input, no culling and no depth
    pub fn fullscreen(
        vertex_shader: impl AsRef<Path>,
        fragment_shader: impl AsRef<Path>,
        render_pass: vk::RenderPass,
    ) -> Self {
        Self {
            vertex_shader: vertex_shader.as_ref().to_path_buf(),
            fragment_shader: fragment_shader.as_ref().to_path_buf(),
            fragment_specialization: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth: None,
            color_blend_attachments: vec![opaque_blend_attachment()],
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            render_pass,
            subpass: 0,
        }
    }

    /// Set vertex input
    pub fn with_vertex_input(
        mut self,
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_bindings = bindings;
        self.vertex_attributes = attributes;
        self
    }

    /// Set culling and winding
    pub fn with_cull(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// Enable depth testing
    pub fn with_depth(mut self, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth = Some(DepthState { write, compare_op });
        self
    }

    /// Set per-attachment blend states
    pub fn with_blend_attachments(mut self, attachments: Vec<vk::PipelineColorBlendAttachmentState>) -> Self {
        self.color_blend_attachments = attachments;
        self
    }

    /// Set descriptor set layouts
    pub fn with_set_layouts(mut self, layouts: Vec<vk::DescriptorSetLayout>) -> Self {
        self.set_layouts = layouts;
        self
    }

    /// Add a push constant range at offset 0
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_push_constants(mut self, stages: vk::ShaderStageFlags, size: usize) -> Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags: stages,
            offset: 0,
            size: size as u32,
        });
        self
    }

    /// Specialize the fragment stage
    pub fn with_fragment_specialization(mut self, constants: SpecializationConstants) -> Self {
        self.fragment_specialization = Some(constants);
        self
    }

    /// Create the pipeline and its layout
    pub fn build(&self, device: &Device) -> VulkanResult<GraphicsPipeline> {
        let vertex = ShaderModule::from_file(device.clone(), &self.vertex_shader)?;
        let fragment = ShaderModule::from_file(device.clone(), &self.fragment_shader)?;

        let specialization_info = self.fragment_specialization.as_ref().map(|s| {
            vk::SpecializationInfo::builder()
                .map_entries(s.entries())
                .data(s.data())
                .build()
        });

        let vertex_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex.handle())
            .name(ENTRY_POINT)
            .build();
        let mut fragment_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment.handle())
            .name(ENTRY_POINT);
        if let Some(info) = specialization_info.as_ref() {
            fragment_stage = fragment_stage.specialization_info(info);
        }
        let stages = [vertex_stage, fragment_stage.build()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = match self.depth {
            Some(depth) => vk::PipelineDepthStencilStateCreateInfo::builder()
                .depth_test_enable(true)
                .depth_write_enable(depth.write)
                .depth_compare_op(depth.compare_op),
            None => vk::PipelineDepthStencilStateCreateInfo::builder()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::ALWAYS),
        }
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&self.color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        log::debug!(
            "[SHADER] Graphics pipeline created from {} + {}",
            self.vertex_shader.display(),
            self.fragment_shader.display()
        );

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            layout,
        })
    }
}

/// Blend state that writes RGBA without blending
pub fn opaque_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Compute pipeline wrapper with RAII cleanup
pub struct ComputePipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl ComputePipeline {
    /// Create a compute pipeline from a SPIR-V file
    pub fn new(
        device: &Device,
        shader: impl AsRef<Path>,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        let module = ShaderModule::from_file(device.clone(), shader.as_ref())?;

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module.handle())
            .name(ENTRY_POINT)
            .build();
        let pipeline_info = vk::ComputePipelineCreateInfo::builder().stage(stage).layout(layout);

        let pipelines = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        log::debug!("[SHADER] Compute pipeline created from {}", shader.as_ref().display());
        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
        })
    }

    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialization_packs_consecutive_u32s() {
        let constants = SpecializationConstants::from_u32s(&[(0, 20), (3, 7)]);
        assert_eq!(constants.entries().len(), 2);
        assert_eq!(constants.entries()[0].offset, 0);
        assert_eq!(constants.entries()[1].offset, 4);
        assert_eq!(constants.entries()[1].constant_id, 3);
        assert_eq!(constants.data().len(), 8);
        assert_eq!(&constants.data()[0..4], &20_u32.to_ne_bytes());
    }

    #[test]
    fn test_fullscreen_defaults() {
        let desc = GraphicsPipelineDesc::fullscreen("a.spv", "b.spv", vk::RenderPass::null())
            .with_push_constants(vk::ShaderStageFlags::FRAGMENT, 112);
        assert!(desc.vertex_bindings.is_empty());
        assert!(desc.depth.is_none());
        assert_eq!(desc.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(desc.color_blend_attachments.len(), 1);
        assert_eq!(desc.push_constant_ranges[0].size, 112);
    }
}
