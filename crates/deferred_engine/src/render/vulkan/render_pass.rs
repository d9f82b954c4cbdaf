//! Render pass and framebuffer management
//!
//! Every render pass built here is single-subpass and carries both external
//! dependencies, so consecutive passes in the frame are ordered on the GPU
//! without extra barriers.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Builder for single-subpass render passes
#[derive(Debug, Clone, Default)]
pub struct RenderPassBuilder {
    color_attachments: Vec<vk::AttachmentDescription>,
    depth_attachment: Option<vk::AttachmentDescription>,
}

impl RenderPassBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a color attachment that is cleared and stored
    pub fn add_color(mut self, format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        self.color_attachments.push(
            vk::AttachmentDescription::builder()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(final_layout)
                .build(),
        );
        self
    }

    /// Set the depth attachment; it is cleared and stored so later passes can sample it
    pub fn with_depth(mut self, format: vk::Format) -> Self {
        self.depth_attachment = Some(
            vk::AttachmentDescription::builder()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        );
        self
    }

    /// Number of color attachments
    pub fn color_count(&self) -> usize {
        self.color_attachments.len()
    }

    /// Build the render pass
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self, device: &Device) -> VulkanResult<RenderPass> {
        if self.color_attachments.is_empty() && self.depth_attachment.is_none() {
            return Err(VulkanError::InvalidOperation {
                reason: "Render pass needs at least one attachment".to_string(),
            });
        }

        let mut attachments = self.color_attachments.clone();
        let color_refs: Vec<vk::AttachmentReference> = (0..self.color_attachments.len())
            .map(|i| vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_ref = self.depth_attachment.map(|depth| {
            attachments.push(depth);
            vk::AttachmentReference {
                attachment: (attachments.len() - 1) as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass.build()];
        let dependencies = external_dependencies();

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass(&render_pass_create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!(
            "Render pass created with {} color attachment(s){}",
            self.color_attachments.len(),
            if self.depth_attachment.is_some() { " and depth" } else { "" }
        );

        Ok(RenderPass {
            device: device.clone(),
            render_pass,
            color_count: self.color_attachments.len(),
            has_depth: self.depth_attachment.is_some(),
        })
    }
}

/// EXTERNAL to 0 and 0 to EXTERNAL, covering attachment writes and shader reads
pub fn external_dependencies() -> [vk::SubpassDependency; 2] {
    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    let read_stages = vk::PipelineStageFlags::BOTTOM_OF_PIPE | vk::PipelineStageFlags::FRAGMENT_SHADER;
    let read_access = vk::AccessFlags::MEMORY_READ | vk::AccessFlags::SHADER_READ;

    [
        vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(read_stages | attachment_stages)
            .dst_stage_mask(attachment_stages)
            .src_access_mask(read_access | attachment_access)
            .dst_access_mask(attachment_access)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
        vk::SubpassDependency::builder()
            .src_subpass(0)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(read_stages)
            .src_access_mask(attachment_access)
            .dst_access_mask(read_access)
            .dependency_flags(vk::DependencyFlags::BY_REGION)
            .build(),
    ]
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    color_count: usize,
    has_depth: bool,
}

impl RenderPass {
    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Number of color attachments
    pub fn color_count(&self) -> usize {
        self.color_count
    }

    /// Whether the pass has a depth attachment
    pub fn has_depth(&self) -> bool {
        self.has_depth
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a framebuffer; `attachments` follow the render pass order
    pub fn new(
        device: &Device,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let expected = render_pass.color_count() + usize::from(render_pass.has_depth());
        if attachments.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Framebuffer given {} attachment(s), render pass expects {expected}",
                    attachments.len()
                ),
            });
        }

        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            framebuffer,
            extent,
        })
    }

    /// Framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Framebuffer size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Full render area
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_cover_both_directions() {
        let deps = external_dependencies();
        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[0].dst_subpass, 0);
        assert_eq!(deps[1].src_subpass, 0);
        assert_eq!(deps[1].dst_subpass, vk::SUBPASS_EXTERNAL);
        assert!(deps[1].dst_access_mask.contains(vk::AccessFlags::SHADER_READ));
        assert!(deps[0].dst_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_builder_counts_color_attachments() {
        let builder = RenderPassBuilder::new()
            .add_color(vk::Format::R16G16B16A16_SFLOAT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .add_color(vk::Format::R8G8B8A8_UNORM, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .with_depth(vk::Format::D32_SFLOAT);
        assert_eq!(builder.color_count(), 2);
    }
}
