//! Render target table
//!
//! Every image a pass reads or writes lives here, keyed by [`RenderTargetId`].
//! The table is built in one go and rebuilt in one go on resize, so a lookup
//! by id can never miss.

use ash::vk;
use std::fmt;
use std::ops::Index;

use super::vulkan::pipeline::opaque_blend_attachment;
use super::vulkan::{Image, ImageDesc, VulkanContext, VulkanResult};

/// Identifier of a shared render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderTargetId {
    /// Linear depth written as color by the geometry pass
    Depth,
    /// World-space normals
    Normal,
    /// Base color
    Albedo,
    /// Specular, roughness, metallic
    Srm,
    /// Screen-space motion vectors
    Velocity,
    /// Emissive color
    Emissive,
    /// Raw ambient occlusion
    Ssao,
    /// Blurred ambient occlusion
    SsaoBlur,
    /// Screen-space reflections
    Ssr,
    /// Lit scene color
    Composition,
    /// Final image after depth of field
    Viewport,
}

impl RenderTargetId {
    /// Every id in table order
    pub const ALL: [RenderTargetId; 11] = [
        RenderTargetId::Depth,
        RenderTargetId::Normal,
        RenderTargetId::Albedo,
        RenderTargetId::Srm,
        RenderTargetId::Velocity,
        RenderTargetId::Emissive,
        RenderTargetId::Ssao,
        RenderTargetId::SsaoBlur,
        RenderTargetId::Ssr,
        RenderTargetId::Composition,
        RenderTargetId::Viewport,
    ];

    /// Number of targets
    pub const COUNT: usize = Self::ALL.len();

    /// Legacy string key
    pub fn name(self) -> &'static str {
        match self {
            RenderTargetId::Depth => "depth",
            RenderTargetId::Normal => "normal",
            RenderTargetId::Albedo => "albedo",
            RenderTargetId::Srm => "srm",
            RenderTargetId::Velocity => "velocity",
            RenderTargetId::Emissive => "emissive",
            RenderTargetId::Ssao => "ssao",
            RenderTargetId::SsaoBlur => "ssaoBlur",
            RenderTargetId::Ssr => "ssr",
            RenderTargetId::Composition => "composition",
            RenderTargetId::Viewport => "viewport",
        }
    }

    /// Look an id up by its legacy key
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    /// Texel format
    pub fn format(self) -> vk::Format {
        match self {
            RenderTargetId::Depth => vk::Format::R32_SFLOAT,
            RenderTargetId::Normal => vk::Format::R32G32B32A32_SFLOAT,
            RenderTargetId::Velocity => vk::Format::R16G16_SFLOAT,
            RenderTargetId::Ssao | RenderTargetId::SsaoBlur => vk::Format::R16_UNORM,
            RenderTargetId::Albedo
            | RenderTargetId::Srm
            | RenderTargetId::Emissive
            | RenderTargetId::Ssr
            | RenderTargetId::Composition
            | RenderTargetId::Viewport => vk::Format::R8G8B8A8_UNORM,
        }
    }

    /// Image usage; every target is rendered to and sampled
    ///
    /// Composition is copied out for depth of field, and viewport receives
    /// that copy directly when depth of field is off.
    pub fn usage(self) -> vk::ImageUsageFlags {
        let base = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        match self {
            RenderTargetId::Composition => base | vk::ImageUsageFlags::TRANSFER_SRC,
            RenderTargetId::Viewport => base | vk::ImageUsageFlags::TRANSFER_DST,
            _ => base,
        }
    }

    /// Blend state used when the target is a color attachment
    pub fn blend_attachment(self) -> vk::PipelineColorBlendAttachmentState {
        opaque_blend_attachment()
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RenderTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format of the hardware depth buffer used by the geometry pass
pub const DEPTH_BUFFER_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Size of every render target for a swapchain extent and scale
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn scaled_extent(extent: vk::Extent2D, scale: f32) -> vk::Extent2D {
    vk::Extent2D {
        width: ((extent.width as f32 * scale) as u32).max(1),
        height: ((extent.height as f32 * scale) as u32).max(1),
    }
}

/// Owned set of render targets plus the geometry depth buffer
pub struct RenderTargets {
    images: Vec<Image>,
    depth_buffer: Image,
    extent: vk::Extent2D,
}

impl RenderTargets {
    /// Create every target at `extent`
    pub fn new(context: &VulkanContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let images = RenderTargetId::ALL
            .iter()
            .map(|&id| Image::new(context, ImageDesc::color(id.format(), extent, id.usage())))
            .collect::<VulkanResult<Vec<_>>>()?;
        let depth_buffer = Image::new(context, ImageDesc::depth(DEPTH_BUFFER_FORMAT, extent))?;

        log::info!(
            "Created {} render targets at {}x{}",
            images.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            images,
            depth_buffer,
            extent,
        })
    }

    /// Drop every target and create them again at `extent`
    pub fn recreate(&mut self, context: &VulkanContext, extent: vk::Extent2D) -> VulkanResult<()> {
        *self = Self::new(context, extent)?;
        Ok(())
    }

    /// Hardware depth buffer
    pub fn depth_buffer(&self) -> &Image {
        &self.depth_buffer
    }

    /// Shared extent of all targets
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Iterate `(id, image)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (RenderTargetId, &Image)> {
        RenderTargetId::ALL.iter().copied().zip(self.images.iter())
    }
}

impl Index<RenderTargetId> for RenderTargets {
    type Output = Image;

    fn index(&self, id: RenderTargetId) -> &Image {
        &self.images[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in RenderTargetId::ALL {
            assert_eq!(RenderTargetId::from_name(id.name()), Some(id));
        }
        assert_eq!(RenderTargetId::from_name("ssaoBlur"), Some(RenderTargetId::SsaoBlur));
        assert_eq!(RenderTargetId::from_name("missing"), None);
    }

    #[test]
    fn test_table_order_matches_discriminants() {
        for (i, id) in RenderTargetId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
        assert_eq!(RenderTargetId::COUNT, 11);
    }

    #[test]
    fn test_only_composition_is_copy_source() {
        for id in RenderTargetId::ALL {
            let copyable = id.usage().contains(vk::ImageUsageFlags::TRANSFER_SRC);
            assert_eq!(copyable, id == RenderTargetId::Composition);
        }
    }

    #[test]
    fn test_scaled_extent_never_zero() {
        let extent = vk::Extent2D { width: 1280, height: 720 };
        assert_eq!(scaled_extent(extent, 0.5), vk::Extent2D { width: 640, height: 360 });
        assert_eq!(scaled_extent(vk::Extent2D { width: 1, height: 1 }, 0.25).width, 1);
    }
}
