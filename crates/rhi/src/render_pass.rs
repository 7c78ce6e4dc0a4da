//! The two-subpass render pass used by every frame.
//!
//! # Overview
//!
//! | attachment | image | load / store | layouts |
//! |---|---|---|---|
//! | 0 | swapchain image | CLEAR / STORE | UNDEFINED → PRESENT_SRC_KHR |
//! | 1 | per-image color | CLEAR / DONT_CARE | UNDEFINED → COLOR_ATTACHMENT_OPTIMAL |
//! | 2 | per-image depth | CLEAR / DONT_CARE | UNDEFINED → DEPTH_STENCIL_ATTACHMENT_OPTIMAL |
//!
//! Subpass 0 (geometry) writes attachment 1 as color and 2 as depth.
//! Subpass 1 (composite) reads 1 and 2 as input attachments and writes 0.
//!
//! Three dependencies order the work: external → 0, 0 → 1 and 1 → external.
//! [`FrameGraphLayout`] is built without a device so the description can be
//! checked in isolation; [`validate_dependencies`] refuses a description
//! missing any of the three edges.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Attachment index of the presented swapchain image.
pub const SWAPCHAIN_ATTACHMENT: u32 = 0;
/// Attachment index of the color image written by the geometry subpass.
pub const COLOR_INPUT_ATTACHMENT: u32 = 1;
/// Attachment index of the depth image written by the geometry subpass.
pub const DEPTH_INPUT_ATTACHMENT: u32 = 2;

/// Index of the geometry subpass.
pub const GEOMETRY_SUBPASS: u32 = 0;
/// Index of the composite subpass.
pub const COMPOSITE_SUBPASS: u32 = 1;

/// Dependency edges every frame graph must declare, as `(src, dst)`.
pub const REQUIRED_DEPENDENCIES: [(u32, u32); 3] = [
    (vk::SUBPASS_EXTERNAL, GEOMETRY_SUBPASS),
    (GEOMETRY_SUBPASS, COMPOSITE_SUBPASS),
    (COMPOSITE_SUBPASS, vk::SUBPASS_EXTERNAL),
];

/// Attachments and dependencies of the frame render pass.
#[derive(Clone, Debug)]
pub struct FrameGraphLayout {
    /// Attachment descriptions, indexed by the `*_ATTACHMENT` constants.
    pub attachments: [vk::AttachmentDescription; 3],
    /// Subpass dependencies in declaration order.
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl FrameGraphLayout {
    /// Describes the render pass for the given attachment formats.
    pub fn new(
        swapchain_format: vk::Format,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Self {
        let swapchain = vk::AttachmentDescription::default()
            .format(swapchain_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let color = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth = vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        Self {
            attachments: [swapchain, color, depth],
            dependencies: default_dependencies().to_vec(),
        }
    }
}

/// The three dependencies of the frame graph.
pub fn default_dependencies() -> [vk::SubpassDependency; 3] {
    // Swapchain image may still be read by presentation; depth may still be
    // written by the previous use of this image index.
    let external_to_geometry = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(GEOMETRY_SUBPASS)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let geometry_to_composite = vk::SubpassDependency::default()
        .src_subpass(GEOMETRY_SUBPASS)
        .dst_subpass(COMPOSITE_SUBPASS)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
        .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
        .dependency_flags(vk::DependencyFlags::BY_REGION);

    let composite_to_external = vk::SubpassDependency::default()
        .src_subpass(COMPOSITE_SUBPASS)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        .dst_access_mask(vk::AccessFlags::empty());

    [
        external_to_geometry,
        geometry_to_composite,
        composite_to_external,
    ]
}

/// Checks that every edge in [`REQUIRED_DEPENDENCIES`] is declared.
///
/// # Errors
///
/// Returns [`RhiError::PipelineError`] naming the first missing edge, or
/// an edge whose stage masks are empty.
pub fn validate_dependencies(dependencies: &[vk::SubpassDependency]) -> RhiResult<()> {
    for (src, dst) in REQUIRED_DEPENDENCIES {
        let found = dependencies
            .iter()
            .find(|d| d.src_subpass == src && d.dst_subpass == dst);

        match found {
            None => {
                return Err(RhiError::PipelineError(format!(
                    "Missing subpass dependency {} -> {}",
                    subpass_name(src),
                    subpass_name(dst)
                )));
            }
            Some(d) if d.src_stage_mask.is_empty() || d.dst_stage_mask.is_empty() => {
                return Err(RhiError::PipelineError(format!(
                    "Subpass dependency {} -> {} has an empty stage mask",
                    subpass_name(src),
                    subpass_name(dst)
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn subpass_name(index: u32) -> String {
    if index == vk::SUBPASS_EXTERNAL {
        "EXTERNAL".to_string()
    } else {
        index.to_string()
    }
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Creates the render pass from a validated layout.
    ///
    /// # Errors
    ///
    /// Returns an error if a required dependency is missing or creation fails.
    pub fn new(device: Arc<Device>, layout: &FrameGraphLayout) -> RhiResult<Self> {
        validate_dependencies(&layout.dependencies)?;

        let geometry_color = [vk::AttachmentReference::default()
            .attachment(COLOR_INPUT_ATTACHMENT)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let geometry_depth = vk::AttachmentReference::default()
            .attachment(DEPTH_INPUT_ATTACHMENT)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let composite_color = [vk::AttachmentReference::default()
            .attachment(SWAPCHAIN_ATTACHMENT)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let composite_inputs = [
            vk::AttachmentReference::default()
                .attachment(COLOR_INPUT_ATTACHMENT)
                .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::AttachmentReference::default()
                .attachment(DEPTH_INPUT_ATTACHMENT)
                .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ];

        let subpasses = [
            vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&geometry_color)
                .depth_stencil_attachment(&geometry_depth),
            vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&composite_color)
                .input_attachments(&composite_inputs),
        ];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&layout.attachments)
            .subpasses(&subpasses)
            .dependencies(&layout.dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Created render pass: {} attachments, {} subpasses, {} dependencies",
            layout.attachments.len(),
            subpasses.len(),
            layout.dependencies.len()
        );

        Ok(Self {
            device,
            render_pass,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> FrameGraphLayout {
        FrameGraphLayout::new(
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::D32_SFLOAT,
        )
    }

    #[test]
    fn test_default_dependencies_are_valid() {
        assert!(validate_dependencies(&layout().dependencies).is_ok());
    }

    #[test]
    fn test_removing_any_dependency_is_rejected() {
        for removed in 0..3 {
            let mut deps = layout().dependencies;
            deps.remove(removed);
            let err = validate_dependencies(&deps).unwrap_err();
            assert!(matches!(err, RhiError::PipelineError(_)), "edge {removed}");
        }
    }

    #[test]
    fn test_empty_stage_mask_is_rejected() {
        let mut deps = layout().dependencies;
        deps[1].dst_stage_mask = vk::PipelineStageFlags::empty();
        assert!(validate_dependencies(&deps).is_err());
    }

    #[test]
    fn test_composite_waits_for_geometry_writes() {
        let deps = default_dependencies();
        let edge = deps[1];
        assert_eq!(edge.src_subpass, GEOMETRY_SUBPASS);
        assert_eq!(edge.dst_subpass, COMPOSITE_SUBPASS);
        assert!(edge.src_access_mask.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(edge.dst_access_mask, vk::AccessFlags::INPUT_ATTACHMENT_READ);
        assert_eq!(edge.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_attachment_layouts() {
        let l = layout();
        let swapchain = l.attachments[SWAPCHAIN_ATTACHMENT as usize];
        assert_eq!(swapchain.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(swapchain.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let color = l.attachments[COLOR_INPUT_ATTACHMENT as usize];
        assert_eq!(color.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth = l.attachments[DEPTH_INPUT_ATTACHMENT as usize];
        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_every_attachment_is_cleared() {
        for attachment in layout().attachments {
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        }
    }
}
