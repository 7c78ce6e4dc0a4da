//! The two-subpass frame graph: pipelines and command recording.
//!
//! # Overview
//!
//! ```text
//! subpass 0 (geometry)               subpass 1 (composite)
//!   per model, per mesh:               input set (color, depth)
//!     push model matrix                full-screen triangle
//!     bind vertex/index buffers   ──▶  writes the swapchain image
//!     bind uniform + texture set
//!     draw indexed
//!   writes color input + depth
//! ```
//!
//! Shaders are loaded from `{shader_dir}/{geometry,composite}.{vert,frag}.spv`.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use subpass_rhi::RhiResult;
use subpass_rhi::command::CommandBuffer;
use subpass_rhi::device::Device;
use subpass_rhi::pipeline::{ColorBlend, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use subpass_rhi::render_pass::{COMPOSITE_SUBPASS, FrameGraphLayout, GEOMETRY_SUBPASS, RenderPass};
use subpass_rhi::shader::{Shader, ShaderStage};
use subpass_rhi::vertex::Vertex;
use tracing::info;

use crate::attachments::COLOR_INPUT_FORMAT;
use crate::descriptors::DescriptorLayouts;
use crate::mesh::Model;
use crate::texture::TextureCache;
use crate::ubo::ModelPush;

/// Everything one recording needs that changes per swapchain image.
#[derive(Clone, Copy, Debug)]
pub struct FrameTarget {
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub uniform_set: vk::DescriptorSet,
    pub input_set: vk::DescriptorSet,
}

/// Clear values in attachment order: swapchain, color input, depth input.
pub fn clear_values(clear_color: [f32; 4]) -> [vk::ClearValue; 3] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        },
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Push-constant range of the geometry pipeline.
pub fn model_push_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(ModelPush::SIZE)
}

fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

/// Render pass and the pipeline of each subpass.
pub struct RenderGraph {
    geometry_pipeline: Pipeline,
    geometry_layout: PipelineLayout,
    composite_pipeline: Pipeline,
    composite_layout: PipelineLayout,
    render_pass: RenderPass,
    clear_color: [f32; 4],
}

impl RenderGraph {
    /// Builds the render pass and both pipelines.
    ///
    /// # Errors
    ///
    /// Returns an error if a shader cannot be loaded, the dependencies are
    /// incomplete, or any creation fails. All of these are fatal at init.
    pub fn new(
        device: &Arc<Device>,
        layouts: &DescriptorLayouts,
        swapchain_format: vk::Format,
        depth_format: vk::Format,
        shader_dir: &Path,
        clear_color: [f32; 4],
    ) -> RhiResult<Self> {
        let layout = FrameGraphLayout::new(swapchain_format, COLOR_INPUT_FORMAT, depth_format);
        let render_pass = RenderPass::new(device.clone(), &layout)?;

        let geometry_layout =
            PipelineLayout::new(device.clone(), &layouts.geometry(), &[model_push_range()])?;
        let composite_layout = PipelineLayout::new(device.clone(), &layouts.composite(), &[])?;

        let geometry_vert = Shader::load(device.clone(), shader_dir, "geometry", ShaderStage::Vertex)?;
        let geometry_frag =
            Shader::load(device.clone(), shader_dir, "geometry", ShaderStage::Fragment)?;
        let geometry_pipeline = GraphicsPipelineBuilder::new(render_pass.handle(), GEOMETRY_SUBPASS)
            .vertex_shader(&geometry_vert)
            .fragment_shader(&geometry_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_test(true)
            .color_blend(ColorBlend::Alpha)
            .build(device.clone(), &geometry_layout)?;

        let composite_vert =
            Shader::load(device.clone(), shader_dir, "composite", ShaderStage::Vertex)?;
        let composite_frag =
            Shader::load(device.clone(), shader_dir, "composite", ShaderStage::Fragment)?;
        let composite_pipeline =
            GraphicsPipelineBuilder::new(render_pass.handle(), COMPOSITE_SUBPASS)
                .vertex_shader(&composite_vert)
                .fragment_shader(&composite_frag)
                .cull_mode(vk::CullModeFlags::NONE)
                .depth_test(false)
                .color_blend(ColorBlend::Opaque)
                .build(device.clone(), &composite_layout)?;

        info!(
            "Render graph created: swapchain {:?}, depth {:?}",
            swapchain_format, depth_format
        );

        Ok(Self {
            geometry_pipeline,
            geometry_layout,
            composite_pipeline,
            composite_layout,
            render_pass,
            clear_color,
        })
    }

    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Records both subpasses into `cmd`.
    ///
    /// Meshes whose texture index has no descriptor set are drawn with the
    /// default texture.
    ///
    /// # Errors
    ///
    /// Returns an error if resetting, beginning or ending `cmd` fails.
    pub fn record<'a>(
        &self,
        cmd: &CommandBuffer,
        target: &FrameTarget,
        models: impl IntoIterator<Item = &'a Model>,
        textures: &TextureCache,
    ) -> RhiResult<()> {
        cmd.reset()?;
        cmd.begin()?;

        let clear = clear_values(self.clear_color);
        cmd.begin_render_pass(
            self.render_pass.handle(),
            target.framebuffer,
            target.extent,
            &clear,
        );

        let (viewport, scissor) = full_viewport(target.extent);
        cmd.set_viewport(&viewport);
        cmd.set_scissor(&scissor);

        cmd.bind_graphics_pipeline(self.geometry_pipeline.handle());
        let fallback = textures.set(crate::texture::DEFAULT_TEXTURE);
        for model in models {
            let push = ModelPush::new(model.transform());
            for mesh in model.meshes() {
                let Some(texture_set) = textures.set(mesh.texture_index()).or(fallback) else {
                    continue;
                };

                cmd.push_constants(
                    self.geometry_layout.handle(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    &push,
                );
                cmd.bind_vertex_buffers(0, &[mesh.vertex_buffer().handle()], &[0]);
                cmd.bind_index_buffer(mesh.index_buffer().handle(), 0, vk::IndexType::UINT32);
                cmd.bind_descriptor_sets(
                    self.geometry_layout.handle(),
                    0,
                    &[target.uniform_set, texture_set],
                );
                cmd.draw_indexed(mesh.index_count(), 1, 0, 0, 0);
            }
        }

        cmd.next_subpass();

        cmd.bind_graphics_pipeline(self.composite_pipeline.handle());
        cmd.set_viewport(&viewport);
        cmd.set_scissor(&scissor);
        cmd.bind_descriptor_sets(self.composite_layout.handle(), 0, &[target.input_set]);
        cmd.draw(3, 1, 0, 0);

        cmd.end_render_pass();
        cmd.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_values_order() {
        let clear = clear_values([0.25, 0.5, 0.75, 1.0]);
        unsafe {
            assert_eq!(clear[0].color.float32, [0.25, 0.5, 0.75, 1.0]);
            assert_eq!(clear[2].depth_stencil.depth, 1.0);
            assert_eq!(clear[2].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_model_push_range() {
        let range = model_push_range();
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 64);
    }

    #[test]
    fn test_full_viewport() {
        let (viewport, scissor) = full_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(scissor.extent.width, 800);
    }
}
