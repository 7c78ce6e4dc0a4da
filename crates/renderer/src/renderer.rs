//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`], which owns every Vulkan object and
//! exposes the engine API: [`Renderer::new`], [`Renderer::load_model`],
//! [`Renderer::update_transform`], [`Renderer::render_frame`] and
//! [`Renderer::shutdown`].
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order, after `Drop` has waited for the device
//! to go idle:
//! 1. Models, textures and per-image descriptors
//! 2. Framebuffers, then attachments
//! 3. Render graph and descriptor layouts
//! 4. Frame pool and transfer pool
//! 5. Swapchain
//! 6. Device (last `Arc`), surface, instance

use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use subpass_core::EngineConfig;
use subpass_platform::{Surface, Window};
use subpass_resources::MeshData;
use subpass_rhi::RhiResult;
use subpass_rhi::device::Device;
use subpass_rhi::framebuffer::Framebuffer;
use subpass_rhi::instance::Instance;
use subpass_rhi::physical_device::select_physical_device;
use subpass_rhi::swapchain::Swapchain;
use subpass_rhi::transfer::TransferContext;
use tracing::{debug, error, info, warn};

use crate::attachments::{AttachmentSet, negotiate_depth_format};
use crate::descriptors::{DescriptorLayouts, PerImageDescriptors};
use crate::error::{RendererError, RendererResult};
use crate::frame_pool::FramePool;
use crate::mesh::{Mesh, Model, ModelHandle, ModelList, validate_model};
use crate::render_graph::{FrameTarget, RenderGraph};
use crate::schedule::{Acquired, FrameBackend, FrameSchedule, TickOutcome};
use crate::texture::TextureCache;
use crate::ubo::{CameraParams, UboViewProjection};

/// Owns the device, the swapchain and everything drawn into it.
///
/// # Thread Safety
///
/// All methods must be called from one thread. The renderer never blocks
/// except on fences, on transfers inside [`Renderer::load_model`], and on
/// device idle during swapchain recreation and shutdown.
pub struct Renderer {
    models: ModelList,
    textures: TextureCache,
    per_image: PerImageDescriptors,
    framebuffers: Vec<Framebuffer>,
    // Read through the framebuffers and input sets.
    _attachments: Vec<AttachmentSet>,
    render_graph: RenderGraph,
    layouts: DescriptorLayouts,
    frames: FramePool,
    transfer: TransferContext,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,

    schedule: FrameSchedule,
    camera: CameraParams,
    depth_format: vk::Format,
    fence_timeout_ns: u64,
    window_extent: vk::Extent2D,
    needs_recreate: bool,
}

impl Renderer {
    /// Creates the device, swapchain, render graph and frame pool for
    /// `window`.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Config`] if `config` fails validation, and
    /// [`RendererError::Init`] for a missing capability or any creation
    /// failure, including shader loading.
    pub fn new(window: &Window, config: &EngineConfig) -> RendererResult<Self> {
        config.validate()?;
        let window_extent = window.framebuffer_extent();
        info!(
            "Initializing renderer ({}x{}, {} frames in flight)",
            window_extent.width, window_extent.height, config.frames_in_flight
        );

        let instance = Instance::new(config.enable_validation).map_err(RendererError::Init)?;
        debug!("Validation layers active: {}", instance.has_validation());
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())
                .map_err(RendererError::Init)?;
        let device = Device::new(&instance, &physical_device_info).map_err(RendererError::Init)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), window_extent)
            .map_err(RendererError::Init)?;
        let transfer = TransferContext::new(device.clone()).map_err(RendererError::Init)?;
        let frames =
            FramePool::new(device.clone(), config.frames_in_flight).map_err(RendererError::Init)?;

        let depth_format = negotiate_depth_format(&device).map_err(RendererError::Init)?;
        let layouts = DescriptorLayouts::new(&device).map_err(RendererError::Init)?;
        let render_graph = RenderGraph::new(
            &device,
            &layouts,
            swapchain.format(),
            depth_format,
            &config.shader_dir,
            config.clear_color,
        )
        .map_err(RendererError::Init)?;

        let (attachments, per_image, framebuffers) =
            build_per_image(&device, &swapchain, &render_graph, &layouts, depth_format)
                .map_err(RendererError::Init)?;

        let textures =
            TextureCache::new(device.clone(), &transfer, layouts.texture(), config.max_textures)?;

        let schedule = FrameSchedule::new(frames.len(), swapchain.image_count());

        info!(
            "Renderer initialized: {} swapchain images, {:?} present mode",
            swapchain.image_count(),
            swapchain.present_mode()
        );

        Ok(Self {
            models: ModelList::default(),
            textures,
            per_image,
            framebuffers,
            _attachments: attachments,
            render_graph,
            layouts,
            frames,
            transfer,
            swapchain,
            device,
            surface,
            instance,
            schedule,
            camera: CameraParams::default(),
            depth_format,
            fence_timeout_ns: config.fence_timeout_ns,
            window_extent,
            needs_recreate: false,
        })
    }

    /// Uploads the meshes of one model and returns its handle.
    ///
    /// Each mesh's texture is resolved through the cache; meshes without one
    /// use the default white texture. Blocks until the transfers finish.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidMesh`] for an empty slice or bad index
    /// data, checked before anything is uploaded;
    /// [`RendererError::TextureLimitExceeded`] when the texture pool is full,
    /// and [`RendererError::OutOfDeviceMemory`] when an allocation fails. On
    /// error no model is registered.
    pub fn load_model(&mut self, meshes: &[MeshData]) -> RendererResult<ModelHandle> {
        validate_model(meshes)?;

        let mut uploaded = Vec::with_capacity(meshes.len());
        for data in meshes {
            let texture_index = self.textures.resolve(&self.transfer, data.texture.as_ref())?;
            uploaded.push(Mesh::upload(&self.transfer, data, texture_index)?);
        }

        let handle = self.models.insert(Model::new(uploaded));
        info!(
            "Loaded model {} with {} mesh(es)",
            handle.index(),
            meshes.len()
        );
        Ok(handle)
    }

    /// Sets the model matrix used for every mesh of `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::UnknownModel`] if `handle` was not issued by
    /// this renderer.
    pub fn update_transform(&mut self, handle: ModelHandle, transform: Mat4) -> RendererResult<()> {
        self.models.get_mut(handle)?.set_transform(transform);
        Ok(())
    }

    pub fn set_camera(&mut self, camera: CameraParams) {
        self.camera = camera;
    }

    /// Records the new window size; the swapchain is rebuilt on the next
    /// frame. A zero dimension pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent != self.window_extent {
            debug!(
                "Resize: {}x{} -> {}x{}",
                self.window_extent.width, self.window_extent.height, width, height
            );
            self.window_extent = extent;
            self.needs_recreate = true;
        }
    }

    /// Renders and presents one frame.
    ///
    /// Does nothing while the window has zero size. An out-of-date or
    /// suboptimal swapchain is rebuilt; that frame is then skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Frame`] if a fence wait, acquire, submit or
    /// present fails. These are fatal.
    pub fn render_frame(&mut self) -> RendererResult<()> {
        if self.window_extent.width == 0 || self.window_extent.height == 0 {
            return Ok(());
        }
        if self.needs_recreate {
            self.recreate_swapchain()?;
        }

        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut backend = VulkanFrame {
            device: &self.device,
            swapchain: &self.swapchain,
            frames: &self.frames,
            per_image: &self.per_image,
            framebuffers: &self.framebuffers,
            render_graph: &self.render_graph,
            models: &self.models,
            textures: &self.textures,
            ubo: UboViewProjection::from_camera(&self.camera, aspect),
            fence_timeout_ns: self.fence_timeout_ns,
        };

        match self.schedule.tick(&mut backend)? {
            TickOutcome::Presented { recreate, .. } => {
                if recreate {
                    debug!("Swapchain suboptimal, recreating");
                    self.needs_recreate = true;
                }
            }
            TickOutcome::OutOfDate => {
                warn!("Swapchain out of date, recreating");
                self.recreate_swapchain()?;
            }
        }
        Ok(())
    }

    /// Waits for the device to finish all submitted work.
    ///
    /// Resources are released when the renderer is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn shutdown(&self) -> RendererResult<()> {
        info!("Renderer shutting down");
        self.device.wait_idle().map_err(RendererError::Frame)
    }

    fn recreate_swapchain(&mut self) -> RendererResult<()> {
        self.device.wait_idle().map_err(RendererError::Frame)?;

        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.window_extent)
            .map_err(RendererError::Frame)?;

        self.framebuffers.clear();
        let (attachments, per_image, framebuffers) = build_per_image(
            &self.device,
            &self.swapchain,
            &self.render_graph,
            &self.layouts,
            self.depth_format,
        )
        .map_err(RendererError::Frame)?;
        self.per_image = per_image;
        self._attachments = attachments;
        self.framebuffers = framebuffers;

        self.frames
            .reset_semaphores(&self.device)
            .map_err(RendererError::Frame)?;
        self.schedule.reset_images(self.swapchain.image_count());
        self.needs_recreate = false;
        Ok(())
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.schedule.frames_in_flight()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Number of frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.schedule.frame_number()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        info!("Renderer destroyed after {} frames", self.schedule.frame_number());
    }
}

type PerImage = (Vec<AttachmentSet>, PerImageDescriptors, Vec<Framebuffer>);

/// Attachments, descriptor sets and framebuffers for every swapchain image.
fn build_per_image(
    device: &Arc<Device>,
    swapchain: &Swapchain,
    render_graph: &RenderGraph,
    layouts: &DescriptorLayouts,
    depth_format: vk::Format,
) -> RhiResult<PerImage> {
    let extent = swapchain.extent();
    let attachments =
        AttachmentSet::for_images(device, swapchain.image_count(), extent, depth_format)?;
    let per_image = PerImageDescriptors::new(device, layouts, &attachments)?;

    let framebuffers = swapchain
        .image_views()
        .iter()
        .zip(&attachments)
        .map(|(&view, set)| {
            Framebuffer::new(
                device.clone(),
                render_graph.render_pass(),
                &set.framebuffer_views(view),
                extent,
            )
        })
        .collect::<RhiResult<Vec<_>>>()?;

    Ok((attachments, per_image, framebuffers))
}

/// Vulkan side of one tick, borrowing the renderer's resources.
struct VulkanFrame<'a> {
    device: &'a Arc<Device>,
    swapchain: &'a Swapchain,
    frames: &'a FramePool,
    per_image: &'a PerImageDescriptors,
    framebuffers: &'a [Framebuffer],
    render_graph: &'a RenderGraph,
    models: &'a ModelList,
    textures: &'a TextureCache,
    ubo: UboViewProjection,
    fence_timeout_ns: u64,
}

impl VulkanFrame<'_> {
    fn context(&self, index: usize) -> RendererResult<&crate::frame_pool::FrameContext> {
        self.frames.get(index).ok_or_else(|| {
            RendererError::Frame(subpass_rhi::RhiError::InvalidHandle(format!(
                "No frame context {}",
                index
            )))
        })
    }

    fn target(&self, image_index: u32) -> RendererResult<FrameTarget> {
        let i = image_index as usize;
        let missing = || {
            RendererError::Frame(subpass_rhi::RhiError::InvalidHandle(format!(
                "No per-image resources for image {}",
                image_index
            )))
        };
        let framebuffer = self.framebuffers.get(i).ok_or_else(missing)?;
        Ok(FrameTarget {
            framebuffer: framebuffer.handle(),
            extent: framebuffer.extent(),
            uniform_set: self.per_image.uniform_set(i).ok_or_else(missing)?,
            input_set: self.per_image.input_set(i).ok_or_else(missing)?,
        })
    }
}

impl FrameBackend for VulkanFrame<'_> {
    type Error = RendererError;

    fn wait_for_fence(&mut self, context: usize) -> RendererResult<()> {
        self.context(context)?
            .in_flight_fence()
            .wait(self.fence_timeout_ns)
            .map_err(RendererError::Frame)
    }

    fn reset_fence(&mut self, context: usize) -> RendererResult<()> {
        self.context(context)?
            .in_flight_fence()
            .reset()
            .map_err(RendererError::Frame)
    }

    fn acquire_image(&mut self, context: usize) -> RendererResult<Acquired> {
        let semaphore = self.context(context)?.image_acquired().handle();
        match self.swapchain.acquire_next_image(semaphore, u64::MAX) {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(e) => Err(RendererError::Frame(e.into())),
        }
    }

    fn update_uniforms(&mut self, image_index: u32) -> RendererResult<()> {
        self.per_image
            .write_uniform(image_index as usize, &self.ubo)
            .map_err(RendererError::Frame)
    }

    fn record(&mut self, context: usize, image_index: u32) -> RendererResult<()> {
        let target = self.target(image_index)?;
        let cmd = self.context(context)?.command_buffer();
        self.render_graph
            .record(cmd, &target, self.models.iter(), self.textures)
            .map_err(RendererError::Frame)
    }

    fn submit(&mut self, context: usize, _image_index: u32) -> RendererResult<()> {
        let frame = self.context(context)?;

        let wait_semaphores = [frame.image_acquired().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished().handle()];
        let command_buffers = [frame.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was just recorded and the fence was
        // reset by the schedule after its previous use signaled.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight_fence().handle())
                .map_err(RendererError::Frame)
        }
    }

    fn present(&mut self, context: usize, image_index: u32) -> RendererResult<bool> {
        let wait = self.context(context)?.render_finished().handle();
        match self
            .swapchain
            .present(self.device.present_queue(), image_index, wait)
        {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(RendererError::Frame(e.into())),
        }
    }
}
