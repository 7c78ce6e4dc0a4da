//! Reference scene entry point.
//!
//! Opens a window, loads the two reference quads as separate models and
//! spins them in opposite directions through the geometry and composite
//! subpasses until the window is closed.

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use subpass_core::{EngineConfig, FrameClock};
use subpass_platform::Window;
use subpass_renderer::{ModelHandle, Renderer};
use subpass_resources::reference_quads;

/// Placement and spin of one model.
struct Spinner {
    handle: ModelHandle,
    offset: Vec3,
    degrees_per_sec: f32,
}

impl Spinner {
    fn transform(&self, elapsed_secs: f32) -> Mat4 {
        Mat4::from_translation(self.offset)
            * Mat4::from_rotation_z((self.degrees_per_sec * elapsed_secs).to_radians())
    }
}

struct App {
    config: EngineConfig,
    // Renderer before window: the surface must go before the window.
    renderer: Option<Renderer>,
    window: Option<Window>,
    spinners: Vec<Spinner>,
    clock: FrameClock,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            spinners: Vec::new(),
            clock: FrameClock::new(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.config.window_width,
            self.config.window_height,
            "subpass",
        )
        .context("failed to create window")?;
        let mut renderer =
            Renderer::new(&window, &self.config).context("failed to initialize renderer")?;

        let [left, right] = reference_quads();
        let placements = [(left, -1.0, 30.0), (right, 1.0, -60.0)];
        for (mesh, x, degrees_per_sec) in placements {
            let handle = renderer
                .load_model(std::slice::from_ref(&mesh))
                .context("failed to load reference quad")?;
            self.spinners.push(Spinner {
                handle,
                offset: Vec3::new(x, 0.0, -3.0),
                degrees_per_sec,
            });
        }

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        let tick = self.clock.tick();
        if let Some(fps) = tick.fps {
            debug!("{:.1} fps ({} frames)", fps, renderer.frame_number());
        }

        let elapsed = self.clock.elapsed_secs();
        for spinner in &self.spinners {
            renderer.update_transform(spinner.handle, spinner.transform(elapsed))?;
        }
        renderer.render_frame()?;
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("{:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                if let Some(renderer) = &self.renderer
                    && let Err(e) = renderer.shutdown()
                {
                    error!("Shutdown failed: {:?}", e);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.frame() {
                    error!("Frame failed: {:#}", e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    subpass_core::init_logging();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    info!(
        "Starting subpass ({} frames in flight, validation {})",
        config.frames_in_flight, config.enable_validation
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
