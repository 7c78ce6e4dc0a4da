//! Platform layer: the winit window and its Vulkan surface.

mod error;
mod window;

pub use error::{PlatformError, PlatformResult};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
