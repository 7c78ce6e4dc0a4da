//! Shader-visible data for the geometry subpass.
//!
//! These structures must match the GLSL blocks in `shaders/geometry.vert`.
//! All structures use `#[repr(C)]` for predictable memory layout and
//! implement `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// View and projection, one uniform buffer per swapchain image (set 0,
/// binding 0).
///
/// # Memory Layout
///
/// - Offset 0: projection matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UboViewProjection {
    pub projection: Mat4,
    pub view: Mat4,
}

/// Camera parameters for [`UboViewProjection::from_camera`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 0.25),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

impl UboViewProjection {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Right-handed perspective for `aspect`, with Y flipped for Vulkan clip
    /// space.
    pub fn from_camera(camera: &CameraParams, aspect: f32) -> Self {
        let mut projection = Mat4::perspective_rh(camera.fov_y, aspect, camera.near, camera.far);
        projection.y_axis.y *= -1.0;
        Self {
            projection,
            view: Mat4::look_at_rh(camera.eye, camera.target, camera.up),
        }
    }
}

/// Per-draw model matrix, pushed as a vertex-stage push constant.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ModelPush {
    pub model: Mat4,
}

impl ModelPush {
    /// Size of the struct in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(model: Mat4) -> Self {
        Self { model }
    }
}

impl Default for ModelPush {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_ubo_view_projection_size() {
        // 2 Mat4 (2 * 64) = 128 bytes
        assert_eq!(UboViewProjection::SIZE, 128);
        assert_eq!(std::mem::align_of::<UboViewProjection>(), 16);
    }

    #[test]
    fn test_model_push_fits_minimum_push_constant_range() {
        // Vulkan guarantees at least 128 bytes of push constants
        assert!(ModelPush::SIZE <= 128);
        assert_eq!(ModelPush::default().model, Mat4::IDENTITY);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = CameraParams::default();
        let ubo = UboViewProjection::from_camera(&camera, 4.0 / 3.0);
        let gl = Mat4::perspective_rh(camera.fov_y, 4.0 / 3.0, camera.near, camera.far);
        assert_eq!(ubo.projection.y_axis.y, -gl.y_axis.y);
        assert_eq!(ubo.projection.x_axis, gl.x_axis);
    }

    #[test]
    fn test_point_above_origin_maps_to_negative_clip_y() {
        let camera = CameraParams::default();
        let ubo = UboViewProjection::from_camera(&camera, 1.0);
        let clip = ubo.projection * ubo.view * Vec4::new(0.0, 0.5, -1.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_bytes_cast() {
        let ubo = UboViewProjection::default();
        assert_eq!(bytemuck::bytes_of(&ubo).len(), UboViewProjection::SIZE);
    }
}
