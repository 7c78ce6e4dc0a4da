//! Staging upload followed by readback must return the uploaded bytes.
//!
//! Needs a Vulkan driver; skipped when none is available.

use std::sync::Arc;

use subpass_rhi::buffer::BufferUsage;
use subpass_rhi::device::Device;
use subpass_rhi::instance::Instance;
use subpass_rhi::physical_device::select_headless_physical_device;
use subpass_rhi::transfer::TransferContext;
use subpass_rhi::vk;
use subpass_rhi::vertex::Vertex;

use glam::{Vec2, Vec3};

fn headless_device() -> Option<(Instance, Arc<Device>)> {
    let instance = match Instance::new(false) {
        Ok(instance) => instance,
        Err(e) => {
            println!("Skipping test: no Vulkan instance ({e})");
            return None;
        }
    };

    let info = match select_headless_physical_device(instance.handle()) {
        Ok(info) => info,
        Err(e) => {
            println!("Skipping test: no usable GPU ({e})");
            return None;
        }
    };

    let device = Device::new(&instance, &info).expect("Failed to create device");
    Some((instance, device))
}

#[test]
fn test_buffer_roundtrip_is_byte_identical() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let transfer = TransferContext::new(device.clone()).expect("transfer context");

    let vertices = [
        Vertex::new(Vec3::new(-0.4, 0.4, 0.0), Vec3::X, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(-0.4, -0.4, 0.0), Vec3::Y, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(0.4, -0.4, 0.0), Vec3::Z, Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(0.4, 0.4, 0.0), Vec3::new(1.0, 1.0, 0.0), Vec2::new(0.0, 1.0)),
    ];
    let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];

    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let vertex_buffer = transfer
        .upload_buffer(BufferUsage::Vertex, vertex_bytes)
        .expect("vertex upload");
    assert_eq!(transfer.download_buffer(&vertex_buffer).unwrap(), vertex_bytes);

    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let index_buffer = transfer
        .upload_buffer(BufferUsage::Index, index_bytes)
        .expect("index upload");
    assert_eq!(transfer.download_buffer(&index_buffer).unwrap(), index_bytes);

    device.wait_idle().unwrap();
}

#[test]
fn test_image_roundtrip_is_byte_identical() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let transfer = TransferContext::new(device.clone()).expect("transfer context");

    let extent = vk::Extent2D {
        width: 4,
        height: 3,
    };
    let pixels: Vec<u8> = (0..extent.width * extent.height * 4)
        .map(|i| (i * 7 % 256) as u8)
        .collect();

    let image = transfer
        .upload_image(&pixels, extent, vk::Format::R8G8B8A8_UNORM)
        .expect("image upload");
    assert_eq!(transfer.download_image(&image).unwrap(), pixels);

    // Still readable after a download restored SHADER_READ_ONLY_OPTIMAL.
    assert_eq!(transfer.download_image(&image).unwrap(), pixels);

    device.wait_idle().unwrap();
}

#[test]
fn test_mismatched_pixel_count_is_rejected() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let transfer = TransferContext::new(device).expect("transfer context");

    let result = transfer.upload_image(
        &[255; 12],
        vk::Extent2D {
            width: 2,
            height: 2,
        },
        vk::Format::R8G8B8A8_UNORM,
    );
    assert!(result.is_err());
}

#[test]
fn test_host_visible_usage_is_not_staged() {
    let Some((_instance, device)) = headless_device() else {
        return;
    };
    let transfer = TransferContext::new(device).expect("transfer context");

    assert!(transfer.upload_buffer(BufferUsage::Uniform, &[0; 64]).is_err());
}
