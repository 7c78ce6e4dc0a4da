//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! The physical device selection process involves:
//! 1. Enumerating all available GPUs
//! 2. Checking each GPU for graphics and present queue families
//! 3. Checking for `VK_KHR_swapchain` and an adequate swapchain on the surface
//! 4. Verifying required device features (sampler anisotropy)
//! 5. Selecting the first GPU, in enumeration order, that passes all checks
//!
//! Zero qualifying devices is a fatal [`RhiError::NoSuitableGpu`].
//!
//! # Example
//!
//! ```no_run
//! use subpass_rhi::instance::Instance;
//! use subpass_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every candidate must support.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices for different queue types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
    /// Index of the queue family used for staging transfers.
    ///
    /// Always the graphics family: image layout transitions to
    /// `SHADER_READ_ONLY_OPTIMAL` need a queue with graphics capability.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if the minimum required queue families are available.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns true when graphics and present work land on different families.
    ///
    /// Resources touched by both queues then need concurrent sharing.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.graphics_family != self.present_family
    }

    /// Returns the unique queue family indices as a vector.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);

        for family in [self.graphics_family, self.present_family, self.transfer_family]
            .into_iter()
            .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }

        families
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the first physical device that can present to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no suitable GPU is found.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    select_with(instance, |device, families| {
        let indices = find_queue_families(families, |i| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        });
        if !indices.is_complete() {
            return None;
        }

        let support = SwapchainSupportDetails::query(device, surface, surface_loader).ok()?;
        if !support.is_adequate() {
            debug!("Device skipped: inadequate swapchain support");
            return None;
        }

        Some(indices)
    })
}

/// Selects a physical device for offscreen work, without a surface.
///
/// The present family is set to the graphics family so a [`crate::device::Device`]
/// can be created the same way; used for transfer tests and tooling.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU has a graphics queue.
pub fn select_headless_physical_device(
    instance: &ash::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    select_with(instance, |_, families| {
        let indices = find_queue_families(families, |_| true);
        indices.is_complete().then_some(indices)
    })
}

fn select_with<F>(instance: &ash::Instance, mut queue_check: F) -> Result<PhysicalDeviceInfo, RhiError>
where
    F: FnMut(vk::PhysicalDevice, &[vk::QueueFamilyProperties]) -> Option<QueueFamilyIndices>,
{
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let Some(selected) = first_suitable(&devices, |device| {
        check_device_suitability(instance, device, &mut queue_check)
    }) else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, {} MiB device-local",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        selected.device_local_memory() / (1024 * 1024)
    );

    Ok(selected)
}

/// Returns the first device, in enumeration order, that passes `check`.
///
/// Devices are not ranked.
fn first_suitable<D: Copy, T>(devices: &[D], mut check: impl FnMut(D) -> Option<T>) -> Option<T> {
    devices.iter().find_map(|&device| check(device))
}

/// Checks if a physical device is suitable for rendering.
fn check_device_suitability<F>(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    queue_check: &mut F,
) -> Option<PhysicalDeviceInfo>
where
    F: FnMut(vk::PhysicalDevice, &[vk::QueueFamilyProperties]) -> Option<QueueFamilyIndices>,
{
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_string());

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }.ok()?;
    let extension_names: Vec<&CStr> = extensions
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    if !supports_extensions(&extension_names, REQUIRED_DEVICE_EXTENSIONS) {
        debug!("GPU '{}' skipped: missing VK_KHR_swapchain", device_name);
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: sampler anisotropy not supported", device_name);
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let Some(queue_families) = queue_check(device, &families) else {
        debug!("GPU '{}' skipped: missing graphics/present support", device_name);
        return None;
    };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

/// Returns true if every name in `required` appears in `available`.
fn supports_extensions(available: &[&CStr], required: &[&CStr]) -> bool {
    required.iter().all(|name| available.contains(name))
}

/// Finds queue family indices.
///
/// Graphics is the first family with `GRAPHICS`. Present prefers the graphics
/// family when it can present, otherwise the first family that can.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        if family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics_family = Some(i as u32);
            break;
        }
    }

    if let Some(graphics) = indices.graphics_family
        && supports_present(graphics)
    {
        indices.present_family = Some(graphics);
    } else {
        indices.present_family = families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, _)| i as u32)
            .find(|&i| supports_present(i));
    }

    indices.transfer_family = indices.graphics_family;
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families_with_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
            transfer_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0, 1]);
        assert!(indices.is_split());
    }

    #[test]
    fn test_find_queue_families_prefers_shared_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = find_queue_families(&families, |_| true);

        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.transfer_family, Some(1));
        assert!(!indices.is_split());
    }

    #[test]
    fn test_find_queue_families_split_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = find_queue_families(&families, |i| i == 1);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert!(indices.is_split());
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_find_queue_families_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 2),
        ];
        let indices = find_queue_families(&families, |_| false);

        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, None);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_supports_extensions() {
        let available = [ash::khr::swapchain::NAME, ash::khr::maintenance1::NAME];
        assert!(supports_extensions(&available, REQUIRED_DEVICE_EXTENSIONS));
        assert!(!supports_extensions(
            &[ash::khr::maintenance1::NAME],
            REQUIRED_DEVICE_EXTENSIONS
        ));
    }

    #[test]
    fn test_first_suitable_keeps_enumeration_order() {
        // Devices 1 and 3 qualify; 1 wins even though 3 would rate higher.
        let devices = [0u32, 1, 2, 3];
        let mut checked = Vec::new();
        let picked = first_suitable(&devices, |d| {
            checked.push(d);
            (d % 2 == 1).then_some(d * 100)
        });
        assert_eq!(picked, Some(100));
        assert_eq!(checked, vec![0, 1]);
        assert_eq!(first_suitable(&devices, |_| None::<u32>), None);
    }
}
