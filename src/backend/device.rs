// Graphics context - core GPU interface
//
// Responsibilities:
// - Physical device selection (first discrete GPU, no fallback)
// - Graphics + presentation queue family resolution
// - Logical device + queue creation

use ash::{khr::swapchain, vk};
use std::ffi::CStr;
use std::sync::Arc;

use super::{Instance, Surface};
use crate::error::{RenderError, Result, VkResultExt};

/// Queue family indices. Both may name the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// One entry per distinct family, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Instance + selected GPU + logical device and its queues.
///
/// Created once per application lifetime and shared (`Arc`) by every object
/// that has to destroy device-level handles.
pub struct GraphicsContext {
    pub device: ash::Device,
    pub swapchain_loader: swapchain::Device,
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    /// Same handle as `graphics_queue` when the families coincide.
    pub present_queue: vk::Queue,
    pub instance: Arc<Instance>,
}

impl GraphicsContext {
    pub fn new(instance: Arc<Instance>, surface: &Surface) -> Result<Arc<Self>> {
        let (physical_device, properties) = Self::select_device(&instance)?;

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let queue_families = Self::resolve_queue_families(&instance, physical_device, surface)?;
        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(&instance, physical_device, queue_families)?;
        let swapchain_loader = swapchain::Device::new(&instance.raw, &device);

        log::info!(
            "Logical device ready (graphics family {}, present family {})",
            queue_families.graphics,
            queue_families.present
        );

        Ok(Arc::new(Self {
            device,
            swapchain_loader,
            physical_device,
            properties,
            queue_families,
            graphics_queue,
            present_queue,
            instance,
        }))
    }

    /// Pick the first discrete GPU.
    pub fn select_device(instance: &Instance) -> Result<(vk::PhysicalDevice, vk::PhysicalDeviceProperties)> {
        let devices = unsafe { instance.raw.enumerate_physical_devices() }
            .vk_call("vkEnumeratePhysicalDevices")?;

        let candidates: Vec<_> = devices
            .iter()
            .map(|&device| (device, unsafe { instance.raw.get_physical_device_properties(device) }))
            .collect();

        first_discrete(candidates.iter().map(|(device, props)| ((*device, *props), props.device_type)))
            .ok_or(RenderError::NoEligibleDevice {
                candidates: candidates.len(),
            })
    }

    fn resolve_queue_families(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
    ) -> Result<QueueFamilies> {
        let families = unsafe {
            instance
                .raw
                .get_physical_device_queue_family_properties(physical_device)
        };

        let mut present_support = Vec::with_capacity(families.len());
        for index in 0..families.len() as u32 {
            present_support.push(surface.supports_present(physical_device, index)?);
        }

        pick_queue_families(&families, &present_support)
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        let extensions = [swapchain::NAME.as_ptr()];

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.raw.create_device(physical_device, &create_info, None) }
            .vk_create("logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = if queue_families.is_shared() {
            graphics_queue
        } else {
            unsafe { device.get_device_queue(queue_families.present, 0) }
        };

        Ok((device, graphics_queue, present_queue))
    }

    /// Block until every queue on the device is idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.vk_call("vkDeviceWaitIdle")
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("Device did not go idle before destruction: {}", e);
        }

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

/// First candidate whose type is a discrete GPU.
pub fn first_discrete<T>(candidates: impl IntoIterator<Item = (T, vk::PhysicalDeviceType)>) -> Option<T> {
    candidates
        .into_iter()
        .find(|(_, device_type)| *device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
        .map(|(candidate, _)| candidate)
}

/// First family with graphics capability, first family that can present.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> Result<QueueFamilies> {
    let graphics = families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .ok_or(RenderError::MissingQueueFamily("graphics"))? as u32;

    // Prefer a single family doing both, so the queues coincide.
    let present = if present_support.get(graphics as usize).copied().unwrap_or(false) {
        graphics
    } else {
        present_support
            .iter()
            .position(|&supported| supported)
            .ok_or(RenderError::MissingQueueFamily("presentation"))? as u32
    };

    Ok(QueueFamilies { graphics, present })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_discrete_gpu() {
        let picked = first_discrete([
            ("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
            ("discrete-a", vk::PhysicalDeviceType::DISCRETE_GPU),
            ("discrete-b", vk::PhysicalDeviceType::DISCRETE_GPU),
        ]);
        assert_eq!(picked, Some("discrete-a"));
    }

    #[test]
    fn no_discrete_gpu_is_not_eligible() {
        let picked = first_discrete([
            (0, vk::PhysicalDeviceType::INTEGRATED_GPU),
            (1, vk::PhysicalDeviceType::CPU),
        ]);
        assert_eq!(picked, None);
    }

    #[test]
    fn shared_family_yields_one_queue() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let resolved = pick_queue_families(&families, &[true]).unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 0, present: 0 });
        assert!(resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0]);
    }

    #[test]
    fn distinct_families_are_resolved_separately() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let resolved = pick_queue_families(&families, &[false, false, true]).unwrap();
        assert_eq!(resolved, QueueFamilies { graphics: 1, present: 2 });
        assert_eq!(resolved.unique(), vec![1, 2]);
    }

    #[test]
    fn missing_capabilities_are_reported() {
        let compute_only = [family(vk::QueueFlags::COMPUTE)];
        assert!(matches!(
            pick_queue_families(&compute_only, &[true]),
            Err(RenderError::MissingQueueFamily("graphics"))
        ));

        let graphics_only = [family(vk::QueueFlags::GRAPHICS)];
        assert!(matches!(
            pick_queue_families(&graphics_only, &[false]),
            Err(RenderError::MissingQueueFamily("presentation"))
        ));
    }
}
