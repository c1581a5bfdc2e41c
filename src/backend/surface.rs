// Surface - binds the instance to a native window
//
// Caches the capability queries the swapchain needs (extent bounds,
// formats, present modes). Capabilities change with monitor/compositor
// state, so they are refreshed before every swapchain (re)build.

use ash::{khr::surface, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use super::Instance;
use crate::error::{RenderError, Result, VkResultExt};

/// What the windowing collaborator reports about the window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowMetrics {
    /// Logical size, before display scaling.
    pub width: f64,
    pub height: f64,
    pub scale_factor: f64,
}

impl WindowMetrics {
    pub fn new(width: f64, height: f64, scale_factor: f64) -> Self {
        Self { width, height, scale_factor }
    }

    /// Backbuffer size in physical pixels (not yet clamped to capabilities).
    pub fn desired_extent(&self) -> vk::Extent2D {
        let to_pixels = |logical: f64| (logical * self.scale_factor).max(0.0).round() as u32;
        vk::Extent2D {
            width: to_pixels(self.width),
            height: to_pixels(self.height),
        }
    }

    /// A minimized window has nothing to present to.
    pub fn is_minimized(&self) -> bool {
        let extent = self.desired_extent();
        extent.width == 0 || extent.height == 0
    }
}

/// Componentwise `clamp(desired, min, max)`.
///
/// Never panics on inverted bounds (some platforms briefly report
/// max < min while a window is being minimized); min wins.
pub fn clamp_extent(desired: vk::Extent2D, min: vk::Extent2D, max: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: desired.width.min(max.width).max(min.width),
        height: desired.height.min(max.height).max(min.height),
    }
}

/// Snapshot of what the surface supports on the selected device.
#[derive(Clone, Debug, Default)]
pub struct SurfaceCapabilities {
    pub raw: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    pub fn min_image_extent(&self) -> vk::Extent2D {
        self.raw.min_image_extent
    }

    pub fn max_image_extent(&self) -> vk::Extent2D {
        self.raw.max_image_extent
    }

    pub fn clamp_extent(&self, desired: vk::Extent2D) -> vk::Extent2D {
        clamp_extent(desired, self.raw.min_image_extent, self.raw.max_image_extent)
    }

    /// Prefer BGRA8 sRGB, otherwise whatever the surface lists first.
    pub fn choose_format(&self) -> Option<vk::SurfaceFormatKHR> {
        self.formats
            .iter()
            .copied()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| self.formats.first().copied())
    }

    /// FIFO is the only mode the API guarantees.
    pub fn choose_present_mode(&self, preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
        if self.present_modes.contains(&preferred) {
            preferred
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    pub fn image_count(&self) -> u32 {
        let mut image_count = self.raw.min_image_count.saturating_add(1);
        if self.raw.max_image_count > 0 {
            image_count = image_count.min(self.raw.max_image_count);
        }
        image_count
    }

    pub fn composite_alpha(&self) -> vk::CompositeAlphaFlagsKHR {
        let supported = self.raw.supported_composite_alpha;
        [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| supported.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
    }
}

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: surface::Instance,
    capabilities: SurfaceCapabilities,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(instance: Arc<Instance>, window: &(impl HasDisplayHandle + HasWindowHandle)) -> Result<Self> {
        let display_handle = window.display_handle()?.as_raw();
        let window_handle = window.window_handle()?.as_raw();

        let handle = unsafe {
            ash_window::create_surface(&instance.entry, &instance.raw, display_handle, window_handle, None)
        }
        .map_err(RenderError::SurfaceCreation)?;

        let loader = surface::Instance::new(&instance.entry, &instance.raw);

        Ok(Self {
            handle,
            loader,
            capabilities: SurfaceCapabilities::default(),
            _instance: instance,
        })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    /// Re-query extent bounds, formats and present modes.
    pub fn refresh_capabilities(&mut self, physical_device: vk::PhysicalDevice) -> Result<&SurfaceCapabilities> {
        let raw = unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        let formats = unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.handle)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

        let present_modes = unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }
        .vk_call("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        if formats.is_empty() {
            return Err(RenderError::UnsupportedSurface("formats"));
        }
        if present_modes.is_empty() {
            return Err(RenderError::UnsupportedSurface("present modes"));
        }

        log::debug!(
            "Surface capabilities: extent {}x{}..{}x{}, {} format(s), modes {:?}",
            raw.min_image_extent.width,
            raw.min_image_extent.height,
            raw.max_image_extent.width,
            raw.max_image_extent.height,
            formats.len(),
            present_modes
        );

        self.capabilities = SurfaceCapabilities { raw, formats, present_modes };
        Ok(&self.capabilities)
    }

    pub fn capabilities(&self) -> &SurfaceCapabilities {
        &self.capabilities
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn caps(min: vk::Extent2D, max: vk::Extent2D) -> SurfaceCapabilities {
        SurfaceCapabilities {
            raw: vk::SurfaceCapabilitiesKHR {
                min_image_extent: min,
                max_image_extent: max,
                min_image_count: 2,
                max_image_count: 3,
                ..Default::default()
            },
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn clamp_is_componentwise() {
        let min = extent(16, 32);
        let max = extent(1024, 768);
        for (w, h) in [(0, 0), (8, 900), (500, 500), (4000, 10), (1024, 768)] {
            let clamped = clamp_extent(extent(w, h), min, max);
            assert_eq!(clamped.width, w.clamp(min.width, max.width));
            assert_eq!(clamped.height, h.clamp(min.height, max.height));
        }
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let clamped = clamp_extent(extent(100, 100), extent(1, 1), extent(0, 0));
        assert_eq!(clamped, extent(1, 1));
    }

    #[test]
    fn scaled_window_within_bounds_is_not_clamped() {
        let metrics = WindowMetrics::new(200.0, 100.0, 2.0);
        let caps = caps(extent(2, 2), extent(4096, 4096));
        assert_eq!(metrics.desired_extent(), extent(400, 200));
        assert_eq!(caps.clamp_extent(metrics.desired_extent()), extent(400, 200));
    }

    #[test]
    fn oversized_window_clamps_to_max() {
        let metrics = WindowMetrics::new(1920.0, 1080.0, 1.0);
        let caps = caps(extent(1, 1), extent(800, 600));
        assert_eq!(caps.clamp_extent(metrics.desired_extent()), extent(800, 600));
    }

    #[test]
    fn zero_sized_window_is_minimized() {
        assert!(WindowMetrics::new(0.0, 720.0, 1.0).is_minimized());
        assert!(!WindowMetrics::new(1.0, 1.0, 1.0).is_minimized());
    }

    #[test]
    fn image_count_respects_max() {
        let mut caps = caps(extent(1, 1), extent(1, 1));
        assert_eq!(caps.image_count(), 3);
        caps.raw.max_image_count = 2;
        assert_eq!(caps.image_count(), 2);
        caps.raw.max_image_count = 0;
        assert_eq!(caps.image_count(), 3);
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let caps = caps(extent(1, 1), extent(1, 1));
        assert_eq!(
            caps.choose_present_mode(vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn prefers_bgra_srgb_format() {
        let mut caps = caps(extent(1, 1), extent(1, 1));
        let fallback = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert!(caps.choose_format().is_none());
        caps.formats = vec![fallback, preferred];
        assert_eq!(caps.choose_format().map(|f| f.format), Some(preferred.format));
        caps.formats = vec![fallback];
        assert_eq!(caps.choose_format().map(|f| f.format), Some(fallback.format));
    }
}
