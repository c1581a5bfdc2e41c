// Swapchain - window presentation
//
// Owns the presentation engine's image ring and one view per image.
// Recreation hands the previous handle to the new creation call
// (`old_swapchain`) through a RetiredSwapchain, so in-flight images can be
// handed over without tearing.

use ash::vk;
use std::sync::Arc;

use super::{GraphicsContext, SurfaceCapabilities};
use crate::error::{RenderError, Result, VkResultExt};

/// Result of asking the presentation engine for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    /// `suboptimal`: the image is usable but the swapchain should be rebuilt.
    Image { index: u32, suboptimal: bool },
    /// Surface changed; nothing was acquired and nothing was signaled.
    OutOfDate,
    /// Timeout elapsed before an image became available.
    NotReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreate(self) -> bool {
        self != PresentStatus::Presented
    }
}

/// Map a raw acquire result into the recoverable/fatal taxonomy.
pub fn classify_acquire(result: std::result::Result<(u32, bool), vk::Result>) -> Result<Acquired> {
    match result {
        Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(Acquired::NotReady),
        Err(e) => Err(e).vk_call("vkAcquireNextImageKHR"),
    }
}

pub fn classify_present(result: std::result::Result<bool, vk::Result>) -> Result<PresentStatus> {
    match result {
        Ok(false) => Ok(PresentStatus::Presented),
        Ok(true) => Ok(PresentStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
        Err(e) => Err(e).vk_call("vkQueuePresentKHR"),
    }
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub generation: u64,
    context: Arc<GraphicsContext>,
}

impl Swapchain {
    /// Build a swapchain for the freshly refreshed `capabilities`.
    ///
    /// `desired_extent` is clamped to the capability bounds. When `old` is
    /// given its handle is passed along so the presentation engine can hand
    /// over images; the caller keeps `old` alive until this call returns.
    pub fn new(
        context: &Arc<GraphicsContext>,
        surface: vk::SurfaceKHR,
        capabilities: &SurfaceCapabilities,
        desired_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        generation: u64,
        old: Option<&RetiredSwapchain>,
    ) -> Result<Self> {
        let extent = capabilities.clamp_extent(desired_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::ZeroExtent);
        }

        let surface_format = capabilities
            .choose_format()
            .ok_or(RenderError::UnsupportedSurface("formats"))?;
        let present_mode = capabilities.choose_present_mode(preferred_present_mode);
        let image_count = capabilities.image_count();

        log::info!(
            "Creating swapchain generation {}: {}x{} (desired {}x{}), {:?}",
            generation,
            extent.width,
            extent.height,
            desired_extent.width,
            desired_extent.height,
            present_mode
        );

        let families = context.queue_families;
        let unique_families = families.unique();
        let (sharing_mode, family_indices): (_, &[u32]) = if families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &unique_families)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(capabilities.raw.current_transform)
            .composite_alpha(capabilities.composite_alpha())
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.handle));

        let handle = unsafe { context.swapchain_loader.create_swapchain(&create_info, None) }
            .vk_create("swapchain")?;

        // From here on Drop releases whatever has been created.
        let mut swapchain = Self {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
            generation,
            context: Arc::clone(context),
        };

        swapchain.images = unsafe { context.swapchain_loader.get_swapchain_images(handle) }
            .vk_call("vkGetSwapchainImagesKHR")?;

        for &image in &swapchain.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            let view = unsafe { context.device.create_image_view(&create_info, None) }
                .vk_create("swapchain image view")?;
            swapchain.image_views.push(view);
        }

        log::debug!("Swapchain generation {} has {} images", generation, swapchain.images.len());

        Ok(swapchain)
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<Acquired> {
        let result = unsafe {
            self.context.swapchain_loader.acquire_next_image(
                self.handle,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Queue `image_index` for presentation once `wait_semaphores` signal.
    pub fn present(&self, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> Result<PresentStatus> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.context
                .swapchain_loader
                .queue_present(self.context.present_queue, &present_info)
        };
        classify_present(result)
    }

    /// Release the image views but keep the handle alive as `old_swapchain`
    /// for the next creation.
    pub fn retire(mut self) -> RetiredSwapchain {
        self.destroy_views();
        let handle = std::mem::replace(&mut self.handle, vk::SwapchainKHR::null());
        RetiredSwapchain {
            handle,
            generation: self.generation,
            context: Arc::clone(&self.context),
        }
    }

    fn destroy_views(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.context.device.destroy_image_view(view, None);
            }
        }
        // Images belong to the presentation engine.
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_views();
        if self.handle != vk::SwapchainKHR::null() {
            unsafe {
                self.context.swapchain_loader.destroy_swapchain(self.handle, None);
            }
        }
    }
}

/// A swapchain whose dependents are gone, kept only so its successor can be
/// created with it as `old_swapchain`.
pub struct RetiredSwapchain {
    handle: vk::SwapchainKHR,
    generation: u64,
    context: Arc<GraphicsContext>,
}

impl RetiredSwapchain {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for RetiredSwapchain {
    fn drop(&mut self) {
        log::debug!("Releasing retired swapchain generation {}", self.generation);
        unsafe {
            self.context.swapchain_loader.destroy_swapchain(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_results_are_classified() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            Acquired::Image { index: 2, suboptimal: false }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            Acquired::Image { index: 0, suboptimal: true }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            Acquired::OutOfDate
        );
        assert_eq!(classify_acquire(Err(vk::Result::TIMEOUT)).unwrap(), Acquired::NotReady);
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST))
            .unwrap_err()
            .is_device_lost());
    }

    #[test]
    fn present_results_are_classified() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentStatus::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentStatus::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentStatus::OutOfDate
        );
        assert!(!PresentStatus::Presented.needs_recreate());
        assert!(PresentStatus::Suboptimal.needs_recreate());

        match classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)) {
            Err(RenderError::Vulkan { call, result }) => {
                assert_eq!(call, "vkQueuePresentKHR");
                assert_eq!(result, vk::Result::ERROR_SURFACE_LOST_KHR);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
