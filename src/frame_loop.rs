// Frame loop - swapchain lifecycle and per-frame state machine
//
// FLOW (one render() call):
//   [recreate if flagged] -> acquire -> submit -> present -> wait idle
//
// RECREATION:
//   wait idle -> retire current generation (dependents released, swapchain
//   handle kept) -> build next generation with the retired handle as
//   `old_swapchain` -> release the retired handle once the new one is live
//
// The Vulkan work lives behind SwapchainBackend so the state machine can be
// driven without a GPU.

use ash::vk;

use crate::backend::{Acquired, PresentStatus, WindowMetrics};
use crate::error::{RenderError, Result};

/// Handle counts of one built generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationCounts {
    pub images: usize,
    pub image_views: usize,
    pub framebuffers: usize,
    pub command_buffers: usize,
}

impl GenerationCounts {
    /// Every image has exactly one view, framebuffer and command buffer.
    pub fn is_consistent(&self) -> bool {
        self.images == self.image_views
            && self.images == self.framebuffers
            && self.images == self.command_buffers
    }
}

/// A swapchain and everything built on top of it.
pub trait BuiltGeneration {
    fn generation(&self) -> u64;
    fn extent(&self) -> vk::Extent2D;
    fn counts(&self) -> GenerationCounts;
}

/// GPU side of the frame loop.
pub trait SwapchainBackend {
    type Generation: BuiltGeneration;
    /// A swapchain handle without dependents, kept for handover.
    type Retired;

    fn wait_idle(&mut self) -> Result<()>;

    /// Build swapchain, pipeline, framebuffers and command buffers.
    ///
    /// Must return `RenderError::ZeroExtent` before creating anything when
    /// the surface currently allows no pixels.
    fn build(
        &mut self,
        generation: u64,
        desired_extent: vk::Extent2D,
        old: Option<&Self::Retired>,
    ) -> Result<Self::Generation>;

    /// Release every dependent of `built` and keep only its swapchain handle.
    /// Called with the device idle.
    fn retire(&mut self, built: Self::Generation) -> Self::Retired;

    fn acquire(&mut self, built: &Self::Generation) -> Result<Acquired>;

    /// On failure the backend must leave its sync objects usable, so a later
    /// frame neither waits on a fence nothing signals nor reuses a pending
    /// semaphore.
    fn submit(&mut self, built: &Self::Generation, image_index: u32) -> Result<()>;

    fn present(&mut self, built: &Self::Generation, image_index: u32) -> Result<PresentStatus>;
}

pub enum SwapchainState<G> {
    NotBuilt,
    Built(G),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Ready,
    Acquiring,
    Recreating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32, generation: u64 },
    /// Nothing was drawn (minimized window, acquire timeout, surface still
    /// out of date after one recreation).
    Skipped,
}

pub struct FrameLoop<B: SwapchainBackend> {
    // Field order is drop order: current generation, then the retired
    // handle, then the backend that owns the device-level objects.
    state: SwapchainState<B::Generation>,
    retired: Option<B::Retired>,
    frame_state: FrameState,
    generation: u64,
    metrics: WindowMetrics,
    needs_recreate: bool,
    backend: B,
}

impl<B: SwapchainBackend> FrameLoop<B> {
    /// Nothing is built until the first `setup_swapchain()` or `render()`.
    pub fn with_backend(backend: B, metrics: WindowMetrics) -> Self {
        Self {
            state: SwapchainState::NotBuilt,
            retired: None,
            frame_state: FrameState::Recreating,
            generation: 0,
            metrics,
            needs_recreate: true,
            backend,
        }
    }

    /// (Re)build the swapchain and all dependents for the current window.
    ///
    /// A minimized window or a zero-sized surface leaves the loop NotBuilt
    /// without error; the next `render()` tries again.
    pub fn setup_swapchain(&mut self) -> Result<()> {
        self.clear_swapchain()?;
        self.frame_state = FrameState::Recreating;

        if self.metrics.is_minimized() {
            log::debug!("Window minimized, deferring swapchain build");
            return Ok(());
        }

        let generation = self.generation + 1;
        let desired = self.metrics.desired_extent();

        match self.backend.build(generation, desired, self.retired.as_ref()) {
            Ok(built) => {
                let extent = built.extent();
                self.state = SwapchainState::Built(built);
                // The new swapchain is live, the handover is done.
                self.retired = None;
                self.generation = generation;
                self.needs_recreate = false;
                self.frame_state = FrameState::Ready;
                log::info!(
                    "Swapchain generation {} ready ({}x{})",
                    generation,
                    extent.width,
                    extent.height
                );
                Ok(())
            }
            Err(RenderError::ZeroExtent) => {
                log::debug!("Surface has zero extent, deferring swapchain build");
                Ok(())
            }
            Err(e) => {
                // A handle passed as old_swapchain is retired even when
                // creation fails, so it cannot be offered again.
                self.retired = None;
                Err(e)
            }
        }
    }

    /// Wait for the device, release all dependents and keep the swapchain
    /// handle for the next build. No-op when nothing is built.
    pub fn clear_swapchain(&mut self) -> Result<()> {
        if !self.is_built() {
            return Ok(());
        }

        self.backend.wait_idle()?;

        if let SwapchainState::Built(built) = std::mem::replace(&mut self.state, SwapchainState::NotBuilt) {
            let generation = built.generation();
            self.retired = Some(self.backend.retire(built));
            log::info!("Cleared swapchain generation {}", generation);
        }
        Ok(())
    }

    /// Run one frame, recreating the swapchain first when needed.
    pub fn render(&mut self) -> Result<FrameStatus> {
        if self.needs_recreate || !self.is_built() {
            self.setup_swapchain()?;
        }

        if let Some(status) = self.draw_frame()? {
            return Ok(status);
        }

        log::warn!("Swapchain generation {} out of date, recreating", self.generation);
        self.setup_swapchain()?;

        match self.draw_frame()? {
            Some(status) => Ok(status),
            None => {
                log::warn!("Swapchain still out of date after recreation, skipping frame");
                self.needs_recreate = true;
                Ok(FrameStatus::Skipped)
            }
        }
    }

    /// `None` when the swapchain turned out to be out of date.
    ///
    /// After a failed acquire, submit or present the acquired image and the
    /// semaphore states are unknown, so the next `render()` starts from a
    /// fresh build.
    fn draw_frame(&mut self) -> Result<Option<FrameStatus>> {
        let drawn = self.acquire_submit_present();
        if drawn.is_err() {
            self.frame_state = FrameState::Recreating;
            self.needs_recreate = true;
        }
        drawn
    }

    fn acquire_submit_present(&mut self) -> Result<Option<FrameStatus>> {
        let SwapchainState::Built(built) = &self.state else {
            return Ok(Some(FrameStatus::Skipped));
        };

        self.frame_state = FrameState::Acquiring;
        let (image_index, suboptimal) = match self.backend.acquire(built)? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::NotReady => {
                self.frame_state = FrameState::Ready;
                return Ok(Some(FrameStatus::Skipped));
            }
            Acquired::OutOfDate => {
                self.frame_state = FrameState::Recreating;
                return Ok(None);
            }
        };

        self.backend.submit(built, image_index)?;
        let presented = self.backend.present(built, image_index)?;
        // One frame in flight.
        self.backend.wait_idle()?;

        if suboptimal || presented.needs_recreate() {
            log::warn!(
                "Swapchain generation {} {}, recreating before next frame",
                built.generation(),
                if suboptimal { "suboptimal" } else { "reported by present" }
            );
            self.needs_recreate = true;
        }

        self.frame_state = FrameState::Ready;
        Ok(Some(FrameStatus::Presented {
            image_index,
            generation: built.generation(),
        }))
    }

    /// Window size or scale changed; takes effect on the next `render()`.
    pub fn resize(&mut self, metrics: WindowMetrics) {
        if metrics != self.metrics {
            log::debug!(
                "Window metrics changed to {}x{} @ {}",
                metrics.width,
                metrics.height,
                metrics.scale_factor
            );
        }
        self.metrics = metrics;
        self.needs_recreate = true;
    }

    /// Rebuild on the next `render()`, e.g. after the pipeline descriptor
    /// changed.
    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame_state
    }

    /// Generation of the last successful build; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, SwapchainState::Built(_))
    }

    pub fn built(&self) -> Option<&B::Generation> {
        match &self.state {
            SwapchainState::Built(built) => Some(built),
            SwapchainState::NotBuilt => None,
        }
    }

    pub fn generation_counts(&self) -> Option<GenerationCounts> {
        self.built().map(|built| built.counts())
    }

    pub fn has_retired(&self) -> bool {
        self.retired.is_some()
    }

    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate
    }

    pub fn metrics(&self) -> WindowMetrics {
        self.metrics
    }
}

impl<B: SwapchainBackend> Drop for FrameLoop<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            log::warn!("Device did not go idle before frame loop teardown: {}", e);
        }
    }
}
