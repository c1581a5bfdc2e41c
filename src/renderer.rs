// Renderer - the Vulkan side of the frame loop
//
// VulkanBackend owns everything that survives swapchain recreation
// (device, surface, shaders, command pool, sync objects). A Generation owns
// everything that does not. Renderer is the public entry point.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    Acquired, CommandPool, FrameRecorder, FrameSync, Framebuffers, GraphicsContext, Instance, Pipeline,
    PipelineDescriptor, PresentStatus, RecordedCommands, RetiredSwapchain, ShaderBundle, ShaderSet, Surface,
    Swapchain, ViewportMode, WindowMetrics,
};
use crate::error::{RenderError, Result, VkResultExt};
use crate::frame_loop::{BuiltGeneration, FrameLoop, FrameState, FrameStatus, GenerationCounts, SwapchainBackend};

#[derive(Clone, Debug)]
pub struct RendererOptions {
    pub app_name: String,
    pub validation: bool,
    /// Falls back to FIFO when the surface does not offer it.
    pub present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
    pub vertex_count: u32,
    pub instance_count: u32,
    /// Dynamic viewport/scissor instead of baking them into the pipeline.
    pub dynamic_viewport: bool,
    /// `None` waits forever.
    pub acquire_timeout: Option<Duration>,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            app_name: "vk-frameloop".to_string(),
            validation: cfg!(debug_assertions),
            present_mode: vk::PresentModeKHR::FIFO,
            clear_color: [1.0, 1.0, 1.0, 1.0],
            vertex_count: 3,
            instance_count: 1,
            dynamic_viewport: true,
            acquire_timeout: None,
        }
    }
}

impl RendererOptions {
    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout
            .map_or(u64::MAX, |timeout| u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn recorder(&self) -> FrameRecorder {
        FrameRecorder {
            clear_color: self.clear_color,
            vertex_count: self.vertex_count,
            instance_count: self.instance_count,
        }
    }
}

/// One swapchain generation and its dependents.
///
/// Field order is drop order: command buffers, framebuffers, pipeline
/// (with render pass and layout), then the swapchain and its views.
pub struct Generation {
    commands: RecordedCommands,
    framebuffers: Framebuffers,
    pipeline: Pipeline,
    swapchain: Swapchain,
}

impl BuiltGeneration for Generation {
    fn generation(&self) -> u64 {
        self.swapchain.generation
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    fn counts(&self) -> GenerationCounts {
        GenerationCounts {
            images: self.swapchain.images.len(),
            image_views: self.swapchain.image_views.len(),
            framebuffers: self.framebuffers.len(),
            command_buffers: self.commands.len(),
        }
    }
}

pub struct VulkanBackend {
    sync: FrameSync,
    command_pool: CommandPool,
    // Modules referenced by `descriptor`.
    _shaders: ShaderSet,
    recorder: FrameRecorder,
    descriptor: PipelineDescriptor,
    present_mode: vk::PresentModeKHR,
    dynamic_viewport: bool,
    acquire_timeout: u64,
    surface: Surface,
    context: Arc<GraphicsContext>,
}

impl VulkanBackend {
    pub fn new(
        context: Arc<GraphicsContext>,
        surface: Surface,
        shaders: &ShaderBundle,
        options: &RendererOptions,
    ) -> Result<Self> {
        let shaders = ShaderSet::new(&context, shaders)?;
        let mut descriptor = PipelineDescriptor::default();
        shaders.apply(&mut descriptor);
        if descriptor.vertex_shader.is_none() {
            return Err(RenderError::MissingVertexStage);
        }

        Ok(Self {
            sync: FrameSync::new(&context)?,
            command_pool: CommandPool::new(&context)?,
            _shaders: shaders,
            recorder: options.recorder(),
            descriptor,
            present_mode: options.present_mode,
            dynamic_viewport: options.dynamic_viewport,
            acquire_timeout: options.acquire_timeout_ns(),
            surface,
            context,
        })
    }

    pub fn context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    pub fn descriptor_mut(&mut self) -> &mut PipelineDescriptor {
        &mut self.descriptor
    }
}

impl SwapchainBackend for VulkanBackend {
    type Generation = Generation;
    type Retired = RetiredSwapchain;

    fn wait_idle(&mut self) -> Result<()> {
        self.context.wait_idle()
    }

    fn build(
        &mut self,
        generation: u64,
        desired_extent: vk::Extent2D,
        old: Option<&RetiredSwapchain>,
    ) -> Result<Generation> {
        let surface = self.surface.handle;
        let capabilities = self.surface.refresh_capabilities(self.context.physical_device)?;

        let swapchain = Swapchain::new(
            &self.context,
            surface,
            capabilities,
            desired_extent,
            self.present_mode,
            generation,
            old,
        )?;

        self.descriptor.color_format = swapchain.format;
        self.descriptor.viewport = if self.dynamic_viewport {
            ViewportMode::Dynamic {
                viewport_count: 1,
                scissor_count: 1,
            }
        } else {
            ViewportMode::covering(swapchain.extent)
        };

        let pipeline = Pipeline::compile(&self.context, &self.descriptor)?;
        let framebuffers = Framebuffers::new(
            &self.context,
            pipeline.render_pass,
            &swapchain.image_views,
            swapchain.extent,
        )?;
        let commands = self.recorder.record(
            &self.context,
            &self.command_pool,
            &framebuffers,
            &pipeline,
            swapchain.extent,
        )?;

        Ok(Generation {
            commands,
            framebuffers,
            pipeline,
            swapchain,
        })
    }

    fn retire(&mut self, built: Generation) -> RetiredSwapchain {
        let Generation {
            commands,
            framebuffers,
            pipeline,
            swapchain,
        } = built;
        drop(commands);
        drop(framebuffers);
        drop(pipeline);
        swapchain.retire()
    }

    fn acquire(&mut self, built: &Generation) -> Result<Acquired> {
        built
            .swapchain
            .acquire_next_image(self.acquire_timeout, self.sync.image_available)
    }

    fn submit(&mut self, built: &Generation, image_index: u32) -> Result<()> {
        let command_buffer = built.commands.get(image_index).ok_or(RenderError::ImageIndex {
            index: image_index,
            count: built.commands.len(),
        })?;

        self.sync.wait_and_reset()?;

        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let submitted = unsafe {
            self.context
                .device
                .queue_submit(self.context.graphics_queue, &[submit_info], self.sync.in_flight_fence)
        }
        .vk_call("vkQueueSubmit");

        match submitted {
            // A lost device takes the whole context down; nothing to rearm.
            Err(e) if !e.is_device_lost() => {
                self.context.wait_idle()?;
                self.sync.rearm()?;
                Err(e)
            }
            submitted => submitted,
        }
    }

    fn present(&mut self, built: &Generation, image_index: u32) -> Result<PresentStatus> {
        built.swapchain.present(image_index, &[self.sync.render_finished])
    }
}

/// Window-bound renderer: one device, one surface, a rebuildable swapchain.
pub struct Renderer {
    frames: FrameLoop<VulkanBackend>,
}

impl Renderer {
    /// Create instance, surface and device for `window`. The swapchain is
    /// built by the first `setup_swapchain()` or `render()`.
    pub fn new(
        window: &(impl HasDisplayHandle + HasWindowHandle),
        metrics: WindowMetrics,
        shaders: &ShaderBundle,
        options: RendererOptions,
    ) -> Result<Self> {
        let display = window.display_handle()?.as_raw();
        let instance = Arc::new(Instance::new(&options.app_name, display, options.validation)?);
        let surface = Surface::new(Arc::clone(&instance), window)?;
        let context = GraphicsContext::new(instance, &surface)?;
        let backend = VulkanBackend::new(context, surface, shaders, &options)?;

        Ok(Self {
            frames: FrameLoop::with_backend(backend, metrics),
        })
    }

    pub fn setup_swapchain(&mut self) -> Result<()> {
        self.frames.setup_swapchain()
    }

    pub fn clear_swapchain(&mut self) -> Result<()> {
        self.frames.clear_swapchain()
    }

    pub fn render(&mut self) -> Result<FrameStatus> {
        self.frames.render()
    }

    pub fn resize(&mut self, metrics: WindowMetrics) {
        self.frames.resize(metrics);
    }

    /// Edit the pipeline descriptor; the change is compiled on the next
    /// `render()`. Color format and viewport mode are managed per build.
    pub fn configure_pipeline(&mut self, configure: impl FnOnce(&mut PipelineDescriptor)) {
        configure(self.frames.backend_mut().descriptor_mut());
        self.frames.request_recreate();
    }

    pub fn generation(&self) -> u64 {
        self.frames.generation()
    }

    pub fn frame_state(&self) -> FrameState {
        self.frames.frame_state()
    }

    pub fn generation_counts(&self) -> Option<GenerationCounts> {
        self.frames.generation_counts()
    }

    pub fn context(&self) -> &Arc<GraphicsContext> {
        self.frames.backend().context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_draw_one_triangle_on_white() {
        let options = RendererOptions::default();
        assert_eq!(options.clear_color, [1.0; 4]);
        let recorder = options.recorder();
        assert_eq!((recorder.vertex_count, recorder.instance_count), (3, 1));
    }

    #[test]
    fn acquire_timeout_converts_to_nanoseconds() {
        let mut options = RendererOptions::default();
        assert_eq!(options.acquire_timeout_ns(), u64::MAX);

        options.acquire_timeout = Some(Duration::from_millis(250));
        assert_eq!(options.acquire_timeout_ns(), 250_000_000);

        options.acquire_timeout = Some(Duration::MAX);
        assert_eq!(options.acquire_timeout_ns(), u64::MAX);
    }
}
