// Command recording
//
// Content is static, so one primary command buffer per swapchain image is
// recorded once per swapchain generation and resubmitted every frame.

use ash::vk;
use std::sync::Arc;

use super::pipeline::{full_scissor, full_viewport, Pipeline};
use super::GraphicsContext;
use crate::error::{Result, VkResultExt};

pub struct CommandPool {
    pub handle: vk::CommandPool,
    context: Arc<GraphicsContext>,
}

impl CommandPool {
    pub fn new(context: &Arc<GraphicsContext>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(context.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let handle = unsafe { context.device.create_command_pool(&pool_info, None) }
            .vk_create("command pool")?;

        Ok(Self {
            handle,
            context: Arc::clone(context),
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.context.device.destroy_command_pool(self.handle, None);
        }
    }
}

/// One framebuffer per swapchain image view.
pub struct Framebuffers {
    pub handles: Vec<vk::Framebuffer>,
    context: Arc<GraphicsContext>,
}

impl Framebuffers {
    pub fn new(
        context: &Arc<GraphicsContext>,
        render_pass: vk::RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut framebuffers = Self {
            handles: Vec::with_capacity(image_views.len()),
            context: Arc::clone(context),
        };

        for &image_view in image_views {
            let attachments = [image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { context.device.create_framebuffer(&framebuffer_info, None) }
                .vk_create("framebuffer")?;
            framebuffers.handles.push(framebuffer);
        }

        Ok(framebuffers)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.handles.drain(..) {
                self.context.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

/// Recorded command buffers, returned to their pool on drop.
///
/// The pool must outlive this value.
pub struct RecordedCommands {
    pub buffers: Vec<vk::CommandBuffer>,
    pool: vk::CommandPool,
    context: Arc<GraphicsContext>,
}

impl RecordedCommands {
    pub fn get(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Drop for RecordedCommands {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            unsafe {
                self.context.device.free_command_buffers(self.pool, &self.buffers);
            }
        }
    }
}

/// What every frame draws: one clear and a non-indexed draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameRecorder {
    pub clear_color: [f32; 4],
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_count: 3,
            instance_count: 1,
        }
    }
}

impl FrameRecorder {
    pub fn clear_values(&self) -> [vk::ClearValue; 1] {
        [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }]
    }

    /// Record one command buffer per framebuffer.
    pub fn record(
        &self,
        context: &Arc<GraphicsContext>,
        pool: &CommandPool,
        framebuffers: &Framebuffers,
        pipeline: &Pipeline,
        extent: vk::Extent2D,
    ) -> Result<RecordedCommands> {
        let device = &context.device;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(framebuffers.len() as u32);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .vk_create("command buffers")?;
        let commands = RecordedCommands {
            buffers,
            pool: pool.handle,
            context: Arc::clone(context),
        };

        let clear_values = self.clear_values();
        let render_area = full_scissor(extent);
        let dynamic_viewport = pipeline.has_dynamic_state(vk::DynamicState::VIEWPORT);
        let dynamic_scissor = pipeline.has_dynamic_state(vk::DynamicState::SCISSOR);

        for (&cmd, &framebuffer) in commands.buffers.iter().zip(&framebuffers.handles) {
            let begin_info = vk::CommandBufferBeginInfo::default();
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(pipeline.render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);

            unsafe {
                device
                    .begin_command_buffer(cmd, &begin_info)
                    .vk_call("vkBeginCommandBuffer")?;
                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle);

                if dynamic_viewport {
                    device.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
                }
                if dynamic_scissor {
                    device.cmd_set_scissor(cmd, 0, &[render_area]);
                }

                device.cmd_draw(cmd, self.vertex_count, self.instance_count, 0, 0);
                device.cmd_end_render_pass(cmd);
                device.end_command_buffer(cmd).vk_call("vkEndCommandBuffer")?;
            }
        }

        log::debug!(
            "Recorded {} command buffer(s): {} vertices x {} instance(s)",
            commands.len(),
            self.vertex_count,
            self.instance_count
        );

        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_value_carries_configured_color() {
        let recorder = FrameRecorder {
            clear_color: [0.1, 0.2, 0.3, 1.0],
            ..Default::default()
        };
        let [clear] = recorder.clear_values();
        assert_eq!(unsafe { clear.color.float32 }, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn default_draw_is_a_single_triangle() {
        let recorder = FrameRecorder::default();
        assert_eq!(recorder.vertex_count, 3);
        assert_eq!(recorder.instance_count, 1);
    }
}
